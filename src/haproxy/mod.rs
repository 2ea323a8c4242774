//! Load balancer config synchronization.
//!
//! # Data Flow
//! ```text
//! watcher.rs polls ServicesState::last_changed()
//!     → renderer.rs (project services, execute template, replace file)
//!     → controller.rs verify command
//!     → controller.rs reload command
//!
//! template_watcher.rs (template edited on disk)
//!     → watcher.rs forced regeneration
//! ```
//!
//! # Design Decisions
//! - The proxy only ever loads a config that passed verification
//! - Failures keep the last good config live and wait for the next change
//! - External commands are a substitutable capability

pub mod controller;
pub mod renderer;
pub mod template_watcher;
pub mod watcher;

pub use controller::{CommandOutput, CommandRunner, ProxyController, ProxyError, ShellRunner};
pub use renderer::{make_port_map, sanitize_name, services_with_ports, ConfigRenderer, RenderError};
pub use template_watcher::TemplateWatcher;
pub use watcher::{StateWatcher, SyncError, SyncOutcome};
