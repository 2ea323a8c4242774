//! Health checking subsystem.
//!
//! # Data Flow
//! ```text
//! Scheduler (monitor.rs):
//!     Periodic timer
//!     → Snapshot registry
//!     → Run every check concurrently (checker.rs)
//!     → Wait for the whole generation
//!     → Update check.rs state machine
//!
//! State machine (check.rs):
//!     Healthy ←→ Sickly → Failed
//!     Unknown when the probe itself errors
//! ```
//!
//! # Design Decisions
//! - Consecutive non-healthy runs count toward a per-check threshold
//! - The registry is the only shared structure; each check is mutated by one task per tick
//! - Checkers are selected by type tag, not by type inspection

pub mod check;
pub mod checker;
pub mod monitor;

pub use check::{Check, CheckSnapshot, Status};
pub use checker::{checker_for_type, AlwaysHealthy, CheckError, Checker};
pub use monitor::{Iterations, Monitor};
