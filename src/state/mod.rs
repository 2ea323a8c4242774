//! Services state consumed by the config synchronizer.
//!
//! The state is owned by something else (service discovery, a snapshot
//! file); this crate only reads it through [`ServicesState`].

pub mod file;
pub mod memory;
pub mod service;

use std::path::PathBuf;

use chrono::{DateTime, Utc};
use thiserror::Error;

pub use file::FileState;
pub use memory::MemoryState;
pub use service::{default_service_name, Port, Service};

#[derive(Debug, Error)]
pub enum StateError {
    #[error("failed to read state {path:?}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse state {path:?}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

/// Read access to an externally mutated set of services.
pub trait ServicesState: Send + Sync {
    /// When the state last changed.
    fn last_changed(&self) -> Result<DateTime<Utc>, StateError>;

    /// Visit every service instance, ordered by hostname then id.
    fn each_service_sorted(&self, visit: &mut dyn FnMut(&Service)) -> Result<(), StateError>;

    /// Logical name used to group instances.
    fn service_name(&self, svc: &Service) -> String {
        default_service_name(svc)
    }
}
