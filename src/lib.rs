//! Service health monitoring and load balancer config synchronization.
//!
//! Two loosely coupled loops:
//!
//! ```text
//! health::Monitor      tick → run every check → update state machines
//!                      queried through healthy()/unhealthy()
//!
//! haproxy::StateWatcher poll state → render template → verify → reload
//! ```

pub mod config;
pub mod haproxy;
pub mod health;
pub mod lifecycle;
pub mod observability;
pub mod state;

pub use config::AppConfig;
pub use health::{Check, Monitor, Status};
pub use lifecycle::Shutdown;
