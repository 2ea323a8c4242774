//! Lifecycle management subsystem.
//!
//! # Data Flow
//! ```text
//! Signals (signals.rs):
//!     SIGTERM/SIGINT → Shutdown::trigger
//!
//! Shutdown (shutdown.rs):
//!     trigger → monitor loop, state watcher, status endpoint all exit
//! ```
//!
//! # Design Decisions
//! - In-flight check generations are abandoned on shutdown, not awaited
//! - The last written proxy config stays on disk
//! - Only an explicit trigger stops a loop; dropping the coordinator does not

pub mod shutdown;
pub mod signals;

pub use shutdown::{requested as shutdown_requested, Shutdown};
pub use signals::wait_for_signal;
