//! Check health state machine.
//!
//! # States
//! - Healthy: last run healthy, counter reset
//! - Sickly: non-healthy, counter below threshold
//! - Failed: counter reached `max_count`
//! - Unknown: the last execution itself errored
//!
//! # State Transitions
//! ```text
//! any → Healthy: raw result Healthy (count = 0)
//! any → Sickly:  raw result non-healthy, count < max_count
//! any → Failed:  raw result non-healthy, count >= max_count
//! any → Unknown: execution error, unless the same call crosses the threshold
//! ```
//!
//! # Design Decisions
//! - `update_status` is the only mutator
//! - The counter is driven by the raw result, not the overridden status

use std::fmt;
use std::sync::{Mutex, MutexGuard, PoisonError};

use serde::{Deserialize, Serialize};

use crate::health::checker::{AlwaysHealthy, CheckError, Checker};

/// Coarse health classification of a check.
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Status {
    Healthy = 0,
    Sickly = 1,
    Failed = 2,
    Unknown = 3,
}

impl Status {
    /// Raw integer code as exchanged with checkers.
    pub fn code(self) -> u8 {
        self as u8
    }

    /// Parse a raw code. Anything out of range is `Unknown`.
    pub fn from_code(code: i64) -> Self {
        match code {
            0 => Status::Healthy,
            1 => Status::Sickly,
            2 => Status::Failed,
            _ => Status::Unknown,
        }
    }

    pub fn is_healthy(self) -> bool {
        self == Status::Healthy
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Status::Healthy => "HEALTHY",
            Status::Sickly => "SICKLY",
            Status::Failed => "FAILED",
            Status::Unknown => "UNKNOWN",
        };
        f.write_str(s)
    }
}

/// Mutable part of a check, touched only by the task running it.
#[derive(Debug, Clone, Copy)]
struct CheckState {
    status: Status,
    count: u32,
}

/// A single monitored unit.
pub struct Check {
    /// Registry key.
    pub id: String,
    /// Consecutive non-healthy runs before the check is declared failed.
    pub max_count: u32,
    /// Descriptive tag naming the checker variant.
    pub check_type: String,
    /// Opaque argument handed to the checker.
    pub args: String,
    checker: Box<dyn Checker>,
    state: Mutex<CheckState>,
}

impl Check {
    /// Create a check with the placeholder checker, `max_count = 1` and type "http".
    ///
    /// The check starts UNKNOWN, not HEALTHY: it is listed by
    /// [`Monitor::unhealthy`](crate::health::Monitor::unhealthy) until its first
    /// run completes. Callers that treat a never-run check as healthy must wait
    /// for the first tick.
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            max_count: 1,
            check_type: "http".to_string(),
            args: String::new(),
            checker: Box::new(AlwaysHealthy),
            state: Mutex::new(CheckState {
                status: Status::Unknown,
                count: 0,
            }),
        }
    }

    pub fn with_checker(
        mut self,
        check_type: impl Into<String>,
        checker: Box<dyn Checker>,
    ) -> Self {
        self.check_type = check_type.into();
        self.checker = checker;
        self
    }

    pub fn with_args(mut self, args: impl Into<String>) -> Self {
        self.args = args.into();
        self
    }

    /// Threshold is clamped to at least 1.
    pub fn with_max_count(mut self, max_count: u32) -> Self {
        self.max_count = max_count.max(1);
        self
    }

    pub fn checker(&self) -> &dyn Checker {
        self.checker.as_ref()
    }

    pub fn status(&self) -> Status {
        self.lock().status
    }

    pub fn count(&self) -> u32 {
        self.lock().count
    }

    /// Feed the outcome of one checker run into the state machine.
    ///
    /// `status` is the raw code the checker reported. When `error` is set the
    /// status becomes `Unknown`, but the counter still follows the raw code.
    pub fn update_status(&self, status: Status, error: Option<&CheckError>) {
        let mut state = self.lock();
        let previous = state.status;

        match error {
            Some(err) => {
                tracing::warn!(
                    check = %self.id,
                    error = %err,
                    "Error executing check, status UNKNOWN"
                );
                state.status = Status::Unknown;
            }
            None => state.status = status,
        }

        if status == Status::Healthy {
            state.count = 0;
        } else {
            state.count = state.count.saturating_add(1);
            if state.count >= self.max_count {
                state.status = Status::Failed;
            }
        }

        if state.status != previous {
            tracing::info!(
                check = %self.id,
                from = %previous,
                to = %state.status,
                count = state.count,
                "Check status changed"
            );
        }
    }

    /// Point-in-time copy of this check.
    pub fn snapshot(&self) -> CheckSnapshot {
        let state = *self.lock();
        CheckSnapshot {
            id: self.id.clone(),
            status: state.status,
            count: state.count,
            max_count: self.max_count,
            check_type: self.check_type.clone(),
            args: self.args.clone(),
        }
    }

    fn lock(&self) -> MutexGuard<'_, CheckState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl fmt::Debug for Check {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = *self.lock();
        f.debug_struct("Check")
            .field("id", &self.id)
            .field("status", &state.status)
            .field("count", &state.count)
            .field("max_count", &self.max_count)
            .field("check_type", &self.check_type)
            .field("args", &self.args)
            .finish()
    }
}

/// Serializable view of a check.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CheckSnapshot {
    pub id: String,
    pub status: Status,
    pub count: u32,
    pub max_count: u32,
    #[serde(rename = "type")]
    pub check_type: String,
    pub args: String,
}
