//! Shared fakes for integration tests.

#![allow(dead_code)]

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use healthsync::haproxy::{CommandOutput, CommandRunner, ProxyError};
use healthsync::health::{CheckError, Checker, Status};
use tokio_util::sync::CancellationToken;

/// Command runner that records every command and fails those listed.
#[derive(Default)]
pub struct RecordingRunner {
    pub calls: Mutex<Vec<String>>,
    failing: Vec<String>,
}

impl RecordingRunner {
    pub fn failing(commands: &[&str]) -> Self {
        Self {
            calls: Mutex::new(Vec::new()),
            failing: commands.iter().map(|c| c.to_string()).collect(),
        }
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl CommandRunner for RecordingRunner {
    async fn run(&self, command: &str) -> Result<CommandOutput, ProxyError> {
        self.calls.lock().unwrap().push(command.to_string());
        if self.failing.iter().any(|c| c == command) {
            return Err(ProxyError::Failed {
                command: command.to_string(),
                code: Some(1),
                stderr: "rejected".to_string(),
            });
        }
        Ok(CommandOutput::default())
    }
}

/// Checker that counts runs and tracks peak concurrency.
pub struct CountingChecker {
    pub runs: Arc<AtomicUsize>,
    pub in_flight: Arc<AtomicUsize>,
    pub peak: Arc<AtomicUsize>,
    pub delay: Duration,
    pub result: Status,
}

impl CountingChecker {
    pub fn new(delay: Duration) -> Self {
        Self {
            runs: Arc::new(AtomicUsize::new(0)),
            in_flight: Arc::new(AtomicUsize::new(0)),
            peak: Arc::new(AtomicUsize::new(0)),
            delay,
            result: Status::Healthy,
        }
    }

    /// Share counters with another checker instance.
    pub fn sharing(&self) -> Self {
        Self {
            runs: Arc::clone(&self.runs),
            in_flight: Arc::clone(&self.in_flight),
            peak: Arc::clone(&self.peak),
            delay: self.delay,
            result: self.result,
        }
    }
}

#[async_trait]
impl Checker for CountingChecker {
    async fn run(&self, _args: &str, _cancel: &CancellationToken) -> Result<Status, CheckError> {
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);
        tokio::time::sleep(self.delay).await;
        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        self.runs.fetch_add(1, Ordering::SeqCst);
        Ok(self.result)
    }
}

/// Write a template file into `dir` and return its path.
pub fn write_template(dir: &Path, contents: &str) -> PathBuf {
    let path = dir.join("haproxy.cfg.tmpl");
    std::fs::write(&path, contents).unwrap();
    path
}
