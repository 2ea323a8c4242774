//! Verify/reload gate for the running proxy.
//!
//! # Responsibilities
//! - Run the validation command against the freshly written config
//! - Run the reload command once validation passed
//!
//! # Design Decisions
//! - Exit status is the only success signal; output is kept for logs
//! - Commands go through `CommandRunner` so tests never spawn a proxy

use std::io;
use std::process::Stdio;
use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;
use tokio::process::Command;

use crate::config::HaproxyConfig;

#[derive(Debug, Error)]
pub enum ProxyError {
    #[error("failed to spawn '{command}': {source}")]
    Spawn {
        command: String,
        #[source]
        source: io::Error,
    },

    #[error("'{command}' exited with {}: {stderr}", exit_label(.code))]
    Failed {
        command: String,
        code: Option<i32>,
        stderr: String,
    },
}

fn exit_label(code: &Option<i32>) -> String {
    match code {
        Some(c) => format!("status {c}"),
        None => "signal".to_string(),
    }
}

/// Captured output of a successful command.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandOutput {
    pub stdout: String,
    pub stderr: String,
}

/// Executes an external command line.
#[async_trait]
pub trait CommandRunner: Send + Sync {
    async fn run(&self, command: &str) -> Result<CommandOutput, ProxyError>;
}

/// Runs commands through `/bin/bash -c`, so `$(...)` substitutions work.
#[derive(Debug, Clone, Copy, Default)]
pub struct ShellRunner;

#[async_trait]
impl CommandRunner for ShellRunner {
    async fn run(&self, command: &str) -> Result<CommandOutput, ProxyError> {
        let output = Command::new("/bin/bash")
            .arg("-c")
            .arg(command)
            .stdin(Stdio::null())
            .output()
            .await
            .map_err(|source| ProxyError::Spawn {
                command: command.to_string(),
                source,
            })?;

        let stdout = String::from_utf8_lossy(&output.stdout).trim_end().to_string();
        let stderr = String::from_utf8_lossy(&output.stderr).trim_end().to_string();

        if output.status.success() {
            Ok(CommandOutput { stdout, stderr })
        } else {
            Err(ProxyError::Failed {
                command: command.to_string(),
                code: output.status.code(),
                stderr,
            })
        }
    }
}

/// Gates activation of a new config on the proxy.
#[derive(Clone)]
pub struct ProxyController {
    verify_cmd: String,
    reload_cmd: String,
    runner: Arc<dyn CommandRunner>,
}

impl ProxyController {
    pub fn new(verify_cmd: impl Into<String>, reload_cmd: impl Into<String>) -> Self {
        Self {
            verify_cmd: verify_cmd.into(),
            reload_cmd: reload_cmd.into(),
            runner: Arc::new(ShellRunner),
        }
    }

    pub fn from_config(config: &HaproxyConfig) -> Self {
        Self::new(&config.verify_cmd, &config.reload_cmd)
    }

    /// Swap the command executor.
    pub fn with_runner(mut self, runner: Arc<dyn CommandRunner>) -> Self {
        self.runner = runner;
        self
    }

    /// Check the current config file. An error means it must not be activated.
    pub async fn verify(&self) -> Result<(), ProxyError> {
        self.exec("verify", &self.verify_cmd).await
    }

    /// Make the running proxy load the config, keeping live connections.
    pub async fn reload(&self) -> Result<(), ProxyError> {
        self.exec("reload", &self.reload_cmd).await
    }

    async fn exec(&self, op: &'static str, command: &str) -> Result<(), ProxyError> {
        match self.runner.run(command).await {
            Ok(output) => {
                tracing::debug!(
                    op,
                    command,
                    stdout = %output.stdout,
                    stderr = %output.stderr,
                    "Proxy command succeeded"
                );
                Ok(())
            }
            Err(e) => {
                tracing::error!(op, command, error = %e, "Error running proxy command");
                Err(e)
            }
        }
    }
}

impl std::fmt::Debug for ProxyController {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProxyController")
            .field("verify_cmd", &self.verify_cmd)
            .field("reload_cmd", &self.reload_cmd)
            .finish_non_exhaustive()
    }
}
