//! Services state watcher driving config regeneration.
//!
//! # Responsibilities
//! - Poll the state's change timestamp on a short fixed interval
//! - On change: render, write, verify, reload
//! - Re-render when the template itself changes on disk
//!
//! # Design Decisions
//! - The last-seen timestamp starts at the epoch, so the first poll always syncs
//! - A failed step is logged and not retried until the next change
//! - A verify failure leaves the new file on disk but the proxy untouched

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use thiserror::Error;
use tokio::sync::{broadcast, mpsc};
use tokio::time::{self, MissedTickBehavior};

use crate::config::HaproxyConfig;
use crate::haproxy::controller::{ProxyController, ProxyError};
use crate::haproxy::renderer::{ConfigRenderer, RenderError};
use crate::lifecycle::shutdown_requested;
use crate::observability::metrics;
use crate::state::{ServicesState, StateError};

#[derive(Debug, Error)]
pub enum SyncError {
    #[error("failed to read services state: {0}")]
    State(#[from] StateError),

    #[error(transparent)]
    Render(#[from] RenderError),

    #[error("new config rejected by verify command: {0}")]
    Verify(#[source] ProxyError),

    #[error("config written and verified but proxy reload failed: {0}")]
    Reload(#[source] ProxyError),
}

/// Result of one sync attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncOutcome {
    /// State has not changed since the last sync.
    Unchanged,
    /// Config file written; verify and reload are disabled.
    Written,
    /// Config written, verified and loaded by the proxy.
    Activated,
}

pub struct StateWatcher {
    renderer: ConfigRenderer,
    controller: ProxyController,
    config_file: PathBuf,
    poll_interval: Duration,
    reload: bool,
    last_seen: DateTime<Utc>,
    template_changes: Option<mpsc::UnboundedReceiver<()>>,
}

impl StateWatcher {
    pub fn new(
        renderer: ConfigRenderer,
        controller: ProxyController,
        config_file: impl Into<PathBuf>,
        poll_interval: Duration,
    ) -> Self {
        Self {
            renderer,
            controller,
            config_file: config_file.into(),
            poll_interval,
            reload: true,
            last_seen: DateTime::<Utc>::UNIX_EPOCH,
            template_changes: None,
        }
    }

    pub fn from_config(config: &HaproxyConfig) -> Self {
        Self::new(
            ConfigRenderer::from_config(config),
            ProxyController::from_config(config),
            &config.config_file,
            Duration::from_millis(config.poll_interval_ms),
        )
        .with_reload(config.reload)
    }

    /// When false, changes only rewrite the config file.
    pub fn with_reload(mut self, reload: bool) -> Self {
        self.reload = reload;
        self
    }

    /// Force a re-render whenever a message arrives on `rx`.
    pub fn with_template_changes(mut self, rx: mpsc::UnboundedReceiver<()>) -> Self {
        self.template_changes = Some(rx);
        self
    }

    pub fn config_file(&self) -> &Path {
        &self.config_file
    }

    pub fn last_seen(&self) -> DateTime<Utc> {
        self.last_seen
    }

    /// Sync if the state changed since the last observation.
    pub async fn sync_once(&mut self, state: &dyn ServicesState) -> Result<SyncOutcome, SyncError> {
        let changed = state.last_changed()?;
        if changed <= self.last_seen {
            return Ok(SyncOutcome::Unchanged);
        }

        tracing::info!(
            last_changed = %changed,
            "Services state changed, regenerating proxy config"
        );
        self.last_seen = changed;
        self.regenerate(state).await
    }

    /// Render, write, verify and reload regardless of the change timestamp.
    pub async fn regenerate(&self, state: &dyn ServicesState) -> Result<SyncOutcome, SyncError> {
        if let Err(e) = self.renderer.render_to_file(state, &self.config_file) {
            metrics::record_render("error");
            return Err(e.into());
        }
        metrics::record_render("ok");

        if !self.reload {
            return Ok(SyncOutcome::Written);
        }

        if let Err(e) = self.controller.verify().await {
            metrics::record_reload("rejected");
            return Err(SyncError::Verify(e));
        }

        if let Err(e) = self.controller.reload().await {
            metrics::record_reload("error");
            return Err(SyncError::Reload(e));
        }

        metrics::record_reload("ok");
        tracing::info!(path = ?self.config_file, "Proxy reloaded with new config");
        Ok(SyncOutcome::Activated)
    }

    /// Poll until shutdown.
    pub async fn run(
        mut self,
        state: Arc<dyn ServicesState>,
        mut shutdown: broadcast::Receiver<()>,
    ) {
        tracing::info!(
            config_file = ?self.config_file,
            template = ?self.renderer.template(),
            poll_interval_ms = self.poll_interval.as_millis() as u64,
            reload = self.reload,
            "State watcher starting"
        );

        let mut ticker = time::interval(self.poll_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut template_changes = self.template_changes.take();

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    let result = self.sync_once(state.as_ref()).await;
                    report(result);
                }
                Some(()) = next_change(&mut template_changes) => {
                    tracing::info!("Template changed, regenerating proxy config");
                    let result = self.regenerate(state.as_ref()).await;
                    report(result);
                }
                _ = shutdown_requested(&mut shutdown) => {
                    tracing::info!("State watcher received shutdown signal, exiting loop");
                    break;
                }
            }
        }
    }
}

async fn next_change(rx: &mut Option<mpsc::UnboundedReceiver<()>>) -> Option<()> {
    match rx {
        Some(rx) => rx.recv().await,
        None => std::future::pending().await,
    }
}

fn report(result: Result<SyncOutcome, SyncError>) {
    match result {
        Ok(_) => {}
        Err(SyncError::Reload(e)) => {
            tracing::error!(
                error = %e,
                "Config file changed but the running proxy did not pick it up"
            );
        }
        Err(e) => {
            tracing::error!(error = %e, "Proxy config sync failed, keeping previous config active");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::{MemoryState, Port, Service};
    use std::fs;

    #[tokio::test]
    async fn test_first_poll_always_syncs() {
        let dir = tempfile::tempdir().unwrap();
        let template = dir.path().join("tmpl");
        fs::write(&template, "{% for name in services %}{{ name }}\n{% endfor %}").unwrap();
        let output = dir.path().join("out.cfg");

        let state = MemoryState::new();
        let mut watcher = StateWatcher::new(
            ConfigRenderer::new(&template, "0.0.0.0"),
            ProxyController::new("true", "true"),
            &output,
            Duration::from_millis(10),
        )
        .with_reload(false);

        // Empty state still has an epoch timestamp; nothing newer yet.
        assert_eq!(watcher.sync_once(&state).await.unwrap(), SyncOutcome::Unchanged);

        state.add_service(Service::new("1", "h").with_name("web").with_port(Port::tcp(80)));
        assert_eq!(watcher.sync_once(&state).await.unwrap(), SyncOutcome::Written);
        assert_eq!(fs::read_to_string(&output).unwrap(), "web\n");
        assert_eq!(watcher.sync_once(&state).await.unwrap(), SyncOutcome::Unchanged);
    }

    #[tokio::test]
    async fn test_render_failure_advances_last_seen() {
        let dir = tempfile::tempdir().unwrap();
        let state = MemoryState::new();
        state.add_service(Service::new("1", "h").with_port(Port::tcp(80)));

        let mut watcher = StateWatcher::new(
            ConfigRenderer::new(dir.path().join("missing"), "0.0.0.0"),
            ProxyController::new("true", "true"),
            dir.path().join("out.cfg"),
            Duration::from_millis(10),
        );

        let err = watcher.sync_once(&state).await.unwrap_err();
        assert!(matches!(err, SyncError::Render(RenderError::TemplateRead { .. })));
        assert_eq!(watcher.last_seen(), state.last_changed().unwrap());
        assert_eq!(watcher.sync_once(&state).await.unwrap(), SyncOutcome::Unchanged);
    }
}
