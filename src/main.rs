//! healthsync daemon.
//!
//! Runs the health check scheduler and, when a services state file is
//! configured, keeps the HAProxy config in sync with it.

use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use clap::Parser;
use tokio::task::JoinSet;

use healthsync::config::{load_config, AppConfig};
use healthsync::haproxy::{StateWatcher, TemplateWatcher};
use healthsync::health::{Iterations, Monitor};
use healthsync::lifecycle::{wait_for_signal, Shutdown};
use healthsync::observability::{logging, metrics, status};
use healthsync::state::{FileState, ServicesState};

#[derive(Parser)]
#[command(name = "healthsync")]
#[command(about = "Service health checks and HAProxy config sync", long_about = None)]
struct Cli {
    /// TOML configuration file. Built-in defaults are used when omitted.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Number of check ticks to run, -1 for unbounded.
    #[arg(short = 'n', long, default_value = "-1", allow_hyphen_values = true)]
    iterations: Iterations,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let config = match &cli.config {
        Some(path) => load_config(path)?,
        None => AppConfig::default(),
    };

    logging::init_tracing(&config.observability);
    tracing::info!("healthsync v{} starting", env!("CARGO_PKG_VERSION"));

    if config.observability.metrics_enabled {
        let addr: SocketAddr = config.observability.metrics_address.parse()?;
        metrics::init_metrics(addr);
    }

    let shutdown = Shutdown::new();
    let mut stopped = shutdown.subscribe();
    let monitor = Arc::new(Monitor::from_config(&config.health)?);
    let mut tasks = JoinSet::new();

    tracing::info!(
        checks = monitor.len(),
        interval_ms = config.health.check_interval_ms,
        iterations = %cli.iterations,
        "Configuration loaded"
    );

    if let Some(addr) = &config.observability.status_address {
        let addr: SocketAddr = addr.parse()?;
        let monitor = Arc::clone(&monitor);
        let rx = shutdown.subscribe();
        tasks.spawn(async move {
            if let Err(e) = status::serve_status(addr, monitor, rx).await {
                tracing::error!(address = %addr, error = %e, "Status endpoint failed");
            }
        });
    }

    // Dropping the notify handle stops template watching; keep it for the process lifetime.
    let mut _template_watch = None;
    match &config.haproxy.state_file {
        Some(state_file) => {
            let mut watcher = StateWatcher::from_config(&config.haproxy);

            let template = Path::new(&config.haproxy.template);
            let (template_watcher, changes) = TemplateWatcher::new(template);
            match template_watcher.run() {
                Ok(handle) => {
                    _template_watch = Some(handle);
                    watcher = watcher.with_template_changes(changes);
                }
                Err(e) => tracing::warn!(error = %e, "Template watching disabled"),
            }

            let state: Arc<dyn ServicesState> = Arc::new(FileState::new(state_file));
            let rx = shutdown.subscribe();
            tasks.spawn(watcher.run(state, rx));
        }
        None => tracing::info!("No haproxy.state_file configured, proxy config sync disabled"),
    }

    {
        let monitor = Arc::clone(&monitor);
        let rx = shutdown.subscribe();
        let done = shutdown.clone();
        let iterations = cli.iterations;
        tasks.spawn(async move {
            let ticks = monitor.run(iterations, rx).await;
            tracing::info!(ticks, "Health monitor finished");
            done.trigger();
        });
    }

    tokio::select! {
        _ = wait_for_signal() => shutdown.trigger(),
        _ = stopped.recv() => {}
    }

    while let Some(res) = tasks.join_next().await {
        if let Err(e) = res {
            tracing::error!(error = %e, "Background task failed");
        }
    }

    tracing::info!("Shutdown complete");
    Ok(())
}
