//! Metrics collection and exposition.
//!
//! # Metrics
//! - `healthsync_check_status` (gauge): raw status code per check
//! - `healthsync_tick_duration_seconds` (histogram): time to run one generation
//! - `healthsync_renders_total` (counter): config renders by outcome
//! - `healthsync_reloads_total` (counter): verify/reload attempts by outcome
//!
//! Recording is a no-op until a recorder is installed.

use std::net::SocketAddr;
use std::time::Duration;

use metrics_exporter_prometheus::PrometheusBuilder;

use crate::health::Status;

/// Install the Prometheus recorder and its scrape listener.
pub fn init_metrics(addr: SocketAddr) {
    match PrometheusBuilder::new().with_http_listener(addr).install() {
        Ok(()) => tracing::info!(address = %addr, "Metrics endpoint listening"),
        Err(e) => {
            tracing::error!(address = %addr, error = %e, "Failed to install metrics exporter")
        }
    }
}

pub fn record_check_status(check: &str, status: Status) {
    metrics::gauge!("healthsync_check_status", "check" => check.to_string())
        .set(f64::from(status.code()));
}

pub fn record_tick(elapsed: Duration) {
    metrics::histogram!("healthsync_tick_duration_seconds").record(elapsed.as_secs_f64());
}

pub fn record_render(outcome: &'static str) {
    metrics::counter!("healthsync_renders_total", "outcome" => outcome).increment(1);
}

pub fn record_reload(outcome: &'static str) {
    metrics::counter!("healthsync_reloads_total", "outcome" => outcome).increment(1);
}
