//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for the daemon.
//! All types derive Serde traits for deserialization from config files.

use serde::{Deserialize, Serialize};

/// Root configuration.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct AppConfig {
    /// Health check scheduler settings.
    pub health: HealthConfig,

    /// Load balancer config generation and activation.
    pub haproxy: HaproxyConfig,

    /// Observability settings.
    pub observability: ObservabilityConfig,
}

/// Health check scheduler configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct HealthConfig {
    /// Interval between ticks in milliseconds, shared by every check.
    pub check_interval_ms: u64,

    /// Optional deadline per checker run. Capped at the interval.
    pub check_timeout_ms: Option<u64>,

    /// Checks registered at startup.
    pub checks: Vec<CheckConfig>,
}

impl Default for HealthConfig {
    fn default() -> Self {
        Self {
            check_interval_ms: 3_000,
            check_timeout_ms: None,
            checks: Vec::new(),
        }
    }
}

/// A single check definition.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct CheckConfig {
    /// Unique check identifier.
    pub id: String,

    /// Checker variant (always, http, tcp, script).
    #[serde(rename = "type", default = "default_check_type")]
    pub check_type: String,

    /// Argument passed to the checker (URL, host:port, command).
    #[serde(default)]
    pub args: String,

    /// Consecutive non-healthy runs before FAILED (default: 1).
    #[serde(default = "default_max_count")]
    pub max_count: u32,
}

fn default_check_type() -> String {
    "http".to_string()
}

fn default_max_count() -> u32 {
    1
}

/// HAProxy config generation settings.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct HaproxyConfig {
    /// Command that makes the running proxy pick up the new config.
    pub reload_cmd: String,

    /// Command that validates the generated config.
    pub verify_cmd: String,

    /// IP address frontends bind to.
    pub bind_ip: String,

    /// Path to the config template.
    pub template: String,

    /// Path the rendered config is written to.
    pub config_file: String,

    /// How often the services state is polled for changes, in milliseconds.
    pub poll_interval_ms: u64,

    /// Verify and reload after writing. When false only the file is written.
    pub reload: bool,

    /// JSON services state snapshot to watch. Disables the sync loop when unset.
    pub state_file: Option<String>,
}

impl Default for HaproxyConfig {
    fn default() -> Self {
        Self {
            reload_cmd: concat!(
                "haproxy -f /etc/haproxy.cfg -p /var/run/haproxy.pid",
                " -sf $(cat /var/run/haproxy.pid)"
            )
            .to_string(),
            verify_cmd: "haproxy -c -f /etc/haproxy.cfg".to_string(),
            bind_ip: "0.0.0.0".to_string(),
            template: "views/haproxy.cfg".to_string(),
            config_file: "/etc/haproxy.cfg".to_string(),
            poll_interval_ms: 250,
            reload: true,
            state_file: None,
        }
    }
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,

    /// Emit JSON log lines instead of the human format.
    pub log_json: bool,

    /// Enable metrics endpoint.
    pub metrics_enabled: bool,

    /// Metrics endpoint bind address.
    pub metrics_address: String,

    /// Bind address of the check status endpoint. Disabled when unset.
    pub status_address: Option<String>,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            log_json: false,
            metrics_enabled: false,
            metrics_address: "0.0.0.0:9090".to_string(),
            status_address: None,
        }
    }
}
