//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Validate value ranges (intervals > 0, thresholds >= 1)
//! - Detect duplicate check ids and unknown checker types
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: AppConfig → Result<(), Vec<ValidationError>>

use std::collections::HashSet;
use std::fmt;
use std::net::{IpAddr, SocketAddr};

use crate::config::schema::AppConfig;
use crate::health::checker::CHECK_TYPES;

/// A single semantic problem in the configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationError {
    pub field: String,
    pub message: String,
}

impl ValidationError {
    fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
        }
    }
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

/// Validate a parsed configuration.
pub fn validate_config(config: &AppConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    let health = &config.health;
    if health.check_interval_ms == 0 {
        errors.push(ValidationError::new("health.check_interval_ms", "must be greater than 0"));
    }
    if health.check_timeout_ms == Some(0) {
        errors.push(ValidationError::new("health.check_timeout_ms", "must be greater than 0"));
    }

    let mut seen = HashSet::new();
    for (i, check) in health.checks.iter().enumerate() {
        let field = format!("health.checks[{i}]");
        if check.id.trim().is_empty() {
            errors.push(ValidationError::new(format!("{field}.id"), "must not be empty"));
        } else if !seen.insert(check.id.as_str()) {
            errors.push(ValidationError::new(
                format!("{field}.id"),
                format!("duplicate check id '{}'", check.id),
            ));
        }
        if !CHECK_TYPES.contains(&check.check_type.as_str()) {
            errors.push(ValidationError::new(
                format!("{field}.type"),
                format!(
                    "unknown type '{}', expected one of {}",
                    check.check_type,
                    CHECK_TYPES.join(", ")
                ),
            ));
        }
        if check.max_count == 0 {
            errors.push(ValidationError::new(format!("{field}.max_count"), "must be at least 1"));
        }
    }

    let haproxy = &config.haproxy;
    if haproxy.poll_interval_ms == 0 {
        errors.push(ValidationError::new("haproxy.poll_interval_ms", "must be greater than 0"));
    }
    if haproxy.bind_ip.parse::<IpAddr>().is_err() {
        errors.push(ValidationError::new(
            "haproxy.bind_ip",
            format!("'{}' is not an IP address", haproxy.bind_ip),
        ));
    }
    if haproxy.template.trim().is_empty() {
        errors.push(ValidationError::new("haproxy.template", "must not be empty"));
    }
    if haproxy.config_file.trim().is_empty() {
        errors.push(ValidationError::new("haproxy.config_file", "must not be empty"));
    }
    let missing_cmd =
        haproxy.verify_cmd.trim().is_empty() || haproxy.reload_cmd.trim().is_empty();
    if haproxy.reload && missing_cmd {
        errors.push(ValidationError::new(
            "haproxy.reload",
            "verify_cmd and reload_cmd are required when reload is enabled",
        ));
    }

    let obs = &config.observability;
    if obs.metrics_enabled && obs.metrics_address.parse::<SocketAddr>().is_err() {
        errors.push(ValidationError::new(
            "observability.metrics_address",
            format!("'{}' is not a socket address", obs.metrics_address),
        ));
    }
    if let Some(addr) = &obs.status_address {
        if addr.parse::<SocketAddr>().is_err() {
            errors.push(ValidationError::new(
                "observability.status_address",
                format!("'{addr}' is not a socket address"),
            ));
        }
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}
