//! Configuration validation.
//!
//! Serde handles syntax; this module checks value ranges and combinations.
//! All problems are collected and returned together.

use std::net::SocketAddr;

use thiserror::Error;

use crate::config::schema::ProxyConfig;

const LOG_LEVELS: [&str; 5] = ["trace", "debug", "info", "warn", "error"];

/// A single semantic problem in a configuration.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{field}: {message}")]
pub struct ValidationError {
    pub field: &'static str,
    pub message: String,
}

impl ValidationError {
    fn new(field: &'static str, message: impl Into<String>) -> Self {
        Self {
            field,
            message: message.into(),
        }
    }
}

/// Room for an error envelope's fixed text, excluding the echoed id.
const ENVELOPE_OVERHEAD: usize = 128;

/// Validate a configuration, returning every error found.
pub fn validate_config(config: &ProxyConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    if config.listener.bind_address.trim().is_empty() {
        errors.push(ValidationError::new("listener.bind_address", "must not be empty"));
    }
    if let Some(tls) = &config.listener.tls {
        if tls.cert_path.trim().is_empty() {
            errors.push(ValidationError::new("listener.tls.cert_path", "must not be empty"));
        }
        if tls.key_path.trim().is_empty() {
            errors.push(ValidationError::new("listener.tls.key_path", "must not be empty"));
        }
    }

    let bridge = &config.bridge;
    if bridge.request_timeout_ms == 0 {
        errors.push(ValidationError::new("bridge.request_timeout_ms", "must be greater than 0"));
    }
    if bridge.max_request_bytes == 0 {
        errors.push(ValidationError::new("bridge.max_request_bytes", "must be greater than 0"));
    }
    let envelope_floor = ENVELOPE_OVERHEAD.saturating_add(bridge.max_id_len);
    if bridge.max_response_bytes < envelope_floor {
        // Must fit a synthesized error envelope carrying the longest id.
        errors.push(ValidationError::new(
            "bridge.max_response_bytes",
            format!("must be at least {envelope_floor} (128 + bridge.max_id_len)"),
        ));
    }
    if bridge.max_id_len < 4 {
        errors.push(ValidationError::new("bridge.max_id_len", "must be at least 4"));
    }

    let observability = &config.observability;
    if !LOG_LEVELS.contains(&observability.log_level.as_str()) {
        errors.push(ValidationError::new(
            "observability.log_level",
            format!("unknown level '{}'", observability.log_level),
        ));
    }
    if observability.metrics_enabled
        && observability.metrics_address.parse::<SocketAddr>().is_err()
    {
        errors.push(ValidationError::new(
            "observability.metrics_address",
            format!("'{}' is not a socket address", observability.metrics_address),
        ));
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}
