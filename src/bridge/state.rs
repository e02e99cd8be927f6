//! Host availability states and per-request bridge failures.
//!
//! # State Transitions
//! ```text
//! Unavailable → Available: host registers / set_ready(true)
//! Available → Unavailable: host deregisters / set_ready(false) (about to reset)
//! any → ShuttingDown: server stop or unload (terminal for that listener)
//! ShuttingDown → Unavailable: next start, unless the bridge was unloaded
//! ```

use serde::Serialize;
use thiserror::Error;

use crate::bridge::envelope::ErrorCode;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Availability {
    /// Host is mid-reset; requests wait for it to come back.
    Unavailable,
    /// Host can take a request and will eventually answer.
    Available,
    /// Server is terminating; no new work is accepted.
    ShuttingDown,
}

impl std::fmt::Display for Availability {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Availability::Unavailable => f.write_str("unavailable"),
            Availability::Available => f.write_str("available"),
            Availability::ShuttingDown => f.write_str("shutting_down"),
        }
    }
}

/// Why the bridge answered a request itself instead of forwarding the host reply.
///
/// Each failure is terminal for one request only.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum BridgeError {
    #[error("Timed out waiting for the host to become ready.")]
    ReadinessTimeout,

    #[error("Request processing timed out.")]
    ResponseTimeout,

    #[error("Server is shutting down.")]
    ShuttingDown,

    #[error("Request interrupted by host reset. Please retry.")]
    Interrupted,

    #[error("Internal error: Host handler panicked")]
    HostPanicked,
}

impl BridgeError {
    pub fn code(&self) -> ErrorCode {
        match self {
            BridgeError::HostPanicked => ErrorCode::InternalError,
            _ => ErrorCode::ServerError,
        }
    }

    /// Short label for logs and metrics.
    pub fn outcome(&self) -> &'static str {
        match self {
            BridgeError::ReadinessTimeout => "readiness_timeout",
            BridgeError::ResponseTimeout => "response_timeout",
            BridgeError::ShuttingDown => "shutting_down",
            BridgeError::Interrupted => "interrupted",
            BridgeError::HostPanicked => "host_panicked",
        }
    }
}
