//! Configuration schema definitions.
//!
//! All types derive Serde traits for deserialization from TOML files. Every
//! section is optional; missing fields take the defaults below.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Root configuration for the proxy.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct ProxyConfig {
    /// Listener configuration (bind address, port, TLS files).
    pub listener: ListenerConfig,

    /// Bearer-token settings.
    pub security: SecurityConfig,

    /// Mailbox limits, timeout and delivery strategy.
    pub bridge: BridgeConfig,

    /// Stop and unload grace periods.
    pub lifecycle: LifecycleConfig,

    /// Logging and metrics.
    pub observability: ObservabilityConfig,
}

/// Listener configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ListenerConfig {
    /// IP address or host name to bind (e.g., "127.0.0.1", "0.0.0.0").
    pub bind_address: String,

    /// TCP port. `0` picks an ephemeral port.
    pub port: u16,

    /// Optional TLS material. Both files must be present to enable TLS.
    pub tls: Option<TlsConfig>,
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            bind_address: "127.0.0.1".to_string(),
            port: 8080,
            tls: None,
        }
    }
}

/// TLS configuration for the listener.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct TlsConfig {
    /// Path to certificate file (PEM).
    pub cert_path: String,

    /// Path to private key file (PEM).
    pub key_path: String,
}

/// Security configuration.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct SecurityConfig {
    /// API key expected as `Authorization: Bearer <key>`. Empty disables auth.
    pub api_key: String,
}

/// How a request reaches the host consumer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum DeliveryStrategy {
    /// The network side invokes a registered handler and blocks on it.
    Callback,
    /// The request is parked in the mailbox until the host picks it up.
    #[default]
    Polling,
}

impl std::fmt::Display for DeliveryStrategy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DeliveryStrategy::Callback => f.write_str("callback"),
            DeliveryStrategy::Polling => f.write_str("polling"),
        }
    }
}

/// Bridge configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct BridgeConfig {
    pub strategy: DeliveryStrategy,

    /// Bound on each wait (host readiness, then host reply) in milliseconds.
    pub request_timeout_ms: u64,

    /// Largest accepted request body in bytes.
    pub max_request_bytes: usize,

    /// Largest reply forwarded from the host in bytes.
    pub max_response_bytes: usize,

    /// Cap on the raw text of an echoed request id.
    pub max_id_len: usize,
}

impl BridgeConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            strategy: DeliveryStrategy::Polling,
            request_timeout_ms: 30_000,
            max_request_bytes: 256 * 1024,
            max_response_bytes: 256 * 1024,
            max_id_len: crate::bridge::id::DEFAULT_MAX_ID_LEN,
        }
    }
}

/// Lifecycle configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct LifecycleConfig {
    /// How long `stop` lets in-flight connections finish.
    pub shutdown_grace_ms: u64,

    /// How long `unload` waits for the poll thread to release the socket.
    pub unload_grace_ms: u64,
}

impl LifecycleConfig {
    pub fn shutdown_grace(&self) -> Duration {
        Duration::from_millis(self.shutdown_grace_ms)
    }

    pub fn unload_grace(&self) -> Duration {
        Duration::from_millis(self.unload_grace_ms)
    }
}

impl Default for LifecycleConfig {
    fn default() -> Self {
        Self {
            shutdown_grace_ms: 2_000,
            unload_grace_ms: 100,
        }
    }
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,

    /// Enable the Prometheus metrics endpoint.
    pub metrics_enabled: bool,

    /// Metrics endpoint bind address.
    pub metrics_address: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            metrics_enabled: false,
            metrics_address: "127.0.0.1:9090".to_string(),
        }
    }
}
