//! Configuration management subsystem.
//!
//! # Data Flow
//! ```text
//! config file (TOML)
//!     → loader.rs (parse & deserialize)
//!     → validation.rs (semantic checks)
//!     → ProxyConfig (validated, immutable)
//!     → ProxyServer::new seeds the security settings and bridge limits
//! ```
//!
//! # Design Decisions
//! - All fields have defaults to allow minimal configs
//! - Validation separates syntactic (serde) from semantic checks
//! - Runtime setters on `ProxyServer` take effect at the next start

pub mod loader;
pub mod schema;
pub mod validation;

pub use loader::{load_config, load_tls_material, parse_config, ConfigError};
pub use schema::{
    BridgeConfig, DeliveryStrategy, LifecycleConfig, ListenerConfig, ObservabilityConfig,
    ProxyConfig, SecurityConfig, TlsConfig,
};
pub use validation::{validate_config, ValidationError};
