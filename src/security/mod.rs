//! Security subsystem.
//!
//! # Data Flow
//! ```text
//! ProxyServer setters / config file
//!     → settings.rs (bind address, API key, TLS material snapshot)
//!     → start: net::tls validates material, auth.rs builds AuthState
//!
//! Incoming request:
//!     → auth.rs (bearer check, 401 on mismatch)
//!     → http handler
//! ```
//!
//! # Design Decisions
//! - Fail closed: a configured key is required on every non-preflight request
//! - Same policy for both delivery strategies

pub mod auth;
pub mod settings;

pub use auth::{bearer_auth_middleware, AuthState};
pub use settings::{SecuritySettings, TlsMaterial};
