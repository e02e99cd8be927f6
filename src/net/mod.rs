//! Network layer subsystem.
//!
//! # Data Flow
//! ```text
//! ProxyServer::start
//!     → listener.rs (resolve + bind synchronously, classify failures)
//!     → tls.rs (optional: validate PEM, build rustls acceptor)
//!     → http::HttpServer serves on the bound socket
//! ```
//!
//! # Design Decisions
//! - Bind happens on the caller's thread so errors are returned, not logged
//! - TLS is optional and gated by the `tls` cargo feature

pub mod listener;
pub mod tls;

pub use listener::{bind, ListenerError};
pub use tls::{load_server_tls, tls_supported, validate_pem, ServerTls, TlsError};
