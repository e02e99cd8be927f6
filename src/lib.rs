//! Reload-safe HTTP/JSON-RPC bridge.
//!
//! An HTTP listener that keeps accepting JSON-RPC calls while the host that
//! answers them resets itself. Requests wait for the host to come back,
//! in-flight requests are failed fast on a reset, and late replies never
//! reach the wrong caller.

// Core subsystems
pub mod bridge;
pub mod config;
pub mod http;
pub mod net;

// Cross-cutting concerns
pub mod lifecycle;
pub mod observability;
pub mod security;

pub use bridge::{Availability, Bridge, DeliveryOutcome, IncomingRequest, RequestHandler, Ticket};
pub use config::schema::{DeliveryStrategy, ProxyConfig};
pub use lifecycle::{ProxyServer, ServerStatus, StartError, StartOutcome, StopOutcome};
pub use net::tls_supported;
