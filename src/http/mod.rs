//! HTTP protocol handling subsystem.
//!
//! # Data Flow
//! ```text
//! TCP/TLS connection (axum-server)
//!     → server.rs (router, request id, trace, CORS)
//!     → security::auth (bearer check)
//!     → handler.rs (method, size, body checks)
//!     → bridge::Bridge::handle_request on the blocking pool
//!     → JSON-RPC envelope back to the client
//! ```

pub mod cors;
pub mod handler;
pub mod server;

pub use handler::AppState;
pub use server::{build_router, HttpServer};
