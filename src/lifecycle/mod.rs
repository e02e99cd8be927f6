//! Lifecycle management subsystem.
//!
//! # Data Flow
//! ```text
//! Start (controller.rs):
//!     Snapshot settings → Validate TLS → Bind → Open bridge → Spawn poll thread
//!
//! Stop (controller.rs + shutdown.rs):
//!     Close bridge (wake waiters) → Graceful signal → Drain → Join → Port free
//!
//! Unload:
//!     Seal bridge → Immediate signal → Bounded wait → Detach
//! ```
//!
//! # Design Decisions
//! - Shutdown has a deadline: graceful drain is bounded by the configured grace
//! - The poll thread holds only a weak reference to the bridge

pub mod controller;
pub mod shutdown;

pub use controller::{
    process_id, version, ProxyServer, ServerStatus, StartError, StartOutcome, StopOutcome,
};
pub use shutdown::{Shutdown, ShutdownMode};
