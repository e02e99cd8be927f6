//! Reload-safe hand-off between the network side and the host.
//!
//! # Data Flow
//! ```text
//! http handler (blocking task)
//!     → id.rs (extract "id" for error envelopes)
//!     → mailbox.rs (wait for host, park request, wait for reply)
//!     → request.rs (IncomingRequest handed to the host, reply via Ticket)
//!     → envelope.rs (synthesized JSON-RPC errors)
//!
//! Host consumer:
//!     set_ready / register_handler → state.rs (Availability)
//!     take_pending_request / wait_for_request → respond
//! ```
//!
//! # Design Decisions
//! - One mailbox slot; concurrent callers queue on the mutex and condvar
//! - Event-driven wakeups instead of sleep polling
//! - Strategy (callback or polling) is configuration, not a separate type

pub mod envelope;
pub mod id;
pub mod mailbox;
pub mod request;
pub mod state;

pub use envelope::{error_envelope, ErrorCode};
pub use id::{extract_id, extract_id_with_cap, IdToken, DEFAULT_MAX_ID_LEN};
pub use mailbox::Bridge;
pub use request::{DeliveryOutcome, IncomingRequest, RequestHandler, Ticket};
pub use state::{Availability, BridgeError};
