//! What the host consumer sees: a request handed over from the network side,
//! and the ticket that routes its reply back.

use std::fmt;
use std::sync::{Arc, Weak};

use crate::bridge::mailbox::Bridge;

/// Identifies one trip through the mailbox.
///
/// Tickets increase monotonically, so a reply carrying an old ticket can never
/// be mistaken for the answer to a newer request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Ticket(u64);

impl Ticket {
    pub(crate) fn new(value: u64) -> Self {
        Self(value)
    }

    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for Ticket {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "req-{}", self.0)
    }
}

/// Result of handing a reply to the bridge.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeliveryOutcome {
    /// The waiting connection will receive this reply.
    Delivered,
    /// The reply was empty or oversized and an error envelope was sent instead.
    Replaced,
    /// Nobody is waiting for this ticket any more (timed out, reset or stopped).
    Discarded,
}

/// A request the host must answer exactly once.
#[derive(Debug, Clone)]
pub struct IncomingRequest {
    ticket: Ticket,
    body: Arc<str>,
    bridge: Weak<Bridge>,
}

impl IncomingRequest {
    pub(crate) fn new(ticket: Ticket, body: Arc<str>, bridge: Weak<Bridge>) -> Self {
        Self {
            ticket,
            body,
            bridge,
        }
    }

    pub fn ticket(&self) -> Ticket {
        self.ticket
    }

    /// The raw JSON-RPC envelope as received.
    pub fn body(&self) -> &str {
        &self.body
    }

    /// Send the reply for this request.
    pub fn respond(self, reply: impl Into<String>) -> DeliveryOutcome {
        match self.bridge.upgrade() {
            Some(bridge) => bridge.deliver_response(self.ticket, reply),
            None => DeliveryOutcome::Discarded,
        }
    }
}

/// Host code invoked directly by the network side in the callback strategy.
///
/// The call blocks the request it serves. The handler must call
/// [`IncomingRequest::respond`] before returning; a request that returns
/// without a reply is answered with an "interrupted, please retry" error.
pub trait RequestHandler: Send + Sync {
    fn handle(&self, request: IncomingRequest);
}

impl<F> RequestHandler for F
where
    F: Fn(IncomingRequest) + Send + Sync,
{
    fn handle(&self, request: IncomingRequest) {
        self(request)
    }
}
