//! Reload-safe single-slot mailbox.
//!
//! The network side parks one request at a time here and blocks until the
//! host answers, the host goes away, the server stops, or the timeout hits.
//! All shared state lives behind one mutex; every change that a waiter could
//! care about (readiness, reply delivered, slot vacated, shutdown) is followed
//! by a condvar broadcast, so waits end as soon as their outcome is decided.
//!
//! # Hand-off
//! ```text
//! network thread                       host consumer
//! ──────────────                       ─────────────
//! wait: slot free && host ready
//! park request (ticket, epoch)   ──▶   take_pending_request / handler call
//! wait: reply for ticket               deliver_response(ticket, reply)
//!       | epoch changed → Interrupted
//!       | shutting down → ShuttingDown
//!       | deadline → ResponseTimeout
//! vacate slot, wake next caller
//! ```

use std::panic::{self, AssertUnwindSafe};
use std::sync::{Arc, Weak};
use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex, MutexGuard};

use crate::bridge::envelope::{self, ErrorCode};
use crate::bridge::id::{extract_id_with_cap, IdToken};
use crate::bridge::request::{DeliveryOutcome, IncomingRequest, RequestHandler, Ticket};
use crate::bridge::state::{Availability, BridgeError};
use crate::config::{BridgeConfig, DeliveryStrategy};
use crate::observability::metrics;

struct RequestSlot {
    ticket: Ticket,
    /// Readiness epoch at hand-off. A reply is only accepted within it.
    epoch: u64,
    id: IdToken,
    body: Arc<str>,
    claimed: bool,
}

struct ResponseSlot {
    ticket: Ticket,
    body: String,
}

struct Mailbox {
    availability: Availability,
    /// Set by unload; readiness transitions are ignored from then on.
    sealed: bool,
    handler: Option<Arc<dyn RequestHandler>>,
    /// A caller owns the mailbox, from slot acquisition until it replies.
    occupied: bool,
    /// Bumped every time the host stops being available.
    epoch: u64,
    next_ticket: u64,
    request: Option<RequestSlot>,
    response: Option<ResponseSlot>,
}

impl Mailbox {
    fn new() -> Self {
        Self {
            availability: Availability::Unavailable,
            sealed: false,
            handler: None,
            occupied: false,
            epoch: 0,
            next_ticket: 1,
            request: None,
            response: None,
        }
    }

    fn host_ready(&self, strategy: DeliveryStrategy) -> bool {
        self.availability == Availability::Available
            && (strategy == DeliveryStrategy::Polling || self.handler.is_some())
    }

    fn issue_ticket(&mut self) -> Ticket {
        let ticket = Ticket::new(self.next_ticket);
        self.next_ticket += 1;
        ticket
    }

    fn take_response(&mut self, ticket: Ticket) -> Option<String> {
        if self.response.as_ref().is_some_and(|r| r.ticket == ticket) {
            self.response.take().map(|r| r.body)
        } else {
            None
        }
    }

    /// Leave `Available`: invalidate the in-flight hand-off and drop any
    /// prepared reply so it cannot answer a later request.
    fn revoke(&mut self, next: Availability) {
        self.epoch += 1;
        self.response = None;
        self.availability = next;
    }
}

/// The reload-safe request/response bridge.
pub struct Bridge {
    config: BridgeConfig,
    mailbox: Mutex<Mailbox>,
    signal: Condvar,
    this: Weak<Bridge>,
}

impl Bridge {
    pub fn new(config: BridgeConfig) -> Arc<Self> {
        Arc::new_cyclic(|this| Self {
            config,
            mailbox: Mutex::new(Mailbox::new()),
            signal: Condvar::new(),
            this: this.clone(),
        })
    }

    pub fn config(&self) -> &BridgeConfig {
        &self.config
    }

    // ---- network side -------------------------------------------------

    /// Run one request through the bridge and return the envelope to send.
    ///
    /// Always returns exactly one envelope: the host reply, or an error
    /// envelope echoing the request id.
    pub fn handle_request(&self, body: &str) -> String {
        let started = Instant::now();
        let id = extract_id_with_cap(body.as_bytes(), self.config.max_id_len);

        if body.len() > self.config.max_request_bytes {
            metrics::record_bridge_outcome("too_large", started);
            return envelope::error_envelope(
                ErrorCode::InvalidRequest,
                envelope::REQUEST_TOO_LARGE,
                &IdToken::Null,
            );
        }

        match self.exchange(body, &id) {
            Ok(reply) => {
                tracing::debug!(
                    id = %id,
                    elapsed_ms = started.elapsed().as_millis() as u64,
                    "Host answered request"
                );
                metrics::record_bridge_outcome("answered", started);
                reply
            }
            Err(err) => {
                tracing::warn!(id = %id, outcome = err.outcome(), "{}", err);
                metrics::record_bridge_outcome(err.outcome(), started);
                envelope::error_envelope(err.code(), &err.to_string(), &id)
            }
        }
    }

    fn exchange(&self, body: &str, id: &IdToken) -> Result<String, BridgeError> {
        let strategy = self.config.strategy;
        let timeout = self.config.request_timeout();

        let mut mailbox = self.mailbox.lock();
        self.acquire(&mut mailbox, strategy, deadline_after(timeout))?;

        let ticket = mailbox.issue_ticket();
        let epoch = mailbox.epoch;
        let body: Arc<str> = Arc::from(body);
        mailbox.occupied = true;
        mailbox.response = None;
        mailbox.request = Some(RequestSlot {
            ticket,
            epoch,
            id: id.clone(),
            body: Arc::clone(&body),
            claimed: strategy == DeliveryStrategy::Callback,
        });
        tracing::trace!(ticket = %ticket, strategy = %strategy, "Request parked in mailbox");

        let result = match strategy {
            DeliveryStrategy::Polling => {
                self.signal.notify_all();
                self.await_reply(&mut mailbox, ticket, epoch, deadline_after(timeout))
            }
            DeliveryStrategy::Callback => self.invoke_handler(&mut mailbox, ticket, body),
        };

        mailbox.request = None;
        mailbox.response = None;
        mailbox.occupied = false;
        drop(mailbox);
        self.signal.notify_all();
        result
    }

    /// Wait for an empty mailbox and a ready host.
    fn acquire(
        &self,
        mailbox: &mut MutexGuard<'_, Mailbox>,
        strategy: DeliveryStrategy,
        deadline: Option<Instant>,
    ) -> Result<(), BridgeError> {
        let mut announced = false;
        loop {
            if mailbox.availability == Availability::ShuttingDown {
                return Err(BridgeError::ShuttingDown);
            }
            if !mailbox.occupied && mailbox.host_ready(strategy) {
                return Ok(());
            }
            if !announced && !mailbox.host_ready(strategy) {
                tracing::info!("Host unavailable, holding request until it returns");
                announced = true;
            }
            if !self.park(mailbox, deadline) {
                return Err(BridgeError::ReadinessTimeout);
            }
        }
    }

    fn await_reply(
        &self,
        mailbox: &mut MutexGuard<'_, Mailbox>,
        ticket: Ticket,
        epoch: u64,
        deadline: Option<Instant>,
    ) -> Result<String, BridgeError> {
        loop {
            if let Some(reply) = mailbox.take_response(ticket) {
                return Ok(reply);
            }
            if mailbox.availability == Availability::ShuttingDown {
                return Err(BridgeError::ShuttingDown);
            }
            if mailbox.epoch != epoch {
                return Err(BridgeError::Interrupted);
            }
            if !self.park(mailbox, deadline) {
                return Err(BridgeError::ResponseTimeout);
            }
        }
    }

    fn invoke_handler(
        &self,
        mailbox: &mut MutexGuard<'_, Mailbox>,
        ticket: Ticket,
        body: Arc<str>,
    ) -> Result<String, BridgeError> {
        let Some(handler) = mailbox.handler.clone() else {
            return Err(BridgeError::Interrupted);
        };
        let request = IncomingRequest::new(ticket, body, self.this.clone());

        let call = MutexGuard::unlocked(mailbox, || {
            panic::catch_unwind(AssertUnwindSafe(|| handler.handle(request)))
        });

        if let Some(reply) = mailbox.take_response(ticket) {
            return Ok(reply);
        }
        if call.is_err() {
            tracing::error!(ticket = %ticket, "Host handler panicked");
            return Err(BridgeError::HostPanicked);
        }
        if mailbox.availability == Availability::ShuttingDown {
            return Err(BridgeError::ShuttingDown);
        }
        Err(BridgeError::Interrupted)
    }

    // ---- host side ----------------------------------------------------

    /// Claim the parked request, if there is one the host has not seen yet.
    pub fn take_pending_request(&self) -> Option<IncomingRequest> {
        let mut mailbox = self.mailbox.lock();
        self.claim(&mut mailbox)
    }

    /// Block up to `timeout` for a request to claim. `Duration::MAX` waits
    /// until one arrives.
    pub fn wait_for_request(&self, timeout: Duration) -> Option<IncomingRequest> {
        let deadline = deadline_after(timeout);
        let mut mailbox = self.mailbox.lock();
        loop {
            if let Some(request) = self.claim(&mut mailbox) {
                return Some(request);
            }
            if !self.park(&mut mailbox, deadline) {
                return None;
            }
        }
    }

    /// Sleep until notified; false once `deadline` has passed.
    fn park(&self, mailbox: &mut MutexGuard<'_, Mailbox>, deadline: Option<Instant>) -> bool {
        match deadline {
            Some(deadline) if Instant::now() >= deadline => false,
            Some(deadline) => {
                self.signal.wait_until(mailbox, deadline);
                true
            }
            None => {
                self.signal.wait(mailbox);
                true
            }
        }
    }

    fn claim(&self, mailbox: &mut Mailbox) -> Option<IncomingRequest> {
        if mailbox.availability != Availability::Available {
            return None;
        }
        let epoch = mailbox.epoch;
        let slot = mailbox
            .request
            .as_mut()
            .filter(|slot| !slot.claimed && slot.epoch == epoch)?;
        slot.claimed = true;
        Some(IncomingRequest::new(
            slot.ticket,
            Arc::clone(&slot.body),
            self.this.clone(),
        ))
    }

    /// Hand the host's reply for `ticket` to the waiting connection.
    ///
    /// Replies for a request that is no longer waiting are discarded. Empty
    /// or oversized replies are replaced by an internal-error envelope that
    /// echoes the request id.
    pub fn deliver_response(&self, ticket: Ticket, reply: impl Into<String>) -> DeliveryOutcome {
        let reply = reply.into();
        let mut mailbox = self.mailbox.lock();

        let epoch = mailbox.epoch;
        let waiting_id = mailbox
            .request
            .as_ref()
            .filter(|slot| slot.ticket == ticket && slot.epoch == epoch)
            .map(|slot| slot.id.clone());
        let Some(id) = waiting_id.filter(|_| mailbox.response.is_none()) else {
            drop(mailbox);
            tracing::debug!(ticket = %ticket, "Discarding reply for a request that is no longer waiting");
            metrics::record_late_reply();
            return DeliveryOutcome::Discarded;
        };

        let (body, outcome) = if reply.is_empty() {
            let body = envelope::error_envelope(ErrorCode::InternalError, envelope::EMPTY_RESPONSE, &id);
            (body, DeliveryOutcome::Replaced)
        } else if reply.len() > self.config.max_response_bytes {
            tracing::warn!(
                ticket = %ticket,
                size = reply.len(),
                limit = self.config.max_response_bytes,
                "Host reply exceeds response limit"
            );
            let body =
                envelope::error_envelope(ErrorCode::InternalError, envelope::RESPONSE_TOO_LARGE, &id);
            (body, DeliveryOutcome::Replaced)
        } else {
            (reply, DeliveryOutcome::Delivered)
        };

        mailbox.response = Some(ResponseSlot { ticket, body });
        drop(mailbox);
        self.signal.notify_all();
        outcome
    }

    /// Mark the host ready (`true`) or about to reset (`false`).
    ///
    /// Ignored while shutting down. Returns the resulting state.
    pub fn set_ready(&self, ready: bool) -> Availability {
        let mut mailbox = self.mailbox.lock();
        self.transition(&mut mailbox, ready)
    }

    /// Install or remove the callback-strategy handler.
    ///
    /// Registering makes the host available, deregistering makes it
    /// unavailable. Ignored while shutting down.
    pub fn register_handler(&self, handler: Option<Arc<dyn RequestHandler>>) -> Availability {
        let mut mailbox = self.mailbox.lock();
        if mailbox.sealed || mailbox.availability == Availability::ShuttingDown {
            tracing::warn!("Ignoring handler registration while shutting down");
            return mailbox.availability;
        }
        let ready = handler.is_some();
        mailbox.handler = handler;
        self.transition(&mut mailbox, ready)
    }

    fn transition(&self, mailbox: &mut MutexGuard<'_, Mailbox>, ready: bool) -> Availability {
        if mailbox.sealed || mailbox.availability == Availability::ShuttingDown {
            tracing::warn!(ready, "Ignoring readiness change while shutting down");
            return mailbox.availability;
        }

        match (ready, mailbox.availability) {
            (true, Availability::Unavailable) => {
                mailbox.availability = Availability::Available;
                tracing::info!("Host available");
            }
            (false, Availability::Available) => {
                mailbox.revoke(Availability::Unavailable);
                tracing::info!(pending = mailbox.request.is_some(), "Host unavailable");
            }
            (false, _) => mailbox.response = None,
            _ => {}
        }

        let now = mailbox.availability;
        metrics::record_host_ready(mailbox.host_ready(self.config.strategy));
        self.signal.notify_all();
        now
    }

    // ---- lifecycle ----------------------------------------------------

    /// Prepare for a new listener. Returns `false` once unloaded.
    pub(crate) fn open(&self) -> bool {
        let mut mailbox = self.mailbox.lock();
        if mailbox.sealed {
            return false;
        }
        if mailbox.availability == Availability::ShuttingDown {
            mailbox.availability = Availability::Unavailable;
        }
        true
    }

    /// Enter `ShuttingDown`, drop the handler and wake every waiter.
    pub(crate) fn close(&self) {
        let mut mailbox = self.mailbox.lock();
        mailbox.handler = None;
        mailbox.revoke(Availability::ShuttingDown);
        drop(mailbox);
        metrics::record_host_ready(false);
        self.signal.notify_all();
    }

    /// Close permanently; later readiness changes and restarts are refused.
    pub(crate) fn seal(&self) {
        self.mailbox.lock().sealed = true;
        self.close();
    }

    // ---- queries ------------------------------------------------------

    pub fn availability(&self) -> Availability {
        self.mailbox.lock().availability
    }

    /// Whether a new request would be handed to the host right away.
    pub fn is_ready(&self) -> bool {
        self.mailbox.lock().host_ready(self.config.strategy)
    }

    /// Whether a request is parked and not yet claimed by the host.
    pub fn has_pending_request(&self) -> bool {
        let mailbox = self.mailbox.lock();
        mailbox
            .request
            .as_ref()
            .is_some_and(|slot| !slot.claimed && slot.epoch == mailbox.epoch)
    }

    pub fn is_sealed(&self) -> bool {
        self.mailbox.lock().sealed
    }
}

/// `None` when the timeout is too large to represent; callers wait unbounded.
fn deadline_after(timeout: Duration) -> Option<Instant> {
    Instant::now().checked_add(timeout)
}
