//! One active exchange: identity, matching, and lifecycle flags.
//!
//! An [`ExchangeContext`] is one request/response conversation bound to a
//! transport session. Contexts live in the engine's fixed pool; this module
//! holds their per-conversation state and the pure matching predicate the
//! dispatch loop relies on.

use std::time::{Duration, Instant};

use filament_core::{PayloadHeader, SessionId};

use crate::delegate::DelegateHandle;

/// Stable identity of a pooled exchange context.
///
/// At most one open context exists per key at any time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ExchangeKey {
    pub session: SessionId,
    pub exchange_id: u16,
}

// ---------------------------------------------------------------------------
// Pure matching predicate
// ---------------------------------------------------------------------------

/// Whether an inbound message belongs to a context with the given identity.
///
/// A message matches when the session and exchange id agree **and** the
/// message's initiator flag is the negation of the context's: an initiator
/// context only accepts responder messages and vice versa. Without the flag
/// check, a node talking to itself (or a reflected message) could be routed
/// back into the exchange that sent it.
pub fn matches_inbound(
    ctx_session: SessionId,
    ctx_exchange_id: u16,
    ctx_initiator: bool,
    session: SessionId,
    header: &PayloadHeader,
) -> bool {
    session == ctx_session
        && header.exchange_id == ctx_exchange_id
        && header.flags.initiator != ctx_initiator
}

// ---------------------------------------------------------------------------
// ExchangeContext
// ---------------------------------------------------------------------------

/// One active conversation bound to a transport session.
///
/// The context holds the session *handle* only; the session manager governs
/// session lifetime, and the handle may name an already-expired session
/// (see [`ExchangeContext::is_session_expired`]).
pub struct ExchangeContext {
    exchange_id: u16,
    session: SessionId,
    initiator: bool,
    delegate: Option<DelegateHandle>,

    has_received_from_peer: bool,
    will_send: bool,
    session_expired: bool,

    response_timeout: Option<Duration>,
    response_due: Option<Instant>,
}

impl ExchangeContext {
    pub(crate) fn new(
        exchange_id: u16,
        session: SessionId,
        initiator: bool,
        delegate: Option<DelegateHandle>,
    ) -> Self {
        Self {
            exchange_id,
            session,
            initiator,
            delegate,
            has_received_from_peer: false,
            will_send: false,
            session_expired: false,
            response_timeout: None,
            response_due: None,
        }
    }

    pub fn key(&self) -> ExchangeKey {
        ExchangeKey {
            session: self.session,
            exchange_id: self.exchange_id,
        }
    }

    pub fn exchange_id(&self) -> u16 {
        self.exchange_id
    }

    pub fn session(&self) -> SessionId {
        self.session
    }

    /// Whether this side initiated the exchange.
    pub fn is_initiator(&self) -> bool {
        self.initiator
    }

    /// Whether the session under this exchange has expired.
    pub fn is_session_expired(&self) -> bool {
        self.session_expired
    }

    /// Whether the inbound message described by `header` belongs to this
    /// context.
    pub fn matches(&self, session: SessionId, header: &PayloadHeader) -> bool {
        matches_inbound(self.session, self.exchange_id, self.initiator, session, header)
    }

    // ------------------------------------------------------------------ //
    // Delegate management
    // ------------------------------------------------------------------ //

    pub fn delegate(&self) -> Option<&DelegateHandle> {
        self.delegate.as_ref()
    }

    pub fn set_delegate(&mut self, delegate: Option<DelegateHandle>) {
        self.delegate = delegate;
    }

    pub(crate) fn take_delegate(&mut self) -> Option<DelegateHandle> {
        self.delegate.take()
    }

    // ------------------------------------------------------------------ //
    // Lifecycle flags
    // ------------------------------------------------------------------ //

    /// Record that the peer has delivered a message to this context.
    ///
    /// Returns `true` the first time only; the reliability layer uses that
    /// edge to pick initial retransmit timing.
    pub(crate) fn mark_received_from_peer(&mut self) -> bool {
        let first = !self.has_received_from_peer;
        self.has_received_from_peer = true;
        first
    }

    pub fn has_received_from_peer(&self) -> bool {
        self.has_received_from_peer
    }

    pub(crate) fn mark_session_expired(&mut self) {
        self.session_expired = true;
    }

    /// Declare that a further message will be sent on this exchange.
    ///
    /// Keeps an unsolicited context open past its first dispatch and is the
    /// signal BDX facilitators raise after every received message.
    pub fn will_send_message(&mut self) {
        self.will_send = true;
    }

    pub fn will_send(&self) -> bool {
        self.will_send
    }

    // ------------------------------------------------------------------ //
    // Response timeout
    // ------------------------------------------------------------------ //

    /// Configure the response timeout armed by [`Self::note_message_sent`].
    pub fn set_response_timeout(&mut self, timeout: Option<Duration>) {
        self.response_timeout = timeout;
        if timeout.is_none() {
            self.response_due = None;
        }
    }

    /// Record that a message expecting a response was sent at `now`.
    ///
    /// Arms the response deadline when a timeout is configured and clears
    /// the pending-send flag.
    pub fn note_message_sent(&mut self, now: Instant) {
        self.will_send = false;
        if let Some(timeout) = self.response_timeout {
            self.response_due = Some(now + timeout);
        }
    }

    /// Cancel any armed response deadline (a response arrived).
    pub fn clear_response_deadline(&mut self) {
        self.response_due = None;
    }

    /// Whether the response deadline has passed at `now`.
    pub fn is_response_overdue(&self, now: Instant) -> bool {
        matches!(self.response_due, Some(due) if now >= due)
    }
}

impl std::fmt::Debug for ExchangeContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExchangeContext")
            .field("exchange_id", &self.exchange_id)
            .field("session", &self.session)
            .field("initiator", &self.initiator)
            .field("has_received_from_peer", &self.has_received_from_peer)
            .finish_non_exhaustive()
    }
}
