//! Test doubles for exchange-layer consumers.
//!
//! Used by this crate's own tests and by higher layers (BDX) that need a
//! scriptable delegate without standing up a real application component.

use std::cell::RefCell;
use std::rc::Rc;
use std::time::Instant;

use filament_core::{PayloadHeader, SessionId};

use crate::context::ExchangeContext;
use crate::delegate::{DelegateHandle, ExchangeDelegate, SessionLifecycleDelegate};
use crate::error::ExchangeError;
use crate::reliability::ReliabilityLayer;

/// A delegate that records every callback it receives.
#[derive(Debug, Default)]
pub struct RecordingDelegate {
    /// `(exchange_id, message_type, payload)` per received message.
    pub received: Vec<(u16, u8, Vec<u8>)>,
    /// Exchange ids that hit their response timeout.
    pub timeouts: Vec<u16>,
    /// Exchange ids whose session expired.
    pub session_expired: Vec<u16>,
    /// When set, `on_message_received` calls `will_send_message` on the
    /// context, keeping unsolicited contexts open.
    pub will_send_on_receive: bool,
    /// When set, `on_message_received` returns an error.
    pub fail_on_receive: bool,
}

impl RecordingDelegate {
    /// A fresh delegate and its type-erased handle, for tests that need to
    /// inspect the recording afterwards.
    pub fn new_pair() -> (Rc<RefCell<Self>>, DelegateHandle) {
        let concrete = Rc::new(RefCell::new(Self::default()));
        let handle: DelegateHandle = concrete.clone();
        (concrete, handle)
    }

    /// A fresh type-erased handle when the recording is not needed.
    pub fn handle() -> DelegateHandle {
        Self::new_pair().1
    }
}

impl ExchangeDelegate for RecordingDelegate {
    fn on_message_received(
        &mut self,
        ctx: &mut ExchangeContext,
        header: &PayloadHeader,
        payload: &[u8],
        _now: Instant,
    ) -> Result<(), ExchangeError> {
        self.received
            .push((ctx.exchange_id(), header.message_type, payload.to_vec()));
        if self.will_send_on_receive {
            ctx.will_send_message();
        }
        if self.fail_on_receive {
            return Err(ExchangeError::DelegateRejected("scripted failure".into()));
        }
        Ok(())
    }

    fn on_response_timeout(&mut self, ctx: &mut ExchangeContext) {
        self.timeouts.push(ctx.exchange_id());
    }

    fn on_session_expired(&mut self, ctx: &mut ExchangeContext) {
        self.session_expired.push(ctx.exchange_id());
    }
}

/// A stack-wide lifecycle delegate that records session events.
#[derive(Debug, Default)]
pub struct RecordingLifecycle {
    pub new_sessions: Vec<SessionId>,
    pub expired_sessions: Vec<SessionId>,
}

impl RecordingLifecycle {
    pub fn new_pair() -> (
        Rc<RefCell<Self>>,
        Rc<RefCell<dyn SessionLifecycleDelegate>>,
    ) {
        let concrete = Rc::new(RefCell::new(Self::default()));
        let handle: Rc<RefCell<dyn SessionLifecycleDelegate>> = concrete.clone();
        (concrete, handle)
    }
}

impl SessionLifecycleDelegate for RecordingLifecycle {
    fn on_new_session(&mut self, session: SessionId) {
        self.new_sessions.push(session);
    }

    fn on_session_expired(&mut self, session: SessionId) {
        self.expired_sessions.push(session);
    }
}

/// A reliability layer that records every traffic observation.
///
/// The engine takes the layer by value, so the observation log is shared
/// out through an `Rc` the test keeps.
pub struct RecordingReliability {
    log: Rc<RefCell<Vec<(SessionId, bool)>>>,
}

impl RecordingReliability {
    /// The layer plus a shared view of its `(session, first_from_peer)` log.
    pub fn new_pair() -> (Self, Rc<RefCell<Vec<(SessionId, bool)>>>) {
        let log = Rc::new(RefCell::new(Vec::new()));
        (Self { log: Rc::clone(&log) }, log)
    }
}

impl ReliabilityLayer for RecordingReliability {
    fn init(&mut self) -> Result<(), ExchangeError> {
        Ok(())
    }

    fn shutdown(&mut self) {}

    fn on_exchange_traffic(
        &mut self,
        session: SessionId,
        _header: &filament_core::PayloadHeader,
        first_from_peer: bool,
    ) {
        self.log.borrow_mut().push((session, first_from_peer));
    }
}
