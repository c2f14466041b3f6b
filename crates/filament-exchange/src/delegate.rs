//! Delegate traits: the capability seams between the engine and the layers
//! above and beside it.
//!
//! Delegates are held as `Rc<RefCell<_>>` handles. The core is
//! single-threaded by design (see the crate docs), and `Rc::ptr_eq` gives
//! the delegate identity that [`crate::ExchangeManager::close_all_for_delegate`]
//! needs during orderly teardown of a higher-level component.

use std::cell::RefCell;
use std::rc::Rc;
use std::time::Instant;

use filament_core::{PayloadHeader, SessionId};

use crate::context::ExchangeContext;
use crate::error::ExchangeError;

/// Shared handle to an exchange delegate.
pub type DelegateHandle = Rc<RefCell<dyn ExchangeDelegate>>;

/// Receiver of messages and lifecycle events for one or more exchanges.
///
/// Implemented by concrete consumers of the exchange layer: the BDX
/// transfer facilitators, command handlers, and so on.
pub trait ExchangeDelegate {
    /// A message arrived on an exchange this delegate is bound to.
    ///
    /// Errors are logged by the engine and not propagated further: the
    /// original caller is the transport receive loop, which cannot act on a
    /// per-exchange failure.
    fn on_message_received(
        &mut self,
        ctx: &mut ExchangeContext,
        header: &PayloadHeader,
        payload: &[u8],
        now: Instant,
    ) -> Result<(), ExchangeError>;

    /// The exchange's response timeout elapsed. The engine closes the
    /// context after this returns.
    fn on_response_timeout(&mut self, ctx: &mut ExchangeContext);

    /// The transport session under the exchange expired. The context stays
    /// in the pool; releasing it remains this delegate's responsibility.
    fn on_session_expired(&mut self, _ctx: &mut ExchangeContext) {}
}

/// Stack-wide observer of connection lifecycle events, forwarded from the
/// session manager through the engine.
pub trait SessionLifecycleDelegate {
    fn on_new_session(&mut self, session: SessionId);
    fn on_session_expired(&mut self, session: SessionId);
}
