//! The exchange engine: context pool ownership and inbound dispatch.
//!
//! [`ExchangeManager`] owns a fixed-capacity pool of exchange contexts and
//! the unsolicited-handler table. Every inbound transport message is routed
//! to exactly one consumer: the first matching open context, a context
//! freshly minted for an unsolicited message, or a logged drop. Malformed or
//! unroutable messages never propagate an error back to the transport — a
//! busy radio link routinely delivers noise, and the receive loop cannot act
//! on a per-exchange failure anyway.

use std::rc::Rc;
use std::time::Instant;

use filament_core::{NodeId, PacketHeader, PayloadHeader, ProtocolId, SessionId};

use crate::config::EngineConfig;
use crate::context::{ExchangeContext, ExchangeKey};
use crate::delegate::{DelegateHandle, SessionLifecycleDelegate};
use crate::error::ExchangeError;
use crate::handler_table::HandlerTable;
use crate::reliability::ReliabilityLayer;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum EngineState {
    NotInitialized,
    Initialized,
}

impl EngineState {
    fn name(self) -> &'static str {
        match self {
            Self::NotInitialized => "NotInitialized",
            Self::Initialized => "Initialized",
        }
    }
}

/// The exchange engine.
pub struct ExchangeManager {
    state: EngineState,
    pool: Vec<Option<ExchangeContext>>,
    handlers: HandlerTable,
    next_exchange_id: u16,
    /// Fixed seed for the exchange-id counter; `None` seeds randomly at init.
    counter_seed: Option<u16>,
    reliability: Box<dyn ReliabilityLayer>,
    lifecycle_delegate: Option<Rc<std::cell::RefCell<dyn SessionLifecycleDelegate>>>,
}

impl ExchangeManager {
    /// Create an engine in the `NotInitialized` state.
    pub fn new(config: EngineConfig, reliability: Box<dyn ReliabilityLayer>) -> Self {
        let mut pool = Vec::with_capacity(config.exchange_pool_capacity);
        pool.resize_with(config.exchange_pool_capacity, || None);
        Self {
            state: EngineState::NotInitialized,
            pool,
            handlers: HandlerTable::new(config.handler_table_capacity),
            next_exchange_id: 0,
            counter_seed: None,
            reliability,
            lifecycle_delegate: None,
        }
    }

    /// Create an engine whose exchange-id counter starts at `seed` instead
    /// of a random value. For deterministic tests.
    pub fn with_seed(
        config: EngineConfig,
        reliability: Box<dyn ReliabilityLayer>,
        seed: u16,
    ) -> Self {
        let mut engine = Self::new(config, reliability);
        engine.counter_seed = Some(seed);
        engine
    }

    /// Set the stack-wide connection-lifecycle delegate.
    pub fn set_lifecycle_delegate(
        &mut self,
        delegate: Option<Rc<std::cell::RefCell<dyn SessionLifecycleDelegate>>>,
    ) {
        self.lifecycle_delegate = delegate;
    }

    // ------------------------------------------------------------------ //
    // Lifecycle
    // ------------------------------------------------------------------ //

    /// Initialize the engine: reset the handler table, seed the exchange-id
    /// counter, and bring up the reliability subsystem.
    pub fn init(&mut self) -> Result<(), ExchangeError> {
        if self.state == EngineState::Initialized {
            return Err(ExchangeError::IncorrectState {
                expected: "NotInitialized",
                actual: self.state.name(),
            });
        }
        self.handlers.reset();
        self.next_exchange_id = self.counter_seed.unwrap_or_else(rand::random::<u16>);
        self.reliability.init()?;
        self.state = EngineState::Initialized;
        tracing::info!(seed = self.next_exchange_id, "exchange engine initialized");
        Ok(())
    }

    /// Tear the engine down.
    ///
    /// # Panics
    ///
    /// Panics if any exchange context is still open: owners must close
    /// their exchanges before shutting the engine down. A non-empty pool
    /// here is a programming-contract violation, not a recoverable error.
    pub fn shutdown(&mut self) -> Result<(), ExchangeError> {
        if self.state != EngineState::Initialized {
            return Err(ExchangeError::IncorrectState {
                expected: "Initialized",
                actual: self.state.name(),
            });
        }
        self.reliability.shutdown();

        let leaked = self.pool.iter().filter(|slot| slot.is_some()).count();
        assert!(
            leaked == 0,
            "exchange pool not drained at shutdown: {leaked} contexts still open"
        );

        self.handlers.reset();
        self.state = EngineState::NotInitialized;
        tracing::info!("exchange engine shut down");
        Ok(())
    }

    fn require_initialized(&self) -> Result<(), ExchangeError> {
        if self.state != EngineState::Initialized {
            return Err(ExchangeError::IncorrectState {
                expected: "Initialized",
                actual: self.state.name(),
            });
        }
        Ok(())
    }

    // ------------------------------------------------------------------ //
    // Context pool
    // ------------------------------------------------------------------ //

    /// Allocate a new initiator-side exchange on `session`.
    pub fn new_context(
        &mut self,
        session: SessionId,
        delegate: DelegateHandle,
    ) -> Result<ExchangeKey, ExchangeError> {
        self.require_initialized()?;

        let exchange_id = self.next_exchange_id;
        let ctx = ExchangeContext::new(exchange_id, session, true, Some(delegate));
        let key = ctx.key();
        self.place(ctx)?;
        self.next_exchange_id = self.next_exchange_id.wrapping_add(1);

        tracing::debug!(%session, exchange_id, "exchange created (initiator)");
        Ok(key)
    }

    fn place(&mut self, ctx: ExchangeContext) -> Result<usize, ExchangeError> {
        for (idx, slot) in self.pool.iter_mut().enumerate() {
            if slot.is_none() {
                *slot = Some(ctx);
                return Ok(idx);
            }
        }
        Err(ExchangeError::ExchangesExhausted)
    }

    /// Access an open context by key.
    pub fn context_mut(&mut self, key: ExchangeKey) -> Option<&mut ExchangeContext> {
        self.pool
            .iter_mut()
            .flatten()
            .find(|ctx| ctx.key() == key)
    }

    /// Close one context, releasing its pool slot. Returns whether a
    /// context with that key was open.
    pub fn close_context(&mut self, key: ExchangeKey) -> bool {
        for slot in &mut self.pool {
            if slot.as_ref().is_some_and(|ctx| ctx.key() == key) {
                *slot = None;
                tracing::debug!(
                    session = %key.session,
                    exchange_id = key.exchange_id,
                    "exchange closed"
                );
                return true;
            }
        }
        false
    }

    /// Close every context owned by `delegate`, clearing the delegate first
    /// so a component mid-teardown receives no further callbacks.
    pub fn close_all_for_delegate(&mut self, delegate: &DelegateHandle) {
        for slot in &mut self.pool {
            let owned = slot
                .as_ref()
                .and_then(|ctx| ctx.delegate())
                .is_some_and(|d| Rc::ptr_eq(d, delegate));
            if owned {
                if let Some(ctx) = slot.as_mut() {
                    ctx.set_delegate(None);
                }
                *slot = None;
            }
        }
    }

    /// Number of currently open contexts.
    pub fn active_contexts(&self) -> usize {
        self.pool.iter().filter(|slot| slot.is_some()).count()
    }

    // ------------------------------------------------------------------ //
    // Unsolicited handler registry
    // ------------------------------------------------------------------ //

    /// Register a wildcard handler for every message type of `protocol_id`.
    pub fn register_unsolicited_handler(
        &mut self,
        protocol_id: ProtocolId,
        delegate: DelegateHandle,
    ) -> Result<(), ExchangeError> {
        self.require_initialized()?;
        self.handlers.register(protocol_id, None, delegate)
    }

    /// Register a handler for one `(protocol_id, message_type)` pair.
    pub fn register_unsolicited_handler_for_type(
        &mut self,
        protocol_id: ProtocolId,
        message_type: u8,
        delegate: DelegateHandle,
    ) -> Result<(), ExchangeError> {
        self.require_initialized()?;
        self.handlers.register(protocol_id, Some(message_type), delegate)
    }

    pub fn unregister_unsolicited_handler(
        &mut self,
        protocol_id: ProtocolId,
    ) -> Result<(), ExchangeError> {
        self.require_initialized()?;
        self.handlers.unregister(protocol_id, None)
    }

    pub fn unregister_unsolicited_handler_for_type(
        &mut self,
        protocol_id: ProtocolId,
        message_type: u8,
    ) -> Result<(), ExchangeError> {
        self.require_initialized()?;
        self.handlers.unregister(protocol_id, Some(message_type))
    }

    // ------------------------------------------------------------------ //
    // Inbound dispatch
    // ------------------------------------------------------------------ //

    /// Route one inbound transport message.
    ///
    /// `duplicate` is the transport layer's de-duplication verdict for this
    /// message. Dispatch order:
    ///
    /// 1. First matching open context gets the message — and only it.
    /// 2. Otherwise, non-duplicate initiator messages consult the handler
    ///    table (exact type match beats the protocol wildcard).
    /// 3. Duplicates that request no acknowledgement are dropped.
    /// 4. A handler match — or an ack request even without one — mints a new
    ///    context with the inverted initiator flag.
    ///
    /// All failures on this path are logged and swallowed.
    pub fn on_message_received(
        &mut self,
        packet: &PacketHeader,
        header: &PayloadHeader,
        duplicate: bool,
        payload: &[u8],
        now: Instant,
    ) {
        if self.state != EngineState::Initialized {
            tracing::warn!("message received before engine init; dropped");
            return;
        }
        let session = packet.session_id;

        // Step 1: existing-context scan. First match wins; matches are
        // mutually exclusive by the (session, exchange_id) uniqueness
        // invariant, so the scan stops at the first hit.
        let matched = self
            .pool
            .iter()
            .position(|slot| slot.as_ref().is_some_and(|ctx| ctx.matches(session, header)));
        if let Some(idx) = matched {
            self.deliver_to_slot(idx, header, payload, now);
            return;
        }

        // Step 2: unsolicited lookup. Only fresh messages from an exchange
        // initiator may create a conversation.
        let handler = if !duplicate && header.flags.initiator {
            self.handlers.find(header.protocol_id, header.message_type)
        } else {
            None
        };

        // Step 3: nothing to do and nothing owed to the peer.
        if handler.is_none() && !header.flags.needs_ack {
            tracing::debug!(
                %session,
                exchange_id = header.exchange_id,
                protocol_id = %header.protocol_id,
                message_type = header.message_type,
                duplicate,
                "unsolicited message with no originator; dropped"
            );
            return;
        }

        // Step 4: mint a context answering the peer, so we speak as the
        // side the peer is not.
        let ack_only = handler.is_none();
        let ctx = ExchangeContext::new(header.exchange_id, session, !header.flags.initiator, handler);
        let idx = match self.place(ctx) {
            Ok(idx) => idx,
            Err(_) => {
                tracing::warn!(
                    %session,
                    exchange_id = header.exchange_id,
                    "exchange pool exhausted; unsolicited message dropped"
                );
                return;
            }
        };
        tracing::debug!(
            %session,
            exchange_id = header.exchange_id,
            ack_only,
            "exchange created (unsolicited)"
        );

        let handled = self.deliver_to_slot(idx, header, payload, now);

        // A fresh unsolicited context survives its first dispatch only when
        // the delegate accepted the message and declared a follow-up send.
        // Ack-only contexts exist so the reliability layer observes the
        // exchange; they have no delegate and close at once.
        let keep = handled
            && self.pool[idx]
                .as_ref()
                .is_some_and(|ctx| ctx.will_send());
        if !keep {
            self.pool[idx] = None;
        }
    }

    /// Deliver a message to the context in `slot idx`. Returns whether the
    /// delegate (if any) accepted it.
    fn deliver_to_slot(
        &mut self,
        idx: usize,
        header: &PayloadHeader,
        payload: &[u8],
        now: Instant,
    ) -> bool {
        let (session, first) = {
            // Slot is guaranteed occupied by the callers.
            let Some(ctx) = self.pool[idx].as_mut() else {
                return false;
            };
            ctx.clear_response_deadline();
            (ctx.session(), ctx.mark_received_from_peer())
        };
        self.reliability.on_exchange_traffic(session, header, first);

        let Some(ctx) = self.pool[idx].as_mut() else {
            return false;
        };
        let Some(delegate) = ctx.delegate().cloned() else {
            return false;
        };
        let result = delegate.borrow_mut().on_message_received(ctx, header, payload, now);
        match result {
            Ok(()) => true,
            Err(e) => {
                tracing::warn!(
                    %session,
                    exchange_id = header.exchange_id,
                    "exchange delegate failed to handle message: {e}"
                );
                false
            }
        }
    }

    // ------------------------------------------------------------------ //
    // Session lifecycle
    // ------------------------------------------------------------------ //

    /// A new secure session came up. Forwarded to the stack delegate.
    pub fn on_new_session(&mut self, session: SessionId) {
        if let Some(delegate) = self.lifecycle_delegate.clone() {
            delegate.borrow_mut().on_new_session(session);
        }
    }

    /// A secure session expired.
    ///
    /// Forwarded to the stack delegate, then every context bound to the
    /// session is notified so it can run its own expiry logic. Contexts are
    /// not removed from the pool here — releasing them stays with their
    /// owners.
    pub fn on_session_expired(&mut self, session: SessionId) {
        if let Some(delegate) = self.lifecycle_delegate.clone() {
            delegate.borrow_mut().on_session_expired(session);
        }

        for idx in 0..self.pool.len() {
            let bound = self.pool[idx]
                .as_ref()
                .is_some_and(|ctx| ctx.session() == session);
            if !bound {
                continue;
            }
            let delegate = {
                // Slot occupancy checked just above.
                let Some(ctx) = self.pool[idx].as_mut() else {
                    continue;
                };
                ctx.mark_session_expired();
                ctx.delegate().cloned()
            };
            if let Some(d) = delegate {
                if let Some(ctx) = self.pool[idx].as_mut() {
                    d.borrow_mut().on_session_expired(ctx);
                }
            }
        }
    }

    /// The transport failed to receive a message. Logged only; there is no
    /// exchange to attribute the failure to.
    pub fn on_receive_error(&mut self, error: &str, source: Option<NodeId>) {
        tracing::warn!(?source, "transport receive error: {error}");
    }

    // ------------------------------------------------------------------ //
    // Timeouts
    // ------------------------------------------------------------------ //

    /// Fire the response timeout on every overdue context and close it.
    ///
    /// This is the host-timer hook for exchange-level response timeouts;
    /// call it from the event loop's periodic tick.
    pub fn poll_timeouts(&mut self, now: Instant) {
        for idx in 0..self.pool.len() {
            let overdue = self.pool[idx]
                .as_ref()
                .is_some_and(|ctx| ctx.is_response_overdue(now));
            if !overdue {
                continue;
            }
            // Take the context out: the slot is free again whatever the
            // delegate does.
            let Some(mut ctx) = self.pool[idx].take() else {
                continue;
            };
            tracing::warn!(
                session = %ctx.session(),
                exchange_id = ctx.exchange_id(),
                "exchange response timeout"
            );
            if let Some(delegate) = ctx.take_delegate() {
                delegate.borrow_mut().on_response_timeout(&mut ctx);
            }
        }
    }
}
