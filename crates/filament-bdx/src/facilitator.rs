//! Transfer facilitators: glue between a [`TransferSession`], one exchange,
//! and a periodic poll timer.
//!
//! Polling is the only scheduling mechanism here. There is no event-driven
//! wakeup: the state machine advances strictly on timer ticks, with a short
//! immediate re-poll whenever an event was just produced and another is
//! likely already pending.

use std::time::{Duration, Instant};

use filament_core::PayloadHeader;
use filament_exchange::{ExchangeContext, ExchangeDelegate, ExchangeError, ExchangeKey};

use crate::constants::IMMEDIATE_POLL_DELAY;
use crate::error::BdxError;
use crate::message::TransferInit;
use crate::session::{TransferOutput, TransferRole, TransferSession};

// ------------------------------------------------------------------ //
// Consumed interfaces
// ------------------------------------------------------------------ //

/// The system-timer surface the poll loop runs on.
///
/// `schedule` replaces any previously armed deadline; the host calls
/// `poll_for_output` when the deadline fires.
pub trait PollTimer {
    fn schedule(&mut self, delay: Duration);
    fn cancel(&mut self);
}

/// Application hook receiving every transfer output event.
///
/// Close/abort policy lives here: whether a session error tears down the
/// whole exchange or is answered with a status message is this layer's
/// decision, not the facilitator's.
pub trait TransferOutputHandler {
    fn handle_transfer_session_output(&mut self, event: TransferOutput);
}

// ------------------------------------------------------------------ //
// Shared facilitator core
// ------------------------------------------------------------------ //

/// Common machinery of both facilitator roles: one session, at most one
/// bound exchange (held weakly by key — the engine owns the context), and
/// the poll loop.
pub(crate) struct TransferFacilitator {
    session: TransferSession,
    exchange: Option<ExchangeKey>,
    poll_period: Duration,
    stop_polling: bool,
    timer: Box<dyn PollTimer>,
    handler: Box<dyn TransferOutputHandler>,
}

impl TransferFacilitator {
    fn new(timer: Box<dyn PollTimer>, handler: Box<dyn TransferOutputHandler>) -> Self {
        Self {
            session: TransferSession::new(),
            exchange: None,
            poll_period: crate::constants::DEFAULT_POLL_PERIOD,
            stop_polling: false,
            timer,
            handler,
        }
    }

    fn start_polling(&mut self, poll_period: Duration) {
        self.poll_period = poll_period;
        self.stop_polling = false;
        self.timer.schedule(poll_period);
    }

    /// One poll tick: produce the session's next output event, hand it to
    /// the handler, and re-arm the timer.
    ///
    /// When the stop flag is set the timer is cancelled instead and the
    /// flag cleared; stopping always takes effect on a tick rather than
    /// synchronously, so it never races a callback already in flight.
    fn poll_for_output(&mut self, now: Instant) {
        if self.stop_polling {
            self.timer.cancel();
            self.stop_polling = false;
            return;
        }

        match self.session.poll_output(now) {
            TransferOutput::None => self.timer.schedule(self.poll_period),
            event => {
                self.handler.handle_transfer_session_output(event);
                // Another event is likely already queued.
                self.schedule_immediate_poll();
            }
        }
    }

    fn schedule_immediate_poll(&mut self) {
        self.timer.schedule(IMMEDIATE_POLL_DELAY);
    }

    fn handle_exchange_message(
        &mut self,
        ctx: &mut ExchangeContext,
        header: &PayloadHeader,
        payload: &[u8],
        now: Instant,
    ) -> Result<(), ExchangeError> {
        // Bind to whichever exchange first delivers a message; ignore
        // traffic from any other.
        match self.exchange {
            None => self.exchange = Some(ctx.key()),
            Some(bound) if bound != ctx.key() => {
                tracing::warn!(
                    exchange_id = ctx.exchange_id(),
                    "message from unbound exchange ignored"
                );
                return Ok(());
            }
            Some(_) => {}
        }

        if let Err(e) = self
            .session
            .handle_message_received(header.message_type, payload, now)
        {
            // Policy for protocol violations belongs to the output handler;
            // the message is simply not fed into the session.
            tracing::warn!(
                message_type = header.message_type,
                "transfer session rejected message: {e}"
            );
        }

        // BDX always expects a follow-up message or status on the same
        // exchange.
        ctx.will_send_message();
        Ok(())
    }

    fn handle_response_timeout(&mut self, ctx: &mut ExchangeContext) {
        tracing::warn!(
            exchange_id = ctx.exchange_id(),
            "exchange timed out; aborting transfer"
        );
        self.exchange = None;
        self.session.reset();
    }

    fn handle_session_expired(&mut self, ctx: &mut ExchangeContext) {
        tracing::warn!(
            exchange_id = ctx.exchange_id(),
            "session expired under transfer"
        );
        self.exchange = None;
        self.session.reset();
    }
}

// ------------------------------------------------------------------ //
// Responder
// ------------------------------------------------------------------ //

/// Facilitator that awaits a transfer proposed by the peer.
pub struct Responder {
    inner: TransferFacilitator,
}

impl Responder {
    pub fn new(timer: Box<dyn PollTimer>, handler: Box<dyn TransferOutputHandler>) -> Self {
        Self {
            inner: TransferFacilitator::new(timer, handler),
        }
    }

    /// Arm the session to await an init message and start the poll timer.
    pub fn prepare_for_transfer(
        &mut self,
        role: TransferRole,
        control: u8,
        max_block_size: u16,
        timeout: Option<Duration>,
        poll_period: Duration,
    ) -> Result<(), BdxError> {
        self.inner
            .session
            .wait_for_transfer(role, control, max_block_size, timeout)?;
        self.inner.start_polling(poll_period);
        Ok(())
    }

    /// Reset the session and stop polling.
    ///
    /// Polling ceases on the next tick, not immediately.
    pub fn reset_transfer(&mut self) {
        self.inner.session.reset();
        self.inner.stop_polling = true;
    }

    pub fn poll_for_output(&mut self, now: Instant) {
        self.inner.poll_for_output(now);
    }

    pub fn schedule_immediate_poll(&mut self) {
        self.inner.schedule_immediate_poll();
    }

    pub fn session(&self) -> &TransferSession {
        &self.inner.session
    }

    /// Mutable session access for accept/reject/provide decisions.
    pub fn session_mut(&mut self) -> &mut TransferSession {
        &mut self.inner.session
    }

    pub fn exchange(&self) -> Option<ExchangeKey> {
        self.inner.exchange
    }
}

impl ExchangeDelegate for Responder {
    fn on_message_received(
        &mut self,
        ctx: &mut ExchangeContext,
        header: &PayloadHeader,
        payload: &[u8],
        now: Instant,
    ) -> Result<(), ExchangeError> {
        self.inner.handle_exchange_message(ctx, header, payload, now)
    }

    fn on_response_timeout(&mut self, ctx: &mut ExchangeContext) {
        self.inner.handle_response_timeout(ctx);
    }

    fn on_session_expired(&mut self, ctx: &mut ExchangeContext) {
        self.inner.handle_session_expired(ctx);
    }
}

// ------------------------------------------------------------------ //
// Initiator
// ------------------------------------------------------------------ //

/// Facilitator that proposes a transfer to the peer.
pub struct Initiator {
    inner: TransferFacilitator,
}

impl Initiator {
    pub fn new(timer: Box<dyn PollTimer>, handler: Box<dyn TransferOutputHandler>) -> Self {
        Self {
            inner: TransferFacilitator::new(timer, handler),
        }
    }

    /// Arm the session with the transfer proposal and start the poll timer.
    /// The first poll tick yields the init message to send.
    pub fn initiate_transfer(
        &mut self,
        role: TransferRole,
        init: TransferInit,
        timeout: Option<Duration>,
        poll_period: Duration,
    ) -> Result<(), BdxError> {
        self.inner.session.start_transfer(role, init, timeout)?;
        self.inner.start_polling(poll_period);
        Ok(())
    }

    /// Reset the session and stop polling on the next tick.
    pub fn reset_transfer(&mut self) {
        self.inner.session.reset();
        self.inner.stop_polling = true;
    }

    pub fn poll_for_output(&mut self, now: Instant) {
        self.inner.poll_for_output(now);
    }

    pub fn schedule_immediate_poll(&mut self) {
        self.inner.schedule_immediate_poll();
    }

    pub fn session(&self) -> &TransferSession {
        &self.inner.session
    }

    pub fn session_mut(&mut self) -> &mut TransferSession {
        &mut self.inner.session
    }

    pub fn exchange(&self) -> Option<ExchangeKey> {
        self.inner.exchange
    }
}

impl ExchangeDelegate for Initiator {
    fn on_message_received(
        &mut self,
        ctx: &mut ExchangeContext,
        header: &PayloadHeader,
        payload: &[u8],
        now: Instant,
    ) -> Result<(), ExchangeError> {
        self.inner.handle_exchange_message(ctx, header, payload, now)
    }

    fn on_response_timeout(&mut self, ctx: &mut ExchangeContext) {
        self.inner.handle_response_timeout(ctx);
    }

    fn on_session_expired(&mut self, ctx: &mut ExchangeContext) {
        self.inner.handle_session_expired(ctx);
    }
}
