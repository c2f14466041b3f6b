//! Interface to the message-reliability subsystem.
//!
//! Acknowledgement and retransmission live below the exchange layer; the
//! engine only initializes the subsystem, shuts it down, and lets it observe
//! exchange traffic so it can pick initial retransmit timing.

use filament_core::{PayloadHeader, SessionId};

use crate::error::ExchangeError;

/// The reliability subsystem as consumed by the engine.
pub trait ReliabilityLayer {
    fn init(&mut self) -> Result<(), ExchangeError>;

    fn shutdown(&mut self);

    /// Called for every message delivered to an exchange context.
    ///
    /// `first_from_peer` is true exactly once per context: on the first
    /// message the peer ever delivered to it. Implementations use it to
    /// switch from the conservative initial retransmit interval to the
    /// measured one.
    fn on_exchange_traffic(
        &mut self,
        session: SessionId,
        header: &PayloadHeader,
        first_from_peer: bool,
    );
}

/// A reliability layer that does nothing.
///
/// Used on transports that are reliable by themselves, and in tests.
#[derive(Debug, Default)]
pub struct NoopReliability;

impl ReliabilityLayer for NoopReliability {
    fn init(&mut self) -> Result<(), ExchangeError> {
        Ok(())
    }

    fn shutdown(&mut self) {}

    fn on_exchange_traffic(
        &mut self,
        session: SessionId,
        header: &PayloadHeader,
        first_from_peer: bool,
    ) {
        tracing::trace!(
            %session,
            exchange_id = header.exchange_id,
            first_from_peer,
            "reliability: observed exchange traffic"
        );
    }
}
