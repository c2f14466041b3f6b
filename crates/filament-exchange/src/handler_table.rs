//! Bounded registry of unsolicited-message handlers.
//!
//! Maps `(protocol_id, message_type-or-wildcard)` to the delegate that will
//! own exchanges created for messages matching that pair. The table is a
//! fixed slot array: registration fails loudly when full, and re-registering
//! an identical pair overwrites the delegate instead of growing the table.

use std::rc::Rc;

use filament_core::ProtocolId;

use crate::delegate::DelegateHandle;
use crate::error::ExchangeError;

struct HandlerEntry {
    protocol_id: ProtocolId,
    /// `None` is the wildcard: any message type within the protocol.
    message_type: Option<u8>,
    delegate: DelegateHandle,
}

/// Fixed-capacity unsolicited-message handler table.
pub struct HandlerTable {
    slots: Vec<Option<HandlerEntry>>,
}

impl HandlerTable {
    pub fn new(capacity: usize) -> Self {
        let mut slots = Vec::with_capacity(capacity);
        slots.resize_with(capacity, || None);
        Self { slots }
    }

    /// Mark every entry not-in-use. Called at engine init.
    pub fn reset(&mut self) {
        for slot in &mut self.slots {
            *slot = None;
        }
    }

    /// Number of in-use entries.
    pub fn in_use(&self) -> usize {
        self.slots.iter().filter(|s| s.is_some()).count()
    }

    /// Register a delegate for `(protocol_id, message_type)`.
    ///
    /// `message_type = None` registers the protocol-wide wildcard. An entry
    /// with the identical pair is overwritten; otherwise the first free slot
    /// is claimed.
    pub fn register(
        &mut self,
        protocol_id: ProtocolId,
        message_type: Option<u8>,
        delegate: DelegateHandle,
    ) -> Result<(), ExchangeError> {
        // Overwrite-on-match keeps the uniqueness invariant: no two in-use
        // entries may share a pair.
        for slot in self.slots.iter_mut().flatten() {
            if slot.protocol_id == protocol_id && slot.message_type == message_type {
                slot.delegate = delegate;
                tracing::debug!(%protocol_id, ?message_type, "unsolicited handler overwritten");
                return Ok(());
            }
        }

        for slot in &mut self.slots {
            if slot.is_none() {
                *slot = Some(HandlerEntry {
                    protocol_id,
                    message_type,
                    delegate,
                });
                tracing::debug!(%protocol_id, ?message_type, "unsolicited handler registered");
                return Ok(());
            }
        }

        Err(ExchangeError::TooManyUnsolicitedHandlers)
    }

    /// Mark the entry for `(protocol_id, message_type)` not-in-use.
    pub fn unregister(
        &mut self,
        protocol_id: ProtocolId,
        message_type: Option<u8>,
    ) -> Result<(), ExchangeError> {
        for slot in &mut self.slots {
            if let Some(entry) = slot {
                if entry.protocol_id == protocol_id && entry.message_type == message_type {
                    *slot = None;
                    tracing::debug!(%protocol_id, ?message_type, "unsolicited handler unregistered");
                    return Ok(());
                }
            }
        }
        Err(ExchangeError::NoUnsolicitedHandler)
    }

    /// Find the delegate for an inbound `(protocol_id, message_type)`.
    ///
    /// An exact type match always wins over the protocol wildcard, no matter
    /// where either sits in the table.
    pub fn find(&self, protocol_id: ProtocolId, message_type: u8) -> Option<DelegateHandle> {
        let mut wildcard = None;
        for entry in self.slots.iter().flatten() {
            if entry.protocol_id != protocol_id {
                continue;
            }
            match entry.message_type {
                Some(t) if t == message_type => return Some(Rc::clone(&entry.delegate)),
                None => wildcard = Some(Rc::clone(&entry.delegate)),
                Some(_) => {}
            }
        }
        wildcard
    }
}
