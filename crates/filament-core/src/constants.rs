//! Protocol-id constants and header sizing.

use crate::types::ProtocolId;

/// Secure-channel protocol (session establishment, standalone acks, status).
pub const PROTOCOL_SECURE_CHANNEL: ProtocolId = ProtocolId::new(0x0000);

/// Bulk Data Exchange protocol.
pub const PROTOCOL_BDX: ProtocolId = ProtocolId::new(0x0002);

/// Encoded payload-header size:
/// `flags(1) || message_type(1) || exchange_id(2) || protocol_id(2)`.
pub const PAYLOAD_HEADER_SIZE: usize = 6;

/// Flag bit: the sender of this message initiated the exchange.
pub const FLAG_INITIATOR: u8 = 0x01;

/// Flag bit: the sender requests an acknowledgement for this message.
pub const FLAG_NEEDS_ACK: u8 = 0x02;

/// Flag bit: this message carries a piggybacked acknowledgement.
pub const FLAG_ACK: u8 = 0x04;

/// Mask of bits that must be zero in a well-formed flag byte.
pub const FLAG_RESERVED_MASK: u8 = !(FLAG_INITIATOR | FLAG_NEEDS_ACK | FLAG_ACK);
