//! Exchange message headers and their compact binary codec.
//!
//! The payload header travels at the front of every exchange message:
//!
//! ```text
//! flags(1) || message_type(1) || exchange_id(2 LE) || protocol_id(2 LE) || payload...
//! ```
//!
//! The packet header is produced by the transport layer after decryption and
//! is never encoded here; the exchange layer only reads it.

use crate::constants::{
    FLAG_ACK, FLAG_INITIATOR, FLAG_NEEDS_ACK, FLAG_RESERVED_MASK, PAYLOAD_HEADER_SIZE,
};
use crate::error::HeaderError;
use crate::types::{NodeId, ProtocolId, SessionId};

/// Per-message exchange flag bits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ExchangeFlags {
    /// The sender of this message initiated the exchange.
    pub initiator: bool,
    /// The sender requests an acknowledgement.
    pub needs_ack: bool,
    /// The message carries a piggybacked acknowledgement.
    pub ack: bool,
}

impl ExchangeFlags {
    /// Pack into the wire flag byte.
    #[must_use]
    pub fn to_byte(self) -> u8 {
        let mut b = 0u8;
        if self.initiator {
            b |= FLAG_INITIATOR;
        }
        if self.needs_ack {
            b |= FLAG_NEEDS_ACK;
        }
        if self.ack {
            b |= FLAG_ACK;
        }
        b
    }

    /// Unpack from the wire flag byte; reserved bits must be zero.
    pub fn from_byte(b: u8) -> Result<Self, HeaderError> {
        if b & FLAG_RESERVED_MASK != 0 {
            return Err(HeaderError::ReservedFlags(b));
        }
        Ok(Self {
            initiator: b & FLAG_INITIATOR != 0,
            needs_ack: b & FLAG_NEEDS_ACK != 0,
            ack: b & FLAG_ACK != 0,
        })
    }
}

/// The exchange-level header of one message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PayloadHeader {
    pub exchange_id: u16,
    pub protocol_id: ProtocolId,
    pub message_type: u8,
    pub flags: ExchangeFlags,
}

impl PayloadHeader {
    /// Encode the header followed by nothing; callers append the payload.
    #[must_use]
    pub fn encode(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(PAYLOAD_HEADER_SIZE);
        buf.push(self.flags.to_byte());
        buf.push(self.message_type);
        buf.extend_from_slice(&self.exchange_id.to_le_bytes());
        buf.extend_from_slice(&self.protocol_id.value().to_le_bytes());
        buf
    }

    /// Decode a header from the front of `data`, returning the header and
    /// the remaining application payload.
    pub fn decode(data: &[u8]) -> Result<(Self, &[u8]), HeaderError> {
        if data.len() < PAYLOAD_HEADER_SIZE {
            return Err(HeaderError::Truncated {
                expected: PAYLOAD_HEADER_SIZE,
                actual: data.len(),
            });
        }
        let flags = ExchangeFlags::from_byte(data[0])?;
        let message_type = data[1];
        let exchange_id = u16::from_le_bytes([data[2], data[3]]);
        let protocol_id = ProtocolId::new(u16::from_le_bytes([data[4], data[5]]));
        Ok((
            Self {
                exchange_id,
                protocol_id,
                message_type,
                flags,
            },
            &data[PAYLOAD_HEADER_SIZE..],
        ))
    }
}

/// Transport-level framing the session manager hands up with each message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PacketHeader {
    /// The secure session the message arrived on.
    pub session_id: SessionId,
    /// Monotonic per-session message counter (used for de-duplication by
    /// the transport; surfaced here for logging only).
    pub message_counter: u32,
    /// The sending node, when the transport resolved it.
    pub source: Option<NodeId>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constants::PROTOCOL_BDX;

    fn sample_header() -> PayloadHeader {
        PayloadHeader {
            exchange_id: 0xABCD,
            protocol_id: PROTOCOL_BDX,
            message_type: 0x11,
            flags: ExchangeFlags {
                initiator: true,
                needs_ack: true,
                ack: false,
            },
        }
    }

    #[test]
    fn encode_layout() {
        let encoded = sample_header().encode();
        assert_eq!(encoded.len(), PAYLOAD_HEADER_SIZE);
        assert_eq!(encoded[0], FLAG_INITIATOR | FLAG_NEEDS_ACK);
        assert_eq!(encoded[1], 0x11);
        assert_eq!(&encoded[2..4], &[0xCD, 0xAB]); // exchange_id LE
        assert_eq!(&encoded[4..6], &[0x02, 0x00]); // protocol_id LE
    }

    #[test]
    fn decode_roundtrip_with_payload() {
        let header = sample_header();
        let mut wire = header.encode();
        wire.extend_from_slice(b"block bytes");

        let (decoded, rest) = PayloadHeader::decode(&wire).unwrap();
        assert_eq!(decoded, header);
        assert_eq!(rest, b"block bytes");
    }

    #[test]
    fn decode_truncated() {
        for len in 0..PAYLOAD_HEADER_SIZE {
            let data = vec![0u8; len];
            assert!(
                PayloadHeader::decode(&data).is_err(),
                "len={len} should fail"
            );
        }
    }

    #[test]
    fn decode_exactly_header_no_payload() {
        let wire = sample_header().encode();
        let (_, rest) = PayloadHeader::decode(&wire).unwrap();
        assert!(rest.is_empty());
    }

    #[test]
    fn reserved_flag_bits_rejected() {
        let mut wire = sample_header().encode();
        wire[0] |= 0x80;
        let err = PayloadHeader::decode(&wire).unwrap_err();
        assert!(matches!(err, HeaderError::ReservedFlags(_)));
    }

    #[test]
    fn flags_byte_roundtrip_all_combinations() {
        for bits in 0u8..8 {
            let flags = ExchangeFlags {
                initiator: bits & 1 != 0,
                needs_ack: bits & 2 != 0,
                ack: bits & 4 != 0,
            };
            assert_eq!(ExchangeFlags::from_byte(flags.to_byte()).unwrap(), flags);
        }
    }

    mod proptests {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            #[test]
            fn header_roundtrip(
                exchange_id in any::<u16>(),
                protocol in any::<u16>(),
                message_type in any::<u8>(),
                bits in 0u8..8,
                payload in proptest::collection::vec(any::<u8>(), 0..64),
            ) {
                let header = PayloadHeader {
                    exchange_id,
                    protocol_id: ProtocolId::new(protocol),
                    message_type,
                    flags: ExchangeFlags::from_byte(bits).unwrap(),
                };
                let mut wire = header.encode();
                wire.extend_from_slice(&payload);
                let (decoded, rest) = PayloadHeader::decode(&wire).unwrap();
                prop_assert_eq!(decoded, header);
                prop_assert_eq!(rest, &payload[..]);
            }
        }
    }
}
