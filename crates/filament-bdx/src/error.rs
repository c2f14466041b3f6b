//! BDX error types.

use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum BdxError {
    /// A control message was shorter than its fixed layout requires.
    #[error("message truncated: need {expected} bytes, have {actual}")]
    InvalidPayload { expected: usize, actual: usize },

    #[error("unknown message type {0:#04x}")]
    UnknownMessageType(u8),

    /// A structurally valid message arrived in a state that cannot accept it.
    #[error("message type {message_type:#04x} not valid in state {state}")]
    UnexpectedMessage {
        state: &'static str,
        message_type: u8,
    },

    #[error("transfer session in state {actual}, expected {expected}")]
    IncorrectState {
        expected: &'static str,
        actual: &'static str,
    },

    /// Fatal: block counters must be sequential.
    #[error("block counter mismatch: expected {expected}, got {actual}")]
    BlockCounterMismatch { expected: u32, actual: u32 },

    #[error("block of {size} bytes exceeds negotiated max {max}")]
    BlockTooLarge { size: usize, max: u16 },
}
