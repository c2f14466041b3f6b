//! Core error types.

#[derive(Debug, thiserror::Error)]
pub enum HeaderError {
    #[error("header too short: need {expected} bytes, have {actual}")]
    Truncated { expected: usize, actual: usize },

    #[error("reserved flag bits set: {0:#04x}")]
    ReservedFlags(u8),
}
