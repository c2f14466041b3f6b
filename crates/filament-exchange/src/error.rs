//! Exchange-layer error types.

use filament_core::HeaderError;

#[derive(Debug, thiserror::Error)]
pub enum ExchangeError {
    #[error("invalid state: expected {expected}, got {actual}")]
    IncorrectState {
        expected: &'static str,
        actual: &'static str,
    },

    #[error("exchange pool exhausted")]
    ExchangesExhausted,

    #[error("unsolicited handler table full")]
    TooManyUnsolicitedHandlers,

    #[error("no matching unsolicited handler registered")]
    NoUnsolicitedHandler,

    #[error("header error: {0}")]
    Header(#[from] HeaderError),

    #[error("delegate rejected message: {0}")]
    DelegateRejected(String),
}
