//! Shared protocol types for the Filament exchange stack.
//!
//! This crate defines the identifier newtypes, message headers, and the
//! compact exchange-header codec used by both the exchange engine and the
//! bulk-transfer protocol built on top of it.

pub mod constants;
pub mod error;
pub mod header;
pub mod types;

pub use error::HeaderError;
pub use header::{ExchangeFlags, PacketHeader, PayloadHeader};
pub use types::{NodeId, ProtocolId, SessionId};
