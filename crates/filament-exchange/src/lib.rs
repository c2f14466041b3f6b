//! Exchange engine for the Filament stack.
//!
//! An *exchange* is one logical request/response conversation between two
//! nodes, identified by an exchange id scoped to a transport session. This
//! crate owns a bounded pool of [`ExchangeContext`] objects, routes every
//! inbound transport message to exactly one consumer (an existing exchange,
//! a freshly minted exchange for an unsolicited message, or a logged drop),
//! and manages the unsolicited-message-handler registry.
//!
//! The core is single-threaded and cooperative: all entry points are called
//! from one event loop, time is passed in explicitly, and nothing blocks.

pub mod config;
pub mod context;
pub mod delegate;
pub mod engine;
pub mod error;
pub mod handler_table;
pub mod reliability;
pub mod testing;

pub use config::EngineConfig;
pub use context::{ExchangeContext, ExchangeKey};
pub use delegate::{DelegateHandle, ExchangeDelegate, SessionLifecycleDelegate};
pub use engine::ExchangeManager;
pub use error::ExchangeError;
pub use handler_table::HandlerTable;
pub use reliability::{NoopReliability, ReliabilityLayer};
