//! Bulk Data Exchange (BDX) for the Filament stack.
//!
//! BDX moves an arbitrarily large payload in bounded-size blocks over one
//! exchange, with negotiated block size and timeouts. The crate splits into
//! a pure state machine ([`TransferSession`]) that turns inbound messages
//! and poll ticks into output events, and two facilitators
//! ([`Initiator`], [`Responder`]) that bind a session to an exchange and a
//! periodic poll timer.
//!
//! Naming: Initiator/Responder is who spoke first; [`TransferRole`] is who
//! pushes the data blocks. An Initiator can be either a Sender or Receiver.

pub mod constants;
pub mod error;
pub mod facilitator;
pub mod message;
pub mod session;
pub mod testing;

pub use error::BdxError;
pub use facilitator::{Initiator, PollTimer, Responder, TransferOutputHandler};
pub use message::{BlockData, TransferAccept, TransferInit};
pub use session::{TransferOutput, TransferRole, TransferSession, TransferState};
