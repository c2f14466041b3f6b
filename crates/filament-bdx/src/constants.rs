//! BDX protocol constants.

use std::time::Duration;

// ------------------------------------------------------------------ //
// Message type codes
// ------------------------------------------------------------------ //

pub const MSG_SEND_INIT: u8 = 0x01;
pub const MSG_SEND_ACCEPT: u8 = 0x02;
pub const MSG_RECEIVE_INIT: u8 = 0x04;
pub const MSG_RECEIVE_ACCEPT: u8 = 0x05;
pub const MSG_BLOCK_QUERY: u8 = 0x10;
pub const MSG_BLOCK: u8 = 0x11;
pub const MSG_BLOCK_EOF: u8 = 0x12;
pub const MSG_BLOCK_ACK: u8 = 0x13;
pub const MSG_BLOCK_ACK_EOF: u8 = 0x14;
pub const MSG_STATUS_REPORT: u8 = 0x1F;

// ------------------------------------------------------------------ //
// Status codes carried by StatusReport
// ------------------------------------------------------------------ //

pub const STATUS_OK: u16 = 0x0000;
pub const STATUS_TRANSFER_FAILED_UNKNOWN: u16 = 0x001F;
pub const STATUS_BAD_MESSAGE_CONTENTS: u16 = 0x0020;
pub const STATUS_BAD_BLOCK_COUNTER: u16 = 0x0021;
pub const STATUS_UNEXPECTED_MESSAGE: u16 = 0x0022;
pub const STATUS_TRANSFER_METHOD_NOT_SUPPORTED: u16 = 0x0050;

// ------------------------------------------------------------------ //
// Transfer-control byte bits (TransferInit / TransferAccept)
// ------------------------------------------------------------------ //

/// Low nibble of the control byte carries the protocol version.
pub const CONTROL_VERSION_MASK: u8 = 0x0F;
/// The data sender drives block flow.
pub const CONTROL_SENDER_DRIVE: u8 = 0x10;
/// The data receiver drives block flow (query per block).
pub const CONTROL_RECEIVER_DRIVE: u8 = 0x20;

// ------------------------------------------------------------------ //
// Polling
// ------------------------------------------------------------------ //

/// Steady-state poll period. Deliberately coarse: BDX is not
/// latency-sensitive per block, but must make forward progress even when
/// no further inbound traffic arrives.
pub const DEFAULT_POLL_PERIOD: Duration = Duration::from_millis(500);

/// Delay used when another output event is likely immediately available.
pub const IMMEDIATE_POLL_DELAY: Duration = Duration::from_millis(1);
