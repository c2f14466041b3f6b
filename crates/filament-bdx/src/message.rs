//! BDX control-message encoding and decoding.
//!
//! Decoded message structs with compact fixed layouts, one `parse_*`/`build_*`
//! pair per message. All multi-byte fields are big-endian. Every parser
//! rejects truncated input instead of reading past the payload.

use crate::error::BdxError;

// ------------------------------------------------------------------ //
// Types
// ------------------------------------------------------------------ //

/// SendInit / ReceiveInit: proposes a transfer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransferInit {
    pub control: u8,
    /// Proposed maximum block size; 0 means "no preference".
    pub max_block_size: u16,
    pub start_offset: u64,
    /// Total transfer length; 0 means "unknown / until EOF".
    pub max_length: u64,
    /// File designator naming the payload being moved.
    pub designator: Vec<u8>,
    /// Opaque application metadata, untouched by this layer.
    pub metadata: Vec<u8>,
}

/// SendAccept / ReceiveAccept: concludes negotiation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TransferAccept {
    pub control: u8,
    pub max_block_size: u16,
    pub length: u64,
}

/// Block / BlockEOF: one chunk of payload data.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlockData {
    pub counter: u32,
    pub data: Vec<u8>,
}

fn need(data: &[u8], expected: usize) -> Result<(), BdxError> {
    if data.len() < expected {
        return Err(BdxError::InvalidPayload {
            expected,
            actual: data.len(),
        });
    }
    Ok(())
}

// ------------------------------------------------------------------ //
// TransferInit
// ------------------------------------------------------------------ //

/// Layout: `control(1) || max_block_size(2) || start_offset(8) ||
/// max_length(8) || designator_len(2) || designator || metadata`.
pub fn build_transfer_init(init: &TransferInit) -> Vec<u8> {
    let mut out = Vec::with_capacity(21 + init.designator.len() + init.metadata.len());
    out.push(init.control);
    out.extend_from_slice(&init.max_block_size.to_be_bytes());
    out.extend_from_slice(&init.start_offset.to_be_bytes());
    out.extend_from_slice(&init.max_length.to_be_bytes());
    out.extend_from_slice(&(init.designator.len() as u16).to_be_bytes());
    out.extend_from_slice(&init.designator);
    out.extend_from_slice(&init.metadata);
    out
}

pub fn parse_transfer_init(data: &[u8]) -> Result<TransferInit, BdxError> {
    need(data, 21)?;
    let control = data[0];
    let max_block_size = u16::from_be_bytes([data[1], data[2]]);
    let start_offset = u64::from_be_bytes(data[3..11].try_into().unwrap());
    let max_length = u64::from_be_bytes(data[11..19].try_into().unwrap());
    let designator_len = u16::from_be_bytes([data[19], data[20]]) as usize;
    need(data, 21 + designator_len)?;
    let designator = data[21..21 + designator_len].to_vec();
    let metadata = data[21 + designator_len..].to_vec();
    Ok(TransferInit {
        control,
        max_block_size,
        start_offset,
        max_length,
        designator,
        metadata,
    })
}

// ------------------------------------------------------------------ //
// TransferAccept
// ------------------------------------------------------------------ //

/// Layout: `control(1) || max_block_size(2) || length(8)`.
pub fn build_transfer_accept(accept: &TransferAccept) -> Vec<u8> {
    let mut out = Vec::with_capacity(11);
    out.push(accept.control);
    out.extend_from_slice(&accept.max_block_size.to_be_bytes());
    out.extend_from_slice(&accept.length.to_be_bytes());
    out
}

pub fn parse_transfer_accept(data: &[u8]) -> Result<TransferAccept, BdxError> {
    need(data, 11)?;
    Ok(TransferAccept {
        control: data[0],
        max_block_size: u16::from_be_bytes([data[1], data[2]]),
        length: u64::from_be_bytes(data[3..11].try_into().unwrap()),
    })
}

// ------------------------------------------------------------------ //
// Block / BlockEOF
// ------------------------------------------------------------------ //

/// Layout: `counter(4) || data`.
pub fn build_block(block: &BlockData) -> Vec<u8> {
    let mut out = Vec::with_capacity(4 + block.data.len());
    out.extend_from_slice(&block.counter.to_be_bytes());
    out.extend_from_slice(&block.data);
    out
}

pub fn parse_block(data: &[u8]) -> Result<BlockData, BdxError> {
    need(data, 4)?;
    Ok(BlockData {
        counter: u32::from_be_bytes(data[..4].try_into().unwrap()),
        data: data[4..].to_vec(),
    })
}

// ------------------------------------------------------------------ //
// Counter-only messages (BlockQuery / BlockAck / BlockAckEOF)
// ------------------------------------------------------------------ //

pub fn build_counter(counter: u32) -> Vec<u8> {
    counter.to_be_bytes().to_vec()
}

pub fn parse_counter(data: &[u8]) -> Result<u32, BdxError> {
    need(data, 4)?;
    Ok(u32::from_be_bytes(data[..4].try_into().unwrap()))
}

// ------------------------------------------------------------------ //
// StatusReport
// ------------------------------------------------------------------ //

pub fn build_status_report(code: u16) -> Vec<u8> {
    code.to_be_bytes().to_vec()
}

pub fn parse_status_report(data: &[u8]) -> Result<u16, BdxError> {
    need(data, 2)?;
    Ok(u16::from_be_bytes([data[0], data[1]]))
}
