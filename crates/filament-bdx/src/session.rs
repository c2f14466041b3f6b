//! The chunked-transfer state machine.
//!
//! [`TransferSession`] holds the pure protocol logic of one bulk transfer:
//! negotiating role, direction, and block size, tracking the running byte
//! offset, and producing output events when fed inbound messages or polled.
//! It does no I/O and keeps no timers — time enters exclusively through the
//! `now` parameters, so every transition is reproducible in tests.
//!
//! Block flow after negotiation: the data receiver opens with one
//! `BlockQuery`, then each `BlockAck` doubles as the request for the next
//! block. Counters are sequential starting at 0 on both sides; a mismatch
//! is a protocol violation that terminates the transfer.

use std::collections::VecDeque;
use std::time::{Duration, Instant};

use crate::constants::{
    MSG_BLOCK, MSG_BLOCK_ACK, MSG_BLOCK_ACK_EOF, MSG_BLOCK_EOF, MSG_BLOCK_QUERY, MSG_RECEIVE_ACCEPT,
    MSG_RECEIVE_INIT, MSG_SEND_ACCEPT, MSG_SEND_INIT, MSG_STATUS_REPORT,
};
use crate::error::BdxError;
use crate::message::{
    build_block, build_counter, build_status_report, build_transfer_accept, build_transfer_init,
    parse_block, parse_counter, parse_status_report, parse_transfer_accept, parse_transfer_init,
    BlockData, TransferAccept, TransferInit,
};

// ------------------------------------------------------------------ //
// Types
// ------------------------------------------------------------------ //

/// Externally observable state of a transfer session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransferState {
    Uninitialized,
    Negotiating,
    Transferring,
    Complete,
    /// Terminal. Reached from any non-terminal state by protocol violation,
    /// timeout, or an inbound status report.
    Error,
}

impl TransferState {
    pub fn name(self) -> &'static str {
        match self {
            Self::Uninitialized => "Uninitialized",
            Self::Negotiating => "Negotiating",
            Self::Transferring => "Transferring",
            Self::Complete => "Complete",
            Self::Error => "Error",
        }
    }
}

/// Data direction: who pushes the blocks, independent of who initiated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransferRole {
    Sender,
    Receiver,
}

/// Who sent the first protocol message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Actor {
    Initiator,
    Responder,
}

/// One output event produced by a poll tick.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransferOutput {
    /// Nothing pending.
    None,
    /// A protocol message ready to go out on the exchange.
    MsgToSend { message_type: u8, payload: Vec<u8> },
    /// The peer proposed a transfer; accept or reject it.
    InitReceived(TransferInit),
    /// The peer accepted our proposal.
    AcceptReceived(TransferAccept),
    /// The peer asked for the next block (data sender only).
    QueryReceived,
    /// One block of payload data arrived (data receiver only).
    BlockReceived {
        offset: u64,
        data: Vec<u8>,
        eof: bool,
    },
    /// The peer acknowledged the last block; the next one may be provided.
    AckReceived,
    /// The peer acknowledged the final block.
    AckEofReceived,
    /// An inbound status report; the transfer is over.
    StatusReceived(u16),
    /// The session's own timeout elapsed with no activity.
    TransferTimeout,
    InternalError,
}

// ------------------------------------------------------------------ //
// TransferSession
// ------------------------------------------------------------------ //

/// Pure state machine for one chunked bulk transfer.
pub struct TransferSession {
    state: TransferState,
    role: Option<TransferRole>,
    actor: Option<Actor>,

    /// Our block-size preference (responder) or proposal (initiator);
    /// 0 means no preference.
    proposed_block_size: u16,
    negotiated_block_size: u16,
    /// Message type of the init the peer sent; picks the accept type.
    peer_init_type: Option<u8>,

    timeout: Option<Duration>,
    deadline: Option<Instant>,

    /// Running byte offset, monotonically non-decreasing.
    offset: u64,
    /// Sender: counter of the next block to send. Receiver: counter the
    /// next inbound block must carry.
    next_block_counter: u32,

    pending: VecDeque<TransferOutput>,
}

impl Default for TransferSession {
    fn default() -> Self {
        Self::new()
    }
}

impl TransferSession {
    pub fn new() -> Self {
        Self {
            state: TransferState::Uninitialized,
            role: None,
            actor: None,
            proposed_block_size: 0,
            negotiated_block_size: 0,
            peer_init_type: None,
            timeout: None,
            deadline: None,
            offset: 0,
            next_block_counter: 0,
            pending: VecDeque::new(),
        }
    }

    pub fn state(&self) -> TransferState {
        self.state
    }

    pub fn role(&self) -> Option<TransferRole> {
        self.role
    }

    /// Block size settled by negotiation; 0 until `Transferring`.
    pub fn negotiated_block_size(&self) -> u16 {
        self.negotiated_block_size
    }

    pub fn offset(&self) -> u64 {
        self.offset
    }

    /// Back to `Uninitialized` from any state, discarding in-flight data.
    /// Idempotent.
    pub fn reset(&mut self) {
        *self = Self::new();
    }

    // ------------------------------------------------------------------ //
    // Arming
    // ------------------------------------------------------------------ //

    /// Arm as a Responder awaiting a transfer-initiation message.
    ///
    /// `max_block_size` is our own preference, clamped against the peer's
    /// proposal when the init arrives; 0 means "accept theirs".
    pub fn wait_for_transfer(
        &mut self,
        role: TransferRole,
        control: u8,
        max_block_size: u16,
        timeout: Option<Duration>,
    ) -> Result<(), BdxError> {
        self.require_state(TransferState::Uninitialized)?;
        self.state = TransferState::Negotiating;
        self.role = Some(role);
        self.actor = Some(Actor::Responder);
        self.proposed_block_size = max_block_size;
        self.timeout = timeout;
        let _ = control; // reserved for drive-mode negotiation
        tracing::debug!(?role, max_block_size, "transfer session armed (responder)");
        Ok(())
    }

    /// Arm as an Initiator and queue the first outbound message.
    pub fn start_transfer(
        &mut self,
        role: TransferRole,
        init: TransferInit,
        timeout: Option<Duration>,
    ) -> Result<(), BdxError> {
        self.require_state(TransferState::Uninitialized)?;
        self.state = TransferState::Negotiating;
        self.role = Some(role);
        self.actor = Some(Actor::Initiator);
        self.proposed_block_size = init.max_block_size;
        self.offset = init.start_offset;
        self.timeout = timeout;

        let message_type = match role {
            TransferRole::Sender => MSG_SEND_INIT,
            TransferRole::Receiver => MSG_RECEIVE_INIT,
        };
        self.pending.push_back(TransferOutput::MsgToSend {
            message_type,
            payload: build_transfer_init(&init),
        });
        tracing::debug!(?role, "transfer session armed (initiator)");
        Ok(())
    }

    // ------------------------------------------------------------------ //
    // Responder decisions
    // ------------------------------------------------------------------ //

    /// Accept the transfer proposed by the peer's init message.
    ///
    /// `max_block_size` is clamped to the peer's proposal; the result is the
    /// block size for the whole transfer. Moves to `Transferring`; a data
    /// receiver additionally queues the opening block query.
    pub fn accept_transfer(&mut self, max_block_size: u16) -> Result<(), BdxError> {
        self.require_state(TransferState::Negotiating)?;
        let Some(init_type) = self.peer_init_type else {
            return Err(BdxError::IncorrectState {
                expected: "Negotiating with init received",
                actual: self.state.name(),
            });
        };

        self.negotiated_block_size = clamp_block_size(max_block_size, self.proposed_block_size);
        let accept = TransferAccept {
            control: 0,
            max_block_size: self.negotiated_block_size,
            length: 0,
        };
        let message_type = if init_type == MSG_SEND_INIT {
            MSG_SEND_ACCEPT
        } else {
            MSG_RECEIVE_ACCEPT
        };
        self.pending.push_back(TransferOutput::MsgToSend {
            message_type,
            payload: build_transfer_accept(&accept),
        });
        self.enter_transferring();
        Ok(())
    }

    /// Reject the proposed transfer with a status code. Terminal.
    pub fn reject_transfer(&mut self, code: u16) -> Result<(), BdxError> {
        self.require_state(TransferState::Negotiating)?;
        self.pending.push_back(TransferOutput::MsgToSend {
            message_type: MSG_STATUS_REPORT,
            payload: build_status_report(code),
        });
        self.state = TransferState::Error;
        tracing::debug!(code, "transfer rejected");
        Ok(())
    }

    // ------------------------------------------------------------------ //
    // Sender data path
    // ------------------------------------------------------------------ //

    /// Queue the next data block for sending. Data-sender only, after a
    /// query or acknowledgement has asked for it.
    pub fn provide_block(&mut self, data: Vec<u8>, eof: bool) -> Result<(), BdxError> {
        self.require_state(TransferState::Transferring)?;
        if self.role != Some(TransferRole::Sender) {
            return Err(BdxError::IncorrectState {
                expected: "Transferring as data sender",
                actual: self.state.name(),
            });
        }
        if self.negotiated_block_size != 0 && data.len() > self.negotiated_block_size as usize {
            return Err(BdxError::BlockTooLarge {
                size: data.len(),
                max: self.negotiated_block_size,
            });
        }

        let block = BlockData {
            counter: self.next_block_counter,
            data,
        };
        self.offset += block.data.len() as u64;
        self.pending.push_back(TransferOutput::MsgToSend {
            message_type: if eof { MSG_BLOCK_EOF } else { MSG_BLOCK },
            payload: build_block(&block),
        });
        Ok(())
    }

    // ------------------------------------------------------------------ //
    // Inbound messages
    // ------------------------------------------------------------------ //

    /// Feed one inbound protocol message.
    ///
    /// Structurally invalid or wrong-state messages are rejected without
    /// disturbing the session, with one exception: a block-counter mismatch
    /// is a protocol violation that moves the session to `Error`.
    pub fn handle_message_received(
        &mut self,
        message_type: u8,
        payload: &[u8],
        now: Instant,
    ) -> Result<(), BdxError> {
        if self.state == TransferState::Uninitialized
            || self.state == TransferState::Complete
            || self.state == TransferState::Error
        {
            return Err(BdxError::UnexpectedMessage {
                state: self.state.name(),
                message_type,
            });
        }

        match message_type {
            MSG_SEND_INIT | MSG_RECEIVE_INIT => self.handle_init(message_type, payload)?,
            MSG_SEND_ACCEPT | MSG_RECEIVE_ACCEPT => self.handle_accept(message_type, payload)?,
            MSG_BLOCK_QUERY => self.handle_query(message_type, payload)?,
            MSG_BLOCK | MSG_BLOCK_EOF => self.handle_block(message_type, payload)?,
            MSG_BLOCK_ACK | MSG_BLOCK_ACK_EOF => self.handle_ack(message_type, payload)?,
            MSG_STATUS_REPORT => {
                let code = parse_status_report(payload)?;
                tracing::debug!(code, "status report received; transfer over");
                self.pending.push_back(TransferOutput::StatusReceived(code));
                self.state = TransferState::Error;
            }
            other => return Err(BdxError::UnknownMessageType(other)),
        }

        self.refresh_deadline(now);
        Ok(())
    }

    fn handle_init(&mut self, message_type: u8, payload: &[u8]) -> Result<(), BdxError> {
        let init = parse_transfer_init(payload)?;
        if self.state != TransferState::Negotiating
            || self.actor != Some(Actor::Responder)
            || self.peer_init_type.is_some()
        {
            return Err(BdxError::UnexpectedMessage {
                state: self.state.name(),
                message_type,
            });
        }
        // SendInit: the peer pushes data, we must be armed as receiver.
        let expected_role = if message_type == MSG_SEND_INIT {
            TransferRole::Receiver
        } else {
            TransferRole::Sender
        };
        if self.role != Some(expected_role) {
            return Err(BdxError::UnexpectedMessage {
                state: self.state.name(),
                message_type,
            });
        }

        self.peer_init_type = Some(message_type);
        self.proposed_block_size = clamp_block_size(self.proposed_block_size, init.max_block_size);
        self.offset = init.start_offset;
        self.pending.push_back(TransferOutput::InitReceived(init));
        Ok(())
    }

    fn handle_accept(&mut self, message_type: u8, payload: &[u8]) -> Result<(), BdxError> {
        let accept = parse_transfer_accept(payload)?;
        if self.state != TransferState::Negotiating || self.actor != Some(Actor::Initiator) {
            return Err(BdxError::UnexpectedMessage {
                state: self.state.name(),
                message_type,
            });
        }

        self.negotiated_block_size =
            clamp_block_size(accept.max_block_size, self.proposed_block_size);
        self.pending.push_back(TransferOutput::AcceptReceived(accept));
        self.enter_transferring();
        Ok(())
    }

    fn handle_query(&mut self, message_type: u8, payload: &[u8]) -> Result<(), BdxError> {
        let counter = parse_counter(payload)?;
        if self.state != TransferState::Transferring || self.role != Some(TransferRole::Sender) {
            return Err(BdxError::UnexpectedMessage {
                state: self.state.name(),
                message_type,
            });
        }
        self.check_counter(counter)?;
        self.pending.push_back(TransferOutput::QueryReceived);
        Ok(())
    }

    fn handle_block(&mut self, message_type: u8, payload: &[u8]) -> Result<(), BdxError> {
        let block = parse_block(payload)?;
        if self.state != TransferState::Transferring || self.role != Some(TransferRole::Receiver) {
            return Err(BdxError::UnexpectedMessage {
                state: self.state.name(),
                message_type,
            });
        }
        self.check_counter(block.counter)?;
        if self.negotiated_block_size != 0
            && block.data.len() > self.negotiated_block_size as usize
        {
            return Err(BdxError::BlockTooLarge {
                size: block.data.len(),
                max: self.negotiated_block_size,
            });
        }

        let eof = message_type == MSG_BLOCK_EOF;
        self.pending.push_back(TransferOutput::BlockReceived {
            offset: self.offset,
            data: block.data.clone(),
            eof,
        });
        self.offset += block.data.len() as u64;
        self.pending.push_back(TransferOutput::MsgToSend {
            message_type: if eof { MSG_BLOCK_ACK_EOF } else { MSG_BLOCK_ACK },
            payload: build_counter(block.counter),
        });
        self.next_block_counter = self.next_block_counter.wrapping_add(1);
        if eof {
            self.state = TransferState::Complete;
            tracing::debug!(offset = self.offset, "transfer complete (receiver)");
        }
        Ok(())
    }

    fn handle_ack(&mut self, message_type: u8, payload: &[u8]) -> Result<(), BdxError> {
        let counter = parse_counter(payload)?;
        if self.state != TransferState::Transferring || self.role != Some(TransferRole::Sender) {
            return Err(BdxError::UnexpectedMessage {
                state: self.state.name(),
                message_type,
            });
        }
        self.check_counter(counter)?;
        self.next_block_counter = self.next_block_counter.wrapping_add(1);
        if message_type == MSG_BLOCK_ACK_EOF {
            self.pending.push_back(TransferOutput::AckEofReceived);
            self.state = TransferState::Complete;
            tracing::debug!(offset = self.offset, "transfer complete (sender)");
        } else {
            self.pending.push_back(TransferOutput::AckReceived);
        }
        Ok(())
    }

    // ------------------------------------------------------------------ //
    // Polling
    // ------------------------------------------------------------------ //

    /// One non-blocking tick: the next pending output event, a timeout, or
    /// `None`. Pending events drain even after the session reaches a
    /// terminal state (the final acknowledgement must still go out), but a
    /// terminal session produces no new events.
    pub fn poll_output(&mut self, now: Instant) -> TransferOutput {
        if let Some(event) = self.pending.pop_front() {
            return event;
        }

        match self.state {
            TransferState::Negotiating | TransferState::Transferring => {
                // The deadline arms on the first tick after arming and is
                // refreshed by every accepted message.
                if self.deadline.is_none() {
                    if let Some(timeout) = self.timeout {
                        self.deadline = Some(now + timeout);
                    }
                }
                if matches!(self.deadline, Some(due) if now >= due) {
                    tracing::warn!(state = self.state.name(), "transfer timed out");
                    self.state = TransferState::Error;
                    return TransferOutput::TransferTimeout;
                }
                TransferOutput::None
            }
            _ => TransferOutput::None,
        }
    }

    // ------------------------------------------------------------------ //
    // Internals
    // ------------------------------------------------------------------ //

    fn require_state(&self, expected: TransferState) -> Result<(), BdxError> {
        if self.state != expected {
            return Err(BdxError::IncorrectState {
                expected: expected.name(),
                actual: self.state.name(),
            });
        }
        Ok(())
    }

    fn check_counter(&mut self, counter: u32) -> Result<(), BdxError> {
        if counter != self.next_block_counter {
            self.state = TransferState::Error;
            self.pending.push_back(TransferOutput::InternalError);
            return Err(BdxError::BlockCounterMismatch {
                expected: self.next_block_counter,
                actual: counter,
            });
        }
        Ok(())
    }

    fn enter_transferring(&mut self) {
        self.state = TransferState::Transferring;
        tracing::debug!(
            block_size = self.negotiated_block_size,
            role = ?self.role,
            "transfer negotiated"
        );
        // The data receiver opens the block flow.
        if self.role == Some(TransferRole::Receiver) {
            self.pending.push_back(TransferOutput::MsgToSend {
                message_type: MSG_BLOCK_QUERY,
                payload: build_counter(self.next_block_counter),
            });
        }
    }

    fn refresh_deadline(&mut self, now: Instant) {
        if let Some(timeout) = self.timeout {
            self.deadline = Some(now + timeout);
        }
    }
}

/// Combine two block-size bounds, where 0 means "no preference".
fn clamp_block_size(ours: u16, theirs: u16) -> u16 {
    match (ours, theirs) {
        (0, t) => t,
        (o, 0) => o,
        (o, t) => o.min(t),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constants::STATUS_TRANSFER_METHOD_NOT_SUPPORTED;

    fn init(max_block_size: u16) -> TransferInit {
        TransferInit {
            control: 0x01,
            max_block_size,
            start_offset: 0,
            max_length: 0,
            designator: b"fw.bin".to_vec(),
            metadata: Vec::new(),
        }
    }

    fn now() -> Instant {
        Instant::now()
    }

    /// Drain every currently pending event.
    fn drain(session: &mut TransferSession, at: Instant) -> Vec<TransferOutput> {
        let mut out = Vec::new();
        loop {
            match session.poll_output(at) {
                TransferOutput::None => return out,
                event => out.push(event),
            }
        }
    }

    // --- arming and reset ---

    #[test]
    fn wait_for_transfer_enters_negotiating() {
        let mut s = TransferSession::new();
        s.wait_for_transfer(TransferRole::Receiver, 0x01, 512, None)
            .unwrap();
        assert_eq!(s.state(), TransferState::Negotiating);
        // Arming twice is a caller bug.
        assert!(matches!(
            s.wait_for_transfer(TransferRole::Receiver, 0x01, 512, None),
            Err(BdxError::IncorrectState { .. })
        ));
    }

    #[test]
    fn start_transfer_queues_init_message() {
        let mut s = TransferSession::new();
        s.start_transfer(TransferRole::Sender, init(1024), None)
            .unwrap();
        assert_eq!(s.state(), TransferState::Negotiating);
        match s.poll_output(now()) {
            TransferOutput::MsgToSend {
                message_type,
                payload,
            } => {
                assert_eq!(message_type, MSG_SEND_INIT);
                assert_eq!(parse_transfer_init(&payload).unwrap(), init(1024));
            }
            other => panic!("expected MsgToSend, got {other:?}"),
        }

        // A receiver-initiated transfer opens with ReceiveInit instead.
        let mut s = TransferSession::new();
        s.start_transfer(TransferRole::Receiver, init(1024), None)
            .unwrap();
        assert!(matches!(
            s.poll_output(now()),
            TransferOutput::MsgToSend { message_type: MSG_RECEIVE_INIT, .. }
        ));
    }

    #[test]
    fn reset_is_idempotent() {
        let mut s = TransferSession::new();
        s.start_transfer(TransferRole::Sender, init(64), None).unwrap();
        s.reset();
        assert_eq!(s.state(), TransferState::Uninitialized);
        s.reset();
        assert_eq!(s.state(), TransferState::Uninitialized);
        assert_eq!(s.poll_output(now()), TransferOutput::None);
    }

    // --- negotiation ---

    #[test]
    fn responder_accepts_send_init() {
        let mut s = TransferSession::new();
        s.wait_for_transfer(TransferRole::Receiver, 0x01, 512, None)
            .unwrap();
        s.handle_message_received(MSG_SEND_INIT, &build_transfer_init(&init(1024)), now())
            .unwrap();
        assert!(matches!(
            s.poll_output(now()),
            TransferOutput::InitReceived(_)
        ));

        s.accept_transfer(512).unwrap();
        assert_eq!(s.state(), TransferState::Transferring);
        // Our 512 wins against the peer's 1024.
        assert_eq!(s.negotiated_block_size(), 512);

        let events = drain(&mut s, now());
        assert!(matches!(
            events[0],
            TransferOutput::MsgToSend { message_type: MSG_SEND_ACCEPT, .. }
        ));
        // Data receiver opens the block flow with counter 0.
        match &events[1] {
            TransferOutput::MsgToSend {
                message_type,
                payload,
            } => {
                assert_eq!(*message_type, MSG_BLOCK_QUERY);
                assert_eq!(parse_counter(payload).unwrap(), 0);
            }
            other => panic!("expected block query, got {other:?}"),
        }
    }

    #[test]
    fn accept_clamps_block_size_to_proposal() {
        let mut s = TransferSession::new();
        s.wait_for_transfer(TransferRole::Receiver, 0x01, 0, None)
            .unwrap();
        s.handle_message_received(MSG_SEND_INIT, &build_transfer_init(&init(256)), now())
            .unwrap();
        // Asking for more than the peer proposed is clamped down.
        s.accept_transfer(4096).unwrap();
        assert_eq!(s.negotiated_block_size(), 256);
    }

    #[test]
    fn accept_without_init_fails() {
        let mut s = TransferSession::new();
        s.wait_for_transfer(TransferRole::Receiver, 0x01, 512, None)
            .unwrap();
        assert!(matches!(
            s.accept_transfer(512),
            Err(BdxError::IncorrectState { .. })
        ));
    }

    #[test]
    fn init_with_wrong_direction_is_rejected() {
        // Armed to send, but the peer also wants to send.
        let mut s = TransferSession::new();
        s.wait_for_transfer(TransferRole::Sender, 0x01, 512, None)
            .unwrap();
        let err = s
            .handle_message_received(MSG_SEND_INIT, &build_transfer_init(&init(64)), now())
            .unwrap_err();
        assert!(matches!(err, BdxError::UnexpectedMessage { .. }));
        assert_eq!(s.state(), TransferState::Negotiating);
    }

    #[test]
    fn reject_transfer_sends_status_and_terminates() {
        let mut s = TransferSession::new();
        s.wait_for_transfer(TransferRole::Receiver, 0x01, 512, None)
            .unwrap();
        s.handle_message_received(MSG_SEND_INIT, &build_transfer_init(&init(64)), now())
            .unwrap();
        s.reject_transfer(STATUS_TRANSFER_METHOD_NOT_SUPPORTED)
            .unwrap();
        assert_eq!(s.state(), TransferState::Error);

        let events = drain(&mut s, now());
        match &events[..] {
            [TransferOutput::InitReceived(_), TransferOutput::MsgToSend { message_type, payload }] => {
                assert_eq!(*message_type, MSG_STATUS_REPORT);
                assert_eq!(
                    parse_status_report(payload).unwrap(),
                    STATUS_TRANSFER_METHOD_NOT_SUPPORTED
                );
            }
            other => panic!("unexpected events {other:?}"),
        }
    }

    // --- sender data path ---

    #[test]
    fn sender_full_flow_to_complete() {
        let mut s = TransferSession::new();
        s.start_transfer(TransferRole::Sender, init(1024), None)
            .unwrap();
        let _ = drain(&mut s, now());

        let accept = TransferAccept {
            control: 0,
            max_block_size: 512,
            length: 0,
        };
        s.handle_message_received(MSG_SEND_ACCEPT, &build_transfer_accept(&accept), now())
            .unwrap();
        assert_eq!(s.state(), TransferState::Transferring);
        assert_eq!(s.negotiated_block_size(), 512);
        assert_eq!(drain(&mut s, now()), vec![TransferOutput::AcceptReceived(accept)]);

        // Query for block 0, provide it.
        s.handle_message_received(MSG_BLOCK_QUERY, &build_counter(0), now())
            .unwrap();
        assert_eq!(drain(&mut s, now()), vec![TransferOutput::QueryReceived]);
        s.provide_block(vec![0xAB; 512], false).unwrap();
        match s.poll_output(now()) {
            TransferOutput::MsgToSend {
                message_type,
                payload,
            } => {
                assert_eq!(message_type, MSG_BLOCK);
                assert_eq!(parse_block(&payload).unwrap().counter, 0);
            }
            other => panic!("expected block, got {other:?}"),
        }
        assert_eq!(s.offset(), 512);

        // Ack doubles as the query for block 1.
        s.handle_message_received(MSG_BLOCK_ACK, &build_counter(0), now())
            .unwrap();
        assert_eq!(drain(&mut s, now()), vec![TransferOutput::AckReceived]);
        s.provide_block(vec![0xCD; 100], true).unwrap();
        assert!(matches!(
            s.poll_output(now()),
            TransferOutput::MsgToSend { message_type: MSG_BLOCK_EOF, .. }
        ));
        assert_eq!(s.offset(), 612);

        s.handle_message_received(MSG_BLOCK_ACK_EOF, &build_counter(1), now())
            .unwrap();
        assert_eq!(drain(&mut s, now()), vec![TransferOutput::AckEofReceived]);
        assert_eq!(s.state(), TransferState::Complete);
        // Terminal: no further output.
        assert_eq!(s.poll_output(now()), TransferOutput::None);
    }

    #[test]
    fn provide_block_respects_negotiated_size() {
        let mut s = TransferSession::new();
        s.start_transfer(TransferRole::Sender, init(1024), None)
            .unwrap();
        let accept = TransferAccept {
            control: 0,
            max_block_size: 16,
            length: 0,
        };
        s.handle_message_received(MSG_SEND_ACCEPT, &build_transfer_accept(&accept), now())
            .unwrap();
        assert!(matches!(
            s.provide_block(vec![0; 17], false),
            Err(BdxError::BlockTooLarge { size: 17, max: 16 })
        ));
        // Still transferring: the oversized block was rejected, not fatal.
        assert_eq!(s.state(), TransferState::Transferring);
        s.provide_block(vec![0; 16], false).unwrap();
    }

    // --- receiver data path ---

    fn negotiated_receiver() -> TransferSession {
        let mut s = TransferSession::new();
        s.wait_for_transfer(TransferRole::Receiver, 0x01, 512, None)
            .unwrap();
        s.handle_message_received(MSG_SEND_INIT, &build_transfer_init(&init(512)), now())
            .unwrap();
        s.accept_transfer(512).unwrap();
        let _ = drain(&mut s, now());
        s
    }

    #[test]
    fn receiver_delivers_blocks_with_monotonic_offsets() {
        let mut s = negotiated_receiver();

        let b0 = BlockData {
            counter: 0,
            data: vec![1; 512],
        };
        s.handle_message_received(MSG_BLOCK, &build_block(&b0), now())
            .unwrap();
        let events = drain(&mut s, now());
        assert_eq!(
            events[0],
            TransferOutput::BlockReceived {
                offset: 0,
                data: vec![1; 512],
                eof: false
            }
        );
        match &events[1] {
            TransferOutput::MsgToSend {
                message_type,
                payload,
            } => {
                assert_eq!(*message_type, MSG_BLOCK_ACK);
                assert_eq!(parse_counter(payload).unwrap(), 0);
            }
            other => panic!("expected ack, got {other:?}"),
        }

        let b1 = BlockData {
            counter: 1,
            data: vec![2; 40],
        };
        s.handle_message_received(MSG_BLOCK_EOF, &build_block(&b1), now())
            .unwrap();
        let events = drain(&mut s, now());
        assert_eq!(
            events[0],
            TransferOutput::BlockReceived {
                offset: 512,
                data: vec![2; 40],
                eof: true
            }
        );
        assert!(matches!(
            events[1],
            TransferOutput::MsgToSend { message_type: MSG_BLOCK_ACK_EOF, .. }
        ));
        assert_eq!(s.state(), TransferState::Complete);
        assert_eq!(s.offset(), 552);
    }

    #[test]
    fn block_counter_mismatch_is_fatal() {
        let mut s = negotiated_receiver();
        let skipped = BlockData {
            counter: 1,
            data: vec![0; 8],
        };
        let err = s
            .handle_message_received(MSG_BLOCK, &build_block(&skipped), now())
            .unwrap_err();
        assert_eq!(
            err,
            BdxError::BlockCounterMismatch {
                expected: 0,
                actual: 1
            }
        );
        assert_eq!(s.state(), TransferState::Error);
        assert_eq!(drain(&mut s, now()), vec![TransferOutput::InternalError]);
    }

    #[test]
    fn oversized_block_rejected_without_state_change() {
        let mut s = negotiated_receiver();
        let big = BlockData {
            counter: 0,
            data: vec![0; 513],
        };
        assert!(matches!(
            s.handle_message_received(MSG_BLOCK, &build_block(&big), now()),
            Err(BdxError::BlockTooLarge { .. })
        ));
        assert_eq!(s.state(), TransferState::Transferring);
        // The well-sized retry with the same counter still goes through.
        let ok = BlockData {
            counter: 0,
            data: vec![0; 512],
        };
        s.handle_message_received(MSG_BLOCK, &build_block(&ok), now())
            .unwrap();
    }

    // --- wrong-state and unknown messages ---

    #[test]
    fn message_before_arming_is_rejected() {
        let mut s = TransferSession::new();
        assert!(matches!(
            s.handle_message_received(MSG_BLOCK, &build_block(&BlockData { counter: 0, data: vec![] }), now()),
            Err(BdxError::UnexpectedMessage { state: "Uninitialized", .. })
        ));
    }

    #[test]
    fn block_during_negotiation_is_rejected_without_state_change() {
        let mut s = TransferSession::new();
        s.wait_for_transfer(TransferRole::Receiver, 0x01, 512, None)
            .unwrap();
        let block = BlockData {
            counter: 0,
            data: vec![0; 4],
        };
        assert!(matches!(
            s.handle_message_received(MSG_BLOCK, &build_block(&block), now()),
            Err(BdxError::UnexpectedMessage { .. })
        ));
        assert_eq!(s.state(), TransferState::Negotiating);
    }

    #[test]
    fn unknown_message_type_is_rejected() {
        let mut s = TransferSession::new();
        s.wait_for_transfer(TransferRole::Receiver, 0x01, 512, None)
            .unwrap();
        assert!(matches!(
            s.handle_message_received(0x7F, &[], now()),
            Err(BdxError::UnknownMessageType(0x7F))
        ));
    }

    #[test]
    fn status_report_terminates_transfer() {
        let mut s = negotiated_receiver();
        s.handle_message_received(MSG_STATUS_REPORT, &build_status_report(0x0021), now())
            .unwrap();
        assert_eq!(s.state(), TransferState::Error);
        assert_eq!(
            drain(&mut s, now()),
            vec![TransferOutput::StatusReceived(0x0021)]
        );
    }

    // --- timeout ---

    #[test]
    fn idle_session_times_out() {
        let mut s = TransferSession::new();
        let t0 = now();
        s.wait_for_transfer(
            TransferRole::Receiver,
            0x01,
            512,
            Some(Duration::from_secs(5)),
        )
        .unwrap();

        // First tick arms the deadline; nothing pending yet.
        assert_eq!(s.poll_output(t0), TransferOutput::None);
        assert_eq!(s.poll_output(t0 + Duration::from_secs(4)), TransferOutput::None);
        assert_eq!(
            s.poll_output(t0 + Duration::from_secs(5)),
            TransferOutput::TransferTimeout
        );
        assert_eq!(s.state(), TransferState::Error);
        // Terminal: the timeout fires once.
        assert_eq!(s.poll_output(t0 + Duration::from_secs(6)), TransferOutput::None);
    }

    #[test]
    fn activity_refreshes_the_deadline() {
        let mut s = TransferSession::new();
        let t0 = now();
        s.wait_for_transfer(
            TransferRole::Receiver,
            0x01,
            512,
            Some(Duration::from_secs(5)),
        )
        .unwrap();
        assert_eq!(s.poll_output(t0), TransferOutput::None);

        // An accepted message at t+4 pushes the deadline to t+9.
        s.handle_message_received(
            MSG_SEND_INIT,
            &build_transfer_init(&init(64)),
            t0 + Duration::from_secs(4),
        )
        .unwrap();
        let _ = drain(&mut s, t0 + Duration::from_secs(4));
        assert_eq!(s.poll_output(t0 + Duration::from_secs(8)), TransferOutput::None);
        assert_eq!(
            s.poll_output(t0 + Duration::from_secs(9)),
            TransferOutput::TransferTimeout
        );
    }
}
