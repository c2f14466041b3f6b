//! Test doubles for the facilitator's consumed interfaces.

use std::cell::RefCell;
use std::rc::Rc;
use std::time::Duration;

use crate::facilitator::{PollTimer, TransferOutputHandler};
use crate::session::TransferOutput;

/// Observable record of a [`RecordingTimer`].
#[derive(Debug, Default)]
pub struct TimerLog {
    /// Every delay passed to `schedule`, in order.
    pub scheduled: Vec<Duration>,
    pub cancels: usize,
}

/// A poll timer that records schedule/cancel calls instead of firing.
///
/// Tests drive the poll loop by calling `poll_for_output` directly, so the
/// timer only needs to witness what the facilitator asked for.
pub struct RecordingTimer {
    log: Rc<RefCell<TimerLog>>,
}

impl RecordingTimer {
    pub fn new_pair() -> (Self, Rc<RefCell<TimerLog>>) {
        let log = Rc::new(RefCell::new(TimerLog::default()));
        (Self { log: Rc::clone(&log) }, log)
    }
}

impl PollTimer for RecordingTimer {
    fn schedule(&mut self, delay: Duration) {
        self.log.borrow_mut().scheduled.push(delay);
    }

    fn cancel(&mut self) {
        self.log.borrow_mut().cancels += 1;
    }
}

/// An output handler that collects every event.
pub struct RecordingHandler {
    events: Rc<RefCell<Vec<TransferOutput>>>,
}

impl RecordingHandler {
    pub fn new_pair() -> (Self, Rc<RefCell<Vec<TransferOutput>>>) {
        let events = Rc::new(RefCell::new(Vec::new()));
        (
            Self {
                events: Rc::clone(&events),
            },
            events,
        )
    }
}

impl TransferOutputHandler for RecordingHandler {
    fn handle_transfer_session_output(&mut self, event: TransferOutput) {
        self.events.borrow_mut().push(event);
    }
}
