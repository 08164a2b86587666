//! The work-stealing scheduler's unit of work.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// A unit of work: a callable plus a sequence number and a cancellation
/// flag.
///
/// The sequence number is assigned by the processor that first accepts the
/// task; workers skip tasks whose cancellation flag is set by the time they
/// would run.
pub(crate) struct Task {
    work: Box<dyn FnOnce() + Send>,
    sequence: u64,
    cancelled: Arc<AtomicBool>,
}

/// Flips a task's cancellation flag.
///
/// Cheap to clone; the task observes the flag at execution time.
#[derive(Clone)]
pub(crate) struct CancelFlag {
    cancelled: Arc<AtomicBool>,
}

impl CancelFlag {
    pub(crate) fn cancel(&self) {
        self.cancelled.store(true, Ordering::Release);
    }
}

impl Task {
    pub(crate) fn new(work: Box<dyn FnOnce() + Send>) -> Self {
        Self {
            work,
            sequence: 0,
            cancelled: Arc::new(AtomicBool::new(false)),
        }
    }

    pub(crate) fn cancel_flag(&self) -> CancelFlag {
        CancelFlag {
            cancelled: Arc::clone(&self.cancelled),
        }
    }

    pub(crate) fn set_sequence(&mut self, sequence: u64) {
        self.sequence = sequence;
    }

    #[allow(dead_code)]
    pub(crate) fn sequence(&self) -> u64 {
        self.sequence
    }

    pub(crate) fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Acquire)
    }

    /// Consumes and runs the callable.
    pub(crate) fn run(self) {
        (self.work)();
    }
}

impl std::fmt::Debug for Task {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Task")
            .field("sequence", &self.sequence)
            .field("cancelled", &self.is_cancelled())
            .finish_non_exhaustive()
    }
}
