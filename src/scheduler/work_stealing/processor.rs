//! A logical processor: local deque, victim RNG, statistics.
//!
//! The deque uses a try-lock discipline on both ends: the owner pushes and
//! pops at the front and never blocks itself; stealers take from the back
//! and return empty-handed on contention. A push is rejected once the deque
//! holds 256 entries, sending the task to the global overflow queue instead.

use crate::scheduler::work_stealing::stats::ProcessorStats;
use crate::scheduler::work_stealing::task::Task;
use crate::util::DetRng;
use std::collections::VecDeque;
use std::sync::Mutex;

/// Local queue bound, matching the Go runtime's per-P run queue.
pub(crate) const LOCAL_QUEUE_MAX: usize = 256;

struct LocalQueue {
    tasks: VecDeque<Task>,
    next_sequence: u64,
}

/// A logical processor, bound 1:1 to a worker thread for the scheduler's
/// lifetime.
pub(crate) struct Processor {
    queue: Mutex<LocalQueue>,
    rng: Mutex<DetRng>,
    pub(crate) stats: ProcessorStats,
}

impl Processor {
    pub(crate) fn new(seed: u64) -> Self {
        Self {
            queue: Mutex::new(LocalQueue {
                tasks: VecDeque::new(),
                next_sequence: 0,
            }),
            rng: Mutex::new(DetRng::new(seed)),
            stats: ProcessorStats::default(),
        }
    }

    /// Attempts to accept a task into the local deque.
    ///
    /// Fails fast (returning the task) on lock contention or when the deque
    /// is at capacity; the caller falls back to the global queue or another
    /// processor.
    pub(crate) fn try_push_local(&self, mut task: Task) -> Result<(), Task> {
        let Ok(mut queue) = self.queue.try_lock() else {
            return Err(task);
        };
        if queue.tasks.len() >= LOCAL_QUEUE_MAX {
            return Err(task);
        }
        task.set_sequence(queue.next_sequence);
        queue.next_sequence += 1;
        queue.tasks.push_back(task);
        Ok(())
    }

    /// Owner pop from the front (FIFO for cache locality). Fails fast on
    /// contention: the owner never blocks itself.
    pub(crate) fn pop_local(&self) -> Option<Task> {
        let Ok(mut queue) = self.queue.try_lock() else {
            return None;
        };
        queue.tasks.pop_front()
    }

    /// Stealer pop from the back; empty-handed on contention.
    pub(crate) fn try_steal(&self) -> Option<Task> {
        let Ok(mut queue) = self.queue.try_lock() else {
            return None;
        };
        queue.tasks.pop_back()
    }

    /// Blocking drain pop, used only at shutdown.
    pub(crate) fn pop_draining(&self) -> Option<Task> {
        let mut queue = self.queue.lock().expect("processor queue lock poisoned");
        queue.tasks.pop_front()
    }

    pub(crate) fn has_work(&self) -> bool {
        self.queue
            .try_lock()
            .map_or(true, |queue| !queue.tasks.is_empty())
    }

    /// Picks a steal victim uniformly at random, excluding this processor.
    pub(crate) fn random_victim(&self, processors: usize, self_id: usize) -> usize {
        let mut rng = self.rng.lock().expect("processor rng lock poisoned");
        let mut victim = rng.next_usize(processors);
        if victim == self_id && processors > 1 {
            victim = (victim + 1) % processors;
        }
        victim
    }
}

impl std::fmt::Debug for Processor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Processor").finish_non_exhaustive()
    }
}
