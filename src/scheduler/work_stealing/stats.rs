//! Per-processor scheduler statistics.
//!
//! Counters use relaxed ordering; snapshots are inherently best-effort and
//! meant for monitoring, tests, and load-balance diagnostics.

use std::sync::atomic::{AtomicU64, Ordering};

/// Live per-processor counters.
#[derive(Debug, Default)]
pub(crate) struct ProcessorStats {
    pub(crate) tasks_executed: AtomicU64,
    pub(crate) local_queue_pops: AtomicU64,
    pub(crate) global_queue_pops: AtomicU64,
    pub(crate) steals_attempted: AtomicU64,
    pub(crate) steals_succeeded: AtomicU64,
}

impl ProcessorStats {
    pub(crate) fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            tasks_executed: self.tasks_executed.load(Ordering::Relaxed),
            local_queue_pops: self.local_queue_pops.load(Ordering::Relaxed),
            global_queue_pops: self.global_queue_pops.load(Ordering::Relaxed),
            steals_attempted: self.steals_attempted.load(Ordering::Relaxed),
            steals_succeeded: self.steals_succeeded.load(Ordering::Relaxed),
        }
    }

    pub(crate) fn bump(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }
}

/// A best-effort snapshot of one processor's counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StatsSnapshot {
    /// Tasks this processor's worker has executed.
    pub tasks_executed: u64,
    /// Pops from the worker's own deque.
    pub local_queue_pops: u64,
    /// Pops from the shared global queue.
    pub global_queue_pops: u64,
    /// Steal attempts against peers.
    pub steals_attempted: u64,
    /// Steal attempts that yielded a task.
    pub steals_succeeded: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn snapshot_reflects_counters() {
        let stats = ProcessorStats::default();
        ProcessorStats::bump(&stats.tasks_executed);
        ProcessorStats::bump(&stats.tasks_executed);
        ProcessorStats::bump(&stats.steals_attempted);

        let snapshot = stats.snapshot();
        assert_eq!(snapshot.tasks_executed, 2);
        assert_eq!(snapshot.steals_attempted, 1);
        assert_eq!(snapshot.steals_succeeded, 0);
    }
}
