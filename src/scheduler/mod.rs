//! Execution contexts: the scheduler contract and the scheduler family.
//!
//! A scheduler is a copyable, equality-comparable handle whose
//! [`Scheduler::schedule`] returns a sender completing with no value on the
//! scheduler's execution context. A [`TryScheduler`] additionally exposes
//! [`TryScheduler::try_schedule`], whose sender never blocks the caller: it
//! completes with value, with the distinguished
//! [`would_block`](crate::Error::would_block) error on queue saturation, or
//! stopped.
//!
//! The family, in increasing sophistication:
//!
//! - [`InlineScheduler`]: completes synchronously on the calling thread.
//! - [`RunLoop`]: a single-threaded cooperative loop driven by `run()`.
//! - [`ThreadPool`]: a fixed worker set over a shared FIFO plus a lock-free
//!   ring for non-blocking submission.
//! - [`WorkStealingPool`]: per-processor deques with stealing, modelled on
//!   Go's G/P/M runtime.

pub mod inline;
pub mod mpmc;
pub mod run_loop;
pub mod thread_pool;
pub mod work_stealing;

pub use inline::InlineScheduler;
pub use mpmc::BoundedMpmc;
pub use run_loop::{RunLoop, RunLoopScheduler};
pub use thread_pool::{ThreadPool, ThreadPoolBuilder, ThreadPoolScheduler};
pub use work_stealing::{
    StatsSnapshot, WorkStealingBuilder, WorkStealingPool, WorkStealingScheduler,
};

use crate::error::Result;
use crate::sender::Sender;
use std::sync::Arc;

/// Forward-progress guarantee of an execution context.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ForwardProgress {
    /// Every agent makes progress regardless of the others.
    Concurrent,
    /// Agents make progress once started.
    Parallel,
    /// Agents may be starved indefinitely (e.g. inline execution).
    WeaklyParallel,
}

/// A handle to an execution context.
pub trait Scheduler: Clone + PartialEq + Send + Sync + 'static {
    /// The sender type produced by [`Self::schedule`].
    type ScheduleSender: Sender<Value = ()>;

    /// Returns a sender that completes with no value on this scheduler's
    /// execution context.
    fn schedule(&self) -> Self::ScheduleSender;

    /// The forward-progress guarantee of this context.
    fn forward_progress(&self) -> ForwardProgress {
        ForwardProgress::Parallel
    }
}

/// A scheduler that additionally guarantees non-blocking submission.
pub trait TryScheduler: Scheduler {
    /// The sender type produced by [`Self::try_schedule`].
    type TryScheduleSender: Sender<Value = ()>;

    /// Returns a sender that never blocks the caller: it completes with
    /// value, with [`would_block`](crate::Error::would_block), or stopped.
    fn try_schedule(&self) -> Self::TryScheduleSender;
}

/// Configuration failure for the pooled schedulers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum BuildError {
    /// The worker count was zero.
    #[error("worker count must be greater than zero")]
    ZeroWorkers,
}

// ---------------------------------------------------------------------------
// Type-erased scheduler handles for environment queries
// ---------------------------------------------------------------------------

/// Object-safe core of a scheduler, for type erasure.
pub trait DynScheduler: Send + Sync {
    /// Submits a task to the context. An error means the task was not and
    /// will not be run.
    fn submit_boxed(&self, task: Box<dyn FnOnce() + Send>) -> Result<()>;

    /// The forward-progress guarantee of this context.
    fn dyn_forward_progress(&self) -> ForwardProgress;
}

/// A type-erased scheduler handle.
///
/// Used where environments carry "some scheduler" without naming its type.
/// Equality is handle identity.
#[derive(Clone)]
pub struct AnyScheduler {
    inner: Arc<dyn DynScheduler>,
}

impl AnyScheduler {
    /// Erases a concrete scheduler.
    pub fn new(scheduler: impl DynScheduler + 'static) -> Self {
        Self {
            inner: Arc::new(scheduler),
        }
    }
}

impl PartialEq for AnyScheduler {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

impl std::fmt::Debug for AnyScheduler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AnyScheduler").finish_non_exhaustive()
    }
}

impl Scheduler for AnyScheduler {
    type ScheduleSender = AnySchedule;

    fn schedule(&self) -> AnySchedule {
        AnySchedule {
            inner: Arc::clone(&self.inner),
        }
    }

    fn forward_progress(&self) -> ForwardProgress {
        self.inner.dyn_forward_progress()
    }
}

/// Scheduling sender of [`AnyScheduler`].
#[derive(Clone)]
pub struct AnySchedule {
    inner: Arc<dyn DynScheduler>,
}

impl Sender for AnySchedule {
    type Value = ();

    fn connect<R>(self, receiver: R) -> impl crate::operation::OperationState
    where
        R: crate::receiver::Receiver<Value = ()>,
    {
        AnyScheduleOp {
            inner: self.inner,
            receiver,
        }
    }
}

struct AnyScheduleOp<R> {
    inner: Arc<dyn DynScheduler>,
    receiver: R,
}

impl<R> crate::operation::OperationState for AnyScheduleOp<R>
where
    R: crate::receiver::Receiver<Value = ()>,
{
    fn start(self) {
        let Self { inner, receiver } = self;
        let holder = Arc::new(std::sync::Mutex::new(Some(receiver)));
        let task_holder = Arc::clone(&holder);
        let outcome = inner.submit_boxed(Box::new(move || {
            if let Some(receiver) = task_holder
                .lock()
                .expect("schedule receiver lock poisoned")
                .take()
            {
                receiver.set_value(());
            }
        }));
        if let Err(error) = outcome {
            if let Some(receiver) = holder
                .lock()
                .expect("schedule receiver lock poisoned")
                .take()
            {
                receiver.set_error(error);
            }
        }
    }
}
