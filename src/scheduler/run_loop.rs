//! The run-loop scheduler: single-threaded cooperative execution.
//!
//! A [`RunLoop`] owns a mutex-protected FIFO (fed by `schedule`) and a
//! lock-free bounded ring (fed by `try_schedule`). One thread drives it via
//! [`RunLoop::run`]; [`RunLoop::finish`] releases that thread. Tasks
//! submitted via `schedule` preserve FIFO order among themselves;
//! `try_schedule` submissions live in the ring and carry no ordering
//! relative to the FIFO.
//!
//! A task that runs after the loop has been stopped completes its receiver
//! with stopped instead of value. On stop the loop drains the ring once
//! more before exiting.

use crate::error::Error;
use crate::operation::OperationState;
use crate::receiver::Receiver;
use crate::scheduler::mpmc::BoundedMpmc;
use crate::scheduler::{DynScheduler, ForwardProgress, Scheduler, TryScheduler};
use crate::sender::Sender;
use crate::tracing_compat::debug;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Condvar, Mutex};

type Task = Box<dyn FnOnce() + Send>;

struct RunLoopInner {
    queue: Mutex<VecDeque<Task>>,
    ring: BoundedMpmc<Task>,
    ring_has_work: AtomicBool,
    cv: Condvar,
    stop: AtomicBool,
}

impl std::fmt::Debug for RunLoopInner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RunLoopInner")
            .field("stop", &self.stop.load(Ordering::Relaxed))
            .finish_non_exhaustive()
    }
}

impl RunLoopInner {
    fn is_stopped(&self) -> bool {
        self.stop.load(Ordering::Acquire)
    }

    fn push(&self, task: Task) {
        {
            let mut queue = self.queue.lock().expect("run loop queue lock poisoned");
            queue.push_back(task);
        }
        self.cv.notify_one();
    }

    fn try_push(&self, task: Task) -> Result<(), Task> {
        self.ring.try_push(task)?;
        // The flag keeps a parked driver from sleeping through a ring-only
        // submission; it participates in the wait predicate below.
        self.ring_has_work.store(true, Ordering::Release);
        self.cv.notify_one();
        Ok(())
    }
}

/// A single-threaded cooperative scheduler.
///
/// Create one, hand out [`RunLoopScheduler`] handles via
/// [`RunLoop::scheduler`], and drive it from exactly one thread with
/// [`RunLoop::run`].
#[derive(Debug)]
pub struct RunLoop {
    inner: Arc<RunLoopInner>,
}

impl RunLoop {
    /// Creates a new, un-driven run loop.
    #[must_use]
    pub fn new() -> Self {
        Self {
            inner: Arc::new(RunLoopInner {
                queue: Mutex::new(VecDeque::new()),
                ring: BoundedMpmc::new(),
                ring_has_work: AtomicBool::new(false),
                cv: Condvar::new(),
                stop: AtomicBool::new(false),
            }),
        }
    }

    /// Returns a scheduler handle for this loop.
    #[must_use]
    pub fn scheduler(&self) -> RunLoopScheduler {
        RunLoopScheduler {
            inner: Arc::clone(&self.inner),
        }
    }

    /// Drives the loop on the calling thread until [`RunLoop::finish`].
    ///
    /// Each iteration drains the ring opportunistically, then waits on the
    /// FIFO. On stop the ring is drained once more before returning.
    pub fn run(&self) {
        let inner = &*self.inner;
        while !inner.is_stopped() {
            // Non-blocking path first.
            if let Some(task) = inner.ring.try_pop() {
                inner.ring_has_work.store(false, Ordering::Relaxed);
                task();
                continue;
            }

            let mut queue = inner.queue.lock().expect("run loop queue lock poisoned");
            while queue.is_empty()
                && !inner.is_stopped()
                && !inner.ring_has_work.load(Ordering::Acquire)
            {
                queue = inner
                    .cv
                    .wait(queue)
                    .expect("run loop queue lock poisoned");
            }

            if inner.is_stopped() && queue.is_empty() {
                break;
            }

            if let Some(task) = queue.pop_front() {
                drop(queue);
                task();
            }
            // Otherwise the ring flag woke us; loop back to the ring.
        }
        // Final ring drain before exiting; the tasks observe the stop flag
        // and complete stopped.
        while let Some(task) = inner.ring.try_pop() {
            task();
        }
        debug!("run loop exited");
    }

    /// Stops the loop; `run` returns once in-flight work is handled.
    pub fn finish(&self) {
        self.inner.stop.store(true, Ordering::Release);
        self.inner.cv.notify_all();
    }
}

impl Default for RunLoop {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for RunLoop {
    fn drop(&mut self) {
        self.finish();
    }
}

/// Scheduler handle of a [`RunLoop`].
#[derive(Clone)]
pub struct RunLoopScheduler {
    inner: Arc<RunLoopInner>,
}

impl PartialEq for RunLoopScheduler {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

impl std::fmt::Debug for RunLoopScheduler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RunLoopScheduler").finish_non_exhaustive()
    }
}

impl Scheduler for RunLoopScheduler {
    type ScheduleSender = RunLoopSchedule;

    fn schedule(&self) -> RunLoopSchedule {
        RunLoopSchedule {
            inner: Arc::clone(&self.inner),
        }
    }

    fn forward_progress(&self) -> ForwardProgress {
        ForwardProgress::Parallel
    }
}

impl TryScheduler for RunLoopScheduler {
    type TryScheduleSender = RunLoopTrySchedule;

    fn try_schedule(&self) -> RunLoopTrySchedule {
        RunLoopTrySchedule {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl DynScheduler for RunLoopScheduler {
    fn submit_boxed(&self, task: Box<dyn FnOnce() + Send>) -> crate::error::Result<()> {
        self.inner.push(task);
        Ok(())
    }

    fn dyn_forward_progress(&self) -> ForwardProgress {
        ForwardProgress::Parallel
    }
}

/// Blocking scheduling sender of a run loop.
#[derive(Clone)]
pub struct RunLoopSchedule {
    inner: Arc<RunLoopInner>,
}

impl Sender for RunLoopSchedule {
    type Value = ();

    fn connect<R>(self, receiver: R) -> impl OperationState
    where
        R: Receiver<Value = ()>,
    {
        ScheduleOp {
            inner: self.inner,
            receiver,
        }
    }
}

struct ScheduleOp<R> {
    inner: Arc<RunLoopInner>,
    receiver: R,
}

impl<R> OperationState for ScheduleOp<R>
where
    R: Receiver<Value = ()>,
{
    fn start(self) {
        let Self { inner, receiver } = self;
        let loop_ref = Arc::clone(&inner);
        inner.push(Box::new(move || {
            // The loop may have stopped between enqueue and execution.
            if loop_ref.is_stopped() {
                receiver.set_stopped();
            } else {
                receiver.set_value(());
            }
        }));
    }
}

/// Non-blocking scheduling sender of a run loop.
#[derive(Clone)]
pub struct RunLoopTrySchedule {
    inner: Arc<RunLoopInner>,
}

impl Sender for RunLoopTrySchedule {
    type Value = ();

    fn connect<R>(self, receiver: R) -> impl OperationState
    where
        R: Receiver<Value = ()>,
    {
        TryScheduleOp {
            inner: self.inner,
            receiver,
        }
    }
}

struct TryScheduleOp<R> {
    inner: Arc<RunLoopInner>,
    receiver: R,
}

impl<R> OperationState for TryScheduleOp<R>
where
    R: Receiver<Value = ()>,
{
    fn start(self) {
        let Self { inner, receiver } = self;
        let holder = Arc::new(Mutex::new(Some(receiver)));
        let task_holder = Arc::clone(&holder);
        let loop_ref = Arc::clone(&inner);
        let task: Task = Box::new(move || {
            if let Some(receiver) = task_holder
                .lock()
                .expect("try_schedule receiver lock poisoned")
                .take()
            {
                if loop_ref.is_stopped() {
                    receiver.set_stopped();
                } else {
                    receiver.set_value(());
                }
            }
        });
        if inner.try_push(task).is_err() {
            // Ring saturated; the callable never runs.
            if let Some(receiver) = holder
                .lock()
                .expect("try_schedule receiver lock poisoned")
                .take()
            {
                receiver.set_error(Error::would_block());
            }
        }
    }
}
