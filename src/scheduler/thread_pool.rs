//! The thread-pool scheduler: a fixed worker set over a shared queue.
//!
//! Workers share one mutex-protected FIFO (fed by `schedule`) and one
//! lock-free bounded ring (fed by `try_schedule`) with a has-work flag.
//! Each worker loop tries the ring first, then parks on the condition
//! variable until stop, FIFO work, or the ring flag. Shutdown notifies all
//! workers; each drains the ring once more before exiting.
//!
//! Dropping the pool stops and joins the workers. Submitting through a
//! handle after shutdown is absorbed silently: the task is dropped and the
//! scheduling sender never completes.

use crate::error::Error;
use crate::operation::OperationState;
use crate::receiver::Receiver;
use crate::scheduler::mpmc::BoundedMpmc;
use crate::scheduler::{BuildError, DynScheduler, ForwardProgress, Scheduler, TryScheduler};
use crate::sender::Sender;
use crate::tracing_compat::{debug, warn};
use crate::util::catch_panic;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Condvar, Mutex};
use std::thread;

type Task = Box<dyn FnOnce() + Send>;

struct PoolState {
    queue: VecDeque<Task>,
    stop: bool,
}

struct PoolInner {
    state: Mutex<PoolState>,
    cv: Condvar,
    ring: BoundedMpmc<Task>,
    ring_has_work: AtomicBool,
}

impl PoolInner {
    /// Blocking submission; silently absorbed after shutdown.
    fn submit(&self, task: Task) {
        {
            let mut state = self.state.lock().expect("thread pool lock poisoned");
            if state.stop {
                return;
            }
            state.queue.push_back(task);
        }
        self.cv.notify_one();
    }

    /// Non-blocking submission through the ring.
    fn try_submit(&self, task: Task) -> Result<(), Task> {
        self.ring.try_push(task)?;
        self.ring_has_work.store(true, Ordering::Release);
        self.cv.notify_one();
        Ok(())
    }

    fn run_task(task: Task) {
        if catch_panic(task).is_err() {
            // The adaptor layer converts user panics before they get here;
            // anything that still unwinds must not take the worker down.
            warn!("thread pool task panicked past the adaptor boundary");
        }
    }

    fn worker_loop(&self, worker: usize) {
        loop {
            // Non-blocking ring first.
            if let Some(task) = self.ring.try_pop() {
                self.ring_has_work.store(false, Ordering::Relaxed);
                Self::run_task(task);
                continue;
            }

            let task = {
                let mut state = self.state.lock().expect("thread pool lock poisoned");
                while !state.stop
                    && state.queue.is_empty()
                    && !self.ring_has_work.load(Ordering::Acquire)
                {
                    state = self
                        .cv
                        .wait(state)
                        .expect("thread pool lock poisoned");
                }

                if state.stop && state.queue.is_empty() {
                    drop(state);
                    // Final ring drain before exiting.
                    while let Some(task) = self.ring.try_pop() {
                        Self::run_task(task);
                    }
                    debug!(worker, "thread pool worker exited");
                    return;
                }

                state.queue.pop_front()
            };

            if let Some(task) = task {
                Self::run_task(task);
            }
            // Otherwise the ring flag woke us; loop back to the ring.
        }
    }
}

/// A fixed-size thread pool.
#[derive(Debug)]
pub struct ThreadPool {
    inner: Arc<PoolInner>,
    workers: Vec<thread::JoinHandle<()>>,
}

impl std::fmt::Debug for PoolInner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PoolInner").finish_non_exhaustive()
    }
}

impl ThreadPool {
    /// Creates a pool with `workers` threads.
    ///
    /// # Panics
    ///
    /// Panics if `workers` is zero; use [`ThreadPool::builder`] for
    /// validated construction.
    #[must_use]
    pub fn new(workers: usize) -> Self {
        Self::builder()
            .workers(workers)
            .build()
            .expect("worker count must be greater than zero")
    }

    /// Returns a builder with the default worker count (available
    /// parallelism).
    #[must_use]
    pub fn builder() -> ThreadPoolBuilder {
        ThreadPoolBuilder { workers: None }
    }

    /// Returns a scheduler handle for this pool.
    #[must_use]
    pub fn scheduler(&self) -> ThreadPoolScheduler {
        ThreadPoolScheduler {
            inner: Arc::clone(&self.inner),
        }
    }

    /// The number of worker threads.
    #[must_use]
    pub fn worker_count(&self) -> usize {
        self.workers.len()
    }
}

impl Drop for ThreadPool {
    fn drop(&mut self) {
        {
            let mut state = self.inner.state.lock().expect("thread pool lock poisoned");
            state.stop = true;
        }
        self.inner.cv.notify_all();
        for worker in self.workers.drain(..) {
            if worker.join().is_err() {
                warn!("thread pool worker terminated abnormally");
            }
        }
    }
}

/// Builder for [`ThreadPool`].
#[derive(Debug, Default)]
pub struct ThreadPoolBuilder {
    workers: Option<usize>,
}

impl ThreadPoolBuilder {
    /// Sets the worker count.
    #[must_use]
    pub fn workers(mut self, workers: usize) -> Self {
        self.workers = Some(workers);
        self
    }

    /// Builds the pool, spawning its workers.
    pub fn build(self) -> Result<ThreadPool, BuildError> {
        let workers = match self.workers {
            Some(0) => return Err(BuildError::ZeroWorkers),
            Some(n) => n,
            None => thread::available_parallelism().map_or(1, std::num::NonZeroUsize::get),
        };
        let inner = Arc::new(PoolInner {
            state: Mutex::new(PoolState {
                queue: VecDeque::new(),
                stop: false,
            }),
            cv: Condvar::new(),
            ring: BoundedMpmc::new(),
            ring_has_work: AtomicBool::new(false),
        });
        let handles = (0..workers)
            .map(|worker| {
                let inner = Arc::clone(&inner);
                thread::Builder::new()
                    .name(format!("strand-pool-{worker}"))
                    .spawn(move || inner.worker_loop(worker))
                    .expect("failed to spawn thread pool worker")
            })
            .collect();
        Ok(ThreadPool {
            inner,
            workers: handles,
        })
    }
}

/// Scheduler handle of a [`ThreadPool`].
#[derive(Clone)]
pub struct ThreadPoolScheduler {
    inner: Arc<PoolInner>,
}

impl PartialEq for ThreadPoolScheduler {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

impl std::fmt::Debug for ThreadPoolScheduler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ThreadPoolScheduler").finish_non_exhaustive()
    }
}

impl Scheduler for ThreadPoolScheduler {
    type ScheduleSender = PoolSchedule;

    fn schedule(&self) -> PoolSchedule {
        PoolSchedule {
            inner: Arc::clone(&self.inner),
        }
    }

    fn forward_progress(&self) -> ForwardProgress {
        ForwardProgress::Parallel
    }
}

impl TryScheduler for ThreadPoolScheduler {
    type TryScheduleSender = PoolTrySchedule;

    fn try_schedule(&self) -> PoolTrySchedule {
        PoolTrySchedule {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl DynScheduler for ThreadPoolScheduler {
    fn submit_boxed(&self, task: Box<dyn FnOnce() + Send>) -> crate::error::Result<()> {
        self.inner.submit(task);
        Ok(())
    }

    fn dyn_forward_progress(&self) -> ForwardProgress {
        ForwardProgress::Parallel
    }
}

/// Blocking scheduling sender of a thread pool.
#[derive(Clone)]
pub struct PoolSchedule {
    inner: Arc<PoolInner>,
}

impl Sender for PoolSchedule {
    type Value = ();

    fn connect<R>(self, receiver: R) -> impl OperationState
    where
        R: Receiver<Value = ()>,
    {
        PoolScheduleOp {
            inner: self.inner,
            receiver,
        }
    }
}

struct PoolScheduleOp<R> {
    inner: Arc<PoolInner>,
    receiver: R,
}

impl<R> OperationState for PoolScheduleOp<R>
where
    R: Receiver<Value = ()>,
{
    fn start(self) {
        let Self { inner, receiver } = self;
        inner.submit(Box::new(move || receiver.set_value(())));
    }
}

/// Non-blocking scheduling sender of a thread pool.
#[derive(Clone)]
pub struct PoolTrySchedule {
    inner: Arc<PoolInner>,
}

impl Sender for PoolTrySchedule {
    type Value = ();

    fn connect<R>(self, receiver: R) -> impl OperationState
    where
        R: Receiver<Value = ()>,
    {
        PoolTryScheduleOp {
            inner: self.inner,
            receiver,
        }
    }
}

struct PoolTryScheduleOp<R> {
    inner: Arc<PoolInner>,
    receiver: R,
}

impl<R> OperationState for PoolTryScheduleOp<R>
where
    R: Receiver<Value = ()>,
{
    fn start(self) {
        let Self { inner, receiver } = self;
        let holder = Arc::new(Mutex::new(Some(receiver)));
        let task_holder = Arc::clone(&holder);
        let task: Task = Box::new(move || {
            if let Some(receiver) = task_holder
                .lock()
                .expect("try_schedule receiver lock poisoned")
                .take()
            {
                receiver.set_value(());
            }
        });
        if inner.try_submit(task).is_err() {
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
