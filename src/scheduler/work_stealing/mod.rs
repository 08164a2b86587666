//! The work-stealing scheduler, modelled on Go's G/P/M runtime.
//!
//! Structure: `N` logical processors ([`processor::Processor`]), each with a
//! bounded local deque and bound 1:1 to a worker thread; one unbounded
//! mutex-protected global overflow queue; a condition variable for parking
//! idle workers.
//!
//! Submission picks a processor via a thread-local RNG and falls back to the
//! global queue when the local deque is full. The non-blocking variant scans
//! every processor round-robin and fails with `would_block` rather than
//! touch the global queue (whose mutex may block).
//!
//! Each worker iteration: pop and run up to 32 tasks from the front of the
//! owned deque; every 61 executed tasks poll the global queue once (the Go
//! fairness counter); if nothing ran, attempt up to 4 random-victim steals
//! from the back of peer deques; then check the global queue directly (an
//! idle worker must not starve overflow work); finally park on the condition
//! variable with a 100 µs timeout. On shutdown each worker drains its own
//! deque once and exits.

pub(crate) mod processor;
pub(crate) mod stats;
pub(crate) mod task;

pub use stats::StatsSnapshot;

use crate::error::Error;
use crate::operation::OperationState;
use crate::receiver::Receiver;
use crate::scheduler::{BuildError, DynScheduler, ForwardProgress, Scheduler, TryScheduler};
use crate::sender::Sender;
use crate::tracing_compat::{debug, trace, warn};
use crate::util::{catch_panic, DetRng};
use processor::Processor;
use stats::ProcessorStats;
use std::cell::RefCell;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Condvar, Mutex};
use std::thread;
use std::time::Duration;
use task::Task;

/// Tasks a worker runs from its own deque before checking elsewhere.
const WORK_BATCH_SIZE: usize = 32;
/// Poll the global queue once every this many executed tasks.
const GLOBAL_POLL_INTERVAL: u64 = 61;
/// Random-victim attempts per idle round.
const STEAL_ATTEMPTS: usize = 4;
/// Park timeout; bounds the latency of steal opportunities lost to races.
const PARK_TIMEOUT: Duration = Duration::from_micros(100);

struct GlobalQueue {
    queue: Mutex<VecDeque<Task>>,
    has_work: AtomicBool,
}

impl GlobalQueue {
    fn new() -> Self {
        Self {
            queue: Mutex::new(VecDeque::new()),
            has_work: AtomicBool::new(false),
        }
    }

    fn push(&self, task: Task) {
        let mut queue = self.queue.lock().expect("global queue lock poisoned");
        queue.push_back(task);
        self.has_work.store(true, Ordering::Release);
    }

    fn try_pop(&self) -> Option<Task> {
        let Ok(mut queue) = self.queue.try_lock() else {
            return None;
        };
        let task = queue.pop_front();
        if queue.is_empty() {
            self.has_work.store(false, Ordering::Release);
        }
        task
    }

    fn has_work(&self) -> bool {
        self.has_work.load(Ordering::Acquire)
    }
}

struct PoolInner {
    processors: Vec<Processor>,
    global: GlobalQueue,
    park_mutex: Mutex<()>,
    cv: Condvar,
    stop: AtomicBool,
    next_proc: AtomicUsize,
}

fn submit_seed() -> u64 {
    static NEXT: AtomicU64 = AtomicU64::new(0x9E37_79B9_7F4A_7C15);
    NEXT.fetch_add(0x9E37_79B9_7F4A_7C15, Ordering::Relaxed)
}

thread_local! {
    static SUBMIT_RNG: RefCell<DetRng> = RefCell::new(DetRng::new(submit_seed()));
}

impl PoolInner {
    /// Blocking submission; silently absorbed after shutdown.
    fn submit_task(&self, task: Task) {
        if self.stop.load(Ordering::Acquire) {
            return;
        }
        let start = SUBMIT_RNG
            .with(|rng| rng.borrow_mut().next_usize(self.processors.len()));
        if let Err(task) = self.processors[start].try_push_local(task) {
            // Local deque full or contended; overflow to the global queue.
            self.global.push(task);
        }
        self.cv.notify_one();
    }

    /// Non-blocking submission: scan every processor round-robin, never
    /// touching the global queue.
    fn try_submit_task(&self, mut task: Task) -> Result<(), Task> {
        let count = self.processors.len();
        let start = self.next_proc.fetch_add(1, Ordering::Relaxed) % count;
        for i in 0..count {
            match self.processors[(start + i) % count].try_push_local(task) {
                Ok(()) => {
                    self.cv.notify_one();
                    return Ok(());
                }
                Err(rejected) => task = rejected,
            }
        }
        Err(task)
    }

    fn run_task(processor: &Processor, task: Task) {
        if task.is_cancelled() {
            return;
        }
        if catch_panic(|| task.run()).is_err() {
            warn!("work-stealing task panicked past the adaptor boundary");
        }
        ProcessorStats::bump(&processor.stats.tasks_executed);
    }

    fn any_peer_has_work(&self, exclude: usize) -> bool {
        self.processors
            .iter()
            .enumerate()
            .any(|(id, processor)| id != exclude && processor.has_work())
    }

    fn worker_loop(&self, proc_id: usize) {
        let processor = &self.processors[proc_id];

        while !self.stop.load(Ordering::Acquire) {
            let mut processed = 0;

            // Phase 1: local work, front pops, best cache locality.
            while processed < WORK_BATCH_SIZE {
                let Some(task) = processor.pop_local() else {
                    break;
                };
                ProcessorStats::bump(&processor.stats.local_queue_pops);
                Self::run_task(processor, task);
                processed += 1;
            }

            // Phase 2: fairness sweep of the global queue, 1-in-61.
            if processor.stats.tasks_executed.load(Ordering::Relaxed) % GLOBAL_POLL_INTERVAL == 0
                && self.global.has_work()
            {
                if let Some(task) = self.global.try_pop() {
                    ProcessorStats::bump(&processor.stats.global_queue_pops);
                    Self::run_task(processor, task);
                    processed += 1;
                }
            }

            // Phase 3: steal only when the local phase came up empty.
            if processed == 0 && self.processors.len() > 1 {
                for _ in 0..STEAL_ATTEMPTS {
                    ProcessorStats::bump(&processor.stats.steals_attempted);
                    let victim = processor.random_victim(self.processors.len(), proc_id);
                    if let Some(task) = self.processors[victim].try_steal() {
                        trace!(worker = proc_id, victim, "steal succeeded");
                        ProcessorStats::bump(&processor.stats.steals_succeeded);
                        Self::run_task(processor, task);
                        processed += 1;
                        break;
                    }
                }
            }

            // An idle worker must not starve the overflow queue while it
            // waits for the fairness counter to come around.
            if processed == 0 {
                if let Some(task) = self.global.try_pop() {
                    ProcessorStats::bump(&processor.stats.global_queue_pops);
                    Self::run_task(processor, task);
                    processed += 1;
                }
            }

            // Phase 4: park, re-checking under the lock to bound lost
            // wakeups by the timeout.
            if processed == 0 {
                let guard = self.park_mutex.lock().expect("park lock poisoned");
                let has_work = processor.has_work()
                    || self.global.has_work()
                    || self.any_peer_has_work(proc_id);
                if !has_work && !self.stop.load(Ordering::Acquire) {
                    let _ = self
                        .cv
                        .wait_timeout(guard, PARK_TIMEOUT)
                        .expect("park lock poisoned");
                }
            }
        }

        // Shutdown: drain the owned deque once and exit.
        while let Some(task) = processor.pop_draining() {
            Self::run_task(processor, task);
        }
        debug!(worker = proc_id, "work-stealing worker exited");
    }
}

/// A work-stealing scheduler context with one worker thread per processor.
pub struct WorkStealingPool {
    inner: Arc<PoolInner>,
    workers: Vec<thread::JoinHandle<()>>,
}

impl WorkStealingPool {
    /// Creates a pool with `processors` processor/worker pairs.
    ///
    /// # Panics
    ///
    /// Panics if `processors` is zero; use [`WorkStealingPool::builder`]
    /// for validated construction.
    #[must_use]
    pub fn new(processors: usize) -> Self {
        Self::builder()
            .workers(processors)
            .build()
            .expect("processor count must be greater than zero")
    }

    /// Returns a builder with the default processor count (available
    /// parallelism).
    #[must_use]
    pub fn builder() -> WorkStealingBuilder {
        WorkStealingBuilder { workers: None }
    }

    /// Returns a scheduler handle for this pool.
    #[must_use]
    pub fn scheduler(&self) -> WorkStealingScheduler {
        WorkStealingScheduler {
            inner: Arc::clone(&self.inner),
        }
    }

    /// The number of processors (and worker threads).
    #[must_use]
    pub fn processor_count(&self) -> usize {
        self.inner.processors.len()
    }

    /// A best-effort statistics snapshot for one processor.
    ///
    /// Out-of-range ids yield an all-zero snapshot.
    #[must_use]
    pub fn stats(&self, proc_id: usize) -> StatsSnapshot {
        self.inner
            .processors
            .get(proc_id)
            .map(|processor| processor.stats.snapshot())
            .unwrap_or_default()
    }

    #[cfg(test)]
    pub(crate) fn inner(&self) -> &Arc<PoolInner> {
        &self.inner
    }
}

impl std::fmt::Debug for WorkStealingPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorkStealingPool")
            .field("processors", &self.processor_count())
            .finish_non_exhaustive()
    }
}

impl Drop for WorkStealingPool {
    fn drop(&mut self) {
        self.inner.stop.store(true, Ordering::Release);
        self.inner.cv.notify_all();
        for worker in self.workers.drain(..) {
            if worker.join().is_err() {
                warn!("work-stealing worker terminated abnormally");
            }
        }
    }
}

/// Builder for [`WorkStealingPool`].
#[derive(Debug, Default)]
pub struct WorkStealingBuilder {
    workers: Option<usize>,
}

impl WorkStealingBuilder {
    /// Sets the processor/worker count.
    #[must_use]
    pub fn workers(mut self, workers: usize) -> Self {
        self.workers = Some(workers);
        self
    }

    /// Builds the pool, spawning its workers.
    pub fn build(self) -> Result<WorkStealingPool, BuildError> {
        let count = match self.workers {
            Some(0) => return Err(BuildError::ZeroWorkers),
            Some(n) => n,
            None => thread::available_parallelism().map_or(1, std::num::NonZeroUsize::get),
        };
        let inner = Arc::new(PoolInner {
            processors: (0..count)
                .map(|id| Processor::new(id as u64 + 1))
                .collect(),
            global: GlobalQueue::new(),
            park_mutex: Mutex::new(()),
            cv: Condvar::new(),
            stop: AtomicBool::new(false),
            next_proc: AtomicUsize::new(0),
        });
        let workers = (0..count)
            .map(|proc_id| {
                let inner = Arc::clone(&inner);
                thread::Builder::new()
                    .name(format!("strand-wss-{proc_id}"))
                    .spawn(move || inner.worker_loop(proc_id))
                    .expect("failed to spawn work-stealing worker")
            })
            .collect();
        Ok(WorkStealingPool { inner, workers })
    }
}

/// Scheduler handle of a [`WorkStealingPool`].
#[derive(Clone)]
pub struct WorkStealingScheduler {
    inner: Arc<PoolInner>,
}

impl PartialEq for WorkStealingScheduler {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

impl std::fmt::Debug for WorkStealingScheduler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorkStealingScheduler").finish_non_exhaustive()
    }
}

impl Scheduler for WorkStealingScheduler {
    type ScheduleSender = WssSchedule;

    fn schedule(&self) -> WssSchedule {
        WssSchedule {
            inner: Arc::clone(&self.inner),
        }
    }

    fn forward_progress(&self) -> ForwardProgress {
        ForwardProgress::Parallel
    }
}

impl TryScheduler for WorkStealingScheduler {
    type TryScheduleSender = WssTrySchedule;

    fn try_schedule(&self) -> WssTrySchedule {
        WssTrySchedule {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl DynScheduler for WorkStealingScheduler {
    fn submit_boxed(&self, task: Box<dyn FnOnce() + Send>) -> crate::error::Result<()> {
        self.inner.submit_task(Task::new(task));
        Ok(())
    }

    fn dyn_forward_progress(&self) -> ForwardProgress {
        ForwardProgress::Parallel
    }
}

/// Blocking scheduling sender of a work-stealing pool.
#[derive(Clone)]
pub struct WssSchedule {
    inner: Arc<PoolInner>,
}

impl Sender for WssSchedule {
    type Value = ();

    fn connect<R>(self, receiver: R) -> impl OperationState
    where
        R: Receiver<Value = ()>,
    {
        WssScheduleOp {
            inner: self.inner,
            receiver,
        }
    }
}

struct WssScheduleOp<R> {
    inner: Arc<PoolInner>,
    receiver: R,
}

impl<R> OperationState for WssScheduleOp<R>
where
    R: Receiver<Value = ()>,
{
    fn start(self) {
        let Self { inner, receiver } = self;
        inner.submit_task(Task::new(Box::new(move || receiver.set_value(()))));
    }
}

/// Non-blocking scheduling sender of a work-stealing pool.
#[derive(Clone)]
pub struct WssTrySchedule {
    inner: Arc<PoolInner>,
}

impl Sender for WssTrySchedule {
    type Value = ();

    fn connect<R>(self, receiver: R) -> impl OperationState
    where
        R: Receiver<Value = ()>,
    {
        WssTryScheduleOp {
            inner: self.inner,
            receiver,
        }
    }
}

struct WssTryScheduleOp<R> {
    inner: Arc<PoolInner>,
    receiver: R,
}

impl<R> OperationState for WssTryScheduleOp<R>
where
    R: Receiver<Value = ()>,
{
    fn start(self) {
        let Self { inner, receiver } = self;
        let holder = Arc::new(Mutex::new(Some(receiver)));
        let task_holder = Arc::clone(&holder);
        let task = Task::new(Box::new(move || {
            if let Some(receiver) = task_holder
                .lock()
                .expect("try_schedule receiver lock poisoned")
                .take()
            {
                receiver.set_value(());
            }
        }));
        if inner.try_submit_task(task).is_err() {
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
