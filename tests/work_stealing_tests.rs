//! Work-stealing scheduler: distribution, stealing, saturation, stats.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Condvar, Mutex};
use std::time::{Duration, Instant};
use strand::{
    schedule, start_detached, sync_wait, try_schedule, Error, OperationState, Receiver, Sender,
    SenderExt, WorkStealingPool,
};

/// Burns a roughly constant slice of CPU.
fn spin_work() -> u64 {
    let mut acc = 0_u64;
    for i in 0..50_000_u64 {
        acc = acc.wrapping_mul(31).wrapping_add(std::hint::black_box(i));
    }
    acc
}

/// Submits `count` tasks and blocks until all have run.
fn run_batch(pool: &WorkStealingPool, count: usize, work: impl Fn() + Send + Sync + 'static) {
    let work = Arc::new(work);
    let done = Arc::new((Mutex::new(0_usize), Condvar::new()));
    for _ in 0..count {
        let work = Arc::clone(&work);
        let done = Arc::clone(&done);
        start_detached(schedule(&pool.scheduler()).then(move |()| {
            work();
            let (lock, cv) = &*done;
            *lock.lock().unwrap() += 1;
            cv.notify_one();
        }));
    }
    let (lock, cv) = &*done;
    let mut finished = lock.lock().unwrap();
    let deadline = Instant::now() + Duration::from_secs(60);
    while *finished < count {
        let timeout = deadline.saturating_duration_since(Instant::now());
        assert!(!timeout.is_zero(), "batch did not complete");
        let (guard, _) = cv.wait_timeout(finished, timeout).unwrap();
        finished = guard;
    }
}

#[test]
fn tasks_complete_across_workers() {
    let pool = WorkStealingPool::new(4);
    let counter = Arc::new(AtomicUsize::new(0));
    let counter2 = Arc::clone(&counter);
    run_batch(&pool, 1000, move || {
        counter2.fetch_add(1, Ordering::SeqCst);
    });
    assert_eq!(counter.load(Ordering::SeqCst), 1000);
}

#[test]
fn comparable_tasks_spread_across_workers() {
    // 500 CPU-bound tasks of comparable cost on 8 workers: gross imbalance
    // detection per the scheduler's distribution policy.
    let pool = WorkStealingPool::new(8);
    run_batch(&pool, 500, || {
        std::hint::black_box(spin_work());
    });

    let per_worker: Vec<u64> = (0..pool.processor_count())
        .map(|id| pool.stats(id).tasks_executed)
        .collect();
    let total: u64 = per_worker.iter().sum();
    assert_eq!(total, 500);

    let max = per_worker.iter().copied().max().unwrap();
    let min = per_worker.iter().copied().min().unwrap();
    assert!(
        min * 10 >= max,
        "gross imbalance: per-worker counts {per_worker:?}"
    );
}

#[test]
fn steals_happen_under_load() {
    let pool = WorkStealingPool::new(4);
    run_batch(&pool, 2000, || {
        std::hint::black_box(spin_work());
    });
    let attempted: u64 = (0..pool.processor_count())
        .map(|id| pool.stats(id).steals_attempted)
        .sum();
    // Workers idled at least occasionally, so steal attempts were made.
    assert!(attempted > 0, "no steal attempts under load");
}

#[test]
fn pops_are_accounted_by_source() {
    let pool = WorkStealingPool::new(2);
    run_batch(&pool, 300, || {});
    let mut local = 0;
    let mut global = 0;
    let mut executed = 0;
    let mut stolen = 0;
    for id in 0..pool.processor_count() {
        let snapshot = pool.stats(id);
        local += snapshot.local_queue_pops;
        global += snapshot.global_queue_pops;
        executed += snapshot.tasks_executed;
        stolen += snapshot.steals_succeeded;
    }
    assert_eq!(executed, 300);
    // Every executed task was popped locally, from the global queue, or
    // stolen.
    assert_eq!(local + global + stolen, 300);
}

#[test]
fn try_schedule_completes_or_reports_would_block() {
    let pool = WorkStealingPool::new(2);
    assert_eq!(
        sync_wait(try_schedule(&pool.scheduler()).then(|()| 9)).unwrap(),
        Some(9)
    );
}

#[test]
fn try_submit_saturation_never_runs_the_callable() {
    // One worker wedged on a blocking task; its deque (capacity 256) fills
    // up and try_submit has nowhere to go.
    let pool = WorkStealingPool::new(1);
    let release = Arc::new((Mutex::new(false), Condvar::new()));
    {
        let release = Arc::clone(&release);
        start_detached(schedule(&pool.scheduler()).then(move |()| {
            let (lock, cv) = &*release;
            let mut released = lock.lock().unwrap();
            while !*released {
                released = cv.wait(released).unwrap();
            }
        }));
    }
    std::thread::sleep(Duration::from_millis(50));

    struct Completion {
        would_block: Arc<AtomicUsize>,
        ran: Arc<AtomicUsize>,
    }
    impl Receiver for Completion {
        type Value = ();
        fn set_value(self, (): ()) {
            self.ran.fetch_add(1, Ordering::SeqCst);
        }
        fn set_error(self, error: Error) {
            assert!(error.is_would_block());
            self.would_block.fetch_add(1, Ordering::SeqCst);
        }
        fn set_stopped(self) {}
    }

    let would_block = Arc::new(AtomicUsize::new(0));
    let ran = Arc::new(AtomicUsize::new(0));
    for _ in 0..400 {
        try_schedule(&pool.scheduler())
            .connect(Completion {
                would_block: Arc::clone(&would_block),
                ran: Arc::clone(&ran),
            })
            .start();
        if would_block.load(Ordering::SeqCst) > 0 {
            break;
        }
    }
    assert!(
        would_block.load(Ordering::SeqCst) > 0,
        "local deque never saturated"
    );
    assert_eq!(ran.load(Ordering::SeqCst), 0);

    let (lock, cv) = &*release;
    *lock.lock().unwrap() = true;
    cv.notify_all();
}

#[test]
fn overflow_spills_to_the_global_queue_and_still_runs() {
    // Saturate a single-processor pool far past the 256-entry deque bound;
    // the overflow lands in the global queue and every task still runs.
    let pool = WorkStealingPool::new(1);
    let counter = Arc::new(AtomicUsize::new(0));
    let counter2 = Arc::clone(&counter);
    run_batch(&pool, 3000, move || {
        counter2.fetch_add(1, Ordering::SeqCst);
    });
    assert_eq!(counter.load(Ordering::SeqCst), 3000);
    let stats = pool.stats(0);
    assert_eq!(stats.steals_succeeded, 0, "nobody to steal from");
}
