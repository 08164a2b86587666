//! Scheduler contract tests: inline, run-loop, and thread pool.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;
use strand::{
    schedule, start_detached, sync_wait, try_schedule, Error, ForwardProgress, InlineScheduler,
    OperationState, Receiver, RunLoop, Scheduler, SenderExt, ThreadPool,
};

#[test]
fn inline_scheduler_completes_in_program_order() {
    let log = Arc::new(Mutex::new(Vec::new()));
    for i in 0..4 {
        let log2 = Arc::clone(&log);
        sync_wait(schedule(&InlineScheduler).then(move |()| {
            log2.lock().unwrap().push(i);
        }))
        .unwrap();
    }
    assert_eq!(*log.lock().unwrap(), vec![0, 1, 2, 3]);
}

#[test]
fn scheduler_handles_compare_equal_per_context() {
    let pool_a = ThreadPool::new(1);
    let pool_b = ThreadPool::new(1);
    assert_eq!(pool_a.scheduler(), pool_a.scheduler());
    assert!(pool_a.scheduler() != pool_b.scheduler());
    assert_eq!(InlineScheduler, InlineScheduler);
}

#[test]
fn forward_progress_guarantees() {
    let pool = ThreadPool::new(1);
    let run_loop = RunLoop::new();
    assert_eq!(
        InlineScheduler.forward_progress(),
        ForwardProgress::WeaklyParallel
    );
    assert_eq!(
        run_loop.scheduler().forward_progress(),
        ForwardProgress::Parallel
    );
    assert_eq!(
        pool.scheduler().forward_progress(),
        ForwardProgress::Parallel
    );
}

#[test]
fn run_loop_executes_submissions_in_fifo_order() {
    let run_loop = Arc::new(RunLoop::new());
    let scheduler = run_loop.scheduler();
    let log = Arc::new(Mutex::new(Vec::new()));

    // Queue everything before the loop runs, so delivery order is purely
    // the queue's.
    for i in 0..10 {
        let log2 = Arc::clone(&log);
        start_detached(schedule(&scheduler).then(move |()| {
            log2.lock().unwrap().push(i);
        }));
    }

    let driver = {
        let run_loop = Arc::clone(&run_loop);
        thread::spawn(move || run_loop.run())
    };
    // Drain, then stop.
    while log.lock().unwrap().len() < 10 {
        thread::yield_now();
    }
    run_loop.finish();
    driver.join().unwrap();

    assert_eq!(*log.lock().unwrap(), (0..10).collect::<Vec<_>>());
}

#[test]
fn ring_tasks_drained_after_finish_complete_stopped() {
    let run_loop = Arc::new(RunLoop::new());
    let scheduler = run_loop.scheduler();

    // Enqueue into the ring, stop the loop, then drive it: the final ring
    // drain runs the task, which observes the stop flag and completes
    // stopped.
    let waiter = {
        let scheduler = scheduler.clone();
        thread::spawn(move || sync_wait(try_schedule(&scheduler)))
    };
    // Give the waiter time to enqueue.
    thread::sleep(std::time::Duration::from_millis(50));
    run_loop.finish();
    run_loop.run();

    assert_eq!(waiter.join().unwrap().unwrap(), None);
}

#[test]
fn thread_pool_runs_work_concurrently() {
    let pool = ThreadPool::new(4);
    let scheduler = pool.scheduler();
    let concurrent = Arc::new(AtomicUsize::new(0));
    let peak = Arc::new(AtomicUsize::new(0));

    let senders: Vec<_> = (0..8)
        .map(|_| {
            let concurrent = Arc::clone(&concurrent);
            let peak = Arc::clone(&peak);
            schedule(&scheduler).then(move |()| {
                let now = concurrent.fetch_add(1, Ordering::SeqCst) + 1;
                peak.fetch_max(now, Ordering::SeqCst);
                thread::sleep(std::time::Duration::from_millis(20));
                concurrent.fetch_sub(1, Ordering::SeqCst);
            })
        })
        .collect();
    sync_wait(strand::when_all_vec(senders)).unwrap();

    assert!(
        peak.load(Ordering::SeqCst) > 1,
        "no two tasks overlapped on a 4-worker pool"
    );
}

#[test]
fn try_schedule_on_saturated_ring_reports_would_block_without_running() {
    // A pool whose single worker is blocked cannot drain the ring; filling
    // the ring forces the distinguished error.
    let pool = ThreadPool::new(1);
    let scheduler = pool.scheduler();

    let release = Arc::new(Mutex::new(()));
    let blocker = release.lock().unwrap();
    {
        let release = Arc::clone(&release);
        start_detached(schedule(&scheduler).then(move |()| {
            drop(release.lock().unwrap());
        }));
    }
    // Give the worker time to pick up the blocking task.
    thread::sleep(std::time::Duration::from_millis(50));

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
    for _ in 0..1500 {
        use strand::Sender;
        try_schedule(&scheduler)
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
        "ring never saturated"
    );
    // Saturated submissions never ran their callable.
    assert_eq!(ran.load(Ordering::SeqCst), 0);

    drop(blocker);
}

#[test]
fn transfer_moves_between_pools() {
    let pool_a = ThreadPool::new(1);
    let pool_b = ThreadPool::new(1);

    let sender = schedule(&pool_a.scheduler())
        .then(|()| thread::current().name().unwrap_or_default().to_owned())
        .transfer(pool_b.scheduler())
        .then(|first| {
            let second = thread::current().name().unwrap_or_default().to_owned();
            (first, second)
        });
    let (first, second) = sync_wait(sender).unwrap().unwrap();
    assert_ne!(first, second, "transfer did not change execution context");
}

#[test]
fn exactly_one_completion_per_operation() {
    struct CountingReceiver {
        completions: Arc<AtomicUsize>,
    }
    impl Receiver for CountingReceiver {
        type Value = ();
        fn set_value(self, (): ()) {
            self.completions.fetch_add(1, Ordering::SeqCst);
        }
        fn set_error(self, _error: Error) {
            self.completions.fetch_add(1, Ordering::SeqCst);
        }
        fn set_stopped(self) {
            self.completions.fetch_add(1, Ordering::SeqCst);
        }
    }

    let pool = ThreadPool::new(2);
    let completions = Arc::new(AtomicUsize::new(0));
    for _ in 0..64 {
        use strand::Sender;
        schedule(&pool.scheduler())
            .connect(CountingReceiver {
                completions: Arc::clone(&completions),
            })
            .start();
    }
    // Synchronise on the pool by waiting for all completions to land.
    let deadline = std::time::Instant::now() + std::time::Duration::from_secs(10);
    while completions.load(Ordering::SeqCst) < 64 {
        assert!(std::time::Instant::now() < deadline, "completions missing");
        thread::yield_now();
    }
    thread::sleep(std::time::Duration::from_millis(50));
    assert_eq!(completions.load(Ordering::SeqCst), 64);
}

#[test]
fn dropping_a_pool_completes_outstanding_work_first() {
    let counter = Arc::new(AtomicUsize::new(0));
    {
        let pool = ThreadPool::new(2);
        let scheduler = pool.scheduler();
        for _ in 0..32 {
            let counter = Arc::clone(&counter);
            start_detached(schedule(&scheduler).then(move |()| {
                counter.fetch_add(1, Ordering::SeqCst);
            }));
        }
    }
    // All queued tasks ran before the workers joined.
    assert_eq!(counter.load(Ordering::SeqCst), 32);
}
