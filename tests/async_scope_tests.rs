//! Async scope lifecycle: associations, join, scoped cancellation.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;
use strand::{
    associate, just, schedule, spawn, spawn_future, sync_wait, CountingScope, ScopeToken,
    SenderExt, SimpleCountingScope, ThreadPool,
};

#[test]
fn join_balances_associations() {
    // Every successful try_associate is matched by a disassociate by the
    // time join completes.
    let scope = SimpleCountingScope::new();
    let token = scope.token();

    let balance = Arc::new(AtomicUsize::new(0));
    for _ in 0..7 {
        assert!(token.try_associate());
        balance.fetch_add(1, Ordering::SeqCst);
    }
    for _ in 0..7 {
        token.disassociate();
        balance.fetch_sub(1, Ordering::SeqCst);
    }
    assert_eq!(sync_wait(scope.join()).unwrap(), Some(()));
    assert_eq!(balance.load(Ordering::SeqCst), 0);
}

#[test]
fn join_waits_for_pool_work() {
    let pool = ThreadPool::new(2);
    let scope = SimpleCountingScope::new();
    let counter = Arc::new(AtomicUsize::new(0));

    for _ in 0..5 {
        let counter = Arc::clone(&counter);
        spawn(
            schedule(&pool.scheduler()).then(move |()| {
                thread::sleep(Duration::from_millis(20));
                counter.fetch_add(1, Ordering::SeqCst);
            }),
            scope.token(),
        );
    }

    assert_eq!(sync_wait(scope.join()).unwrap(), Some(()));
    // Join completed only after every spawned task ran.
    assert_eq!(counter.load(Ordering::SeqCst), 5);
}

#[test]
fn spawn_after_close_never_runs() {
    let scope = SimpleCountingScope::new();
    scope.close();
    let ran = Arc::new(AtomicUsize::new(0));
    let ran2 = Arc::clone(&ran);
    spawn(
        just(()).then(move |()| {
            ran2.fetch_add(1, Ordering::SeqCst);
        }),
        scope.token(),
    );
    assert_eq!(ran.load(Ordering::SeqCst), 0);
}

#[test]
fn associate_releases_on_every_channel() {
    let scope = SimpleCountingScope::new();

    assert_eq!(
        sync_wait(associate(just(1), scope.token())).unwrap(),
        Some(1)
    );
    assert!(sync_wait(associate(
        strand::just_error::<i32>(strand::Error::user("x")),
        scope.token()
    ))
    .is_err());
    assert_eq!(
        sync_wait(associate(strand::just_stopped::<i32>(), scope.token())).unwrap(),
        None
    );

    assert_eq!(sync_wait(scope.join()).unwrap(), Some(()));
}

#[test]
fn counting_scope_stop_propagates_to_children() {
    let pool = ThreadPool::new(2);
    let scope = CountingScope::new();
    let observed_stop = Arc::new(AtomicUsize::new(0));

    let observed = Arc::clone(&observed_stop);
    let stop_token = scope.stop_token();
    spawn(
        schedule(&pool.scheduler()).then(move |()| {
            // Cooperative child: poll the scope's token until it trips.
            for _ in 0..200 {
                if stop_token.stop_requested() {
                    observed.fetch_add(1, Ordering::SeqCst);
                    return;
                }
                thread::sleep(Duration::from_millis(5));
            }
        }),
        scope.token(),
    );

    thread::sleep(Duration::from_millis(20));
    scope.request_stop();
    assert_eq!(sync_wait(scope.join()).unwrap(), Some(()));
    assert_eq!(observed_stop.load(Ordering::SeqCst), 1);
}

#[test]
fn counting_scope_wrap_downgrades_post_stop_values() {
    let scope = CountingScope::new();
    let token = scope.token();
    scope.request_stop();

    // The wrapped sender value-completes, but the scope already stopped, so
    // the association delivers stopped.
    assert_eq!(
        sync_wait(associate(just(5), token)).unwrap(),
        None
    );
    assert_eq!(sync_wait(scope.join()).unwrap(), Some(()));
}

#[test]
fn spawn_future_observes_completed_work() {
    let scope = SimpleCountingScope::new();
    let future = spawn_future(just(2).then(|x| x * 21), scope.token());
    assert_eq!(sync_wait(future).unwrap(), Some(42));
    assert_eq!(sync_wait(scope.join()).unwrap(), Some(()));
}

#[test]
fn spawn_future_of_incomplete_work_is_stopped() {
    let pool = ThreadPool::new(1);
    let scope = SimpleCountingScope::new();
    let future = spawn_future(
        schedule(&pool.scheduler()).then(|()| {
            thread::sleep(Duration::from_millis(100));
            1
        }),
        scope.token(),
    );
    // The spawned work has not finished; the future multiplexes to stopped.
    assert_eq!(sync_wait(future).unwrap(), None);
    assert_eq!(sync_wait(scope.join()).unwrap(), Some(()));
}

#[test]
fn join_then_drop_is_legal() {
    let scope = SimpleCountingScope::new();
    let token = scope.token();
    assert!(token.try_associate());
    token.disassociate();
    sync_wait(scope.join()).unwrap();
    drop(scope);
}

#[test]
fn close_then_drop_is_legal() {
    let scope = CountingScope::new();
    scope.close();
    drop(scope);
}

#[test]
fn concurrent_associations_from_many_threads() {
    let scope = SimpleCountingScope::new();
    let token = scope.token();
    let successes = Arc::new(AtomicUsize::new(0));

    let handles: Vec<_> = (0..8)
        .map(|_| {
            let token = token.clone();
            let successes = Arc::clone(&successes);
            thread::spawn(move || {
                for _ in 0..1000 {
                    if token.try_associate() {
                        successes.fetch_add(1, Ordering::SeqCst);
                        token.disassociate();
                    }
                }
            })
        })
        .collect();
    for handle in handles {
        handle.join().unwrap();
    }

    assert_eq!(successes.load(Ordering::SeqCst), 8000);
    assert_eq!(sync_wait(scope.join()).unwrap(), Some(()));
}
