//! `when_any` races: first-wins semantics and active cancellation.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;
use strand::{
    just, just_error, just_stopped, schedule, sync_wait, sync_wait_with_env, when_any, when_any3,
    when_any_vec, Env, Error, OperationState, Receiver, Sender, SenderExt, StopSource, ThreadPool,
    WhenAnyResult,
};

/// A sender completing with `value` after `delay` on a pool worker.
fn delayed<V: Send + Clone + 'static>(
    pool: &ThreadPool,
    delay: Duration,
    value: V,
) -> impl Sender<Value = V> {
    schedule(&pool.scheduler()).then(move |()| {
        thread::sleep(delay);
        value
    })
}

#[test]
fn fastest_of_three_wins_on_a_pool() {
    let pool = ThreadPool::new(4);
    let sender = when_any_vec(vec![
        delayed(&pool, Duration::from_millis(100), 100_u32),
        delayed(&pool, Duration::from_millis(10), 10_u32),
        delayed(&pool, Duration::from_millis(50), 50_u32),
    ]);
    assert_eq!(sync_wait(sender).unwrap(), Some(10));
}

#[test]
fn winner_channel_matches_a_child_completion() {
    // Whatever wins, the delivered completion is one of the children's.
    let pool = ThreadPool::new(2);
    let sender = when_any(
        delayed(&pool, Duration::from_millis(5), 1_u32),
        delayed(&pool, Duration::from_millis(5), 2_u32),
    );
    match sync_wait(sender).unwrap().unwrap() {
        WhenAnyResult::First(v) => assert_eq!(v, 1),
        WhenAnyResult::Second(v) => assert_eq!(v, 2),
    }
}

#[test]
fn error_winner_beats_slow_value() {
    let pool = ThreadPool::new(2);
    let sender = when_any(
        just_error::<u32>(Error::user("fast failure")),
        delayed(&pool, Duration::from_millis(50), 2_u32),
    );
    assert_eq!(
        sync_wait(sender).unwrap_err().context(),
        Some("fast failure")
    );
}

#[test]
fn stopped_winner_propagates_stopped() {
    let pool = ThreadPool::new(2);
    let sender = when_any(
        just_stopped::<u32>(),
        delayed(&pool, Duration::from_millis(50), 2_u32),
    );
    assert_eq!(sync_wait(sender).unwrap(), None);
}

#[test]
fn heterogeneous_three_way_race() {
    let sender = when_any3(just(1_u8), just("mid"), just(3.5_f64));
    let result = sync_wait(sender).unwrap().unwrap();
    assert_eq!(result, strand::WhenAny3Result::First(1));
}

#[test]
fn losers_observe_the_internal_stop_token() {
    // The winner's stop request is visible to the loser through its
    // environment.
    struct StopProbe {
        seen_stop: Arc<AtomicUsize>,
        delay: Duration,
    }

    impl Sender for StopProbe {
        type Value = u32;

        fn connect<R>(self, receiver: R) -> impl OperationState
        where
            R: Receiver<Value = u32>,
        {
            StopProbeOp {
                seen_stop: self.seen_stop,
                delay: self.delay,
                receiver,
            }
        }
    }

    struct StopProbeOp<R> {
        seen_stop: Arc<AtomicUsize>,
        delay: Duration,
        receiver: R,
    }

    impl<R> OperationState for StopProbeOp<R>
    where
        R: Receiver<Value = u32>,
    {
        fn start(self) {
            let token = self.receiver.env().stop_token();
            let seen_stop = self.seen_stop;
            let delay = self.delay;
            let receiver = self.receiver;
            thread::spawn(move || {
                thread::sleep(delay);
                if token.stop_requested() {
                    seen_stop.fetch_add(1, Ordering::SeqCst);
                    receiver.set_stopped();
                } else {
                    receiver.set_value(7);
                }
            });
        }
    }

    let seen_stop = Arc::new(AtomicUsize::new(0));
    let sender = when_any(
        just(1_u32),
        StopProbe {
            seen_stop: Arc::clone(&seen_stop),
            delay: Duration::from_millis(30),
        },
    );
    assert_eq!(
        sync_wait(sender).unwrap(),
        Some(WhenAnyResult::First(1))
    );
    assert_eq!(
        seen_stop.load(Ordering::SeqCst),
        1,
        "loser did not observe the winner's stop request"
    );
}

#[test]
fn external_stop_before_start_completes_stopped_without_running_children() {
    let ran = Arc::new(AtomicUsize::new(0));
    let ran2 = Arc::clone(&ran);

    let source = StopSource::new();
    source.request_stop();
    let env = Env::empty().with_stop_token(source.token());

    let sender = when_any(
        just(1).then(move |x| {
            ran2.fetch_add(1, Ordering::SeqCst);
            x
        }),
        just(2),
    );
    assert_eq!(sync_wait_with_env(sender, env).unwrap(), None);
    assert_eq!(ran.load(Ordering::SeqCst), 0, "children ran despite stop");
}

#[test]
fn external_stop_during_race_downgrades_delivery() {
    let pool = ThreadPool::new(2);
    let source = StopSource::new();
    let env = Env::empty().with_stop_token(source.token());

    let stopper = {
        let source = source.clone();
        thread::spawn(move || {
            thread::sleep(Duration::from_millis(10));
            source.request_stop();
        })
    };

    // Both children outlast the external stop request.
    let sender = when_any(
        delayed(&pool, Duration::from_millis(100), 1_u32),
        delayed(&pool, Duration::from_millis(120), 2_u32),
    );
    assert_eq!(sync_wait_with_env(sender, env).unwrap(), None);
    stopper.join().unwrap();
}

#[test]
fn loser_finishes_before_delivery() {
    // The loser still runs to completion before delivery (last child out
    // drives the downstream receiver).
    let pool = ThreadPool::new(2);
    let loser_done = Arc::new(AtomicUsize::new(0));
    let loser_done2 = Arc::clone(&loser_done);

    let fast = schedule(&pool.scheduler()).then(|()| 1_u32);
    let slow = schedule(&pool.scheduler()).then(move |()| {
        thread::sleep(Duration::from_millis(40));
        loser_done2.fetch_add(1, Ordering::SeqCst);
        2_u32
    });

    let winner = sync_wait(when_any(fast, slow)).unwrap();
    assert_eq!(winner, Some(WhenAnyResult::First(1)));
    assert_eq!(loser_done.load(Ordering::SeqCst), 1);
}
