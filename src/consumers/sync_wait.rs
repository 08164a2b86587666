//! The `sync_wait` consumer: block the calling thread until completion.
//!
//! Builds a one-shot receiver around a mutex, a condition variable, and a
//! result slot; connects, starts, and parks the calling thread until exactly
//! one completion lands. The caller must not be the thread responsible for
//! driving the sender's scheduler, or the wait deadlocks; that is a
//! documented user responsibility, not a library invariant.

use crate::env::Env;
use crate::error::{Error, Result};
use crate::receiver::Receiver;
use crate::sender::Sender;
use crate::operation::OperationState;
use std::sync::{Arc, Condvar, Mutex};

enum WaitResult<V> {
    Value(V),
    Error(Error),
    Stopped,
}

struct WaitState<V> {
    slot: Mutex<Option<WaitResult<V>>>,
    cv: Condvar,
    env: Env,
}

struct WaitReceiver<V> {
    state: Arc<WaitState<V>>,
}

impl<V> WaitReceiver<V>
where
    V: Send + 'static,
{
    fn finish(self, result: WaitResult<V>) {
        let mut slot = self.state.slot.lock().expect("sync_wait slot lock poisoned");
        debug_assert!(slot.is_none(), "sync_wait completed twice");
        *slot = Some(result);
        drop(slot);
        self.state.cv.notify_one();
    }
}

impl<V> Receiver for WaitReceiver<V>
where
    V: Send + 'static,
{
    type Value = V;

    fn set_value(self, value: V) {
        self.finish(WaitResult::Value(value));
    }

    fn set_error(self, error: Error) {
        self.finish(WaitResult::Error(error));
    }

    fn set_stopped(self) {
        self.finish(WaitResult::Stopped);
    }

    fn env(&self) -> Env {
        self.state.env.clone()
    }
}

/// Runs `sender` to completion on the calling thread's watch.
///
/// Returns `Ok(Some(value))` on a value completion, `Ok(None)` on stopped,
/// and `Err(error)` on an error completion. Blocks until one of the three
/// arrives.
pub fn sync_wait<S>(sender: S) -> Result<Option<S::Value>>
where
    S: Sender,
{
    sync_wait_with_env(sender, Env::empty())
}

/// Like [`sync_wait`], with a caller-supplied environment.
///
/// The environment is what the sender observes through its receiver; inject
/// a stop token here for a cancellable wait.
pub fn sync_wait_with_env<S>(sender: S, env: Env) -> Result<Option<S::Value>>
where
    S: Sender,
{
    let state = Arc::new(WaitState {
        slot: Mutex::new(None),
        cv: Condvar::new(),
        env,
    });

    sender
        .connect(WaitReceiver {
            state: Arc::clone(&state),
        })
        .start();

    let mut slot = state.slot.lock().expect("sync_wait slot lock poisoned");
    while slot.is_none() {
        slot = state
            .cv
            .wait(slot)
            .expect("sync_wait slot lock poisoned");
    }
    match slot.take().expect("sync_wait result vanished") {
        WaitResult::Value(value) => Ok(Some(value)),
        WaitResult::Error(error) => Err(error),
        WaitResult::Stopped => Ok(None),
    }
}
