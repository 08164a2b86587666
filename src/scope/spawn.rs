//! Scoped fire-and-forget spawning: `spawn` and `spawn_future`.

use crate::consumers::start_detached::DetachedReceiver;
use crate::env::Env;
use crate::error::Error;
use crate::operation::OperationState;
use crate::receiver::Receiver;
use crate::scope::associate::associate;
use crate::scope::ScopeToken;
use crate::sender::Sender;
use crate::tracing_compat::debug;
use std::sync::{Arc, Mutex};

/// Starts `sender` detached, accounted to `token`'s scope.
///
/// Value and stopped completions are discarded. An error completion is
/// unobservable and terminates the process, matching
/// [`start_detached`](crate::consumers::start_detached).
pub fn spawn<S, T>(sender: S, token: T)
where
    S: Sender,
    T: ScopeToken,
{
    spawn_with_env(sender, token, Env::empty());
}

/// Like [`spawn`], with a caller-supplied environment for the spawned work.
pub fn spawn_with_env<S, T>(sender: S, token: T, env: Env)
where
    S: Sender,
    T: ScopeToken,
{
    associate(sender, token)
        .connect(DetachedReceiver::new(env))
        .start();
}

/// Starts `sender` detached under `token`'s scope and returns a future
/// sender observing its completion.
///
/// The future sender multiplexes on the shared state's contents *at the
/// time it is started*: a stored value or error is delivered; anything else
/// (stopped, or not yet complete) delivers stopped.
pub fn spawn_future<S, T>(sender: S, token: T) -> SpawnFuture<S::Value>
where
    S: Sender,
    T: ScopeToken,
{
    spawn_future_with_env(sender, token, Env::empty())
}

/// Like [`spawn_future`], with a caller-supplied environment.
pub fn spawn_future_with_env<S, T>(sender: S, token: T, env: Env) -> SpawnFuture<S::Value>
where
    S: Sender,
    T: ScopeToken,
{
    let state = Arc::new(FutureState {
        slot: Mutex::new(FutureSlot::Pending),
    });
    associate(sender, token)
        .connect(FutureReceiver {
            state: Arc::clone(&state),
            env,
        })
        .start();
    SpawnFuture { state }
}

enum FutureSlot<V> {
    Pending,
    Value(V),
    Error(Error),
    Stopped,
}

struct FutureState<V> {
    slot: Mutex<FutureSlot<V>>,
}

struct FutureReceiver<V> {
    state: Arc<FutureState<V>>,
    env: Env,
}

impl<V> FutureReceiver<V>
where
    V: Send + 'static,
{
    fn store(self, result: FutureSlot<V>) {
        *self
            .state
            .slot
            .lock()
            .expect("spawn_future slot lock poisoned") = result;
    }
}

impl<V> Receiver for FutureReceiver<V>
where
    V: Send + 'static,
{
    type Value = V;

    fn set_value(self, value: V) {
        self.store(FutureSlot::Value(value));
    }

    fn set_error(self, error: Error) {
        debug!(error = %error, "spawned future completed with an error");
        self.store(FutureSlot::Error(error));
    }

    fn set_stopped(self) {
        self.store(FutureSlot::Stopped);
    }

    fn env(&self) -> Env {
        self.env.clone()
    }
}

/// Sender returned by [`spawn_future`].
///
/// Clones observe the same shared state; the first one started takes the
/// stored result.
#[derive(Clone)]
pub struct SpawnFuture<V> {
    state: Arc<FutureState<V>>,
}

impl<V> std::fmt::Debug for SpawnFuture<V> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SpawnFuture").finish_non_exhaustive()
    }
}

impl<V> Sender for SpawnFuture<V>
where
    V: Send + 'static,
{
    type Value = V;

    fn connect<R>(self, receiver: R) -> impl OperationState
    where
        R: Receiver<Value = V>,
    {
        SpawnFutureOp {
            state: self.state,
            receiver,
        }
    }
}

struct SpawnFutureOp<V, R> {
    state: Arc<FutureState<V>>,
    receiver: R,
}

impl<V, R> OperationState for SpawnFutureOp<V, R>
where
    V: Send + 'static,
    R: Receiver<Value = V>,
{
    fn start(self) {
        let result = std::mem::replace(
            &mut *self
                .state
                .slot
                .lock()
                .expect("spawn_future slot lock poisoned"),
            FutureSlot::Pending,
        );
        match result {
            FutureSlot::Value(value) => self.receiver.set_value(value),
            FutureSlot::Error(error) => self.receiver.set_error(error),
            FutureSlot::Pending | FutureSlot::Stopped => self.receiver.set_stopped(),
        }
    }
}
