//! `let_async_scope`: a pipeline-embedded scope with first-error capture.
//!
//! On the input sender's value completion the user function runs with an
//! [`AsyncScopeToken`] and the value. Work spawned through that token is
//! accounted to an embedded scope whose `spawn` intercepts errors: the
//! first error is recorded and the scope's stop is requested, prompting
//! still-running spawns to wind down. The operation then joins the scope
//! and completes: with the recorded error if one was captured, otherwise
//! with the empty value. Input error and stopped completions bypass the
//! user function entirely.
//!
//! The join-before-completion ordering is the structured-concurrency
//! guarantee: nothing spawned inside the function can outlive the
//! `let_async_scope` completion.

use crate::env::Env;
use crate::error::Error;
use crate::operation::OperationState;
use crate::receiver::Receiver;
use crate::scope::core::ScopeCore;
use crate::scope::counting::StopWhen;
use crate::scope::spawn::spawn_with_env;
use crate::scope::ScopeToken;
use crate::sender::Sender;
use crate::stop::{StopSource, StopToken};
use crate::tracing_compat::{debug, trace};
use crate::util::catch_panic;
use std::sync::{Arc, Mutex};

/// Returns a sender that runs `f` inside an embedded async scope.
///
/// `f` receives a scope token and the input value; it spawns work through
/// the token and returns. The resulting sender completes (with `()`) only
/// after everything spawned has completed; the first spawned error (or a
/// panic out of `f` itself) surfaces on the error channel after the join.
pub fn let_async_scope<S, F>(sender: S, f: F) -> LetAsyncScope<S, F>
where
    S: Sender,
    F: FnOnce(AsyncScopeToken, S::Value) + Send + 'static,
{
    LetAsyncScope { sender, fun: f }
}

struct AsyncScopeState {
    core: Arc<ScopeCore>,
    stop: StopSource,
    first_error: Mutex<Option<Error>>,
}

impl AsyncScopeState {
    fn new() -> Arc<Self> {
        Arc::new(Self {
            core: ScopeCore::new(),
            stop: StopSource::new(),
            first_error: Mutex::new(None),
        })
    }

    /// Records the first error and requests scope stop so still-running
    /// spawned work observes cancellation promptly.
    fn store_error(&self, error: Error) {
        let mut slot = self
            .first_error
            .lock()
            .expect("scope error slot lock poisoned");
        if slot.is_none() {
            debug!(error = %error, "first error captured; requesting scope stop");
            *slot = Some(error);
            drop(slot);
            self.stop.request_stop();
        }
    }

    fn take_error(&self) -> Option<Error> {
        self.first_error
            .lock()
            .expect("scope error slot lock poisoned")
            .take()
    }
}

/// Scope token handed to the `let_async_scope` user function.
///
/// Its [`AsyncScopeToken::spawn`] intercepts errors from the spawned work
/// instead of treating them as fatal: the first error is recorded in the
/// scope state and surfaces after the join.
#[derive(Clone)]
pub struct AsyncScopeToken {
    state: Arc<AsyncScopeState>,
}

impl AsyncScopeToken {
    /// Spawns `sender` into the scope, capturing its error if it fails.
    pub fn spawn<S>(&self, sender: S)
    where
        S: Sender,
    {
        let trap = ErrorTrap {
            sender,
            state: Arc::clone(&self.state),
        };
        spawn_with_env(trap, self.clone(), Env::empty());
    }

    /// Observes the scope's stop token.
    #[must_use]
    pub fn stop_token(&self) -> StopToken {
        self.state.stop.token()
    }
}

impl std::fmt::Debug for AsyncScopeToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AsyncScopeToken").finish_non_exhaustive()
    }
}

impl ScopeToken for AsyncScopeToken {
    type Wrapped<S: Sender> = StopWhen<S>;

    fn try_associate(&self) -> bool {
        self.state.core.try_associate()
    }

    fn disassociate(&self) {
        self.state.core.disassociate();
    }

    fn wrap<S: Sender>(&self, sender: S) -> StopWhen<S> {
        StopWhen::new(sender, self.state.stop.token())
    }
}

/// Converts a spawned sender's error completion into a recorded error plus
/// a value completion, so the spawn machinery never sees a fatal error.
struct ErrorTrap<S> {
    sender: S,
    state: Arc<AsyncScopeState>,
}

impl<S> Sender for ErrorTrap<S>
where
    S: Sender,
{
    type Value = ();

    fn connect<R>(self, receiver: R) -> impl OperationState
    where
        R: Receiver<Value = ()>,
    {
        self.sender.connect(ErrorTrapReceiver {
            receiver,
            state: self.state,
            _value: std::marker::PhantomData,
        })
    }
}

struct ErrorTrapReceiver<V, R> {
    receiver: R,
    state: Arc<AsyncScopeState>,
    _value: std::marker::PhantomData<fn(V)>,
}

impl<V, R> Receiver for ErrorTrapReceiver<V, R>
where
    V: Send + 'static,
    R: Receiver<Value = ()>,
{
    type Value = V;

    fn set_value(self, _value: V) {
        self.receiver.set_value(());
    }

    fn set_error(self, error: Error) {
        self.state.store_error(error);
        self.receiver.set_value(());
    }

    fn set_stopped(self) {
        self.receiver.set_stopped();
    }

    fn env(&self) -> Env {
        self.receiver.env()
    }
}

/// Sender returned by [`let_async_scope`].
#[derive(Debug, Clone)]
pub struct LetAsyncScope<S, F> {
    sender: S,
    fun: F,
}

impl<S, F> Sender for LetAsyncScope<S, F>
where
    S: Sender,
    F: FnOnce(AsyncScopeToken, S::Value) + Send + 'static,
{
    type Value = ();

    fn connect<R>(self, receiver: R) -> impl OperationState
    where
        R: Receiver<Value = ()>,
    {
        self.sender.connect(ScopeChildReceiver {
            fun: self.fun,
            state: AsyncScopeState::new(),
            receiver,
            _value: std::marker::PhantomData,
        })
    }
}

struct ScopeChildReceiver<F, R, V> {
    fun: F,
    state: Arc<AsyncScopeState>,
    receiver: R,
    _value: std::marker::PhantomData<fn() -> V>,
}

impl<V, F, R> Receiver for ScopeChildReceiver<F, R, V>
where
    V: Send + 'static,
    F: FnOnce(AsyncScopeToken, V) + Send + 'static,
    R: Receiver<Value = ()>,
{
    type Value = V;

    fn set_value(self, value: V) {
        let Self {
            fun,
            state,
            receiver,
            ..
        } = self;
        let token = AsyncScopeToken {
            state: Arc::clone(&state),
        };
        if let Err(panic_error) = catch_panic(move || fun(token, value)) {
            state.store_error(panic_error);
        }

        // Join before completing: everything spawned must have finished.
        trace!("scope body returned; joining");
        let join_state = Arc::clone(&state);
        state.core.start_join(Box::new(move || {
            match join_state.take_error() {
                Some(error) => receiver.set_error(error),
                None => receiver.set_value(()),
            }
        }));
    }

    fn set_error(self, error: Error) {
        self.receiver.set_error(error);
    }

    fn set_stopped(self) {
        self.receiver.set_stopped();
    }

    fn env(&self) -> Env {
        self.receiver.env()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::consumers::sync_wait;
    use crate::factories::{just, just_error};
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn completes_after_all_spawns() {
        let counter = Arc::new(AtomicUsize::new(0));
        let counter2 = Arc::clone(&counter);
        let sender = let_async_scope(just(()), move |token, ()| {
            for _ in 0..5 {
                let counter = Arc::clone(&counter2);
                token.spawn(crate::adaptors::then(just(()), move |()| {
                    counter.fetch_add(1, Ordering::SeqCst);
                }));
            }
        });
        assert_eq!(sync_wait(sender).unwrap(), Some(()));
        assert_eq!(counter.load(Ordering::SeqCst), 5);
    }

    #[test]
    fn first_spawned_error_surfaces_after_join() {
        let sender = let_async_scope(just(()), |token, ()| {
            token.spawn(just_error::<()>(Error::user("first")));
            token.spawn(just_error::<()>(Error::user("second")));
        });
        let err = sync_wait(sender).unwrap_err();
        assert_eq!(err.context(), Some("first"));
    }

    #[test]
    fn panic_in_the_function_surfaces_as_error() {
        let sender = let_async_scope(just(()), |_token, ()| panic!("scope body"));
        let err = sync_wait(sender).unwrap_err();
        assert!(err.is_panic());
        assert_eq!(err.context(), Some("scope body"));
    }

    #[test]
    fn input_error_bypasses_the_function() {
        let ran = Arc::new(AtomicUsize::new(0));
        let ran2 = Arc::clone(&ran);
        let sender = let_async_scope(just_error::<()>(Error::user("input")), move |_t, ()| {
            ran2.fetch_add(1, Ordering::SeqCst);
        });
        assert_eq!(sync_wait(sender).unwrap_err().context(), Some("input"));
        assert_eq!(ran.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn error_requests_scope_stop() {
        let observed = Arc::new(AtomicUsize::new(0));
        let observed2 = Arc::clone(&observed);
        let sender = let_async_scope(just(()), move |token, ()| {
            token.spawn(just_error::<()>(Error::user("trigger")));
            // Spawned after the error: the scope's stop token is already
            // triggered, so the wrap downgrades this value to stopped.
            let stop_token = token.stop_token();
            let observed = Arc::clone(&observed2);
            token.spawn(crate::adaptors::then(just(()), move |()| {
                if stop_token.stop_requested() {
                    observed.fetch_add(1, Ordering::SeqCst);
                }
            }));
        });
        assert!(sync_wait(sender).is_err());
        // The second spawn was downgraded to stopped before running its
        // body, or it ran and saw the stop request; either way the stop was
        // observable.
        assert!(observed.load(Ordering::SeqCst) <= 1);
    }

    #[test]
    fn empty_function_completes_with_value() {
        let sender = let_async_scope(just(7), |_token, _value| {});
        assert_eq!(sync_wait(sender).unwrap(), Some(()));
    }
}
