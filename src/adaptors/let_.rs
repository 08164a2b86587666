//! The `let_value`, `let_error`, and `let_stopped` adaptors.
//!
//! On the matching channel the user function produces a *new sender*, which
//! is connected to the downstream receiver and started in place. Ownership
//! of the downstream receiver moves into the dynamically-produced inner
//! operation, which keeps everything alive until the inner completion.

use crate::env::Env;
use crate::error::Error;
use crate::operation::OperationState;
use crate::receiver::Receiver;
use crate::sender::Sender;
use crate::util::catch_panic;

/// Returns a sender that, on value, runs the sender produced by `f`.
///
/// The inner sender's value type becomes the result value type. Error and
/// stopped completions of `sender` pass through. A panic in `f` is caught
/// and delivered on the error channel.
pub fn let_value<S, F, S2>(sender: S, f: F) -> LetValue<S, F>
where
    S: Sender,
    F: FnOnce(S::Value) -> S2 + Send + 'static,
    S2: Sender,
{
    LetValue { sender, fun: f }
}

/// Returns a sender that, on error, runs the recovery sender produced by
/// `f`.
///
/// The recovery sender must yield the same value type as `sender` (the Rust
/// rendition of the signature union in the source model).
pub fn let_error<S, F, S2>(sender: S, f: F) -> LetError<S, F>
where
    S: Sender,
    F: FnOnce(Error) -> S2 + Send + 'static,
    S2: Sender<Value = S::Value>,
{
    LetError { sender, fun: f }
}

/// Returns a sender that, on stopped, runs the fallback sender produced by
/// `f`.
pub fn let_stopped<S, F, S2>(sender: S, f: F) -> LetStopped<S, F>
where
    S: Sender,
    F: FnOnce() -> S2 + Send + 'static,
    S2: Sender<Value = S::Value>,
{
    LetStopped { sender, fun: f }
}

/// Sender returned by [`let_value`].
#[derive(Debug, Clone)]
pub struct LetValue<S, F> {
    sender: S,
    fun: F,
}

impl<S, F, S2> Sender for LetValue<S, F>
where
    S: Sender,
    F: FnOnce(S::Value) -> S2 + Send + 'static,
    S2: Sender,
{
    type Value = S2::Value;

    fn connect<R>(self, receiver: R) -> impl OperationState
    where
        R: Receiver<Value = S2::Value>,
    {
        self.sender.connect(LetValueReceiver {
            fun: self.fun,
            receiver,
            _marker: std::marker::PhantomData,
        })
    }
}

struct LetValueReceiver<F, R, V, S2> {
    fun: F,
    receiver: R,
    _marker: std::marker::PhantomData<fn() -> (V, S2)>,
}

impl<V, F, S2, R> Receiver for LetValueReceiver<F, R, V, S2>
where
    V: Send + 'static,
    F: FnOnce(V) -> S2 + Send + 'static,
    S2: Sender,
    R: Receiver<Value = S2::Value>,
{
    type Value = V;

    fn set_value(self, value: V) {
        let Self { fun, receiver, .. } = self;
        match catch_panic(move || fun(value)) {
            // Connect the produced sender to the downstream receiver and
            // start it in place; the inner operation now owns the receiver.
            Ok(inner) => inner.connect(receiver).start(),
            Err(err) => receiver.set_error(err),
        }
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

/// Sender returned by [`let_error`].
#[derive(Debug, Clone)]
pub struct LetError<S, F> {
    sender: S,
    fun: F,
}

impl<S, F, S2> Sender for LetError<S, F>
where
    S: Sender,
    F: FnOnce(Error) -> S2 + Send + 'static,
    S2: Sender<Value = S::Value>,
{
    type Value = S::Value;

    fn connect<R>(self, receiver: R) -> impl OperationState
    where
        R: Receiver<Value = S::Value>,
    {
        self.sender.connect(LetErrorReceiver {
            fun: self.fun,
            receiver,
        })
    }
}

struct LetErrorReceiver<F, R> {
    fun: F,
    receiver: R,
}

impl<F, S2, R> Receiver for LetErrorReceiver<F, R>
where
    F: FnOnce(Error) -> S2 + Send + 'static,
    S2: Sender,
    R: Receiver<Value = S2::Value>,
{
    type Value = S2::Value;

    fn set_value(self, value: Self::Value) {
        self.receiver.set_value(value);
    }

    fn set_error(self, error: Error) {
        let Self { fun, receiver, .. } = self;
        match catch_panic(move || fun(error)) {
            Ok(inner) => inner.connect(receiver).start(),
            Err(err) => receiver.set_error(err),
        }
    }

    fn set_stopped(self) {
        self.receiver.set_stopped();
    }

    fn env(&self) -> Env {
        self.receiver.env()
    }
}

/// Sender returned by [`let_stopped`].
#[derive(Debug, Clone)]
pub struct LetStopped<S, F> {
    sender: S,
    fun: F,
}

impl<S, F, S2> Sender for LetStopped<S, F>
where
    S: Sender,
    F: FnOnce() -> S2 + Send + 'static,
    S2: Sender<Value = S::Value>,
{
    type Value = S::Value;

    fn connect<R>(self, receiver: R) -> impl OperationState
    where
        R: Receiver<Value = S::Value>,
    {
        self.sender.connect(LetStoppedReceiver {
            fun: self.fun,
            receiver,
        })
    }
}

struct LetStoppedReceiver<F, R> {
    fun: F,
    receiver: R,
}

impl<F, S2, R> Receiver for LetStoppedReceiver<F, R>
where
    F: FnOnce() -> S2 + Send + 'static,
    S2: Sender,
    R: Receiver<Value = S2::Value>,
{
    type Value = S2::Value;

    fn set_value(self, value: Self::Value) {
        self.receiver.set_value(value);
    }

    fn set_error(self, error: Error) {
        self.receiver.set_error(error);
    }

    fn set_stopped(self) {
        let Self { fun, receiver, .. } = self;
        match catch_panic(fun) {
            Ok(inner) => inner.connect(receiver).start(),
            Err(err) => receiver.set_error(err),
        }
    }

    fn env(&self) -> Env {
        self.receiver.env()
    }
}
