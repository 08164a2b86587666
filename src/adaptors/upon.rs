//! The `upon_error` and `upon_stopped` adaptors: convert a non-value
//! channel into the value channel.

use crate::env::Env;
use crate::error::Error;
use crate::operation::OperationState;
use crate::receiver::Receiver;
use crate::sender::Sender;
use crate::util::catch_panic;

/// Returns a sender that converts an error completion into a value
/// completion via `f`.
///
/// Value and stopped completions pass through. A panic in `f` is caught and
/// delivered on the error channel.
pub fn upon_error<S, F>(sender: S, f: F) -> UponError<S, F>
where
    S: Sender,
    F: FnOnce(Error) -> S::Value + Send + 'static,
{
    UponError { sender, fun: f }
}

/// Returns a sender that converts a stopped completion into a value
/// completion via `f`.
pub fn upon_stopped<S, F>(sender: S, f: F) -> UponStopped<S, F>
where
    S: Sender,
    F: FnOnce() -> S::Value + Send + 'static,
{
    UponStopped { sender, fun: f }
}

/// Sender returned by [`upon_error`].
#[derive(Debug, Clone)]
pub struct UponError<S, F> {
    sender: S,
    fun: F,
}

impl<S, F> Sender for UponError<S, F>
where
    S: Sender,
    F: FnOnce(Error) -> S::Value + Send + 'static,
{
    type Value = S::Value;

    fn connect<R>(self, receiver: R) -> impl OperationState
    where
        R: Receiver<Value = S::Value>,
    {
        self.sender.connect(UponErrorReceiver {
            fun: self.fun,
            receiver,
        })
    }
}

struct UponErrorReceiver<F, R> {
    fun: F,
    receiver: R,
}

impl<F, R> Receiver for UponErrorReceiver<F, R>
where
    R: Receiver,
    F: FnOnce(Error) -> R::Value + Send + 'static,
{
    type Value = R::Value;

    fn set_value(self, value: R::Value) {
        self.receiver.set_value(value);
    }

    fn set_error(self, error: Error) {
        let Self { fun, receiver } = self;
        match catch_panic(move || fun(error)) {
            Ok(recovered) => receiver.set_value(recovered),
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

/// Sender returned by [`upon_stopped`].
#[derive(Debug, Clone)]
pub struct UponStopped<S, F> {
    sender: S,
    fun: F,
}

impl<S, F> Sender for UponStopped<S, F>
where
    S: Sender,
    F: FnOnce() -> S::Value + Send + 'static,
{
    type Value = S::Value;

    fn connect<R>(self, receiver: R) -> impl OperationState
    where
        R: Receiver<Value = S::Value>,
    {
        self.sender.connect(UponStoppedReceiver {
            fun: self.fun,
            receiver,
        })
    }
}

struct UponStoppedReceiver<F, R> {
    fun: F,
    receiver: R,
}

impl<F, R> Receiver for UponStoppedReceiver<F, R>
where
    R: Receiver,
    F: FnOnce() -> R::Value + Send + 'static,
{
    type Value = R::Value;

    fn set_value(self, value: R::Value) {
        self.receiver.set_value(value);
    }

    fn set_error(self, error: Error) {
        self.receiver.set_error(error);
    }

    fn set_stopped(self) {
        let Self { fun, receiver } = self;
        match catch_panic(fun) {
            Ok(fallback) => receiver.set_value(fallback),
            Err(err) => receiver.set_error(err),
        }
    }

    fn env(&self) -> Env {
        self.receiver.env()
    }
}
