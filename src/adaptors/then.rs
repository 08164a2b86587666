//! The `then` adaptor: transform the value channel.

use crate::env::Env;
use crate::error::Error;
use crate::operation::OperationState;
use crate::receiver::Receiver;
use crate::sender::Sender;
use crate::util::catch_panic;

/// Returns a sender whose value completion is `f` applied to `sender`'s.
///
/// Error and stopped completions pass through unchanged. A panic in `f` is
/// caught and delivered on the error channel.
pub fn then<S, F, U>(sender: S, f: F) -> Then<S, F>
where
    S: Sender,
    F: FnOnce(S::Value) -> U + Send + 'static,
    U: Send + 'static,
{
    Then { sender, fun: f }
}

/// Sender returned by [`then`].
#[derive(Debug, Clone)]
pub struct Then<S, F> {
    sender: S,
    fun: F,
}

impl<S, F, U> Sender for Then<S, F>
where
    S: Sender,
    F: FnOnce(S::Value) -> U + Send + 'static,
    U: Send + 'static,
{
    type Value = U;

    fn connect<R>(self, receiver: R) -> impl OperationState
    where
        R: Receiver<Value = U>,
    {
        self.sender.connect(ThenReceiver {
            fun: self.fun,
            receiver,
            _value: std::marker::PhantomData,
        })
    }
}

struct ThenReceiver<F, R, V> {
    fun: F,
    receiver: R,
    _value: std::marker::PhantomData<fn() -> V>,
}

impl<V, F, U, R> Receiver for ThenReceiver<F, R, V>
where
    V: Send + 'static,
    F: FnOnce(V) -> U + Send + 'static,
    U: Send + 'static,
    R: Receiver<Value = U>,
{
    type Value = V;

    fn set_value(self, value: V) {
        let Self { fun, receiver, .. } = self;
        match catch_panic(move || fun(value)) {
            Ok(mapped) => receiver.set_value(mapped),
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
