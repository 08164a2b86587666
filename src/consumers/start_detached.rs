//! The `start_detached` consumer: fire and forget.
//!
//! Connects the sender to a null receiver that discards value and stopped
//! completions. An error completion has no recipient left to observe it, so
//! it is fatal: the error is logged and the process terminates.

use crate::env::Env;
use crate::error::Error;
use crate::receiver::Receiver;
use crate::sender::Sender;
use crate::operation::OperationState;
use crate::tracing_compat::error;

/// Starts `sender` without waiting for its completion.
///
/// Value and stopped completions are discarded. An error completion
/// terminates the process, matching the policy for unobservable failures.
pub fn start_detached<S>(sender: S)
where
    S: Sender,
{
    start_detached_with_env(sender, Env::empty());
}

/// Like [`start_detached`], with a caller-supplied environment.
pub fn start_detached_with_env<S>(sender: S, env: Env)
where
    S: Sender,
{
    sender.connect(DetachedReceiver::new(env)).start();
}

pub(crate) struct DetachedReceiver<V> {
    env: Env,
    _value: std::marker::PhantomData<fn(V)>,
}

impl<V> DetachedReceiver<V> {
    pub(crate) fn new(env: Env) -> Self {
        Self {
            env,
            _value: std::marker::PhantomData,
        }
    }
}

impl<V> Receiver for DetachedReceiver<V>
where
    V: Send + 'static,
{
    type Value = V;

    fn set_value(self, _value: V) {}

    fn set_error(self, err: Error) {
        error!(error = %err, "detached operation failed with no observer");
        eprintln!("strand: detached operation failed: {err}");
        std::process::abort();
    }

    fn set_stopped(self) {}

    fn env(&self) -> Env {
        self.env.clone()
    }
}
