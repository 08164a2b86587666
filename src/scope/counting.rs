//! The counting scope: association counting plus scoped cancellation.

use crate::env::Env;
use crate::error::Error;
use crate::operation::OperationState;
use crate::receiver::Receiver;
use crate::scope::core::ScopeCore;
use crate::scope::simple::JoinSender;
use crate::scope::ScopeToken;
use crate::sender::Sender;
use crate::stop::{StopSource, StopToken};
use crate::tracing_compat::{debug, trace};
use std::sync::Arc;

/// A scope with an embedded stop source.
///
/// `request_stop` propagates to every associated child that consults the
/// scope's stop token; the token's `wrap` injects that stop token into the
/// child's environment and downgrades a value completion to stopped when
/// the scope was stopped in the meantime.
#[derive(Debug)]
pub struct CountingScope {
    core: Arc<ScopeCore>,
    stop: StopSource,
}

impl CountingScope {
    /// Creates a scope in the unused state.
    #[must_use]
    pub fn new() -> Self {
        Self {
            core: ScopeCore::new(),
            stop: StopSource::new(),
        }
    }

    /// Returns a token for accounting work against this scope.
    #[must_use]
    pub fn token(&self) -> CountingScopeToken {
        CountingScopeToken {
            core: Arc::clone(&self.core),
            stop: self.stop.clone(),
        }
    }

    /// Refuses future associations.
    pub fn close(&self) {
        self.core.close();
    }

    /// Requests stop on the scope's stop source.
    pub fn request_stop(&self) {
        if self.stop.request_stop() {
            debug!("scope stop requested");
        }
    }

    /// Observes the scope's stop token.
    #[must_use]
    pub fn stop_token(&self) -> StopToken {
        self.stop.token()
    }

    /// Returns a sender completing (with no value) once the association
    /// count reaches zero.
    #[must_use]
    pub fn join(&self) -> JoinSender {
        JoinSender::new(Arc::clone(&self.core))
    }
}

impl Default for CountingScope {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for CountingScope {
    fn drop(&mut self) {
        assert!(
            self.core.droppable(),
            "scope dropped with live or unjoined associations"
        );
    }
}

/// Token of a [`CountingScope`].
#[derive(Debug, Clone)]
pub struct CountingScopeToken {
    core: Arc<ScopeCore>,
    stop: StopSource,
}

impl ScopeToken for CountingScopeToken {
    type Wrapped<S: Sender> = StopWhen<S>;

    fn try_associate(&self) -> bool {
        self.core.try_associate()
    }

    fn disassociate(&self) {
        self.core.disassociate();
    }

    fn wrap<S: Sender>(&self, sender: S) -> StopWhen<S> {
        StopWhen {
            sender,
            stop_token: self.stop.token(),
        }
    }
}

/// Sender wrapper that subjects a child to a scope's stop token.
///
/// The stop token is injected into the child's environment; a value
/// completion observed after the token was triggered is delivered as
/// stopped instead.
#[derive(Debug, Clone)]
pub struct StopWhen<S> {
    sender: S,
    stop_token: StopToken,
}

impl<S> StopWhen<S>
where
    S: Sender,
{
    pub(crate) fn new(sender: S, stop_token: StopToken) -> Self {
        Self { sender, stop_token }
    }
}

impl<S> Sender for StopWhen<S>
where
    S: Sender,
{
    type Value = S::Value;

    fn connect<R>(self, receiver: R) -> impl OperationState
    where
        R: Receiver<Value = S::Value>,
    {
        self.sender.connect(StopWhenReceiver {
            receiver,
            stop_token: self.stop_token,
        })
    }
}

struct StopWhenReceiver<R> {
    receiver: R,
    stop_token: StopToken,
}

impl<R> Receiver for StopWhenReceiver<R>
where
    R: Receiver,
{
    type Value = R::Value;

    fn set_value(self, value: R::Value) {
        if self.stop_token.stop_requested() {
            trace!("scope stop observed; value downgraded to stopped");
            self.receiver.set_stopped();
        } else {
            self.receiver.set_value(value);
        }
    }

    fn set_error(self, error: Error) {
        self.receiver.set_error(error);
    }

    fn set_stopped(self) {
        self.receiver.set_stopped();
    }

    fn env(&self) -> Env {
        self.receiver
            .env()
            .with_stop_token(self.stop_token.clone())
    }
}
