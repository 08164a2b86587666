//! The `associate` adaptor: tie a sender's lifetime to a scope.
//!
//! Connecting the associated sender first asks the scope for an
//! association. If the scope refuses (it is closed or joining), the
//! resulting operation is a stub delivering stopped on `start`. Otherwise
//! the downstream receiver is wrapped to release the association before
//! forwarding any completion, and the inner sender (adapted by the scope
//! token's `wrap`) is connected beneath it.

use crate::env::Env;
use crate::error::Error;
use crate::operation::OperationState;
use crate::receiver::Receiver;
use crate::scope::ScopeToken;
use crate::sender::Sender;
use crate::tracing_compat::trace;

/// Returns a sender whose work is accounted to `token`'s scope.
pub fn associate<S, T>(sender: S, token: T) -> Associate<S, T>
where
    S: Sender,
    T: ScopeToken,
{
    Associate { sender, token }
}

/// Sender returned by [`associate`].
#[derive(Debug, Clone)]
pub struct Associate<S, T> {
    sender: S,
    token: T,
}

impl<S, T> Sender for Associate<S, T>
where
    S: Sender,
    T: ScopeToken,
{
    type Value = S::Value;

    fn connect<R>(self, receiver: R) -> impl OperationState
    where
        R: Receiver<Value = S::Value>,
    {
        let Self { sender, token } = self;
        if token.try_associate() {
            let wrapped = token.wrap(sender);
            AssociateOp::Live(wrapped.connect(AssocReceiver { receiver, token }))
        } else {
            AssociateOp::Stub(receiver)
        }
    }
}

enum AssociateOp<O, R> {
    /// Association acquired; the wrapped inner operation runs.
    Live(O),
    /// Association refused; deliver stopped on start.
    Stub(R),
}

impl<O, R> OperationState for AssociateOp<O, R>
where
    O: OperationState,
    R: Receiver,
{
    fn start(self) {
        match self {
            Self::Live(op) => op.start(),
            Self::Stub(receiver) => {
                trace!("scope refused association; delivering stopped");
                receiver.set_stopped();
            }
        }
    }
}

struct AssocReceiver<R, T> {
    receiver: R,
    token: T,
}

impl<R, T> Receiver for AssocReceiver<R, T>
where
    R: Receiver,
    T: ScopeToken,
{
    type Value = R::Value;

    fn set_value(self, value: R::Value) {
        // Release the association before forwarding: the scope must see the
        // count drop no later than the completion is observable.
        self.token.disassociate();
        self.receiver.set_value(value);
    }

    fn set_error(self, error: Error) {
        self.token.disassociate();
        self.receiver.set_error(error);
    }

    fn set_stopped(self) {
        self.token.disassociate();
        self.receiver.set_stopped();
    }

    fn env(&self) -> Env {
        self.receiver.env()
    }
}
