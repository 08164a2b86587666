//! The simple counting scope: association counting and join, nothing else.

use crate::operation::OperationState;
use crate::receiver::Receiver;
use crate::scope::core::ScopeCore;
use crate::scope::ScopeToken;
use crate::sender::Sender;
use crate::tracing_compat::trace;
use std::sync::Arc;

/// A scope that counts associations and joins to quiescence.
///
/// Unlike [`CountingScope`](crate::scope::CountingScope) it carries no stop
/// source; its token's `wrap` is the identity.
#[derive(Debug)]
pub struct SimpleCountingScope {
    core: Arc<ScopeCore>,
}

impl SimpleCountingScope {
    /// Creates a scope in the unused state.
    #[must_use]
    pub fn new() -> Self {
        Self {
            core: ScopeCore::new(),
        }
    }

    /// Returns a token for accounting work against this scope.
    #[must_use]
    pub fn token(&self) -> SimpleScopeToken {
        SimpleScopeToken {
            core: Arc::clone(&self.core),
        }
    }

    /// Refuses future associations.
    pub fn close(&self) {
        self.core.close();
    }

    /// Returns a sender completing (with no value) once the association
    /// count reaches zero.
    #[must_use]
    pub fn join(&self) -> JoinSender {
        JoinSender {
            core: Arc::clone(&self.core),
        }
    }
}

impl Default for SimpleCountingScope {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for SimpleCountingScope {
    fn drop(&mut self) {
        // Destruction is legal only in unused, unused-and-closed, or joined.
        assert!(
            self.core.droppable(),
            "scope dropped with live or unjoined associations"
        );
    }
}

/// Token of a [`SimpleCountingScope`].
#[derive(Debug, Clone)]
pub struct SimpleScopeToken {
    core: Arc<ScopeCore>,
}

impl ScopeToken for SimpleScopeToken {
    type Wrapped<S: Sender> = S;

    fn try_associate(&self) -> bool {
        self.core.try_associate()
    }

    fn disassociate(&self) {
        self.core.disassociate();
    }

    fn wrap<S: Sender>(&self, sender: S) -> S {
        sender
    }
}

/// Join sender shared by the scope flavours.
#[derive(Debug, Clone)]
pub struct JoinSender {
    core: Arc<ScopeCore>,
}

impl JoinSender {
    pub(crate) fn new(core: Arc<ScopeCore>) -> Self {
        Self { core }
    }
}

impl Sender for JoinSender {
    type Value = ();

    fn connect<R>(self, receiver: R) -> impl OperationState
    where
        R: Receiver<Value = ()>,
    {
        JoinOp {
            core: self.core,
            receiver,
        }
    }
}

struct JoinOp<R> {
    core: Arc<ScopeCore>,
    receiver: R,
}

impl<R> OperationState for JoinOp<R>
where
    R: Receiver<Value = ()>,
{
    fn start(self) {
        let Self { core, receiver } = self;
        trace!("join started");
        core.start_join(Box::new(move || receiver.set_value(())));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::consumers::sync_wait;

    #[test]
    fn unused_scope_joins_immediately() {
        let scope = SimpleCountingScope::new();
        assert_eq!(sync_wait(scope.join()).unwrap(), Some(()));
    }

    #[test]
    fn token_accounts_associations() {
        let scope = SimpleCountingScope::new();
        let token = scope.token();
        assert!(token.try_associate());
        assert!(token.try_associate());
        token.disassociate();
        token.disassociate();
        assert_eq!(sync_wait(scope.join()).unwrap(), Some(()));
    }

    #[test]
    fn closed_scope_refuses_associations() {
        let scope = SimpleCountingScope::new();
        scope.close();
        assert!(!scope.token().try_associate());
    }

    #[test]
    fn wrap_is_identity() {
        let scope = SimpleCountingScope::new();
        let sender = scope.token().wrap(crate::factories::just(4));
        assert_eq!(sync_wait(sender).unwrap(), Some(4));
        scope.close();
    }

    #[test]
    #[should_panic(expected = "scope dropped")]
    fn dropping_an_open_scope_panics() {
        let scope = SimpleCountingScope::new();
        assert!(scope.token().try_associate());
        drop(scope);
    }
}
