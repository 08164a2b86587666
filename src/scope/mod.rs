//! Structured concurrency: async scopes, associations, and scoped spawning.
//!
//! A scope accounts in-flight work: every unit is represented by an
//! *association*, acquired through a [`ScopeToken`] with `try_associate` and
//! released with `disassociate`. Joining a scope completes only when the
//! count reaches zero, which is the structural guarantee that no work
//! outlives the scope.
//!
//! Flavours:
//!
//! - [`SimpleCountingScope`]: counting and join only.
//! - [`CountingScope`]: adds a stop source; its token wraps child senders so
//!   they observe the scope's stop token.
//! - [`let_async_scope`]: pipeline-embedded scope with first-error capture.
//!
//! Dropping a scope handle is legal only when it is unused, closed-unused,
//! or joined; any other state panics (the fatal-contract policy).

pub mod associate;
pub mod core;
pub mod counting;
pub mod let_async_scope;
pub mod simple;
pub mod spawn;

pub use associate::associate;
pub use counting::{CountingScope, CountingScopeToken, StopWhen};
pub use let_async_scope::{let_async_scope, AsyncScopeToken};
pub use simple::{SimpleCountingScope, SimpleScopeToken};
pub use spawn::{spawn, spawn_future, spawn_future_with_env, spawn_with_env};

use crate::sender::Sender;

/// A capability that accounts work against an async scope.
///
/// Tokens are cheap to clone and not transferable across scopes. `wrap`
/// lets a scope adapt the senders it hosts (a counting scope injects its
/// stop token).
pub trait ScopeToken: Clone + Send + Sync + 'static {
    /// The sender type produced by [`ScopeToken::wrap`].
    type Wrapped<S: Sender>: Sender<Value = S::Value>;

    /// Attempts to account one unit of work. False when the scope no longer
    /// accepts associations.
    #[must_use]
    fn try_associate(&self) -> bool;

    /// Releases one unit of work acquired by a successful `try_associate`.
    fn disassociate(&self);

    /// Adapts a sender about to run under this scope.
    fn wrap<S: Sender>(&self, sender: S) -> Self::Wrapped<S>;
}
