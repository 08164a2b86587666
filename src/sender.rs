//! The sender contract and the chaining extension trait.
//!
//! A sender is a deferred description of asynchronous work. Connecting it to
//! a receiver produces an operation state; starting that operation
//! eventually delivers exactly one completion on one of the three channels.
//!
//! Connect never starts work. Senders are consumed by `connect` (they are
//! moved into the operation); a sender that supports being connected more
//! than once says so by implementing `Clone`, and callers clone explicitly.
//!
//! The completion-signature machinery of the source model is carried by
//! associated types: [`Sender::Value`] is the value channel's payload (a
//! tuple for multi-argument completions), the error channel is always
//! [`crate::Error`], and the stopped channel carries nothing.
//!
//! # Chaining
//!
//! [`SenderExt`] provides method-style composition for every sender:
//!
//! ```rust
//! use strand::{just, sync_wait, SenderExt};
//!
//! let result = sync_wait(just(21).then(|x| x * 2));
//! assert_eq!(result.unwrap(), Some(42));
//! ```

use crate::adaptors::bulk::{Bulk, BulkChunked, BulkUnchunked, Policy};
use crate::adaptors::let_::{LetError, LetStopped, LetValue};
use crate::adaptors::retry::{BackoffPolicy, Retry, RetryBackoff, RetryIf, RetryN};
use crate::adaptors::then::Then;
use crate::adaptors::transfer::Transfer;
use crate::adaptors::upon::{UponError, UponStopped};
use crate::error::Error;
use crate::operation::OperationState;
use crate::receiver::Receiver;
use crate::scheduler::Scheduler;

/// A deferred description of asynchronous work.
pub trait Sender: Send + Sized + 'static {
    /// The payload type of the value channel.
    type Value: Send + 'static;

    /// Wires this sender to `receiver`, producing an operation state.
    ///
    /// Must not start execution and must not complete the receiver.
    fn connect<R>(self, receiver: R) -> impl OperationState
    where
        R: Receiver<Value = Self::Value>;
}

/// Method-style composition for senders.
///
/// Every adaptor is available both as a free function (`then(sender, f)`)
/// and as a method (`sender.then(f)`); the methods are thin wrappers.
pub trait SenderExt: Sender {
    /// Transforms the value channel with `f`. A panic in `f` is redirected
    /// to the error channel.
    fn then<F, U>(self, f: F) -> Then<Self, F>
    where
        F: FnOnce(Self::Value) -> U + Send + 'static,
        U: Send + 'static,
    {
        crate::adaptors::then(self, f)
    }

    /// Converts an error completion into a value completion via `f`.
    fn upon_error<F>(self, f: F) -> UponError<Self, F>
    where
        F: FnOnce(Error) -> Self::Value + Send + 'static,
    {
        crate::adaptors::upon_error(self, f)
    }

    /// Converts a stopped completion into a value completion via `f`.
    fn upon_stopped<F>(self, f: F) -> UponStopped<Self, F>
    where
        F: FnOnce() -> Self::Value + Send + 'static,
    {
        crate::adaptors::upon_stopped(self, f)
    }

    /// On value, obtains a new sender from `f` and runs it in place.
    fn let_value<F, S2>(self, f: F) -> LetValue<Self, F>
    where
        F: FnOnce(Self::Value) -> S2 + Send + 'static,
        S2: Sender,
    {
        crate::adaptors::let_value(self, f)
    }

    /// On error, obtains a recovery sender from `f` and runs it in place.
    fn let_error<F, S2>(self, f: F) -> LetError<Self, F>
    where
        F: FnOnce(Error) -> S2 + Send + 'static,
        S2: Sender<Value = Self::Value>,
    {
        crate::adaptors::let_error(self, f)
    }

    /// On stopped, obtains a fallback sender from `f` and runs it in place.
    fn let_stopped<F, S2>(self, f: F) -> LetStopped<Self, F>
    where
        F: FnOnce() -> S2 + Send + 'static,
        S2: Sender<Value = Self::Value>,
    {
        crate::adaptors::let_stopped(self, f)
    }

    /// Runs `f(i, &mut value)` once per `i ∈ [0, shape)` after a value
    /// completion, then forwards the value unchanged.
    fn bulk<F>(self, policy: Policy, shape: usize, f: F) -> Bulk<Self, F>
    where
        F: Fn(usize, &mut Self::Value) + Send + 'static,
    {
        crate::adaptors::bulk(self, policy, shape, f)
    }

    /// Chunked bulk: `f(begin, end, &mut value)` over a partition of
    /// `[0, shape)`.
    fn bulk_chunked<F>(self, policy: Policy, shape: usize, f: F) -> BulkChunked<Self, F>
    where
        F: Fn(usize, usize, &mut Self::Value) + Send + 'static,
    {
        crate::adaptors::bulk_chunked(self, policy, shape, f)
    }

    /// Unchunked bulk: one logical agent per iteration.
    fn bulk_unchunked<F>(self, policy: Policy, shape: usize, f: F) -> BulkUnchunked<Self, F>
    where
        F: Fn(usize, &mut Self::Value) + Send + 'static,
    {
        crate::adaptors::bulk_unchunked(self, policy, shape, f)
    }

    /// Reschedules the value completion onto `scheduler`. Error and stopped
    /// are delivered on the originating thread.
    fn transfer<Sch>(self, scheduler: Sch) -> Transfer<Self, Sch>
    where
        Sch: Scheduler,
    {
        crate::adaptors::transfer(self, scheduler)
    }

    /// Retries indefinitely on any error. Requires `Clone`: each attempt
    /// reconnects a fresh copy of this sender.
    fn retry(self) -> Retry<Self>
    where
        Self: Clone,
    {
        crate::adaptors::retry(self)
    }

    /// Retries up to `max_attempts` connects; the last error surfaces.
    fn retry_n(self, max_attempts: usize) -> RetryN<Self>
    where
        Self: Clone,
    {
        crate::adaptors::retry_n(self, max_attempts)
    }

    /// Retries while `predicate` approves the observed error.
    fn retry_if<P>(self, predicate: P) -> RetryIf<Self, P>
    where
        Self: Clone,
        P: FnMut(&Error) -> bool + Send + 'static,
    {
        crate::adaptors::retry_if(self, predicate)
    }

    /// Retries with exponential backoff, hopping each new attempt through
    /// `scheduler`.
    fn retry_with_backoff<Sch>(self, scheduler: Sch, policy: BackoffPolicy) -> RetryBackoff<Self, Sch>
    where
        Self: Clone,
        Sch: Scheduler,
    {
        crate::adaptors::retry_with_backoff(self, scheduler, policy)
    }
}

impl<S: Sender> SenderExt for S {}
