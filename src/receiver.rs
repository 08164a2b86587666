//! The receiver contract: a sink for a sender's completion.
//!
//! A receiver exposes three completion methods, one per channel. Each takes
//! `self` by value, so the type system enforces the protocol invariant that
//! exactly one completion is delivered, at most once: completing a receiver
//! consumes it.
//!
//! Completion methods must not panic. Adaptors that run user code catch
//! panics *before* touching their downstream receiver and reroute them to
//! the error channel.

use crate::env::Env;
use crate::error::Error;

/// A sink for exactly one completion of a sender.
///
/// Implementors are move-constructible sinks; the environment accessor
/// exposes the queries (stop token, scheduler, …) visible to the operation
/// completing into this receiver.
pub trait Receiver: Send + 'static {
    /// The payload type of the value channel.
    type Value: Send + 'static;

    /// Completes the operation successfully with a value.
    fn set_value(self, value: Self::Value);

    /// Completes the operation with an error.
    fn set_error(self, error: Error);

    /// Completes the operation as stopped (cancelled, no result).
    fn set_stopped(self);

    /// The environment visible to the operation completing into this
    /// receiver.
    ///
    /// Wrapping receivers forward their outer receiver's environment unless
    /// they inject queries of their own.
    fn env(&self) -> Env {
        Env::empty()
    }
}
