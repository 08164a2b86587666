//! The operation-state contract.
//!
//! Connecting a sender to a receiver yields an operation state; calling
//! [`OperationState::start`] begins execution. `start` consumes the
//! operation, which makes "callable once" a type-system fact, and transfers
//! ownership of all per-operation state into the completion path: whatever
//! context eventually delivers the completion (the calling thread, a
//! scheduler's task queue, a combinator's shared state) owns the state until
//! it does. That ownership transfer is what discharges the stay-alive
//! requirement the protocol places on started operations.
//!
//! `start` returns immediately: it either completes the receiver
//! synchronously or arranges for an asynchronous completion. It never blocks
//! waiting for work.

/// The materialised state of one `connect(sender, receiver)`.
pub trait OperationState {
    /// Begins execution.
    ///
    /// Exactly one completion will eventually be delivered to the connected
    /// receiver, possibly synchronously before `start` returns.
    fn start(self);
}
