//! Sender factories: the seeds of every pipeline.
//!
//! - [`just`] completes with the given value on `start`.
//! - [`just_error`] completes with the given error.
//! - [`just_stopped`] completes stopped.
//! - [`schedule`] / [`try_schedule`] return a scheduler's scheduling sender.
//!
//! All factory senders complete synchronously inside `start` on the calling
//! thread; the scheduling senders complete on their scheduler's context.

use crate::error::Error;
use crate::operation::OperationState;
use crate::receiver::Receiver;
use crate::scheduler::{Scheduler, TryScheduler};
use crate::sender::Sender;
use std::marker::PhantomData;

/// Returns a sender that completes with `value`.
///
/// Multi-argument completions are expressed as tuples: `just((1, "x"))`.
pub fn just<V>(value: V) -> Just<V>
where
    V: Send + 'static,
{
    Just { value }
}

/// Returns a sender that completes with `error` on the error channel.
///
/// The value-channel type `V` is whatever the surrounding pipeline expects.
pub fn just_error<V>(error: Error) -> JustError<V>
where
    V: Send + 'static,
{
    JustError {
        error,
        _value: PhantomData,
    }
}

/// Returns a sender that completes on the stopped channel.
pub fn just_stopped<V>() -> JustStopped<V>
where
    V: Send + 'static,
{
    JustStopped {
        _value: PhantomData,
    }
}

/// Returns `scheduler`'s scheduling sender.
///
/// The sender completes with no value on the scheduler's execution context.
pub fn schedule<Sch: Scheduler>(scheduler: &Sch) -> Sch::ScheduleSender {
    scheduler.schedule()
}

/// Returns `scheduler`'s non-blocking scheduling sender.
///
/// The sender completes with value, with [`Error::would_block`], or stopped;
/// it never blocks the caller.
pub fn try_schedule<Sch: TryScheduler>(scheduler: &Sch) -> Sch::TryScheduleSender {
    scheduler.try_schedule()
}

/// Sender returned by [`just`].
#[derive(Debug, Clone)]
pub struct Just<V> {
    value: V,
}

impl<V> Sender for Just<V>
where
    V: Send + 'static,
{
    type Value = V;

    fn connect<R>(self, receiver: R) -> impl OperationState
    where
        R: Receiver<Value = V>,
    {
        JustOp {
            value: self.value,
            receiver,
        }
    }
}

struct JustOp<V, R> {
    value: V,
    receiver: R,
}

impl<V, R> OperationState for JustOp<V, R>
where
    V: Send + 'static,
    R: Receiver<Value = V>,
{
    fn start(self) {
        self.receiver.set_value(self.value);
    }
}

/// Sender returned by [`just_error`].
#[derive(Debug, Clone)]
pub struct JustError<V> {
    error: Error,
    _value: PhantomData<fn() -> V>,
}

impl<V> Sender for JustError<V>
where
    V: Send + 'static,
{
    type Value = V;

    fn connect<R>(self, receiver: R) -> impl OperationState
    where
        R: Receiver<Value = V>,
    {
        JustErrorOp {
            error: self.error,
            receiver,
        }
    }
}

struct JustErrorOp<R> {
    error: Error,
    receiver: R,
}

impl<R> OperationState for JustErrorOp<R>
where
    R: Receiver,
{
    fn start(self) {
        self.receiver.set_error(self.error);
    }
}

/// Sender returned by [`just_stopped`].
#[derive(Debug, Clone)]
pub struct JustStopped<V> {
    _value: PhantomData<fn() -> V>,
}

impl<V> Sender for JustStopped<V>
where
    V: Send + 'static,
{
    type Value = V;

    fn connect<R>(self, receiver: R) -> impl OperationState
    where
        R: Receiver<Value = V>,
    {
        JustStoppedOp { receiver }
    }
}

struct JustStoppedOp<R> {
    receiver: R,
}

impl<R> OperationState for JustStoppedOp<R>
where
    R: Receiver,
{
    fn start(self) {
        self.receiver.set_stopped();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::consumers::sync_wait;
    use crate::error::ErrorKind;

    #[test]
    fn just_completes_with_value() {
        assert_eq!(sync_wait(just(7)).unwrap(), Some(7));
    }

    #[test]
    fn just_tuple_completes_with_tuple() {
        assert_eq!(sync_wait(just((1, "x"))).unwrap(), Some((1, "x")));
    }

    #[test]
    fn just_error_completes_on_error_channel() {
        let err = sync_wait(just_error::<i32>(Error::user("seed"))).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::User);
        assert_eq!(err.context(), Some("seed"));
    }

    #[test]
    fn just_stopped_completes_stopped() {
        assert_eq!(sync_wait(just_stopped::<i32>()).unwrap(), None);
    }
}
