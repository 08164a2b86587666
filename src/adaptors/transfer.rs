//! The `transfer` adaptor: move a pipeline onto another scheduler.
//!
//! On a value completion the value is captured and a continuation is
//! scheduled on the target scheduler; the continuation forwards the value on
//! that context. Error and stopped completions are delivered directly on the
//! originating thread without a scheduling round-trip. If scheduling itself
//! fails, the scheduling error is delivered instead.
//!
//! The captured value moves into the continuation receiver, which moves into
//! the scheduler's task: the heap cell holding it cannot disappear before
//! the continuation runs.

use crate::env::Env;
use crate::error::Error;
use crate::operation::OperationState;
use crate::receiver::Receiver;
use crate::scheduler::Scheduler;
use crate::sender::Sender;

/// Returns a sender delivering `sender`'s value completion on `scheduler`.
pub fn transfer<S, Sch>(sender: S, scheduler: Sch) -> Transfer<S, Sch>
where
    S: Sender,
    Sch: Scheduler,
{
    Transfer { sender, scheduler }
}

/// Sender returned by [`transfer`].
#[derive(Debug, Clone)]
pub struct Transfer<S, Sch> {
    sender: S,
    scheduler: Sch,
}

impl<S, Sch> Sender for Transfer<S, Sch>
where
    S: Sender,
    Sch: Scheduler,
{
    type Value = S::Value;

    fn connect<R>(self, receiver: R) -> impl OperationState
    where
        R: Receiver<Value = S::Value>,
    {
        self.sender.connect(TransferReceiver {
            scheduler: self.scheduler,
            receiver,
        })
    }
}

struct TransferReceiver<Sch, R> {
    scheduler: Sch,
    receiver: R,
}

impl<Sch, R> Receiver for TransferReceiver<Sch, R>
where
    Sch: Scheduler,
    R: Receiver,
{
    type Value = R::Value;

    fn set_value(self, value: R::Value) {
        let Self {
            scheduler,
            receiver,
        } = self;
        // Capture the value and hop: the continuation completes with the
        // stored value once the schedule sender lands on the new context.
        scheduler
            .schedule()
            .connect(Continuation { value, receiver })
            .start();
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

struct Continuation<R: Receiver> {
    value: R::Value,
    receiver: R,
}

impl<R> Receiver for Continuation<R>
where
    R: Receiver,
{
    type Value = ();

    fn set_value(self, (): ()) {
        self.receiver.set_value(self.value);
    }

    fn set_error(self, error: Error) {
        // Scheduling failed; the stored value is dropped and the failure
        // surfaces downstream.
        self.receiver.set_error(error);
    }

    fn set_stopped(self) {
        self.receiver.set_stopped();
    }

    fn env(&self) -> Env {
        self.receiver.env()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::consumers::sync_wait;
    use crate::factories::{just, just_error};
    use crate::scheduler::{InlineScheduler, ThreadPool};
    use crate::sender::SenderExt;
    use std::thread;

    #[test]
    fn inline_transfer_forwards_the_value() {
        let sender = transfer(just(5), InlineScheduler);
        assert_eq!(sync_wait(sender).unwrap(), Some(5));
    }

    #[test]
    fn pool_transfer_lands_on_a_worker_thread() {
        let pool = ThreadPool::new(2);
        let origin = thread::current().id();
        let sender = just(())
            .transfer(pool.scheduler())
            .then(move |()| thread::current().id() != origin);
        assert_eq!(sync_wait(sender).unwrap(), Some(true));
    }

    #[test]
    fn error_skips_the_scheduling_hop() {
        let pool = ThreadPool::new(1);
        let sender = transfer(just_error::<i32>(crate::Error::user("e")), pool.scheduler());
        assert_eq!(sync_wait(sender).unwrap_err().context(), Some("e"));
    }

    #[test]
    fn transfer_then_chain_runs_on_target() {
        let pool = ThreadPool::new(1);
        let sender = just(10).transfer(pool.scheduler()).then(|x| x + 1);
        assert_eq!(sync_wait(sender).unwrap(), Some(11));
    }
}
