//! The inline scheduler: synchronous completion on the calling thread.

use crate::operation::OperationState;
use crate::receiver::Receiver;
use crate::scheduler::{DynScheduler, ForwardProgress, Scheduler};
use crate::sender::Sender;

/// A scheduler whose scheduling sender completes immediately on the calling
/// thread.
///
/// Forward progress is weakly parallel: work "scheduled" here only runs when
/// the caller runs it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct InlineScheduler;

impl Scheduler for InlineScheduler {
    type ScheduleSender = InlineSchedule;

    fn schedule(&self) -> InlineSchedule {
        InlineSchedule
    }

    fn forward_progress(&self) -> ForwardProgress {
        ForwardProgress::WeaklyParallel
    }
}

impl DynScheduler for InlineScheduler {
    fn submit_boxed(&self, task: Box<dyn FnOnce() + Send>) -> crate::error::Result<()> {
        task();
        Ok(())
    }

    fn dyn_forward_progress(&self) -> ForwardProgress {
        ForwardProgress::WeaklyParallel
    }
}

/// Scheduling sender of [`InlineScheduler`].
#[derive(Debug, Clone, Copy)]
pub struct InlineSchedule;

impl Sender for InlineSchedule {
    type Value = ();

    fn connect<R>(self, receiver: R) -> impl OperationState
    where
        R: Receiver<Value = ()>,
    {
        InlineOp { receiver }
    }
}

struct InlineOp<R> {
    receiver: R,
}

impl<R> OperationState for InlineOp<R>
where
    R: Receiver<Value = ()>,
{
    fn start(self) {
        self.receiver.set_value(());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::consumers::sync_wait;
    use crate::factories::schedule;
    use crate::sender::SenderExt;

    #[test]
    fn completes_synchronously_in_program_order() {
        let mut order = Vec::new();
        order.push("before");
        sync_wait(schedule(&InlineScheduler)).unwrap();
        order.push("after");
        assert_eq!(order, vec!["before", "after"]);
    }

    #[test]
    fn runs_on_the_calling_thread() {
        let caller = std::thread::current().id();
        let sender = schedule(&InlineScheduler).then(move |()| std::thread::current().id() == caller);
        assert_eq!(sync_wait(sender).unwrap(), Some(true));
    }

    #[test]
    fn is_weakly_parallel() {
        assert_eq!(
            InlineScheduler.forward_progress(),
            ForwardProgress::WeaklyParallel
        );
    }
}
