//! The `bulk` family: repeated invocation over an index space.
//!
//! Each variant takes an execution [`Policy`], a non-negative `shape`, and a
//! callable, and runs the callable over `[0, shape)` after a value
//! completion, then forwards the original value unchanged:
//!
//! - [`bulk_unchunked`]: `f(i, &mut value)` once per index, one logical
//!   agent per iteration.
//! - [`bulk_chunked`]: `f(begin, end, &mut value)` over contiguous chunks
//!   partitioning the index space (at least one chunk when `shape > 0`).
//! - [`bulk`]: defined in terms of `bulk_chunked` with a single-index
//!   loop body.
//!
//! The policy grants permissions (`par` permits concurrent agents, `unseq`
//! permits vectorisation); it never mandates them, and chunks may be fused.
//! `seq` requires index order. The first panic out of the callable wins the
//! error channel; with `seq` iteration simply stops there.

use crate::env::Env;
use crate::error::Error;
use crate::operation::OperationState;
use crate::receiver::Receiver;
use crate::sender::Sender;
use crate::util::catch_panic;
use std::thread;

/// Execution-policy tag for the `bulk` family.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Policy {
    /// Sequential, in index order.
    Seq,
    /// Concurrent agents permitted.
    Par,
    /// Concurrent agents and vectorisation permitted.
    ParUnseq,
    /// Vectorisation permitted, no concurrency.
    Unseq,
}

impl Policy {
    /// Returns true if the policy permits concurrent execution agents.
    #[must_use]
    pub const fn is_parallel(self) -> bool {
        matches!(self, Self::Par | Self::ParUnseq)
    }
}

/// Partitions `[0, shape)` into contiguous chunks.
///
/// Sequential policies use one chunk; parallel policies split by available
/// parallelism. Always at least one chunk when `shape > 0`.
fn chunk_bounds(policy: Policy, shape: usize) -> Vec<(usize, usize)> {
    if shape == 0 {
        return Vec::new();
    }
    let chunks = if policy.is_parallel() {
        thread::available_parallelism()
            .map(std::num::NonZeroUsize::get)
            .unwrap_or(1)
            .min(shape)
    } else {
        1
    };
    let base = shape / chunks;
    let extra = shape % chunks;
    let mut bounds = Vec::with_capacity(chunks);
    let mut begin = 0;
    for i in 0..chunks {
        let len = base + usize::from(i < extra);
        bounds.push((begin, begin + len));
        begin += len;
    }
    bounds
}

/// Returns a sender running `f(i, &mut value)` for each `i ∈ [0, shape)`.
pub fn bulk_unchunked<S, F>(sender: S, policy: Policy, shape: usize, f: F) -> BulkUnchunked<S, F>
where
    S: Sender,
    F: Fn(usize, &mut S::Value) + Send + 'static,
{
    BulkUnchunked {
        sender,
        policy,
        shape,
        fun: f,
    }
}

/// Returns a sender running `f(begin, end, &mut value)` over a chunked
/// partition of `[0, shape)`.
pub fn bulk_chunked<S, F>(sender: S, policy: Policy, shape: usize, f: F) -> BulkChunked<S, F>
where
    S: Sender,
    F: Fn(usize, usize, &mut S::Value) + Send + 'static,
{
    BulkChunked {
        sender,
        policy,
        shape,
        fun: f,
    }
}

/// Returns a sender running `f(i, &mut value)` for each index, expressed in
/// terms of the chunked basis operation.
pub fn bulk<S, F>(sender: S, policy: Policy, shape: usize, f: F) -> Bulk<S, F>
where
    S: Sender,
    F: Fn(usize, &mut S::Value) + Send + 'static,
{
    Bulk {
        sender,
        policy,
        shape,
        fun: f,
    }
}

/// Sender returned by [`bulk_unchunked`].
#[derive(Debug, Clone)]
pub struct BulkUnchunked<S, F> {
    sender: S,
    policy: Policy,
    shape: usize,
    fun: F,
}

impl<S, F> Sender for BulkUnchunked<S, F>
where
    S: Sender,
    F: Fn(usize, &mut S::Value) + Send + 'static,
{
    type Value = S::Value;

    fn connect<R>(self, receiver: R) -> impl OperationState
    where
        R: Receiver<Value = S::Value>,
    {
        let Self {
            sender,
            policy,
            shape,
            fun,
        } = self;
        sender.connect(BulkReceiver {
            receiver,
            run: move |value: &mut S::Value| {
                // One logical agent per iteration; agents are fused onto the
                // completing thread, which every policy permits.
                let _ = policy;
                for i in 0..shape {
                    fun(i, value);
                }
            },
        })
    }
}

/// Sender returned by [`bulk_chunked`].
#[derive(Debug, Clone)]
pub struct BulkChunked<S, F> {
    sender: S,
    policy: Policy,
    shape: usize,
    fun: F,
}

impl<S, F> Sender for BulkChunked<S, F>
where
    S: Sender,
    F: Fn(usize, usize, &mut S::Value) + Send + 'static,
{
    type Value = S::Value;

    fn connect<R>(self, receiver: R) -> impl OperationState
    where
        R: Receiver<Value = S::Value>,
    {
        let Self {
            sender,
            policy,
            shape,
            fun,
        } = self;
        sender.connect(BulkReceiver {
            receiver,
            run: move |value: &mut S::Value| {
                for (begin, end) in chunk_bounds(policy, shape) {
                    fun(begin, end, value);
                }
            },
        })
    }
}

/// Sender returned by [`bulk`].
#[derive(Debug, Clone)]
pub struct Bulk<S, F> {
    sender: S,
    policy: Policy,
    shape: usize,
    fun: F,
}

impl<S, F> Sender for Bulk<S, F>
where
    S: Sender,
    F: Fn(usize, &mut S::Value) + Send + 'static,
{
    type Value = S::Value;

    fn connect<R>(self, receiver: R) -> impl OperationState
    where
        R: Receiver<Value = S::Value>,
    {
        let Self {
            sender,
            policy,
            shape,
            fun,
        } = self;
        // bulk is bulk_chunked with a single-index loop body.
        sender.connect(BulkReceiver {
            receiver,
            run: move |value: &mut S::Value| {
                for (begin, end) in chunk_bounds(policy, shape) {
                    for i in begin..end {
                        fun(i, value);
                    }
                }
            },
        })
    }
}

struct BulkReceiver<R, Run> {
    receiver: R,
    run: Run,
}

impl<R, Run> Receiver for BulkReceiver<R, Run>
where
    R: Receiver,
    Run: FnOnce(&mut R::Value) + Send + 'static,
{
    type Value = R::Value;

    fn set_value(self, mut value: R::Value) {
        let Self { receiver, run } = self;
        match catch_panic(move || {
            run(&mut value);
            value
        }) {
            Ok(value) => receiver.set_value(value),
            Err(err) => receiver.set_error(err),
        }
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

#[cfg(test)]
mod tests {
    use super::*;
    use crate::consumers::sync_wait;
    use crate::factories::{just, just_error};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{Arc, Mutex};

    #[test]
    fn unchunked_seq_visits_indices_in_order() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let seen2 = Arc::clone(&seen);
        let sender = bulk_unchunked(just(0_u32), Policy::Seq, 5, move |i, _| {
            seen2.lock().unwrap().push(i);
        });
        assert_eq!(sync_wait(sender).unwrap(), Some(0));
        assert_eq!(*seen.lock().unwrap(), vec![0, 1, 2, 3, 4]);
    }

    #[test]
    fn unchunked_par_visits_every_index_once() {
        let counts = Arc::new((0..64).map(|_| AtomicUsize::new(0)).collect::<Vec<_>>());
        let counts2 = Arc::clone(&counts);
        let sender = bulk_unchunked(just(()), Policy::Par, 64, move |i, _| {
            counts2[i].fetch_add(1, Ordering::SeqCst);
        });
        sync_wait(sender).unwrap();
        for count in counts.iter() {
            assert_eq!(count.load(Ordering::SeqCst), 1);
        }
    }

    #[test]
    fn shape_zero_never_calls_f() {
        let called = Arc::new(AtomicUsize::new(0));
        let called2 = Arc::clone(&called);
        let sender = bulk(just(9), Policy::Seq, 0, move |_, _| {
            called2.fetch_add(1, Ordering::SeqCst);
        });
        assert_eq!(sync_wait(sender).unwrap(), Some(9));
        assert_eq!(called.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn chunked_partitions_cover_the_shape() {
        let covered = Arc::new(Mutex::new(vec![false; 100]));
        let covered2 = Arc::clone(&covered);
        let sender = bulk_chunked(just(()), Policy::Par, 100, move |begin, end, _| {
            assert!(begin < end);
            let mut covered = covered2.lock().unwrap();
            for slot in &mut covered[begin..end] {
                assert!(!*slot, "chunk overlap");
                *slot = true;
            }
        });
        sync_wait(sender).unwrap();
        assert!(covered.lock().unwrap().iter().all(|&c| c));
    }

    #[test]
    fn chunked_seq_uses_one_chunk() {
        let chunks = Arc::new(AtomicUsize::new(0));
        let chunks2 = Arc::clone(&chunks);
        let sender = bulk_chunked(just(()), Policy::Seq, 10, move |begin, end, _| {
            assert_eq!((begin, end), (0, 10));
            chunks2.fetch_add(1, Ordering::SeqCst);
        });
        sync_wait(sender).unwrap();
        assert_eq!(chunks.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn iterations_can_mutate_the_value() {
        let sender = bulk(just(vec![0_u64; 8]), Policy::Seq, 8, |i, v: &mut Vec<u64>| {
            v[i] = i as u64 * 2;
        });
        let result = sync_wait(sender).unwrap().unwrap();
        assert_eq!(result, vec![0, 2, 4, 6, 8, 10, 12, 14]);
    }

    #[test]
    fn panic_in_iteration_becomes_error() {
        let reached = Arc::new(AtomicUsize::new(0));
        let reached2 = Arc::clone(&reached);
        let sender = bulk_unchunked(just(()), Policy::Seq, 10, move |i, _| {
            if i == 3 {
                panic!("iteration 3 failed");
            }
            reached2.fetch_add(1, Ordering::SeqCst);
        });
        let err = sync_wait(sender).unwrap_err();
        assert!(err.is_panic());
        // seq stops at the first failure.
        assert_eq!(reached.load(Ordering::SeqCst), 3);
    }

    #[test]
    fn error_passes_through() {
        let sender = bulk(
            just_error::<i32>(crate::Error::user("upstream")),
            Policy::Seq,
            4,
            |_, _| {},
        );
        assert_eq!(sync_wait(sender).unwrap_err().context(), Some("upstream"));
    }
}
