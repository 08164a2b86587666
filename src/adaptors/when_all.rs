//! The `when_all` combinator: run children concurrently, aggregate values.
//!
//! All children are started; the shared state carries a mutex-guarded slot
//! table, a first-failure slot, and an acquire-release completion counter.
//! When every child has value-completed, the aggregated values are delivered
//! in declaration order regardless of completion order. If any child errors
//! or stops, the first such child wins; the remaining children still run to
//! completion (their results are ignored) and the failure is delivered once
//! the last child returns.
//!
//! Heterogeneous aggregation is the pairwise [`when_all`] (tuple of two),
//! with [`when_all3`]–[`when_all5`] composed associatively on top.
//! [`when_all_vec`] is the homogeneous N-ary form; with zero children it
//! completes immediately with an empty vector.

use crate::env::Env;
use crate::error::Error;
use crate::operation::OperationState;
use crate::receiver::Receiver;
use crate::sender::{Sender, SenderExt};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

/// The losing channel of an aggregation: the first error or stop wins.
enum Failure {
    Error(Error),
    Stopped,
}

// ---------------------------------------------------------------------------
// Pairwise when_all
// ---------------------------------------------------------------------------

/// Returns a sender aggregating two children into a value pair.
pub fn when_all<S1, S2>(first: S1, second: S2) -> WhenAll<S1, S2>
where
    S1: Sender,
    S2: Sender,
{
    WhenAll { first, second }
}

/// Three-way aggregation, composed associatively from [`when_all`].
pub fn when_all3<S1, S2, S3>(
    s1: S1,
    s2: S2,
    s3: S3,
) -> impl Sender<Value = (S1::Value, S2::Value, S3::Value)>
where
    S1: Sender,
    S2: Sender,
    S3: Sender,
{
    when_all(when_all(s1, s2), s3).then(|((v1, v2), v3)| (v1, v2, v3))
}

/// Four-way aggregation.
pub fn when_all4<S1, S2, S3, S4>(
    s1: S1,
    s2: S2,
    s3: S3,
    s4: S4,
) -> impl Sender<Value = (S1::Value, S2::Value, S3::Value, S4::Value)>
where
    S1: Sender,
    S2: Sender,
    S3: Sender,
    S4: Sender,
{
    when_all(when_all(s1, s2), when_all(s3, s4)).then(|((v1, v2), (v3, v4))| (v1, v2, v3, v4))
}

/// Five-way aggregation.
pub fn when_all5<S1, S2, S3, S4, S5>(
    s1: S1,
    s2: S2,
    s3: S3,
    s4: S4,
    s5: S5,
) -> impl Sender<Value = (S1::Value, S2::Value, S3::Value, S4::Value, S5::Value)>
where
    S1: Sender,
    S2: Sender,
    S3: Sender,
    S4: Sender,
    S5: Sender,
{
    when_all(when_all4(s1, s2, s3, s4), s5).then(|((v1, v2, v3, v4), v5)| (v1, v2, v3, v4, v5))
}

/// Sender returned by [`when_all`].
#[derive(Debug, Clone)]
pub struct WhenAll<S1, S2> {
    first: S1,
    second: S2,
}

struct PairSlots<V1, V2> {
    first: Option<V1>,
    second: Option<V2>,
    failure: Option<Failure>,
}

struct PairShared<V1, V2, R> {
    slots: Mutex<PairSlots<V1, V2>>,
    remaining: AtomicUsize,
    receiver: Mutex<Option<R>>,
    env: Env,
}

impl<V1, V2, R> PairShared<V1, V2, R>
where
    V1: Send + 'static,
    V2: Send + 'static,
    R: Receiver<Value = (V1, V2)>,
{
    fn record_failure(&self, failure: Failure) {
        let mut slots = self.slots.lock().expect("when_all slot lock poisoned");
        // First failure wins; later ones are dropped.
        if slots.failure.is_none() {
            slots.failure = Some(failure);
        }
    }

    fn child_done(&self) {
        if self.remaining.fetch_sub(1, Ordering::AcqRel) != 1 {
            return;
        }
        let receiver = self
            .receiver
            .lock()
            .expect("when_all receiver lock poisoned")
            .take()
            .expect("when_all completed twice");
        let mut slots = self.slots.lock().expect("when_all slot lock poisoned");
        match slots.failure.take() {
            Some(Failure::Error(err)) => {
                drop(slots);
                receiver.set_error(err);
            }
            Some(Failure::Stopped) => {
                drop(slots);
                receiver.set_stopped();
            }
            None => {
                let first = slots.first.take().expect("when_all missing first value");
                let second = slots.second.take().expect("when_all missing second value");
                drop(slots);
                receiver.set_value((first, second));
            }
        }
    }
}

impl<S1, S2> Sender for WhenAll<S1, S2>
where
    S1: Sender,
    S2: Sender,
{
    type Value = (S1::Value, S2::Value);

    fn connect<R>(self, receiver: R) -> impl OperationState
    where
        R: Receiver<Value = (S1::Value, S2::Value)>,
    {
        let env = receiver.env();
        let shared = Arc::new(PairShared {
            slots: Mutex::new(PairSlots {
                first: None,
                second: None,
                failure: None,
            }),
            remaining: AtomicUsize::new(2),
            receiver: Mutex::new(Some(receiver)),
            env,
        });
        PairOp {
            first: self.first.connect(PairFirst {
                shared: Arc::clone(&shared),
            }),
            second: self.second.connect(PairSecond { shared }),
        }
    }
}

struct PairOp<O1, O2> {
    first: O1,
    second: O2,
}

impl<O1, O2> OperationState for PairOp<O1, O2>
where
    O1: OperationState,
    O2: OperationState,
{
    fn start(self) {
        self.first.start();
        self.second.start();
    }
}

struct PairFirst<V1, V2, R> {
    shared: Arc<PairShared<V1, V2, R>>,
}

impl<V1, V2, R> Receiver for PairFirst<V1, V2, R>
where
    V1: Send + 'static,
    V2: Send + 'static,
    R: Receiver<Value = (V1, V2)>,
{
    type Value = V1;

    fn set_value(self, value: V1) {
        {
            let mut slots = self
                .shared
                .slots
                .lock()
                .expect("when_all slot lock poisoned");
            slots.first = Some(value);
        }
        self.shared.child_done();
    }

    fn set_error(self, error: Error) {
        self.shared.record_failure(Failure::Error(error));
        self.shared.child_done();
    }

    fn set_stopped(self) {
        self.shared.record_failure(Failure::Stopped);
        self.shared.child_done();
    }

    fn env(&self) -> Env {
        self.shared.env.clone()
    }
}

struct PairSecond<V1, V2, R> {
    shared: Arc<PairShared<V1, V2, R>>,
}

impl<V1, V2, R> Receiver for PairSecond<V1, V2, R>
where
    V1: Send + 'static,
    V2: Send + 'static,
    R: Receiver<Value = (V1, V2)>,
{
    type Value = V2;

    fn set_value(self, value: V2) {
        {
            let mut slots = self
                .shared
                .slots
                .lock()
                .expect("when_all slot lock poisoned");
            slots.second = Some(value);
        }
        self.shared.child_done();
    }

    fn set_error(self, error: Error) {
        self.shared.record_failure(Failure::Error(error));
        self.shared.child_done();
    }

    fn set_stopped(self) {
        self.shared.record_failure(Failure::Stopped);
        self.shared.child_done();
    }

    fn env(&self) -> Env {
        self.shared.env.clone()
    }
}

// ---------------------------------------------------------------------------
// Homogeneous when_all over a vector
// ---------------------------------------------------------------------------

/// Returns a sender aggregating a homogeneous set of children into a vector
/// of their values, in declaration order.
///
/// With zero children the sender completes immediately with an empty vector.
pub fn when_all_vec<S>(senders: Vec<S>) -> WhenAllVec<S>
where
    S: Sender,
{
    WhenAllVec { senders }
}

/// Sender returned by [`when_all_vec`].
#[derive(Debug, Clone)]
pub struct WhenAllVec<S> {
    senders: Vec<S>,
}

struct VecSlots<V> {
    values: Vec<Option<V>>,
    failure: Option<Failure>,
}

struct VecShared<V, R> {
    slots: Mutex<VecSlots<V>>,
    remaining: AtomicUsize,
    receiver: Mutex<Option<R>>,
    env: Env,
}

impl<V, R> VecShared<V, R>
where
    V: Send + 'static,
    R: Receiver<Value = Vec<V>>,
{
    fn child_done(&self) {
        if self.remaining.fetch_sub(1, Ordering::AcqRel) != 1 {
            return;
        }
        let receiver = self
            .receiver
            .lock()
            .expect("when_all receiver lock poisoned")
            .take()
            .expect("when_all completed twice");
        let mut slots = self.slots.lock().expect("when_all slot lock poisoned");
        match slots.failure.take() {
            Some(Failure::Error(err)) => {
                drop(slots);
                receiver.set_error(err);
            }
            Some(Failure::Stopped) => {
                drop(slots);
                receiver.set_stopped();
            }
            None => {
                let values = slots
                    .values
                    .iter_mut()
                    .map(|slot| slot.take().expect("when_all missing child value"))
                    .collect();
                drop(slots);
                receiver.set_value(values);
            }
        }
    }
}

impl<S> Sender for WhenAllVec<S>
where
    S: Sender,
{
    type Value = Vec<S::Value>;

    fn connect<R>(self, receiver: R) -> impl OperationState
    where
        R: Receiver<Value = Vec<S::Value>>,
    {
        let count = self.senders.len();
        let env = receiver.env();
        let shared = Arc::new(VecShared {
            slots: Mutex::new(VecSlots {
                values: (0..count).map(|_| None).collect(),
                failure: None,
            }),
            remaining: AtomicUsize::new(count),
            receiver: Mutex::new(Some(receiver)),
            env,
        });
        let children = self
            .senders
            .into_iter()
            .enumerate()
            .map(|(index, sender)| {
                sender.connect(VecChild {
                    index,
                    shared: Arc::clone(&shared),
                })
            })
            .collect::<Vec<_>>();
        VecOp { children, shared }
    }
}

struct VecOp<O, V, R> {
    children: Vec<O>,
    shared: Arc<VecShared<V, R>>,
}

impl<O, V, R> OperationState for VecOp<O, V, R>
where
    O: OperationState,
    V: Send + 'static,
    R: Receiver<Value = Vec<V>>,
{
    fn start(self) {
        if self.children.is_empty() {
            // Zero children: complete immediately with an empty aggregate.
            let receiver = self
                .shared
                .receiver
                .lock()
                .expect("when_all receiver lock poisoned")
                .take()
                .expect("when_all completed twice");
            receiver.set_value(Vec::new());
            return;
        }
        for child in self.children {
            child.start();
        }
    }
}

struct VecChild<V, R> {
    index: usize,
    shared: Arc<VecShared<V, R>>,
}

impl<V, R> Receiver for VecChild<V, R>
where
    V: Send + 'static,
    R: Receiver<Value = Vec<V>>,
{
    type Value = V;

    fn set_value(self, value: V) {
        {
            let mut slots = self
                .shared
                .slots
                .lock()
                .expect("when_all slot lock poisoned");
            slots.values[self.index] = Some(value);
        }
        self.shared.child_done();
    }

    fn set_error(self, error: Error) {
        {
            let mut slots = self
                .shared
                .slots
                .lock()
                .expect("when_all slot lock poisoned");
            if slots.failure.is_none() {
                slots.failure = Some(Failure::Error(error));
            }
        }
        self.shared.child_done();
    }

    fn set_stopped(self) {
        {
            let mut slots = self
                .shared
                .slots
                .lock()
                .expect("when_all slot lock poisoned");
            if slots.failure.is_none() {
                slots.failure = Some(Failure::Stopped);
            }
        }
        self.shared.child_done();
    }

    fn env(&self) -> Env {
        self.shared.env.clone()
    }
}
