//! The `when_any` combinator: first child to complete wins.
//!
//! All children are started; the first completion, on *any* channel, wins
//! a compare-and-swap and is stored. The winner then requests stop on an
//! internal stop source whose token is injected into every child's
//! environment, so well-behaved children abort promptly (active
//! cancellation). The last child to return, winner or not, delivers the
//! stored result downstream.
//!
//! External cancellation chains in: a stop callback registered on the outer
//! environment's token forwards stop requests to the internal source, and a
//! stop of the outer environment observed at delivery time downgrades the
//! completion to stopped regardless of what was stored. An outer environment
//! that is already stopped at `start` completes stopped without starting any
//! child.
//!
//! Value shapes:
//!
//! - [`when_any`] / [`when_any3`]: heterogeneous children, delivered as the
//!   [`WhenAnyResult`] / [`WhenAny3Result`] sum.
//! - [`when_any_vec`]: homogeneous children, delivered unwrapped.
//!
//! Storing a winner moves a value and cannot panic, so result storage needs
//! no panic guard.

use crate::env::Env;
use crate::error::Error;
use crate::operation::OperationState;
use crate::receiver::Receiver;
use crate::sender::Sender;
use crate::stop::{InplaceStopSource, StopCallback};
use std::marker::PhantomData;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, Weak};

/// The winner of a two-way [`when_any`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WhenAnyResult<A, B> {
    /// The first child won.
    First(A),
    /// The second child won.
    Second(B),
}

impl<A, B> WhenAnyResult<A, B> {
    /// Returns true if the first child won.
    #[must_use]
    pub const fn is_first(&self) -> bool {
        matches!(self, Self::First(_))
    }

    /// Returns true if the second child won.
    #[must_use]
    pub const fn is_second(&self) -> bool {
        matches!(self, Self::Second(_))
    }

    /// Maps the first variant.
    pub fn map_first<C, F: FnOnce(A) -> C>(self, f: F) -> WhenAnyResult<C, B> {
        match self {
            Self::First(a) => WhenAnyResult::First(f(a)),
            Self::Second(b) => WhenAnyResult::Second(b),
        }
    }

    /// Maps the second variant.
    pub fn map_second<C, F: FnOnce(B) -> C>(self, f: F) -> WhenAnyResult<A, C> {
        match self {
            Self::First(a) => WhenAnyResult::First(a),
            Self::Second(b) => WhenAnyResult::Second(f(b)),
        }
    }
}

/// The winner of a three-way [`when_any3`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WhenAny3Result<A, B, C> {
    /// The first child won.
    First(A),
    /// The second child won.
    Second(B),
    /// The third child won.
    Third(C),
}

// ---------------------------------------------------------------------------
// Shared race state
// ---------------------------------------------------------------------------

enum Outcome<V> {
    Value(V),
    Error(Error),
    Stopped,
}

struct AnyShared<V, R> {
    /// First-to-complete flag; the winning swap stores the outcome.
    completed: AtomicBool,
    /// Children still running; the last one out delivers.
    remaining: AtomicUsize,
    outcome: Mutex<Option<Outcome<V>>>,
    receiver: Mutex<Option<R>>,
    /// Internal source driving active cancellation of the losers.
    stop_source: InplaceStopSource,
    /// Guard for the callback chaining the outer token to the internal one.
    external_guard: Mutex<Option<StopCallback>>,
    /// The outer environment, checked again at delivery time.
    env: Env,
    /// The environment children see: outer env plus the internal token.
    child_env: Env,
}

impl<V, R> AnyShared<V, R>
where
    V: Send + 'static,
    R: Receiver<Value = V>,
{
    fn new(receiver: R, child_count: usize) -> Arc<Self> {
        let env = receiver.env();
        let stop_source = InplaceStopSource::new();
        let child_env = env.with_stop_token(stop_source.token());
        Arc::new(Self {
            completed: AtomicBool::new(false),
            remaining: AtomicUsize::new(child_count),
            outcome: Mutex::new(None),
            receiver: Mutex::new(Some(receiver)),
            stop_source,
            external_guard: Mutex::new(None),
            env,
            child_env,
        })
    }

    /// Records the winning outcome and prompts the losers to abort.
    fn try_win(&self, outcome: Outcome<V>) {
        if self.completed.swap(true, Ordering::AcqRel) {
            return;
        }
        *self
            .outcome
            .lock()
            .expect("when_any outcome lock poisoned") = Some(outcome);
        self.stop_source.request_stop();
    }

    /// Decrements the remaining count; the last child delivers downstream.
    fn child_done(&self) {
        if self.remaining.fetch_sub(1, Ordering::AcqRel) != 1 {
            return;
        }
        self.deliver();
    }

    fn deliver(&self) {
        // Unregister the external callback before completing.
        *self
            .external_guard
            .lock()
            .expect("when_any guard lock poisoned") = None;
        let receiver = self
            .receiver
            .lock()
            .expect("when_any receiver lock poisoned")
            .take()
            .expect("when_any completed twice");
        // An externally stopped environment forces stopped delivery no
        // matter what was stored.
        if self.env.stop_token().stop_requested() {
            receiver.set_stopped();
            return;
        }
        let outcome = self
            .outcome
            .lock()
            .expect("when_any outcome lock poisoned")
            .take();
        match outcome {
            Some(Outcome::Value(value)) => receiver.set_value(value),
            Some(Outcome::Error(error)) => receiver.set_error(error),
            Some(Outcome::Stopped) | None => receiver.set_stopped(),
        }
    }

    /// Chains the outer stop token into the internal source and reports
    /// whether the race may proceed (false: already stopped, delivered).
    fn begin(this: &Arc<Self>) -> bool {
        let weak: Weak<Self> = Arc::downgrade(this);
        let guard = this.env.stop_token().on_stop(move || {
            if let Some(shared) = weak.upgrade() {
                shared.stop_source.request_stop();
            }
        });
        *this
            .external_guard
            .lock()
            .expect("when_any guard lock poisoned") = Some(guard);

        if this.stop_source.stop_requested() {
            // The outer environment was stopped before we started; complete
            // stopped without running any child.
            this.deliver();
            return false;
        }
        true
    }
}

struct AnyChild<Vi, V, R, M> {
    shared: Arc<AnyShared<V, R>>,
    map: M,
    _child_value: PhantomData<fn(Vi)>,
}

impl<Vi, V, R, M> AnyChild<Vi, V, R, M> {
    fn new(shared: Arc<AnyShared<V, R>>, map: M) -> Self {
        Self {
            shared,
            map,
            _child_value: PhantomData,
        }
    }
}

impl<Vi, V, R, M> Receiver for AnyChild<Vi, V, R, M>
where
    Vi: Send + 'static,
    V: Send + 'static,
    R: Receiver<Value = V>,
    M: FnOnce(Vi) -> V + Send + 'static,
{
    type Value = Vi;

    fn set_value(self, value: Vi) {
        self.shared.try_win(Outcome::Value((self.map)(value)));
        self.shared.child_done();
    }

    fn set_error(self, error: Error) {
        self.shared.try_win(Outcome::Error(error));
        self.shared.child_done();
    }

    fn set_stopped(self) {
        // A stopped child that completes first is a winner like any other.
        self.shared.try_win(Outcome::Stopped);
        self.shared.child_done();
    }

    fn env(&self) -> Env {
        self.shared.child_env.clone()
    }
}

// ---------------------------------------------------------------------------
// Public senders
// ---------------------------------------------------------------------------

/// Returns a sender racing two children; the first completion wins.
pub fn when_any<S1, S2>(first: S1, second: S2) -> WhenAny<S1, S2>
where
    S1: Sender,
    S2: Sender,
{
    WhenAny { first, second }
}

/// Returns a sender racing three children.
pub fn when_any3<S1, S2, S3>(first: S1, second: S2, third: S3) -> WhenAny3<S1, S2, S3>
where
    S1: Sender,
    S2: Sender,
    S3: Sender,
{
    WhenAny3 {
        first,
        second,
        third,
    }
}

/// Returns a sender racing a homogeneous set of children, delivering the
/// winner's value unwrapped.
///
/// # Panics
///
/// Panics if `senders` is empty. A race requires at least one child; zero
/// children is a contract violation, not a stopped completion.
pub fn when_any_vec<S>(senders: Vec<S>) -> WhenAnyVec<S>
where
    S: Sender,
{
    assert!(
        !senders.is_empty(),
        "when_any requires at least one child"
    );
    WhenAnyVec { senders }
}

/// Sender returned by [`when_any`].
#[derive(Debug, Clone)]
pub struct WhenAny<S1, S2> {
    first: S1,
    second: S2,
}

impl<S1, S2> Sender for WhenAny<S1, S2>
where
    S1: Sender,
    S2: Sender,
{
    type Value = WhenAnyResult<S1::Value, S2::Value>;

    fn connect<R>(self, receiver: R) -> impl OperationState
    where
        R: Receiver<Value = WhenAnyResult<S1::Value, S2::Value>>,
    {
        let shared = AnyShared::new(receiver, 2);
        Any2Op {
            first: self
                .first
                .connect(AnyChild::new(Arc::clone(&shared), WhenAnyResult::First)),
            second: self
                .second
                .connect(AnyChild::new(Arc::clone(&shared), WhenAnyResult::Second)),
            shared,
        }
    }
}

struct Any2Op<O1, O2, V, R> {
    first: O1,
    second: O2,
    shared: Arc<AnyShared<V, R>>,
}

impl<O1, O2, V, R> OperationState for Any2Op<O1, O2, V, R>
where
    O1: OperationState,
    O2: OperationState,
    V: Send + 'static,
    R: Receiver<Value = V>,
{
    fn start(self) {
        if !AnyShared::begin(&self.shared) {
            return;
        }
        self.first.start();
        self.second.start();
    }
}

/// Sender returned by [`when_any3`].
#[derive(Debug, Clone)]
pub struct WhenAny3<S1, S2, S3> {
    first: S1,
    second: S2,
    third: S3,
}

impl<S1, S2, S3> Sender for WhenAny3<S1, S2, S3>
where
    S1: Sender,
    S2: Sender,
    S3: Sender,
{
    type Value = WhenAny3Result<S1::Value, S2::Value, S3::Value>;

    fn connect<R>(self, receiver: R) -> impl OperationState
    where
        R: Receiver<Value = WhenAny3Result<S1::Value, S2::Value, S3::Value>>,
    {
        let shared = AnyShared::new(receiver, 3);
        Any3Op {
            first: self
                .first
                .connect(AnyChild::new(Arc::clone(&shared), WhenAny3Result::First)),
            second: self
                .second
                .connect(AnyChild::new(Arc::clone(&shared), WhenAny3Result::Second)),
            third: self
                .third
                .connect(AnyChild::new(Arc::clone(&shared), WhenAny3Result::Third)),
            shared,
        }
    }
}

struct Any3Op<O1, O2, O3, V, R> {
    first: O1,
    second: O2,
    third: O3,
    shared: Arc<AnyShared<V, R>>,
}

impl<O1, O2, O3, V, R> OperationState for Any3Op<O1, O2, O3, V, R>
where
    O1: OperationState,
    O2: OperationState,
    O3: OperationState,
    V: Send + 'static,
    R: Receiver<Value = V>,
{
    fn start(self) {
        if !AnyShared::begin(&self.shared) {
            return;
        }
        self.first.start();
        self.second.start();
        self.third.start();
    }
}

/// Sender returned by [`when_any_vec`].
#[derive(Debug, Clone)]
pub struct WhenAnyVec<S> {
    senders: Vec<S>,
}

impl<S> Sender for WhenAnyVec<S>
where
    S: Sender,
{
    type Value = S::Value;

    fn connect<R>(self, receiver: R) -> impl OperationState
    where
        R: Receiver<Value = S::Value>,
    {
        let shared = AnyShared::new(receiver, self.senders.len());
        let children = self
            .senders
            .into_iter()
            .map(|sender| {
                sender.connect(AnyChild::new(
                    Arc::clone(&shared),
                    std::convert::identity as fn(S::Value) -> S::Value,
                ))
            })
            .collect::<Vec<_>>();
        AnyVecOp { children, shared }
    }
}

struct AnyVecOp<O, V, R> {
    children: Vec<O>,
    shared: Arc<AnyShared<V, R>>,
}

impl<O, V, R> OperationState for AnyVecOp<O, V, R>
where
    O: OperationState,
    V: Send + 'static,
    R: Receiver<Value = V>,
{
    fn start(self) {
        if !AnyShared::begin(&self.shared) {
            return;
        }
        for child in self.children {
            child.start();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::consumers::sync_wait;
    use crate::factories::{just, just_error, just_stopped};

    #[test]
    fn first_synchronous_child_wins() {
        let sender = when_any(just(1), just(2));
        assert_eq!(
            sync_wait(sender).unwrap(),
            Some(WhenAnyResult::First(1))
        );
    }

    #[test]
    fn heterogeneous_children_yield_a_sum() {
        let sender = when_any(just(7), just("text"));
        let winner = sync_wait(sender).unwrap().unwrap();
        assert!(winner.is_first());
        assert_eq!(winner.map_first(|x| x * 2), WhenAnyResult::First(14));
    }

    #[test]
    fn error_winner_propagates() {
        let sender = when_any(just_error::<i32>(Error::user("lost")), just(2));
        assert_eq!(sync_wait(sender).unwrap_err().context(), Some("lost"));
    }

    #[test]
    fn stopped_winner_is_a_winner() {
        let sender = when_any(just_stopped::<i32>(), just(2));
        assert_eq!(sync_wait(sender).unwrap(), None);
    }

    #[test]
    fn three_way_race() {
        let sender = when_any3(just(1), just("x"), just(3.5));
        assert_eq!(
            sync_wait(sender).unwrap(),
            Some(WhenAny3Result::First(1))
        );
    }

    #[test]
    fn vec_race_unwraps_homogeneous_values() {
        let sender = when_any_vec(vec![just(10), just(20)]);
        assert_eq!(sync_wait(sender).unwrap(), Some(10));
    }

    #[test]
    #[should_panic(expected = "at least one child")]
    fn empty_vec_is_a_contract_violation() {
        let _ = when_any_vec(Vec::<crate::factories::Just<i32>>::new());
    }
}
