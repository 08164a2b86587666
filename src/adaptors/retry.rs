//! The `retry` family: reconnect and re-run a sender after errors.
//!
//! Every variant shares one state machine: a per-operation shared state
//! holding the sender template, the outer receiver, a mutex, and a re-entry
//! guard. Each attempt reconnects a fresh clone of the input sender. An
//! attempt that errors *synchronously inside its own `start`* would recurse
//! into launching the next attempt; the guard converts that recursion into a
//! loop, so a sender that fails synchronously a million times retries in
//! constant stack.
//!
//! - [`retry`] retries indefinitely on any error.
//! - [`retry_n`] connects at most `max_attempts` times, then surfaces the
//!   last error.
//! - [`retry_if`] consults a predicate; a predicate panic surfaces as the
//!   error.
//! - [`retry_with_backoff`] sleeps the current delay between attempts
//!   (`delay = min(delay × multiplier, cap)`) and hops each new attempt
//!   through the supplied scheduler.
//!
//! Value and stopped completions are forwarded; retry never retries on
//! stopped.

use crate::env::Env;
use crate::error::Error;
use crate::operation::OperationState;
use crate::receiver::Receiver;
use crate::scheduler::Scheduler;
use crate::sender::Sender;
use crate::util::catch_panic;
use std::sync::{Arc, Mutex};
use std::time::Duration;

// ---------------------------------------------------------------------------
// Backoff policy
// ---------------------------------------------------------------------------

/// Delay policy for [`retry_with_backoff`].
///
/// Defaults: 100 ms initial delay, 10 s cap, ×2 growth, 5 attempts.
#[derive(Debug, Clone)]
pub struct BackoffPolicy {
    /// Delay before the first retry.
    pub initial_delay: Duration,
    /// Cap on the delay between attempts.
    pub max_delay: Duration,
    /// Multiplier applied to the delay after each attempt (≥ 1.0).
    pub multiplier: f64,
    /// Maximum number of connects, including the first attempt.
    pub max_attempts: usize,
}

impl BackoffPolicy {
    /// Creates the default policy.
    #[must_use]
    pub fn new() -> Self {
        Self {
            initial_delay: Duration::from_millis(100),
            max_delay: Duration::from_secs(10),
            multiplier: 2.0,
            max_attempts: 5,
        }
    }

    /// Sets the initial delay.
    #[must_use]
    pub const fn with_initial_delay(mut self, delay: Duration) -> Self {
        self.initial_delay = delay;
        self
    }

    /// Sets the delay cap.
    #[must_use]
    pub const fn with_max_delay(mut self, delay: Duration) -> Self {
        self.max_delay = delay;
        self
    }

    /// Sets the growth multiplier (clamped to ≥ 1.0).
    #[must_use]
    pub fn with_multiplier(mut self, multiplier: f64) -> Self {
        self.multiplier = multiplier.max(1.0);
        self
    }

    /// Sets the attempt cap (clamped to ≥ 1).
    #[must_use]
    pub fn with_max_attempts(mut self, max_attempts: usize) -> Self {
        self.max_attempts = max_attempts.max(1);
        self
    }

    fn advance(&self, current: Duration) -> Duration {
        let scaled = current.as_secs_f64() * self.multiplier;
        Duration::from_secs_f64(scaled).min(self.max_delay)
    }
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self::new()
    }
}

// ---------------------------------------------------------------------------
// Retry decision plumbing
// ---------------------------------------------------------------------------

/// What to do after an attempt errored.
enum Decision {
    /// Reconnect and start a fresh attempt immediately.
    Retry,
    /// Sleep, then reconnect (backoff).
    RetryAfter(Duration),
    /// Give up and surface this error.
    Give(Error),
}

/// Per-variant policy consulted once per observed error.
trait Decider: Send + 'static {
    fn on_error(&mut self, error: Error) -> Decision;
}

/// Retries forever.
struct Always;

impl Decider for Always {
    fn on_error(&mut self, _error: Error) -> Decision {
        Decision::Retry
    }
}

/// Bounded attempt count; surfaces the last error.
struct UpTo {
    attempts: usize,
    max_attempts: usize,
}

impl Decider for UpTo {
    fn on_error(&mut self, error: Error) -> Decision {
        self.attempts += 1;
        if self.attempts >= self.max_attempts {
            Decision::Give(error)
        } else {
            Decision::Retry
        }
    }
}

/// Predicate-gated retry.
struct WhilePred<P> {
    predicate: P,
}

impl<P> Decider for WhilePred<P>
where
    P: FnMut(&Error) -> bool + Send + 'static,
{
    fn on_error(&mut self, error: Error) -> Decision {
        match catch_panic(|| (self.predicate)(&error)) {
            Ok(true) => Decision::Retry,
            Ok(false) => Decision::Give(error),
            // A predicate panic surfaces in place of the original error.
            Err(panic_err) => Decision::Give(panic_err),
        }
    }
}

/// Exponential backoff with an attempt cap.
struct Backoff {
    policy: BackoffPolicy,
    attempts: usize,
    current_delay: Duration,
}

impl Decider for Backoff {
    fn on_error(&mut self, error: Error) -> Decision {
        self.attempts += 1;
        if self.attempts >= self.policy.max_attempts {
            return Decision::Give(error);
        }
        let delay = self.current_delay;
        self.current_delay = self.policy.advance(self.current_delay);
        Decision::RetryAfter(delay)
    }
}

// ---------------------------------------------------------------------------
// Shared retry state
// ---------------------------------------------------------------------------

struct RetryInner<S, D> {
    sender: S,
    decider: D,
    /// Re-entry guard: true while an attempt-launch frame is on the stack.
    launching: bool,
    /// Set by a synchronous completion that wants another attempt.
    pending: bool,
}

struct RetryShared<S, R, D, H> {
    inner: Mutex<RetryInner<S, D>>,
    receiver: Mutex<Option<R>>,
    env: Env,
    /// Hop used by backoff to move the next attempt onto a scheduler.
    hop: H,
}

/// How the next attempt reaches its execution context after a delay.
trait AttemptHop<S, R, D>: Send + Sync + Sized + 'static
where
    S: Sender + Clone,
    R: Receiver<Value = S::Value>,
    D: Decider,
{
    fn hop(shared: &Arc<RetryShared<S, R, D, Self>>);
}

/// Launch on the completing thread (the non-backoff variants).
struct DirectHop;

impl<S, R, D> AttemptHop<S, R, D> for DirectHop
where
    S: Sender + Clone,
    R: Receiver<Value = S::Value>,
    D: Decider,
{
    fn hop(shared: &Arc<RetryShared<S, R, D, Self>>) {
        launch_attempts(shared);
    }
}

/// Launch via a scheduler hop (backoff).
struct ScheduledHop<Sch> {
    scheduler: Sch,
}

impl<S, R, D, Sch> AttemptHop<S, R, D> for ScheduledHop<Sch>
where
    S: Sender + Clone,
    R: Receiver<Value = S::Value>,
    D: Decider,
    Sch: Scheduler,
{
    fn hop(shared: &Arc<RetryShared<S, R, D, Self>>) {
        let hop_receiver = HopReceiver {
            shared: Arc::clone(shared),
        };
        shared.hop.scheduler.schedule().connect(hop_receiver).start();
    }
}

/// Receiver for the scheduler hop between backoff attempts.
struct HopReceiver<S, R, D, H>
where
    S: Sender,
{
    shared: Arc<RetryShared<S, R, D, H>>,
}

impl<S, R, D, H> Receiver for HopReceiver<S, R, D, H>
where
    S: Sender + Clone,
    R: Receiver<Value = S::Value>,
    D: Decider,
    H: AttemptHop<S, R, D>,
{
    type Value = ();

    fn set_value(self, (): ()) {
        launch_attempts(&self.shared);
    }

    fn set_error(self, error: Error) {
        complete_error(&self.shared, error);
    }

    fn set_stopped(self) {
        if let Some(receiver) = take_receiver(&self.shared) {
            receiver.set_stopped();
        }
    }

    fn env(&self) -> Env {
        self.shared.env.clone()
    }
}

fn take_receiver<S, R, D, H>(shared: &RetryShared<S, R, D, H>) -> Option<R>
where
    S: Sender,
{
    shared
        .receiver
        .lock()
        .expect("retry receiver lock poisoned")
        .take()
}

fn complete_error<S, R, D, H>(shared: &RetryShared<S, R, D, H>, error: Error)
where
    S: Sender,
    R: Receiver<Value = S::Value>,
{
    if let Some(receiver) = take_receiver(shared) {
        receiver.set_error(error);
    }
}

/// Launches attempts until one is in flight asynchronously or the operation
/// completed.
///
/// The launching/pending pair is the re-entry guard: an attempt that
/// completes with a retryable error *during its own `start`* finds
/// `launching` set, records `pending`, and returns; the loop below picks the
/// request up without growing the stack.
fn launch_attempts<S, R, D, H>(shared: &Arc<RetryShared<S, R, D, H>>)
where
    S: Sender + Clone,
    R: Receiver<Value = S::Value>,
    D: Decider,
    H: AttemptHop<S, R, D>,
{
    {
        let mut inner = shared.inner.lock().expect("retry state lock poisoned");
        if inner.launching {
            inner.pending = true;
            return;
        }
        inner.launching = true;
    }
    loop {
        let sender = {
            let inner = shared.inner.lock().expect("retry state lock poisoned");
            inner.sender.clone()
        };
        let attempt = AttemptReceiver {
            shared: Arc::clone(shared),
        };
        // Start outside the lock: the attempt may run arbitrary user code
        // and may complete synchronously.
        sender.connect(attempt).start();

        let mut inner = shared.inner.lock().expect("retry state lock poisoned");
        if inner.pending {
            inner.pending = false;
            continue;
        }
        inner.launching = false;
        return;
    }
}

/// Receiver wired to each attempt.
struct AttemptReceiver<S, R, D, H>
where
    S: Sender,
{
    shared: Arc<RetryShared<S, R, D, H>>,
}

impl<S, R, D, H> Receiver for AttemptReceiver<S, R, D, H>
where
    S: Sender + Clone,
    R: Receiver<Value = S::Value>,
    D: Decider,
    H: AttemptHop<S, R, D>,
{
    type Value = S::Value;

    fn set_value(self, value: S::Value) {
        if let Some(receiver) = take_receiver(&self.shared) {
            receiver.set_value(value);
        }
    }

    fn set_error(self, error: Error) {
        let decision = {
            let mut inner = self
                .shared
                .inner
                .lock()
                .expect("retry state lock poisoned");
            inner.decider.on_error(error)
        };
        match decision {
            Decision::Retry => launch_attempts(&self.shared),
            Decision::RetryAfter(delay) => {
                // The cumulative-delay guarantee: the completion cannot be
                // observed before the sum of the delays has elapsed.
                std::thread::sleep(delay);
                H::hop(&self.shared);
            }
            Decision::Give(error) => complete_error(&self.shared, error),
        }
    }

    fn set_stopped(self) {
        if let Some(receiver) = take_receiver(&self.shared) {
            receiver.set_stopped();
        }
    }

    fn env(&self) -> Env {
        self.shared.env.clone()
    }
}

// ---------------------------------------------------------------------------
// Public senders
// ---------------------------------------------------------------------------

/// Returns a sender retrying `sender` indefinitely on any error.
pub fn retry<S>(sender: S) -> Retry<S>
where
    S: Sender + Clone,
{
    Retry { sender }
}

/// Returns a sender connecting `sender` at most `max_attempts` times.
///
/// After the final attempt errors, the last error surfaces. `max_attempts`
/// is clamped to at least 1; `retry_n(s, 1)` is observationally `s`.
pub fn retry_n<S>(sender: S, max_attempts: usize) -> RetryN<S>
where
    S: Sender + Clone,
{
    RetryN {
        sender,
        max_attempts: max_attempts.max(1),
    }
}

/// Returns a sender retrying while `predicate` approves the observed error.
pub fn retry_if<S, P>(sender: S, predicate: P) -> RetryIf<S, P>
where
    S: Sender + Clone,
    P: FnMut(&Error) -> bool + Send + 'static,
{
    RetryIf { sender, predicate }
}

/// Returns a sender retrying with exponential backoff, hopping each new
/// attempt through `scheduler`.
pub fn retry_with_backoff<S, Sch>(sender: S, scheduler: Sch, policy: BackoffPolicy) -> RetryBackoff<S, Sch>
where
    S: Sender + Clone,
    Sch: Scheduler,
{
    RetryBackoff {
        sender,
        scheduler,
        policy,
    }
}

fn connect_retry<S, R, D, H>(sender: S, receiver: R, decider: D, hop: H) -> RetryOperation<S, R, D, H>
where
    S: Sender + Clone,
    R: Receiver<Value = S::Value>,
    D: Decider,
    H: AttemptHop<S, R, D>,
{
    let env = receiver.env();
    RetryOperation {
        shared: Arc::new(RetryShared {
            inner: Mutex::new(RetryInner {
                sender,
                decider,
                launching: false,
                pending: false,
            }),
            receiver: Mutex::new(Some(receiver)),
            env,
            hop,
        }),
    }
}

struct RetryOperation<S, R, D, H>
where
    S: Sender,
{
    shared: Arc<RetryShared<S, R, D, H>>,
}

impl<S, R, D, H> OperationState for RetryOperation<S, R, D, H>
where
    S: Sender + Clone,
    R: Receiver<Value = S::Value>,
    D: Decider,
    H: AttemptHop<S, R, D>,
{
    fn start(self) {
        launch_attempts(&self.shared);
    }
}

/// Sender returned by [`retry`].
#[derive(Debug, Clone)]
pub struct Retry<S> {
    sender: S,
}

impl<S> Sender for Retry<S>
where
    S: Sender + Clone,
{
    type Value = S::Value;

    fn connect<R>(self, receiver: R) -> impl OperationState
    where
        R: Receiver<Value = S::Value>,
    {
        connect_retry(self.sender, receiver, Always, DirectHop)
    }
}

/// Sender returned by [`retry_n`].
#[derive(Debug, Clone)]
pub struct RetryN<S> {
    sender: S,
    max_attempts: usize,
}

impl<S> Sender for RetryN<S>
where
    S: Sender + Clone,
{
    type Value = S::Value;

    fn connect<R>(self, receiver: R) -> impl OperationState
    where
        R: Receiver<Value = S::Value>,
    {
        connect_retry(
            self.sender,
            receiver,
            UpTo {
                attempts: 0,
                max_attempts: self.max_attempts,
            },
            DirectHop,
        )
    }
}

/// Sender returned by [`retry_if`].
#[derive(Debug, Clone)]
pub struct RetryIf<S, P> {
    sender: S,
    predicate: P,
}

impl<S, P> Sender for RetryIf<S, P>
where
    S: Sender + Clone,
    P: FnMut(&Error) -> bool + Send + 'static,
{
    type Value = S::Value;

    fn connect<R>(self, receiver: R) -> impl OperationState
    where
        R: Receiver<Value = S::Value>,
    {
        connect_retry(
            self.sender,
            receiver,
            WhilePred {
                predicate: self.predicate,
            },
            DirectHop,
        )
    }
}

/// Sender returned by [`retry_with_backoff`].
#[derive(Debug, Clone)]
pub struct RetryBackoff<S, Sch> {
    sender: S,
    scheduler: Sch,
    policy: BackoffPolicy,
}

impl<S, Sch> Sender for RetryBackoff<S, Sch>
where
    S: Sender + Clone,
    Sch: Scheduler,
{
    type Value = S::Value;

    fn connect<R>(self, receiver: R) -> impl OperationState
    where
        R: Receiver<Value = S::Value>,
    {
        let current_delay = self.policy.initial_delay;
        connect_retry(
            self.sender,
            receiver,
            Backoff {
                policy: self.policy,
                attempts: 0,
                current_delay,
            },
            ScheduledHop {
                scheduler: self.scheduler,
            },
        )
    }
}
