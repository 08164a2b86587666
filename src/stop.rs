//! Cooperative cancellation: stop sources, tokens, and callbacks.
//!
//! Stop is cooperative: a stop request sets a flag and fires registered
//! callbacks; it never preempts. Callees query their [`StopToken`] (obtained
//! from the receiver environment) at the points where stopping makes sense.
//!
//! Two source families share one implementation:
//!
//! - [`StopSource`] is clonable; every clone can request stop, and tokens
//!   keep the shared state alive. This is the heavyweight reference-counted
//!   variant.
//! - [`InplaceStopSource`] is single-owner and non-clonable; it is embedded
//!   in combinator shared state (`when_any`, scopes). Its tokens observe the
//!   source without extending its lifetime.
//!
//! # Callbacks
//!
//! [`StopCallback`] is an RAII registration guard. The callback is invoked
//! synchronously on the thread that calls `request_stop`, or immediately on
//! the registering thread if the source is already stopped. Dropping the
//! guard unregisters it. Callbacks fire in registration order.
//!
//! A callback that an in-flight `request_stop` has already extracted may
//! still run concurrently with (or after) guard drop. Callbacks therefore
//! own everything they touch; registering `'static` closures makes this
//! structurally true.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, Weak};

type BoxedCallback = Box<dyn FnOnce() + Send>;

#[derive(Default)]
struct CallbackRegistry {
    next_id: u64,
    // BTreeMap keyed by a monotonically increasing id: iteration order is
    // registration order, which keeps callback firing deterministic.
    entries: BTreeMap<u64, BoxedCallback>,
}

#[derive(Default)]
struct StopState {
    stopped: AtomicBool,
    callbacks: Mutex<CallbackRegistry>,
}

impl StopState {
    fn request_stop(&self) -> bool {
        if self.stopped.swap(true, Ordering::AcqRel) {
            return false;
        }
        // Extract under the lock, fire outside it: callbacks may themselves
        // register or unregister on this source without deadlocking.
        let fired = {
            let mut registry = self
                .callbacks
                .lock()
                .expect("stop callback registry lock poisoned");
            std::mem::take(&mut registry.entries)
        };
        for (_, callback) in fired {
            callback();
        }
        true
    }

    fn stop_requested(&self) -> bool {
        self.stopped.load(Ordering::Acquire)
    }

    /// Registers a callback, or returns `None` (after invoking it) if the
    /// source is already stopped.
    fn register(&self, callback: BoxedCallback) -> Option<u64> {
        if self.stop_requested() {
            callback();
            return None;
        }
        let id = {
            let mut registry = self
                .callbacks
                .lock()
                .expect("stop callback registry lock poisoned");
            // Re-check under the lock: a concurrent request_stop that won the
            // flag has already drained (or is draining) the registry, and an
            // entry added now would never fire.
            if self.stop_requested() {
                drop(registry);
                callback();
                return None;
            }
            let id = registry.next_id;
            registry.next_id += 1;
            registry.entries.insert(id, callback);
            id
        };
        Some(id)
    }

    fn unregister(&self, id: u64) {
        let mut registry = self
            .callbacks
            .lock()
            .expect("stop callback registry lock poisoned");
        registry.entries.remove(&id);
    }
}

/// A clonable, reference-counted stop source.
///
/// Every clone refers to the same stop state; tokens obtained from it keep
/// the state alive.
#[derive(Clone, Default)]
pub struct StopSource {
    state: Arc<StopState>,
}

impl StopSource {
    /// Creates a new stop source in the not-stopped state.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Requests stop. Returns true if this call transitioned the source.
    ///
    /// Registered callbacks fire synchronously on the calling thread.
    pub fn request_stop(&self) -> bool {
        self.state.request_stop()
    }

    /// Returns true if stop has been requested.
    #[must_use]
    pub fn stop_requested(&self) -> bool {
        self.state.stop_requested()
    }

    /// Returns a token observing this source.
    ///
    /// The token shares ownership of the stop state.
    #[must_use]
    pub fn token(&self) -> StopToken {
        StopToken {
            inner: TokenInner::Owned(Arc::clone(&self.state)),
        }
    }
}

impl std::fmt::Debug for StopSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StopSource")
            .field("stop_requested", &self.stop_requested())
            .finish()
    }
}

/// A single-owner stop source for embedding in operation shared state.
///
/// Not clonable: exactly one place may own it (and request stop through it).
/// Tokens obtained from it observe the source without keeping it alive; once
/// the source is dropped, its tokens report that stop is no longer possible.
#[derive(Default)]
pub struct InplaceStopSource {
    state: Arc<StopState>,
}

impl InplaceStopSource {
    /// Creates a new stop source in the not-stopped state.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Requests stop. Returns true if this call transitioned the source.
    pub fn request_stop(&self) -> bool {
        self.state.request_stop()
    }

    /// Returns true if stop has been requested.
    #[must_use]
    pub fn stop_requested(&self) -> bool {
        self.state.stop_requested()
    }

    /// Returns a non-owning token observing this source.
    #[must_use]
    pub fn token(&self) -> StopToken {
        StopToken {
            inner: TokenInner::Observed(Arc::downgrade(&self.state)),
        }
    }
}

impl std::fmt::Debug for InplaceStopSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InplaceStopSource")
            .field("stop_requested", &self.stop_requested())
            .finish()
    }
}

#[derive(Clone)]
enum TokenInner {
    /// No associated source: stop can never be requested.
    Never,
    /// Shares ownership of the stop state ([`StopSource`] family).
    Owned(Arc<StopState>),
    /// Observes without owning ([`InplaceStopSource`] family).
    Observed(Weak<StopState>),
}

/// A cheap, clonable handle observing a stop source.
///
/// The default token ([`StopToken::never`]) belongs to no source and never
/// reports stop; it is what an empty environment hands out.
#[derive(Clone)]
pub struct StopToken {
    inner: TokenInner,
}

impl StopToken {
    /// A token on which stop can never be requested.
    #[must_use]
    pub const fn never() -> Self {
        Self {
            inner: TokenInner::Never,
        }
    }

    /// Returns true if the associated source has requested stop.
    #[must_use]
    pub fn stop_requested(&self) -> bool {
        match &self.inner {
            TokenInner::Never => false,
            TokenInner::Owned(state) => state.stop_requested(),
            TokenInner::Observed(state) => state
                .upgrade()
                .is_some_and(|state| state.stop_requested()),
        }
    }

    /// Returns true if a stop request could still be observed through this
    /// token (a live source is associated).
    #[must_use]
    pub fn stop_possible(&self) -> bool {
        match &self.inner {
            TokenInner::Never => false,
            TokenInner::Owned(_) => true,
            TokenInner::Observed(state) => state.strong_count() > 0,
        }
    }

    /// Registers `callback` to run when stop is requested.
    ///
    /// If the source is already stopped, `callback` runs immediately on this
    /// thread and the returned guard is inert. Dropping the guard
    /// unregisters the callback.
    pub fn on_stop(&self, callback: impl FnOnce() + Send + 'static) -> StopCallback {
        let state = match &self.inner {
            TokenInner::Never => None,
            TokenInner::Owned(state) => Some(Arc::clone(state)),
            TokenInner::Observed(state) => state.upgrade(),
        };
        let Some(state) = state else {
            return StopCallback { registration: None };
        };
        let registration = state
            .register(Box::new(callback))
            .map(|id| (Arc::downgrade(&state), id));
        StopCallback { registration }
    }
}

impl Default for StopToken {
    fn default() -> Self {
        Self::never()
    }
}

impl std::fmt::Debug for StopToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StopToken")
            .field("stop_possible", &self.stop_possible())
            .field("stop_requested", &self.stop_requested())
            .finish()
    }
}

/// RAII guard for a registered stop callback.
///
/// Dropping the guard unregisters the callback if it has not fired.
#[must_use = "dropping the guard unregisters the callback"]
pub struct StopCallback {
    registration: Option<(Weak<StopState>, u64)>,
}

impl Drop for StopCallback {
    fn drop(&mut self) {
        if let Some((state, id)) = self.registration.take() {
            if let Some(state) = state.upgrade() {
                state.unregister(id);
            }
        }
    }
}

impl std::fmt::Debug for StopCallback {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StopCallback")
            .field("registered", &self.registration.is_some())
            .finish()
    }
}
