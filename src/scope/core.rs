//! The scope lifecycle state machine.
//!
//! ```text
//! unused --try_associate--> open
//! unused --close--> unused-and-closed
//! open --close (count > 0)--> closed
//! open/closed --last disassociate while closing--> unused-and-closed
//! * --join starts--> joining
//! joining --count reaches 0--> joined
//! ```
//!
//! The state and association count live under one mutex, which is what lets
//! a join receiver park in the core and be fired by the last
//! `disassociate`. Destruction of a scope handle is legal only in `unused`,
//! `unused-and-closed`, or `joined`; anything else is a programming error
//! and panics.

use crate::tracing_compat::{debug, trace};
use std::sync::{Arc, Mutex};

/// Lifecycle phase of a scope.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum ScopePhase {
    Unused,
    Open,
    UnusedAndClosed,
    Closed,
    Joining,
    Joined,
}

type JoinWaiter = Box<dyn FnOnce() + Send>;

struct ScopeState {
    phase: ScopePhase,
    count: u64,
    join_waiters: Vec<JoinWaiter>,
}

/// The shared core of every scope flavour.
pub(crate) struct ScopeCore {
    state: Mutex<ScopeState>,
}

impl ScopeCore {
    pub(crate) fn new() -> Arc<Self> {
        Arc::new(Self {
            state: Mutex::new(ScopeState {
                phase: ScopePhase::Unused,
                count: 0,
                join_waiters: Vec::new(),
            }),
        })
    }

    /// Accounts one unit of in-flight work, unless the scope no longer
    /// accepts associations.
    pub(crate) fn try_associate(&self) -> bool {
        let mut state = self.state.lock().expect("scope state lock poisoned");
        match state.phase {
            ScopePhase::Unused => {
                state.phase = ScopePhase::Open;
                state.count = 1;
                trace!("scope opened");
                true
            }
            ScopePhase::Open => {
                state.count += 1;
                trace!(count = state.count, "association acquired");
                true
            }
            ScopePhase::UnusedAndClosed
            | ScopePhase::Closed
            | ScopePhase::Joining
            | ScopePhase::Joined => {
                trace!(phase = ?state.phase, "association refused");
                false
            }
        }
    }

    /// Releases one unit of in-flight work; the last release completes a
    /// pending close or join.
    pub(crate) fn disassociate(&self) {
        let waiters = {
            let mut state = self.state.lock().expect("scope state lock poisoned");
            assert!(state.count > 0, "disassociate without association");
            state.count -= 1;
            if state.count > 0 {
                Vec::new()
            } else {
                match state.phase {
                    ScopePhase::Closed => {
                        state.phase = ScopePhase::UnusedAndClosed;
                        debug!("scope reached unused-and-closed on last disassociate");
                        Vec::new()
                    }
                    ScopePhase::Joining => {
                        state.phase = ScopePhase::Joined;
                        debug!("scope joined");
                        std::mem::take(&mut state.join_waiters)
                    }
                    _ => Vec::new(),
                }
            }
        };
        // Fire outside the lock: waiters complete arbitrary receivers.
        for waiter in waiters {
            waiter();
        }
    }

    /// Refuses future associations. A scope with live associations moves to
    /// `closed` and reaches `unused-and-closed` on the last disassociate.
    pub(crate) fn close(&self) {
        let mut state = self.state.lock().expect("scope state lock poisoned");
        match state.phase {
            ScopePhase::Unused => {
                state.phase = ScopePhase::UnusedAndClosed;
                debug!("unused scope closed");
            }
            ScopePhase::Open => {
                state.phase = if state.count == 0 {
                    ScopePhase::UnusedAndClosed
                } else {
                    ScopePhase::Closed
                };
                debug!(phase = ?state.phase, count = state.count, "open scope closed");
            }
            _ => {}
        }
    }

    /// Begins (or immediately completes) a join. `on_joined` runs once the
    /// association count reaches zero, synchronously if it already has.
    pub(crate) fn start_join(&self, on_joined: JoinWaiter) {
        let ready = {
            let mut state = self.state.lock().expect("scope state lock poisoned");
            if state.count == 0 {
                state.phase = ScopePhase::Joined;
                debug!("scope joined immediately");
                true
            } else {
                state.phase = ScopePhase::Joining;
                trace!(count = state.count, "join parked until quiescence");
                state.join_waiters.push(on_joined);
                return;
            }
        };
        debug_assert!(ready);
        on_joined();
    }

    /// Whether a scope handle may be dropped in the current phase.
    pub(crate) fn droppable(&self) -> bool {
        let state = self.state.lock().expect("scope state lock poisoned");
        matches!(
            state.phase,
            ScopePhase::Unused | ScopePhase::UnusedAndClosed | ScopePhase::Joined
        )
    }

    #[cfg(test)]
    pub(crate) fn phase(&self) -> ScopePhase {
        self.state.lock().expect("scope state lock poisoned").phase
    }

    #[cfg(test)]
    pub(crate) fn count(&self) -> u64 {
        self.state.lock().expect("scope state lock poisoned").count
    }
}

impl std::fmt::Debug for ScopeCore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.state.lock().expect("scope state lock poisoned");
        f.debug_struct("ScopeCore")
            .field("phase", &state.phase)
            .field("count", &state.count)
            .finish()
    }
}
