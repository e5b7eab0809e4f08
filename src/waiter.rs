//! The generic waiter/wakeup machinery behind `Wait`, `WaitMany` and
//! [`crate::dispatcher::wait_set::WaitSet`].
//!
//! Built around a shared, reference-counted inner cell that toggles
//! readiness under a lock, so a mutation on one thread can notify
//! whoever ends up blocked on another, independent of ordering. There is
//! no real file descriptor to signal here: wakeups go through a plain
//! [`Condvar`], since everything lives in one address space.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Condvar, Mutex};

use crate::clock::{Clock, TimeTicks, INDEFINITE};
use crate::error::MojoError;
use crate::signals::{Signals, SignalsState};

/// What a waiter registration notifies when its dispatcher transitions.
///
/// [`WaitOutcome`] is the one-shot "first writer wins" sink used by
/// `Wait`/`WaitMany`. [`crate::dispatcher::wait_set::WaitSet`] entries use
/// a different sink (see `wait_set.rs`) that overwrites its stored result
/// on every transition instead of resolving once, since a wait-set entry
/// stays armed for the life of the entry, not just one blocking call.
pub(crate) trait WaitSink: Send + Sync {
    fn notify(&self, index: usize, code: WaitCode, state: SignalsState);
}

/// The outcome of a single logical wait: one slot that at most one
/// registration may fill ("first writer wins" — no ordering is guaranteed
/// between unrelated dispatchers that resolve at the same time).
pub(crate) struct WaitOutcome {
    state: Mutex<Option<WaitSlotResult>>,
    cvar: Condvar,
}

/// What a resolved wait slot carries: which of possibly-many handles
/// fired, with what result code, and that handle's signal state at the
/// moment of the transition.
#[derive(Clone, Copy)]
pub(crate) struct WaitSlotResult {
    pub index: usize,
    pub code: WaitCode,
    pub state: SignalsState,
}

/// The three outcomes a wait registration can resolve to: satisfied, permanently unsatisfiable, or cancelled by close.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub(crate) enum WaitCode {
    Ok,
    FailedPrecondition,
    Cancelled,
}

impl WaitCode {
    pub fn into_error(self) -> Option<MojoError> {
        match self {
            WaitCode::Ok => None,
            WaitCode::FailedPrecondition => Some(MojoError::FailedPrecondition),
            WaitCode::Cancelled => Some(MojoError::Cancelled),
        }
    }
}

impl WaitOutcome {
    pub fn new() -> Arc<WaitOutcome> {
        Arc::new(WaitOutcome {
            state: Mutex::new(None),
            cvar: Condvar::new(),
        })
    }

    /// Attempts to resolve this outcome. Returns `true` if this call
    /// claimed it (first writer wins); `false` means some other
    /// registration already resolved it first and the caller should treat
    /// itself as superseded, not re-deliver a second result.
    pub fn try_resolve(&self, index: usize, code: WaitCode, state: SignalsState) -> bool {
        let mut guard = self.state.lock().unwrap();
        if guard.is_some() {
            return false;
        }
        *guard = Some(WaitSlotResult { index, code, state });
        self.cvar.notify_all();
        true
    }

    pub fn is_resolved(&self) -> bool {
        self.state.lock().unwrap().is_some()
    }

    /// Blocks the calling thread until resolved or `deadline` (absolute
    /// [`TimeTicks`]) passes, polling `clock` for elapsed time. Returns
    /// `None` on timeout.
    pub fn block_until(&self, clock: &dyn Clock, deadline: TimeTicks) -> Option<WaitSlotResult> {
        let mut guard = self.state.lock().unwrap();
        loop {
            if let Some(result) = *guard {
                return Some(result);
            }
            if deadline == INDEFINITE {
                guard = self.cvar.wait(guard).unwrap();
                continue;
            }
            let now = clock.now();
            if now >= deadline {
                return None;
            }
            let remaining = std::time::Duration::from_micros(deadline - now);
            let (next_guard, timeout) = self.cvar.wait_timeout(guard, remaining).unwrap();
            guard = next_guard;
            if timeout.timed_out() && guard.is_none() {
                // Spurious wakeups are possible; only give up once the
                // clock itself says the deadline has passed.
                if clock.now() >= deadline {
                    return None;
                }
            }
        }
    }
}

impl WaitSink for WaitOutcome {
    fn notify(&self, index: usize, code: WaitCode, state: SignalsState) {
        self.try_resolve(index, code, state);
    }
}

/// A single entry in a dispatcher's waiter list: what signals it wants,
/// which sink to notify, and which logical index (into a `WaitMany` call,
/// or `0` for a plain `Wait`) it represents.
pub(crate) struct WaiterEntry {
    pub requested: Signals,
    pub outcome: Arc<dyn WaitSink>,
    pub index: usize,
    /// `true` for wait-set entries, which stay registered after firing so
    /// they can fire again on a later edge; `false` for one-shot `Wait`/`WaitMany` registrations.
    pub persistent: bool,
}

impl std::fmt::Debug for WaiterEntry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WaiterEntry")
            .field("requested", &self.requested)
            .field("index", &self.index)
            .field("persistent", &self.persistent)
            .finish_non_exhaustive()
    }
}

/// Evaluates one waiter against a freshly-transitioned signal state and
/// resolves it if appropriate.
///
/// Returns `true` if the entry should be removed from the owning
/// dispatcher's waiter list (always true for one-shot waiters once they
/// fire or are superseded; for persistent wait-set entries, only once
/// cancelled).
pub(crate) fn evaluate_and_maybe_resolve(entry: &WaiterEntry, new_state: SignalsState) -> bool {
    let code = if new_state.satisfied().intersects(entry.requested) {
        WaitCode::Ok
    } else if !new_state.satisfiable().intersects(entry.requested) {
        WaitCode::FailedPrecondition
    } else {
        return false;
    };
    entry.outcome.notify(entry.index, code, new_state);
    !entry.persistent
}

/// Performs the initial, non-blocking three-way test behind `Wait`:
/// immediately `Ok`, immediately `FailedPrecondition`, or "must register
/// and block".
pub(crate) fn initial_check(state: SignalsState, requested: Signals) -> Option<WaitCode> {
    if state.satisfied().intersects(requested) {
        Some(WaitCode::Ok)
    } else if !state.satisfiable().intersects(requested) {
        Some(WaitCode::FailedPrecondition)
    } else {
        None
    }
}

/// The waiter list every dispatcher variant embeds in its locked inner
/// state: registration, per-transition evaluation, and handle-scoped
/// cancellation all go through here so each `dispatcher/*.rs` only has to
/// call `notify_transition` after recomputing its own signal state.
///
/// One small piece of bookkeeping embedded in every endpoint's shared
/// state, mutated under the same lock as the state it reacts to.
#[derive(Debug, Default)]
pub(crate) struct WaiterRegistry {
    next_id: AtomicU64,
    entries: Vec<(u64, WaiterEntry)>,
}

impl WaiterRegistry {
    pub fn new() -> WaiterRegistry {
        WaiterRegistry {
            next_id: AtomicU64::new(1),
            entries: Vec::new(),
        }
    }

    /// Registers `entry` and returns an id the caller can later pass to
    /// [`WaiterRegistry::cancel`] (typically stashed in a handle table's
    /// cancel registry while the caller is blocked).
    pub fn register(&mut self, entry: WaiterEntry) -> u64 {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.entries.push((id, entry));
        id
    }

    /// Cancels a still-pending registration by id, resolving its outcome
    /// with [`WaitCode::Cancelled`] using `state` as the snapshot at
    /// cancellation time. Returns `false` if the id was already removed
    /// (fired naturally or cancelled already).
    pub fn cancel(&mut self, id: u64, state: SignalsState) -> bool {
        if let Some(pos) = self.entries.iter().position(|(eid, _)| *eid == id) {
            let (_, entry) = self.entries.remove(pos);
            entry.outcome.notify(entry.index, WaitCode::Cancelled, state);
            true
        } else {
            false
        }
    }

    /// Evaluates every registered waiter against a freshly computed
    /// signal state, in FIFO
    /// registration order, removing any that resolved and are not
    /// persistent.
    pub fn notify_transition(&mut self, new_state: SignalsState) {
        self.entries
            .retain(|(_, entry)| !evaluate_and_maybe_resolve(entry, new_state));
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// The atomic "check, else register" step every dispatcher's
/// `register_waiter` performs under its own lock: if the
/// three-way test on `state` already has an answer, `entry.outcome` is
/// notified directly and nothing is registered; otherwise `entry` is
/// pushed onto `registry` and its id returned.
pub(crate) fn check_then_register(
    state: SignalsState,
    entry: WaiterEntry,
    registry: &mut WaiterRegistry,
) -> Option<u64> {
    match initial_check(state, entry.requested) {
        Some(code) => {
            entry.outcome.notify(entry.index, code, state);
            None
        }
        None => Some(registry.register(entry)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::FakeClock;

    #[test]
    fn first_writer_wins() {
        let outcome = WaitOutcome::new();
        let state = SignalsState::new(Signals::READABLE, Signals::READABLE);
        assert!(outcome.try_resolve(0, WaitCode::Ok, state));
        assert!(!outcome.try_resolve(1, WaitCode::Cancelled, state));
    }

    #[test]
    fn initial_check_ok_and_failed_precondition() {
        let readable_state = SignalsState::new(Signals::READABLE, Signals::READABLE);
        assert_eq!(
            initial_check(readable_state, Signals::READABLE),
            Some(WaitCode::Ok)
        );

        let dead_state = SignalsState::new(Signals::NONE, Signals::NONE);
        assert_eq!(
            initial_check(dead_state, Signals::READABLE),
            Some(WaitCode::FailedPrecondition)
        );

        let pending_state = SignalsState::new(Signals::NONE, Signals::READABLE);
        assert_eq!(initial_check(pending_state, Signals::READABLE), None);
    }

    #[test]
    fn block_until_times_out_on_fake_clock() {
        let outcome = WaitOutcome::new();
        let clock = FakeClock::new();
        clock.set(100);
        // Deadline already in the past: times out immediately.
        assert!(outcome.block_until(&clock, 50).is_none());
    }

    #[test]
    fn evaluate_removes_one_shot_but_keeps_persistent() {
        let outcome = WaitOutcome::new();
        let one_shot = WaiterEntry {
            requested: Signals::READABLE,
            outcome: outcome.clone(),
            index: 0,
            persistent: false,
        };
        let new_state = SignalsState::new(Signals::READABLE, Signals::READABLE);
        assert!(evaluate_and_maybe_resolve(&one_shot, new_state));

        let outcome2 = WaitOutcome::new();
        let persistent = WaiterEntry {
            requested: Signals::READABLE,
            outcome: outcome2,
            index: 0,
            persistent: true,
        };
        assert!(!evaluate_and_maybe_resolve(&persistent, new_state));
    }

    #[test]
    fn registry_cancel_resolves_outcome() {
        let mut registry = WaiterRegistry::new();
        let outcome = WaitOutcome::new();
        let id = registry.register(WaiterEntry {
            requested: Signals::READABLE,
            outcome: outcome.clone(),
            index: 0,
            persistent: false,
        });
        let state = SignalsState::new(Signals::NONE, Signals::NONE);
        assert!(registry.cancel(id, state));
        assert!(outcome.is_resolved());
        // Cancelling twice is a no-op the second time.
        assert!(!registry.cancel(id, state));
    }

    #[test]
    fn registry_notify_transition_fires_and_removes() {
        let mut registry = WaiterRegistry::new();
        let outcome = WaitOutcome::new();
        registry.register(WaiterEntry {
            requested: Signals::READABLE,
            outcome: outcome.clone(),
            index: 0,
            persistent: false,
        });
        let new_state = SignalsState::new(Signals::READABLE, Signals::READABLE);
        registry.notify_transition(new_state);
        assert!(outcome.is_resolved());
        assert!(registry.is_empty());
    }
}
