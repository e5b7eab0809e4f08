//! Two peer-connected, user-signalable halves.
//!
//! Shares the same "one `Arc<Mutex<Shared>>` for both sides" shape as
//! [`super::message_pipe`] and [`super::data_pipe`], carrying
//! `PEER_CLOSED` but never `READABLE`/`WRITABLE`. Resolved Open
//! Question: closing one half clears `SIGNAL0..4` from the
//! *other* half's `satisfiable` set but leaves its already-set
//! `satisfied` bits untouched, so a caller that observed a signal
//! before the peer closed keeps observing it.

use std::sync::{Arc, Mutex};

use crate::signals::{Signals, SignalsState};
use crate::waiter::{check_then_register, WaiterEntry, WaiterRegistry};

use super::next_dispatcher_id;

#[derive(Debug)]
struct Shared {
    satisfied: [Signals; 2],
    peer_open: [bool; 2],
    waiters: [WaiterRegistry; 2],
}

impl Shared {
    /// Resolved Open Question: the crate-wide invariant that
    /// `satisfied` is always a subset of `satisfiable` ([`SignalsState::new`])
    /// takes priority over a literal reading of "satisfiable loses the
    /// signal bits but satisfied keeps them". A bit that is already
    /// satisfied stays satisfiable forever, so it remains observable;
    /// peer close only stops *new* `SIGNAL0..4` bits from becoming
    /// satisfiable in the future.
    fn state_for(&self, side: usize) -> SignalsState {
        let other = 1 - side;
        let own_satisfied = self.satisfied[side];
        let mut satisfiable = Signals::PEER_CLOSED | own_satisfied;
        let mut satisfied = own_satisfied;
        if self.peer_open[other] {
            satisfiable |= Signals::USER_SIGNALS;
        } else {
            satisfied |= Signals::PEER_CLOSED;
        }
        SignalsState::new(satisfied, satisfiable)
    }

    fn recompute_and_notify(&mut self, side: usize) {
        let state = self.state_for(side);
        self.waiters[side].notify_transition(state);
    }
}

/// One half of a connected event pair.
#[derive(Debug, Clone)]
pub struct EventPairHalf {
    shared: Arc<Mutex<Shared>>,
    side: usize,
    dispatcher_id: u64,
}

/// `CreateEventPair`.
pub fn create_pair() -> (EventPairHalf, EventPairHalf) {
    let shared = Arc::new(Mutex::new(Shared {
        satisfied: [Signals::NONE, Signals::NONE],
        peer_open: [true, true],
        waiters: [WaiterRegistry::new(), WaiterRegistry::new()],
    }));
    (
        EventPairHalf {
            shared: shared.clone(),
            side: 0,
            dispatcher_id: next_dispatcher_id(),
        },
        EventPairHalf {
            shared,
            side: 1,
            dispatcher_id: next_dispatcher_id(),
        },
    )
}

impl EventPairHalf {
    pub(crate) fn dispatcher_id(&self) -> u64 {
        self.dispatcher_id
    }

    pub(crate) fn signals_state(&self) -> SignalsState {
        let shared = self.shared.lock().unwrap();
        shared.state_for(self.side)
    }

    pub(crate) fn register_waiter(&self, entry: WaiterEntry) -> Option<u64> {
        let mut shared = self.shared.lock().unwrap();
        let state = shared.state_for(self.side);
        check_then_register(state, entry, &mut shared.waiters[self.side])
    }

    pub(crate) fn cancel_waiter(&self, id: u64) {
        let mut shared = self.shared.lock().unwrap();
        let state = shared.state_for(self.side);
        shared.waiters[self.side].cancel(id, state);
    }

    pub(crate) fn on_closed(&self) {
        let mut shared = self.shared.lock().unwrap();
        shared.peer_open[self.side] = false;
        let other = 1 - self.side;
        shared.recompute_and_notify(other);
    }

    /// `MojoSignal`: clears `clear`, then sets `set`, on this
    /// half only. Both must be subsets of [`Signals::USER_SIGNALS`];
    /// the caller validates that.
    pub fn signal(&self, clear: Signals, set: Signals) {
        let mut shared = self.shared.lock().unwrap();
        shared.satisfied[self.side] = shared.satisfied[self.side].minus(clear) | set;
        shared.recompute_and_notify(self.side);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fresh_pair_has_no_signals_and_no_peer_closed() {
        let (h0, h1) = create_pair();
        let s0 = h0.signals_state();
        assert!(s0.satisfied().is_empty());
        assert!(s0.satisfiable().contains(Signals::USER_SIGNALS));
        assert!(!s0.satisfied().contains(Signals::PEER_CLOSED));
        let _ = &h1;
    }

    #[test]
    fn signal_is_visible_on_own_side_only() {
        let (h0, h1) = create_pair();
        h0.signal(Signals::NONE, Signals::SIGNAL0);
        assert!(h0.signals_state().satisfied().contains(Signals::SIGNAL0));
        assert!(!h1.signals_state().satisfied().contains(Signals::SIGNAL0));
    }

    #[test]
    fn closing_one_half_clears_peer_satisfiable_but_keeps_satisfied_bits() {
        let (h0, h1) = create_pair();
        h1.signal(Signals::NONE, Signals::SIGNAL0 | Signals::SIGNAL1);
        h0.on_closed();

        let s1 = h1.signals_state();
        assert!(s1.satisfied().contains(Signals::PEER_CLOSED));
        // SIGNAL2..4 were never set and can no longer become satisfiable.
        assert!(!s1.satisfiable().intersects(Signals::SIGNAL2 | Signals::SIGNAL3 | Signals::SIGNAL4));
        // Already-set bits remain both satisfied and satisfiable.
        assert!(s1.satisfied().contains(Signals::SIGNAL0 | Signals::SIGNAL1));
        assert!(s1.satisfiable().contains(Signals::SIGNAL0 | Signals::SIGNAL1));
    }
}
