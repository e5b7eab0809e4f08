//! A standalone user-signalable event.
//!
//! Generalizes a fixed `readable|writable|error` triple into the five
//! free-form `SIGNAL0..4` bits a caller toggles directly through
//! `MojoEventSignal`/`MojoSignal`.

use std::sync::{Arc, Mutex};

use crate::signals::{Signals, SignalsState};
use crate::waiter::{check_then_register, WaiterEntry, WaiterRegistry};

use super::next_dispatcher_id;

#[derive(Debug)]
struct Shared {
    satisfied: Signals,
    waiters: WaiterRegistry,
}

/// An `Event` dispatcher. Unlike pipes, an event has no
/// peer and no signal a transition can ever make permanently
/// unsatisfiable: `satisfiable` is always [`Signals::USER_SIGNALS`].
#[derive(Debug, Clone)]
pub struct Event {
    shared: Arc<Mutex<Shared>>,
    dispatcher_id: u64,
}

impl Event {
    /// `CreateSharedBuffer`'s sibling for events: starts with no bits set.
    pub fn new() -> Event {
        Event {
            shared: Arc::new(Mutex::new(Shared {
                satisfied: Signals::NONE,
                waiters: WaiterRegistry::new(),
            })),
            dispatcher_id: next_dispatcher_id(),
        }
    }

    pub(crate) fn dispatcher_id(&self) -> u64 {
        self.dispatcher_id
    }

    pub(crate) fn signals_state(&self) -> SignalsState {
        let shared = self.shared.lock().unwrap();
        SignalsState::new(shared.satisfied, Signals::USER_SIGNALS)
    }

    pub(crate) fn register_waiter(&self, entry: WaiterEntry) -> Option<u64> {
        let mut shared = self.shared.lock().unwrap();
        let state = SignalsState::new(shared.satisfied, Signals::USER_SIGNALS);
        check_then_register(state, entry, &mut shared.waiters)
    }

    pub(crate) fn cancel_waiter(&self, id: u64) {
        let mut shared = self.shared.lock().unwrap();
        let state = SignalsState::new(shared.satisfied, Signals::USER_SIGNALS);
        shared.waiters.cancel(id, state);
    }

    /// `MojoEventSignal`/`MojoSignal`: clears `clear`, then
    /// sets `set`. Both must already be subsets of
    /// [`Signals::USER_SIGNALS`]; the caller validates that.
    pub fn signal(&self, clear: Signals, set: Signals) {
        let mut shared = self.shared.lock().unwrap();
        shared.satisfied = shared.satisfied.minus(clear) | set;
        let state = SignalsState::new(shared.satisfied, Signals::USER_SIGNALS);
        shared.waiters.notify_transition(state);
    }
}

impl Default for Event {
    fn default() -> Event {
        Event::new()
    }
}
