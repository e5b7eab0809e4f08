//! A long-lived set of `(handle, signals, cookie)` entries with its own
//! blocking wait.
//!
//! Each entry registers a *persistent* [`WaiterEntry`] on its target
//! dispatcher — `persistent: true` means [`crate::waiter::WaiterRegistry`]
//! never drops it after one firing, matching "a wait set entry behaves
//! like a long-lived waiter ... its ready condition triggers
//! independently of a caller being blocked". The sink each entry
//! carries ([`EntrySink`]) is the always-overwrite counterpart to
//! `Wait`/`WaitMany`'s one-shot [`crate::waiter::WaitOutcome`], sharing
//! one [`Condvar`] across all entries so [`WaitSet::wait`] wakes as
//! soon as any of them fires.

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Condvar, Mutex};

use crate::clock::{Clock, TimeTicks, INDEFINITE};
use crate::error::MojoError;
use crate::signals::{Signals, SignalsState};
use crate::waiter::{WaitCode, WaitSink, WaiterEntry};

use super::{next_dispatcher_id, Dispatcher};

#[derive(Debug)]
struct Entry {
    dispatcher: Dispatcher,
    /// `None` once the dispatcher has already resolved this entry
    /// permanently (it was never registered, or the registration was
    /// already consumed by a cancellation).
    waiter_id: Option<u64>,
    last_result: Option<(WaitCode, SignalsState)>,
    queued: bool,
}

#[derive(Debug)]
struct Shared {
    entries: HashMap<u64, Entry>,
    ready: VecDeque<u64>,
}

struct EntrySink {
    cookie: u64,
    shared: Arc<Mutex<Shared>>,
    cvar: Arc<Condvar>,
}

impl WaitSink for EntrySink {
    fn notify(&self, _index: usize, code: WaitCode, state: SignalsState) {
        let mut shared = self.shared.lock().unwrap();
        if let Some(entry) = shared.entries.get_mut(&self.cookie) {
            entry.last_result = Some((code, state));
            if code == WaitCode::Cancelled {
                entry.waiter_id = None;
            }
            if !entry.queued {
                entry.queued = true;
                shared.ready.push_back(self.cookie);
            }
        }
        self.cvar.notify_all();
    }
}

/// One delivered result from [`WaitSet::wait`].
pub struct WaitSetResult {
    pub cookie: u64,
    pub code: WaitCode,
    pub state: SignalsState,
}

/// A `CreateWaitSet` handle.
#[derive(Debug, Clone)]
pub struct WaitSet {
    shared: Arc<Mutex<Shared>>,
    cvar: Arc<Condvar>,
    dispatcher_id: u64,
}

impl WaitSet {
    pub fn new() -> WaitSet {
        WaitSet {
            shared: Arc::new(Mutex::new(Shared {
                entries: HashMap::new(),
                ready: VecDeque::new(),
            })),
            cvar: Arc::new(Condvar::new()),
            dispatcher_id: next_dispatcher_id(),
        }
    }

    pub(crate) fn dispatcher_id(&self) -> u64 {
        self.dispatcher_id
    }

    /// A wait set's own handle carries no signals of its own; waiting on
    /// it via the generic `Wait` rather than `WaitSetWait` always reports
    /// `FAILED_PRECONDITION` immediately, same as [`super::shared_buffer`].
    pub(crate) fn signals_state(&self) -> SignalsState {
        SignalsState::default()
    }

    pub(crate) fn register_waiter(&self, entry: WaiterEntry) -> Option<u64> {
        entry.outcome.notify(entry.index, WaitCode::FailedPrecondition, SignalsState::default());
        None
    }

    pub(crate) fn cancel_waiter(&self, _id: u64) {}

    /// Releases every entry's registration when the wait set handle
    /// itself closes, so member dispatchers don't keep a dead sink
    /// registered forever.
    ///
    /// Drains the entry map before calling into any dispatcher:
    /// `cancel_waiter` can synchronously call back into `EntrySink::notify`,
    /// which re-locks `self.shared`, so no dispatcher call may happen
    /// while that lock is held.
    pub(crate) fn on_closed(&self) {
        let drained: Vec<Entry> = {
            let mut shared = self.shared.lock().unwrap();
            shared.ready.clear();
            std::mem::take(&mut shared.entries).into_values().collect()
        };
        for entry in drained {
            if let Some(id) = entry.waiter_id {
                entry.dispatcher.cancel_waiter(id);
            }
        }
    }

    /// `WaitSetAdd`: duplicate cookie → `AlreadyExists`.
    ///
    /// Inserts a placeholder entry before calling `register_waiter`, and
    /// releases `self.shared`'s lock while doing so: a dispatcher whose
    /// state already satisfies (or can never satisfy) `signals` resolves
    /// `EntrySink::notify` synchronously, and that notify needs to
    /// re-lock `self.shared` to record the result.
    pub fn add(&self, dispatcher: Dispatcher, signals: Signals, cookie: u64) -> Result<(), MojoError> {
        {
            let mut shared = self.shared.lock().unwrap();
            if shared.entries.contains_key(&cookie) {
                return Err(MojoError::AlreadyExists);
            }
            shared.entries.insert(
                cookie,
                Entry {
                    dispatcher: dispatcher.clone(),
                    waiter_id: None,
                    last_result: None,
                    queued: false,
                },
            );
        }

        let sink: Arc<dyn WaitSink> = Arc::new(EntrySink {
            cookie,
            shared: self.shared.clone(),
            cvar: self.cvar.clone(),
        });
        let waiter_entry = WaiterEntry {
            requested: signals,
            outcome: sink,
            index: 0,
            persistent: true,
        };
        let waiter_id = dispatcher.register_waiter(waiter_entry);

        let mut shared = self.shared.lock().unwrap();
        if let Some(entry) = shared.entries.get_mut(&cookie) {
            entry.waiter_id = waiter_id;
        }
        Ok(())
    }

    /// `WaitSetRemove`: `NotFound` if `cookie` is absent. Removes the
    /// entry from the map before calling `cancel_waiter`, for the same
    /// re-entrancy reason as [`WaitSet::on_closed`].
    pub fn remove(&self, cookie: u64) -> Result<(), MojoError> {
        let entry = {
            let mut shared = self.shared.lock().unwrap();
            let entry = shared.entries.remove(&cookie).ok_or(MojoError::NotFound)?;
            shared.ready.retain(|c| *c != cookie);
            entry
        };
        if let Some(id) = entry.waiter_id {
            entry.dispatcher.cancel_waiter(id);
        }
        Ok(())
    }

    /// `WaitSetWait`: blocks until at least one entry is
    /// ready or `deadline` passes, then drains up to `capacity` ready
    /// results. Returns the drained results and the total ready count
    /// observed at drain time (the caller's `*max_results` out-param).
    pub fn wait(&self, clock: &dyn Clock, deadline: TimeTicks, capacity: usize) -> (Vec<WaitSetResult>, usize) {
        let mut shared = self.shared.lock().unwrap();
        loop {
            if !shared.ready.is_empty() {
                break;
            }
            if deadline == INDEFINITE {
                shared = self.cvar.wait(shared).unwrap();
                continue;
            }
            let now = clock.now();
            if now >= deadline {
                return (Vec::new(), 0);
            }
            let remaining = std::time::Duration::from_micros(deadline - now);
            let (next, timeout) = self.cvar.wait_timeout(shared, remaining).unwrap();
            shared = next;
            if timeout.timed_out() && shared.ready.is_empty() && clock.now() >= deadline {
                return (Vec::new(), 0);
            }
        }

        let total_ready = shared.ready.len();
        let mut results = Vec::with_capacity(std::cmp::min(capacity, total_ready));
        for _ in 0..std::cmp::min(capacity, total_ready) {
            let cookie = shared.ready.pop_front().expect("checked non-empty above");
            let (code, state) = shared
                .entries
                .get_mut(&cookie)
                .map(|entry| {
                    entry.queued = false;
                    entry.last_result.expect("queued entries always have a result")
                })
                .expect("cookie in ready queue always has an entry");
            if code == WaitCode::Cancelled {
                shared.entries.remove(&cookie);
            }
            results.push(WaitSetResult { cookie, code, state });
        }
        (results, total_ready)
    }
}

impl Default for WaitSet {
    fn default() -> WaitSet {
        WaitSet::new()
    }
}
