//! Message pipe endpoints.
//!
//! Built around a two-directional `VecDeque<Message>` pair sharing one
//! lock, since a message pipe's two endpoints each both send and
//! receive, and a message carries transferable handles that
//! `channel.rs`'s plain `T: Send` payload has no concept of.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use crate::error::{MojoError, MojoResult};
use crate::rights::Rights;
use crate::signals::{Signals, SignalsState};
use crate::waiter::{check_then_register, WaiterEntry, WaiterRegistry};

use super::{next_dispatcher_id, Dispatcher};

/// A handle being carried inside a message, already detached from the
/// sender's handle table. `ReadMessage` reinstalls it under a fresh id
/// with the same rights.
#[derive(Debug)]
pub struct TransferredHandle {
    pub dispatcher: Dispatcher,
    pub rights: Rights,
}

/// One queued message: bytes plus any handles attached at send time.
#[derive(Debug)]
pub struct Message {
    pub bytes: Vec<u8>,
    pub handles: Vec<TransferredHandle>,
}

/// Why `read_message` couldn't hand back a message.
pub enum ReadMessageError {
    /// No message queued.
    Empty { peer_open: bool },
    /// The front message exceeds the caller's buffer capacities.
    TooSmall {
        required_bytes: usize,
        required_handles: usize,
        discarded: bool,
    },
}

#[derive(Debug)]
struct Shared {
    /// `queues[i]` holds messages waiting to be read by side `i`.
    queues: [VecDeque<Message>; 2],
    /// `peer_open[i]` is true while side `i` still has an open handle.
    peer_open: [bool; 2],
    waiters: [WaiterRegistry; 2],
}

impl Shared {
    fn state_for(&self, side: usize) -> SignalsState {
        let other = 1 - side;
        let readable = !self.queues[side].is_empty();
        let peer_alive = self.peer_open[other];

        let mut satisfied = Signals::NONE;
        let mut satisfiable = Signals::PEER_CLOSED;
        if readable {
            satisfied |= Signals::READABLE;
        }
        if readable || peer_alive {
            satisfiable |= Signals::READABLE;
        }
        if peer_alive {
            satisfied |= Signals::WRITABLE;
            satisfiable |= Signals::WRITABLE;
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

/// One side of a connected message pipe.
#[derive(Debug, Clone)]
pub struct MessagePipeEndpoint {
    shared: Arc<Mutex<Shared>>,
    side: usize,
    dispatcher_id: u64,
}

/// Creates a connected pair, `(h0, h1)` in spec terms.
pub fn create_pair() -> (MessagePipeEndpoint, MessagePipeEndpoint) {
    let shared = Arc::new(Mutex::new(Shared {
        queues: [VecDeque::new(), VecDeque::new()],
        peer_open: [true, true],
        waiters: [WaiterRegistry::new(), WaiterRegistry::new()],
    }));
    (
        MessagePipeEndpoint {
            shared: shared.clone(),
            side: 0,
            dispatcher_id: next_dispatcher_id(),
        },
        MessagePipeEndpoint {
            shared,
            side: 1,
            dispatcher_id: next_dispatcher_id(),
        },
    )
}

impl MessagePipeEndpoint {
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

    /// Called when the last handle to this side closes: marks this side
    /// gone and propagates `PEER_CLOSED` to the other side.
    pub(crate) fn on_closed(&self) {
        let mut shared = self.shared.lock().unwrap();
        shared.peer_open[self.side] = false;
        let other = 1 - self.side;
        shared.recompute_and_notify(other);
    }

    /// `WriteMessage`. Requires the caller to have already
    /// checked the `WRITE` right and detached `handles` from its own
    /// handle table (transfer validation happens in `core.rs`, where the
    /// handle table lives).
    pub fn write_message(&self, bytes: Vec<u8>, handles: Vec<TransferredHandle>) -> MojoResult<()> {
        let mut shared = self.shared.lock().unwrap();
        let other = 1 - self.side;
        if !shared.peer_open[other] {
            return Err(MojoError::FailedPrecondition);
        }
        shared.queues[other].push_back(Message { bytes, handles });
        shared.recompute_and_notify(other);
        Ok(())
    }

    /// `ReadMessage`, performed atomically under the shared
    /// lock so the "peek size, maybe discard, maybe copy" sequence never
    /// races a concurrent reader on a duplicate of this same handle.
    pub fn read_message(
        &self,
        byte_cap: usize,
        handle_cap: usize,
        may_discard: bool,
    ) -> Result<Message, ReadMessageError> {
        let mut shared = self.shared.lock().unwrap();
        let other = 1 - self.side;
        let Some(front) = shared.queues[self.side].front() else {
            return Err(ReadMessageError::Empty {
                peer_open: shared.peer_open[other],
            });
        };
        let (required_bytes, required_handles) = (front.bytes.len(), front.handles.len());
        if required_bytes > byte_cap || required_handles > handle_cap {
            if may_discard {
                shared.queues[self.side].pop_front();
                shared.recompute_and_notify(self.side);
            }
            return Err(ReadMessageError::TooSmall {
                required_bytes,
                required_handles,
                discarded: may_discard,
            });
        }
        let message = shared.queues[self.side].pop_front().expect("front checked above");
        shared.recompute_and_notify(self.side);
        Ok(message)
    }

    /// Non-consuming peek of the next message's sizes, used by
    /// `ReadMessage(..., 0, nil, 0, NONE)` "peek size" calls.
    pub fn peek_sizes(&self) -> Option<(usize, usize)> {
        let shared = self.shared.lock().unwrap();
        shared.queues[self.side]
            .front()
            .map(|m| (m.bytes.len(), m.handles.len()))
    }
}
