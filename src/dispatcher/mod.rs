//! The kernel object behind a handle.
//!
//! Modelled as a tagged-variant enum rather than a trait object: a
//! polymorphic object would work too, but an enum keeps handle-table
//! lookup a plain match with no vtable indirection, and every variant is
//! a small `Arc<Mutex<...>>` handle anyway.

pub mod data_pipe;
pub mod event;
pub mod event_pair;
pub mod message_pipe;
pub mod shared_buffer;
pub mod wait_set;

use std::sync::atomic::{AtomicU64, Ordering};

use crate::signals::SignalsState;
use crate::waiter::WaiterEntry;

use data_pipe::{DataPipeConsumer, DataPipeProducer};
use event::Event;
use event_pair::EventPairHalf;
use message_pipe::MessagePipeEndpoint;
use shared_buffer::SharedBuffer;
use wait_set::WaitSet;

/// A process-wide counter handing out the id used to order dispatcher
/// locks when more than one is ever held at once. The
/// dispatchers in this crate never hold two such locks simultaneously —
/// every multi-handle operation (`WaitMany`, message transfer) locks and
/// releases one dispatcher at a time — but the id is kept so a future
/// operation that does need joint locking has an unambiguous order to
/// follow, and so two dispatchers are never mistaken for the same object.
static NEXT_DISPATCHER_ID: AtomicU64 = AtomicU64::new(1);

pub(crate) fn next_dispatcher_id() -> u64 {
    NEXT_DISPATCHER_ID.fetch_add(1, Ordering::Relaxed)
}

/// The sum type of every kernel object a handle can name.
#[derive(Debug, Clone)]
pub enum Dispatcher {
    MessagePipeEndpoint(MessagePipeEndpoint),
    DataPipeProducer(DataPipeProducer),
    DataPipeConsumer(DataPipeConsumer),
    SharedBuffer(SharedBuffer),
    Event(Event),
    EventPairHalf(EventPairHalf),
    WaitSet(WaitSet),
}

impl Dispatcher {
    pub(crate) fn dispatcher_id(&self) -> u64 {
        match self {
            Dispatcher::MessagePipeEndpoint(d) => d.dispatcher_id(),
            Dispatcher::DataPipeProducer(d) => d.dispatcher_id(),
            Dispatcher::DataPipeConsumer(d) => d.dispatcher_id(),
            Dispatcher::SharedBuffer(d) => d.dispatcher_id(),
            Dispatcher::Event(d) => d.dispatcher_id(),
            Dispatcher::EventPairHalf(d) => d.dispatcher_id(),
            Dispatcher::WaitSet(d) => d.dispatcher_id(),
        }
    }

    pub(crate) fn signals_state(&self) -> SignalsState {
        match self {
            Dispatcher::MessagePipeEndpoint(d) => d.signals_state(),
            Dispatcher::DataPipeProducer(d) => d.signals_state(),
            Dispatcher::DataPipeConsumer(d) => d.signals_state(),
            Dispatcher::SharedBuffer(d) => d.signals_state(),
            Dispatcher::Event(d) => d.signals_state(),
            Dispatcher::EventPairHalf(d) => d.signals_state(),
            Dispatcher::WaitSet(d) => d.signals_state(),
        }
    }

    /// Atomically checks `entry.requested` against the current state and,
    /// if still ambiguous, registers `entry`. Returns `None` if the three-way
    /// test already resolved `entry.outcome` — nothing was registered, so
    /// there is nothing to later cancel. Returns `Some(id)` if registered.
    pub(crate) fn register_waiter(&self, entry: WaiterEntry) -> Option<u64> {
        match self {
            Dispatcher::MessagePipeEndpoint(d) => d.register_waiter(entry),
            Dispatcher::DataPipeProducer(d) => d.register_waiter(entry),
            Dispatcher::DataPipeConsumer(d) => d.register_waiter(entry),
            Dispatcher::SharedBuffer(d) => d.register_waiter(entry),
            Dispatcher::Event(d) => d.register_waiter(entry),
            Dispatcher::EventPairHalf(d) => d.register_waiter(entry),
            Dispatcher::WaitSet(d) => d.register_waiter(entry),
        }
    }

    /// Cancels a still-pending registration, resolving it with
    /// `Cancelled`. A no-op if it already fired naturally.
    pub(crate) fn cancel_waiter(&self, id: u64) {
        match self {
            Dispatcher::MessagePipeEndpoint(d) => d.cancel_waiter(id),
            Dispatcher::DataPipeProducer(d) => d.cancel_waiter(id),
            Dispatcher::DataPipeConsumer(d) => d.cancel_waiter(id),
            Dispatcher::SharedBuffer(d) => d.cancel_waiter(id),
            Dispatcher::Event(d) => d.cancel_waiter(id),
            Dispatcher::EventPairHalf(d) => d.cancel_waiter(id),
            Dispatcher::WaitSet(d) => d.cancel_waiter(id),
        }
    }

    /// Runs peer-closure propagation and wakes any waiters pinned on this
    /// dispatcher, in response to its last handle closing.
    pub(crate) fn on_last_handle_closed(&self) {
        match self {
            Dispatcher::MessagePipeEndpoint(d) => d.on_closed(),
            Dispatcher::DataPipeProducer(d) => d.on_closed(),
            Dispatcher::DataPipeConsumer(d) => d.on_closed(),
            Dispatcher::SharedBuffer(_) => {}
            Dispatcher::Event(_) => {}
            Dispatcher::EventPairHalf(d) => d.on_closed(),
            Dispatcher::WaitSet(d) => d.on_closed(),
        }
    }
}

/// The rights a freshly created handle to `dispatcher` is granted (spec
/// §4.3 "no `DUPLICATE`" for pipes, §4.5/§4.6 full `STANDARD_DEFAULT` for
/// buffers/events).
pub(crate) fn default_rights_for(dispatcher: &Dispatcher) -> crate::rights::Rights {
    use crate::rights::Rights;
    match dispatcher {
        Dispatcher::MessagePipeEndpoint(_)
        | Dispatcher::DataPipeProducer(_)
        | Dispatcher::DataPipeConsumer(_) => Rights::PIPE_DEFAULT,
        Dispatcher::SharedBuffer(_) | Dispatcher::Event(_) | Dispatcher::EventPairHalf(_) => {
            Rights::STANDARD_DEFAULT
        }
        Dispatcher::WaitSet(_) => Rights::STANDARD_DEFAULT.minus(Rights::DUPLICATE),
    }
}
