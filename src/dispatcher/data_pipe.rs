//! Data pipe producer/consumer sides.
//!
//! Shares one [`crate::ring::RingBuffer`] and one lock between both
//! sides, the same "peered dispatchers share a single lock" discipline
//! as [`super::message_pipe`], with the byte storage itself living in
//! `ring.rs`.

use std::sync::{Arc, Mutex};

use crate::error::{MojoError, MojoResult};
use crate::ring::RingBuffer;
use crate::signals::{Signals, SignalsState};
use crate::waiter::{check_then_register, WaiterEntry, WaiterRegistry};

use super::next_dispatcher_id;

#[derive(Debug)]
struct Shared {
    element_size: u32,
    capacity_bytes: u32,
    ring: RingBuffer,
    producer_open: bool,
    consumer_open: bool,
    /// Configured threshold; `0` means "use the default".
    write_threshold: u32,
    /// Configured threshold; `0` means "use the default".
    read_threshold: u32,
    two_phase_write_active: bool,
    two_phase_read_active: bool,
    producer_waiters: WaiterRegistry,
    consumer_waiters: WaiterRegistry,
}

impl Shared {
    fn effective_write_threshold(&self) -> u32 {
        if self.write_threshold == 0 {
            self.capacity_bytes
        } else {
            self.write_threshold
        }
    }

    fn effective_read_threshold(&self) -> u32 {
        if self.read_threshold == 0 {
            self.element_size
        } else {
            self.read_threshold
        }
    }

    fn producer_state(&self) -> SignalsState {
        let free = self.ring.free() as u32;
        let mut satisfied = Signals::NONE;
        let mut satisfiable = Signals::PEER_CLOSED;
        if !self.consumer_open {
            satisfied |= Signals::PEER_CLOSED;
        } else {
            satisfiable |= Signals::WRITABLE | Signals::WRITE_THRESHOLD;
            if !self.two_phase_write_active {
                if free >= self.element_size {
                    satisfied |= Signals::WRITABLE;
                }
                if free >= self.effective_write_threshold() {
                    satisfied |= Signals::WRITE_THRESHOLD;
                }
            }
        }
        SignalsState::new(satisfied, satisfiable)
    }

    fn consumer_state(&self) -> SignalsState {
        let available = self.ring.len() as u32;
        let mut satisfied = Signals::NONE;
        let mut satisfiable = Signals::PEER_CLOSED;
        if !self.producer_open {
            satisfied |= Signals::PEER_CLOSED;
        }
        if !self.two_phase_read_active {
            if available >= self.element_size {
                satisfied |= Signals::READABLE;
            }
            if available >= self.effective_read_threshold() {
                satisfied |= Signals::READ_THRESHOLD;
            }
        }
        if self.producer_open || available >= self.element_size {
            satisfiable |= Signals::READABLE;
        }
        if self.producer_open || available >= self.effective_read_threshold() {
            satisfiable |= Signals::READ_THRESHOLD;
        }
        SignalsState::new(satisfied, satisfiable)
    }

    fn recompute_and_notify(&mut self) {
        let producer = self.producer_state();
        self.producer_waiters.notify_transition(producer);
        let consumer = self.consumer_state();
        self.consumer_waiters.notify_transition(consumer);
    }
}

#[derive(Debug, Clone)]
pub struct DataPipeProducer {
    shared: Arc<Mutex<Shared>>,
    dispatcher_id: u64,
}

#[derive(Debug, Clone)]
pub struct DataPipeConsumer {
    shared: Arc<Mutex<Shared>>,
    dispatcher_id: u64,
}

/// `CreateDataPipe`. Caller has already validated
/// `element_size > 0` and `capacity_bytes % element_size == 0`.
pub fn create_pair(element_size: u32, capacity_bytes: u32) -> (DataPipeProducer, DataPipeConsumer) {
    let shared = Arc::new(Mutex::new(Shared {
        element_size,
        capacity_bytes,
        ring: RingBuffer::new(capacity_bytes as usize),
        producer_open: true,
        consumer_open: true,
        write_threshold: 0,
        read_threshold: 0,
        two_phase_write_active: false,
        two_phase_read_active: false,
        producer_waiters: WaiterRegistry::new(),
        consumer_waiters: WaiterRegistry::new(),
    }));
    (
        DataPipeProducer {
            shared: shared.clone(),
            dispatcher_id: next_dispatcher_id(),
        },
        DataPipeConsumer {
            shared,
            dispatcher_id: next_dispatcher_id(),
        },
    )
}

/// Result of a `WriteData`/`ReadData`-style one-phase operation that can
/// legally transfer zero bytes without that being an error.
pub enum TransferOutcome {
    Transferred(u32),
    /// Nothing available/room and the peer is gone.
    PeerClosed,
    /// Nothing available/room, but the peer might still produce/consume.
    ShouldWait,
}

/// Result of a two-phase `Begin*Data` call.
pub enum BeginOutcome {
    /// A contiguous span of `len` bytes is reserved at `offset`.
    Began { offset: usize, len: usize },
    Busy,
    PeerClosed,
    ShouldWait,
}

impl DataPipeProducer {
    pub(crate) fn dispatcher_id(&self) -> u64 {
        self.dispatcher_id
    }

    pub(crate) fn signals_state(&self) -> SignalsState {
        self.shared.lock().unwrap().producer_state()
    }

    pub(crate) fn register_waiter(&self, entry: WaiterEntry) -> Option<u64> {
        let mut shared = self.shared.lock().unwrap();
        let state = shared.producer_state();
        check_then_register(state, entry, &mut shared.producer_waiters)
    }

    pub(crate) fn cancel_waiter(&self, id: u64) {
        let mut shared = self.shared.lock().unwrap();
        let state = shared.producer_state();
        shared.producer_waiters.cancel(id, state);
    }

    pub(crate) fn on_closed(&self) {
        let mut shared = self.shared.lock().unwrap();
        shared.producer_open = false;
        shared.recompute_and_notify();
    }

    pub fn element_size(&self) -> u32 {
        self.shared.lock().unwrap().element_size
    }

    pub fn capacity_bytes(&self) -> u32 {
        self.shared.lock().unwrap().capacity_bytes
    }

    /// `WriteData` without `ALL_OR_NONE`:
    /// writes `min(num_bytes, free_bytes)` rounded down to an element
    /// multiple.
    pub fn write_data(&self, bytes: &[u8]) -> TransferOutcome {
        let mut shared = self.shared.lock().unwrap();
        if shared.two_phase_write_active {
            // Exclusivity is enforced by the caller checking WRITABLE
            // first in the normal path; a direct call while active is
            // treated as nothing available.
            return if shared.consumer_open {
                TransferOutcome::ShouldWait
            } else {
                TransferOutcome::PeerClosed
            };
        }
        let element = shared.element_size as usize;
        let free = shared.ring.free();
        let n = std::cmp::min(bytes.len(), free) / element * element;
        if n == 0 {
            return if shared.consumer_open {
                TransferOutcome::ShouldWait
            } else {
                TransferOutcome::PeerClosed
            };
        }
        shared.ring.write(&bytes[..n]);
        shared.recompute_and_notify();
        TransferOutcome::Transferred(n as u32)
    }

    /// `WriteData` with `ALL_OR_NONE`: `Err(OutOfRange)` if `bytes` isn't
    /// a whole number of elements that entirely fits.
    pub fn write_data_all_or_none(&self, bytes: &[u8]) -> MojoResult<()> {
        let mut shared = self.shared.lock().unwrap();
        let element = shared.element_size as usize;
        if bytes.len() % element != 0 || bytes.len() > shared.ring.free() {
            return Err(MojoError::OutOfRange);
        }
        shared.ring.write(bytes);
        shared.recompute_and_notify();
        Ok(())
    }

    /// `BeginWriteData`.
    pub fn begin_write_data(&self) -> BeginOutcome {
        let mut shared = self.shared.lock().unwrap();
        if shared.two_phase_write_active {
            return BeginOutcome::Busy;
        }
        let len = shared.ring.contiguous_free_len();
        if len == 0 {
            return if shared.consumer_open {
                BeginOutcome::ShouldWait
            } else {
                BeginOutcome::PeerClosed
            };
        }
        shared.two_phase_write_active = true;
        shared.recompute_and_notify();
        BeginOutcome::Began { offset: 0, len }
    }

    /// Copies `src` into the span reserved by `begin_write_data`. Only
    /// meaningful between `begin_write_data` and `end_write_data`.
    pub fn write_into_reserved_span(&self, src: &[u8]) -> MojoResult<()> {
        let mut shared = self.shared.lock().unwrap();
        let span = shared.ring.contiguous_free_mut();
        if src.len() > span.len() {
            return Err(MojoError::OutOfRange);
        }
        span[..src.len()].copy_from_slice(src);
        Ok(())
    }

    /// `EndWriteData(k)`. An invalid `k` still ends the two-phase
    /// session — the caller's accounting mistake doesn't leave the pipe
    /// stuck in the busy state.
    pub fn end_write_data(&self, k: usize) -> MojoResult<()> {
        let mut shared = self.shared.lock().unwrap();
        if !shared.two_phase_write_active {
            return Err(MojoError::FailedPrecondition);
        }
        shared.two_phase_write_active = false;
        let element = shared.element_size as usize;
        let contiguous = shared.ring.contiguous_free_len();
        if k % element != 0 || k > contiguous {
            shared.recompute_and_notify();
            return Err(MojoError::InvalidArgument);
        }
        shared.ring.commit_write(k);
        shared.recompute_and_notify();
        Ok(())
    }

    /// `SetDataPipeProducerOptions`. `None` resets to the default.
    pub fn set_write_threshold(&self, threshold: Option<u32>) -> MojoResult<()> {
        let mut shared = self.shared.lock().unwrap();
        let value = threshold.unwrap_or(0);
        if value != 0 && (value % shared.element_size != 0 || value > shared.capacity_bytes) {
            return Err(MojoError::InvalidArgument);
        }
        shared.write_threshold = value;
        shared.recompute_and_notify();
        Ok(())
    }

    pub fn write_threshold(&self) -> u32 {
        let shared = self.shared.lock().unwrap();
        shared.effective_write_threshold()
    }
}

impl DataPipeConsumer {
    pub(crate) fn dispatcher_id(&self) -> u64 {
        self.dispatcher_id
    }

    pub(crate) fn signals_state(&self) -> SignalsState {
        self.shared.lock().unwrap().consumer_state()
    }

    pub(crate) fn register_waiter(&self, entry: WaiterEntry) -> Option<u64> {
        let mut shared = self.shared.lock().unwrap();
        let state = shared.consumer_state();
        check_then_register(state, entry, &mut shared.consumer_waiters)
    }

    pub(crate) fn cancel_waiter(&self, id: u64) {
        let mut shared = self.shared.lock().unwrap();
        let state = shared.consumer_state();
        shared.consumer_waiters.cancel(id, state);
    }

    pub(crate) fn on_closed(&self) {
        let mut shared = self.shared.lock().unwrap();
        shared.consumer_open = false;
        shared.recompute_and_notify();
    }

    pub fn element_size(&self) -> u32 {
        self.shared.lock().unwrap().element_size
    }

    /// `ReadData(..., QUERY)`: bytes available without consuming.
    pub fn query_available(&self) -> u32 {
        self.shared.lock().unwrap().ring.len() as u32
    }

    /// One-phase `ReadData` (default semantics: copy and advance).
    pub fn read_data(&self, dst: &mut [u8]) -> TransferOutcome {
        let mut shared = self.shared.lock().unwrap();
        if shared.two_phase_read_active {
            return if shared.producer_open {
                TransferOutcome::ShouldWait
            } else {
                TransferOutcome::PeerClosed
            };
        }
        let element = shared.element_size as usize;
        let available = shared.ring.len();
        let n = std::cmp::min(dst.len(), available) / element * element;
        if n == 0 {
            return if shared.producer_open {
                TransferOutcome::ShouldWait
            } else {
                TransferOutcome::PeerClosed
            };
        }
        shared.ring.read_into(&mut dst[..n]);
        shared.recompute_and_notify();
        TransferOutcome::Transferred(n as u32)
    }

    /// `ReadData(..., PEEK)`: copy without advancing the read cursor.
    pub fn peek_data(&self, dst: &mut [u8]) -> TransferOutcome {
        let mut shared = self.shared.lock().unwrap();
        let element = shared.element_size as usize;
        let available = shared.ring.len();
        let n = std::cmp::min(dst.len(), available) / element * element;
        if n == 0 {
            return if shared.producer_open {
                TransferOutcome::ShouldWait
            } else {
                TransferOutcome::PeerClosed
            };
        }
        shared.ring.peek_into(&mut dst[..n]);
        TransferOutcome::Transferred(n as u32)
    }

    /// `ReadData(..., DISCARD)`: drop up to `num_bytes` without copying.
    pub fn discard_data(&self, num_bytes: u32) -> TransferOutcome {
        let mut shared = self.shared.lock().unwrap();
        let element = shared.element_size as usize;
        let available = shared.ring.len();
        let n = std::cmp::min(num_bytes as usize, available) / element * element;
        if n == 0 {
            return if shared.producer_open {
                TransferOutcome::ShouldWait
            } else {
                TransferOutcome::PeerClosed
            };
        }
        shared.ring.advance_read(n);
        shared.recompute_and_notify();
        TransferOutcome::Transferred(n as u32)
    }

    /// `ReadData` with `ALL_OR_NONE`.
    pub fn read_data_all_or_none(&self, dst: &mut [u8]) -> MojoResult<()> {
        let mut shared = self.shared.lock().unwrap();
        let element = shared.element_size as usize;
        if dst.len() % element != 0 {
            return Err(MojoError::InvalidArgument);
        }
        if dst.len() > shared.ring.len() {
            return Err(if shared.producer_open {
                MojoError::OutOfRange
            } else {
                MojoError::FailedPrecondition
            });
        }
        shared.ring.read_into(dst);
        shared.recompute_and_notify();
        Ok(())
    }

    /// `BeginReadData`.
    pub fn begin_read_data(&self) -> BeginOutcome {
        let mut shared = self.shared.lock().unwrap();
        if shared.two_phase_read_active {
            return BeginOutcome::Busy;
        }
        let len = shared.ring.contiguous_readable_len();
        if len == 0 {
            return if shared.producer_open {
                BeginOutcome::ShouldWait
            } else {
                BeginOutcome::PeerClosed
            };
        }
        shared.two_phase_read_active = true;
        shared.recompute_and_notify();
        BeginOutcome::Began { offset: 0, len }
    }

    /// Copies out of the span reserved by `begin_read_data`.
    pub fn read_from_reserved_span(&self, dst: &mut [u8]) -> MojoResult<()> {
        let shared = self.shared.lock().unwrap();
        let span = shared.ring.contiguous_readable();
        if dst.len() > span.len() {
            return Err(MojoError::OutOfRange);
        }
        dst.copy_from_slice(&span[..dst.len()]);
        Ok(())
    }

    /// `EndReadData(k)`.
    pub fn end_read_data(&self, k: usize) -> MojoResult<()> {
        let mut shared = self.shared.lock().unwrap();
        if !shared.two_phase_read_active {
            return Err(MojoError::FailedPrecondition);
        }
        shared.two_phase_read_active = false;
        let element = shared.element_size as usize;
        let contiguous = shared.ring.contiguous_readable_len();
        if k % element != 0 || k > contiguous {
            shared.recompute_and_notify();
            return Err(MojoError::InvalidArgument);
        }
        shared.ring.advance_read(k);
        shared.recompute_and_notify();
        Ok(())
    }

    /// `SetDataPipeConsumerOptions`. `None` resets to the default.
    pub fn set_read_threshold(&self, threshold: Option<u32>) -> MojoResult<()> {
        let mut shared = self.shared.lock().unwrap();
        let value = threshold.unwrap_or(0);
        if value != 0 && (value % shared.element_size != 0 || value > shared.capacity_bytes) {
            return Err(MojoError::InvalidArgument);
        }
        shared.read_threshold = value;
        shared.recompute_and_notify();
        Ok(())
    }

    pub fn read_threshold(&self) -> u32 {
        let shared = self.shared.lock().unwrap();
        shared.effective_read_threshold()
    }
}
