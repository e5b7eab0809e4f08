//! The public facade tying the handle table, the dispatcher variants and
//! the waiter machinery together into the operations named directly
//! (`CreateMessagePipe`, `WriteMessage`, `Wait`, ...).
//!
//! One struct owns the process-wide table and hands back plain data;
//! every "do a thing with a handle" call starts the same way — look the
//! handle up, check the right it needs, then dispatch into the
//! object-specific logic.

use std::sync::Arc;

use crate::clock::{checked_deadline, Clock, SystemClock, TimeTicks, INDEFINITE};
use crate::dispatcher::data_pipe::{self, BeginOutcome, DataPipeConsumer, DataPipeProducer, TransferOutcome};
use crate::dispatcher::event::Event;
use crate::dispatcher::event_pair;
use crate::dispatcher::message_pipe::{self, MessagePipeEndpoint, ReadMessageError as PipeReadMessageError, TransferredHandle};
use crate::dispatcher::shared_buffer::{MapId, SharedBuffer};
use crate::dispatcher::wait_set::WaitSet;
use crate::dispatcher::Dispatcher;
use crate::error::{MojoError, MojoResult};
use crate::handle::Handle;
use crate::handle_table::HandleTable;
use crate::limits::{self, Limits};
use crate::options::{self, data_pipe_flags};
use crate::rights::Rights;
use crate::signals::{Signals, SignalsState};
use crate::waiter::{WaitCode, WaiterEntry, WaitOutcome};

/// One resolved `Wait` call: the final code (as a [`MojoResult`]) and the
/// handle's signal state at the moment of resolution.
pub struct WaitReport {
    pub outcome: Result<(), MojoError>,
    pub state: SignalsState,
}

/// One resolved `WaitMany` call: which index fired (meaningless when
/// `outcome` is `Err(DeadlineExceeded)`, since no single handle is
/// responsible for a timeout) plus every handle's state, in the order
/// the caller supplied them.
pub struct WaitManyReport {
    pub index: usize,
    pub outcome: Result<(), MojoError>,
    pub states: Vec<SignalsState>,
}

/// What `ReadMessage` handed back.
#[derive(Debug)]
pub struct ReadMessageOutcome {
    pub bytes: Vec<u8>,
    pub handles: Vec<Handle>,
}

/// The non-error-shaped outcomes of `ReadMessage` that still carry data a
/// caller needs.
#[derive(Debug)]
pub enum ReadMessageResult {
    Read(ReadMessageOutcome),
    /// `RESOURCE_EXHAUSTED`: `byte_cap`/`handle_cap` were too small for the
    /// front message. Discarded from the queue if `may_discard` was set.
    TooSmall { required_bytes: usize, required_handles: usize },
}

/// `GetBufferInformation`.
pub struct BufferInfo {
    pub num_bytes: usize,
}

fn code_to_result(code: WaitCode) -> Result<(), MojoError> {
    code.into_error().map_or(Ok(()), Err)
}

/// One process's capability-addressed kernel: a handle table plus an
/// injected [`Clock`].
pub struct Core {
    handles: HandleTable,
    clock: Arc<dyn Clock>,
    limits: Limits,
}

impl Core {
    /// A production instance: the real system clock, production limits.
    pub fn new() -> Core {
        Core::with_clock_and_limits(Arc::new(SystemClock::new()), Limits::production())
    }

    /// Used by tests to inject a [`crate::clock::FakeClock`] and/or
    /// smaller limits that are easy to exhaust deliberately.
    pub fn with_clock_and_limits(clock: Arc<dyn Clock>, limits: Limits) -> Core {
        Core {
            handles: HandleTable::new(&limits),
            clock,
            limits,
        }
    }

    pub fn get_time_ticks_now(&self) -> TimeTicks {
        self.clock.now()
    }

    // ---- Handle table operations ----------------------------

    pub fn close(&self, handle: Handle) -> MojoResult<()> {
        self.handles.close(handle)
    }

    pub fn get_rights(&self, handle: Handle) -> MojoResult<Rights> {
        let (_, rights) = self.handles.lookup(handle)?;
        Ok(rights)
    }

    pub fn duplicate_handle(&self, handle: Handle) -> MojoResult<Handle> {
        let (dispatcher, rights) = self.handles.lookup(handle)?;
        if !rights.contains(Rights::DUPLICATE) {
            return Err(MojoError::PermissionDenied);
        }
        self.handles.duplicate(dispatcher, rights)
    }

    pub fn duplicate_handle_with_reduced_rights(&self, handle: Handle, rights_to_remove: Rights) -> MojoResult<Handle> {
        let (dispatcher, rights) = self.handles.lookup(handle)?;
        if !rights.contains(Rights::DUPLICATE) {
            return Err(MojoError::PermissionDenied);
        }
        self.handles.duplicate(dispatcher, rights.minus(rights_to_remove))
    }

    pub fn replace_handle_with_reduced_rights(&self, handle: Handle, rights_to_remove: Rights) -> MojoResult<Handle> {
        self.handles.replace_with_reduced_rights(handle, rights_to_remove)
    }

    // ---- Wait / WaitMany ------------------------------------

    /// `Wait(handle, signals, timeout)`. `timeout` is
    /// microseconds from now, or [`WAIT_INDEFINITE`]. A `timeout` of `0`
    /// never blocks: `checked_deadline` maps it to `now`, so the very
    /// first check in `block_until` already finds the deadline passed.
    pub fn wait(&self, handle: Handle, signals: Signals, timeout: TimeTicks) -> MojoResult<WaitReport> {
        let (dispatcher, _rights) = self.handles.lookup(handle)?;
        let now = self.clock.now();
        let deadline = checked_deadline(now, timeout);

        let outcome = WaitOutcome::new();
        let entry = WaiterEntry {
            requested: signals,
            outcome: outcome.clone(),
            index: 0,
            persistent: false,
        };
        let waiter_id = dispatcher.register_waiter(entry);
        if let Some(id) = waiter_id {
            self.handles.register_cancellable(handle, dispatcher.clone(), id)?;
        }

        let result = outcome.block_until(self.clock.as_ref(), deadline);
        if let Some(id) = waiter_id {
            self.handles.unregister_cancellable(handle, id);
        }

        match result {
            Some(slot) => Ok(WaitReport {
                outcome: code_to_result(slot.code),
                state: slot.state,
            }),
            None => {
                if let Some(id) = waiter_id {
                    dispatcher.cancel_waiter(id);
                }
                Ok(WaitReport {
                    outcome: Err(MojoError::DeadlineExceeded),
                    state: dispatcher.signals_state(),
                })
            }
        }
    }

    /// `WaitMany(handles, signals, deadline)`. `handles` and
    /// `signals` must be the same, non-zero length.
    pub fn wait_many(&self, handles: &[Handle], signals: &[Signals], deadline_timeout: TimeTicks) -> MojoResult<WaitManyReport> {
        if handles.is_empty() || handles.len() != signals.len() {
            return Err(MojoError::InvalidArgument);
        }
        let mut dispatchers = Vec::with_capacity(handles.len());
        for &h in handles {
            let (d, _rights) = self.handles.lookup(h)?;
            dispatchers.push(d);
        }

        let now = self.clock.now();
        let deadline = checked_deadline(now, deadline_timeout);
        let outcome = WaitOutcome::new();
        let mut waiter_ids: Vec<Option<u64>> = Vec::with_capacity(handles.len());
        for (i, dispatcher) in dispatchers.iter().enumerate() {
            let entry = WaiterEntry {
                requested: signals[i],
                outcome: outcome.clone(),
                index: i,
                persistent: false,
            };
            let id = dispatcher.register_waiter(entry);
            if let Some(wid) = id {
                self.handles.register_cancellable(handles[i], dispatcher.clone(), wid)?;
            }
            waiter_ids.push(id);
        }

        let result = outcome.block_until(self.clock.as_ref(), deadline);
        for (i, id) in waiter_ids.iter().enumerate() {
            if let Some(wid) = *id {
                self.handles.unregister_cancellable(handles[i], wid);
            }
        }

        let (index, outcome_result) = match result {
            Some(slot) => (slot.index, code_to_result(slot.code)),
            None => {
                for (i, id) in waiter_ids.iter().enumerate() {
                    if let Some(wid) = *id {
                        dispatchers[i].cancel_waiter(wid);
                    }
                }
                (0, Err(MojoError::DeadlineExceeded))
            }
        };
        let states = dispatchers.iter().map(|d| d.signals_state()).collect();
        Ok(WaitManyReport {
            index,
            outcome: outcome_result,
            states,
        })
    }

    // ---- Message pipes --------------------------------------

    pub fn create_message_pipe(&self, struct_size: u32, flags: u32) -> MojoResult<(Handle, Handle)> {
        options::validate_message_pipe_create_options(struct_size, flags)?;
        let (e0, e1) = message_pipe::create_pair();
        let h0 = self.handles.add(Dispatcher::MessagePipeEndpoint(e0))?;
        match self.handles.add(Dispatcher::MessagePipeEndpoint(e1)) {
            Ok(h1) => Ok((h0, h1)),
            Err(err) => {
                let _ = self.handles.close(h0);
                Err(err)
            }
        }
    }

    fn message_pipe_endpoint(&self, handle: Handle, required: Rights) -> MojoResult<MessagePipeEndpoint> {
        let (dispatcher, rights) = self.handles.lookup(handle)?;
        if !rights.contains(required) {
            return Err(MojoError::PermissionDenied);
        }
        match dispatcher {
            Dispatcher::MessagePipeEndpoint(endpoint) => Ok(endpoint),
            _ => Err(MojoError::InvalidArgument),
        }
    }

    /// `WriteMessage(handle, bytes, handles_to_transfer)`.
    /// Validates every handle to transfer before detaching any of them:
    /// on the first failure nothing has moved, matching "all or nothing".
    pub fn write_message(&self, handle: Handle, bytes: Vec<u8>, handles_to_transfer: &[Handle]) -> MojoResult<()> {
        if bytes.len() > self.limits.max_message_bytes {
            return Err(MojoError::ResourceExhausted);
        }
        if handles_to_transfer.len() > self.limits.max_message_handles {
            return Err(MojoError::ResourceExhausted);
        }
        let endpoint = self.message_pipe_endpoint(handle, Rights::WRITE)?;

        for &h in handles_to_transfer {
            if h == handle {
                return Err(MojoError::InvalidArgument);
            }
            let (_, rights) = self.handles.lookup(h)?;
            if !rights.contains(Rights::TRANSFER) {
                return Err(MojoError::PermissionDenied);
            }
        }

        let mut detached = Vec::with_capacity(handles_to_transfer.len());
        for &h in handles_to_transfer {
            // Already validated above; a concurrent close between the
            // check and here is the caller's race to own, surfaced as
            // whatever detach_for_transfer returns.
            let (dispatcher, rights) = self.handles.detach_for_transfer(h)?;
            detached.push(TransferredHandle { dispatcher, rights });
        }

        endpoint.write_message(bytes, detached)
    }

    /// `ReadMessage(handle, byte_cap, handle_cap, flags)`.
    pub fn read_message(
        &self,
        handle: Handle,
        byte_cap: usize,
        handle_cap: usize,
        may_discard: bool,
    ) -> MojoResult<ReadMessageResult> {
        let endpoint = self.message_pipe_endpoint(handle, Rights::READ)?;
        match endpoint.read_message(byte_cap, handle_cap, may_discard) {
            Ok(message) => {
                let mut handles = Vec::with_capacity(message.handles.len());
                for transferred in message.handles {
                    handles.push(self.handles.install_transferred(transferred.dispatcher, transferred.rights)?);
                }
                Ok(ReadMessageResult::Read(ReadMessageOutcome {
                    bytes: message.bytes,
                    handles,
                }))
            }
            Err(PipeReadMessageError::Empty { peer_open }) => {
                if peer_open {
                    Err(MojoError::ShouldWait)
                } else {
                    Err(MojoError::FailedPrecondition)
                }
            }
            Err(PipeReadMessageError::TooSmall {
                required_bytes,
                required_handles,
                ..
            }) => Ok(ReadMessageResult::TooSmall {
                required_bytes,
                required_handles,
            }),
        }
    }

    /// Non-consuming peek at the next message's sizes, for a caller doing
    /// the two-call "ask size, then allocate, then read" dance.
    pub fn query_message_sizes(&self, handle: Handle) -> MojoResult<Option<(usize, usize)>> {
        let endpoint = self.message_pipe_endpoint(handle, Rights::READ)?;
        Ok(endpoint.peek_sizes())
    }

    // ---- Data pipes ------------------------------------------

    pub fn create_data_pipe(&self, struct_size: u32, flags: u32, element_size: u32, capacity_bytes: u32) -> MojoResult<(Handle, Handle)> {
        let opts = options::validate_data_pipe_create_options(struct_size, flags, element_size, capacity_bytes)?;
        let capacity = if opts.capacity_bytes == 0 {
            limits::DEFAULT_DATA_PIPE_CAPACITY_BYTES
        } else {
            opts.capacity_bytes
        };
        if capacity > self.limits.max_data_pipe_capacity_bytes {
            return Err(MojoError::ResourceExhausted);
        }
        let (producer, consumer) = data_pipe::create_pair(opts.element_size, capacity);
        let hp = self.handles.add(Dispatcher::DataPipeProducer(producer))?;
        match self.handles.add(Dispatcher::DataPipeConsumer(consumer)) {
            Ok(hc) => Ok((hp, hc)),
            Err(err) => {
                let _ = self.handles.close(hp);
                Err(err)
            }
        }
    }

    fn producer(&self, handle: Handle, required: Rights) -> MojoResult<DataPipeProducer> {
        let (dispatcher, rights) = self.handles.lookup(handle)?;
        if !rights.contains(required) {
            return Err(MojoError::PermissionDenied);
        }
        match dispatcher {
            Dispatcher::DataPipeProducer(p) => Ok(p),
            _ => Err(MojoError::InvalidArgument),
        }
    }

    fn consumer(&self, handle: Handle, required: Rights) -> MojoResult<DataPipeConsumer> {
        let (dispatcher, rights) = self.handles.lookup(handle)?;
        if !rights.contains(required) {
            return Err(MojoError::PermissionDenied);
        }
        match dispatcher {
            Dispatcher::DataPipeConsumer(c) => Ok(c),
            _ => Err(MojoError::InvalidArgument),
        }
    }

    fn transfer_to_result(outcome: TransferOutcome) -> MojoResult<u32> {
        match outcome {
            TransferOutcome::Transferred(n) => Ok(n),
            TransferOutcome::PeerClosed => Err(MojoError::FailedPrecondition),
            TransferOutcome::ShouldWait => Err(MojoError::ShouldWait),
        }
    }

    /// `WriteData(producer, bytes, flags)`. `all_or_none`
    /// corresponds to the `ALL_OR_NONE` flag.
    pub fn write_data(&self, handle: Handle, bytes: &[u8], all_or_none: bool) -> MojoResult<u32> {
        let producer = self.producer(handle, Rights::WRITE)?;
        if all_or_none {
            producer.write_data_all_or_none(bytes)?;
            Ok(bytes.len() as u32)
        } else {
            Self::transfer_to_result(producer.write_data(bytes))
        }
    }

    /// `BeginWriteData(producer)`: on success, returns the byte range of
    /// the reserved span; write into it with [`Core::write_reserved_span`]
    /// before calling [`Core::end_write_data`].
    pub fn begin_write_data(&self, handle: Handle) -> MojoResult<(usize, usize)> {
        let producer = self.producer(handle, Rights::WRITE)?;
        match producer.begin_write_data() {
            BeginOutcome::Began { offset, len } => Ok((offset, len)),
            BeginOutcome::Busy => Err(MojoError::Busy),
            BeginOutcome::PeerClosed => Err(MojoError::FailedPrecondition),
            BeginOutcome::ShouldWait => Err(MojoError::ShouldWait),
        }
    }

    pub fn write_reserved_span(&self, handle: Handle, src: &[u8]) -> MojoResult<()> {
        let producer = self.producer(handle, Rights::WRITE)?;
        producer.write_into_reserved_span(src)
    }

    pub fn end_write_data(&self, handle: Handle, num_bytes_written: usize) -> MojoResult<()> {
        let producer = self.producer(handle, Rights::WRITE)?;
        producer.end_write_data(num_bytes_written)
    }

    pub fn set_data_pipe_producer_options(&self, handle: Handle, struct_size: u32, write_threshold: u32) -> MojoResult<()> {
        let producer = self.producer(handle, Rights::SET_OPTIONS)?;
        options::validate_data_pipe_producer_options(struct_size, write_threshold)?;
        let threshold = if write_threshold == 0 { None } else { Some(write_threshold) };
        producer.set_write_threshold(threshold)
    }

    pub fn get_data_pipe_producer_options(&self, handle: Handle) -> MojoResult<u32> {
        let producer = self.producer(handle, Rights::GET_OPTIONS)?;
        Ok(producer.write_threshold())
    }

    /// `ReadData(consumer, dst, flags)`. `flags` is one of
    /// `data_pipe_flags::{NONE,ALL_OR_NONE,DISCARD,PEEK}`; `QUERY` is its
    /// own entry point, [`Core::query_data_pipe_available`].
    pub fn read_data(&self, handle: Handle, dst: &mut [u8], flags: u32) -> MojoResult<u32> {
        if flags & !options::data_pipe_flags::KNOWN != 0 {
            return Err(MojoError::Unimplemented);
        }
        if flags & data_pipe_flags::QUERY != 0 {
            // QUERY has no buffer to fill; use query_data_pipe_available.
            return Err(MojoError::InvalidArgument);
        }
        let consumer = self.consumer(handle, Rights::READ)?;
        let all_or_none = flags & data_pipe_flags::ALL_OR_NONE != 0;
        let discard = flags & data_pipe_flags::DISCARD != 0;
        let peek = flags & data_pipe_flags::PEEK != 0;
        if discard && peek {
            return Err(MojoError::InvalidArgument);
        }
        if discard {
            return Self::transfer_to_result(consumer.discard_data(dst.len() as u32));
        }
        if peek {
            return Self::transfer_to_result(consumer.peek_data(dst));
        }
        if all_or_none {
            consumer.read_data_all_or_none(dst)?;
            Ok(dst.len() as u32)
        } else {
            Self::transfer_to_result(consumer.read_data(dst))
        }
    }

    pub fn query_data_pipe_available(&self, handle: Handle) -> MojoResult<u32> {
        let consumer = self.consumer(handle, Rights::READ)?;
        Ok(consumer.query_available())
    }

    pub fn begin_read_data(&self, handle: Handle) -> MojoResult<(usize, usize)> {
        let consumer = self.consumer(handle, Rights::READ)?;
        match consumer.begin_read_data() {
            BeginOutcome::Began { offset, len } => Ok((offset, len)),
            BeginOutcome::Busy => Err(MojoError::Busy),
            BeginOutcome::PeerClosed => Err(MojoError::FailedPrecondition),
            BeginOutcome::ShouldWait => Err(MojoError::ShouldWait),
        }
    }

    pub fn read_reserved_span(&self, handle: Handle, dst: &mut [u8]) -> MojoResult<()> {
        let consumer = self.consumer(handle, Rights::READ)?;
        consumer.read_from_reserved_span(dst)
    }

    pub fn end_read_data(&self, handle: Handle, num_bytes_read: usize) -> MojoResult<()> {
        let consumer = self.consumer(handle, Rights::READ)?;
        consumer.end_read_data(num_bytes_read)
    }

    pub fn set_data_pipe_consumer_options(&self, handle: Handle, struct_size: u32, read_threshold: u32) -> MojoResult<()> {
        let consumer = self.consumer(handle, Rights::SET_OPTIONS)?;
        options::validate_data_pipe_consumer_options(struct_size, read_threshold)?;
        let threshold = if read_threshold == 0 { None } else { Some(read_threshold) };
        consumer.set_read_threshold(threshold)
    }

    pub fn get_data_pipe_consumer_options(&self, handle: Handle) -> MojoResult<u32> {
        let consumer = self.consumer(handle, Rights::GET_OPTIONS)?;
        Ok(consumer.read_threshold())
    }

    // ---- Shared buffers --------------------------------------

    pub fn create_shared_buffer(&self, struct_size: u32, flags: u32, num_bytes: usize) -> MojoResult<Handle> {
        options::validate_shared_buffer_create_options(struct_size, flags)?;
        if num_bytes == 0 {
            return Err(MojoError::InvalidArgument);
        }
        let rounded = limits::round_up_to_page(num_bytes);
        let buffer = SharedBuffer::new(rounded);
        self.handles.add(Dispatcher::SharedBuffer(buffer))
    }

    fn shared_buffer(&self, handle: Handle, required: Rights) -> MojoResult<SharedBuffer> {
        let (dispatcher, rights) = self.handles.lookup(handle)?;
        if !rights.contains(required) {
            return Err(MojoError::PermissionDenied);
        }
        match dispatcher {
            Dispatcher::SharedBuffer(buffer) => Ok(buffer),
            _ => Err(MojoError::InvalidArgument),
        }
    }

    pub fn duplicate_buffer_handle(&self, handle: Handle, struct_size: u32, flags: u32) -> MojoResult<Handle> {
        options::validate_duplicate_buffer_handle_options(struct_size, flags)?;
        let (dispatcher, rights) = self.handles.lookup(handle)?;
        if !rights.contains(Rights::DUPLICATE) {
            return Err(MojoError::PermissionDenied);
        }
        let buffer = match dispatcher {
            Dispatcher::SharedBuffer(buffer) => buffer,
            _ => return Err(MojoError::InvalidArgument),
        };
        self.handles.duplicate(Dispatcher::SharedBuffer(buffer.duplicate()), rights)
    }

    pub fn get_buffer_information(&self, handle: Handle) -> MojoResult<BufferInfo> {
        let buffer = self.shared_buffer(handle, Rights::GET_OPTIONS)?;
        Ok(BufferInfo {
            num_bytes: buffer.size_bytes(),
        })
    }

    /// `MapBuffer(handle, offset, num_bytes, flags)`. `writable`
    /// additionally requires `WRITE`.
    pub fn map_buffer(&self, handle: Handle, offset: usize, num_bytes: usize, writable: bool) -> MojoResult<MapId> {
        let mut required = Rights::READ;
        if writable {
            required |= Rights::WRITE;
        }
        let buffer = self.shared_buffer(handle, required)?;
        buffer.map(offset, num_bytes)
    }

    pub fn unmap_buffer(&self, handle: Handle, id: MapId) -> MojoResult<()> {
        let buffer = self.shared_buffer(handle, Rights::NONE)?;
        buffer.unmap(id)
    }

    pub fn write_mapped_buffer(&self, handle: Handle, id: MapId, src: &[u8]) -> MojoResult<()> {
        let buffer = self.shared_buffer(handle, Rights::WRITE)?;
        buffer.write_mapped(id, src)
    }

    pub fn read_mapped_buffer(&self, handle: Handle, id: MapId, dst: &mut [u8]) -> MojoResult<()> {
        let buffer = self.shared_buffer(handle, Rights::READ)?;
        buffer.read_mapped(id, dst)
    }

    // ---- Events and event pairs ------------------------------

    pub fn create_event(&self, struct_size: u32, flags: u32) -> MojoResult<Handle> {
        options::validate_signal_dispatcher_create_options(struct_size, flags)?;
        self.handles.add(Dispatcher::Event(Event::new()))
    }

    pub fn create_event_pair(&self, struct_size: u32, flags: u32) -> MojoResult<(Handle, Handle)> {
        options::validate_signal_dispatcher_create_options(struct_size, flags)?;
        let (h0, h1) = event_pair::create_pair();
        let handle0 = self.handles.add(Dispatcher::EventPairHalf(h0))?;
        match self.handles.add(Dispatcher::EventPairHalf(h1)) {
            Ok(handle1) => Ok((handle0, handle1)),
            Err(err) => {
                let _ = self.handles.close(handle0);
                Err(err)
            }
        }
    }

    /// `MojoEventSignal`/`MojoSignal` on either an `Event` or one half of
    /// an `EventPair`. `clear`/`set` must be subsets of
    /// [`Signals::USER_SIGNALS`].
    pub fn signal(&self, handle: Handle, clear: Signals, set: Signals) -> MojoResult<()> {
        if !clear.is_subset_of_user_signals() || !set.is_subset_of_user_signals() {
            return Err(MojoError::InvalidArgument);
        }
        let (dispatcher, rights) = self.handles.lookup(handle)?;
        if !rights.contains(Rights::WRITE) {
            return Err(MojoError::PermissionDenied);
        }
        match dispatcher {
            Dispatcher::Event(event) => {
                event.signal(clear, set);
                Ok(())
            }
            Dispatcher::EventPairHalf(half) => {
                half.signal(clear, set);
                Ok(())
            }
            _ => Err(MojoError::InvalidArgument),
        }
    }

    // ---- Wait sets --------------------------------------------

    pub fn create_wait_set(&self, struct_size: u32, flags: u32) -> MojoResult<Handle> {
        options::validate_signal_dispatcher_create_options(struct_size, flags)?;
        self.handles.add(Dispatcher::WaitSet(WaitSet::new()))
    }

    fn wait_set(&self, handle: Handle) -> MojoResult<WaitSet> {
        let (dispatcher, _rights) = self.handles.lookup(handle)?;
        match dispatcher {
            Dispatcher::WaitSet(ws) => Ok(ws),
            _ => Err(MojoError::InvalidArgument),
        }
    }

    /// `WaitSetAdd(wait_set, member, signals, struct_size, flags, cookie)`.
    pub fn wait_set_add(&self, wait_set: Handle, member: Handle, signals: Signals, struct_size: u32, flags: u32, cookie: u64) -> MojoResult<()> {
        options::validate_wait_set_add_options(struct_size, flags)?;
        let ws = self.wait_set(wait_set)?;
        let (member_dispatcher, _rights) = self.handles.lookup(member)?;
        ws.add(member_dispatcher, signals, cookie)
    }

    pub fn wait_set_remove(&self, wait_set: Handle, cookie: u64) -> MojoResult<()> {
        let ws = self.wait_set(wait_set)?;
        ws.remove(cookie)
    }

    /// `WaitSetWait(wait_set, deadline, capacity)`. Returns the
    /// drained `(cookie, outcome, state)` triples and the total number of
    /// ready entries observed at drain time.
    pub fn wait_set_wait(&self, wait_set: Handle, deadline_timeout: TimeTicks, capacity: usize) -> MojoResult<(Vec<(u64, Result<(), MojoError>, SignalsState)>, usize)> {
        let ws = self.wait_set(wait_set)?;
        let now = self.clock.now();
        let deadline = checked_deadline(now, deadline_timeout);
        let (results, total) = ws.wait(self.clock.as_ref(), deadline, capacity);
        let mapped = results
            .into_iter()
            .map(|r| (r.cookie, code_to_result(r.code), r.state))
            .collect();
        Ok((mapped, total))
    }
}

impl Default for Core {
    fn default() -> Core {
        Core::new()
    }
}

/// `INDEFINITE` re-exported at the facade so callers pass deadlines
/// without reaching into [`crate::clock`] directly.
pub const WAIT_INDEFINITE: TimeTicks = INDEFINITE;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::FakeClock;

    fn core_with_fake_clock() -> (Core, Arc<FakeClock>) {
        let clock = Arc::new(FakeClock::new());
        let core = Core::with_clock_and_limits(clock.clone(), Limits::production());
        (core, clock)
    }

    #[test]
    fn scenario_message_hello() {
        let (core, _clock) = core_with_fake_clock();
        let (h0, h1) = core.create_message_pipe(8, 0).unwrap();
        core.write_message(h0, b"hello".to_vec(), &[]).unwrap();
        match core.read_message(h1, 64, 0, false).unwrap() {
            ReadMessageResult::Read(msg) => assert_eq!(msg.bytes, b"hello"),
            _ => panic!("expected a message"),
        }
    }

    #[test]
    fn wait_resolves_immediately_when_already_satisfied() {
        let (core, _clock) = core_with_fake_clock();
        let (h0, h1) = core.create_message_pipe(8, 0).unwrap();
        core.write_message(h0, b"x".to_vec(), &[]).unwrap();
        let report = core.wait(h1, Signals::READABLE, WAIT_INDEFINITE).unwrap();
        assert!(report.outcome.is_ok());
        assert!(report.state.satisfied().contains(Signals::READABLE));
    }

    #[test]
    fn wait_times_out_and_reports_latest_state() {
        // A zero timeout resolves without ever blocking on the condvar,
        // so this needs no real wall-clock wait.
        let (core, _clock) = core_with_fake_clock();
        let handle = core.create_event(8, 0).unwrap();
        let report = core.wait(handle, Signals::SIGNAL0, 0).unwrap();
        assert_eq!(report.outcome.unwrap_err(), MojoError::DeadlineExceeded);
        assert!(!report.state.satisfied().contains(Signals::SIGNAL0));
    }

    #[test]
    fn wait_many_reports_the_index_that_fired() {
        let (core, _clock) = core_with_fake_clock();
        let h0 = core.create_event(8, 0).unwrap();
        let h1 = core.create_event(8, 0).unwrap();
        core.signal(h1, Signals::NONE, Signals::SIGNAL0).unwrap();

        let report = core
            .wait_many(&[h0, h1], &[Signals::SIGNAL0, Signals::SIGNAL0], WAIT_INDEFINITE)
            .unwrap();
        assert_eq!(report.index, 1);
        assert!(report.outcome.is_ok());
        assert_eq!(report.states.len(), 2);
    }

    #[test]
    fn closing_a_handle_cancels_a_blocked_wait_on_another_thread() {
        let core = Arc::new(Core::new());
        let handle = core.create_event(8, 0).unwrap();
        let waiter_core = core.clone();
        let joined = std::thread::spawn(move || waiter_core.wait(handle, Signals::SIGNAL0, WAIT_INDEFINITE));
        std::thread::sleep(std::time::Duration::from_millis(20));
        core.close(handle).unwrap();
        let report = joined.join().unwrap().unwrap();
        assert_eq!(report.outcome.unwrap_err(), MojoError::Cancelled);
    }

    #[test]
    fn write_message_transfers_handle_rights_unchanged() {
        let (core, _clock) = core_with_fake_clock();
        let (p0, p1) = core.create_message_pipe(8, 0).unwrap();
        let passenger = core.create_event(8, 0).unwrap();
        let original_rights = core.get_rights(passenger).unwrap();

        core.write_message(p0, Vec::new(), &[passenger]).unwrap();
        assert_eq!(core.get_rights(passenger).unwrap_err(), MojoError::InvalidArgument);

        match core.read_message(p1, 0, 4, false).unwrap() {
            ReadMessageResult::Read(msg) => {
                assert_eq!(msg.handles.len(), 1);
                assert_eq!(core.get_rights(msg.handles[0]).unwrap(), original_rights);
            }
            _ => panic!("expected a message"),
        }
    }

    #[test]
    fn write_message_rejects_transferring_itself() {
        let (core, _clock) = core_with_fake_clock();
        let (h0, _h1) = core.create_message_pipe(8, 0).unwrap();
        let err = core.write_message(h0, Vec::new(), &[h0]).unwrap_err();
        assert_eq!(err, MojoError::InvalidArgument);
    }

    #[test]
    fn write_message_without_transfer_right_leaves_both_handles_untouched() {
        let (core, _clock) = core_with_fake_clock();
        let (h0, _h1) = core.create_message_pipe(8, 0).unwrap();
        let buffer = core.create_shared_buffer(8, 0, 16).unwrap();
        let reduced = core.replace_handle_with_reduced_rights(buffer, Rights::TRANSFER).unwrap();

        let err = core.write_message(h0, Vec::new(), &[reduced]).unwrap_err();
        assert_eq!(err, MojoError::PermissionDenied);
        // Nothing was detached: the handle is still bound.
        assert!(core.get_rights(reduced).is_ok());
    }

    #[test]
    fn read_message_too_small_reports_required_sizes_without_consuming() {
        let (core, _clock) = core_with_fake_clock();
        let (h0, h1) = core.create_message_pipe(8, 0).unwrap();
        core.write_message(h0, b"hello".to_vec(), &[]).unwrap();
        match core.read_message(h1, 2, 0, false).unwrap() {
            ReadMessageResult::TooSmall { required_bytes, .. } => assert_eq!(required_bytes, 5),
            _ => panic!("expected TooSmall"),
        }
        // Still there: a second, big-enough read succeeds.
        match core.read_message(h1, 64, 0, false).unwrap() {
            ReadMessageResult::Read(msg) => assert_eq!(msg.bytes, b"hello"),
            _ => panic!("expected a message"),
        }
    }

    #[test]
    fn scenario_two_phase_write_close_consumer() {
        // Driven through the facade so handle close (not a direct
        // on_closed call) is what flips the signal.
        let (core, _clock) = core_with_fake_clock();
        let (producer, consumer) = core.create_data_pipe(16, 0, 1, 16).unwrap();
        let (_offset, len) = core.begin_write_data(producer).unwrap();
        assert!(len >= 1);
        core.close(consumer).unwrap();
        core.end_write_data(producer, 0).unwrap();

        let report = core.wait(producer, Signals::PEER_CLOSED, WAIT_INDEFINITE).unwrap();
        assert!(report.outcome.is_ok());
        assert!(!report.state.satisfiable().contains(Signals::WRITABLE));
    }

    #[test]
    fn scenario_rights_reduction_blocks_write_mapping() {
        // A handle duplicated with WRITE removed can still map readable
        // but a writable mapping is denied.
        let (core, _clock) = core_with_fake_clock();
        let handle = core.create_shared_buffer(8, 0, 16).unwrap();
        let read_only = core.duplicate_handle_with_reduced_rights(handle, Rights::WRITE).unwrap();

        assert!(core.map_buffer(read_only, 0, 16, false).is_ok());
        assert_eq!(core.map_buffer(read_only, 0, 16, true).unwrap_err(), MojoError::PermissionDenied);
        // The original handle, never reduced, still maps writable.
        assert!(core.map_buffer(handle, 0, 16, true).is_ok());
    }

    #[test]
    fn shared_buffer_write_then_read_round_trips_through_two_mappings() {
        let (core, _clock) = core_with_fake_clock();
        let handle = core.create_shared_buffer(8, 0, 16).unwrap();
        let dup = core.duplicate_buffer_handle(handle, 8, 0).unwrap();

        let id_w = core.map_buffer(handle, 0, 16, true).unwrap();
        core.write_mapped_buffer(handle, id_w, &[7; 4]).unwrap();

        let id_r = core.map_buffer(dup, 0, 16, false).unwrap();
        let mut out = [0u8; 4];
        core.read_mapped_buffer(dup, id_r, &mut out).unwrap();
        assert_eq!(out, [7; 4]);
    }

    #[test]
    fn wait_set_wait_drains_ready_members() {
        let (core, _clock) = core_with_fake_clock();
        let ws = core.create_wait_set(8, 0).unwrap();
        let event = core.create_event(8, 0).unwrap();
        core.wait_set_add(ws, event, Signals::SIGNAL0, 8, 0, 42).unwrap();
        core.signal(event, Signals::NONE, Signals::SIGNAL0).unwrap();

        let (results, total) = core.wait_set_wait(ws, WAIT_INDEFINITE, 4).unwrap();
        assert_eq!(total, 1);
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].0, 42);
        assert!(results[0].1.is_ok());
    }

    #[test]
    fn data_pipe_create_default_capacity_rejects_zero_element_size() {
        let (core, _clock) = core_with_fake_clock();
        let err = core.create_data_pipe(16, 0, 0, 0).unwrap_err();
        assert_eq!(err, MojoError::InvalidArgument);
    }

    #[test]
    fn event_signal_rejects_non_user_bits() {
        let (core, _clock) = core_with_fake_clock();
        let handle = core.create_event(8, 0).unwrap();
        let err = core.signal(handle, Signals::NONE, Signals::READABLE).unwrap_err();
        assert_eq!(err, MojoError::InvalidArgument);
    }
}
