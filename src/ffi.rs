//! The C ABI surface: thin, panic-free marshalling over one process-wide
//! [`Core`], named `Mojo<Verb>` and returning a packed 32-bit `Result`.
//!
//! This module contributes no logic of its own — it is the "external
//! collaborator that consumes the core's operations but contributes no
//! novel mechanism": every function here does argument marshalling,
//! calls straight into [`crate::core::Core`], and packs the outcome.
//! `catch_unwind` wraps every entry point so a bug on this side of the
//! boundary degrades to `INTERNAL` rather than unwinding across an FFI
//! boundary, which is undefined behavior.

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::OnceLock;

use crate::core::Core;
use crate::error::MojoError;
use crate::handle::Handle;
use crate::rights::Rights;
use crate::signals::Signals;

/// A handle value as it crosses the ABI boundary: `0` is never live.
pub type MojoHandle = u32;

/// A packed `(code: 8 | space: 16 | subcode: 8)` word. `space` is always
/// `SYSTEM` (`0`) for this layer.
pub type MojoResultCode = u32;

const SPACE_SYSTEM: u32 = 0;

const CODE_OK: u8 = 0x0;
const CODE_CANCELLED: u8 = 0x1;
const CODE_UNKNOWN: u8 = 0x2;
const CODE_INVALID_ARGUMENT: u8 = 0x3;
const CODE_DEADLINE_EXCEEDED: u8 = 0x4;
const CODE_NOT_FOUND: u8 = 0x5;
const CODE_ALREADY_EXISTS: u8 = 0x6;
const CODE_PERMISSION_DENIED: u8 = 0x7;
const CODE_RESOURCE_EXHAUSTED: u8 = 0x8;
const CODE_FAILED_PRECONDITION: u8 = 0x9;
const CODE_ABORTED: u8 = 0xA;
const CODE_OUT_OF_RANGE: u8 = 0xB;
const CODE_UNIMPLEMENTED: u8 = 0xC;
const CODE_INTERNAL: u8 = 0xD;
const CODE_UNAVAILABLE: u8 = 0xE;
const CODE_DATA_LOSS: u8 = 0xF;

const SUBCODE_NONE: u8 = 0;
const SUBCODE_BUSY: u8 = 1;
const SUBCODE_SHOULD_WAIT: u8 = 1;

fn pack(code: u8, subcode: u8) -> MojoResultCode {
    (code as u32) | (SPACE_SYSTEM << 8) | ((subcode as u32) << 24)
}

fn pack_ok() -> MojoResultCode {
    pack(CODE_OK, SUBCODE_NONE)
}

fn pack_err(err: MojoError) -> MojoResultCode {
    let (code, subcode) = match err {
        MojoError::Cancelled => (CODE_CANCELLED, SUBCODE_NONE),
        MojoError::Unknown => (CODE_UNKNOWN, SUBCODE_NONE),
        MojoError::InvalidArgument => (CODE_INVALID_ARGUMENT, SUBCODE_NONE),
        MojoError::DeadlineExceeded => (CODE_DEADLINE_EXCEEDED, SUBCODE_NONE),
        MojoError::NotFound => (CODE_NOT_FOUND, SUBCODE_NONE),
        MojoError::AlreadyExists => (CODE_ALREADY_EXISTS, SUBCODE_NONE),
        MojoError::PermissionDenied => (CODE_PERMISSION_DENIED, SUBCODE_NONE),
        MojoError::ResourceExhausted => (CODE_RESOURCE_EXHAUSTED, SUBCODE_NONE),
        MojoError::FailedPrecondition => (CODE_FAILED_PRECONDITION, SUBCODE_NONE),
        MojoError::Busy => (CODE_FAILED_PRECONDITION, SUBCODE_BUSY),
        MojoError::Aborted => (CODE_ABORTED, SUBCODE_NONE),
        MojoError::OutOfRange => (CODE_OUT_OF_RANGE, SUBCODE_NONE),
        MojoError::Unimplemented => (CODE_UNIMPLEMENTED, SUBCODE_NONE),
        MojoError::Internal => (CODE_INTERNAL, SUBCODE_NONE),
        MojoError::Unavailable => (CODE_UNAVAILABLE, SUBCODE_NONE),
        MojoError::ShouldWait => (CODE_UNAVAILABLE, SUBCODE_SHOULD_WAIT),
        MojoError::DataLoss => (CODE_DATA_LOSS, SUBCODE_NONE),
    };
    pack(code, subcode)
}

fn pack_result<T>(result: Result<T, MojoError>) -> MojoResultCode {
    match result {
        Ok(_) => pack_ok(),
        Err(err) => pack_err(err),
    }
}

fn shared_core() -> &'static Core {
    static CORE: OnceLock<Core> = OnceLock::new();
    CORE.get_or_init(Core::new)
}

/// Runs `f` against the shared core, turning a panic into `INTERNAL`
/// rather than letting it unwind across the ABI boundary.
fn guarded(f: impl FnOnce(&Core) -> MojoResultCode) -> MojoResultCode {
    let core = shared_core();
    catch_unwind(AssertUnwindSafe(|| f(core))).unwrap_or(pack(CODE_INTERNAL, SUBCODE_NONE))
}

fn handle_of(raw: MojoHandle) -> Handle {
    Handle(raw)
}

/// Writes `value` through `out` unless it's null. `out`, when non-null,
/// must be valid and writable for the lifetime of the call — the same
/// contract documented on every entry point that takes an `out_*`
/// pointer.
fn write_out<T>(out: *mut T, value: T) {
    if !out.is_null() {
        unsafe {
            out.write(value);
        }
    }
}

// ---- Handle table -------------------------------------------------------

/// # Safety
/// `handle` must be a value this process's [`Core`] previously returned.
#[no_mangle]
pub unsafe extern "C" fn MojoClose(handle: MojoHandle) -> MojoResultCode {
    guarded(|core| pack_result(core.close(handle_of(handle))))
}

/// # Safety
/// `out_rights` must be a valid, writable `*mut u32` or null.
#[no_mangle]
pub unsafe extern "C" fn MojoGetRights(handle: MojoHandle, out_rights: *mut u32) -> MojoResultCode {
    guarded(|core| match core.get_rights(handle_of(handle)) {
        Ok(rights) => {
            write_out(out_rights, rights.bits());
            pack_ok()
        }
        Err(err) => pack_err(err),
    })
}

/// # Safety
/// `out_handle` must be a valid, writable `*mut MojoHandle` or null.
#[no_mangle]
pub unsafe extern "C" fn MojoDuplicateHandle(handle: MojoHandle, out_handle: *mut MojoHandle) -> MojoResultCode {
    guarded(|core| match core.duplicate_handle(handle_of(handle)) {
        Ok(dup) => {
            write_out(out_handle, dup.0);
            pack_ok()
        }
        Err(err) => pack_err(err),
    })
}

/// # Safety
/// `out_handle` must be a valid, writable `*mut MojoHandle` or null.
#[no_mangle]
pub unsafe extern "C" fn MojoDuplicateHandleWithReducedRights(
    handle: MojoHandle,
    rights_to_remove: u32,
    out_handle: *mut MojoHandle,
) -> MojoResultCode {
    guarded(|core| {
        let remove = Rights::from_bits(rights_to_remove);
        match core.duplicate_handle_with_reduced_rights(handle_of(handle), remove) {
            Ok(dup) => {
                write_out(out_handle, dup.0);
                pack_ok()
            }
            Err(err) => pack_err(err),
        }
    })
}

/// # Safety
/// `out_handle` must be a valid, writable `*mut MojoHandle` or null.
#[no_mangle]
pub unsafe extern "C" fn MojoReplaceHandleWithReducedRights(
    handle: MojoHandle,
    rights_to_remove: u32,
    out_handle: *mut MojoHandle,
) -> MojoResultCode {
    guarded(|core| {
        let remove = Rights::from_bits(rights_to_remove);
        match core.replace_handle_with_reduced_rights(handle_of(handle), remove) {
            Ok(replacement) => {
                write_out(out_handle, replacement.0);
                pack_ok()
            }
            Err(err) => pack_err(err),
        }
    })
}

// ---- Wait -----------------------------------------------------------------

/// # Safety
/// `out_satisfied`/`out_satisfiable` must be valid, writable `*mut u32`
/// or null.
#[no_mangle]
pub unsafe extern "C" fn MojoWait(
    handle: MojoHandle,
    signals: u32,
    timeout: u64,
    out_satisfied: *mut u32,
    out_satisfiable: *mut u32,
) -> MojoResultCode {
    guarded(|core| {
        let signals = Signals::from_bits(signals);
        match core.wait(handle_of(handle), signals, timeout) {
            Ok(report) => {
                write_out(out_satisfied, report.state.satisfied().bits());
                write_out(out_satisfiable, report.state.satisfiable().bits());
                pack_result(report.outcome)
            }
            Err(err) => pack_err(err),
        }
    })
}

/// # Safety
/// `handles`/`signals` must point to `num_handles` readable elements;
/// `out_index` must be a valid, writable `*mut u32` or null.
#[no_mangle]
pub unsafe extern "C" fn MojoWaitMany(
    handles: *const MojoHandle,
    signals: *const u32,
    num_handles: u32,
    timeout: u64,
    out_index: *mut u32,
) -> MojoResultCode {
    guarded(|core| {
        if handles.is_null() || signals.is_null() || num_handles == 0 {
            return pack(CODE_INVALID_ARGUMENT, SUBCODE_NONE);
        }
        let (raw_handles, raw_signals) = unsafe {
            (
                std::slice::from_raw_parts(handles, num_handles as usize),
                std::slice::from_raw_parts(signals, num_handles as usize),
            )
        };
        let handles: Vec<Handle> = raw_handles.iter().map(|&h| handle_of(h)).collect();
        let parsed_signals: Vec<Signals> = raw_signals.iter().map(|&bits| Signals::from_bits(bits)).collect();
        match core.wait_many(&handles, &parsed_signals, timeout) {
            Ok(report) => {
                write_out(out_index, report.index as u32);
                pack_result(report.outcome)
            }
            Err(err) => pack_err(err),
        }
    })
}

#[no_mangle]
pub extern "C" fn MojoGetTimeTicksNow() -> u64 {
    let core = shared_core();
    catch_unwind(AssertUnwindSafe(|| core.get_time_ticks_now())).unwrap_or(0)
}

// ---- Message pipes ----------------------------------------------------------

/// # Safety
/// `out_handle0`/`out_handle1` must be valid, writable `*mut MojoHandle`.
#[no_mangle]
pub unsafe extern "C" fn MojoCreateMessagePipe(struct_size: u32, flags: u32, out_handle0: *mut MojoHandle, out_handle1: *mut MojoHandle) -> MojoResultCode {
    guarded(|core| match core.create_message_pipe(struct_size, flags) {
        Ok((h0, h1)) => {
            write_out(out_handle0, h0.0);
            write_out(out_handle1, h1.0);
            pack_ok()
        }
        Err(err) => pack_err(err),
    })
}

/// # Safety
/// `bytes` must point to `num_bytes` readable bytes (or be null when
/// `num_bytes == 0`); `handles` must point to `num_handles` readable
/// [`MojoHandle`]s (or be null when `num_handles == 0`).
#[no_mangle]
pub unsafe extern "C" fn MojoWriteMessage(
    handle: MojoHandle,
    bytes: *const u8,
    num_bytes: u32,
    handles: *const MojoHandle,
    num_handles: u32,
) -> MojoResultCode {
    guarded(|core| {
        let payload = if num_bytes == 0 || bytes.is_null() {
            Vec::new()
        } else {
            unsafe { std::slice::from_raw_parts(bytes, num_bytes as usize) }.to_vec()
        };
        let to_transfer: Vec<Handle> = if num_handles == 0 || handles.is_null() {
            Vec::new()
        } else {
            unsafe { std::slice::from_raw_parts(handles, num_handles as usize) }
                .iter()
                .map(|&h| handle_of(h))
                .collect()
        };
        pack_result(core.write_message(handle_of(handle), payload, &to_transfer))
    })
}

/// # Safety
/// `out_bytes`/`out_handles` must be writable buffers of at least
/// `byte_cap`/`handle_cap` elements; `out_num_bytes`/`out_num_handles`
/// must be valid, writable `*mut u32` or null.
#[no_mangle]
pub unsafe extern "C" fn MojoReadMessage(
    handle: MojoHandle,
    out_bytes: *mut u8,
    byte_cap: u32,
    out_num_bytes: *mut u32,
    out_handles: *mut MojoHandle,
    handle_cap: u32,
    out_num_handles: *mut u32,
    may_discard: bool,
) -> MojoResultCode {
    use crate::core::ReadMessageResult;

    guarded(|core| match core.read_message(handle_of(handle), byte_cap as usize, handle_cap as usize, may_discard) {
        Ok(ReadMessageResult::Read(msg)) => {
            write_out(out_num_bytes, msg.bytes.len() as u32);
            write_out(out_num_handles, msg.handles.len() as u32);
            unsafe {
                if !out_bytes.is_null() {
                    std::ptr::copy_nonoverlapping(msg.bytes.as_ptr(), out_bytes, msg.bytes.len());
                }
                if !out_handles.is_null() {
                    for (i, h) in msg.handles.iter().enumerate() {
                        out_handles.add(i).write(h.0);
                    }
                }
            }
            pack_ok()
        }
        Ok(ReadMessageResult::TooSmall {
            required_bytes,
            required_handles,
        }) => {
            write_out(out_num_bytes, required_bytes as u32);
            write_out(out_num_handles, required_handles as u32);
            pack(CODE_RESOURCE_EXHAUSTED, SUBCODE_NONE)
        }
        Err(err) => pack_err(err),
    })
}

// ---- Data pipes ---------------------------------------------------------

/// # Safety
/// `out_producer`/`out_consumer` must be valid, writable `*mut MojoHandle`.
#[no_mangle]
pub unsafe extern "C" fn MojoCreateDataPipe(
    struct_size: u32,
    flags: u32,
    element_size: u32,
    capacity_bytes: u32,
    out_producer: *mut MojoHandle,
    out_consumer: *mut MojoHandle,
) -> MojoResultCode {
    guarded(|core| match core.create_data_pipe(struct_size, flags, element_size, capacity_bytes) {
        Ok((producer, consumer)) => {
            write_out(out_producer, producer.0);
            write_out(out_consumer, consumer.0);
            pack_ok()
        }
        Err(err) => pack_err(err),
    })
}

/// # Safety
/// `bytes` must point to `num_bytes` readable bytes; `out_num_bytes`
/// must be a valid, writable `*mut u32` or null.
#[no_mangle]
pub unsafe extern "C" fn MojoWriteData(handle: MojoHandle, bytes: *const u8, num_bytes: *mut u32, flags: u32) -> MojoResultCode {
    guarded(|core| {
        if bytes.is_null() || num_bytes.is_null() {
            return pack(CODE_INVALID_ARGUMENT, SUBCODE_NONE);
        }
        let slice = unsafe { std::slice::from_raw_parts(bytes, *num_bytes as usize) };
        let all_or_none = flags & crate::options::data_pipe_flags::ALL_OR_NONE != 0;
        match core.write_data(handle_of(handle), slice, all_or_none) {
            Ok(written) => {
                unsafe {
                    *num_bytes = written;
                }
                pack_ok()
            }
            Err(err) => pack_err(err),
        }
    })
}

/// # Safety
/// `out_buffer`/`out_buffer_num_bytes` must be valid, writable pointers.
#[no_mangle]
pub unsafe extern "C" fn MojoBeginWriteData(handle: MojoHandle, out_buffer: *mut *mut u8, out_buffer_num_bytes: *mut u32) -> MojoResultCode {
    guarded(|core| match core.begin_write_data(handle_of(handle)) {
        Ok((_offset, len)) => {
            // No process-local address space to hand back a pointer into;
            // callers on this side use write_reserved_span/read_reserved_span
            // instead. A null buffer pointer with a populated length signals
            // "use the span API".
            write_out(out_buffer, std::ptr::null_mut());
            write_out(out_buffer_num_bytes, len as u32);
            pack_ok()
        }
        Err(err) => pack_err(err),
    })
}

#[no_mangle]
pub extern "C" fn MojoEndWriteData(handle: MojoHandle, num_bytes_written: u32) -> MojoResultCode {
    guarded(|core| pack_result(core.end_write_data(handle_of(handle), num_bytes_written as usize)))
}

/// # Safety
/// `out_buffer` must be a writable buffer of at least `*num_bytes`
/// elements; `num_bytes` must be a valid, writable `*mut u32`.
#[no_mangle]
pub unsafe extern "C" fn MojoReadData(handle: MojoHandle, out_buffer: *mut u8, num_bytes: *mut u32, flags: u32) -> MojoResultCode {
    guarded(|core| {
        if out_buffer.is_null() || num_bytes.is_null() {
            return pack(CODE_INVALID_ARGUMENT, SUBCODE_NONE);
        }
        let dst = unsafe { std::slice::from_raw_parts_mut(out_buffer, *num_bytes as usize) };
        match core.read_data(handle_of(handle), dst, flags) {
            Ok(read) => {
                unsafe {
                    *num_bytes = read;
                }
                pack_ok()
            }
            Err(err) => pack_err(err),
        }
    })
}

/// # Safety
/// `out_buffer`/`out_buffer_num_bytes` must be valid, writable pointers.
#[no_mangle]
pub unsafe extern "C" fn MojoBeginReadData(handle: MojoHandle, out_buffer: *mut *const u8, out_buffer_num_bytes: *mut u32) -> MojoResultCode {
    guarded(|core| match core.begin_read_data(handle_of(handle)) {
        Ok((_offset, len)) => {
            write_out(out_buffer, std::ptr::null());
            write_out(out_buffer_num_bytes, len as u32);
            pack_ok()
        }
        Err(err) => pack_err(err),
    })
}

#[no_mangle]
pub extern "C" fn MojoEndReadData(handle: MojoHandle, num_bytes_read: u32) -> MojoResultCode {
    guarded(|core| pack_result(core.end_read_data(handle_of(handle), num_bytes_read as usize)))
}

#[no_mangle]
pub extern "C" fn MojoSetDataPipeProducerOptions(handle: MojoHandle, struct_size: u32, write_threshold: u32) -> MojoResultCode {
    guarded(|core| pack_result(core.set_data_pipe_producer_options(handle_of(handle), struct_size, write_threshold)))
}

/// # Safety
/// `out_write_threshold` must be a valid, writable `*mut u32` or null.
#[no_mangle]
pub unsafe extern "C" fn MojoGetDataPipeProducerOptions(handle: MojoHandle, out_write_threshold: *mut u32) -> MojoResultCode {
    guarded(|core| match core.get_data_pipe_producer_options(handle_of(handle)) {
        Ok(threshold) => {
            write_out(out_write_threshold, threshold);
            pack_ok()
        }
        Err(err) => pack_err(err),
    })
}

#[no_mangle]
pub extern "C" fn MojoSetDataPipeConsumerOptions(handle: MojoHandle, struct_size: u32, read_threshold: u32) -> MojoResultCode {
    guarded(|core| pack_result(core.set_data_pipe_consumer_options(handle_of(handle), struct_size, read_threshold)))
}

/// # Safety
/// `out_read_threshold` must be a valid, writable `*mut u32` or null.
#[no_mangle]
pub unsafe extern "C" fn MojoGetDataPipeConsumerOptions(handle: MojoHandle, out_read_threshold: *mut u32) -> MojoResultCode {
    guarded(|core| match core.get_data_pipe_consumer_options(handle_of(handle)) {
        Ok(threshold) => {
            write_out(out_read_threshold, threshold);
            pack_ok()
        }
        Err(err) => pack_err(err),
    })
}

// ---- Shared buffers -----------------------------------------------------

/// # Safety
/// `out_handle` must be a valid, writable `*mut MojoHandle`.
#[no_mangle]
pub unsafe extern "C" fn MojoCreateSharedBuffer(struct_size: u32, flags: u32, num_bytes: u64, out_handle: *mut MojoHandle) -> MojoResultCode {
    guarded(|core| match core.create_shared_buffer(struct_size, flags, num_bytes as usize) {
        Ok(handle) => {
            write_out(out_handle, handle.0);
            pack_ok()
        }
        Err(err) => pack_err(err),
    })
}

/// # Safety
/// `out_handle` must be a valid, writable `*mut MojoHandle`.
#[no_mangle]
pub unsafe extern "C" fn MojoDuplicateBufferHandle(handle: MojoHandle, struct_size: u32, flags: u32, out_handle: *mut MojoHandle) -> MojoResultCode {
    guarded(|core| match core.duplicate_buffer_handle(handle_of(handle), struct_size, flags) {
        Ok(dup) => {
            write_out(out_handle, dup.0);
            pack_ok()
        }
        Err(err) => pack_err(err),
    })
}

/// # Safety
/// `out_map_id` must be a valid, writable `*mut u64`. There is no
/// process address space to map into on this side of the boundary, so
/// this hands back an opaque mapping id rather than a pointer — see the
/// `MapId` deviation noted in `DESIGN.md`.
#[no_mangle]
pub unsafe extern "C" fn MojoMapBuffer(handle: MojoHandle, offset: u64, num_bytes: u64, flags: u32, out_map_id: *mut u64) -> MojoResultCode {
    guarded(|core| {
        let writable = flags != 0;
        match core.map_buffer(handle_of(handle), offset as usize, num_bytes as usize, writable) {
            Ok(id) => {
                write_out(out_map_id, id.raw());
                pack_ok()
            }
            Err(err) => pack_err(err),
        }
    })
}

#[no_mangle]
pub extern "C" fn MojoUnmapBuffer(handle: MojoHandle, map_id: u64) -> MojoResultCode {
    guarded(|core| pack_result(core.unmap_buffer(handle_of(handle), crate::dispatcher::shared_buffer::MapId::from_raw(map_id))))
}

/// # Safety
/// `out_num_bytes` must be a valid, writable `*mut u64` or null.
#[no_mangle]
pub unsafe extern "C" fn MojoGetBufferInformation(handle: MojoHandle, out_num_bytes: *mut u64) -> MojoResultCode {
    guarded(|core| match core.get_buffer_information(handle_of(handle)) {
        Ok(info) => {
            write_out(out_num_bytes, info.num_bytes as u64);
            pack_ok()
        }
        Err(err) => pack_err(err),
    })
}

// ---- Events and event pairs ----------------------------------------------

/// # Safety
/// `out_handle` must be a valid, writable `*mut MojoHandle`.
#[no_mangle]
pub unsafe extern "C" fn MojoCreateEvent(struct_size: u32, flags: u32, out_handle: *mut MojoHandle) -> MojoResultCode {
    guarded(|core| match core.create_event(struct_size, flags) {
        Ok(handle) => {
            write_out(out_handle, handle.0);
            pack_ok()
        }
        Err(err) => pack_err(err),
    })
}

#[no_mangle]
pub extern "C" fn MojoEventSignal(handle: MojoHandle, clear: u32, set: u32) -> MojoResultCode {
    guarded(|core| {
        let clear = Signals::from_bits(clear);
        let set = Signals::from_bits(set);
        pack_result(core.signal(handle_of(handle), clear, set))
    })
}

/// # Safety
/// `out_handle0`/`out_handle1` must be valid, writable `*mut MojoHandle`.
#[no_mangle]
pub unsafe extern "C" fn MojoCreateEventPair(struct_size: u32, flags: u32, out_handle0: *mut MojoHandle, out_handle1: *mut MojoHandle) -> MojoResultCode {
    guarded(|core| match core.create_event_pair(struct_size, flags) {
        Ok((h0, h1)) => {
            write_out(out_handle0, h0.0);
            write_out(out_handle1, h1.0);
            pack_ok()
        }
        Err(err) => pack_err(err),
    })
}

#[no_mangle]
pub extern "C" fn MojoSignal(handle: MojoHandle, clear: u32, set: u32) -> MojoResultCode {
    MojoEventSignal(handle, clear, set)
}

// ---- Wait sets ------------------------------------------------------------

/// # Safety
/// `out_handle` must be a valid, writable `*mut MojoHandle`.
#[no_mangle]
pub unsafe extern "C" fn MojoCreateWaitSet(struct_size: u32, flags: u32, out_handle: *mut MojoHandle) -> MojoResultCode {
    guarded(|core| match core.create_wait_set(struct_size, flags) {
        Ok(handle) => {
            write_out(out_handle, handle.0);
            pack_ok()
        }
        Err(err) => pack_err(err),
    })
}

#[no_mangle]
pub extern "C" fn MojoWaitSetAdd(wait_set: MojoHandle, member: MojoHandle, signals: u32, struct_size: u32, flags: u32, cookie: u64) -> MojoResultCode {
    guarded(|core| {
        let signals = Signals::from_bits(signals);
        pack_result(core.wait_set_add(handle_of(wait_set), handle_of(member), signals, struct_size, flags, cookie))
    })
}

#[no_mangle]
pub extern "C" fn MojoWaitSetRemove(wait_set: MojoHandle, cookie: u64) -> MojoResultCode {
    guarded(|core| pack_result(core.wait_set_remove(handle_of(wait_set), cookie)))
}

/// One drained result slot, as the ABI reports it.
#[repr(C)]
pub struct MojoWaitSetResult {
    pub cookie: u64,
    pub result: MojoResultCode,
}

/// # Safety
/// `out_results` must be a writable buffer of at least `*capacity`
/// elements; `capacity` and `out_max_results` must be valid, writable
/// pointers.
#[no_mangle]
pub unsafe extern "C" fn MojoWaitSetWait(wait_set: MojoHandle, timeout: u64, out_results: *mut MojoWaitSetResult, capacity: *mut u32, out_max_results: *mut u32) -> MojoResultCode {
    guarded(|core| {
        if capacity.is_null() {
            return pack(CODE_INVALID_ARGUMENT, SUBCODE_NONE);
        }
        let cap = unsafe { *capacity as usize };
        match core.wait_set_wait(handle_of(wait_set), timeout, cap) {
            Ok((results, total)) => {
                unsafe {
                    if !out_results.is_null() {
                        for (i, (cookie, outcome, _state)) in results.iter().enumerate() {
                            out_results.add(i).write(MojoWaitSetResult {
                                cookie: *cookie,
                                result: pack_result(*outcome),
                            });
                        }
                    }
                    *capacity = results.len() as u32;
                }
                write_out(out_max_results, total as u32);
                pack_ok()
            }
            Err(err) => pack_err(err),
        }
    })
}

/// ABI-frozen thunk table: one function pointer per entry point above, in
/// the order they're grouped by the handle table/wait/message
/// pipe/data pipe/shared buffer/event/wait-set sections. Prefixed with
/// its own `size` so a dynamically loaded module can check which
/// entries it may call. New entry points only ever append to the end.
#[repr(C)]
pub struct MojoCoreThunks {
    pub size: usize,
    pub close: unsafe extern "C" fn(MojoHandle) -> MojoResultCode,
    pub get_rights: unsafe extern "C" fn(MojoHandle, *mut u32) -> MojoResultCode,
    pub duplicate_handle: unsafe extern "C" fn(MojoHandle, *mut MojoHandle) -> MojoResultCode,
    pub duplicate_handle_with_reduced_rights: unsafe extern "C" fn(MojoHandle, u32, *mut MojoHandle) -> MojoResultCode,
    pub replace_handle_with_reduced_rights: unsafe extern "C" fn(MojoHandle, u32, *mut MojoHandle) -> MojoResultCode,
    pub wait: unsafe extern "C" fn(MojoHandle, u32, u64, *mut u32, *mut u32) -> MojoResultCode,
    pub wait_many: unsafe extern "C" fn(*const MojoHandle, *const u32, u32, u64, *mut u32) -> MojoResultCode,
    pub get_time_ticks_now: extern "C" fn() -> u64,
    pub create_message_pipe: unsafe extern "C" fn(u32, u32, *mut MojoHandle, *mut MojoHandle) -> MojoResultCode,
    pub write_message: unsafe extern "C" fn(MojoHandle, *const u8, u32, *const MojoHandle, u32) -> MojoResultCode,
    pub read_message: unsafe extern "C" fn(MojoHandle, *mut u8, u32, *mut u32, *mut MojoHandle, u32, *mut u32, bool) -> MojoResultCode,
    pub create_data_pipe: unsafe extern "C" fn(u32, u32, u32, u32, *mut MojoHandle, *mut MojoHandle) -> MojoResultCode,
    pub write_data: unsafe extern "C" fn(MojoHandle, *const u8, *mut u32, u32) -> MojoResultCode,
    pub begin_write_data: unsafe extern "C" fn(MojoHandle, *mut *mut u8, *mut u32) -> MojoResultCode,
    pub end_write_data: extern "C" fn(MojoHandle, u32) -> MojoResultCode,
    pub read_data: unsafe extern "C" fn(MojoHandle, *mut u8, *mut u32, u32) -> MojoResultCode,
    pub begin_read_data: unsafe extern "C" fn(MojoHandle, *mut *const u8, *mut u32) -> MojoResultCode,
    pub end_read_data: extern "C" fn(MojoHandle, u32) -> MojoResultCode,
    pub set_data_pipe_producer_options: extern "C" fn(MojoHandle, u32, u32) -> MojoResultCode,
    pub set_data_pipe_consumer_options: extern "C" fn(MojoHandle, u32, u32) -> MojoResultCode,
    pub get_data_pipe_producer_options: unsafe extern "C" fn(MojoHandle, *mut u32) -> MojoResultCode,
    pub get_data_pipe_consumer_options: unsafe extern "C" fn(MojoHandle, *mut u32) -> MojoResultCode,
    pub create_shared_buffer: unsafe extern "C" fn(u32, u32, u64, *mut MojoHandle) -> MojoResultCode,
    pub duplicate_buffer_handle: unsafe extern "C" fn(MojoHandle, u32, u32, *mut MojoHandle) -> MojoResultCode,
    pub map_buffer: unsafe extern "C" fn(MojoHandle, u64, u64, u32, *mut u64) -> MojoResultCode,
    pub unmap_buffer: extern "C" fn(MojoHandle, u64) -> MojoResultCode,
    pub get_buffer_information: unsafe extern "C" fn(MojoHandle, *mut u64) -> MojoResultCode,
    pub create_event: unsafe extern "C" fn(u32, u32, *mut MojoHandle) -> MojoResultCode,
    pub event_signal: extern "C" fn(MojoHandle, u32, u32) -> MojoResultCode,
    pub create_event_pair: unsafe extern "C" fn(u32, u32, *mut MojoHandle, *mut MojoHandle) -> MojoResultCode,
    pub signal: extern "C" fn(MojoHandle, u32, u32) -> MojoResultCode,
    pub create_wait_set: unsafe extern "C" fn(u32, u32, *mut MojoHandle) -> MojoResultCode,
    pub wait_set_add: extern "C" fn(MojoHandle, MojoHandle, u32, u32, u32, u64) -> MojoResultCode,
    pub wait_set_remove: extern "C" fn(MojoHandle, u64) -> MojoResultCode,
    pub wait_set_wait: unsafe extern "C" fn(MojoHandle, u64, *mut MojoWaitSetResult, *mut u32, *mut u32) -> MojoResultCode,
}

/// Returns the thunk table for the ABI version this binary was built
/// with, for an embedder that wants to rebind against this
/// implementation dynamically.
pub fn thunk_table() -> MojoCoreThunks {
    MojoCoreThunks {
        size: std::mem::size_of::<MojoCoreThunks>(),
        close: MojoClose,
        get_rights: MojoGetRights,
        duplicate_handle: MojoDuplicateHandle,
        duplicate_handle_with_reduced_rights: MojoDuplicateHandleWithReducedRights,
        replace_handle_with_reduced_rights: MojoReplaceHandleWithReducedRights,
        wait: MojoWait,
        wait_many: MojoWaitMany,
        get_time_ticks_now: MojoGetTimeTicksNow,
        create_message_pipe: MojoCreateMessagePipe,
        write_message: MojoWriteMessage,
        read_message: MojoReadMessage,
        create_data_pipe: MojoCreateDataPipe,
        write_data: MojoWriteData,
        begin_write_data: MojoBeginWriteData,
        end_write_data: MojoEndWriteData,
        read_data: MojoReadData,
        begin_read_data: MojoBeginReadData,
        end_read_data: MojoEndReadData,
        set_data_pipe_producer_options: MojoSetDataPipeProducerOptions,
        set_data_pipe_consumer_options: MojoSetDataPipeConsumerOptions,
        get_data_pipe_producer_options: MojoGetDataPipeProducerOptions,
        get_data_pipe_consumer_options: MojoGetDataPipeConsumerOptions,
        create_shared_buffer: MojoCreateSharedBuffer,
        duplicate_buffer_handle: MojoDuplicateBufferHandle,
        map_buffer: MojoMapBuffer,
        unmap_buffer: MojoUnmapBuffer,
        get_buffer_information: MojoGetBufferInformation,
        create_event: MojoCreateEvent,
        event_signal: MojoEventSignal,
        create_event_pair: MojoCreateEventPair,
        signal: MojoSignal,
        create_wait_set: MojoCreateWaitSet,
        wait_set_add: MojoWaitSetAdd,
        wait_set_remove: MojoWaitSetRemove,
        wait_set_wait: MojoWaitSetWait,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ok_packs_to_all_zero_code_and_subcode() {
        assert_eq!(pack_ok() & 0xFF, 0);
        assert_eq!(pack_ok() >> 24, 0);
    }

    #[test]
    fn busy_carries_failed_precondition_with_subcode() {
        let packed = pack_err(MojoError::Busy);
        assert_eq!(packed & 0xFF, CODE_FAILED_PRECONDITION as u32);
        assert_eq!(packed >> 24, SUBCODE_BUSY as u32);
    }

    #[test]
    fn should_wait_carries_unavailable_with_subcode() {
        let packed = pack_err(MojoError::ShouldWait);
        assert_eq!(packed & 0xFF, CODE_UNAVAILABLE as u32);
        assert_eq!(packed >> 24, SUBCODE_SHOULD_WAIT as u32);
    }

    #[test]
    fn round_trip_message_pipe_through_the_abi() {
        let mut h0 = 0u32;
        let mut h1 = 0u32;
        unsafe {
            assert_eq!(MojoCreateMessagePipe(8, 0, &mut h0, &mut h1), pack_ok());
            let payload = b"hi";
            assert_eq!(MojoWriteMessage(h0, payload.as_ptr(), payload.len() as u32, std::ptr::null(), 0), pack_ok());

            let mut buf = [0u8; 8];
            let mut num_bytes = buf.len() as u32;
            let mut num_handles = 0u32;
            let result = MojoReadMessage(h1, buf.as_mut_ptr(), buf.len() as u32, &mut num_bytes, std::ptr::null_mut(), 0, &mut num_handles, false);
            assert_eq!(result, pack_ok());
            assert_eq!(num_bytes, 2);
            assert_eq!(&buf[..2], payload);
        }
    }

    #[test]
    fn thunk_table_size_matches_struct_layout() {
        let table = thunk_table();
        assert_eq!(table.size, std::mem::size_of::<MojoCoreThunks>());
    }
}
