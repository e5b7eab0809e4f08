//! Options-struct validation.
//!
//! Every `Create*`/`SetDataPipe*Options` call takes a length-prefixed
//! options struct: the core accepts any `struct_size` at or above the
//! size it knows about (treating extra trailing bytes as reserved for
//! a future field) but rejects an unknown bit set in `flags` with
//! `UNIMPLEMENTED`. [`validate_header`] is the one shared check every
//! options type in this module runs through, validating its `flags`
//! field against a fixed, all-bits-assigned mask.

use crate::error::{MojoError, MojoResult};

/// Checks `struct_size` against the smallest struct this crate knows
/// about, and `flags` against the bits this crate recognizes.
pub fn validate_header(struct_size: u32, known_size: u32, flags: u32, known_flags: u32) -> MojoResult<()> {
    if struct_size < known_size {
        return Err(MojoError::InvalidArgument);
    }
    if flags & !known_flags != 0 {
        return Err(MojoError::Unimplemented);
    }
    Ok(())
}

/// `{ flags: NONE }` for `CreateMessagePipe`.
pub const MESSAGE_PIPE_CREATE_OPTIONS_SIZE: u32 = 8;

pub fn validate_message_pipe_create_options(struct_size: u32, flags: u32) -> MojoResult<()> {
    validate_header(struct_size, MESSAGE_PIPE_CREATE_OPTIONS_SIZE, flags, 0)
}

/// `CreateDataPipe`'s `{ flags: NONE, element_size, capacity }`.
pub const DATA_PIPE_CREATE_OPTIONS_SIZE: u32 = 16;

#[derive(Debug)]
pub struct DataPipeCreateOptions {
    pub element_size: u32,
    /// `0` means "implementation-chosen default"
    /// ([`crate::limits::DEFAULT_DATA_PIPE_CAPACITY_BYTES`]).
    pub capacity_bytes: u32,
}

pub fn validate_data_pipe_create_options(
    struct_size: u32,
    flags: u32,
    element_size: u32,
    capacity_bytes: u32,
) -> MojoResult<DataPipeCreateOptions> {
    validate_header(struct_size, DATA_PIPE_CREATE_OPTIONS_SIZE, flags, 0)?;
    if element_size == 0 {
        return Err(MojoError::InvalidArgument);
    }
    if capacity_bytes != 0 && capacity_bytes % element_size != 0 {
        return Err(MojoError::InvalidArgument);
    }
    Ok(DataPipeCreateOptions { element_size, capacity_bytes })
}

/// `DataPipeProducerOptions`'s `{ write_threshold }`.
pub const DATA_PIPE_PRODUCER_OPTIONS_SIZE: u32 = 8;

pub fn validate_data_pipe_producer_options(struct_size: u32, write_threshold: u32) -> MojoResult<u32> {
    if struct_size < DATA_PIPE_PRODUCER_OPTIONS_SIZE {
        return Err(MojoError::InvalidArgument);
    }
    Ok(write_threshold)
}

/// `DataPipeConsumerOptions`'s `{ read_threshold }`.
pub const DATA_PIPE_CONSUMER_OPTIONS_SIZE: u32 = 8;

pub fn validate_data_pipe_consumer_options(struct_size: u32, read_threshold: u32) -> MojoResult<u32> {
    if struct_size < DATA_PIPE_CONSUMER_OPTIONS_SIZE {
        return Err(MojoError::InvalidArgument);
    }
    Ok(read_threshold)
}

/// `{ flags: NONE }` for `CreateSharedBuffer`.
pub const SHARED_BUFFER_CREATE_OPTIONS_SIZE: u32 = 8;

pub fn validate_shared_buffer_create_options(struct_size: u32, flags: u32) -> MojoResult<()> {
    validate_header(struct_size, SHARED_BUFFER_CREATE_OPTIONS_SIZE, flags, 0)
}

/// `{ flags: NONE }` for `DuplicateBufferHandle`.
pub const DUPLICATE_BUFFER_HANDLE_OPTIONS_SIZE: u32 = 8;

pub fn validate_duplicate_buffer_handle_options(struct_size: u32, flags: u32) -> MojoResult<()> {
    validate_header(struct_size, DUPLICATE_BUFFER_HANDLE_OPTIONS_SIZE, flags, 0)
}

/// `{ flags: NONE }`, shared by `CreateEvent`/`CreateEventPair`/`CreateWaitSet`.
pub const SIGNAL_DISPATCHER_CREATE_OPTIONS_SIZE: u32 = 8;

pub fn validate_signal_dispatcher_create_options(struct_size: u32, flags: u32) -> MojoResult<()> {
    validate_header(struct_size, SIGNAL_DISPATCHER_CREATE_OPTIONS_SIZE, flags, 0)
}

/// `{ flags: NONE }` for `WaitSetAdd`.
pub const WAIT_SET_ADD_OPTIONS_SIZE: u32 = 8;

pub fn validate_wait_set_add_options(struct_size: u32, flags: u32) -> MojoResult<()> {
    validate_header(struct_size, WAIT_SET_ADD_OPTIONS_SIZE, flags, 0)
}

/// Recognized `ReadData`/`WriteData` flag bits; mutually
/// exclusive among `PEEK`/`DISCARD`/`QUERY`, checked by the caller.
pub mod data_pipe_flags {
    pub const ALL_OR_NONE: u32 = 1 << 0;
    pub const DISCARD: u32 = 1 << 1;
    pub const QUERY: u32 = 1 << 2;
    pub const PEEK: u32 = 1 << 3;

    pub const KNOWN: u32 = ALL_OR_NONE | DISCARD | QUERY | PEEK;
}

/// `ReadMessage`'s `MAY_DISCARD` flag.
pub mod message_flags {
    pub const MAY_DISCARD: u32 = 1 << 0;

    pub const KNOWN: u32 = MAY_DISCARD;
}
