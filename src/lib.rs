//! A capability-based, in-process kernel of handle-addressed IPC
//! primitives: message pipes, data pipes, shared buffers, events, event
//! pairs and wait sets, all backed by one process-wide handle table and
//! a uniform signal/wait mechanism.
//!
//! [`Core`] is the single entry point: every operation (`CreateMessagePipe`,
//! `WriteMessage`, `Wait`, ...) is a method on it, taking and returning
//! plain [`Handle`] values. Nothing here assumes an async runtime —
//! blocking calls park the calling thread on a [`std::sync::Condvar`],
//! the same way a thread would block on a real kernel primitive.
//!
//! ```
//! use mojo_core::{Core, Signals, WAIT_INDEFINITE};
//!
//! let core = Core::new();
//! let (a, b) = core.create_message_pipe(8, 0).unwrap();
//! core.write_message(a, b"hello".to_vec(), &[]).unwrap();
//!
//! let report = core.wait(b, Signals::READABLE, WAIT_INDEFINITE).unwrap();
//! assert!(report.outcome.is_ok());
//! ```
//!
//! # Features
//!
//! For documentation of features see the [`features`] module.

#![warn(rust_2018_idioms)]

mod clock;
mod core;
mod dispatcher;
mod error;
mod handle;
mod handle_table;
mod limits;
mod options;
mod rights;
mod ring;
mod signals;
mod waiter;

#[cfg(feature = "ffi")]
pub mod ffi;

pub use crate::clock::{Clock, FakeClock, SystemClock, TimeTicks, INDEFINITE};
pub use crate::core::{
    BufferInfo, Core, ReadMessageOutcome, ReadMessageResult, WaitManyReport, WaitReport, WAIT_INDEFINITE,
};
pub use crate::dispatcher::shared_buffer::MapId;
pub use crate::error::{MojoError, MojoResult};
pub use crate::handle::Handle;
pub use crate::limits::Limits;
pub use crate::options::{data_pipe_flags, message_flags};
pub use crate::rights::Rights;
pub use crate::signals::{Signals, SignalsState};

/// Documents the Cargo features this crate defines; there is no runtime
/// behavior here, only doc comments `cargo doc` can render.
///
/// ### `log`
///
/// Enabled by default. Routes diagnostic trace/debug messages through
/// the [`log`] crate's global logger instead of doing nothing; disabling
/// it drops the logging calls at compile time rather than at runtime.
///
/// ### `ffi`
///
/// Exposes the [`crate::ffi`] module: a `#[no_mangle]` C ABI surface
/// over one process-wide [`Core`], for embedding this kernel in a
/// process that otherwise runs non-Rust code.
pub mod features {}
