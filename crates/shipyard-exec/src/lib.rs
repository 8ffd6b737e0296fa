//! External process execution for the shipyard worker.
//!
//! Every external operation the worker performs (git, migration scripts,
//! training scripts) goes through a [`CommandRunner`]. Commands are built as
//! argument vectors ([`CommandSpec`]); nothing is ever interpolated into a
//! shell string.
//!
//! # Modules
//!
//! - [`error`]: [`ProcessError`], including the non-zero exit failure
//! - [`command`]: [`CommandSpec`], an argument vector plus working directory
//! - [`sink`]: The [`OutputSink`] trait receiving live combined output
//! - [`runner`]: [`CommandRunner`], [`ExecMode`], and the OS-backed [`SystemRunner`]
//! - [`stream`]: [`LogStreamBuffer`], the time-windowed chunking sink
//! - [`decode`]: Incremental UTF-8 decoding of pipe reads
//! - [`scripted`]: [`ScriptedRunner`], a replaying runner for tests

pub mod command;
pub mod decode;
pub mod error;
pub mod runner;
pub mod scripted;
pub mod sink;
pub mod stream;

pub use command::CommandSpec;
pub use decode::Utf8Stream;
pub use error::{ProcessError, Result};
pub use runner::{CommandRunner, ExecMode, ProcessOutput, SystemRunner};
pub use scripted::{ScriptedReply, ScriptedRunner};
pub use sink::{NullSink, OutputSink};
pub use stream::LogStreamBuffer;
