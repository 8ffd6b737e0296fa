//! Foundation types for the shipyard deployment worker.
//!
//! This crate provides the task, status, and result types exchanged between
//! the worker and the task queue, plus the closed exit-code vocabulary that
//! every spawned process is interpreted through. Every other shipyard crate
//! depends on `shipyard-types`.
//!
//! # Key Types
//!
//! - [`Task`]: A unit of work pulled from the queue (migration, merge, branch creation)
//! - [`MigrationStatus`]: Lifecycle states reported for a hard migration
//! - [`LogChunk`]: A windowed slice of migration output
//! - [`MergeTaskResult`]: Structured outcome of a merge task
//! - [`Disposition`]: Terminal answer a handler gives the queue for a task
//! - [`ExitOutcome`]: Exit codes mapped onto their domain meaning

pub mod error;
pub mod outcome;
pub mod status;
pub mod task;
pub mod text;

pub use error::TypeError;
pub use outcome::{
    ExitOutcome, EXIT_CONFLICT, EXIT_NOT_READY, EXIT_REMOTE_INCONSISTENT, EXIT_STOP, EXIT_SUCCESS,
};
pub use status::{LogChunk, MigrationStatus, StatusUpdate};
pub use task::{
    CreateBranchTask, Disposition, MergeTask, MergeTaskResult, MigrationTask, Task, TaskKind,
};
pub use text::{tail, LOG_LAG_TIME, MAX_LOG_LENGTH};
