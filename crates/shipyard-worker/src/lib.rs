//! Task worker for shipyard.
//!
//! A worker instance runs in one [`Role`]. It blocks on the task queue,
//! hands each task to the registered [`TaskHandler`], and settles the
//! delivery with the handler's [`Disposition`](shipyard_types::Disposition).
//! Handler errors never stop the loop: the task is accepted and the error
//! logged.
//!
//! # Modules
//!
//! - [`worker`]: [`TaskWorkerLoop`], [`TaskHandler`], [`Role`]
//! - [`migration`]: [`MigrationHandler`] for hard migrations
//! - [`merge`]: [`MergeHandler`] for merge and branch creation tasks
//! - [`status`]: [`StatusTracker`], which refuses statuses after a terminal one
//! - [`locator`]: [`ScriptLocator`], three-tier migration script resolution
//! - [`config`]: [`WorkerConfig`], loaded from TOML
//! - [`error`]: Error types

pub mod config;
pub mod error;
pub mod locator;
pub mod merge;
pub mod migration;
pub mod status;
pub mod worker;

pub use config::{parse_list, MigrationConfig, WorkerConfig};
pub use error::{ConfigError, Result, WorkerError};
pub use locator::{ScriptLocator, ScriptPaths};
pub use merge::MergeHandler;
pub use migration::{migration_argument, MigrationHandler, MigrationSettings};
pub use status::StatusTracker;
pub use worker::{Role, TaskHandler, TaskWorkerLoop, WorkerStats};
