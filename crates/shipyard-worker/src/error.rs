//! Error types for the task worker.

use std::io;
use std::path::PathBuf;

use shipyard_exec::ProcessError;
use shipyard_merge::MergeError;
use shipyard_queue::QueueError;
use thiserror::Error;

/// Errors loading or validating the worker configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("failed to parse config {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    #[error("invalid config: {0}")]
    Invalid(String),
}

/// Errors raised while running the worker or handling a task.
#[derive(Debug, Error)]
pub enum WorkerError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Queue(#[from] QueueError),

    #[error(transparent)]
    Merge(#[from] MergeError),

    #[error(transparent)]
    Process(#[from] ProcessError),

    /// The task carries values that cannot be used safely.
    #[error("invalid task: {0}")]
    InvalidTask(String),
}

/// Convenience type alias for worker operations.
pub type Result<T> = std::result::Result<T, WorkerError>;
