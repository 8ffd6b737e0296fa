use std::io;
use std::path::PathBuf;

/// Errors that can occur while acquiring an exclusive gate.
#[derive(Debug, thiserror::Error)]
pub enum GateError {
    /// The lock directory or lock file could not be prepared.
    #[error("io error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// The lock itself could not be obtained.
    #[error("failed to lock gate '{name}': {source}")]
    LockFailed {
        name: String,
        #[source]
        source: io::Error,
    },

    /// The gate name cannot be used as a lock file name.
    #[error("invalid gate name {0:?}")]
    InvalidName(String),
}

/// Convenience type alias for gate operations.
pub type Result<T> = std::result::Result<T, GateError>;
