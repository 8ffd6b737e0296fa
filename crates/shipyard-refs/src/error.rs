//! Error types for branch policy operations.

use thiserror::Error;

/// Errors that can occur while checking branch names.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum RefError {
    /// The branch name is not acceptable as a git ref or argument.
    #[error("invalid branch name: {name}: {reason}")]
    InvalidBranchName { name: String, reason: String },
}

/// Convenience type alias for branch policy operations.
pub type Result<T> = std::result::Result<T, RefError>;
