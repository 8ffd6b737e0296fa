use thiserror::Error;

/// Errors produced by type operations.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum TypeError {
    #[error("unknown migration status: {0}")]
    UnknownStatus(String),

    #[error("unknown task kind: {0}")]
    UnknownTaskKind(String),
}
