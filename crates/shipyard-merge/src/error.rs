//! Error types for the merge engine.

use std::io;
use std::path::PathBuf;

use shipyard_exec::ProcessError;
use shipyard_gate::GateError;
use shipyard_refs::RefError;
use thiserror::Error;

/// Errors that can occur while preparing or running a merge.
#[derive(Debug, Error)]
pub enum MergeError {
    /// A git or helper command failed.
    #[error(transparent)]
    Process(#[from] ProcessError),

    /// A repository could not be cloned into the workspace.
    #[error("failed to bootstrap repository {repository}: {source}")]
    Workspace {
        repository: String,
        #[source]
        source: ProcessError,
    },

    /// The list of tracked repositories could not be loaded.
    #[error("repository catalog error: {0}")]
    Catalog(String),

    /// The publish gate could not be obtained.
    #[error(transparent)]
    Gate(#[from] GateError),

    /// A task-supplied branch name was rejected.
    #[error(transparent)]
    Ref(#[from] RefError),

    /// A branch creation task named no source branch.
    #[error("empty source branch, can't create branch {branch} from empty")]
    EmptySource { branch: String },

    /// Filesystem error inside the workspace.
    #[error("io error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

impl MergeError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// Command output attached to the error, or its message.
    pub fn output(&self) -> String {
        match self {
            Self::Process(err) => err.output(),
            other => other.to_string(),
        }
    }
}

/// Convenience type alias for merge operations.
pub type Result<T> = std::result::Result<T, MergeError>;
