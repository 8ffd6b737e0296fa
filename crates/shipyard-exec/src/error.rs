//! Error types for process execution.

use std::io;
use std::time::Duration;

use shipyard_types::ExitOutcome;
use thiserror::Error;

/// Errors that can occur while running an external command.
#[derive(Debug, Error)]
pub enum ProcessError {
    /// The program could not be started.
    #[error("failed to spawn {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: io::Error,
    },

    /// The command exited with a non-zero code in strict mode.
    #[error("command `{command}` exited with code {code}")]
    NonZeroExit {
        command: String,
        code: i32,
        output: String,
    },

    /// The command outlived its deadline and was killed.
    #[error("command `{command}` timed out after {after:?}")]
    TimedOut {
        command: String,
        after: Duration,
        output: String,
    },

    /// I/O error while waiting on the child.
    #[error("io error: {0}")]
    Io(#[from] io::Error),
}

impl ProcessError {
    /// The exit code, if the command ran to completion.
    pub fn exit_code(&self) -> Option<i32> {
        match self {
            Self::NonZeroExit { code, .. } => Some(*code),
            _ => None,
        }
    }

    /// Classified exit code, if the command ran to completion.
    pub fn outcome(&self) -> Option<ExitOutcome> {
        self.exit_code().map(ExitOutcome::from_code)
    }

    /// Combined output captured before the failure, or the error text when
    /// nothing was captured.
    pub fn output(&self) -> String {
        match self {
            Self::NonZeroExit { output, .. } | Self::TimedOut { output, .. } => output.clone(),
            other => other.to_string(),
        }
    }
}

/// Convenience type alias for process operations.
pub type Result<T> = std::result::Result<T, ProcessError>;
