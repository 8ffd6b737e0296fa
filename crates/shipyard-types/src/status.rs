use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::TypeError;
use crate::outcome::ExitOutcome;

// ---------------------------------------------------------------------------
// MigrationStatus
// ---------------------------------------------------------------------------

/// Lifecycle state of a hard migration as reported to the queue.
///
/// Progression is one-way per task instance, except that `New` may follow
/// `Process` when the migration reports it is not ready yet. Nothing is
/// emitted after a terminal state.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MigrationStatus {
    New,
    Process,
    Done,
    Stopped,
    Failed,
}

impl MigrationStatus {
    /// Map the exit outcome of a migration script onto the status to emit.
    ///
    /// Total over all outcomes: a merge-style conflict code means nothing
    /// to a migration and is reported as a failure like any other code.
    pub fn from_outcome(outcome: ExitOutcome) -> Self {
        match outcome {
            ExitOutcome::Success => Self::Done,
            ExitOutcome::Stop => Self::Stopped,
            ExitOutcome::NotReady => Self::New,
            ExitOutcome::Conflict | ExitOutcome::Failure(_) => Self::Failed,
        }
    }

    /// Returns `true` if the status ends the task's status stream.
    ///
    /// `New` counts as terminal for the task instance that reported it: the
    /// migration goes back to the scheduler and a fresh task is issued.
    pub fn is_terminal(&self) -> bool {
        !matches!(self, Self::Process)
    }

    /// Wire name of the status.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::New => "new",
            Self::Process => "process",
            Self::Done => "done",
            Self::Stopped => "stopped",
            Self::Failed => "failed",
        }
    }
}

impl fmt::Display for MigrationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MigrationStatus {
    type Err = TypeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "new" => Ok(Self::New),
            "process" => Ok(Self::Process),
            "done" => Ok(Self::Done),
            "stopped" => Ok(Self::Stopped),
            "failed" => Ok(Self::Failed),
            other => Err(TypeError::UnknownStatus(other.to_string())),
        }
    }
}

// ---------------------------------------------------------------------------
// StatusUpdate / LogChunk
// ---------------------------------------------------------------------------

/// A status report for one migration.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusUpdate {
    /// Migration identifier the status belongs to.
    pub migration: String,
    pub status: MigrationStatus,
    /// Failure text (retained output tail or error message).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
}

impl StatusUpdate {
    pub fn new(migration: impl Into<String>, status: MigrationStatus) -> Self {
        Self {
            migration: migration.into(),
            status,
            text: None,
        }
    }

    /// Attach failure text to the update.
    pub fn with_text(mut self, text: impl Into<String>) -> Self {
        self.text = Some(text.into());
        self
    }
}

/// A slice of live migration output, emitted at most once per chunk window.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogChunk {
    pub migration: String,
    pub text: String,
}

impl LogChunk {
    pub fn new(migration: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            migration: migration.into(),
            text: text.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn reserved_outcomes_map_to_statuses() {
        assert_eq!(MigrationStatus::from_outcome(ExitOutcome::Success), MigrationStatus::Done);
        assert_eq!(MigrationStatus::from_outcome(ExitOutcome::Stop), MigrationStatus::Stopped);
        assert_eq!(MigrationStatus::from_outcome(ExitOutcome::NotReady), MigrationStatus::New);
        assert_eq!(MigrationStatus::from_outcome(ExitOutcome::Conflict), MigrationStatus::Failed);
    }

    #[test]
    fn only_process_is_non_terminal() {
        assert!(!MigrationStatus::Process.is_terminal());
        for status in [
            MigrationStatus::New,
            MigrationStatus::Done,
            MigrationStatus::Stopped,
            MigrationStatus::Failed,
        ] {
            assert!(status.is_terminal(), "{status} should be terminal");
        }
    }

    #[test]
    fn status_parses_from_wire_name() {
        assert_eq!("stopped".parse::<MigrationStatus>().unwrap(), MigrationStatus::Stopped);
        assert!("paused".parse::<MigrationStatus>().is_err());
    }

    #[test]
    fn status_update_serializes_lowercase() {
        let update = StatusUpdate::new("m1", MigrationStatus::Failed).with_text("boom");
        let json = serde_json::to_string(&update).unwrap();
        assert_eq!(json, r#"{"migration":"m1","status":"failed","text":"boom"}"#);

        let plain = serde_json::to_string(&StatusUpdate::new("m1", MigrationStatus::Done)).unwrap();
        assert!(!plain.contains("text"));
    }

    proptest! {
        #[test]
        fn unreserved_codes_map_to_failed(code in any::<i32>()) {
            prop_assume!(![0, 66, 67].contains(&code));
            prop_assert_eq!(
                MigrationStatus::from_outcome(ExitOutcome::from_code(code)),
                MigrationStatus::Failed
            );
        }
    }
}
