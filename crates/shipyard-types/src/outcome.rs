//! Exit codes of spawned processes and their domain meaning.
//!
//! The codes are a contract with the external tooling and must stay
//! bit-exact:
//!
//! | code | meaning |
//! |---|---|
//! | 0 | success |
//! | 1 | merge conflict (merge operations only) |
//! | 10 | inconsistent remote-branch state |
//! | 66 | external stop signal |
//! | 67 | operation not yet applicable |
//! | other | unclassified failure |

use std::fmt;

use serde::{Deserialize, Serialize};

/// The process finished successfully.
pub const EXIT_SUCCESS: i32 = 0;
/// A merge stopped on conflicts.
pub const EXIT_CONFLICT: i32 = 1;
/// The remote branch state failed a sanity check.
pub const EXIT_REMOTE_INCONSISTENT: i32 = 10;
/// The process received an administrative stop request.
pub const EXIT_STOP: i32 = 66;
/// The operation is not applicable yet and should be retried later.
pub const EXIT_NOT_READY: i32 = 67;

/// A process exit code classified into its domain meaning.
///
/// This is the only place raw exit codes are interpreted; handlers match on
/// the variants instead of comparing integers.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ExitOutcome {
    /// Exit code 0.
    Success,
    /// Exit code 1.
    Conflict,
    /// Exit code 66.
    Stop,
    /// Exit code 67.
    NotReady,
    /// Any other code, including 10 (inconsistent remote state).
    Failure(i32),
}

impl ExitOutcome {
    /// Classify a raw exit code.
    pub fn from_code(code: i32) -> Self {
        match code {
            EXIT_SUCCESS => Self::Success,
            EXIT_CONFLICT => Self::Conflict,
            EXIT_STOP => Self::Stop,
            EXIT_NOT_READY => Self::NotReady,
            other => Self::Failure(other),
        }
    }

    /// The raw exit code this outcome was classified from.
    pub fn code(&self) -> i32 {
        match self {
            Self::Success => EXIT_SUCCESS,
            Self::Conflict => EXIT_CONFLICT,
            Self::Stop => EXIT_STOP,
            Self::NotReady => EXIT_NOT_READY,
            Self::Failure(code) => *code,
        }
    }

    /// Returns `true` for exit code 0.
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success)
    }

    /// Returns `true` when the remote sanity check failed (code 10).
    pub fn is_remote_inconsistent(&self) -> bool {
        matches!(self, Self::Failure(EXIT_REMOTE_INCONSISTENT))
    }
}

impl From<i32> for ExitOutcome {
    fn from(code: i32) -> Self {
        Self::from_code(code)
    }
}

impl fmt::Display for ExitOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Success => write!(f, "success"),
            Self::Conflict => write!(f, "conflict"),
            Self::Stop => write!(f, "stopped"),
            Self::NotReady => write!(f, "not ready"),
            Self::Failure(code) => write!(f, "failure (exit code {code})"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn reserved_codes_are_classified() {
        assert_eq!(ExitOutcome::from_code(0), ExitOutcome::Success);
        assert_eq!(ExitOutcome::from_code(1), ExitOutcome::Conflict);
        assert_eq!(ExitOutcome::from_code(66), ExitOutcome::Stop);
        assert_eq!(ExitOutcome::from_code(67), ExitOutcome::NotReady);
        assert_eq!(ExitOutcome::from_code(10), ExitOutcome::Failure(10));
        assert!(ExitOutcome::from_code(10).is_remote_inconsistent());
        assert!(!ExitOutcome::from_code(11).is_remote_inconsistent());
    }

    #[test]
    fn display_names_the_outcome() {
        assert_eq!(ExitOutcome::Stop.to_string(), "stopped");
        assert_eq!(ExitOutcome::Failure(2).to_string(), "failure (exit code 2)");
    }

    proptest! {
        #[test]
        fn classification_preserves_the_code(code in any::<i32>()) {
            prop_assert_eq!(ExitOutcome::from_code(code).code(), code);
        }
    }
}
