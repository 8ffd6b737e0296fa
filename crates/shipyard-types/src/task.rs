use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::TypeError;

// ---------------------------------------------------------------------------
// Task variants
// ---------------------------------------------------------------------------

/// Run a hard migration of a deployed project build.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct MigrationTask {
    pub project: String,
    pub version: String,
    /// Migration name, possibly namespaced with `/`.
    pub migration: String,
    /// Migration worker the task is addressed to. Any worker may take an
    /// unaddressed task.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub worker: Option<String>,
}

/// Merge `source_branch` into `target_branch` across every tracked repository.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct MergeTask {
    pub feature_id: String,
    pub source_branch: String,
    pub target_branch: String,
    /// Opaque merge type, echoed back in the result.
    #[serde(rename = "type", default)]
    pub merge_type: String,
}

/// Create `branch` from `source` on the remote of every tracked repository.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreateBranchTask {
    pub source: String,
    pub branch: String,
    #[serde(default)]
    pub force: bool,
}

/// A unit of work pulled from the task queue.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Task {
    Migration(MigrationTask),
    Merge(MergeTask),
    CreateBranch(CreateBranchTask),
}

impl Task {
    /// The kind of this task, used to route it to a registered handler.
    pub fn kind(&self) -> TaskKind {
        match self {
            Self::Migration(_) => TaskKind::Migration,
            Self::Merge(_) => TaskKind::Merge,
            Self::CreateBranch(_) => TaskKind::CreateBranch,
        }
    }
}

// ---------------------------------------------------------------------------
// TaskKind
// ---------------------------------------------------------------------------

/// Discriminant of [`Task`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskKind {
    Migration,
    Merge,
    CreateBranch,
}

impl TaskKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Migration => "migration",
            Self::Merge => "merge",
            Self::CreateBranch => "create_branch",
        }
    }
}

impl fmt::Display for TaskKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TaskKind {
    type Err = TypeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "migration" => Ok(Self::Migration),
            "merge" => Ok(Self::Merge),
            "create_branch" => Ok(Self::CreateBranch),
            other => Err(TypeError::UnknownTaskKind(other.to_string())),
        }
    }
}

// ---------------------------------------------------------------------------
// Disposition
// ---------------------------------------------------------------------------

/// The terminal answer a handler gives the queue for a received task.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Disposition {
    /// Processing finished (successfully or with a domain-level failure).
    Accepted,
    /// Rejected by policy; requeue for later redelivery.
    Retry,
}

// ---------------------------------------------------------------------------
// MergeTaskResult
// ---------------------------------------------------------------------------

/// The reported outcome of a [`MergeTask`].
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct MergeTaskResult {
    pub feature_id: String,
    pub source_branch: String,
    pub target_branch: String,
    pub success: bool,
    /// Errors in the order they were recorded.
    pub errors: Vec<String>,
    #[serde(rename = "type", default)]
    pub merge_type: String,
}

impl MergeTaskResult {
    /// Build the result for `task`; success is derived from `errors`.
    pub fn from_errors(task: &MergeTask, errors: Vec<String>) -> Self {
        Self {
            feature_id: task.feature_id.clone(),
            source_branch: task.source_branch.clone(),
            target_branch: task.target_branch.clone(),
            success: errors.is_empty(),
            errors,
            merge_type: task.merge_type.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn merge_task() -> MergeTask {
        MergeTask {
            feature_id: "WT-1042".into(),
            source_branch: "feature/WT-1042".into(),
            target_branch: "develop".into(),
            merge_type: "feature".into(),
        }
    }

    #[test]
    fn task_is_tagged_by_kind() {
        let json = r#"{"kind":"merge","feature_id":"7","source_branch":"a","target_branch":"b","type":"hotfix"}"#;
        let task: Task = serde_json::from_str(json).unwrap();
        assert_eq!(task.kind(), TaskKind::Merge);
        match task {
            Task::Merge(merge) => assert_eq!(merge.merge_type, "hotfix"),
            other => panic!("unexpected task: {other:?}"),
        }
    }

    #[test]
    fn create_branch_force_defaults_to_false() {
        let json = r#"{"kind":"create_branch","source":"master","branch":"release-1"}"#;
        let task: Task = serde_json::from_str(json).unwrap();
        assert_eq!(
            task,
            Task::CreateBranch(CreateBranchTask {
                source: "master".into(),
                branch: "release-1".into(),
                force: false,
            })
        );
    }

    #[test]
    fn migration_worker_is_optional() {
        let json = r#"{"kind":"migration","project":"crm","version":"1.4","migration":"m1"}"#;
        match serde_json::from_str::<Task>(json).unwrap() {
            Task::Migration(task) => assert_eq!(task.worker, None),
            other => panic!("unexpected task: {other:?}"),
        }

        let json = r#"{"kind":"migration","project":"crm","version":"1.4","migration":"m1","worker":"crm-prod"}"#;
        match serde_json::from_str::<Task>(json).unwrap() {
            Task::Migration(task) => assert_eq!(task.worker.as_deref(), Some("crm-prod")),
            other => panic!("unexpected task: {other:?}"),
        }
    }

    #[test]
    fn result_success_follows_errors() {
        let ok = MergeTaskResult::from_errors(&merge_task(), Vec::new());
        assert!(ok.success);
        assert_eq!(ok.merge_type, "feature");

        let failed = MergeTaskResult::from_errors(&merge_task(), vec!["conflict".into()]);
        assert!(!failed.success);
        assert_eq!(failed.errors, vec!["conflict".to_string()]);
    }

    #[test]
    fn task_kind_round_trips_through_str() {
        for kind in [TaskKind::Migration, TaskKind::Merge, TaskKind::CreateBranch] {
            assert_eq!(kind.as_str().parse::<TaskKind>().unwrap(), kind);
        }
        assert!("deploy".parse::<TaskKind>().is_err());
    }
}
