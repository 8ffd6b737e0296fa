//! Conflict training.
//!
//! Before merging, the commits landed on each long-lived branch since the
//! last training run are replayed through a rerere training script, so that
//! conflicts resolved by hand on those branches resolve themselves the next
//! time. The high-water mark per branch is kept in `.git/rerere-<branch>`
//! inside each clone.

use std::fs;
use std::path::PathBuf;

use shipyard_exec::{CommandRunner, CommandSpec, ProcessOutput};
use tracing::{debug, warn};

use crate::error::{MergeError, Result};
use crate::workspace::{Repository, RepositoryWorkspace};

/// Commits replayed on the first training run of a branch.
const FIRST_RUN_MAX_COUNT: &str = "--max-count=100";

/// Which branches to train on and with which script.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TrainingSettings {
    pub branches: Vec<String>,
    /// Path of the rerere training shell script.
    pub script: PathBuf,
}

/// Marker file holding the last trained commit of `branch`.
pub fn marker_path(repository: &Repository, branch: &str) -> PathBuf {
    repository.git_path(&format!("rerere-{branch}"))
}

impl TrainingSettings {
    /// Train every repository on every configured branch.
    pub fn train(&self, runner: &dyn CommandRunner, workspace: &RepositoryWorkspace) -> Result<()> {
        for branch in &self.branches {
            debug!(branch = %branch, "training conflict resolutions");
            workspace
                .fan_out(|repository| self.train_one(runner, repository, branch))?
                .into_checked(&format!("train {branch}"))?;
        }
        Ok(())
    }

    fn train_one(
        &self,
        runner: &dyn CommandRunner,
        repository: &Repository,
        branch: &str,
    ) -> Result<ProcessOutput> {
        let marker = marker_path(repository, branch);
        let range = match fs::read_to_string(&marker) {
            Ok(start) if !start.trim().is_empty() => {
                Some(format!("{}..origin/{branch}", start.trim()))
            }
            _ => None,
        };
        let script = CommandSpec::new("bash")
            .arg(self.script.to_string_lossy())
            .args(match &range {
                Some(range) => vec![range.clone()],
                None => vec![FIRST_RUN_MAX_COUNT.to_string(), branch.to_string()],
            })
            .current_dir(&repository.dir);

        let trained = runner.status(&script)?;
        if !trained.is_success() {
            warn!(
                repository = %repository.name,
                branch,
                exit_code = trained.exit_code,
                "training script failed, recording marker anyway"
            );
        }

        let origin = format!("origin/{branch}");
        let head = repository.git(runner, &["log", &origin, "-1", "--pretty=%H"])?;
        if head.is_success() {
            fs::write(&marker, format!("{}\n", head.output.trim()))
                .map_err(|source| MergeError::io(&marker, source))?;
        }
        let mut output = trained.output;
        output.push_str(&head.output);
        Ok(ProcessOutput::new(head.exit_code, output))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use shipyard_exec::ScriptedRunner;

    fn all_marked(workspace: &RepositoryWorkspace, branch: &str) -> bool {
        workspace
            .repositories()
            .iter()
            .all(|repository| marker_path(repository, branch).is_file())
    }

    fn workspace(root: &std::path::Path) -> RepositoryWorkspace {
        let repos = ["api", "web"]
            .into_iter()
            .map(|name| {
                let dir = root.join(name);
                fs::create_dir_all(dir.join(".git")).unwrap();
                Repository {
                    name: name.into(),
                    url: format!("ssh://git/{name}"),
                    dir,
                }
            })
            .collect();
        RepositoryWorkspace::from_parts(root, repos)
    }

    fn settings() -> TrainingSettings {
        TrainingSettings {
            branches: vec!["develop".into(), "staging".into()],
            script: PathBuf::from("/opt/tools/rerere-train.sh"),
        }
    }

    #[test]
    fn first_run_trains_a_bounded_history_and_records_markers() {
        let root = tempfile::tempdir().unwrap();
        let workspace = workspace(root.path());
        let runner = ScriptedRunner::new()
            .respond(&["git", "log", "origin/develop"], 0, "aaa111\n")
            .respond(&["git", "log", "origin/staging"], 0, "bbb222\n");

        settings().train(&runner, &workspace).unwrap();

        assert_eq!(
            runner.count(&["bash", "/opt/tools/rerere-train.sh", "--max-count=100", "develop"]),
            2
        );
        assert!(all_marked(&workspace, "develop"));
        assert!(all_marked(&workspace, "staging"));
        let marker = marker_path(&workspace.repositories()[0], "staging");
        assert_eq!(fs::read_to_string(marker).unwrap(), "bbb222\n");
    }

    #[test]
    fn later_runs_replay_from_the_marker() {
        let root = tempfile::tempdir().unwrap();
        let workspace = workspace(root.path());
        for repository in workspace.repositories() {
            fs::write(marker_path(repository, "develop"), "aaa111\n").unwrap();
        }
        let runner = ScriptedRunner::new().respond(&["git", "log"], 0, "ccc333\n");
        let only_develop = TrainingSettings {
            branches: vec!["develop".into()],
            ..settings()
        };

        only_develop.train(&runner, &workspace).unwrap();

        assert_eq!(
            runner.count(&["bash", "/opt/tools/rerere-train.sh", "aaa111..origin/develop"]),
            2
        );
        assert_eq!(runner.count(&["bash", "/opt/tools/rerere-train.sh", "--max-count=100"]), 0);
    }

    #[test]
    fn unknown_branch_fails_the_step() {
        let root = tempfile::tempdir().unwrap();
        let workspace = workspace(root.path());
        let runner = ScriptedRunner::new().respond(
            &["git", "log"],
            128,
            "fatal: ambiguous argument 'origin/develop'",
        );
        let err = settings().train(&runner, &workspace).unwrap_err();
        assert!(err.output().contains("ambiguous argument"));
        assert!(!all_marked(&workspace, "develop"));
    }
}
