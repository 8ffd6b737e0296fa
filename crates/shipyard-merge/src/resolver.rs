//! The merge state machine.
//!
//! For a [`MergeTask`] the resolver walks every tracked repository through
//! the same fixed sequence:
//!
//! 1. ensure the instance workspace is cloned,
//! 2. hard-reset to the mainline and drop stale rebase state,
//! 3. optionally train rerere on the long-lived branches,
//! 4. materialize the source branch,
//! 5. materialize the target branch,
//! 6. merge, auto-resolving conflicts rerere already staged,
//! 7. publish, holding the [`ExclusiveGate`] when the target is the mainline.
//!
//! A failure in steps 1-6 stops the remaining steps and becomes a textual
//! error in the [`MergeTaskResult`]. Only failing to obtain the publish gate
//! is returned as an `Err`.

use std::fs;
use std::io;
use std::path::PathBuf;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use shipyard_exec::{CommandRunner, ProcessError, ProcessOutput};
use shipyard_gate::ExclusiveGate;
use shipyard_refs::validate_branch_name;
use shipyard_types::{
    tail, CreateBranchTask, MergeTask, MergeTaskResult, EXIT_CONFLICT, EXIT_REMOTE_INCONSISTENT,
    MAX_LOG_LENGTH,
};
use tracing::{debug, info, instrument, warn};

use crate::catalog::RepositoryCatalog;
use crate::error::{MergeError, Result};
use crate::parse::parse_merge_output;
use crate::training::TrainingSettings;
use crate::workspace::{FanOut, Repository, RepositoryWorkspace};

/// Commit message used when rerere resolved every conflict.
pub const AUTO_RESOLVE_MESSAGE: &str = "auto resolve conflict using previous resolution";

/// Name of the gate serializing pushes to the mainline.
pub const PUBLISH_GATE: &str = "merge_deploy";

/// git's exit code from `ls-remote --exit-code` when the ref is missing.
const LS_REMOTE_NOT_FOUND: i32 = 2;

// ---------------------------------------------------------------------------
// ResolverSettings
// ---------------------------------------------------------------------------

/// Everything the resolver needs besides a runner and a catalog.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ResolverSettings {
    pub pool_dir: PathBuf,
    pub instance: u32,
    pub lock_dir: PathBuf,
    /// Branch workspaces are reset to, and whose publication is gated.
    pub mainline: String,
    pub auto_resolve: bool,
    pub training: Option<TrainingSettings>,
    /// When set, publishing sleeps for this long instead of pushing.
    pub dry_run: Option<Duration>,
}

impl ResolverSettings {
    pub fn new(pool_dir: impl Into<PathBuf>, lock_dir: impl Into<PathBuf>) -> Self {
        Self {
            pool_dir: pool_dir.into(),
            instance: 0,
            lock_dir: lock_dir.into(),
            mainline: "master".to_string(),
            auto_resolve: true,
            training: None,
            dry_run: None,
        }
    }
}

// ---------------------------------------------------------------------------
// MergeConflictResolver
// ---------------------------------------------------------------------------

/// Drives merge and branch-creation tasks through the instance workspace.
pub struct MergeConflictResolver {
    runner: Arc<dyn CommandRunner>,
    catalog: Arc<dyn RepositoryCatalog>,
    settings: ResolverSettings,
    gate: ExclusiveGate,
}

impl MergeConflictResolver {
    pub fn new(
        runner: Arc<dyn CommandRunner>,
        catalog: Arc<dyn RepositoryCatalog>,
        settings: ResolverSettings,
    ) -> Result<Self> {
        let gate = ExclusiveGate::new(&settings.lock_dir, PUBLISH_GATE)?;
        Ok(Self {
            runner,
            catalog,
            settings,
            gate,
        })
    }

    pub fn settings(&self) -> &ResolverSettings {
        &self.settings
    }

    /// Merge `task.source_branch` into `task.target_branch` everywhere and
    /// publish the result if nothing failed.
    ///
    /// Returns `Err` only when the publish gate cannot be obtained.
    #[instrument(skip_all, fields(feature = %task.feature_id, source = %task.source_branch, target = %task.target_branch))]
    pub fn resolve(&self, task: &MergeTask) -> Result<MergeTaskResult> {
        info!("merging {} to {}", task.source_branch, task.target_branch);
        if self.settings.auto_resolve {
            info!("auto resolve conflicts enabled");
        }

        let mut errors = Vec::new();
        let merged = match self.merge(task) {
            Ok((workspace, None)) => Some(workspace),
            Ok((_, Some(transcript))) => {
                info!("conflict detected");
                debug!(transcript = %transcript, "merge transcript");
                let report = parse_merge_output(&transcript).render();
                errors.push(format!(
                    "Conflicts detected: \n{}",
                    tail(&report, MAX_LOG_LENGTH)
                ));
                None
            }
            Err(err) => {
                warn!(error = %err, "unknown error during merge");
                errors.push(format!(
                    "Unknown error during merge: {}",
                    tail(&err.output(), MAX_LOG_LENGTH)
                ));
                None
            }
        };

        match merged {
            Some(workspace) => {
                info!("no errors during merge, pushing changes");
                if let Some(error) = self.publish(&workspace, &task.target_branch)? {
                    errors.push(error);
                }
            }
            None => info!("merge errors detected, skip pushing"),
        }

        Ok(MergeTaskResult::from_errors(task, errors))
    }

    /// Create `task.branch` on every remote from `task.source`.
    #[instrument(skip_all, fields(source = %task.source, branch = %task.branch))]
    pub fn create_branch(&self, task: &CreateBranchTask) -> Result<()> {
        info!("creating branch {} from {}", task.branch, task.source);
        if task.source.trim().is_empty() {
            return Err(MergeError::EmptySource {
                branch: task.branch.clone(),
            });
        }
        validate_branch_name(&task.source)?;
        validate_branch_name(&task.branch)?;

        let runner = self.runner.as_ref();
        let workspace = self.workspace()?;
        let upstream = format!("origin/{}", task.source);
        let refspec = format!("{}:{}", task.source, task.branch);

        checked(workspace.git_all(runner, &["fetch"])?, "git fetch")?;
        checked(
            workspace.git_all(runner, &["checkout", &task.source])?,
            "git checkout",
        )?;
        checked(
            workspace.git_all(runner, &["reset", "--hard", &upstream])?,
            "git reset",
        )?;
        let mut push = vec!["push", "origin", refspec.as_str()];
        if task.force {
            push.push("--force");
        }
        checked(workspace.git_all(runner, &push)?, "git push")?;
        info!("branch created");
        Ok(())
    }

    fn workspace(&self) -> Result<RepositoryWorkspace> {
        RepositoryWorkspace::ensure(
            self.runner.as_ref(),
            &self.settings.pool_dir,
            self.settings.instance,
            self.catalog.as_ref(),
        )
    }

    /// Steps 1-6. `Some(transcript)` means the merge conflicted.
    fn merge(&self, task: &MergeTask) -> Result<(RepositoryWorkspace, Option<String>)> {
        validate_branch_name(&task.source_branch)?;
        validate_branch_name(&task.target_branch)?;

        let runner = self.runner.as_ref();
        let workspace = self.workspace()?;

        self.reset(&workspace)?;
        if let Some(training) = &self.settings.training {
            training.train(runner, &workspace)?;
        }

        let source = &task.source_branch;
        let target = &task.target_branch;
        checked(
            workspace.fan_out(|repository| self.sync_source(repository, source))?,
            "sync source branch",
        )?;
        checked(
            workspace.fan_out(|repository| self.sync_target(repository, target))?,
            "sync target branch",
        )?;

        let merge = workspace.fan_out(|repository| self.merge_one(repository, source))?;
        debug!(output = %merge.transcript(), "merge finished");
        match merge.exit_code() {
            0 => Ok((workspace, None)),
            EXIT_CONFLICT => Ok((workspace, Some(merge.transcript().to_string()))),
            code => Err(ProcessError::NonZeroExit {
                command: format!("git merge {source}"),
                code,
                output: merge.transcript().to_string(),
            }
            .into()),
        }
    }

    fn reset(&self, workspace: &RepositoryWorkspace) -> Result<()> {
        let runner = self.runner.as_ref();
        let mainline = format!("origin/{}", self.settings.mainline);

        checked(workspace.git_all(runner, &["fetch"])?, "git fetch")?;
        for repository in workspace.repositories() {
            let rebase = repository.git_path("rebase-apply");
            match fs::remove_dir_all(&rebase) {
                Ok(()) => debug!(repository = %repository.name, "removed stale rebase state"),
                Err(e) if e.kind() == io::ErrorKind::NotFound => {}
                Err(source) => return Err(MergeError::io(rebase, source)),
            }
        }
        checked(
            workspace.git_all(runner, &["reset", "--hard", &mainline])?,
            "git reset",
        )?;
        checked(
            workspace.git_all(runner, &["checkout", &self.settings.mainline])?,
            "git checkout",
        )?;
        checked(
            workspace.git_all(runner, &["reset", "--hard", &mainline])?,
            "git reset",
        )?;
        checked(workspace.git_all(runner, &["clean", "-fd"])?, "git clean")?;
        Ok(())
    }

    fn checkout_or_create(&self, repository: &Repository, branch: &str) -> Result<ProcessOutput> {
        let runner = self.runner.as_ref();
        let checkout = repository.git(runner, &["checkout", branch])?;
        if checkout.is_success() {
            return Ok(checkout);
        }
        let mut created = repository.git(runner, &["checkout", "-b", branch])?;
        created.output.insert_str(0, &checkout.output);
        Ok(created)
    }

    fn sync_source(&self, repository: &Repository, branch: &str) -> Result<ProcessOutput> {
        let runner = self.runner.as_ref();
        let mut log = StepLog::default();

        let checkout = log.push(self.checkout_or_create(repository, branch)?);
        if checkout != 0 {
            return Ok(log.finish(checkout));
        }

        let head = format!("refs/heads/{branch}");
        let upstream = format!("origin/{branch}");
        let remote = log.push(repository.git(
            runner,
            &["ls-remote", "--exit-code", "origin", &head],
        )?);
        match remote {
            0 => {
                let set_upstream = format!("--set-upstream-to={upstream}");
                let code = log.push(repository.git(runner, &["branch", &set_upstream, branch])?);
                if code != 0 {
                    return Ok(log.finish(code));
                }
            }
            LS_REMOTE_NOT_FOUND => {
                info!(repository = %repository.name, branch, "branch does not exist at remote");
                log.line(&format!("branch {branch} not exists at remote"));
            }
            code => {
                warn!(repository = %repository.name, branch, code, "inconsistent remote branch state");
                return Ok(log.finish(EXIT_REMOTE_INCONSISTENT));
            }
        }

        let tracking = format!("{branch}@{{upstream}}");
        if log.push(repository.git(runner, &["rev-parse", "--abbrev-ref", &tracking])?) != 0 {
            log.line(&format!("branch {branch} not exists"));
            return Ok(log.finish(0));
        }
        let reset = log.push(repository.git(runner, &["reset", "--hard", &upstream])?);
        if reset != 0 {
            return Ok(log.finish(reset));
        }
        let pull = log.push(repository.git(runner, &["pull", "--ff"])?);
        Ok(log.finish(pull))
    }

    fn sync_target(&self, repository: &Repository, branch: &str) -> Result<ProcessOutput> {
        let runner = self.runner.as_ref();
        let mut log = StepLog::default();

        let checkout = log.push(self.checkout_or_create(repository, branch)?);
        if checkout != 0 {
            return Ok(log.finish(checkout));
        }

        let tracking = format!("{branch}@{{upstream}}");
        if log.push(repository.git(runner, &["rev-parse", "--abbrev-ref", &tracking])?) != 0 {
            log.line("pushing branch");
            let refspec = format!("{branch}:{branch}");
            let pushed = log.push(repository.git(runner, &["push", "-u", "origin", &refspec])?);
            if pushed != 0 {
                warn!(repository = %repository.name, branch, code = pushed, "could not create upstream branch");
            }
        }

        let upstream = format!("origin/{branch}");
        let reset = log.push(repository.git(runner, &["reset", "--hard", &upstream])?);
        if reset != 0 {
            return Ok(log.finish(reset));
        }
        let pull = log.push(repository.git(runner, &["pull", "--ff"])?);
        Ok(log.finish(pull))
    }

    fn merge_one(&self, repository: &Repository, source: &str) -> Result<ProcessOutput> {
        let runner = self.runner.as_ref();
        let merge = repository.git(runner, &["merge", source])?;
        if merge.exit_code != EXIT_CONFLICT || !self.settings.auto_resolve {
            return Ok(merge);
        }

        let mut log = StepLog::default();
        log.push(merge);
        let status = repository.git(runner, &["status", "--porcelain"])?;
        if !status.is_success() || !only_modified_or_added(&status.output) {
            debug!(repository = %repository.name, "conflict cannot be auto-resolved");
            return Ok(log.finish(EXIT_CONFLICT));
        }

        let commit = log.push(repository.git(runner, &["commit", "-m", AUTO_RESOLVE_MESSAGE])?);
        if commit == 0 {
            info!(repository = %repository.name, "conflict auto-resolved");
        }
        Ok(log.finish(commit))
    }

    /// Step 7. `Ok(Some(text))` is a push failure to record.
    fn publish(&self, workspace: &RepositoryWorkspace, target: &str) -> Result<Option<String>> {
        let _guard = if target == self.settings.mainline {
            info!(gate = %self.gate.name(), "locking publish gate");
            Some(self.gate.lock()?)
        } else {
            None
        };

        if let Some(delay) = self.settings.dry_run {
            thread::sleep(delay);
            info!("skip pushing as dry run is enabled");
            return Ok(None);
        }

        let pushed = workspace
            .git_all(self.runner.as_ref(), &["push"])
            .and_then(|fan_out| checked(fan_out, "git push"));
        match pushed {
            Ok(_) => Ok(None),
            Err(err) => {
                warn!(error = %err, "unknown error during pushing merge");
                Ok(Some(format!(
                    "Unknown error during pushing merge: {}",
                    tail(&err.output(), MAX_LOG_LENGTH)
                )))
            }
        }
    }
}

fn checked(fan_out: FanOut, command: &str) -> Result<String> {
    Ok(fan_out.into_checked(command)?)
}

/// True when `git status --porcelain` shows only staged modifications and
/// additions.
fn only_modified_or_added(porcelain: &str) -> bool {
    porcelain
        .lines()
        .filter(|line| !line.is_empty())
        .all(|line| line.starts_with("M ") || line.starts_with("A "))
}

/// Output of several commands run as one step in one repository.
#[derive(Default)]
struct StepLog {
    output: String,
}

impl StepLog {
    /// Append the command's output and return its exit code.
    fn push(&mut self, output: ProcessOutput) -> i32 {
        self.output.push_str(&output.output);
        output.exit_code
    }

    fn line(&mut self, text: &str) {
        self.output.push_str(text);
        self.output.push('\n');
    }

    fn finish(self, exit_code: i32) -> ProcessOutput {
        ProcessOutput::new(exit_code, self.output)
    }
}
