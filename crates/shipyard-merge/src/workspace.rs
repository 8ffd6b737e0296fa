//! Per-instance repository workspaces.
//!
//! Each worker instance owns `<pool_dir>/<instance>/`, holding one clone per
//! tracked repository. Clones are made once and reused across tasks. Every
//! merge step is fanned out over all clones in name order; the combined
//! transcript starts each repository's section with a delimiter line
//! `>>> <pool_dir>/<instance>/<repository>`.

use std::fmt::Write as _;
use std::fs;
use std::path::{Path, PathBuf};

use shipyard_exec::{CommandRunner, CommandSpec, ProcessError, ProcessOutput};
use tracing::{debug, info};

use crate::catalog::RepositoryCatalog;
use crate::error::{MergeError, Result};

/// Prefix of the line opening each repository's section in a transcript.
pub const SECTION_DELIMITER: &str = ">>>";

// ---------------------------------------------------------------------------
// Repository
// ---------------------------------------------------------------------------

/// One tracked repository cloned into a workspace.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Repository {
    pub name: String,
    pub url: String,
    pub dir: PathBuf,
}

impl Repository {
    /// Run `git <args>` in this clone and return its exit code and output.
    pub fn git(&self, runner: &dyn CommandRunner, args: &[&str]) -> Result<ProcessOutput> {
        let spec = CommandSpec::git(args.iter().copied()).current_dir(&self.dir);
        Ok(runner.status(&spec)?)
    }

    /// Path inside the clone's `.git` directory.
    pub fn git_path(&self, name: &str) -> PathBuf {
        self.dir.join(".git").join(name)
    }
}

// ---------------------------------------------------------------------------
// RepositoryWorkspace
// ---------------------------------------------------------------------------

/// The set of clones owned by one worker instance.
#[derive(Clone, Debug)]
pub struct RepositoryWorkspace {
    root: PathBuf,
    repositories: Vec<Repository>,
}

impl RepositoryWorkspace {
    /// Directory owned by `instance` under `pool_dir`.
    pub fn root_for(pool_dir: &Path, instance: u32) -> PathBuf {
        pool_dir.join(instance.to_string())
    }

    /// Make sure every catalogued repository is cloned under the instance
    /// directory. Existing clones are left alone.
    pub fn ensure(
        runner: &dyn CommandRunner,
        pool_dir: &Path,
        instance: u32,
        catalog: &dyn RepositoryCatalog,
    ) -> Result<Self> {
        let root = Self::root_for(pool_dir, instance);
        info!(pool = %root.display(), "preparing workspace");
        fs::create_dir_all(&root).map_err(|source| MergeError::io(&root, source))?;

        let mut repositories = Vec::new();
        for (name, url) in catalog.repositories()? {
            let dir = root.join(&name);
            if !dir.join(".git").is_dir() {
                debug!(repository = %name, url = %url, dir = %dir.display(), "cloning repository");
                fs::create_dir_all(&dir).map_err(|source| MergeError::io(&dir, source))?;
                let clone = CommandSpec::git(["clone", "--", url.as_str(), "."]).current_dir(&dir);
                runner
                    .check(&clone)
                    .map_err(|source| MergeError::Workspace {
                        repository: name.clone(),
                        source,
                    })?;
            }
            repositories.push(Repository { name, url, dir });
        }
        Ok(Self { root, repositories })
    }

    /// Build a workspace over already-known clones.
    pub fn from_parts(root: impl Into<PathBuf>, repositories: Vec<Repository>) -> Self {
        Self {
            root: root.into(),
            repositories,
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn repositories(&self) -> &[Repository] {
        &self.repositories
    }

    /// Run `step` in every repository, in order, collecting the transcript.
    ///
    /// A repository exiting non-zero does not stop the others; an `Err`
    /// from `step` does.
    pub fn fan_out<F>(&self, mut step: F) -> Result<FanOut>
    where
        F: FnMut(&Repository) -> Result<ProcessOutput>,
    {
        let mut fan_out = FanOut::default();
        for repository in &self.repositories {
            let output = step(repository)?;
            fan_out.record(repository, output);
        }
        Ok(fan_out)
    }

    /// Run `git <args>` in every repository.
    pub fn git_all(&self, runner: &dyn CommandRunner, args: &[&str]) -> Result<FanOut> {
        self.fan_out(|repository| repository.git(runner, args))
    }
}

// ---------------------------------------------------------------------------
// FanOut
// ---------------------------------------------------------------------------

/// Combined result of one step across every repository.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct FanOut {
    transcript: String,
    codes: Vec<(String, i32)>,
}

impl FanOut {
    fn record(&mut self, repository: &Repository, output: ProcessOutput) {
        let _ = writeln!(
            self.transcript,
            "{SECTION_DELIMITER} {}",
            repository.dir.display()
        );
        self.transcript.push_str(&output.output);
        if !output.output.is_empty() && !output.output.ends_with('\n') {
            self.transcript.push('\n');
        }
        self.codes.push((repository.name.clone(), output.exit_code));
    }

    /// Delimited output of every repository.
    pub fn transcript(&self) -> &str {
        &self.transcript
    }

    /// Aggregate exit code: 0 when every repository succeeded, otherwise the
    /// first code other than a merge conflict, otherwise the conflict code.
    pub fn exit_code(&self) -> i32 {
        let mut failures = self.codes.iter().map(|(_, code)| *code).filter(|c| *c != 0);
        let Some(first) = failures.next() else {
            return 0;
        };
        std::iter::once(first)
            .chain(failures)
            .find(|code| *code != shipyard_types::EXIT_CONFLICT)
            .unwrap_or(first)
    }

    pub fn is_success(&self) -> bool {
        self.exit_code() == 0
    }

    /// Names of repositories that exited non-zero.
    pub fn failed(&self) -> Vec<&str> {
        self.codes
            .iter()
            .filter(|(_, code)| *code != 0)
            .map(|(name, _)| name.as_str())
            .collect()
    }

    /// The transcript, or a [`ProcessError::NonZeroExit`] when any
    /// repository failed.
    pub fn into_checked(self, command: &str) -> std::result::Result<String, ProcessError> {
        let code = self.exit_code();
        if code == 0 {
            Ok(self.transcript)
        } else {
            Err(ProcessError::NonZeroExit {
                command: command.to_string(),
                code,
                output: self.transcript,
            })
        }
    }
}
