//! Hard migration handling.
//!
//! The migration script is run in passthrough mode; its exit code decides
//! the terminal status:
//!
//! | exit code | status    |
//! |-----------|-----------|
//! | 0         | `done`    |
//! | 66        | `stopped` |
//! | 67        | `new`     |
//! | other     | `failed`, carrying the retained output tail |
//!
//! Output is streamed back as windowed log chunks while the script runs.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use shipyard_exec::{CommandRunner, CommandSpec, ExecMode, LogStreamBuffer};
use shipyard_queue::TaskQueue;
use shipyard_types::{
    tail, Disposition, ExitOutcome, MigrationStatus, MigrationTask, Task, TaskKind, MAX_LOG_LENGTH,
};
use tracing::{error, info, instrument, warn};

use crate::error::Result;
use crate::locator::ScriptLocator;
use crate::status::StatusTracker;
use crate::worker::TaskHandler;

/// How migration scripts are invoked.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MigrationSettings {
    /// Name this worker answers to; empty takes every task.
    pub worker_name: String,
    pub interpreter: String,
    pub progress_host: String,
    pub progress_port: u16,
    pub timeout: Option<Duration>,
}

/// Migration name as the script expects it: namespaces use `\`.
pub fn migration_argument(name: &str) -> String {
    name.replace('/', "\\")
}

/// Runs [`MigrationTask`]s.
pub struct MigrationHandler {
    runner: Arc<dyn CommandRunner>,
    locator: ScriptLocator,
    settings: MigrationSettings,
}

impl MigrationHandler {
    pub fn new(
        runner: Arc<dyn CommandRunner>,
        locator: ScriptLocator,
        settings: MigrationSettings,
    ) -> Self {
        Self {
            runner,
            locator,
            settings,
        }
    }

    /// Whether `task` is addressed to this worker.
    pub fn is_addressed_to_me(&self, task: &MigrationTask) -> bool {
        match &task.worker {
            Some(worker) => self.settings.worker_name.is_empty() || *worker == self.settings.worker_name,
            None => true,
        }
    }

    /// The command running `task` with `script`.
    pub fn command(&self, task: &MigrationTask, script: &Path) -> CommandSpec {
        CommandSpec::new(&self.settings.interpreter)
            .arg(script.to_string_lossy())
            .args([
                "migration".to_string(),
                "--type=hard".to_string(),
                format!("--project={}", task.project),
                format!("--progressHost={}", self.settings.progress_host),
                format!("--progressPort={}", self.settings.progress_port),
                "upOne".to_string(),
                migration_argument(&task.migration),
                "-vv".to_string(),
            ])
    }

    /// Run one migration and publish its status stream. Always accepts.
    #[instrument(skip_all, fields(migration = %task.migration, project = %task.project, version = %task.version))]
    pub fn run(&self, task: &MigrationTask, queue: &dyn TaskQueue) -> Disposition {
        let mut tracker = StatusTracker::new(queue, task.migration.as_str());

        let script = match self.locator.locate(&task.project, &task.version) {
            Ok(script) => script,
            Err(e) => {
                error!(error = %e, "cannot locate migration script");
                tracker.emit(MigrationStatus::Failed, Some(e.to_string()));
                return Disposition::Accepted;
            }
        };
        info!(script = %script.display(), "running migration");
        tracker.emit(MigrationStatus::Process, None);

        let spec = self.command(task, &script);
        let (result, retained) = {
            let mut buffer =
                LogStreamBuffer::new(task.migration.as_str(), |chunk| tracker.chunk(chunk));
            let result = self.runner.execute(
                &spec,
                &mut buffer,
                ExecMode::Passthrough,
                self.settings.timeout,
            );
            (result, buffer.tail().to_string())
        };

        match result {
            Ok(output) => {
                let outcome = output.outcome();
                match outcome {
                    ExitOutcome::Success => info!("migration done"),
                    ExitOutcome::Stop => info!("stopped migration via stop signal"),
                    ExitOutcome::NotReady => info!("migration is not ready yet"),
                    ExitOutcome::Conflict | ExitOutcome::Failure(_) => {
                        error!(exit_code = output.exit_code, "migration failed");
                    }
                }
                let status = MigrationStatus::from_outcome(outcome);
                let text = (status == MigrationStatus::Failed).then_some(retained);
                tracker.emit(status, text);
            }
            Err(e) => {
                error!(error = %e, "migration could not be run");
                let text = if retained.is_empty() {
                    e.to_string()
                } else {
                    retained
                };
                tracker.emit(
                    MigrationStatus::Failed,
                    Some(tail(&text, MAX_LOG_LENGTH).to_string()),
                );
            }
        }
        Disposition::Accepted
    }
}

impl TaskHandler for MigrationHandler {
    fn kinds(&self) -> &'static [TaskKind] {
        &[TaskKind::Migration]
    }

    fn handle(&self, task: &Task, queue: &dyn TaskQueue) -> Result<Disposition> {
        match task {
            Task::Migration(migration) if !self.is_addressed_to_me(migration) => {
                warn!(
                    worker = ?migration.worker,
                    "migration task addressed to another worker, requeueing"
                );
                Ok(Disposition::Retry)
            }
            Task::Migration(migration) => Ok(self.run(migration, queue)),
            other => {
                warn!(kind = %other.kind(), "migration handler received a foreign task");
                Ok(Disposition::Retry)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::locator::ScriptPaths;
    use shipyard_exec::{ScriptedRunner, SystemRunner};
    use shipyard_queue::{InMemoryQueue, Reply};
    use shipyard_types::StatusUpdate;

    fn task() -> MigrationTask {
        MigrationTask {
            project: "crm".into(),
            version: "1.4".into(),
            migration: "m2024/AddIndex".into(),
            worker: None,
        }
    }

    fn settings() -> MigrationSettings {
        MigrationSettings {
            worker_name: "crm-prod".into(),
            interpreter: "php".into(),
            progress_host: "127.0.0.1".into(),
            progress_port: 8099,
            timeout: None,
        }
    }

    fn handler(runner: Arc<dyn CommandRunner>) -> MigrationHandler {
        MigrationHandler::new(
            runner,
            ScriptLocator::new(ScriptPaths::default(), false),
            settings(),
        )
    }

    fn statuses(queue: &InMemoryQueue) -> Vec<StatusUpdate> {
        queue
            .replies()
            .into_iter()
            .filter_map(|reply| match reply {
                Reply::Status(update) => Some(update),
                _ => None,
            })
            .collect()
    }

    fn run(code: i32, output: &str) -> (Arc<ScriptedRunner>, InMemoryQueue) {
        let runner = Arc::new(ScriptedRunner::new().respond(&["php"], code, output));
        let queue = InMemoryQueue::new();
        let disposition = handler(runner.clone()).run(&task(), &queue);
        assert_eq!(disposition, Disposition::Accepted);
        (runner, queue)
    }

    #[test]
    fn success_emits_process_then_done() {
        let (_, queue) = run(0, "applied\n");
        let kinds: Vec<_> = statuses(&queue).iter().map(|s| s.status).collect();
        assert_eq!(kinds, [MigrationStatus::Process, MigrationStatus::Done]);
        assert_eq!(
            queue.replies()[1],
            Reply::LogChunk(shipyard_types::LogChunk::new("m2024/AddIndex", "applied\n"))
        );
    }

    #[test]
    fn stop_signal_emits_stopped() {
        let (_, queue) = run(66, "stopping\n");
        let kinds: Vec<_> = statuses(&queue).iter().map(|s| s.status).collect();
        assert_eq!(kinds, [MigrationStatus::Process, MigrationStatus::Stopped]);
    }

    #[test]
    fn not_ready_returns_to_new() {
        let (_, queue) = run(67, "");
        let last = statuses(&queue).pop().unwrap();
        assert_eq!(last, StatusUpdate::new("m2024/AddIndex", MigrationStatus::New));
    }

    #[test]
    fn failure_carries_the_output_tail() {
        let (_, queue) = run(255, "PDOException: table locked\n");
        let last = statuses(&queue).pop().unwrap();
        assert_eq!(last.status, MigrationStatus::Failed);
        assert_eq!(last.text.as_deref(), Some("PDOException: table locked\n"));
    }

    #[test]
    fn invokes_the_script_with_an_argument_vector() {
        let (runner, _) = run(0, "");
        let calls = runner.calls();
        assert_eq!(calls.len(), 1);
        assert_eq!(
            calls[0].argv(),
            [
                "php",
                "/var/pkg/crm-1.4/misc/tools/migration.php",
                "migration",
                "--type=hard",
                "--project=crm",
                "--progressHost=127.0.0.1",
                "--progressPort=8099",
                "upOne",
                "m2024\\AddIndex",
                "-vv",
            ]
        );
    }

    #[test]
    fn spawn_failure_is_reported_as_failed() {
        let mut settings = settings();
        settings.interpreter = "shipyard-missing-interpreter-3f9a".into();
        let handler = MigrationHandler::new(
            Arc::new(SystemRunner::new()),
            ScriptLocator::new(ScriptPaths::default(), false),
            settings,
        );
        let queue = InMemoryQueue::new();
        handler.run(&task(), &queue);

        let last = statuses(&queue).pop().unwrap();
        assert_eq!(last.status, MigrationStatus::Failed);
        assert!(last.text.unwrap().contains("failed to spawn"));
    }

    #[test]
    fn unusable_project_fails_without_running() {
        let runner = Arc::new(ScriptedRunner::new());
        let queue = InMemoryQueue::new();
        let mut bad = task();
        bad.project = "../etc".into();
        handler(runner.clone()).run(&bad, &queue);

        assert!(runner.calls().is_empty());
        let statuses = statuses(&queue);
        assert_eq!(statuses.len(), 1);
        assert_eq!(statuses[0].status, MigrationStatus::Failed);
    }

    #[test]
    fn task_for_another_worker_is_requeued_untouched() {
        let runner = Arc::new(ScriptedRunner::new());
        let queue = InMemoryQueue::new();
        let mut other = task();
        other.worker = Some("crm-staging".into());
        let disposition = handler(runner.clone())
            .handle(&Task::Migration(other), &queue)
            .unwrap();

        assert_eq!(disposition, Disposition::Retry);
        assert!(runner.calls().is_empty());
        assert!(queue.replies().is_empty());
    }

    #[test]
    fn addressed_and_unaddressed_tasks_both_run() {
        let mut addressed = task();
        addressed.worker = Some("crm-prod".into());
        for task in [task(), addressed] {
            let runner = Arc::new(ScriptedRunner::new());
            let queue = InMemoryQueue::new();
            let disposition = handler(runner.clone())
                .handle(&Task::Migration(task), &queue)
                .unwrap();
            assert_eq!(disposition, Disposition::Accepted);
            assert_eq!(runner.calls().len(), 1);
        }
    }

    #[test]
    fn unnamed_worker_takes_every_task() {
        let mut settings = settings();
        settings.worker_name.clear();
        let handler = MigrationHandler::new(
            Arc::new(ScriptedRunner::new()),
            ScriptLocator::new(ScriptPaths::default(), false),
            settings,
        );
        let mut other = task();
        other.worker = Some("crm-staging".into());
        assert!(handler.is_addressed_to_me(&other));
    }
}
