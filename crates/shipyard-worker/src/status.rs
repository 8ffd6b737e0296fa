use shipyard_queue::{Reply, TaskQueue};
use shipyard_types::{LogChunk, MigrationStatus, StatusUpdate};
use tracing::{debug, warn};

/// Publishes the status stream of one migration task.
///
/// Once a terminal status has been published, later statuses and log chunks
/// are dropped with a warning. Publishing failures are logged, not
/// returned; a lost progress message must not abort the migration.
pub struct StatusTracker<'a> {
    queue: &'a dyn TaskQueue,
    migration: String,
    last: Option<MigrationStatus>,
}

impl<'a> StatusTracker<'a> {
    pub fn new(queue: &'a dyn TaskQueue, migration: impl Into<String>) -> Self {
        Self {
            queue,
            migration: migration.into(),
            last: None,
        }
    }

    /// The last status published.
    pub fn last(&self) -> Option<MigrationStatus> {
        self.last
    }

    pub fn is_finished(&self) -> bool {
        self.last.is_some_and(|status| status.is_terminal())
    }

    /// Publish `status`, optionally with failure text. Returns `false` if
    /// the status was dropped.
    pub fn emit(&mut self, status: MigrationStatus, text: Option<String>) -> bool {
        if self.is_finished() {
            warn!(migration = %self.migration, %status, "status after terminal status dropped");
            return false;
        }
        let mut update = StatusUpdate::new(self.migration.clone(), status);
        update.text = text;
        debug!(migration = %self.migration, %status, "sending status");
        if let Err(e) = self.queue.publish(Reply::Status(update)) {
            warn!(migration = %self.migration, %status, error = %e, "failed to publish status");
        }
        self.last = Some(status);
        true
    }

    /// Publish a log chunk unless the stream already ended.
    pub fn chunk(&self, chunk: LogChunk) {
        if self.is_finished() {
            warn!(migration = %self.migration, "log chunk after terminal status dropped");
            return;
        }
        if let Err(e) = self.queue.publish(Reply::LogChunk(chunk)) {
            warn!(migration = %self.migration, error = %e, "failed to publish log chunk");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use shipyard_queue::InMemoryQueue;

    #[test]
    fn nothing_follows_a_terminal_status() {
        let queue = InMemoryQueue::new();
        let mut tracker = StatusTracker::new(&queue, "m1");

        assert!(tracker.emit(MigrationStatus::Process, None));
        tracker.chunk(LogChunk::new("m1", "step 1\n"));
        assert!(tracker.emit(MigrationStatus::Done, None));
        assert!(!tracker.emit(MigrationStatus::Failed, Some("late".into())));
        tracker.chunk(LogChunk::new("m1", "late output"));

        assert_eq!(
            queue.replies(),
            vec![
                Reply::Status(StatusUpdate::new("m1", MigrationStatus::Process)),
                Reply::LogChunk(LogChunk::new("m1", "step 1\n")),
                Reply::Status(StatusUpdate::new("m1", MigrationStatus::Done)),
            ]
        );
        assert_eq!(tracker.last(), Some(MigrationStatus::Done));
    }

    #[test]
    fn not_ready_ends_the_stream() {
        let queue = InMemoryQueue::new();
        let mut tracker = StatusTracker::new(&queue, "m2");
        tracker.emit(MigrationStatus::Process, None);
        tracker.emit(MigrationStatus::New, None);
        assert!(tracker.is_finished());
    }
}
