use shipyard_merge::MergeConflictResolver;
use shipyard_queue::{Reply, TaskQueue};
use shipyard_refs::BranchFilter;
use shipyard_types::{CreateBranchTask, Disposition, MergeTask, Task, TaskKind};
use tracing::{info, warn};

use crate::error::Result;
use crate::worker::TaskHandler;

/// Handles merge and branch creation tasks for one worker instance.
pub struct MergeHandler {
    resolver: MergeConflictResolver,
    filter: BranchFilter,
}

impl MergeHandler {
    pub fn new(resolver: MergeConflictResolver, filter: BranchFilter) -> Self {
        Self { resolver, filter }
    }

    /// Merge, publish, and report. Disallowed target branches are retried
    /// before any repository work.
    pub fn merge(&self, task: &MergeTask, queue: &dyn TaskQueue) -> Result<Disposition> {
        if !self.filter.is_allowed(&task.target_branch) {
            warn!(
                target = %task.target_branch,
                "skip merge task to branch {} as it is not allowed", task.target_branch
            );
            return Ok(Disposition::Retry);
        }

        let result = self.resolver.resolve(task)?;
        info!(feature = %task.feature_id, success = result.success, "sending merge result");
        queue.publish(Reply::MergeResult(result))?;
        Ok(Disposition::Accepted)
    }

    pub fn create_branch(&self, task: &CreateBranchTask) -> Result<Disposition> {
        self.resolver.create_branch(task)?;
        Ok(Disposition::Accepted)
    }
}

impl TaskHandler for MergeHandler {
    fn kinds(&self) -> &'static [TaskKind] {
        &[TaskKind::Merge, TaskKind::CreateBranch]
    }

    fn handle(&self, task: &Task, queue: &dyn TaskQueue) -> Result<Disposition> {
        match task {
            Task::Merge(merge) => self.merge(merge, queue),
            Task::CreateBranch(create) => self.create_branch(create),
            other => {
                warn!(kind = %other.kind(), "merge handler received a foreign task");
                Ok(Disposition::Retry)
            }
        }
    }
}
