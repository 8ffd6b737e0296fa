use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;

use shipyard_queue::{Delivery, TaskQueue};
use shipyard_types::{Disposition, Task, TaskKind};
use tracing::{debug, error, info, info_span, warn};

use crate::error::Result;

// ---------------------------------------------------------------------------
// TaskHandler / Role
// ---------------------------------------------------------------------------

/// Handles the task kinds it declares.
///
/// `Ok` carries the disposition to settle with. `Err` means the handler
/// failed in a way it could not turn into a domain result; the loop logs it
/// and accepts the task.
pub trait TaskHandler: Send + Sync {
    fn kinds(&self) -> &'static [TaskKind];

    fn handle(&self, task: &Task, queue: &dyn TaskQueue) -> Result<Disposition>;
}

/// What a worker instance is deployed to do.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Role {
    /// Merge and branch creation tasks.
    Merge,
    /// Hard migrations.
    Migration,
}

impl Role {
    pub fn kinds(&self) -> &'static [TaskKind] {
        match self {
            Self::Merge => &[TaskKind::Merge, TaskKind::CreateBranch],
            Self::Migration => &[TaskKind::Migration],
        }
    }
}

/// Counters for one run of the loop.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct WorkerStats {
    pub received: usize,
    pub accepted: usize,
    pub retried: usize,
    /// Tasks accepted after their handler returned an error.
    pub failed: usize,
}

// ---------------------------------------------------------------------------
// TaskWorkerLoop
// ---------------------------------------------------------------------------

/// Receives one task at a time, dispatches it, and settles it.
pub struct TaskWorkerLoop {
    queue: Arc<dyn TaskQueue>,
    handlers: Vec<Arc<dyn TaskHandler>>,
}

impl TaskWorkerLoop {
    pub fn new(queue: Arc<dyn TaskQueue>) -> Self {
        Self {
            queue,
            handlers: Vec::new(),
        }
    }

    /// Register a handler. The first handler declaring a kind wins.
    pub fn register(mut self, handler: Arc<dyn TaskHandler>) -> Self {
        self.handlers.push(handler);
        self
    }

    /// Kinds this worker handles.
    pub fn kinds(&self) -> Vec<TaskKind> {
        let mut kinds: Vec<_> = self
            .handlers
            .iter()
            .flat_map(|handler| handler.kinds().iter().copied())
            .collect();
        kinds.sort();
        kinds.dedup();
        kinds
    }

    /// Run until the queue signals shutdown.
    ///
    /// Only queue failures end the loop early.
    pub fn run(&self) -> Result<WorkerStats> {
        let kinds = self.kinds();
        info!(?kinds, "start listening");
        let mut stats = WorkerStats::default();
        while let Some(delivery) = self.queue.receive()? {
            self.step(delivery, &mut stats)?;
        }
        info!(?stats, "queue closed, stopping");
        Ok(stats)
    }

    /// Handle and settle a single delivery. A handler that errors or panics
    /// still gets its task accepted.
    pub fn step(&self, delivery: Delivery, stats: &mut WorkerStats) -> Result<Disposition> {
        let Delivery { tag, task } = delivery;
        let kind = task.kind();
        let span = info_span!("task", tag, %kind);
        let _entered = span.enter();
        stats.received += 1;

        let disposition = match self.handler_for(kind) {
            None => {
                warn!("no handler registered for task kind, requeueing");
                Disposition::Retry
            }
            Some(handler) => {
                let handled = panic::catch_unwind(AssertUnwindSafe(|| {
                    handler.handle(&task, self.queue.as_ref())
                }));
                match handled {
                    Ok(Ok(disposition)) => disposition,
                    Ok(Err(e)) => {
                        error!(error = %e, "task failed");
                        stats.failed += 1;
                        Disposition::Accepted
                    }
                    Err(payload) => {
                        error!(panic = %panic_message(payload.as_ref()), "handler panicked");
                        stats.failed += 1;
                        Disposition::Accepted
                    }
                }
            }
        };

        match disposition {
            Disposition::Accepted => stats.accepted += 1,
            Disposition::Retry => stats.retried += 1,
        }
        self.queue.settle(tag, disposition)?;
        debug!(?disposition, "task settled");
        if disposition == Disposition::Accepted {
            info!("task accepted");
        }
        Ok(disposition)
    }

    fn handler_for(&self, kind: TaskKind) -> Option<&Arc<dyn TaskHandler>> {
        self.handlers
            .iter()
            .find(|handler| handler.kinds().contains(&kind))
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    payload
        .downcast_ref::<&str>()
        .copied()
        .or_else(|| payload.downcast_ref::<String>().map(String::as_str))
        .unwrap_or("non-string panic payload")
}
