use serde::{Deserialize, Serialize};
use shipyard_types::{Disposition, LogChunk, MergeTaskResult, StatusUpdate, Task};

use crate::error::Result;

/// Identifies one delivery for settlement.
pub type DeliveryTag = u64;

/// A task handed to the worker, awaiting settlement.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Delivery {
    pub tag: DeliveryTag,
    pub task: Task,
}

/// A message the worker sends back while handling a task.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "reply", rename_all = "snake_case")]
pub enum Reply {
    Status(StatusUpdate),
    LogChunk(LogChunk),
    MergeResult(MergeTaskResult),
}

impl From<StatusUpdate> for Reply {
    fn from(update: StatusUpdate) -> Self {
        Self::Status(update)
    }
}

impl From<LogChunk> for Reply {
    fn from(chunk: LogChunk) -> Self {
        Self::LogChunk(chunk)
    }
}

impl From<MergeTaskResult> for Reply {
    fn from(result: MergeTaskResult) -> Self {
        Self::MergeResult(result)
    }
}

/// The queue collaborator as seen by the worker.
///
/// Redelivery of retried tasks and delivery guarantees belong to the
/// implementation; the worker only promises to settle every delivery it
/// receives exactly once.
pub trait TaskQueue: Send + Sync {
    /// Block until the next task arrives. `None` means shut down.
    fn receive(&self) -> Result<Option<Delivery>>;

    /// Send a reply for the task currently being handled.
    fn publish(&self, reply: Reply) -> Result<()>;

    /// Settle a delivery.
    fn settle(&self, tag: DeliveryTag, disposition: Disposition) -> Result<()>;
}
