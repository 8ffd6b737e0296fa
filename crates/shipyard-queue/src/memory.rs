use std::collections::VecDeque;
use std::sync::{Mutex, MutexGuard, PoisonError};

use shipyard_types::{Disposition, Task};

use crate::error::{QueueError, Result};
use crate::queue::{Delivery, DeliveryTag, Reply, TaskQueue};

#[derive(Debug, Default)]
struct State {
    next_tag: DeliveryTag,
    pending: VecDeque<Delivery>,
    outstanding: Vec<DeliveryTag>,
    replies: Vec<Reply>,
    settlements: Vec<(DeliveryTag, Disposition)>,
}

/// An in-memory queue that records everything the worker sends back.
///
/// `receive` returns `None` once the pending tasks are exhausted. Retried
/// tasks are recorded, not redelivered.
#[derive(Debug, Default)]
pub struct InMemoryQueue {
    state: Mutex<State>,
}

impl InMemoryQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a queue preloaded with `tasks`.
    pub fn with_tasks(tasks: impl IntoIterator<Item = Task>) -> Self {
        let queue = Self::new();
        for task in tasks {
            queue.push(task);
        }
        queue
    }

    /// Enqueue a task, returning its delivery tag.
    pub fn push(&self, task: Task) -> DeliveryTag {
        let mut state = self.lock();
        state.next_tag += 1;
        let tag = state.next_tag;
        state.pending.push_back(Delivery { tag, task });
        tag
    }

    /// Replies published so far, in order.
    pub fn replies(&self) -> Vec<Reply> {
        self.lock().replies.clone()
    }

    /// Settlements so far, in order.
    pub fn settlements(&self) -> Vec<(DeliveryTag, Disposition)> {
        self.lock().settlements.clone()
    }

    /// The disposition given to `tag`, if it was settled.
    pub fn disposition(&self, tag: DeliveryTag) -> Option<Disposition> {
        self.lock()
            .settlements
            .iter()
            .find(|(t, _)| *t == tag)
            .map(|(_, d)| *d)
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl TaskQueue for InMemoryQueue {
    fn receive(&self) -> Result<Option<Delivery>> {
        let mut state = self.lock();
        let delivery = state.pending.pop_front();
        if let Some(delivery) = &delivery {
            state.outstanding.push(delivery.tag);
        }
        Ok(delivery)
    }

    fn publish(&self, reply: Reply) -> Result<()> {
        self.lock().replies.push(reply);
        Ok(())
    }

    fn settle(&self, tag: DeliveryTag, disposition: Disposition) -> Result<()> {
        let mut state = self.lock();
        let Some(index) = state.outstanding.iter().position(|t| *t == tag) else {
            return Err(QueueError::UnknownTag(tag));
        };
        state.outstanding.swap_remove(index);
        state.settlements.push((tag, disposition));
        Ok(())
    }
}
