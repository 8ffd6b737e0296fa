//! Task queue abstraction for the shipyard worker.
//!
//! The worker never talks to a broker directly. It blocks on
//! [`TaskQueue::receive`] for the next [`Delivery`], publishes [`Reply`]
//! messages (migration statuses, log chunks, merge results) while handling
//! it, and finally settles the delivery with exactly one
//! [`Disposition`](shipyard_types::Disposition).
//!
//! # Modules
//!
//! - [`queue`]: [`TaskQueue`], [`Delivery`], and [`Reply`]
//! - [`memory`]: [`InMemoryQueue`], a recording queue for tests
//! - [`jsonl`]: [`JsonLinesQueue`], tasks and replies as JSON lines over any reader/writer
//! - [`error`]: Error types

pub mod error;
pub mod jsonl;
pub mod memory;
pub mod queue;

pub use error::{QueueError, Result};
pub use jsonl::JsonLinesQueue;
pub use memory::InMemoryQueue;
pub use queue::{Delivery, DeliveryTag, Reply, TaskQueue};
