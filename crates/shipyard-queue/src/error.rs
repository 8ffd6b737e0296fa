use std::io;

/// Errors that can occur while talking to a task queue.
#[derive(Debug, thiserror::Error)]
pub enum QueueError {
    /// Reading deliveries or writing replies failed.
    #[error("queue io error: {0}")]
    Io(#[from] io::Error),

    /// An outgoing message could not be serialized.
    #[error("failed to encode message: {0}")]
    Encode(#[from] serde_json::Error),

    /// The delivery was already settled or was never handed out.
    #[error("unknown delivery tag {0}")]
    UnknownTag(u64),
}

/// Convenience type alias for queue operations.
pub type Result<T> = std::result::Result<T, QueueError>;
