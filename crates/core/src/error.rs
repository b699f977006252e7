// Central Error Type for the Pool

use crate::domain::JobResult;
use std::time::Duration;
use thiserror::Error;

/// Misuse of the producer/consumer protocol by the surrounding orchestration.
///
/// These are programming defects in the caller and are always reported
/// synchronously, never silently ignored.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProtocolMisuse {
    #[error("submit called after close_input")]
    SubmitAfterClose,

    #[error("close_input called more than once")]
    CloseTwice,

    #[error("drain requires the input queue to be closed first")]
    DrainBeforeClose,
}

/// Pool-level error type
#[derive(Error, Debug)]
pub enum PoolError {
    #[error("Protocol misuse: {0}")]
    ProtocolMisuse(#[from] ProtocolMisuse),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Operation cancelled")]
    Cancelled,

    #[error("Input queue is full")]
    QueueFull,

    #[error("No worker is consuming the input queue")]
    WorkersUnavailable,

    #[error("Result stream ended after {received} of {expected} results")]
    ResultsExhausted { expected: usize, received: usize },

    #[error("Timed out draining results: received {received} of {expected}")]
    DrainTimeout {
        expected: usize,
        received: usize,
        /// Results that did arrive before the deadline
        partial: Vec<JobResult>,
    },

    #[error("Workers did not terminate within {0:?}")]
    JoinTimeout(Duration),

    #[error("Runtime error: {0}")]
    Runtime(String),

    #[error("Worker task failed: {0}")]
    Worker(String),

}

impl PoolError {
    /// True for errors caused by the caller breaking the queue protocol
    pub fn is_protocol_misuse(&self) -> bool {
        matches!(self, PoolError::ProtocolMisuse(_))
    }
}

/// Result type alias using PoolError
pub type Result<T> = std::result::Result<T, PoolError>;

impl From<tokio::task::JoinError> for PoolError {
    fn from(err: tokio::task::JoinError) -> Self {
        if err.is_panic() {
            PoolError::Worker(format!("worker panicked: {}", err))
        } else {
            PoolError::Worker(format!("worker aborted: {}", err))
        }
    }
}
