// Transform Error Types

use serde::Serialize;
use thiserror::Error;

/// Failure of a transform on a single job.
///
/// A failed transform still yields exactly one result for its job: the error
/// travels to the consumer inside [`JobResult`](super::JobResult) instead of
/// the job being dropped or retried.
#[derive(Error, Debug, Clone, PartialEq, Eq, Serialize)]
pub enum TransformError {
    #[error("Arithmetic overflow transforming {0}")]
    Overflow(i64),

    #[error("Transform rejected value: {0}")]
    Rejected(String),

    #[error("Transform panicked: {0}")]
    Panicked(String),

    #[error("Transform aborted: {0}")]
    Aborted(String),
}
