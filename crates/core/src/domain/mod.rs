// Domain Layer - Jobs, results, worker lifecycle, pool sizing

pub mod error;
pub mod job;
pub mod queue;
pub mod worker;

// Re-exports
pub use error::TransformError;
pub use job::{Job, JobId, JobResult};
pub use queue::PoolConfig;
pub use worker::{ExitReason, WorkerId, WorkerReport, WorkerState};
