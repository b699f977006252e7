// Application Layer - Worker loop and pool orchestration

pub mod pool;
pub mod worker;

// Re-exports
pub use pool::WorkerPool;
pub use worker::{
    cancel_channel, spawn_workers, CancelHandle, CancelToken, Worker, WorkerContext,
};
