// jobpool Core - Domain, Ports, Worker Pool
// NO subscriber setup, NO config loading, NO CLI (those live in the runner)

pub mod application;
pub mod domain;
pub mod error;
pub mod port;

pub use application::{cancel_channel, CancelHandle, CancelToken, WorkerPool};
pub use domain::{Job, JobId, JobResult, PoolConfig, WorkerId, WorkerState};
pub use error::{PoolError, ProtocolMisuse, Result};

pub const VERSION: &str = env!("CARGO_PKG_VERSION");
