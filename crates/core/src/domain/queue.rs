// Pool Sizing Model

use crate::error::{PoolError, Result};
use serde::{Deserialize, Serialize};

/// Default number of worker units
pub const DEFAULT_WORKER_COUNT: usize = 3;

/// Default bound on the input queue
pub const DEFAULT_INPUT_CAPACITY: usize = 5;

/// Default bound on the output queue
pub const DEFAULT_OUTPUT_CAPACITY: usize = 5;

/// Upper bound on worker units per pool
pub const MAX_WORKER_COUNT: usize = 1024;

/// Upper bound on either queue (tokio mpsc rejects absurd buffers)
pub const MAX_QUEUE_CAPACITY: usize = 1 << 20;

/// Pool configuration accepted at construction
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PoolConfig {
    pub worker_count: usize,
    pub input_capacity: usize,
    pub output_capacity: usize,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            worker_count: DEFAULT_WORKER_COUNT,
            input_capacity: DEFAULT_INPUT_CAPACITY,
            output_capacity: DEFAULT_OUTPUT_CAPACITY,
        }
    }
}

impl PoolConfig {
    pub fn new(worker_count: usize, input_capacity: usize, output_capacity: usize) -> Self {
        Self {
            worker_count,
            input_capacity,
            output_capacity,
        }
    }

    /// Same queue bounds as the default, different parallelism
    pub fn with_workers(worker_count: usize) -> Self {
        Self {
            worker_count,
            ..Self::default()
        }
    }

    /// Reject sizes the pool cannot run with
    pub fn validate(&self) -> Result<()> {
        if self.worker_count == 0 {
            return Err(PoolError::Config(
                "worker_count must be at least 1".to_string(),
            ));
        }
        if self.worker_count > MAX_WORKER_COUNT {
            return Err(PoolError::Config(format!(
                "worker_count {} exceeds maximum {}",
                self.worker_count, MAX_WORKER_COUNT
            )));
        }
        for (name, capacity) in [
            ("input_capacity", self.input_capacity),
            ("output_capacity", self.output_capacity),
        ] {
            if capacity == 0 {
                return Err(PoolError::Config(format!("{} must be at least 1", name)));
            }
            if capacity > MAX_QUEUE_CAPACITY {
                return Err(PoolError::Config(format!(
                    "{} {} exceeds maximum {}",
                    name, capacity, MAX_QUEUE_CAPACITY
                )));
            }
        }
        Ok(())
    }
}
