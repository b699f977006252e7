// Worker constants (no magic values)
use std::time::Duration;

/// How long `WorkerPool::shutdown` waits for workers before giving up (5s)
pub const DEFAULT_SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(5);

/// First worker id; ids run `FIRST_WORKER_ID..=worker_count`
pub const FIRST_WORKER_ID: u32 = 1;

/// First job id handed out by `WorkerPool::submit`
pub const FIRST_JOB_ID: u64 = 1;
