// Observer Port
// Structured per-job events instead of shared stdout writes

use crate::domain::{ExitReason, JobId, WorkerId};
use serde::Serialize;
use std::sync::Mutex;
use tracing::{debug, info};

/// What happened in a worker
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EventKind {
    Started,
    JobReceived,
    JobCompleted,
    Terminated { reason: ExitReason },
}

/// A single worker event
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct WorkerEvent {
    pub worker_id: WorkerId,
    pub job_id: Option<JobId>,
    #[serde(flatten)]
    pub kind: EventKind,
    pub at_millis: i64,
}

/// Sink for worker events.
///
/// Called synchronously from worker tasks, so implementations must not
/// block.
pub trait PoolObserver: Send + Sync {
    fn on_event(&self, event: &WorkerEvent);
}

/// Emits every event through `tracing` (production default)
pub struct TracingObserver;

impl PoolObserver for TracingObserver {
    fn on_event(&self, event: &WorkerEvent) {
        match event.kind {
            EventKind::Started => {
                debug!(worker_id = %event.worker_id, at_millis = event.at_millis, "Worker started")
            }
            EventKind::JobReceived => debug!(
                worker_id = %event.worker_id,
                job_id = ?event.job_id,
                at_millis = event.at_millis,
                "Job received"
            ),
            EventKind::JobCompleted => debug!(
                worker_id = %event.worker_id,
                job_id = ?event.job_id,
                at_millis = event.at_millis,
                "Job completed"
            ),
            EventKind::Terminated { reason } => info!(
                worker_id = %event.worker_id,
                reason = %reason,
                at_millis = event.at_millis,
                "Worker terminated"
            ),
        }
    }
}

/// Discards every event
pub struct NoopObserver;

impl PoolObserver for NoopObserver {
    fn on_event(&self, _event: &WorkerEvent) {}
}

/// Records events in memory for later inspection
#[derive(Default)]
pub struct CollectingObserver {
    events: Mutex<Vec<WorkerEvent>>,
}

impl CollectingObserver {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of all events recorded so far, in arrival order
    pub fn events(&self) -> Vec<WorkerEvent> {
        match self.events.lock() {
            Ok(events) => events.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    /// Number of recorded events matching `pred`
    pub fn count(&self, pred: impl Fn(&WorkerEvent) -> bool) -> usize {
        self.events().iter().filter(|e| pred(e)).count()
    }
}

impl PoolObserver for CollectingObserver {
    fn on_event(&self, event: &WorkerEvent) {
        let mut events = match self.events.lock() {
            Ok(events) => events,
            Err(poisoned) => poisoned.into_inner(),
        };
        events.push(event.clone());
    }
}
