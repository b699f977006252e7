// Worker - Job processing loop

mod cancel;
pub mod constants;
mod panic_guard;

use constants::*;
pub use cancel::{cancel_channel, CancelHandle, CancelToken};
pub use panic_guard::{execute_guarded, panic_message, PanicGuardResult};

use crate::domain::{
    ExitReason, Job, JobId, JobResult, TransformError, WorkerId, WorkerReport, WorkerState,
};
use crate::port::{EventKind, PoolObserver, TimeProvider, Transform, WorkerEvent};
use std::sync::Arc;
use tokio::sync::{mpsc, watch, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

/// Input queue receiver shared by every worker (multi-consumer)
pub type SharedInput = Arc<Mutex<mpsc::Receiver<Job>>>;

/// Dependencies every worker needs besides the two queues
#[derive(Clone)]
pub struct WorkerContext {
    pub transform: Arc<dyn Transform>,
    pub observer: Arc<dyn PoolObserver>,
    pub time_provider: Arc<dyn TimeProvider>,
    pub cancel: CancelToken,
}

/// Handle to a spawned worker task
pub struct WorkerHandle {
    pub id: WorkerId,
    pub state: watch::Receiver<WorkerState>,
    pub task: JoinHandle<WorkerReport>,
}

/// Launch `worker_count` workers on the current tokio runtime.
///
/// Each worker pulls from the shared `input`, applies the transform and
/// pushes onto `output`, until the input is closed and empty or the context
/// is cancelled. The caller keeps ownership of the producer side of `input`
/// and of the receiver of `output`; every worker gets its own clone of the
/// `output` sender, so the result stream ends once all workers terminate.
///
/// Must be called from within a tokio runtime.
pub fn spawn_workers(
    worker_count: usize,
    input: SharedInput,
    output: mpsc::Sender<JobResult>,
    ctx: WorkerContext,
) -> Vec<WorkerHandle> {
    (0..worker_count)
        .map(|idx| {
            let id = WorkerId::new(FIRST_WORKER_ID + idx as u32);
            let (state_tx, state_rx) = watch::channel(WorkerState::Idle);
            let worker = Worker::new(id, Arc::clone(&input), output.clone(), ctx.clone(), state_tx);
            let task = tokio::spawn(worker.run());
            WorkerHandle {
                id,
                state: state_rx,
                task,
            }
        })
        .collect()
}

/// Single worker unit
pub struct Worker {
    id: WorkerId,
    input: SharedInput,
    output: mpsc::Sender<JobResult>,
    ctx: WorkerContext,
    state: watch::Sender<WorkerState>,
}

impl Worker {
    pub fn new(
        id: WorkerId,
        input: SharedInput,
        output: mpsc::Sender<JobResult>,
        ctx: WorkerContext,
        state: watch::Sender<WorkerState>,
    ) -> Self {
        Self {
            id,
            input,
            output,
            ctx,
            state,
        }
    }

    /// Run the worker loop until input is exhausted, the consumer is gone,
    /// or cancellation fires.
    pub async fn run(self) -> WorkerReport {
        self.emit(EventKind::Started, None);
        let mut jobs_processed = 0u64;

        let exit = loop {
            self.set_state(WorkerState::Idle);

            let next = tokio::select! {
                biased;
                _ = self.ctx.cancel.cancelled() => break ExitReason::Cancelled,
                job = self.next_job() => job,
            };
            let Some(job) = next else {
                break ExitReason::InputExhausted;
            };

            self.set_state(WorkerState::Running);
            self.emit(EventKind::JobReceived, Some(job.id));
            let result = self.process(job).await;

            tokio::select! {
                biased;
                _ = self.ctx.cancel.cancelled() => {
                    debug!(worker_id = %self.id, job_id = %job.id, "Result discarded on cancellation");
                    break ExitReason::Cancelled;
                }
                sent = self.output.send(result) => {
                    if sent.is_err() {
                        warn!(worker_id = %self.id, job_id = %job.id, "Output queue closed, result dropped");
                        break ExitReason::ConsumerGone;
                    }
                }
            }

            jobs_processed += 1;
            self.emit(EventKind::JobCompleted, Some(job.id));
        };

        self.set_state(WorkerState::Terminated);
        self.emit(EventKind::Terminated { reason: exit }, None);

        WorkerReport {
            worker_id: self.id,
            jobs_processed,
            exit,
        }
    }

    /// Dequeue the next job; `None` once the input is closed and empty
    async fn next_job(&self) -> Option<Job> {
        let mut input = self.input.lock().await;
        input.recv().await
    }

    /// Apply the transform off the async threads, with panic isolation
    async fn process(&self, job: Job) -> JobResult {
        let transform = Arc::clone(&self.ctx.transform);
        let output = match execute_guarded(move || transform.apply(job.value)).await {
            PanicGuardResult::Success(output) => output,
            PanicGuardResult::Panicked(msg) => Err(TransformError::Panicked(msg)),
            PanicGuardResult::Aborted(msg) => Err(TransformError::Aborted(msg)),
        };

        if let Err(e) = &output {
            warn!(worker_id = %self.id, job_id = %job.id, error = %e, "Transform failed");
        }

        JobResult {
            job,
            worker_id: self.id,
            output,
        }
    }

    fn set_state(&self, next: WorkerState) {
        self.state.send_if_modified(|current| {
            if *current == next {
                return false;
            }
            debug_assert!(
                current.can_transition_to(next),
                "illegal worker transition {} -> {}",
                current,
                next
            );
            *current = next;
            true
        });
    }

    fn emit(&self, kind: EventKind, job_id: Option<JobId>) {
        let event = WorkerEvent {
            worker_id: self.id,
            job_id,
            kind,
            at_millis: self.ctx.time_provider.now_millis(),
        };
        self.ctx.observer.on_event(&event);
    }
}
