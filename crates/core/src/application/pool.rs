//! Bounded worker pool.
//!
//! [`WorkerPool`] owns the producer side of a bounded input queue and the
//! consumer side of a bounded output queue, with `worker_count` workers in
//! between. The producer submits jobs and closes the input exactly once; the
//! consumer drains results. Result order is unrelated to submission order.
//!
//! Draining contract: a consumer that stops reading before every result has
//! arrived leaves workers suspended on a full output queue. Use
//! [`WorkerPool::collect_results_timeout`], [`WorkerPool::cancel`] or
//! [`WorkerPool::shutdown`] to bound that wait.

use super::worker::constants::{DEFAULT_SHUTDOWN_TIMEOUT, FIRST_JOB_ID};
use super::worker::{cancel_channel, spawn_workers, CancelHandle, CancelToken, WorkerContext};
use crate::domain::{Job, JobId, JobResult, PoolConfig, WorkerId, WorkerReport, WorkerState};
use crate::error::{PoolError, ProtocolMisuse, Result};
use crate::port::{
    Doubling, PoolObserver, SystemTimeProvider, TimeProvider, TracingObserver, Transform,
};
use futures::future::join_all;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::{mpsc, watch, Mutex};
use tokio::task::JoinHandle;
use tokio::time::{timeout, timeout_at, Instant};
use tracing::{debug, info, trace, warn};

/// Fixed-size pool of workers between two bounded queues
pub struct WorkerPool {
    config: PoolConfig,
    input: std::sync::Mutex<Option<mpsc::Sender<Job>>>,
    output: Mutex<mpsc::Receiver<JobResult>>,
    next_job_id: AtomicU64,
    workers: Vec<(WorkerId, watch::Receiver<WorkerState>)>,
    tasks: Vec<JoinHandle<WorkerReport>>,
    cancel: CancelHandle,
    token: CancelToken,
}

impl WorkerPool {
    /// Validate `config`, create both queues and launch the workers.
    ///
    /// # Errors
    /// - `PoolError::Config` if the sizing is invalid
    /// - `PoolError::Runtime` if called outside a tokio runtime
    pub fn start(
        config: PoolConfig,
        transform: Arc<dyn Transform>,
        observer: Arc<dyn PoolObserver>,
        time_provider: Arc<dyn TimeProvider>,
    ) -> Result<Self> {
        config.validate()?;
        tokio::runtime::Handle::try_current().map_err(|e| PoolError::Runtime(e.to_string()))?;

        let (input_tx, input_rx) = mpsc::channel(config.input_capacity);
        let (output_tx, output_rx) = mpsc::channel(config.output_capacity);
        let (cancel, token) = cancel_channel();

        let ctx = WorkerContext {
            transform,
            observer,
            time_provider,
            cancel: token.clone(),
        };
        let handles = spawn_workers(
            config.worker_count,
            Arc::new(Mutex::new(input_rx)),
            output_tx,
            ctx,
        );

        let mut workers = Vec::with_capacity(handles.len());
        let mut tasks = Vec::with_capacity(handles.len());
        for handle in handles {
            workers.push((handle.id, handle.state));
            tasks.push(handle.task);
        }

        info!(
            worker_count = config.worker_count,
            input_capacity = config.input_capacity,
            output_capacity = config.output_capacity,
            "Worker pool started"
        );

        Ok(Self {
            config,
            input: std::sync::Mutex::new(Some(input_tx)),
            output: Mutex::new(output_rx),
            next_job_id: AtomicU64::new(FIRST_JOB_ID),
            workers,
            tasks,
            cancel,
            token,
        })
    }

    /// Start a pool that doubles every value and logs events via `tracing`
    pub fn with_defaults(config: PoolConfig) -> Result<Self> {
        Self::start(
            config,
            Arc::new(Doubling),
            Arc::new(TracingObserver),
            Arc::new(SystemTimeProvider),
        )
    }

    pub fn config(&self) -> &PoolConfig {
        &self.config
    }

    pub fn worker_count(&self) -> usize {
        self.workers.len()
    }

    // ------------------------------------------------------------------
    // Producer side
    // ------------------------------------------------------------------

    /// Enqueue one job, suspending while the input queue is full.
    ///
    /// The job id is assigned only once a queue slot is reserved, so rejected
    /// submissions never consume an id.
    ///
    /// # Errors
    /// - `ProtocolMisuse::SubmitAfterClose` after `close_input`, even on a
    ///   cancelled pool; the job is not enqueued
    /// - `PoolError::Cancelled` if the pool is (or becomes) cancelled
    /// - `PoolError::WorkersUnavailable` if every worker has already exited
    pub async fn submit(&self, value: i64) -> Result<JobId> {
        let sender = self.input_sender()?;
        if self.token.is_cancelled() {
            return Err(PoolError::Cancelled);
        }

        let permit = tokio::select! {
            biased;
            _ = self.token.cancelled() => return Err(PoolError::Cancelled),
            permit = sender.reserve() => permit.map_err(|_| self.input_gone())?,
        };

        let job = Job::new(self.allocate_id(), value);
        permit.send(job);
        trace!(job_id = %job.id, value, "Job submitted");
        Ok(job.id)
    }

    /// Enqueue one job without suspending.
    ///
    /// # Errors
    /// Same as [`submit`](Self::submit), plus `PoolError::QueueFull` when the
    /// input queue is at capacity.
    pub fn try_submit(&self, value: i64) -> Result<JobId> {
        let sender = self.input_sender()?;
        if self.token.is_cancelled() {
            return Err(PoolError::Cancelled);
        }

        let permit = match sender.try_reserve() {
            Ok(permit) => permit,
            Err(TrySendError::Full(())) => return Err(PoolError::QueueFull),
            Err(TrySendError::Closed(())) => return Err(self.input_gone()),
        };

        let job = Job::new(self.allocate_id(), value);
        permit.send(job);
        trace!(job_id = %job.id, value, "Job submitted");
        Ok(job.id)
    }

    /// Close the input queue. Jobs already queued are still delivered; once
    /// the queue is empty every worker terminates.
    ///
    /// # Errors
    /// `ProtocolMisuse::CloseTwice` on any call after the first.
    pub fn close_input(&self) -> Result<()> {
        match self.input_slot().take() {
            Some(_sender) => {
                info!(submitted = self.submitted(), "Input queue closed");
                Ok(())
            }
            None => {
                warn!("close_input called on an already closed input queue");
                Err(ProtocolMisuse::CloseTwice.into())
            }
        }
    }

    pub fn is_input_closed(&self) -> bool {
        self.input_slot().is_none()
    }

    /// Number of jobs accepted onto the input queue so far
    pub fn submitted(&self) -> u64 {
        self.next_job_id.load(Ordering::SeqCst) - FIRST_JOB_ID
    }

    // ------------------------------------------------------------------
    // Consumer side
    // ------------------------------------------------------------------

    /// Blocking read of the next result.
    ///
    /// Returns `Ok(None)` once every worker has terminated and the output
    /// queue is empty.
    pub async fn next_result(&self) -> Result<Option<JobResult>> {
        tokio::select! {
            biased;
            _ = self.token.cancelled() => Err(PoolError::Cancelled),
            result = self.recv_result() => Ok(result),
        }
    }

    /// Drain exactly `expected` results.
    ///
    /// # Errors
    /// - `PoolError::ResultsExhausted` if the stream ends first (more results
    ///   were expected than jobs were submitted)
    /// - `PoolError::Cancelled` if the pool is cancelled while waiting
    pub async fn collect_results(&self, expected: usize) -> Result<Vec<JobResult>> {
        let mut results = Vec::with_capacity(expected.min(self.config.output_capacity * 4));
        while results.len() < expected {
            match self.next_result().await? {
                Some(result) => results.push(result),
                None => {
                    return Err(PoolError::ResultsExhausted {
                        expected,
                        received: results.len(),
                    })
                }
            }
        }
        debug!(count = results.len(), "Results collected");
        Ok(results)
    }

    /// Drain exactly `expected` results, giving up after `limit`.
    ///
    /// On timeout the results received so far travel back inside
    /// `PoolError::DrainTimeout`, so nothing already drained is lost.
    pub async fn collect_results_timeout(
        &self,
        expected: usize,
        limit: Duration,
    ) -> Result<Vec<JobResult>> {
        let deadline = Instant::now() + limit;
        let mut results = Vec::with_capacity(expected.min(self.config.output_capacity * 4));

        while results.len() < expected {
            let next = match timeout_at(deadline, self.next_result()).await {
                Ok(next) => next?,
                Err(_) => {
                    warn!(expected, received = results.len(), "Result drain timed out");
                    return Err(PoolError::DrainTimeout {
                        expected,
                        received: results.len(),
                        partial: results,
                    });
                }
            };
            match next {
                Some(result) => results.push(result),
                None => {
                    return Err(PoolError::ResultsExhausted {
                        expected,
                        received: results.len(),
                    })
                }
            }
        }
        debug!(count = results.len(), "Results collected");
        Ok(results)
    }

    /// Read results until the stream ends, for callers that do not know the
    /// total in advance.
    ///
    /// # Errors
    /// `ProtocolMisuse::DrainBeforeClose` if the input is still open, since
    /// the stream could never end.
    pub async fn drain(&self) -> Result<Vec<JobResult>> {
        if !self.is_input_closed() {
            return Err(ProtocolMisuse::DrainBeforeClose.into());
        }
        let mut results = Vec::new();
        while let Some(result) = self.next_result().await? {
            results.push(result);
        }
        debug!(count = results.len(), "Result stream drained");
        Ok(results)
    }

    // ------------------------------------------------------------------
    // Lifecycle
    // ------------------------------------------------------------------

    /// Current state of every worker, ordered by worker id
    pub fn worker_states(&self) -> Vec<(WorkerId, WorkerState)> {
        self.workers
            .iter()
            .map(|(id, state)| (*id, *state.borrow()))
            .collect()
    }

    /// Wait until every worker reaches `Terminated`.
    ///
    /// # Errors
    /// `PoolError::JoinTimeout` if any worker is still alive after `limit`.
    pub async fn wait_terminated(&self, limit: Duration) -> Result<()> {
        let waits = self.workers.iter().map(|(_, state)| {
            let mut state = state.clone();
            async move {
                // Err means the worker task is gone, which is terminal too
                let _ = state.wait_for(|s| s.is_terminal()).await;
            }
        });

        timeout(limit, join_all(waits))
            .await
            .map(|_| ())
            .map_err(|_| PoolError::JoinTimeout(limit))
    }

    /// Abort every suspension point: blocked submits and reads return
    /// `PoolError::Cancelled`, workers exit without finishing queued jobs.
    pub fn cancel(&self) {
        if !self.cancel.is_cancelled() {
            warn!("Worker pool cancelled");
        }
        self.cancel.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Handle that can cancel this pool from elsewhere (e.g. a signal task)
    pub fn cancel_handle(&self) -> CancelHandle {
        self.cancel.clone()
    }

    /// Shut down with the default timeout.
    pub async fn shutdown(self) -> Result<Vec<WorkerReport>> {
        self.shutdown_with_timeout(DEFAULT_SHUTDOWN_TIMEOUT).await
    }

    /// Close the input if still open, release the consumer side and wait for
    /// every worker.
    ///
    /// Results not yet drained are discarded, so no worker can stay
    /// suspended on a full output queue. Workers still running after `limit`
    /// are cancelled.
    pub async fn shutdown_with_timeout(self, limit: Duration) -> Result<Vec<WorkerReport>> {
        let Self {
            input,
            output,
            tasks,
            cancel,
            ..
        } = self;

        if input
            .into_inner()
            .unwrap_or_else(PoisonError::into_inner)
            .is_some()
        {
            debug!("Closing input queue during shutdown");
        }
        drop(output);

        info!(workers = tasks.len(), "Waiting for workers to terminate");
        let joined = match timeout(limit, join_all(tasks)).await {
            Ok(joined) => joined,
            Err(_) => {
                warn!(timeout = ?limit, "Workers did not terminate in time, cancelling");
                cancel.cancel();
                return Err(PoolError::JoinTimeout(limit));
            }
        };

        let mut reports = Vec::with_capacity(joined.len());
        for report in joined {
            let report = report?;
            info!(
                worker_id = %report.worker_id,
                jobs_processed = report.jobs_processed,
                exit = %report.exit,
                "Worker joined"
            );
            reports.push(report);
        }
        info!("Worker pool shutdown complete");
        Ok(reports)
    }

    // ------------------------------------------------------------------
    // Internals
    // ------------------------------------------------------------------

    fn input_slot(&self) -> MutexGuard<'_, Option<mpsc::Sender<Job>>> {
        self.input.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Clone of the input sender, so the lock is never held across a send
    fn input_sender(&self) -> Result<mpsc::Sender<Job>> {
        match self.input_slot().as_ref() {
            Some(sender) => Ok(sender.clone()),
            None => {
                warn!("submit called after input queue was closed");
                Err(ProtocolMisuse::SubmitAfterClose.into())
            }
        }
    }

    /// Error for an input queue whose receiver is gone: cancelled workers
    /// release it too, and cancellation must win over that race.
    fn input_gone(&self) -> PoolError {
        if self.token.is_cancelled() {
            PoolError::Cancelled
        } else {
            PoolError::WorkersUnavailable
        }
    }

    fn allocate_id(&self) -> JobId {
        JobId::new(self.next_job_id.fetch_add(1, Ordering::SeqCst))
    }

    async fn recv_result(&self) -> Option<JobResult> {
        let mut output = self.output.lock().await;
        output.recv().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::port::transform::mocks::{MockBehavior, MockTransform};
    use crate::port::{CollectingObserver, EventKind};
    use tokio_test::{assert_pending, assert_ready_ok, task};

    fn pool(config: PoolConfig) -> WorkerPool {
        WorkerPool::start(
            config,
            Arc::new(Doubling),
            Arc::new(CollectingObserver::new()),
            Arc::new(SystemTimeProvider),
        )
        .unwrap()
    }

    fn sorted_values(results: &[JobResult]) -> Vec<i64> {
        let mut values: Vec<i64> = results.iter().filter_map(JobResult::value).collect();
        values.sort();
        values
    }

    #[test]
    fn test_start_outside_runtime_is_rejected() {
        let result = WorkerPool::with_defaults(PoolConfig::default());
        assert!(matches!(result, Err(PoolError::Runtime(_))));
    }

    #[tokio::test]
    async fn test_start_rejects_invalid_config() {
        let result = WorkerPool::with_defaults(PoolConfig::new(0, 5, 5));
        assert!(matches!(result, Err(PoolError::Config(_))));
    }

    #[tokio::test]
    async fn test_reference_scenario() {
        let pool = pool(PoolConfig::default());
        for v in 1..=5 {
            pool.submit(v).await.unwrap();
        }
        pool.close_input().unwrap();

        let results = pool.collect_results(5).await.unwrap();
        assert_eq!(sorted_values(&results), vec![2, 4, 6, 8, 10]);

        pool.wait_terminated(Duration::from_secs(2)).await.unwrap();
        assert!(pool
            .worker_states()
            .iter()
            .all(|(_, state)| *state == WorkerState::Terminated));
        assert_eq!(pool.worker_states().len(), 3);
    }

    #[tokio::test]
    async fn test_submit_after_close_is_protocol_misuse() {
        let pool = pool(PoolConfig::default());
        pool.close_input().unwrap();

        let err = pool.submit(1).await.unwrap_err();
        assert!(matches!(
            err,
            PoolError::ProtocolMisuse(ProtocolMisuse::SubmitAfterClose)
        ));
        assert!(matches!(
            pool.try_submit(1),
            Err(PoolError::ProtocolMisuse(ProtocolMisuse::SubmitAfterClose))
        ));
        // Nothing was enqueued
        assert!(pool.drain().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_close_twice_is_protocol_misuse() {
        let pool = pool(PoolConfig::default());
        pool.close_input().unwrap();
        let err = pool.close_input().unwrap_err();
        assert!(err.is_protocol_misuse());
        assert!(err.to_string().contains("more than once"));
    }

    #[tokio::test]
    async fn test_drain_before_close_is_protocol_misuse() {
        let pool = pool(PoolConfig::default());
        assert!(matches!(
            pool.drain().await,
            Err(PoolError::ProtocolMisuse(ProtocolMisuse::DrainBeforeClose))
        ));
    }

    // Current-thread runtime: workers only run when the test yields
    #[tokio::test]
    async fn test_try_submit_reports_full_queue() {
        let pool = pool(PoolConfig::new(1, 1, 1));
        pool.try_submit(1).unwrap();
        assert!(matches!(pool.try_submit(2), Err(PoolError::QueueFull)));
    }

    #[tokio::test]
    async fn test_submit_suspends_until_worker_frees_slot() {
        let pool = pool(PoolConfig::new(1, 1, 4));
        pool.try_submit(1).unwrap();

        let mut blocked = task::spawn(pool.submit(2));
        assert_pending!(blocked.poll());

        // Let the worker dequeue job 1
        timeout(Duration::from_secs(2), async {
            while !blocked.is_woken() {
                tokio::task::yield_now().await;
            }
        })
        .await
        .expect("worker should free an input slot");

        let id = assert_ready_ok!(blocked.poll());
        assert_eq!(id, JobId::new(2));
    }

    #[tokio::test]
    async fn test_rejected_submits_consume_no_job_id() {
        let pool = pool(PoolConfig::new(1, 1, 1));
        assert_eq!(pool.try_submit(1).unwrap(), JobId::new(1));
        for v in 2..=6 {
            assert!(matches!(pool.try_submit(v), Err(PoolError::QueueFull)));
        }
        assert_eq!(pool.submitted(), 1);

        // Worker frees the slot; the next accepted job gets the next id
        let id = timeout(Duration::from_secs(2), async {
            loop {
                match pool.try_submit(7) {
                    Ok(id) => break id,
                    Err(PoolError::QueueFull) => tokio::task::yield_now().await,
                    Err(e) => panic!("unexpected: {}", e),
                }
            }
        })
        .await
        .expect("worker should free an input slot");
        assert_eq!(id, JobId::new(2));
        assert_eq!(pool.submitted(), 2);

        pool.cancel();
        assert!(matches!(pool.submit(8).await, Err(PoolError::Cancelled)));
        assert!(matches!(pool.try_submit(9), Err(PoolError::Cancelled)));
        assert_eq!(pool.submitted(), 2);
    }

    #[tokio::test]
    async fn test_close_then_cancel_still_reports_submit_after_close() {
        let pool = pool(PoolConfig::default());
        pool.close_input().unwrap();
        pool.cancel();

        let err = pool.submit(1).await.unwrap_err();
        assert!(matches!(
            err,
            PoolError::ProtocolMisuse(ProtocolMisuse::SubmitAfterClose)
        ));
        assert!(pool.try_submit(1).unwrap_err().is_protocol_misuse());
        assert_eq!(pool.submitted(), 0);
    }

    // Cancelled workers drop the input receiver on the same wake that
    // releases the producer; the producer must still see `Cancelled`.
    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_cancel_beats_released_input_queue_for_blocked_producer() {
        for round in 0..25 {
            let pool = Arc::new(pool(PoolConfig::new(1, 1, 1)));
            let producer = {
                let pool = Arc::clone(&pool);
                tokio::spawn(async move {
                    let mut value = 0;
                    loop {
                        if let Err(e) = pool.submit(value).await {
                            return e;
                        }
                        value += 1;
                    }
                })
            };

            // One result queued, one worker holding a result, one job queued
            timeout(Duration::from_secs(2), async {
                while pool.submitted() < 3 {
                    tokio::time::sleep(Duration::from_millis(1)).await;
                }
            })
            .await
            .expect("producer should fill both queues");
            tokio::time::sleep(Duration::from_millis(5)).await;

            pool.cancel();
            let err = timeout(Duration::from_secs(2), producer)
                .await
                .expect("cancel must release the producer")
                .unwrap();
            assert!(
                matches!(err, PoolError::Cancelled),
                "round {}: got {}",
                round,
                err
            );
            assert_eq!(pool.submitted(), 3);
        }
    }

    #[tokio::test]
    async fn test_collect_more_than_submitted_reports_exhaustion() {
        let pool = pool(PoolConfig::default());
        pool.submit(1).await.unwrap();
        pool.close_input().unwrap();

        match pool.collect_results(2).await {
            Err(PoolError::ResultsExhausted { expected, received }) => {
                assert_eq!(expected, 2);
                assert_eq!(received, 1);
            }
            other => panic!("unexpected: {:?}", other.map(|r| r.len())),
        }
    }

    #[tokio::test]
    async fn test_collect_timeout_when_input_left_open() {
        let pool = pool(PoolConfig::default());
        pool.submit(1).await.unwrap();

        match pool
            .collect_results_timeout(2, Duration::from_millis(50))
            .await
        {
            Err(PoolError::DrainTimeout {
                expected,
                received,
                partial,
            }) => {
                assert_eq!(expected, 2);
                assert_eq!(received, 1);
                assert_eq!(partial[0].job.value, 1);
            }
            other => panic!("unexpected: {:?}", other.map(|r| r.len())),
        }
    }

    #[tokio::test]
    async fn test_cancel_unblocks_reader_and_rejects_submit() {
        let pool = Arc::new(pool(PoolConfig::default()));

        let reader = {
            let pool = Arc::clone(&pool);
            tokio::spawn(async move { pool.next_result().await })
        };
        tokio::task::yield_now().await;
        pool.cancel();

        let read = timeout(Duration::from_secs(2), reader)
            .await
            .expect("reader should be released")
            .unwrap();
        assert!(matches!(read, Err(PoolError::Cancelled)));
        assert!(matches!(pool.submit(1).await, Err(PoolError::Cancelled)));
        assert!(pool.is_cancelled());

        pool.wait_terminated(Duration::from_secs(2)).await.unwrap();
    }

    #[tokio::test]
    async fn test_shutdown_without_draining_terminates_workers() {
        let pool = pool(PoolConfig::new(2, 5, 1));
        for v in 1..=6 {
            pool.submit(v).await.unwrap();
        }

        let reports = pool
            .shutdown_with_timeout(Duration::from_secs(2))
            .await
            .unwrap();
        assert_eq!(reports.len(), 2);
        assert!(reports.iter().map(|r| r.jobs_processed).sum::<u64>() <= 6);
    }

    #[tokio::test]
    async fn test_failed_transform_still_yields_one_result_per_job() {
        let pool = WorkerPool::start(
            PoolConfig::default(),
            Arc::new(MockTransform::new(MockBehavior::FailOn(3))),
            Arc::new(CollectingObserver::new()),
            Arc::new(SystemTimeProvider),
        )
        .unwrap();
        for v in 1..=5 {
            pool.submit(v).await.unwrap();
        }
        pool.close_input().unwrap();

        let results = pool.drain().await.unwrap();
        assert_eq!(results.len(), 5);
        assert_eq!(results.iter().filter(|r| !r.is_ok()).count(), 1);
        assert_eq!(sorted_values(&results), vec![2, 4, 8, 10]);
    }

    #[tokio::test]
    async fn test_observer_sees_every_job() {
        let observer = Arc::new(CollectingObserver::new());
        let pool = WorkerPool::start(
            PoolConfig::default(),
            Arc::new(Doubling),
            observer.clone(),
            Arc::new(SystemTimeProvider),
        )
        .unwrap();
        for v in 1..=4 {
            pool.submit(v).await.unwrap();
        }
        pool.close_input().unwrap();
        pool.drain().await.unwrap();
        pool.wait_terminated(Duration::from_secs(2)).await.unwrap();

        assert_eq!(observer.count(|e| e.kind == EventKind::JobReceived), 4);
        assert_eq!(observer.count(|e| e.kind == EventKind::JobCompleted), 4);
        assert_eq!(
            observer.count(|e| matches!(e.kind, EventKind::Terminated { .. })),
            3
        );
    }
}
