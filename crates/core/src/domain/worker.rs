// Worker Lifecycle Model

use serde::{Deserialize, Serialize};

/// Worker identifier (1..=worker_count), used for attribution only
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct WorkerId(u32);

impl WorkerId {
    pub fn new(id: u32) -> Self {
        Self(id)
    }

    pub fn as_u32(&self) -> u32 {
        self.0
    }
}

impl std::fmt::Display for WorkerId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "worker-{}", self.0)
    }
}

/// Worker state machine: `Idle -> Running -> (Idle | Terminated)`.
///
/// `Terminated` is terminal; no transition leaves it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum WorkerState {
    /// Waiting for the next job
    Idle,
    /// Applying the transform or placing its result
    Running,
    Terminated,
}

impl WorkerState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, WorkerState::Terminated)
    }

    /// Whether `self -> next` is a legal transition
    pub fn can_transition_to(&self, next: WorkerState) -> bool {
        use WorkerState::*;
        matches!(
            (self, next),
            (Idle, Running) | (Idle, Terminated) | (Running, Idle) | (Running, Terminated)
        )
    }
}

impl std::fmt::Display for WorkerState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            WorkerState::Idle => write!(f, "IDLE"),
            WorkerState::Running => write!(f, "RUNNING"),
            WorkerState::Terminated => write!(f, "TERMINATED"),
        }
    }
}

/// Why a worker left its loop
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ExitReason {
    /// Input queue observed closed and empty
    InputExhausted,
    /// Cancellation token fired
    Cancelled,
    /// Output queue receiver dropped
    ConsumerGone,
}

impl std::fmt::Display for ExitReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ExitReason::InputExhausted => write!(f, "INPUT_EXHAUSTED"),
            ExitReason::Cancelled => write!(f, "CANCELLED"),
            ExitReason::ConsumerGone => write!(f, "CONSUMER_GONE"),
        }
    }
}

/// Summary returned by a worker task when it terminates
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkerReport {
    pub worker_id: WorkerId,
    pub jobs_processed: u64,
    pub exit: ExitReason,
}
