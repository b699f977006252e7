// Job Domain Model

use super::error::TransformError;
use super::worker::WorkerId;
use serde::{Deserialize, Serialize};

/// Job ID (submission sequence number assigned by the pool)
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct JobId(u64);

impl JobId {
    pub fn new(seq: u64) -> Self {
        Self(seq)
    }

    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

impl std::fmt::Display for JobId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "job-{}", self.0)
    }
}

/// Unit of work: an integer payload tagged with its submission id.
///
/// Immutable once enqueued.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Job {
    pub id: JobId,
    pub value: i64,
}

impl Job {
    pub fn new(id: JobId, value: i64) -> Self {
        Self { id, value }
    }
}

/// Output of applying the transform to one job
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct JobResult {
    pub job: Job,
    pub worker_id: WorkerId,
    pub output: Result<i64, TransformError>,
}

impl JobResult {
    /// Transformed value, if the transform succeeded
    pub fn value(&self) -> Option<i64> {
        self.output.as_ref().ok().copied()
    }

    pub fn is_ok(&self) -> bool {
        self.output.is_ok()
    }

    pub fn job_id(&self) -> JobId {
        self.job.id
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_job_id_display() {
        assert_eq!(JobId::new(7).to_string(), "job-7");
    }

    #[test]
    fn test_result_value_accessors() {
        let job = Job::new(JobId::new(1), 21);
        let ok = JobResult {
            job,
            worker_id: WorkerId::new(1),
            output: Ok(42),
        };
        assert_eq!(ok.value(), Some(42));
        assert!(ok.is_ok());

        let failed = JobResult {
            job,
            worker_id: WorkerId::new(2),
            output: Err(TransformError::Overflow(21)),
        };
        assert_eq!(failed.value(), None);
        assert_eq!(failed.job_id(), JobId::new(1));
    }

    #[test]
    fn test_result_serializes_with_tagged_output() {
        let result = JobResult {
            job: Job::new(JobId::new(3), 5),
            worker_id: WorkerId::new(2),
            output: Ok(10),
        };
        let json = serde_json::to_value(&result).unwrap();
        assert_eq!(json["job"]["id"], 3);
        assert_eq!(json["worker_id"], 2);
        assert_eq!(json["output"]["Ok"], 10);
    }
}
