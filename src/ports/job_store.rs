//! JobStore port - the queue and its side tables.
//!
//! Two deployments implement this port: a list store (blocking pop plus an
//! in-flight set) and a document store (atomic conditional update). The
//! claim primitive is the only mutual-exclusion point between workers.
//!
//! `finish` is the single terminal write. It must atomically:
//!
//! - refuse if the job is already terminal
//! - downgrade `done` to `canceled` when a cancel marker exists
//! - write the poll slot with its TTL
//! - drop the job from the in-flight set

use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;

use crate::domain::foundation::{DomainError, ErrorCode, JobId, WorkerId};
use crate::domain::intent::DecisionResult;
use crate::domain::job::{
    CancelTarget, ClaimedJob, JobEnvelope, JobOutcome, JobStatus, MalformedJob, QueueStatus,
    WorkerHeartbeat,
};

/// Result of one claim attempt.
#[derive(Debug, Clone, PartialEq)]
pub enum ClaimOutcome {
    Claimed(ClaimedJob),
    /// An entry was dequeued but could not be decoded.
    Malformed(MalformedJob),
    /// Nothing arrived within the wait.
    Empty,
}

/// Result of the terminal write.
#[derive(Debug, Clone, PartialEq)]
pub enum FinishOutcome {
    /// This call recorded the outcome. It may differ from the one requested
    /// when a cancel marker forced `canceled`.
    Recorded(JobOutcome),
    /// Someone else finished the job first; nothing was written.
    AlreadyTerminal(JobStatus),
}

/// A job a stuck-job sweep finalized, with what was recorded for it.
///
/// `job.callback_url` is carried so the sweeper can deliver the outcome.
#[derive(Debug, Clone, PartialEq)]
pub struct SweptJob {
    pub job: ClaimedJob,
    pub outcome: JobOutcome,
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum StoreError {
    #[error("store unavailable: {0}")]
    Unavailable(String),

    #[error("store command failed: {0}")]
    Command(String),

    #[error("serialization failed: {0}")]
    Serialization(String),
}

impl StoreError {
    pub fn unavailable(message: impl Into<String>) -> Self {
        Self::Unavailable(message.into())
    }

    pub fn command(message: impl Into<String>) -> Self {
        Self::Command(message.into())
    }
}

impl From<serde_json::Error> for StoreError {
    fn from(err: serde_json::Error) -> Self {
        StoreError::Serialization(err.to_string())
    }
}

impl From<StoreError> for DomainError {
    fn from(err: StoreError) -> Self {
        let code = match &err {
            StoreError::Unavailable(_) => ErrorCode::StoreUnavailable,
            StoreError::Command(_) => ErrorCode::StoreError,
            StoreError::Serialization(_) => ErrorCode::SerializationError,
        };
        DomainError::new(code, err.to_string())
    }
}

/// Port for queue storage.
#[async_trait]
pub trait JobStore: Send + Sync {
    /// Cheap reachability check used at startup.
    async fn ping(&self) -> Result<(), StoreError>;

    async fn enqueue(&self, envelope: &JobEnvelope) -> Result<(), StoreError>;

    /// Claims at most one queued job for `worker`, waiting up to `wait`.
    async fn claim(&self, worker: &WorkerId, wait: Duration) -> Result<ClaimOutcome, StoreError>;

    /// Records an undecodable entry in the failed log.
    async fn record_malformed(&self, job: &MalformedJob) -> Result<(), StoreError>;

    /// Whether a cancel marker addresses this job by id or correlation id.
    async fn is_cancel_requested(&self, job: &ClaimedJob) -> Result<bool, StoreError>;

    /// Sets a cancel marker. Returns how many non-terminal jobs it currently matches.
    async fn request_cancel(&self, target: &CancelTarget, reason: &str) -> Result<u64, StoreError>;

    /// The single terminal write; see the module docs.
    async fn finish(
        &self,
        job: &ClaimedJob,
        outcome: &JobOutcome,
        result_ttl: Duration,
    ) -> Result<FinishOutcome, StoreError>;

    /// Reads the poll slot.
    async fn fetch_result(&self, job_id: &JobId) -> Result<Option<DecisionResult>, StoreError>;

    /// Best-effort status lookup; `None` when the store cannot tell.
    async fn job_status(&self, job_id: &JobId) -> Result<Option<JobStatus>, StoreError>;

    async fn heartbeat(&self, worker: &WorkerId, ttl: Duration) -> Result<(), StoreError>;

    async fn live_workers(&self) -> Result<Vec<WorkerHeartbeat>, StoreError>;

    async fn queue_status(&self) -> Result<QueueStatus, StoreError>;

    /// Force-cancels jobs processing longer than `older_than`. Returns the
    /// jobs this call recorded; jobs finished concurrently are left out.
    async fn cancel_stuck(&self, older_than: Duration, reason: &str)
        -> Result<Vec<SweptJob>, StoreError>;
}
