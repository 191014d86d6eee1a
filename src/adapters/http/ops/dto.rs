//! JSON shapes of the operational endpoints.

use serde::{Deserialize, Serialize};

use crate::domain::foundation::{DomainError, JobId};
use crate::domain::intent::DecisionResult;
use crate::domain::job::{CancelTarget, QueueStatus, WorkerHeartbeat};

// ════════════════════════════════════════════════════════════════════════════════
// Request DTOs
// ════════════════════════════════════════════════════════════════════════════════

/// Body of `POST /cancel`. Exactly one of the two ids must be present.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct CancelRequest {
    #[serde(default)]
    pub correlation_id: Option<String>,
    #[serde(default)]
    pub job_id: Option<String>,
    #[serde(default)]
    pub reason: Option<String>,
}

impl CancelRequest {
    pub fn target(&self) -> Result<CancelTarget, DomainError> {
        let cid = self.correlation_id.as_deref().map(str::trim).filter(|s| !s.is_empty());
        let job = self.job_id.as_deref().map(str::trim).filter(|s| !s.is_empty());

        match (cid, job) {
            (Some(cid), None) => Ok(CancelTarget::Correlation(cid.to_string())),
            (None, Some(job)) => Ok(CancelTarget::Job(JobId::from_string(job)?)),
            (Some(_), Some(_)) => Err(DomainError::validation(
                "job_id",
                "give either correlation_id or job_id, not both",
            )),
            (None, None) => Err(DomainError::validation(
                "correlation_id",
                "correlation_id or job_id is required",
            )),
        }
    }
}

// ════════════════════════════════════════════════════════════════════════════════
// Response DTOs
// ════════════════════════════════════════════════════════════════════════════════

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub store: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueueStatusResponse {
    pub queued: u64,
    pub processing: u64,
    pub done: u64,
    pub canceled: u64,
    pub failed: u64,
    pub oldest_queued_at: Option<String>,
    pub oldest_job_id: Option<String>,
    pub oldest_correlation_id: Option<String>,
    pub last_activity: Option<String>,
    pub sample_correlation_ids: Vec<String>,
    pub live_workers: usize,
}

impl From<QueueStatus> for QueueStatusResponse {
    fn from(status: QueueStatus) -> Self {
        let oldest = status.oldest_queued;
        Self {
            queued: status.counts.queued,
            processing: status.counts.processing,
            done: status.counts.done,
            canceled: status.counts.canceled,
            failed: status.counts.failed,
            oldest_queued_at: oldest.as_ref().map(|o| o.enqueued_at.to_string()),
            oldest_job_id: oldest.as_ref().map(|o| o.job_id.to_string()),
            oldest_correlation_id: oldest.and_then(|o| o.correlation_id),
            last_activity: status.last_activity.map(|t| t.to_string()),
            sample_correlation_ids: status.sample_correlation_ids,
            live_workers: status.live_workers,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkerResponse {
    pub worker_id: String,
    pub last_seen: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkersResponse {
    pub count: usize,
    pub workers: Vec<WorkerResponse>,
}

impl From<Vec<WorkerHeartbeat>> for WorkersResponse {
    fn from(beats: Vec<WorkerHeartbeat>) -> Self {
        let workers: Vec<WorkerResponse> = beats
            .into_iter()
            .map(|b| WorkerResponse {
                worker_id: b.worker_id.to_string(),
                last_seen: b.last_seen.to_string(),
            })
            .collect();
        Self {
            count: workers.len(),
            workers,
        }
    }
}

/// `GET /jobs/:job_id`. `state` is `ready` when `result` is present, else the job status.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobResponse {
    pub job_id: String,
    pub state: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<DecisionResult>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CancelResponse {
    pub target: String,
    pub matched: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResetResponse {
    pub canceled: u64,
}

/// Error body shared by every ops endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error_code: String,
    pub message: String,
}

impl ErrorResponse {
    pub fn new(error_code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            error_code: error_code.into(),
            message: message.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::foundation::{ErrorCode, Timestamp};
    use crate::domain::job::{QueuedJobSummary, StatusCounts};

    #[test]
    fn cancel_request_needs_exactly_one_id() {
        let by_cid = CancelRequest {
            correlation_id: Some("c-1".into()),
            ..Default::default()
        };
        assert_eq!(by_cid.target().unwrap(), CancelTarget::Correlation("c-1".into()));

        let by_job = CancelRequest {
            job_id: Some("j-1".into()),
            ..Default::default()
        };
        assert_eq!(by_job.target().unwrap().marker_key(), "job:j-1");

        let both = CancelRequest {
            correlation_id: Some("c".into()),
            job_id: Some("j".into()),
            reason: None,
        };
        assert_eq!(both.target().unwrap_err().code, ErrorCode::ValidationFailed);

        let blank = CancelRequest {
            correlation_id: Some("   ".into()),
            ..Default::default()
        };
        assert!(blank.target().is_err());
    }

    #[test]
    fn queue_status_flattens_oldest_job() {
        let status = QueueStatus {
            counts: StatusCounts {
                queued: 2,
                ..Default::default()
            },
            oldest_queued: Some(QueuedJobSummary {
                job_id: JobId::from_string("j-1").unwrap(),
                correlation_id: Some("c-1".into()),
                enqueued_at: Timestamp::now(),
            }),
            last_activity: None,
            sample_correlation_ids: vec!["c-1".into()],
            live_workers: 1,
        };
        let response = QueueStatusResponse::from(status);
        assert_eq!(response.queued, 2);
        assert_eq!(response.oldest_job_id.as_deref(), Some("j-1"));
        assert_eq!(response.oldest_correlation_id.as_deref(), Some("c-1"));
        assert!(response.oldest_queued_at.is_some());
    }
}
