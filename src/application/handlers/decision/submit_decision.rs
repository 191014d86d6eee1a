//! SubmitDecisionHandler - validates a decision payload and enqueues it.

use std::sync::Arc;

use serde_json::Value;
use tracing::info;

use crate::domain::foundation::{DomainError, ErrorCode, JobId};
use crate::domain::intent::DecisionRequest;
use crate::domain::job::JobEnvelope;
use crate::ports::JobStore;

/// Command to submit a decision job.
#[derive(Debug, Clone)]
pub struct SubmitDecisionCommand {
    pub payload: Value,
    /// Caller-chosen id; generated when absent.
    pub job_id: Option<JobId>,
    pub correlation_id: Option<String>,
    pub callback_url: Option<String>,
}

impl SubmitDecisionCommand {
    pub fn new(payload: Value) -> Self {
        Self {
            payload,
            job_id: None,
            correlation_id: None,
            callback_url: None,
        }
    }

    pub fn with_correlation_id(mut self, cid: impl Into<String>) -> Self {
        self.correlation_id = Some(cid.into());
        self
    }

    pub fn with_callback_url(mut self, url: impl Into<String>) -> Self {
        self.callback_url = Some(url.into());
        self
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct SubmitDecisionResult {
    pub job_id: JobId,
    pub correlation_id: Option<String>,
}

/// Handler for decision submission.
pub struct SubmitDecisionHandler {
    store: Arc<dyn JobStore>,
}

impl SubmitDecisionHandler {
    pub fn new(store: Arc<dyn JobStore>) -> Self {
        Self { store }
    }

    pub async fn handle(&self, cmd: SubmitDecisionCommand) -> Result<SubmitDecisionResult, DomainError> {
        // Reject what a worker would fail anyway.
        DecisionRequest::from_value(cmd.payload.clone()).map_err(|e| {
            DomainError::new(ErrorCode::MalformedSubmission, e.to_string())
        })?;

        let mut envelope = JobEnvelope::new(cmd.job_id.unwrap_or_default(), cmd.payload);
        envelope.correlation_id = cmd.correlation_id;
        envelope.callback_url = cmd.callback_url;
        let correlation_id = envelope.correlation_id();

        self.store.enqueue(&envelope).await?;

        info!(
            job_id = %envelope.job_id,
            correlation_id = correlation_id.as_deref().unwrap_or(""),
            "Decision job enqueued"
        );
        Ok(SubmitDecisionResult {
            job_id: envelope.job_id,
            correlation_id,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::queue::InMemoryJobStore;
    use crate::domain::foundation::WorkerId;
    use crate::ports::ClaimOutcome;
    use serde_json::json;
    use std::time::Duration;

    #[tokio::test]
    async fn enqueues_valid_payload() {
        let store = Arc::new(InMemoryJobStore::new());
        let handler = SubmitDecisionHandler::new(store.clone());

        let result = handler
            .handle(
                SubmitDecisionCommand::new(json!({
                    "session_id": "s", "goal_text": "g", "correlation_id": "cid-1"
                }))
                .with_callback_url("http://cb"),
            )
            .await
            .unwrap();
        assert_eq!(result.correlation_id.as_deref(), Some("cid-1"));

        let worker = WorkerId::new("w").unwrap();
        let ClaimOutcome::Claimed(job) = store.claim(&worker, Duration::from_millis(10)).await.unwrap()
        else {
            panic!("expected claim");
        };
        assert_eq!(job.job_id, result.job_id);
        assert_eq!(job.callback_url.as_deref(), Some("http://cb"));
    }

    #[tokio::test]
    async fn rejects_malformed_payload() {
        let handler = SubmitDecisionHandler::new(Arc::new(InMemoryJobStore::new()));
        let err = handler
            .handle(SubmitDecisionCommand::new(json!({"goal_text": "g"})))
            .await
            .unwrap_err();
        assert_eq!(err.code, ErrorCode::MalformedSubmission);
    }
}
