//! GetJobResultHandler - reads the poll slot, falling back to job status.

use std::sync::Arc;

use crate::domain::foundation::{DomainError, ErrorCode, JobId};
use crate::domain::intent::DecisionResult;
use crate::domain::job::JobStatus;
use crate::ports::JobStore;

/// What a poller sees for a job id.
#[derive(Debug, Clone, PartialEq)]
pub enum JobResultView {
    /// The poll slot is still live.
    Ready(DecisionResult),
    /// Known but no result to hand out (not finished yet, or the slot expired).
    Pending(JobStatus),
}

pub struct GetJobResultHandler {
    store: Arc<dyn JobStore>,
}

impl GetJobResultHandler {
    pub fn new(store: Arc<dyn JobStore>) -> Self {
        Self { store }
    }

    pub async fn handle(&self, job_id: &JobId) -> Result<JobResultView, DomainError> {
        if let Some(result) = self.store.fetch_result(job_id).await? {
            return Ok(JobResultView::Ready(result));
        }

        match self.store.job_status(job_id).await? {
            Some(status) => Ok(JobResultView::Pending(status)),
            None => Err(DomainError::new(
                ErrorCode::JobNotFound,
                format!("No job or result for {}", job_id),
            )),
        }
    }
}
