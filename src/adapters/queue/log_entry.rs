//! Entries of the capped terminal logs.

use serde::{Deserialize, Serialize};

use crate::domain::foundation::{JobId, Timestamp};
use crate::domain::job::{JobOutcome, JobStatus, MalformedJob};

/// Default number of entries each terminal log keeps.
pub const DEFAULT_LOG_CAP: usize = 100;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TerminalLogEntry {
    pub job_id: Option<String>,
    pub status: JobStatus,
    pub ts: Timestamp,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl TerminalLogEntry {
    pub fn for_outcome(job_id: &JobId, outcome: &JobOutcome) -> Self {
        Self {
            job_id: Some(job_id.to_string()),
            status: outcome.status,
            ts: Timestamp::now(),
            error: outcome.result.error.clone(),
        }
    }

    pub fn for_malformed(job: &MalformedJob) -> Self {
        let preview: String = job.raw.chars().take(200).collect();
        Self {
            job_id: None,
            status: JobStatus::Failed,
            ts: Timestamp::now(),
            error: Some(format!("{} (raw: {})", job.reason, preview)),
        }
    }

    /// `failed` goes to the failed log; `done` and `canceled` to the completed log.
    pub fn is_failure(&self) -> bool {
        self.status == JobStatus::Failed
    }
}
