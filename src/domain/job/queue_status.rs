//! Read-only operational view of the queue.

use serde::{Deserialize, Serialize};

use super::status::JobStatus;
use crate::domain::foundation::{JobId, Timestamp, WorkerId};

/// How many queued correlation ids a status report samples.
pub const STATUS_SAMPLE_SIZE: usize = 5;

/// Job counts per status.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusCounts {
    pub queued: u64,
    pub processing: u64,
    pub done: u64,
    pub canceled: u64,
    pub failed: u64,
}

impl StatusCounts {
    pub fn get(&self, status: JobStatus) -> u64 {
        match status {
            JobStatus::Queued => self.queued,
            JobStatus::Processing => self.processing,
            JobStatus::Done => self.done,
            JobStatus::Canceled => self.canceled,
            JobStatus::Failed => self.failed,
        }
    }

    pub fn set(&mut self, status: JobStatus, count: u64) {
        match status {
            JobStatus::Queued => self.queued = count,
            JobStatus::Processing => self.processing = count,
            JobStatus::Done => self.done = count,
            JobStatus::Canceled => self.canceled = count,
            JobStatus::Failed => self.failed = count,
        }
    }

    pub fn total(&self) -> u64 {
        JobStatus::ALL.iter().map(|s| self.get(*s)).sum()
    }
}

/// The oldest job still waiting to be claimed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueuedJobSummary {
    pub job_id: JobId,
    pub correlation_id: Option<String>,
    pub enqueued_at: Timestamp,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct QueueStatus {
    pub counts: StatusCounts,
    pub oldest_queued: Option<QueuedJobSummary>,
    pub last_activity: Option<Timestamp>,
    pub sample_correlation_ids: Vec<String>,
    pub live_workers: usize,
}

/// A worker whose heartbeat has not expired.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkerHeartbeat {
    pub worker_id: WorkerId,
    pub last_seen: Timestamp,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counts_total_all_statuses() {
        let mut counts = StatusCounts::default();
        counts.set(JobStatus::Queued, 2);
        counts.set(JobStatus::Done, 5);
        counts.set(JobStatus::Failed, 1);
        assert_eq!(counts.get(JobStatus::Done), 5);
        assert_eq!(counts.total(), 8);
    }
}
