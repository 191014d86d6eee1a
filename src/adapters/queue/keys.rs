//! Key layout of the list-store deployment.

use crate::domain::foundation::{JobId, WorkerId};
use crate::domain::job::{CancelTarget, JobStatus};

pub const DEFAULT_KEY_PREFIX: &str = "intent_engine";

/// Builds every key under one prefix.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueueKeys {
    prefix: String,
}

impl Default for QueueKeys {
    fn default() -> Self {
        Self::new(DEFAULT_KEY_PREFIX)
    }
}

impl QueueKeys {
    pub fn new(prefix: impl Into<String>) -> Self {
        let prefix = prefix.into();
        let prefix = prefix.trim_end_matches(':');
        Self {
            prefix: if prefix.is_empty() {
                DEFAULT_KEY_PREFIX.to_string()
            } else {
                prefix.to_string()
            },
        }
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    /// Pending envelopes, RPUSH / BLPOP.
    pub fn queue(&self) -> String {
        format!("{}:queue:decisions", self.prefix)
    }

    /// Set of in-flight job ids.
    pub fn running(&self) -> String {
        format!("{}:jobs:running", self.prefix)
    }

    pub fn completed_log(&self) -> String {
        format!("{}:jobs:completed", self.prefix)
    }

    pub fn failed_log(&self) -> String {
        format!("{}:jobs:failed", self.prefix)
    }

    /// Poll slot.
    pub fn result(&self, job_id: &JobId) -> String {
        format!("{}:result:{}", self.prefix, job_id)
    }

    /// Terminal status marker, written once with SET NX.
    pub fn terminal(&self, job_id: &JobId) -> String {
        format!("{}:job:terminal:{}", self.prefix, job_id)
    }

    /// Claim metadata: worker, correlation id, claimed_at.
    pub fn job_meta(&self, job_id: &JobId) -> String {
        format!("{}:job:meta:{}", self.prefix, job_id)
    }

    pub fn cancel(&self, target: &CancelTarget) -> String {
        self.cancel_marker(&target.marker_key())
    }

    pub fn cancel_marker(&self, marker_key: &str) -> String {
        format!("{}:cancel:{}", self.prefix, marker_key)
    }

    pub fn heartbeat(&self, worker: &WorkerId) -> String {
        format!("{}:workers:heartbeat:{}", self.prefix, worker)
    }

    pub fn heartbeat_pattern(&self) -> String {
        format!("{}:workers:heartbeat:*", self.prefix)
    }

    /// Strips the heartbeat prefix from a scanned key.
    pub fn worker_from_heartbeat<'a>(&self, key: &'a str) -> Option<&'a str> {
        key.strip_prefix(&format!("{}:workers:heartbeat:", self.prefix))
    }

    pub fn stat(&self, status: JobStatus) -> String {
        format!("{}:stats:{}", self.prefix, status)
    }

    pub fn last_activity(&self) -> String {
        format!("{}:stats:last_activity", self.prefix)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keys_share_prefix() {
        let keys = QueueKeys::new("savant:");
        let id = JobId::from_string("j-1").unwrap();

        assert_eq!(keys.queue(), "savant:queue:decisions");
        assert_eq!(keys.result(&id), "savant:result:j-1");
        assert_eq!(
            keys.cancel(&CancelTarget::Correlation("c-1".into())),
            "savant:cancel:cid:c-1"
        );
        assert_eq!(keys.stat(JobStatus::Done), "savant:stats:done");
    }

    #[test]
    fn heartbeat_keys_round_trip_worker() {
        let keys = QueueKeys::default();
        let worker = WorkerId::new("host:1:0").unwrap();
        let key = keys.heartbeat(&worker);
        assert_eq!(keys.worker_from_heartbeat(&key), Some("host:1:0"));
        assert_eq!(keys.worker_from_heartbeat("other:key"), None);
    }

    #[test]
    fn empty_prefix_falls_back() {
        assert_eq!(QueueKeys::new("").prefix(), DEFAULT_KEY_PREFIX);
    }
}
