//! Queue-side job values shared by every store deployment.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

use super::status::JobStatus;
use crate::domain::foundation::{JobId, Timestamp, WorkerId};
use crate::domain::intent::{DecisionPayload, DecisionResult};

/// A submitted job as it sits in the queue.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobEnvelope {
    pub job_id: JobId,
    #[serde(default)]
    pub correlation_id: Option<String>,
    #[serde(default)]
    pub callback_url: Option<String>,
    #[serde(default = "Timestamp::now")]
    pub enqueued_at: Timestamp,
    /// The decision request, kept raw so malformed payloads surface at processing time.
    pub payload: Value,
}

impl JobEnvelope {
    pub fn new(job_id: JobId, payload: Value) -> Self {
        Self {
            job_id,
            correlation_id: None,
            callback_url: None,
            enqueued_at: Timestamp::now(),
            payload,
        }
    }

    /// Wraps a typed payload, lifting its correlation id and callback.
    pub fn from_payload(payload: &DecisionPayload) -> Result<Self, serde_json::Error> {
        let mut envelope = Self::new(JobId::new(), serde_json::to_value(payload)?);
        envelope.correlation_id = payload.correlation_id.clone();
        envelope.callback_url = payload.callback_url.clone();
        Ok(envelope)
    }

    pub fn encode(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    /// Decodes a raw queue entry.
    pub fn decode(raw: &str) -> Result<Self, MalformedJob> {
        serde_json::from_str(raw).map_err(|e| MalformedJob {
            raw: raw.to_string(),
            reason: e.to_string(),
        })
    }

    /// Envelope fields win; the payload fills gaps.
    pub fn correlation_id(&self) -> Option<String> {
        non_blank(self.correlation_id.clone()).or_else(|| payload_str(&self.payload, "correlation_id"))
    }

    pub fn callback_url(&self) -> Option<String> {
        non_blank(self.callback_url.clone()).or_else(|| payload_str(&self.payload, "callback_url"))
    }

    /// The envelope as owned by `worker` after a successful claim.
    pub fn claimed_by(self, worker: &WorkerId) -> ClaimedJob {
        ClaimedJob {
            correlation_id: self.correlation_id(),
            callback_url: self.callback_url(),
            job_id: self.job_id,
            payload: self.payload,
            enqueued_at: self.enqueued_at,
            claimed_by: worker.clone(),
            claimed_at: Timestamp::now(),
        }
    }
}

fn non_blank(value: Option<String>) -> Option<String> {
    value.map(|v| v.trim().to_string()).filter(|v| !v.is_empty())
}

fn payload_str(payload: &Value, key: &str) -> Option<String> {
    non_blank(payload.get(key).and_then(Value::as_str).map(str::to_string))
}

/// A job owned by exactly one worker.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClaimedJob {
    pub job_id: JobId,
    pub correlation_id: Option<String>,
    pub callback_url: Option<String>,
    pub payload: Value,
    pub enqueued_at: Timestamp,
    pub claimed_by: WorkerId,
    pub claimed_at: Timestamp,
}

/// A queue entry that could not be decoded into an envelope.
#[derive(Debug, Clone, PartialEq)]
pub struct MalformedJob {
    pub raw: String,
    pub reason: String,
}

impl fmt::Display for MalformedJob {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "malformed job entry: {}", self.reason)
    }
}

/// Terminal status plus the result delivered for it.
#[derive(Debug, Clone, PartialEq)]
pub struct JobOutcome {
    pub status: JobStatus,
    pub result: DecisionResult,
}

impl JobOutcome {
    pub fn done(job_id: &JobId, result: DecisionResult) -> Self {
        Self {
            status: JobStatus::Done,
            result: result.with_job_id(job_id),
        }
    }

    pub fn canceled(job_id: &JobId, reason: impl Into<String>) -> Self {
        Self {
            status: JobStatus::Canceled,
            result: DecisionResult::canceled(reason).with_job_id(job_id),
        }
    }

    pub fn failed(job_id: &JobId, reason: impl Into<String>) -> Self {
        Self {
            status: JobStatus::Failed,
            result: DecisionResult::error(reason).with_job_id(job_id),
        }
    }
}

/// What a cancel request addresses.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum CancelTarget {
    Job(JobId),
    Correlation(String),
}

impl CancelTarget {
    /// Stable marker key, shared by every store.
    pub fn marker_key(&self) -> String {
        match self {
            CancelTarget::Job(id) => format!("job:{}", id),
            CancelTarget::Correlation(cid) => format!("cid:{}", cid),
        }
    }

    /// Marker keys that cancel `job`.
    pub fn keys_for(job: &ClaimedJob) -> Vec<String> {
        let mut keys = vec![CancelTarget::Job(job.job_id.clone()).marker_key()];
        if let Some(cid) = &job.correlation_id {
            keys.push(CancelTarget::Correlation(cid.clone()).marker_key());
        }
        keys
    }

    pub fn matches(&self, job_id: &JobId, correlation_id: Option<&str>) -> bool {
        match self {
            CancelTarget::Job(id) => id == job_id,
            CancelTarget::Correlation(cid) => correlation_id == Some(cid.as_str()),
        }
    }
}

impl fmt::Display for CancelTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.marker_key())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn decode_accepts_minimal_envelope() {
        let envelope = JobEnvelope::decode(
            r#"{"job_id":"j-1","callback_url":"http://cb","payload":{"session_id":"s","goal_text":"g"}}"#,
        )
        .unwrap();
        assert_eq!(envelope.job_id.as_str(), "j-1");
        assert_eq!(envelope.callback_url().as_deref(), Some("http://cb"));
    }

    #[test]
    fn decode_rejects_garbage() {
        let err = JobEnvelope::decode("{not json").unwrap_err();
        assert_eq!(err.raw, "{not json");
    }

    #[test]
    fn payload_fills_missing_envelope_fields() {
        let envelope = JobEnvelope::new(
            JobId::from_string("j").unwrap(),
            json!({"correlation_id": "cid-9", "callback_url": "https://cb/x"}),
        );
        assert_eq!(envelope.correlation_id().as_deref(), Some("cid-9"));
        assert_eq!(envelope.callback_url().as_deref(), Some("https://cb/x"));
    }

    #[test]
    fn from_payload_lifts_routing_fields() {
        let mut payload = DecisionPayload::new("s", "g");
        payload.correlation_id = Some("cid-1".into());
        let envelope = JobEnvelope::from_payload(&payload).unwrap();
        assert_eq!(envelope.correlation_id.as_deref(), Some("cid-1"));
        assert_eq!(envelope.payload["goal_text"], "g");
    }

    #[test]
    fn cancel_keys_cover_job_and_correlation() {
        let worker = WorkerId::new("w").unwrap();
        let mut envelope = JobEnvelope::new(JobId::from_string("j-2").unwrap(), json!({}));
        envelope.correlation_id = Some("c".into());
        let job = envelope.claimed_by(&worker);
        assert_eq!(CancelTarget::keys_for(&job), vec!["job:j-2".to_string(), "cid:c".to_string()]);
        assert!(CancelTarget::Correlation("c".into()).matches(&job.job_id, Some("c")));
    }

    #[test]
    fn outcomes_stamp_job_id() {
        let id = JobId::from_string("j-3").unwrap();
        let outcome = JobOutcome::failed(&id, "bad payload");
        assert_eq!(outcome.status, JobStatus::Failed);
        assert_eq!(outcome.result.job_id.as_deref(), Some("j-3"));
    }
}
