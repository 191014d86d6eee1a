//! Redis list-store deployment of the job queue.
//!
//! Envelopes wait in a list (`RPUSH` / `BLPOP`). Claimed ids sit in the
//! running set with their claim metadata. The terminal write runs as one Lua
//! script so the cancel check, poll slot, in-flight removal and logs commit
//! together, and a second finisher sees the terminal marker and backs off.
//!
//! `BLPOP` holds its connection for the whole wait, so claims use a small
//! pool of dedicated connections instead of the shared multiplexed one.

use std::sync::{Mutex, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use chrono::DateTime;
use redis::aio::MultiplexedConnection;
use redis::{AsyncCommands, Client, RedisError, Script};
use serde::{Deserialize, Serialize};

use super::keys::QueueKeys;
use super::log_entry::{TerminalLogEntry, DEFAULT_LOG_CAP};
use crate::domain::foundation::{JobId, Timestamp, WorkerId};
use crate::domain::intent::DecisionResult;
use crate::domain::job::{
    CancelTarget, ClaimedJob, JobEnvelope, JobOutcome, JobStatus, MalformedJob, QueueStatus,
    QueuedJobSummary, StatusCounts, WorkerHeartbeat, STATUS_SAMPLE_SIZE,
};
use crate::ports::{ClaimOutcome, FinishOutcome, JobStore, StoreError, SweptJob};

/// How long the terminal marker outlives the job.
const TERMINAL_MARKER_TTL_SECS: u64 = 24 * 3600;

/// Poll-slot lifetime for sweep cancellations.
const SWEEP_RESULT_TTL: Duration = Duration::from_secs(300);

/// Queue entries inspected for status samples and cancel matching.
const QUEUE_SCAN_LIMIT: isize = 500;

const FINISH_SCRIPT: &str = r#"
local existing = redis.call('GET', KEYS[1])
if existing then
  return {0, existing}
end
local status = ARGV[2]
local result = ARGV[3]
local entry = ARGV[4]
if status == 'done' then
  local reason = redis.call('GET', KEYS[11])
  if not reason then reason = redis.call('GET', KEYS[12]) end
  if reason then
    status = 'canceled'
    result = cjson.encode({status = 'canceled', job_id = ARGV[1], error = reason, finish = false})
    entry = cjson.encode({job_id = ARGV[1], status = 'canceled', ts = ARGV[6], error = reason})
  end
end
redis.call('SET', KEYS[1], status, 'EX', ARGV[7])
redis.call('SET', KEYS[2], result, 'EX', ARGV[5])
redis.call('SREM', KEYS[3], ARGV[1])
redis.call('DEL', KEYS[6])
local log = KEYS[4]
if status == 'failed' then log = KEYS[5] end
redis.call('LPUSH', log, entry)
redis.call('LTRIM', log, 0, tonumber(ARGV[8]) - 1)
if status == 'done' then
  redis.call('INCR', KEYS[8])
elseif status == 'canceled' then
  redis.call('INCR', KEYS[9])
else
  redis.call('INCR', KEYS[10])
end
redis.call('SET', KEYS[7], ARGV[6])
return {1, status, result}
"#;

/// Claim metadata kept while a job is in flight.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct ClaimMeta {
    correlation_id: Option<String>,
    #[serde(default)]
    callback_url: Option<String>,
    worker_id: WorkerId,
    enqueued_at: Timestamp,
    claimed_at: Timestamp,
}

impl ClaimMeta {
    fn for_job(job: &ClaimedJob) -> Self {
        Self {
            correlation_id: job.correlation_id.clone(),
            callback_url: job.callback_url.clone(),
            worker_id: job.claimed_by.clone(),
            enqueued_at: job.enqueued_at,
            claimed_at: job.claimed_at,
        }
    }

    fn into_job(self, job_id: JobId) -> ClaimedJob {
        ClaimedJob {
            job_id,
            correlation_id: self.correlation_id,
            callback_url: self.callback_url,
            payload: serde_json::Value::Null,
            enqueued_at: self.enqueued_at,
            claimed_by: self.worker_id,
            claimed_at: self.claimed_at,
        }
    }
}

fn store_err(err: RedisError) -> StoreError {
    if err.is_io_error() || err.is_connection_refusal() || err.is_connection_dropped() || err.is_timeout() {
        StoreError::unavailable(err.to_string())
    } else {
        StoreError::command(err.to_string())
    }
}

/// Redis expiry in whole seconds; never 0, which `SET EX` rejects.
fn expiry_secs(ttl: Duration) -> u64 {
    ttl.as_secs().max(1)
}

fn parse_timestamp(raw: &str) -> Option<Timestamp> {
    DateTime::parse_from_rfc3339(raw)
        .ok()
        .map(|dt| Timestamp::from_datetime(dt.into()))
}

/// Interprets the finish script's reply.
fn parse_finish_reply(reply: Vec<String>) -> Result<FinishOutcome, StoreError> {
    let status = |raw: &str| {
        raw.parse::<JobStatus>()
            .map_err(|e| StoreError::Serialization(e.to_string()))
    };
    match reply.as_slice() {
        [flag, existing] if flag == "0" => Ok(FinishOutcome::AlreadyTerminal(status(existing)?)),
        [flag, recorded, result] if flag == "1" => Ok(FinishOutcome::Recorded(JobOutcome {
            status: status(recorded)?,
            result: serde_json::from_str(result)?,
        })),
        other => Err(StoreError::command(format!(
            "unexpected finish reply with {} elements",
            other.len()
        ))),
    }
}

/// Redis-backed job store.
pub struct RedisJobStore {
    client: Client,
    conn: MultiplexedConnection,
    blocking: Mutex<Vec<MultiplexedConnection>>,
    keys: QueueKeys,
    finish_script: Script,
    log_cap: usize,
    cancel_ttl: Duration,
}

impl RedisJobStore {
    /// Opens the shared connection. Fails fast when Redis is unreachable.
    pub async fn connect(url: &str, keys: QueueKeys) -> Result<Self, StoreError> {
        let client = Client::open(url).map_err(store_err)?;
        let conn = client
            .get_multiplexed_tokio_connection()
            .await
            .map_err(store_err)?;
        Ok(Self {
            client,
            conn,
            blocking: Mutex::new(Vec::new()),
            keys,
            finish_script: Script::new(FINISH_SCRIPT),
            log_cap: DEFAULT_LOG_CAP,
            cancel_ttl: Duration::from_secs(3600),
        })
    }

    pub fn with_log_cap(mut self, cap: usize) -> Self {
        self.log_cap = cap.max(1);
        self
    }

    pub fn with_cancel_ttl(mut self, ttl: Duration) -> Self {
        self.cancel_ttl = ttl;
        self
    }

    pub fn keys(&self) -> &QueueKeys {
        &self.keys
    }

    async fn blocking_conn(&self) -> Result<MultiplexedConnection, StoreError> {
        let pooled = self.blocking.lock().unwrap_or_else(PoisonError::into_inner).pop();
        match pooled {
            Some(conn) => Ok(conn),
            None => self
                .client
                .get_multiplexed_tokio_connection()
                .await
                .map_err(store_err),
        }
    }

    fn return_blocking(&self, conn: MultiplexedConnection) {
        self.blocking
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(conn);
    }

    async fn queued_envelopes(&self) -> Result<Vec<JobEnvelope>, StoreError> {
        let mut conn = self.conn.clone();
        let raw: Vec<String> = conn
            .lrange(self.keys.queue(), 0, QUEUE_SCAN_LIMIT - 1)
            .await
            .map_err(store_err)?;
        Ok(raw.iter().filter_map(|r| JobEnvelope::decode(r).ok()).collect())
    }

    async fn running_jobs(&self) -> Result<Vec<ClaimedJob>, StoreError> {
        let mut conn = self.conn.clone();
        let ids: Vec<String> = conn.smembers(self.keys.running()).await.map_err(store_err)?;
        if ids.is_empty() {
            return Ok(Vec::new());
        }

        let mut jobs = Vec::with_capacity(ids.len());
        for id in ids {
            let Ok(job_id) = JobId::from_string(id) else {
                continue;
            };
            let meta: Option<String> = conn.get(self.keys.job_meta(&job_id)).await.map_err(store_err)?;
            if let Some(meta) = meta.and_then(|m| serde_json::from_str::<ClaimMeta>(&m).ok()) {
                jobs.push(meta.into_job(job_id));
            }
        }
        Ok(jobs)
    }

    async fn run_finish(
        &self,
        job: &ClaimedJob,
        outcome: &JobOutcome,
        result_ttl: Duration,
    ) -> Result<FinishOutcome, StoreError> {
        let markers = CancelTarget::keys_for(job);
        let job_marker = self.keys.cancel_marker(&markers[0]);
        let cid_marker = markers
            .get(1)
            .map(|k| self.keys.cancel_marker(k))
            .unwrap_or_else(|| job_marker.clone());

        let result = serde_json::to_string(&outcome.result)?;
        let entry = serde_json::to_string(&TerminalLogEntry::for_outcome(&job.job_id, outcome))?;
        let now = Timestamp::now().to_string();

        let mut conn = self.conn.clone();
        let reply: Vec<String> = self
            .finish_script
            .key(self.keys.terminal(&job.job_id))
            .key(self.keys.result(&job.job_id))
            .key(self.keys.running())
            .key(self.keys.completed_log())
            .key(self.keys.failed_log())
            .key(self.keys.job_meta(&job.job_id))
            .key(self.keys.last_activity())
            .key(self.keys.stat(JobStatus::Done))
            .key(self.keys.stat(JobStatus::Canceled))
            .key(self.keys.stat(JobStatus::Failed))
            .key(job_marker)
            .key(cid_marker)
            .arg(job.job_id.as_str())
            .arg(outcome.status.as_str())
            .arg(result)
            .arg(entry)
            .arg(expiry_secs(result_ttl))
            .arg(now)
            .arg(TERMINAL_MARKER_TTL_SECS)
            .arg(self.log_cap)
            .invoke_async(&mut conn)
            .await
            .map_err(store_err)?;

        parse_finish_reply(reply)
    }
}

#[async_trait]
impl JobStore for RedisJobStore {
    async fn ping(&self) -> Result<(), StoreError> {
        let mut conn = self.conn.clone();
        redis::cmd("PING")
            .query_async::<_, String>(&mut conn)
            .await
            .map_err(store_err)?;
        Ok(())
    }

    async fn enqueue(&self, envelope: &JobEnvelope) -> Result<(), StoreError> {
        let raw = envelope.encode()?;
        let mut conn = self.conn.clone();
        conn.rpush::<_, _, ()>(self.keys.queue(), raw)
            .await
            .map_err(store_err)
    }

    async fn claim(&self, worker: &WorkerId, wait: Duration) -> Result<ClaimOutcome, StoreError> {
        let mut blocking = self.blocking_conn().await?;
        // BLPOP treats 0 as "forever".
        let timeout_secs = wait.as_secs_f64().max(0.01);
        let popped: Option<(String, String)> = redis::cmd("BLPOP")
            .arg(self.keys.queue())
            .arg(timeout_secs)
            .query_async(&mut blocking)
            .await
            .map_err(store_err)?;
        self.return_blocking(blocking);

        let Some((_, raw)) = popped else {
            return Ok(ClaimOutcome::Empty);
        };
        let envelope = match JobEnvelope::decode(&raw) {
            Ok(envelope) => envelope,
            Err(malformed) => return Ok(ClaimOutcome::Malformed(malformed)),
        };
        let job = envelope.claimed_by(worker);
        let meta = serde_json::to_string(&ClaimMeta::for_job(&job))?;

        let mut conn = self.conn.clone();
        redis::pipe()
            .atomic()
            .sadd(self.keys.running(), job.job_id.as_str())
            .ignore()
            .set(self.keys.job_meta(&job.job_id), meta)
            .ignore()
            .set(self.keys.last_activity(), job.claimed_at.to_string())
            .ignore()
            .query_async::<_, ()>(&mut conn)
            .await
            .map_err(store_err)?;

        Ok(ClaimOutcome::Claimed(job))
    }

    async fn record_malformed(&self, job: &MalformedJob) -> Result<(), StoreError> {
        let entry = serde_json::to_string(&TerminalLogEntry::for_malformed(job))?;
        let mut conn = self.conn.clone();
        redis::pipe()
            .atomic()
            .lpush(self.keys.failed_log(), entry)
            .ignore()
            .ltrim(self.keys.failed_log(), 0, self.log_cap as isize - 1)
            .ignore()
            .incr(self.keys.stat(JobStatus::Failed), 1)
            .ignore()
            .set(self.keys.last_activity(), Timestamp::now().to_string())
            .ignore()
            .query_async::<_, ()>(&mut conn)
            .await
            .map_err(store_err)
    }

    async fn is_cancel_requested(&self, job: &ClaimedJob) -> Result<bool, StoreError> {
        let keys: Vec<String> = CancelTarget::keys_for(job)
            .iter()
            .map(|k| self.keys.cancel_marker(k))
            .collect();
        let mut conn = self.conn.clone();
        let found: u64 = redis::cmd("EXISTS")
            .arg(&keys)
            .query_async(&mut conn)
            .await
            .map_err(store_err)?;
        Ok(found > 0)
    }

    async fn request_cancel(&self, target: &CancelTarget, reason: &str) -> Result<u64, StoreError> {
        let mut conn = self.conn.clone();
        conn.set_ex::<_, _, ()>(
            self.keys.cancel(target),
            reason,
            expiry_secs(self.cancel_ttl),
        )
        .await
        .map_err(store_err)?;

        let queued = self
            .queued_envelopes()
            .await?
            .iter()
            .filter(|e| target.matches(&e.job_id, e.correlation_id().as_deref()))
            .count();
        let running = self
            .running_jobs()
            .await?
            .iter()
            .filter(|j| target.matches(&j.job_id, j.correlation_id.as_deref()))
            .count();
        Ok((queued + running) as u64)
    }

    async fn finish(
        &self,
        job: &ClaimedJob,
        outcome: &JobOutcome,
        result_ttl: Duration,
    ) -> Result<FinishOutcome, StoreError> {
        self.run_finish(job, outcome, result_ttl).await
    }

    async fn fetch_result(&self, job_id: &JobId) -> Result<Option<DecisionResult>, StoreError> {
        let mut conn = self.conn.clone();
        let raw: Option<String> = conn.get(self.keys.result(job_id)).await.map_err(store_err)?;
        raw.map(|r| serde_json::from_str(&r).map_err(StoreError::from))
            .transpose()
    }

    async fn job_status(&self, job_id: &JobId) -> Result<Option<JobStatus>, StoreError> {
        let mut conn = self.conn.clone();
        let terminal: Option<String> = conn.get(self.keys.terminal(job_id)).await.map_err(store_err)?;
        if let Some(status) = terminal.and_then(|s| s.parse().ok()) {
            return Ok(Some(status));
        }
        let running: bool = conn
            .sismember(self.keys.running(), job_id.as_str())
            .await
            .map_err(store_err)?;
        Ok(running.then_some(JobStatus::Processing))
    }

    async fn heartbeat(&self, worker: &WorkerId, ttl: Duration) -> Result<(), StoreError> {
        let mut conn = self.conn.clone();
        conn.set_ex::<_, _, ()>(
            self.keys.heartbeat(worker),
            Timestamp::now().to_string(),
            expiry_secs(ttl),
        )
        .await
        .map_err(store_err)
    }

    async fn live_workers(&self) -> Result<Vec<WorkerHeartbeat>, StoreError> {
        let mut conn = self.conn.clone();
        let keys: Vec<String> = {
            let mut iter = conn
                .scan_match::<_, String>(self.keys.heartbeat_pattern())
                .await
                .map_err(store_err)?;
            let mut keys = Vec::new();
            while let Some(key) = iter.next_item().await {
                keys.push(key);
            }
            keys
        };

        let mut workers = Vec::with_capacity(keys.len());
        for key in keys {
            let Some(worker) = self
                .keys
                .worker_from_heartbeat(&key)
                .and_then(|w| WorkerId::new(w).ok())
            else {
                continue;
            };
            // Expired between SCAN and GET.
            let seen: Option<String> = conn.get(&key).await.map_err(store_err)?;
            if let Some(last_seen) = seen.as_deref().and_then(parse_timestamp) {
                workers.push(WorkerHeartbeat {
                    worker_id: worker,
                    last_seen,
                });
            }
        }
        workers.sort_by(|a, b| a.worker_id.as_str().cmp(b.worker_id.as_str()));
        Ok(workers)
    }

    async fn queue_status(&self) -> Result<QueueStatus, StoreError> {
        let mut conn = self.conn.clone();
        let (queued, processing, done, canceled, failed, last_activity): (
            u64,
            u64,
            Option<u64>,
            Option<u64>,
            Option<u64>,
            Option<String>,
        ) = redis::pipe()
            .llen(self.keys.queue())
            .scard(self.keys.running())
            .get(self.keys.stat(JobStatus::Done))
            .get(self.keys.stat(JobStatus::Canceled))
            .get(self.keys.stat(JobStatus::Failed))
            .get(self.keys.last_activity())
            .query_async(&mut conn)
            .await
            .map_err(store_err)?;

        let envelopes = self.queued_envelopes().await?;
        let oldest_queued = envelopes.first().map(|e| QueuedJobSummary {
            job_id: e.job_id.clone(),
            correlation_id: e.correlation_id(),
            enqueued_at: e.enqueued_at,
        });
        let sample_correlation_ids = envelopes
            .iter()
            .filter_map(JobEnvelope::correlation_id)
            .take(STATUS_SAMPLE_SIZE)
            .collect();

        Ok(QueueStatus {
            counts: StatusCounts {
                queued,
                processing,
                done: done.unwrap_or(0),
                canceled: canceled.unwrap_or(0),
                failed: failed.unwrap_or(0),
            },
            oldest_queued,
            last_activity: last_activity.as_deref().and_then(parse_timestamp),
            sample_correlation_ids,
            live_workers: self.live_workers().await?.len(),
        })
    }

    async fn cancel_stuck(
        &self,
        older_than: Duration,
        reason: &str,
    ) -> Result<Vec<SweptJob>, StoreError> {
        let cutoff = Timestamp::now().minus(older_than);
        let mut swept = Vec::new();
        for job in self.running_jobs().await? {
            if cutoff.is_before(&job.claimed_at) {
                continue;
            }
            let outcome = JobOutcome::canceled(&job.job_id, reason);
            if let FinishOutcome::Recorded(outcome) =
                self.run_finish(&job, &outcome, SWEEP_RESULT_TTL).await?
            {
                swept.push(SweptJob { job, outcome });
            }
        }
        Ok(swept)
    }
}

impl std::fmt::Debug for RedisJobStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RedisJobStore")
            .field("keys", &self.keys)
            .field("log_cap", &self.log_cap)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    // Store round-trips need a running Redis and are exercised outside unit tests.
    use super::*;
    use crate::domain::intent::ResultStatus;

    #[test]
    fn already_terminal_reply() {
        let outcome = parse_finish_reply(vec!["0".into(), "canceled".into()]).unwrap();
        assert_eq!(outcome, FinishOutcome::AlreadyTerminal(JobStatus::Canceled));
    }

    #[test]
    fn recorded_reply_carries_downgraded_result() {
        // Shape produced by cjson when the script downgrades done to canceled.
        let result = r#"{"finish":false,"status":"canceled","job_id":"j-1","error":"user abort"}"#;
        let outcome =
            parse_finish_reply(vec!["1".into(), "canceled".into(), result.into()]).unwrap();
        let FinishOutcome::Recorded(recorded) = outcome else {
            panic!("expected recorded");
        };
        assert_eq!(recorded.status, JobStatus::Canceled);
        assert_eq!(recorded.result.status, ResultStatus::Canceled);
        assert_eq!(recorded.result.error.as_deref(), Some("user abort"));
        assert!(recorded.result.trace.is_empty());
    }

    #[test]
    fn malformed_reply_is_command_error() {
        assert!(matches!(
            parse_finish_reply(vec!["1".into()]),
            Err(StoreError::Command(_))
        ));
    }

    #[test]
    fn claim_meta_keeps_callback_url() {
        let envelope =
            JobEnvelope::new(JobId::new(), serde_json::json!({"callback_url": "http://cb/x"}));
        let job = envelope.claimed_by(&WorkerId::new("w-1").unwrap());
        let stored = serde_json::to_string(&ClaimMeta::for_job(&job)).unwrap();

        let restored: ClaimMeta = serde_json::from_str(&stored).unwrap();
        let rebuilt = restored.into_job(job.job_id.clone());
        assert_eq!(rebuilt.callback_url.as_deref(), Some("http://cb/x"));
    }

    #[test]
    fn claim_meta_without_callback_still_decodes() {
        let now = serde_json::to_string(&Timestamp::now()).unwrap();
        let raw = format!(
            r#"{{"correlation_id":null,"worker_id":"w-1","enqueued_at":{0},"claimed_at":{0}}}"#,
            now
        );
        let meta: ClaimMeta = serde_json::from_str(&raw).unwrap();
        assert_eq!(meta.callback_url, None);
    }

    #[test]
    fn expiry_is_whole_seconds_with_a_floor() {
        assert_eq!(expiry_secs(Duration::from_millis(200)), 1);
        assert_eq!(expiry_secs(Duration::from_secs(3600)), 3600);
        assert_eq!(expiry_secs(Duration::from_secs(u64::MAX)), u64::MAX);
    }

    #[test]
    fn timestamps_parse_from_rfc3339() {
        let now = Timestamp::now();
        let parsed = parse_timestamp(&now.to_string()).unwrap();
        assert_eq!(parsed.as_unix_secs(), now.as_unix_secs());
        assert!(parse_timestamp("yesterday").is_none());
    }
}
