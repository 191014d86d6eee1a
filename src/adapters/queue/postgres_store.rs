//! PostgreSQL document-store deployment of the job queue.
//!
//! The claim is a conditional update over `FOR UPDATE SKIP LOCKED`, so
//! concurrent workers never see the same row. The terminal write is a single
//! `UPDATE ... WHERE status IN ('queued', 'processing')` whose `CASE`
//! downgrades `done` to `canceled` when a live cancel marker exists; the
//! poll slot is written in the same transaction.

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{PgPool, Row};

use crate::domain::foundation::{JobId, Timestamp, WorkerId};
use crate::domain::intent::DecisionResult;
use crate::domain::job::{
    CancelTarget, ClaimedJob, JobEnvelope, JobOutcome, JobStatus, MalformedJob, QueueStatus,
    QueuedJobSummary, StatusCounts, WorkerHeartbeat, STATUS_SAMPLE_SIZE,
};
use crate::ports::{ClaimOutcome, FinishOutcome, JobStore, StoreError, SweptJob};

/// Default interval between claim attempts while the queue is empty.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(500);

const SWEEP_RESULT_TTL: Duration = Duration::from_secs(300);

fn db_err(err: sqlx::Error) -> StoreError {
    match err {
        sqlx::Error::Io(_) | sqlx::Error::PoolTimedOut | sqlx::Error::PoolClosed | sqlx::Error::Tls(_) => {
            StoreError::unavailable(err.to_string())
        }
        other => StoreError::command(other.to_string()),
    }
}

fn parse_status(raw: &str) -> Result<JobStatus, StoreError> {
    raw.parse()
        .map_err(|e: crate::domain::foundation::ValidationError| StoreError::Serialization(e.to_string()))
}

/// Callback of a stored envelope document, if it still decodes.
fn envelope_callback(document: serde_json::Value) -> Option<String> {
    serde_json::from_value::<JobEnvelope>(document)
        .ok()
        .and_then(|envelope| envelope.callback_url())
}

/// PostgreSQL-backed job store.
#[derive(Clone)]
pub struct PostgresJobStore {
    pool: PgPool,
    poll_interval: Duration,
    cancel_ttl: Duration,
}

impl PostgresJobStore {
    pub fn new(pool: PgPool) -> Self {
        Self {
            pool,
            poll_interval: DEFAULT_POLL_INTERVAL,
            cancel_ttl: Duration::from_secs(3600),
        }
    }

    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval.max(Duration::from_millis(10));
        self
    }

    pub fn with_cancel_ttl(mut self, ttl: Duration) -> Self {
        self.cancel_ttl = ttl;
        self
    }

    /// Applies the bundled schema migrations.
    pub async fn migrate(&self) -> Result<(), StoreError> {
        sqlx::migrate!("./migrations")
            .run(&self.pool)
            .await
            .map_err(|e| StoreError::command(format!("migration failed: {}", e)))
    }

    async fn try_claim(&self, worker: &WorkerId) -> Result<Option<ClaimOutcome>, StoreError> {
        let row = sqlx::query(
            r#"
            UPDATE decision_jobs SET
                status = 'processing',
                worker_id = $1,
                claimed_at = now()
            WHERE id = (
                SELECT id FROM decision_jobs
                WHERE status = 'queued'
                ORDER BY enqueued_at
                FOR UPDATE SKIP LOCKED
                LIMIT 1
            )
            RETURNING id, envelope, claimed_at
            "#,
        )
        .bind(worker.as_str())
        .fetch_optional(&self.pool)
        .await
        .map_err(db_err)?;

        let Some(row) = row else {
            return Ok(None);
        };
        let id: String = row.get("id");
        let envelope: serde_json::Value = row.get("envelope");
        let claimed_at: DateTime<Utc> = row.get("claimed_at");

        match serde_json::from_value::<JobEnvelope>(envelope.clone()) {
            Ok(envelope) => {
                let mut job = envelope.claimed_by(worker);
                job.claimed_at = Timestamp::from_datetime(claimed_at);
                Ok(Some(ClaimOutcome::Claimed(job)))
            }
            Err(e) => {
                let malformed = MalformedJob {
                    raw: envelope.to_string(),
                    reason: e.to_string(),
                };
                sqlx::query(
                    "UPDATE decision_jobs SET status = 'failed', error = $2, finished_at = now() WHERE id = $1",
                )
                .bind(&id)
                .bind(&malformed.reason)
                .execute(&self.pool)
                .await
                .map_err(db_err)?;
                Ok(Some(ClaimOutcome::Malformed(malformed)))
            }
        }
    }

    async fn processing_jobs_older_than(&self, cutoff: Timestamp) -> Result<Vec<ClaimedJob>, StoreError> {
        let rows = sqlx::query(
            r#"
            SELECT id, correlation_id, envelope, worker_id, enqueued_at, claimed_at
            FROM decision_jobs
            WHERE status = 'processing' AND claimed_at <= $1
            "#,
        )
        .bind(*cutoff.as_datetime())
        .fetch_all(&self.pool)
        .await
        .map_err(db_err)?;

        let mut jobs = Vec::with_capacity(rows.len());
        for row in rows {
            let id: String = row.get("id");
            let worker: Option<String> = row.get("worker_id");
            let enqueued_at: DateTime<Utc> = row.get("enqueued_at");
            let claimed_at: DateTime<Utc> = row.get("claimed_at");
            let envelope: serde_json::Value = row.get("envelope");
            let (Ok(job_id), Some(Ok(claimed_by))) = (JobId::from_string(id), worker.map(WorkerId::new))
            else {
                continue;
            };
            jobs.push(ClaimedJob {
                job_id,
                correlation_id: row.get("correlation_id"),
                callback_url: envelope_callback(envelope),
                payload: serde_json::Value::Null,
                enqueued_at: Timestamp::from_datetime(enqueued_at),
                claimed_by,
                claimed_at: Timestamp::from_datetime(claimed_at),
            });
        }
        Ok(jobs)
    }
}

#[async_trait]
impl JobStore for PostgresJobStore {
    async fn ping(&self) -> Result<(), StoreError> {
        sqlx::query("SELECT 1")
            .execute(&self.pool)
            .await
            .map_err(db_err)?;
        Ok(())
    }

    async fn enqueue(&self, envelope: &JobEnvelope) -> Result<(), StoreError> {
        let document = serde_json::to_value(envelope)?;
        sqlx::query(
            r#"
            INSERT INTO decision_jobs (id, status, correlation_id, envelope, enqueued_at)
            VALUES ($1, 'queued', $2, $3, $4)
            "#,
        )
        .bind(envelope.job_id.as_str())
        .bind(envelope.correlation_id())
        .bind(document)
        .bind(*envelope.enqueued_at.as_datetime())
        .execute(&self.pool)
        .await
        .map_err(db_err)?;
        Ok(())
    }

    async fn claim(&self, worker: &WorkerId, wait: Duration) -> Result<ClaimOutcome, StoreError> {
        let deadline = tokio::time::Instant::now() + wait;
        loop {
            if let Some(outcome) = self.try_claim(worker).await? {
                return Ok(outcome);
            }
            let now = tokio::time::Instant::now();
            if now >= deadline {
                return Ok(ClaimOutcome::Empty);
            }
            tokio::time::sleep(self.poll_interval.min(deadline - now)).await;
        }
    }

    async fn record_malformed(&self, job: &MalformedJob) -> Result<(), StoreError> {
        sqlx::query("INSERT INTO malformed_jobs (raw, reason) VALUES ($1, $2)")
            .bind(&job.raw)
            .bind(&job.reason)
            .execute(&self.pool)
            .await
            .map_err(db_err)?;
        Ok(())
    }

    async fn is_cancel_requested(&self, job: &ClaimedJob) -> Result<bool, StoreError> {
        let keys = CancelTarget::keys_for(job);
        let row = sqlx::query(
            r#"
            SELECT EXISTS (
                SELECT 1 FROM cancel_requests
                WHERE marker_key = ANY($1) AND expires_at > now()
            ) AS requested
            "#,
        )
        .bind(&keys)
        .fetch_one(&self.pool)
        .await
        .map_err(db_err)?;
        Ok(row.get("requested"))
    }

    async fn request_cancel(&self, target: &CancelTarget, reason: &str) -> Result<u64, StoreError> {
        sqlx::query(
            r#"
            INSERT INTO cancel_requests (marker_key, reason, expires_at)
            VALUES ($1, $2, now() + make_interval(secs => $3))
            ON CONFLICT (marker_key) DO UPDATE SET
                reason = EXCLUDED.reason,
                created_at = now(),
                expires_at = EXCLUDED.expires_at
            "#,
        )
        .bind(target.marker_key())
        .bind(reason)
        .bind(self.cancel_ttl.as_secs_f64())
        .execute(&self.pool)
        .await
        .map_err(db_err)?;

        let (column, value) = match target {
            CancelTarget::Job(id) => ("id", id.as_str()),
            CancelTarget::Correlation(cid) => ("correlation_id", cid.as_str()),
        };
        let row = sqlx::query(&format!(
            "SELECT count(*) AS matched FROM decision_jobs \
             WHERE {} = $1 AND status IN ('queued', 'processing')",
            column
        ))
        .bind(value)
        .fetch_one(&self.pool)
        .await
        .map_err(db_err)?;
        let matched: i64 = row.get("matched");
        Ok(matched.max(0) as u64)
    }

    async fn finish(
        &self,
        job: &ClaimedJob,
        outcome: &JobOutcome,
        result_ttl: Duration,
    ) -> Result<FinishOutcome, StoreError> {
        let mut tx = self.pool.begin().await.map_err(db_err)?;

        let updated = sqlx::query(
            r#"
            WITH marker AS (
                SELECT reason FROM cancel_requests
                WHERE marker_key = ANY($3) AND expires_at > now()
                ORDER BY created_at
                LIMIT 1
            )
            UPDATE decision_jobs SET
                status = CASE
                    WHEN $2 = 'done' AND EXISTS (SELECT 1 FROM marker) THEN 'canceled'
                    ELSE $2
                END,
                error = CASE
                    WHEN $2 = 'done' THEN (SELECT reason FROM marker)
                    ELSE $4
                END,
                finished_at = now()
            WHERE id = $1 AND status IN ('queued', 'processing')
            RETURNING status, error
            "#,
        )
        .bind(job.job_id.as_str())
        .bind(outcome.status.as_str())
        .bind(CancelTarget::keys_for(job))
        .bind(outcome.result.error.as_deref())
        .fetch_optional(&mut *tx)
        .await
        .map_err(db_err)?;

        let Some(row) = updated else {
            let existing = sqlx::query("SELECT status FROM decision_jobs WHERE id = $1")
                .bind(job.job_id.as_str())
                .fetch_optional(&mut *tx)
                .await
                .map_err(db_err)?;
            tx.rollback().await.map_err(db_err)?;
            return match existing {
                Some(row) => {
                    let status: String = row.get("status");
                    Ok(FinishOutcome::AlreadyTerminal(parse_status(&status)?))
                }
                None => Err(StoreError::command(format!("job {} not found", job.job_id))),
            };
        };

        let status = parse_status(&row.get::<String, _>("status"))?;
        let recorded = if status == JobStatus::Canceled && outcome.status == JobStatus::Done {
            let reason: Option<String> = row.get("error");
            JobOutcome::canceled(&job.job_id, reason.unwrap_or_else(|| "canceled".to_string()))
        } else {
            outcome.clone()
        };

        sqlx::query(
            r#"
            INSERT INTO decision_results (job_id, result, expires_at)
            VALUES ($1, $2, now() + make_interval(secs => $3))
            ON CONFLICT (job_id) DO UPDATE SET
                result = EXCLUDED.result,
                expires_at = EXCLUDED.expires_at
            "#,
        )
        .bind(job.job_id.as_str())
        .bind(serde_json::to_value(&recorded.result)?)
        .bind(result_ttl.as_secs_f64())
        .execute(&mut *tx)
        .await
        .map_err(db_err)?;

        tx.commit().await.map_err(db_err)?;
        Ok(FinishOutcome::Recorded(recorded))
    }

    async fn fetch_result(&self, job_id: &JobId) -> Result<Option<DecisionResult>, StoreError> {
        let row = sqlx::query(
            "SELECT result FROM decision_results WHERE job_id = $1 AND expires_at > now()",
        )
        .bind(job_id.as_str())
        .fetch_optional(&self.pool)
        .await
        .map_err(db_err)?;

        match row {
            Some(row) => {
                let value: serde_json::Value = row.get("result");
                Ok(Some(serde_json::from_value(value)?))
            }
            None => Ok(None),
        }
    }

    async fn job_status(&self, job_id: &JobId) -> Result<Option<JobStatus>, StoreError> {
        let row = sqlx::query("SELECT status FROM decision_jobs WHERE id = $1")
            .bind(job_id.as_str())
            .fetch_optional(&self.pool)
            .await
            .map_err(db_err)?;
        row.map(|r| parse_status(&r.get::<String, _>("status")))
            .transpose()
    }

    async fn heartbeat(&self, worker: &WorkerId, ttl: Duration) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO worker_heartbeats (worker_id, last_seen, expires_at)
            VALUES ($1, now(), now() + make_interval(secs => $2))
            ON CONFLICT (worker_id) DO UPDATE SET
                last_seen = EXCLUDED.last_seen,
                expires_at = EXCLUDED.expires_at
            "#,
        )
        .bind(worker.as_str())
        .bind(ttl.as_secs_f64())
        .execute(&self.pool)
        .await
        .map_err(db_err)?;
        Ok(())
    }

    async fn live_workers(&self) -> Result<Vec<WorkerHeartbeat>, StoreError> {
        let rows = sqlx::query(
            r#"
            SELECT worker_id, last_seen FROM worker_heartbeats
            WHERE expires_at > now()
            ORDER BY worker_id
            "#,
        )
        .fetch_all(&self.pool)
        .await
        .map_err(db_err)?;

        Ok(rows
            .into_iter()
            .filter_map(|row| {
                let worker_id = WorkerId::new(row.get::<String, _>("worker_id")).ok()?;
                let last_seen: DateTime<Utc> = row.get("last_seen");
                Some(WorkerHeartbeat {
                    worker_id,
                    last_seen: Timestamp::from_datetime(last_seen),
                })
            })
            .collect())
    }

    async fn queue_status(&self) -> Result<QueueStatus, StoreError> {
        let rows = sqlx::query("SELECT status, count(*) AS n FROM decision_jobs GROUP BY status")
            .fetch_all(&self.pool)
            .await
            .map_err(db_err)?;
        let mut counts = StatusCounts::default();
        for row in rows {
            let status = parse_status(&row.get::<String, _>("status"))?;
            let n: i64 = row.get("n");
            counts.set(status, n.max(0) as u64);
        }

        let queued = sqlx::query(
            r#"
            SELECT id, correlation_id, enqueued_at FROM decision_jobs
            WHERE status = 'queued'
            ORDER BY enqueued_at
            LIMIT $1
            "#,
        )
        .bind(STATUS_SAMPLE_SIZE as i64 * 4)
        .fetch_all(&self.pool)
        .await
        .map_err(db_err)?;

        let mut oldest_queued = None;
        let mut sample_correlation_ids = Vec::new();
        for row in &queued {
            let correlation_id: Option<String> = row.get("correlation_id");
            if oldest_queued.is_none() {
                let enqueued_at: DateTime<Utc> = row.get("enqueued_at");
                if let Ok(job_id) = JobId::from_string(row.get::<String, _>("id")) {
                    oldest_queued = Some(QueuedJobSummary {
                        job_id,
                        correlation_id: correlation_id.clone(),
                        enqueued_at: Timestamp::from_datetime(enqueued_at),
                    });
                }
            }
            if let Some(cid) = correlation_id {
                if sample_correlation_ids.len() < STATUS_SAMPLE_SIZE {
                    sample_correlation_ids.push(cid);
                }
            }
        }

        let activity = sqlx::query(
            r#"
            SELECT GREATEST(max(claimed_at), max(finished_at)) AS last_activity
            FROM decision_jobs
            "#,
        )
        .fetch_one(&self.pool)
        .await
        .map_err(db_err)?;
        let last_activity: Option<DateTime<Utc>> = activity.get("last_activity");

        Ok(QueueStatus {
            counts,
            oldest_queued,
            last_activity: last_activity.map(Timestamp::from_datetime),
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
        for job in self.processing_jobs_older_than(cutoff).await? {
            let outcome = JobOutcome::canceled(&job.job_id, reason);
            if let FinishOutcome::Recorded(outcome) = self.finish(&job, &outcome, SWEEP_RESULT_TTL).await? {
                swept.push(SweptJob { job, outcome });
            }
        }
        Ok(swept)
    }
}

impl std::fmt::Debug for PostgresJobStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PostgresJobStore")
            .field("poll_interval", &self.poll_interval)
            .finish_non_exhaustive()
    }
}
