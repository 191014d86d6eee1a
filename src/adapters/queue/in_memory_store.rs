//! In-memory job store for tests and single-process development.
//!
//! Mirrors the list-store semantics: a FIFO of raw envelopes, an in-flight
//! set, TTL'd poll slots, cancel markers and heartbeats, and capped terminal
//! logs. All state sits behind one async mutex, so every operation is atomic.
//! Expired entries are purged on claim and finish; a terminal job record goes
//! with its poll slot.

use std::collections::{HashMap, VecDeque};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use tokio::sync::{Mutex, Notify};

use super::log_entry::{TerminalLogEntry, DEFAULT_LOG_CAP};
use crate::domain::foundation::{JobId, StateMachine, Timestamp, WorkerId};
use crate::domain::intent::DecisionResult;
use crate::domain::job::{
    CancelTarget, ClaimedJob, JobEnvelope, JobOutcome, JobStatus, MalformedJob, QueueStatus,
    QueuedJobSummary, StatusCounts, WorkerHeartbeat, STATUS_SAMPLE_SIZE,
};
use crate::ports::{ClaimOutcome, FinishOutcome, JobStore, StoreError, SweptJob};

/// Default lifetime of a cancel marker.
pub const DEFAULT_CANCEL_TTL: Duration = Duration::from_secs(3600);

/// Poll-slot lifetime for results written by a stuck-job sweep.
pub const SWEEP_RESULT_TTL: Duration = Duration::from_secs(300);

#[derive(Debug)]
struct JobRecord {
    correlation_id: Option<String>,
    callback_url: Option<String>,
    enqueued_at: Timestamp,
    status: JobStatus,
    claimed_at: Option<Timestamp>,
    claimed_by: Option<WorkerId>,
}

#[derive(Debug)]
struct Expiring<T> {
    value: T,
    expires_at: Instant,
}

impl<T> Expiring<T> {
    fn new(value: T, ttl: Duration) -> Self {
        Self {
            value,
            expires_at: Instant::now() + ttl,
        }
    }

    fn live(&self) -> Option<&T> {
        (Instant::now() < self.expires_at).then_some(&self.value)
    }
}

#[derive(Debug, Default)]
struct State {
    queue: VecDeque<String>,
    jobs: HashMap<JobId, JobRecord>,
    results: HashMap<JobId, Expiring<DecisionResult>>,
    cancel_markers: HashMap<String, Expiring<String>>,
    heartbeats: HashMap<WorkerId, Expiring<Timestamp>>,
    completed_log: VecDeque<TerminalLogEntry>,
    failed_log: VecDeque<TerminalLogEntry>,
    terminal_counts: StatusCounts,
    last_activity: Option<Timestamp>,
}

impl State {
    /// Drops expired slots, markers and heartbeats, then terminal records
    /// whose poll slot is gone.
    fn purge_expired(&mut self) {
        self.results.retain(|_, slot| slot.live().is_some());
        self.cancel_markers.retain(|_, marker| marker.live().is_some());
        self.heartbeats.retain(|_, beat| beat.live().is_some());
        let results = &self.results;
        self.jobs
            .retain(|id, record| !record.status.is_terminal() || results.contains_key(id));
    }

    fn cancel_reason(&self, job: &ClaimedJob) -> Option<String> {
        CancelTarget::keys_for(job)
            .iter()
            .find_map(|key| self.cancel_markers.get(key).and_then(Expiring::live).cloned())
    }

    fn log(&mut self, entry: TerminalLogEntry, cap: usize) {
        let log = if entry.is_failure() {
            &mut self.failed_log
        } else {
            &mut self.completed_log
        };
        log.push_front(entry);
        log.truncate(cap);
    }

    /// The conditional terminal write.
    fn finish(
        &mut self,
        job: &ClaimedJob,
        outcome: &JobOutcome,
        result_ttl: Duration,
        log_cap: usize,
    ) -> FinishOutcome {
        if let Some(record) = self.jobs.get(&job.job_id) {
            if record.status.is_terminal() {
                return FinishOutcome::AlreadyTerminal(record.status);
            }
        }

        let recorded = match (outcome.status, self.cancel_reason(job)) {
            (JobStatus::Done, Some(reason)) => JobOutcome::canceled(&job.job_id, reason),
            _ => outcome.clone(),
        };

        let record = self.jobs.entry(job.job_id.clone()).or_insert_with(|| JobRecord {
            correlation_id: job.correlation_id.clone(),
            callback_url: job.callback_url.clone(),
            enqueued_at: job.enqueued_at,
            status: JobStatus::Processing,
            claimed_at: Some(job.claimed_at),
            claimed_by: Some(job.claimed_by.clone()),
        });
        record.status = recorded.status;

        self.results.insert(
            job.job_id.clone(),
            Expiring::new(recorded.result.clone(), result_ttl),
        );
        let count = self.terminal_counts.get(recorded.status) + 1;
        self.terminal_counts.set(recorded.status, count);
        self.last_activity = Some(Timestamp::now());
        self.log(TerminalLogEntry::for_outcome(&job.job_id, &recorded), log_cap);

        FinishOutcome::Recorded(recorded)
    }
}

/// Single-process job store.
#[derive(Debug)]
pub struct InMemoryJobStore {
    state: Mutex<State>,
    arrivals: Notify,
    log_cap: usize,
    cancel_ttl: Duration,
}

impl Default for InMemoryJobStore {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryJobStore {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(State::default()),
            arrivals: Notify::new(),
            log_cap: DEFAULT_LOG_CAP,
            cancel_ttl: DEFAULT_CANCEL_TTL,
        }
    }

    pub fn with_log_cap(mut self, cap: usize) -> Self {
        self.log_cap = cap.max(1);
        self
    }

    pub fn with_cancel_ttl(mut self, ttl: Duration) -> Self {
        self.cancel_ttl = ttl;
        self
    }

    /// Pushes a raw queue entry as-is, bypassing encoding.
    pub async fn enqueue_raw(&self, raw: impl Into<String>) {
        self.state.lock().await.queue.push_back(raw.into());
        self.arrivals.notify_one();
    }

    /// Most recent entries first.
    pub async fn completed_log(&self) -> Vec<TerminalLogEntry> {
        self.state.lock().await.completed_log.iter().cloned().collect()
    }

    pub async fn failed_log(&self) -> Vec<TerminalLogEntry> {
        self.state.lock().await.failed_log.iter().cloned().collect()
    }

    /// Entry counts of (jobs, results, cancel markers, heartbeats).
    #[cfg(test)]
    async fn retained(&self) -> (usize, usize, usize, usize) {
        let state = self.state.lock().await;
        (
            state.jobs.len(),
            state.results.len(),
            state.cancel_markers.len(),
            state.heartbeats.len(),
        )
    }

    async fn try_claim(&self, worker: &WorkerId) -> Option<ClaimOutcome> {
        let mut state = self.state.lock().await;
        state.purge_expired();
        let raw = state.queue.pop_front()?;

        let envelope = match JobEnvelope::decode(&raw) {
            Ok(envelope) => envelope,
            Err(malformed) => return Some(ClaimOutcome::Malformed(malformed)),
        };
        let job = envelope.claimed_by(worker);

        let record = state.jobs.entry(job.job_id.clone()).or_insert_with(|| JobRecord {
            correlation_id: job.correlation_id.clone(),
            callback_url: job.callback_url.clone(),
            enqueued_at: job.enqueued_at,
            status: JobStatus::Queued,
            claimed_at: None,
            claimed_by: None,
        });
        record.status = JobStatus::Processing;
        record.claimed_at = Some(job.claimed_at);
        record.claimed_by = Some(worker.clone());
        state.last_activity = Some(Timestamp::now());

        Some(ClaimOutcome::Claimed(job))
    }
}

#[async_trait]
impl JobStore for InMemoryJobStore {
    async fn ping(&self) -> Result<(), StoreError> {
        Ok(())
    }

    async fn enqueue(&self, envelope: &JobEnvelope) -> Result<(), StoreError> {
        let raw = envelope.encode()?;
        {
            let mut state = self.state.lock().await;
            state.jobs.insert(
                envelope.job_id.clone(),
                JobRecord {
                    correlation_id: envelope.correlation_id(),
                    callback_url: envelope.callback_url(),
                    enqueued_at: envelope.enqueued_at,
                    status: JobStatus::Queued,
                    claimed_at: None,
                    claimed_by: None,
                },
            );
            state.queue.push_back(raw);
        }
        self.arrivals.notify_one();
        Ok(())
    }

    async fn claim(&self, worker: &WorkerId, wait: Duration) -> Result<ClaimOutcome, StoreError> {
        let deadline = tokio::time::Instant::now() + wait;
        loop {
            if let Some(outcome) = self.try_claim(worker).await {
                return Ok(outcome);
            }
            let arrived = tokio::time::timeout_at(deadline, self.arrivals.notified()).await;
            if arrived.is_err() {
                return Ok(ClaimOutcome::Empty);
            }
        }
    }

    async fn record_malformed(&self, job: &MalformedJob) -> Result<(), StoreError> {
        let mut state = self.state.lock().await;
        let count = state.terminal_counts.failed + 1;
        state.terminal_counts.failed = count;
        state.last_activity = Some(Timestamp::now());
        state.log(TerminalLogEntry::for_malformed(job), self.log_cap);
        Ok(())
    }

    async fn is_cancel_requested(&self, job: &ClaimedJob) -> Result<bool, StoreError> {
        Ok(self.state.lock().await.cancel_reason(job).is_some())
    }

    async fn request_cancel(&self, target: &CancelTarget, reason: &str) -> Result<u64, StoreError> {
        let mut state = self.state.lock().await;
        state
            .cancel_markers
            .insert(target.marker_key(), Expiring::new(reason.to_string(), self.cancel_ttl));

        let matched = state
            .jobs
            .iter()
            .filter(|(id, record)| {
                !record.status.is_terminal() && target.matches(id, record.correlation_id.as_deref())
            })
            .count();
        Ok(matched as u64)
    }

    async fn finish(
        &self,
        job: &ClaimedJob,
        outcome: &JobOutcome,
        result_ttl: Duration,
    ) -> Result<FinishOutcome, StoreError> {
        let mut state = self.state.lock().await;
        state.purge_expired();
        Ok(state.finish(job, outcome, result_ttl, self.log_cap))
    }

    async fn fetch_result(&self, job_id: &JobId) -> Result<Option<DecisionResult>, StoreError> {
        let state = self.state.lock().await;
        Ok(state.results.get(job_id).and_then(Expiring::live).cloned())
    }

    async fn job_status(&self, job_id: &JobId) -> Result<Option<JobStatus>, StoreError> {
        Ok(self.state.lock().await.jobs.get(job_id).map(|r| r.status))
    }

    async fn heartbeat(&self, worker: &WorkerId, ttl: Duration) -> Result<(), StoreError> {
        self.state
            .lock()
            .await
            .heartbeats
            .insert(worker.clone(), Expiring::new(Timestamp::now(), ttl));
        Ok(())
    }

    async fn live_workers(&self) -> Result<Vec<WorkerHeartbeat>, StoreError> {
        let state = self.state.lock().await;
        let mut workers: Vec<WorkerHeartbeat> = state
            .heartbeats
            .iter()
            .filter_map(|(worker_id, beat)| {
                beat.live().map(|last_seen| WorkerHeartbeat {
                    worker_id: worker_id.clone(),
                    last_seen: *last_seen,
                })
            })
            .collect();
        workers.sort_by(|a, b| a.worker_id.as_str().cmp(b.worker_id.as_str()));
        Ok(workers)
    }

    async fn queue_status(&self) -> Result<QueueStatus, StoreError> {
        let state = self.state.lock().await;

        let queued: Vec<JobEnvelope> = state
            .queue
            .iter()
            .filter_map(|raw| JobEnvelope::decode(raw).ok())
            .collect();

        let mut counts = state.terminal_counts;
        counts.queued = state.queue.len() as u64;
        counts.processing = state
            .jobs
            .values()
            .filter(|r| r.status == JobStatus::Processing)
            .count() as u64;

        let oldest_queued = queued.first().map(|e| QueuedJobSummary {
            job_id: e.job_id.clone(),
            correlation_id: e.correlation_id(),
            enqueued_at: e.enqueued_at,
        });
        let sample_correlation_ids = queued
            .iter()
            .filter_map(JobEnvelope::correlation_id)
            .take(STATUS_SAMPLE_SIZE)
            .collect();
        let live_workers = state.heartbeats.values().filter(|b| b.live().is_some()).count();

        Ok(QueueStatus {
            counts,
            oldest_queued,
            last_activity: state.last_activity,
            sample_correlation_ids,
            live_workers,
        })
    }

    async fn cancel_stuck(
        &self,
        older_than: Duration,
        reason: &str,
    ) -> Result<Vec<SweptJob>, StoreError> {
        let mut state = self.state.lock().await;
        let cutoff = Timestamp::now().minus(older_than);

        let stuck: Vec<ClaimedJob> = state
            .jobs
            .iter()
            .filter(|(_, r)| r.status == JobStatus::Processing)
            .filter_map(|(id, r)| {
                let claimed_at = r.claimed_at?;
                (!cutoff.is_before(&claimed_at)).then(|| ClaimedJob {
                    job_id: id.clone(),
                    correlation_id: r.correlation_id.clone(),
                    callback_url: r.callback_url.clone(),
                    payload: serde_json::Value::Null,
                    enqueued_at: r.enqueued_at,
                    claimed_by: r.claimed_by.clone().unwrap_or_else(watchdog_worker),
                    claimed_at,
                })
            })
            .collect();

        let mut swept = Vec::with_capacity(stuck.len());
        for job in stuck {
            let outcome = JobOutcome::canceled(&job.job_id, reason);
            if let FinishOutcome::Recorded(outcome) =
                state.finish(&job, &outcome, SWEEP_RESULT_TTL, self.log_cap)
            {
                swept.push(SweptJob { job, outcome });
            }
        }
        Ok(swept)
    }
}

fn watchdog_worker() -> WorkerId {
    WorkerId::for_process(0)
}
