//! WorkerPool - N independent claim loops plus their heartbeats.
//!
//! Workers share nothing in-process except the store handle. The store's
//! claim primitive is the only mutual exclusion between them.
//!
//! ## Shutdown
//!
//! The watch channel is checked between iterations. A worker finishes the
//! job it holds, then stops claiming; a pending claim wait runs out first.
//! A dropped shutdown sender counts as a shutdown signal.

use std::sync::Arc;
use std::time::Duration;

use futures::future::join_all;
use thiserror::Error;
use tokio::sync::watch;
use tokio::time;
use tracing::{error, info, warn};

use super::processor::JobProcessor;
use crate::domain::foundation::WorkerId;
use crate::ports::{JobStore, StoreError};

#[derive(Debug, Error)]
pub enum WorkerError {
    #[error("job store unreachable: {0}")]
    StoreUnreachable(#[source] StoreError),

    #[error("worker task aborted: {0}")]
    TaskAborted(String),
}

/// Pool sizing and timing.
#[derive(Debug, Clone)]
pub struct WorkerPoolConfig {
    pub pool_size: usize,
    /// How long one claim waits for a job.
    pub claim_timeout: Duration,
    pub heartbeat_ttl: Duration,
    pub heartbeat_interval: Duration,
    /// Pause after a store error before the next claim.
    pub error_backoff: Duration,
}

impl Default for WorkerPoolConfig {
    fn default() -> Self {
        Self {
            pool_size: 4,
            claim_timeout: Duration::from_secs(5),
            heartbeat_ttl: Duration::from_secs(30),
            heartbeat_interval: Duration::from_secs(10),
            error_backoff: Duration::from_secs(1),
        }
    }
}

impl WorkerPoolConfig {
    pub fn with_pool_size(mut self, size: usize) -> Self {
        self.pool_size = size;
        self
    }

    pub fn with_claim_timeout(mut self, timeout: Duration) -> Self {
        self.claim_timeout = timeout;
        self
    }

    pub fn with_heartbeat(mut self, ttl: Duration, interval: Duration) -> Self {
        self.heartbeat_ttl = ttl;
        self.heartbeat_interval = interval;
        self
    }

    pub fn with_error_backoff(mut self, backoff: Duration) -> Self {
        self.error_backoff = backoff;
        self
    }
}

pub struct WorkerPool {
    processor: Arc<JobProcessor>,
    config: WorkerPoolConfig,
}

impl WorkerPool {
    pub fn new(processor: Arc<JobProcessor>, config: WorkerPoolConfig) -> Self {
        Self { processor, config }
    }

    /// Runs every worker until shutdown.
    ///
    /// Fails fast when the store cannot be reached at startup; that is the
    /// only fatal condition.
    pub async fn run(&self, shutdown: watch::Receiver<bool>) -> Result<(), WorkerError> {
        self.processor
            .store()
            .ping()
            .await
            .map_err(WorkerError::StoreUnreachable)?;

        let size = self.config.pool_size.max(1);
        info!(pool_size = size, "Starting worker pool");

        let handles: Vec<_> = (0..size)
            .map(|index| {
                let unit = WorkerUnit {
                    worker_id: WorkerId::for_process(index),
                    processor: self.processor.clone(),
                    config: self.config.clone(),
                };
                tokio::spawn(unit.run(shutdown.clone()))
            })
            .collect();

        for joined in join_all(handles).await {
            if let Err(err) = joined {
                error!(error = %err, "Worker task ended abnormally");
                return Err(WorkerError::TaskAborted(err.to_string()));
            }
        }

        info!("Worker pool stopped");
        Ok(())
    }
}

struct WorkerUnit {
    worker_id: WorkerId,
    processor: Arc<JobProcessor>,
    config: WorkerPoolConfig,
}

impl WorkerUnit {
    async fn run(self, shutdown: watch::Receiver<bool>) {
        info!(worker_id = %self.worker_id, "Worker started");
        tokio::join!(self.heartbeat_loop(shutdown.clone()), self.claim_loop(shutdown));
        info!(worker_id = %self.worker_id, "Worker stopped");
    }

    async fn claim_loop(&self, mut shutdown: watch::Receiver<bool>) {
        while !stopping(&shutdown) {
            let cycle = self
                .processor
                .process_next(&self.worker_id, self.config.claim_timeout)
                .await;

            if let Err(err) = cycle {
                warn!(worker_id = %self.worker_id, error = %err, "Worker cycle failed");
                tokio::select! {
                    _ = time::sleep(self.config.error_backoff) => {}
                    changed = shutdown.changed() => {
                        if changed.is_err() {
                            return;
                        }
                    }
                }
            }
        }
    }

    async fn heartbeat_loop(&self, mut shutdown: watch::Receiver<bool>) {
        let store: &Arc<dyn JobStore> = self.processor.store();
        let mut interval = time::interval(self.config.heartbeat_interval);

        loop {
            tokio::select! {
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        return;
                    }
                }
                _ = interval.tick() => {
                    if let Err(err) = store.heartbeat(&self.worker_id, self.config.heartbeat_ttl).await {
                        warn!(worker_id = %self.worker_id, error = %err, "Heartbeat failed");
                    }
                }
            }
        }
    }
}

fn stopping(shutdown: &watch::Receiver<bool>) -> bool {
    *shutdown.borrow() || shutdown.has_changed().is_err()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::queue::InMemoryJobStore;
    use crate::domain::foundation::JobId;
    use crate::domain::intent::{DecisionRequest, DecisionResult, IntentEngine};
    use crate::domain::job::{
        CancelTarget, ClaimedJob, JobEnvelope, JobOutcome, JobStatus, MalformedJob, QueueStatus,
        WorkerHeartbeat,
    };
    use crate::ports::{
        AdvisoryError, AdvisoryOutcome, AdvisoryReasoner, ClaimOutcome, FinishOutcome,
        NotifyError, ResultNotifier, SweptJob,
    };
    use async_trait::async_trait;
    use serde_json::json;

    struct SilentReasoner;

    #[async_trait]
    impl AdvisoryReasoner for SilentReasoner {
        async fn propose(&self, _request: &DecisionRequest) -> AdvisoryOutcome {
            AdvisoryOutcome::NoDecision(AdvisoryError::NotConfigured)
        }
    }

    struct NullNotifier;

    #[async_trait]
    impl ResultNotifier for NullNotifier {
        async fn notify(&self, _url: &str, _result: &DecisionResult) -> Result<(), NotifyError> {
            Ok(())
        }
    }

    /// Store whose every call reports the backend as down.
    struct DownStore;

    #[async_trait]
    impl JobStore for DownStore {
        async fn ping(&self) -> Result<(), StoreError> {
            Err(StoreError::unavailable("connection refused"))
        }
        async fn enqueue(&self, _: &JobEnvelope) -> Result<(), StoreError> {
            Err(StoreError::unavailable("down"))
        }
        async fn claim(&self, _: &WorkerId, _: Duration) -> Result<ClaimOutcome, StoreError> {
            Err(StoreError::unavailable("down"))
        }
        async fn record_malformed(&self, _: &MalformedJob) -> Result<(), StoreError> {
            Err(StoreError::unavailable("down"))
        }
        async fn is_cancel_requested(&self, _: &ClaimedJob) -> Result<bool, StoreError> {
            Err(StoreError::unavailable("down"))
        }
        async fn request_cancel(&self, _: &CancelTarget, _: &str) -> Result<u64, StoreError> {
            Err(StoreError::unavailable("down"))
        }
        async fn finish(
            &self,
            _: &ClaimedJob,
            _: &JobOutcome,
            _: Duration,
        ) -> Result<FinishOutcome, StoreError> {
            Err(StoreError::unavailable("down"))
        }
        async fn fetch_result(&self, _: &JobId) -> Result<Option<DecisionResult>, StoreError> {
            Err(StoreError::unavailable("down"))
        }
        async fn job_status(&self, _: &JobId) -> Result<Option<JobStatus>, StoreError> {
            Err(StoreError::unavailable("down"))
        }
        async fn heartbeat(&self, _: &WorkerId, _: Duration) -> Result<(), StoreError> {
            Err(StoreError::unavailable("down"))
        }
        async fn live_workers(&self) -> Result<Vec<WorkerHeartbeat>, StoreError> {
            Err(StoreError::unavailable("down"))
        }
        async fn queue_status(&self) -> Result<QueueStatus, StoreError> {
            Err(StoreError::unavailable("down"))
        }
        async fn cancel_stuck(&self, _: Duration, _: &str) -> Result<Vec<SweptJob>, StoreError> {
            Err(StoreError::unavailable("down"))
        }
    }

    fn pool(store: Arc<dyn JobStore>, size: usize) -> WorkerPool {
        let engine = Arc::new(IntentEngine::new(Arc::new(SilentReasoner)));
        let processor = Arc::new(JobProcessor::new(store, engine, Arc::new(NullNotifier)));
        let config = WorkerPoolConfig::default()
            .with_pool_size(size)
            .with_claim_timeout(Duration::from_millis(20))
            .with_heartbeat(Duration::from_secs(5), Duration::from_millis(10));
        WorkerPool::new(processor, config)
    }

    #[tokio::test]
    async fn unreachable_store_is_fatal() {
        let (_tx, rx) = watch::channel(false);
        let err = pool(Arc::new(DownStore), 2).run(rx).await.unwrap_err();
        assert!(matches!(err, WorkerError::StoreUnreachable(_)));
    }

    #[tokio::test]
    async fn drains_queue_registers_heartbeats_and_stops() {
        let store = Arc::new(InMemoryJobStore::new());
        let mut ids = Vec::new();
        for n in 0..6 {
            let envelope = JobEnvelope::new(
                JobId::new(),
                json!({"session_id": "s", "goal_text": format!("What is {} + 1?", n)}),
            );
            ids.push(envelope.job_id.clone());
            store.enqueue(&envelope).await.unwrap();
        }

        let (tx, rx) = watch::channel(false);
        let running = tokio::spawn({
            let pool = pool(store.clone(), 3);
            async move { pool.run(rx).await }
        });

        let mut drained = false;
        for _ in 0..100 {
            let status = store.queue_status().await.unwrap();
            if status.counts.done == 6 {
                drained = true;
                break;
            }
            time::sleep(Duration::from_millis(10)).await;
        }
        assert!(drained, "pool did not finish all jobs");
        assert_eq!(store.live_workers().await.unwrap().len(), 3);

        tx.send(true).unwrap();
        running.await.unwrap().unwrap();

        for id in ids {
            assert_eq!(store.job_status(&id).await.unwrap(), Some(JobStatus::Done));
        }
    }

    #[tokio::test]
    async fn stops_when_shutdown_sender_is_dropped() {
        let (tx, rx) = watch::channel(false);
        drop(tx);

        let stopped = time::timeout(
            Duration::from_secs(2),
            pool(Arc::new(InMemoryJobStore::new()), 2).run(rx),
        )
        .await;
        assert!(matches!(stopped, Ok(Ok(()))), "pool kept running without a shutdown sender");
    }
}
