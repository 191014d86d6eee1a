//! JobProcessor - one claim, compute and deliver cycle.
//!
//! Cancellation is checked twice: right after the claim (skip compute) and
//! right after compute (discard the decision). The store's conditional
//! terminal write closes the remaining window, so a job canceled before
//! delivery never hands out a `done` result on either channel. If a cancel
//! check itself fails, the job is finished as `failed` rather than left in
//! `processing`.

use std::sync::Arc;
use std::time::Duration;

use tracing::{info, warn};

use super::delivery::deliver_callback;
use crate::domain::foundation::WorkerId;
use crate::domain::intent::{DecisionRequest, DecisionResult, IntentEngine};
use crate::domain::job::{ClaimedJob, JobOutcome, JobStatus};
use crate::ports::{
    ClaimOutcome, DecisionObserver, FinishOutcome, JobStore, ResultNotifier, StoreError,
};

pub const CANCELED_BEFORE_COMPUTE: &str = "canceled before processing";
pub const CANCELED_DURING_COMPUTE: &str = "canceled during processing";
pub const CANCEL_CHECK_FAILED: &str = "cancel check failed";

/// Delivery settings for the processor.
#[derive(Debug, Clone)]
pub struct ProcessorConfig {
    /// Lifetime of the poll slot.
    pub result_ttl: Duration,
    pub callback_timeout: Duration,
}

impl Default for ProcessorConfig {
    fn default() -> Self {
        Self {
            result_ttl: Duration::from_secs(300),
            callback_timeout: Duration::from_secs(5),
        }
    }
}

impl ProcessorConfig {
    pub fn with_result_ttl(mut self, ttl: Duration) -> Self {
        self.result_ttl = ttl;
        self
    }

    pub fn with_callback_timeout(mut self, timeout: Duration) -> Self {
        self.callback_timeout = timeout;
        self
    }
}

/// What one processing cycle did.
#[derive(Debug, Clone, PartialEq)]
pub enum ProcessOutcome {
    /// Nothing was claimable within the wait.
    Idle,
    /// An undecodable entry was dequeued and logged as failed.
    Malformed,
    /// This worker recorded the terminal status.
    Recorded(JobStatus),
    /// Another writer (usually the watchdog) finished the job first.
    Superseded(JobStatus),
}

pub struct JobProcessor {
    store: Arc<dyn JobStore>,
    engine: Arc<IntentEngine>,
    notifier: Arc<dyn ResultNotifier>,
    observers: Vec<Arc<dyn DecisionObserver>>,
    config: ProcessorConfig,
}

impl JobProcessor {
    pub fn new(
        store: Arc<dyn JobStore>,
        engine: Arc<IntentEngine>,
        notifier: Arc<dyn ResultNotifier>,
    ) -> Self {
        Self {
            store,
            engine,
            notifier,
            observers: Vec::new(),
            config: ProcessorConfig::default(),
        }
    }

    pub fn with_config(mut self, config: ProcessorConfig) -> Self {
        self.config = config;
        self
    }

    pub fn with_observer(mut self, observer: Arc<dyn DecisionObserver>) -> Self {
        self.observers.push(observer);
        self
    }

    pub fn store(&self) -> &Arc<dyn JobStore> {
        &self.store
    }

    /// Claims at most one job and carries it to a terminal state.
    pub async fn process_next(
        &self,
        worker: &WorkerId,
        wait: Duration,
    ) -> Result<ProcessOutcome, StoreError> {
        match self.store.claim(worker, wait).await? {
            ClaimOutcome::Empty => Ok(ProcessOutcome::Idle),
            ClaimOutcome::Malformed(malformed) => {
                warn!(worker_id = %worker, reason = %malformed.reason, "Dropping malformed job entry");
                self.store.record_malformed(&malformed).await?;
                Ok(ProcessOutcome::Malformed)
            }
            ClaimOutcome::Claimed(job) => self.process(job).await,
        }
    }

    /// Runs a claimed job through compute and delivery.
    pub async fn process(&self, job: ClaimedJob) -> Result<ProcessOutcome, StoreError> {
        info!(
            job_id = %job.job_id,
            worker_id = %job.claimed_by,
            correlation_id = job.correlation_id.as_deref().unwrap_or(""),
            "Job claimed"
        );

        let canceled = match self.store.is_cancel_requested(&job).await {
            Ok(canceled) => canceled,
            Err(err) => return self.fail_on_store_error(&job, err).await,
        };
        if canceled {
            info!(job_id = %job.job_id, "Job canceled before compute");
            let outcome = JobOutcome::canceled(&job.job_id, CANCELED_BEFORE_COMPUTE);
            return self.finish(&job, outcome).await;
        }

        let request = match DecisionRequest::from_value(job.payload.clone()) {
            Ok(request) => request,
            Err(err) => {
                warn!(job_id = %job.job_id, error = %err, "Invalid decision request");
                let outcome = JobOutcome::failed(&job.job_id, err.to_string());
                return self.finish(&job, outcome).await;
            }
        };

        let decision = self.engine.decide(&request).await;

        let canceled = match self.store.is_cancel_requested(&job).await {
            Ok(canceled) => canceled,
            Err(err) => return self.fail_on_store_error(&job, err).await,
        };
        if canceled {
            info!(
                job_id = %job.job_id,
                intent_id = %decision.intent_id,
                "Job canceled during compute, discarding decision"
            );
            let outcome = JobOutcome::canceled(&job.job_id, CANCELED_DURING_COMPUTE);
            return self.finish(&job, outcome).await;
        }

        let outcome = JobOutcome::done(&job.job_id, DecisionResult::from_decision(&decision));
        self.finish(&job, outcome).await
    }

    /// Best-effort `failed` finish after a store call broke mid-job. The
    /// original error is returned when the finish fails too.
    async fn fail_on_store_error(
        &self,
        job: &ClaimedJob,
        err: StoreError,
    ) -> Result<ProcessOutcome, StoreError> {
        warn!(job_id = %job.job_id, error = %err, "Cancel check failed, failing job");
        let outcome = JobOutcome::failed(&job.job_id, format!("{}: {}", CANCEL_CHECK_FAILED, err));
        match self.finish(job, outcome).await {
            Ok(recorded) => Ok(recorded),
            Err(finish_err) => {
                warn!(job_id = %job.job_id, error = %finish_err, "Could not record failure");
                Err(err)
            }
        }
    }

    async fn finish(&self, job: &ClaimedJob, outcome: JobOutcome) -> Result<ProcessOutcome, StoreError> {
        match self.store.finish(job, &outcome, self.config.result_ttl).await? {
            FinishOutcome::Recorded(recorded) => {
                if recorded.status != outcome.status {
                    info!(
                        job_id = %job.job_id,
                        requested = %outcome.status,
                        recorded = %recorded.status,
                        "Cancel marker observed at finalization"
                    );
                }
                info!(job_id = %job.job_id, status = %recorded.status, "Job finished");

                for observer in &self.observers {
                    observer.on_recorded(job, &recorded);
                }
                deliver_callback(
                    self.notifier.as_ref(),
                    self.config.callback_timeout,
                    job,
                    &recorded.result,
                )
                .await;
                Ok(ProcessOutcome::Recorded(recorded.status))
            }
            FinishOutcome::AlreadyTerminal(status) => {
                info!(
                    job_id = %job.job_id,
                    status = %status,
                    "Job already terminal, skipping delivery"
                );
                Ok(ProcessOutcome::Superseded(status))
            }
        }
    }
}
