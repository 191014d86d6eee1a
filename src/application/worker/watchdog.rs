//! Stuck-job watchdog.
//!
//! Force-cancels jobs that stay in `processing` past a threshold. It goes
//! through the same conditional terminal write as the workers, so a job that
//! completed a moment earlier keeps its result. Every job it cancels gets the
//! canceled result pushed to its callback, like a worker-recorded outcome.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::time;
use tracing::{info, warn};

use super::delivery::deliver_callback;
use crate::domain::foundation::DomainError;
use crate::ports::{JobStore, ResultNotifier, SweptJob};

pub const RESET_REASON: &str = "reset: canceled all processing";

#[derive(Debug, Clone)]
pub struct WatchdogConfig {
    /// Age in `processing` after which a job counts as stuck.
    pub stuck_after: Duration,
    pub poll_interval: Duration,
    pub callback_timeout: Duration,
}

impl Default for WatchdogConfig {
    fn default() -> Self {
        Self {
            stuck_after: Duration::from_secs(600),
            poll_interval: Duration::from_secs(30),
            callback_timeout: Duration::from_secs(5),
        }
    }
}

impl WatchdogConfig {
    pub fn with_stuck_after(mut self, threshold: Duration) -> Self {
        self.stuck_after = threshold;
        self
    }

    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    pub fn with_callback_timeout(mut self, timeout: Duration) -> Self {
        self.callback_timeout = timeout;
        self
    }
}

/// Cancel reason recorded for jobs past `threshold`.
pub fn stuck_reason(threshold: Duration) -> String {
    format!("auto-cancel: stuck >{}m", threshold.as_secs() / 60)
}

pub struct Watchdog {
    store: Arc<dyn JobStore>,
    notifier: Arc<dyn ResultNotifier>,
    config: WatchdogConfig,
}

impl Watchdog {
    pub fn new(
        store: Arc<dyn JobStore>,
        notifier: Arc<dyn ResultNotifier>,
        config: WatchdogConfig,
    ) -> Self {
        Self {
            store,
            notifier,
            config,
        }
    }

    /// Sweeps on every tick until shutdown, or until the shutdown sender is
    /// dropped. Sweep failures are logged and retried on the next tick.
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) {
        let mut interval = time::interval(self.config.poll_interval);
        info!(
            stuck_after_secs = self.config.stuck_after.as_secs(),
            "Watchdog started"
        );

        loop {
            tokio::select! {
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        info!("Watchdog stopped");
                        return;
                    }
                }
                _ = interval.tick() => {
                    if let Err(err) = self.sweep_once().await {
                        warn!(error = %err, "Watchdog sweep failed");
                    }
                }
            }
        }
    }

    /// One sweep. Returns how many jobs were canceled.
    pub async fn sweep_once(&self) -> Result<u64, DomainError> {
        let reason = stuck_reason(self.config.stuck_after);
        let swept = self.store.cancel_stuck(self.config.stuck_after, &reason).await?;
        if !swept.is_empty() {
            info!(canceled = swept.len(), reason = %reason, "Canceled stuck jobs");
        }
        Ok(self.deliver(swept).await)
    }

    /// Cancels every job currently processing, regardless of age.
    pub async fn reset_processing(&self) -> Result<u64, DomainError> {
        let swept = self.store.cancel_stuck(Duration::ZERO, RESET_REASON).await?;
        warn!(canceled = swept.len(), "Reset canceled all processing jobs");
        Ok(self.deliver(swept).await)
    }

    async fn deliver(&self, swept: Vec<SweptJob>) -> u64 {
        for SweptJob { job, outcome } in &swept {
            deliver_callback(
                self.notifier.as_ref(),
                self.config.callback_timeout,
                job,
                &outcome.result,
            )
            .await;
        }
        swept.len() as u64
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::queue::InMemoryJobStore;
    use crate::domain::foundation::{JobId, WorkerId};
    use crate::domain::intent::{Decision, DecisionResult, ResultStatus};
    use crate::domain::job::{JobEnvelope, JobOutcome, JobStatus};
    use crate::ports::{ClaimOutcome, FinishOutcome, NotifyError};
    use async_trait::async_trait;
    use serde_json::json;
    use std::sync::Mutex;

    #[derive(Default)]
    struct RecordingNotifier {
        sent: Mutex<Vec<(String, DecisionResult)>>,
    }

    #[async_trait]
    impl ResultNotifier for RecordingNotifier {
        async fn notify(&self, url: &str, result: &DecisionResult) -> Result<(), NotifyError> {
            self.sent.lock().unwrap().push((url.to_string(), result.clone()));
            Ok(())
        }
    }

    /// Never answers; the watchdog must give up at its callback timeout.
    struct HangingNotifier;

    #[async_trait]
    impl ResultNotifier for HangingNotifier {
        async fn notify(&self, _url: &str, _result: &DecisionResult) -> Result<(), NotifyError> {
            std::future::pending().await
        }
    }

    fn watchdog(store: Arc<InMemoryJobStore>, config: WatchdogConfig) -> Watchdog {
        Watchdog::new(store, Arc::new(RecordingNotifier::default()), config)
    }

    async fn claimed(store: &InMemoryJobStore) -> crate::domain::job::ClaimedJob {
        store
            .enqueue(&JobEnvelope::new(
                JobId::new(),
                json!({"session_id": "s", "goal_text": "g", "callback_url": "http://cb/w"}),
            ))
            .await
            .unwrap();
        match store
            .claim(&WorkerId::new("w").unwrap(), Duration::from_millis(10))
            .await
            .unwrap()
        {
            ClaimOutcome::Claimed(job) => job,
            other => panic!("expected claim, got {:?}", other),
        }
    }

    #[test]
    fn reason_uses_whole_minutes() {
        assert_eq!(stuck_reason(Duration::from_secs(600)), "auto-cancel: stuck >10m");
        assert_eq!(stuck_reason(Duration::from_secs(90)), "auto-cancel: stuck >1m");
    }

    #[tokio::test]
    async fn young_jobs_survive_sweep() {
        let store = Arc::new(InMemoryJobStore::new());
        let job = claimed(&store).await;

        let watchdog = watchdog(store.clone(), WatchdogConfig::default());
        assert_eq!(watchdog.sweep_once().await.unwrap(), 0);
        assert_eq!(store.job_status(&job.job_id).await.unwrap(), Some(JobStatus::Processing));
    }

    #[tokio::test]
    async fn reset_cancels_processing_and_blocks_late_done() {
        let store = Arc::new(InMemoryJobStore::new());
        let job = claimed(&store).await;

        let watchdog = watchdog(store.clone(), WatchdogConfig::default());
        assert_eq!(watchdog.reset_processing().await.unwrap(), 1);

        let slot = store.fetch_result(&job.job_id).await.unwrap().unwrap();
        assert_eq!(slot.status, ResultStatus::Canceled);

        let late = JobOutcome::done(
            &job.job_id,
            DecisionResult::from_decision(&Decision::finish("x", "late")),
        );
        let outcome = store.finish(&job, &late, Duration::from_secs(60)).await.unwrap();
        assert_eq!(outcome, FinishOutcome::AlreadyTerminal(JobStatus::Canceled));
    }

    #[tokio::test]
    async fn run_stops_on_shutdown() {
        let store = Arc::new(InMemoryJobStore::new());
        let watchdog = watchdog(
            store,
            WatchdogConfig::default().with_poll_interval(Duration::from_millis(5)),
        );
        let (tx, rx) = watch::channel(false);
        let handle = tokio::spawn(async move { watchdog.run(rx).await });
        time::sleep(Duration::from_millis(20)).await;
        tx.send(true).unwrap();
        handle.await.unwrap();
    }

    #[tokio::test]
    async fn run_stops_when_shutdown_sender_is_dropped() {
        let store = Arc::new(InMemoryJobStore::new());
        let watchdog = watchdog(
            store,
            WatchdogConfig::default().with_poll_interval(Duration::from_secs(3600)),
        );
        let (tx, rx) = watch::channel(false);
        let handle = tokio::spawn(async move { watchdog.run(rx).await });
        drop(tx);

        let stopped = time::timeout(Duration::from_secs(2), handle).await;
        assert!(stopped.is_ok(), "watchdog kept running without a shutdown sender");
    }

    #[tokio::test]
    async fn sweep_pushes_canceled_result_to_callback() {
        let store = Arc::new(InMemoryJobStore::new());
        let job = claimed(&store).await;
        let notifier = Arc::new(RecordingNotifier::default());
        let watchdog = Watchdog::new(
            store.clone(),
            notifier.clone(),
            WatchdogConfig::default().with_stuck_after(Duration::ZERO),
        );

        assert_eq!(watchdog.sweep_once().await.unwrap(), 1);
        let sent = notifier.sent.lock().unwrap().clone();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].0, "http://cb/w");
        assert_eq!(sent[0].1.status, ResultStatus::Canceled);
        assert_eq!(sent[0].1.error.as_deref(), Some("auto-cancel: stuck >0m"));
        assert_eq!(sent[0].1.job_id.as_deref(), Some(job.job_id.as_str()));
    }

    #[tokio::test]
    async fn hanging_callback_is_bounded_by_timeout() {
        let store = Arc::new(InMemoryJobStore::new());
        claimed(&store).await;
        let watchdog = Watchdog::new(
            store,
            Arc::new(HangingNotifier),
            WatchdogConfig::default().with_callback_timeout(Duration::from_millis(20)),
        );

        let reset = time::timeout(Duration::from_secs(2), watchdog.reset_processing()).await;
        assert_eq!(reset.expect("reset should not hang").unwrap(), 1);
    }
}
