//! Callback push shared by the processor and the watchdog.

use std::time::Duration;

use tracing::{debug, warn};

use crate::domain::intent::DecisionResult;
use crate::domain::job::ClaimedJob;
use crate::ports::{NotifyError, ResultNotifier};

/// Pushes `result` to the job's callback, if it has one. Failures are logged
/// and dropped.
pub(crate) async fn deliver_callback(
    notifier: &dyn ResultNotifier,
    timeout: Duration,
    job: &ClaimedJob,
    result: &DecisionResult,
) {
    let Some(url) = job.callback_url.as_deref() else {
        return;
    };

    let sent = tokio::time::timeout(timeout, notifier.notify(url, result))
        .await
        .unwrap_or(Err(NotifyError::Timeout));

    match sent {
        Ok(()) => debug!(job_id = %job.job_id, "Callback delivered"),
        Err(err) => warn!(job_id = %job.job_id, url, error = %err, "Callback delivery failed"),
    }
}
