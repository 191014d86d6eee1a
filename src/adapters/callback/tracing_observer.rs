//! Decision observer that mirrors recorded outcomes into the log stream.

use tracing::info;

use crate::domain::job::{ClaimedJob, JobOutcome};
use crate::ports::DecisionObserver;

#[derive(Debug, Clone, Copy, Default)]
pub struct TracingDecisionObserver;

impl DecisionObserver for TracingDecisionObserver {
    fn on_recorded(&self, job: &ClaimedJob, outcome: &JobOutcome) {
        let result = &outcome.result;
        let latency_ms = crate::domain::foundation::Timestamp::now()
            .duration_since(&job.claimed_at)
            .num_milliseconds();
        info!(
            target: "intent_engine::decisions",
            job_id = %job.job_id,
            correlation_id = job.correlation_id.as_deref().unwrap_or(""),
            worker_id = %job.claimed_by,
            status = %outcome.status,
            intent_id = result.intent_id.as_deref().unwrap_or(""),
            tool = result.tool_name.as_deref().unwrap_or(""),
            finish = result.finish,
            latency_ms,
            "Decision recorded"
        );
    }
}
