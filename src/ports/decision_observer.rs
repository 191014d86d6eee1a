//! DecisionObserver port - fire-and-forget mirror of recorded outcomes.
//!
//! Observers run after the terminal write succeeds. They cannot fail the job
//! and must not block.

use crate::domain::job::{ClaimedJob, JobOutcome};

pub trait DecisionObserver: Send + Sync {
    fn on_recorded(&self, job: &ClaimedJob, outcome: &JobOutcome);
}

/// Observer that does nothing.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoOpDecisionObserver;

impl DecisionObserver for NoOpDecisionObserver {
    fn on_recorded(&self, _job: &ClaimedJob, _outcome: &JobOutcome) {}
}
