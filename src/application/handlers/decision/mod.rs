//! Decision handlers - submission, cancellation and status queries.

mod cancel_decision;
mod get_job_result;
mod get_queue_status;
mod submit_decision;

pub use cancel_decision::{
    CancelDecisionCommand, CancelDecisionHandler, CancelDecisionResult, DEFAULT_CANCEL_REASON,
};
pub use get_job_result::{GetJobResultHandler, JobResultView};
pub use get_queue_status::GetQueueStatusHandler;
pub use submit_decision::{SubmitDecisionCommand, SubmitDecisionHandler, SubmitDecisionResult};
