//! Application layer - Commands, Queries, Handlers and background workers.
//!
//! Handlers orchestrate ports for one request each. The worker module runs
//! the long-lived claim loops and the stuck-job watchdog.

pub mod handlers;
pub mod worker;

pub use handlers::decision::{
    CancelDecisionCommand, CancelDecisionHandler, CancelDecisionResult, GetJobResultHandler,
    GetQueueStatusHandler, JobResultView, SubmitDecisionCommand, SubmitDecisionHandler,
    SubmitDecisionResult,
};
pub use worker::{JobProcessor, Watchdog, WorkerPool};
