//! ResultNotifier port - pushes a finished result to the caller's callback.
//!
//! Delivery happens after the job is already terminal. Failures are reported
//! to the caller for logging and are never retried.

use async_trait::async_trait;
use thiserror::Error;

use crate::domain::intent::DecisionResult;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum NotifyError {
    #[error("invalid callback url: {0}")]
    InvalidUrl(String),

    #[error("callback timed out")]
    Timeout,

    #[error("callback transport error: {0}")]
    Transport(String),

    #[error("callback rejected with status {0}")]
    Rejected(u16),
}

/// Port for callback delivery.
#[async_trait]
pub trait ResultNotifier: Send + Sync {
    async fn notify(&self, url: &str, result: &DecisionResult) -> Result<(), NotifyError>;
}
