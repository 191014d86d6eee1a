//! CancelDecisionHandler - sets a cancel marker for a job or correlation id.

use std::sync::Arc;

use tracing::info;

use crate::domain::foundation::DomainError;
use crate::domain::job::CancelTarget;
use crate::ports::JobStore;

pub const DEFAULT_CANCEL_REASON: &str = "canceled by request";

/// Command to cancel queued or in-flight decisions.
#[derive(Debug, Clone)]
pub struct CancelDecisionCommand {
    pub target: CancelTarget,
    pub reason: Option<String>,
}

impl CancelDecisionCommand {
    pub fn new(target: CancelTarget) -> Self {
        Self { target, reason: None }
    }

    pub fn with_reason(mut self, reason: impl Into<String>) -> Self {
        self.reason = Some(reason.into());
        self
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct CancelDecisionResult {
    pub target: CancelTarget,
    /// Non-terminal jobs the marker matched when it was set.
    pub matched: u64,
}

pub struct CancelDecisionHandler {
    store: Arc<dyn JobStore>,
}

impl CancelDecisionHandler {
    pub fn new(store: Arc<dyn JobStore>) -> Self {
        Self { store }
    }

    pub async fn handle(&self, cmd: CancelDecisionCommand) -> Result<CancelDecisionResult, DomainError> {
        let reason = cmd
            .reason
            .map(|r| r.trim().to_string())
            .filter(|r| !r.is_empty())
            .unwrap_or_else(|| DEFAULT_CANCEL_REASON.to_string());

        let matched = self.store.request_cancel(&cmd.target, &reason).await?;
        info!(target = %cmd.target, matched, reason = %reason, "Cancel requested");

        Ok(CancelDecisionResult {
            target: cmd.target,
            matched,
        })
    }
}
