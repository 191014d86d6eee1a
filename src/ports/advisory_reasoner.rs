//! AdvisoryReasoner port - untrusted suggestions for the next action.
//!
//! The reasoner never fails outward. Every failure becomes
//! [`AdvisoryOutcome::NoDecision`] carrying the reason, and the engine falls
//! through to its own heuristics.

use std::time::Duration;

use async_trait::async_trait;
use serde_json::{Map, Value};
use thiserror::Error;

use super::ai_provider::AIError;
use crate::domain::intent::DecisionRequest;

/// What the advisory source suggested.
#[derive(Debug, Clone, PartialEq)]
pub enum AdvisoryProposal {
    Tool {
        tool_name: String,
        /// Free-text argument from a `RESULT:` line.
        argument: Option<String>,
        /// Structured arguments from a JSON reply.
        args: Map<String, Value>,
        reasoning: String,
    },
    Finish {
        final_text: String,
        reasoning: String,
    },
}

/// Result of consulting the advisory source.
#[derive(Debug, Clone, PartialEq)]
pub enum AdvisoryOutcome {
    Proposal(AdvisoryProposal),
    NoDecision(AdvisoryError),
}

impl AdvisoryOutcome {
    pub fn is_no_decision(&self) -> bool {
        matches!(self, AdvisoryOutcome::NoDecision(_))
    }
}

/// Failure categories of the advisory boundary.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum AdvisoryError {
    #[error("no advisory source configured")]
    NotConfigured,

    #[error("unsupported advisory provider '{0}'")]
    UnsupportedProvider(String),

    #[error("invalid credentials for provider '{0}'")]
    InvalidCredentials(String),

    #[error("circuit open for '{0}'")]
    CircuitOpen(String),

    #[error("advisory call timed out after {0:?}")]
    Timeout(Duration),

    #[error("provider error: {0}")]
    Provider(#[from] AIError),

    #[error("unparseable advisory reply: {0}")]
    Unparseable(String),
}

/// Port for the advisory reasoning source.
#[async_trait]
pub trait AdvisoryReasoner: Send + Sync {
    /// Asks for a proposal. Never blocks longer than the configured timeout.
    async fn propose(&self, request: &DecisionRequest) -> AdvisoryOutcome;
}
