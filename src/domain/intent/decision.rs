//! The engine's output and its wire representation.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::domain::foundation::{IntentId, JobId};

/// Marker prepended to reasoning when the numeric safety net rewrote an answer.
pub const ARITHMETIC_CORRECTION_MARKER: &str = "[arithmetic corrected]";

/// Exactly one of: call a tool, or finish.
#[derive(Debug, Clone, PartialEq)]
pub enum DecisionAction {
    ToolCall {
        tool_name: String,
        tool_args: Map<String, Value>,
    },
    Finish {
        final_text: String,
    },
}

/// One decision about the agent's next step.
#[derive(Debug, Clone, PartialEq)]
pub struct Decision {
    pub intent_id: IntentId,
    pub action: DecisionAction,
    pub reasoning: String,
}

impl Decision {
    pub fn tool_call(
        tool_name: impl Into<String>,
        tool_args: Map<String, Value>,
        reasoning: impl Into<String>,
    ) -> Self {
        Self {
            intent_id: IntentId::new(),
            action: DecisionAction::ToolCall {
                tool_name: tool_name.into(),
                tool_args,
            },
            reasoning: reasoning.into(),
        }
    }

    pub fn finish(final_text: impl Into<String>, reasoning: impl Into<String>) -> Self {
        Self {
            intent_id: IntentId::new(),
            action: DecisionAction::Finish {
                final_text: final_text.into(),
            },
            reasoning: reasoning.into(),
        }
    }

    pub fn is_finish(&self) -> bool {
        matches!(self.action, DecisionAction::Finish { .. })
    }

    pub fn tool_name(&self) -> Option<&str> {
        match &self.action {
            DecisionAction::ToolCall { tool_name, .. } => Some(tool_name),
            DecisionAction::Finish { .. } => None,
        }
    }

    pub fn tool_args(&self) -> Option<&Map<String, Value>> {
        match &self.action {
            DecisionAction::ToolCall { tool_args, .. } => Some(tool_args),
            DecisionAction::Finish { .. } => None,
        }
    }

    pub fn final_text(&self) -> Option<&str> {
        match &self.action {
            DecisionAction::Finish { final_text } => Some(final_text),
            DecisionAction::ToolCall { .. } => None,
        }
    }
}

/// Status carried by every delivered result.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResultStatus {
    Ok,
    Error,
    Canceled,
}

/// Result payload written to the poll slot and pushed to callbacks.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DecisionResult {
    pub status: ResultStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub job_id: Option<String>,
    #[serde(default)]
    pub intent_id: Option<String>,
    #[serde(default)]
    pub tool_name: Option<String>,
    #[serde(default)]
    pub tool_args: Option<Map<String, Value>>,
    #[serde(default)]
    pub reasoning: Option<String>,
    #[serde(default)]
    pub finish: bool,
    #[serde(default)]
    pub final_text: Option<String>,
    #[serde(default)]
    pub trace: Vec<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl DecisionResult {
    pub fn from_decision(decision: &Decision) -> Self {
        Self {
            status: ResultStatus::Ok,
            job_id: None,
            intent_id: Some(decision.intent_id.to_string()),
            tool_name: decision.tool_name().map(str::to_string),
            tool_args: decision.tool_args().cloned(),
            reasoning: Some(decision.reasoning.clone()),
            finish: decision.is_finish(),
            final_text: decision.final_text().map(str::to_string),
            trace: Vec::new(),
            error: None,
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self::marker(ResultStatus::Error, message.into())
    }

    pub fn canceled(reason: impl Into<String>) -> Self {
        Self::marker(ResultStatus::Canceled, reason.into())
    }

    fn marker(status: ResultStatus, message: String) -> Self {
        Self {
            status,
            job_id: None,
            intent_id: None,
            tool_name: None,
            tool_args: None,
            reasoning: None,
            finish: false,
            final_text: None,
            trace: Vec::new(),
            error: Some(message),
        }
    }

    pub fn with_job_id(mut self, job_id: &JobId) -> Self {
        self.job_id = Some(job_id.to_string());
        self
    }

    pub fn is_ok(&self) -> bool {
        self.status == ResultStatus::Ok
    }
}
