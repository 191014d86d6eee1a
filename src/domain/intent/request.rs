//! Decision request: the submission payload and its validated form.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

use super::history::{normalize_history, HistoryItem, RawHistoryItem};
use crate::domain::foundation::ValidationError;

/// Default search budget when `max_steps` is absent.
pub const DEFAULT_MAX_STEPS: u32 = 4;

const MAX_STEPS_LIMIT: u32 = 64;

/// Which advisory source to consult. Opaque to the engine.
#[derive(Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AdvisoryConfig {
    #[serde(default)]
    pub provider: Option<String>,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default, alias = "api_key")]
    pub credential: Option<String>,
    #[serde(default)]
    pub base_url: Option<String>,
}

impl fmt::Debug for AdvisoryConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AdvisoryConfig")
            .field("provider", &self.provider)
            .field("model", &self.model)
            .field("credential", &self.credential.as_ref().map(|_| "[REDACTED]"))
            .field("base_url", &self.base_url)
            .finish()
    }
}

/// Submission payload exactly as producers send it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DecisionPayload {
    pub session_id: String,
    pub goal_text: String,
    #[serde(default)]
    pub persona: Option<Value>,
    #[serde(default)]
    pub driver: Option<Value>,
    #[serde(default)]
    pub rules: Option<Value>,
    #[serde(default)]
    pub instructions: Option<String>,
    #[serde(default, alias = "llm")]
    pub advisory_config: Option<AdvisoryConfig>,
    #[serde(default)]
    pub repo_context: Option<Value>,
    #[serde(default)]
    pub history: Option<Vec<RawHistoryItem>>,
    #[serde(default)]
    pub tools_available: Option<Vec<String>>,
    #[serde(default)]
    pub forced_tool: Option<String>,
    #[serde(default)]
    pub max_steps: Option<u32>,
    #[serde(default)]
    pub correlation_id: Option<String>,
    #[serde(default)]
    pub callback_url: Option<String>,
}

impl DecisionPayload {
    /// Minimal payload with everything optional left out.
    pub fn new(session_id: impl Into<String>, goal_text: impl Into<String>) -> Self {
        Self {
            session_id: session_id.into(),
            goal_text: goal_text.into(),
            persona: None,
            driver: None,
            rules: None,
            instructions: None,
            advisory_config: None,
            repo_context: None,
            history: None,
            tools_available: None,
            forced_tool: None,
            max_steps: None,
            correlation_id: None,
            callback_url: None,
        }
    }
}

/// Which tools a request allows.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ToolPolicy {
    /// No allowlist supplied.
    Unrestricted,
    /// Explicit empty allowlist.
    Disabled,
    /// Exactly these tools, in declared order.
    Only(Vec<String>),
}

impl ToolPolicy {
    pub fn from_allowlist(allowlist: Option<Vec<String>>) -> Self {
        match allowlist {
            None => ToolPolicy::Unrestricted,
            Some(tools) => {
                let mut cleaned: Vec<String> = Vec::with_capacity(tools.len());
                for tool in tools {
                    let tool = tool.trim().to_string();
                    if !tool.is_empty() && !cleaned.contains(&tool) {
                        cleaned.push(tool);
                    }
                }
                if cleaned.is_empty() {
                    ToolPolicy::Disabled
                } else {
                    ToolPolicy::Only(cleaned)
                }
            }
        }
    }

    pub fn is_disabled(&self) -> bool {
        matches!(self, ToolPolicy::Disabled)
    }

    pub fn permits(&self, tool: &str) -> bool {
        match self {
            ToolPolicy::Unrestricted => true,
            ToolPolicy::Disabled => false,
            ToolPolicy::Only(tools) => tools.iter().any(|t| t == tool),
        }
    }

    pub fn allowlist(&self) -> Option<&[String]> {
        match self {
            ToolPolicy::Unrestricted => None,
            ToolPolicy::Disabled => Some(&[]),
            ToolPolicy::Only(tools) => Some(tools),
        }
    }
}

/// Caller-supplied context used only to brief the advisory source.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PromptContext {
    pub persona: Option<Value>,
    pub driver: Option<Value>,
    pub rules: Option<Value>,
    pub instructions: Option<String>,
}

/// A validated decision request. Immutable once built.
#[derive(Debug, Clone)]
pub struct DecisionRequest {
    pub session_id: String,
    pub goal: String,
    pub forced_tool: Option<String>,
    pub tools: ToolPolicy,
    pub history: Vec<HistoryItem>,
    pub context: PromptContext,
    pub repo_context: Option<Value>,
    pub advisory: Option<AdvisoryConfig>,
    pub max_steps: u32,
    pub correlation_id: Option<String>,
    pub callback_url: Option<String>,
}

impl DecisionRequest {
    /// Validates a payload and normalizes its history.
    pub fn from_payload(payload: DecisionPayload) -> Result<Self, ValidationError> {
        let session_id = payload.session_id.trim().to_string();
        if session_id.is_empty() {
            return Err(ValidationError::empty_field("session_id"));
        }

        let max_steps = payload.max_steps.unwrap_or(DEFAULT_MAX_STEPS);
        if max_steps > MAX_STEPS_LIMIT {
            return Err(ValidationError::out_of_range(
                "max_steps",
                0,
                MAX_STEPS_LIMIT as i64,
                max_steps as i64,
            ));
        }

        let callback_url = non_blank(payload.callback_url);
        if let Some(url) = &callback_url {
            if !url.starts_with("http://") && !url.starts_with("https://") {
                return Err(ValidationError::invalid_format(
                    "callback_url",
                    "must be an http or https URL",
                ));
            }
        }

        Ok(Self {
            session_id,
            goal: payload.goal_text.trim().to_string(),
            forced_tool: non_blank(payload.forced_tool),
            tools: ToolPolicy::from_allowlist(payload.tools_available),
            history: normalize_history(payload.history.unwrap_or_default()),
            context: PromptContext {
                persona: payload.persona,
                driver: payload.driver,
                rules: payload.rules,
                instructions: non_blank(payload.instructions),
            },
            repo_context: payload.repo_context,
            advisory: payload.advisory_config,
            max_steps,
            correlation_id: non_blank(payload.correlation_id),
            callback_url,
        })
    }

    /// Parses and validates a raw JSON payload.
    pub fn from_value(value: Value) -> Result<Self, ValidationError> {
        let payload: DecisionPayload = serde_json::from_value(value)
            .map_err(|e| ValidationError::invalid_format("payload", e.to_string()))?;
        Self::from_payload(payload)
    }

    /// Repository name from `repo_context`: its `repo` field, else `name`, or the value itself.
    pub fn repo_name(&self) -> Option<&str> {
        match self.repo_context.as_ref()? {
            Value::String(s) if !s.trim().is_empty() => Some(s.trim()),
            Value::Object(map) => ["repo", "name"]
                .iter()
                .find_map(|key| map.get(*key).and_then(Value::as_str))
                .map(str::trim)
                .filter(|s| !s.is_empty()),
            _ => None,
        }
    }
}

fn non_blank(value: Option<String>) -> Option<String> {
    value.map(|v| v.trim().to_string()).filter(|v| !v.is_empty())
}
