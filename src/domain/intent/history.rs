//! Action history as received on the wire and in its canonical form.
//!
//! Callers send history steps in one of two shapes:
//!
//! - nested: `{"index": 0, "action": {"action": "tool", "tool_name": "...", "args": {...}}, "output": ...}`
//! - flat: `{"action": "tool", "tool_name": "...", "args": {...}, "output": ...}`
//!
//! [`RawHistoryItem`] accepts both and is converted once, at ingestion, into
//! [`HistoryItem`]. Nothing past that boundary sees the wire shapes.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Upper bound on excerpt length, in characters.
pub const EXCERPT_LIMIT: usize = 200;

/// The action object of a nested history step.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NestedAction {
    #[serde(default)]
    pub action: Option<String>,
    #[serde(default)]
    pub tool_name: Option<String>,
    #[serde(default)]
    pub args: Option<Value>,
    #[serde(default, rename = "final")]
    pub final_text: Option<String>,
    #[serde(default)]
    pub reasoning: Option<String>,
}

/// One history step in either accepted wire shape.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RawHistoryItem {
    Nested {
        action: NestedAction,
        #[serde(default)]
        output: Option<Value>,
        #[serde(default)]
        index: Option<Value>,
    },
    Flat {
        #[serde(default)]
        action: Option<String>,
        #[serde(default)]
        tool_name: Option<String>,
        #[serde(default)]
        args: Option<Value>,
        #[serde(default)]
        tool_args: Option<Value>,
        #[serde(default)]
        output: Option<Value>,
    },
}

/// What a past step did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ActionKind {
    Tool,
    Finish,
    Other(String),
}

impl ActionKind {
    fn parse(raw: Option<&str>) -> Self {
        match raw.map(|s| s.trim().to_lowercase()) {
            Some(kind) if kind == "tool" => ActionKind::Tool,
            Some(kind) if kind == "finish" => ActionKind::Finish,
            Some(kind) if !kind.is_empty() => ActionKind::Other(kind),
            _ => ActionKind::Other("unknown".to_string()),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            ActionKind::Tool => "tool",
            ActionKind::Finish => "finish",
            ActionKind::Other(kind) => kind,
        }
    }
}

/// Canonical history step. Read-only inside the engine.
#[derive(Debug, Clone, PartialEq)]
pub struct HistoryItem {
    pub kind: ActionKind,
    pub tool_name: Option<String>,
    pub args: Map<String, Value>,
    pub output: Option<Value>,
}

impl HistoryItem {
    /// Builds a tool step, mostly for tests and fixtures.
    pub fn tool(name: impl Into<String>, args: Value, output: Option<Value>) -> Self {
        Self {
            kind: ActionKind::Tool,
            tool_name: Some(name.into()),
            args: into_object(Some(args)),
            output,
        }
    }

    pub fn is_tool(&self) -> bool {
        self.kind == ActionKind::Tool
    }

    /// The query argument of a search step: `query`, then `q`, then `jql`.
    pub fn query(&self) -> Option<&str> {
        ["query", "q", "jql"]
            .iter()
            .find_map(|key| self.args.get(*key).and_then(Value::as_str))
    }

    /// Flattened, whitespace-collapsed excerpt of the output, if any.
    pub fn output_excerpt(&self) -> Option<String> {
        let text = self.output.as_ref().and_then(flatten_output)?;
        let collapsed = text.split_whitespace().collect::<Vec<_>>().join(" ");
        if collapsed.is_empty() {
            return None;
        }
        Some(truncate_chars(&collapsed, EXCERPT_LIMIT))
    }

    pub fn has_output(&self) -> bool {
        self.output_excerpt().is_some()
    }
}

impl From<RawHistoryItem> for HistoryItem {
    fn from(raw: RawHistoryItem) -> Self {
        match raw {
            RawHistoryItem::Nested { action, output, .. } => Self {
                kind: ActionKind::parse(action.action.as_deref()),
                tool_name: clean_name(action.tool_name),
                args: into_object(action.args),
                output,
            },
            RawHistoryItem::Flat {
                action,
                tool_name,
                args,
                tool_args,
                output,
            } => Self {
                kind: ActionKind::parse(action.as_deref()),
                tool_name: clean_name(tool_name),
                args: into_object(args.or(tool_args)),
                output,
            },
        }
    }
}

/// Converts a whole wire history, oldest first.
pub fn normalize_history(raw: Vec<RawHistoryItem>) -> Vec<HistoryItem> {
    raw.into_iter().map(HistoryItem::from).collect()
}

fn clean_name(name: Option<String>) -> Option<String> {
    name.map(|n| n.trim().to_string()).filter(|n| !n.is_empty())
}

fn into_object(value: Option<Value>) -> Map<String, Value> {
    match value {
        Some(Value::Object(map)) => map,
        _ => Map::new(),
    }
}

/// First structured content element if present, else a scalar or `result` field.
fn flatten_output(output: &Value) -> Option<String> {
    match output {
        Value::Null => None,
        Value::String(s) => Some(s.clone()),
        Value::Bool(_) | Value::Number(_) => Some(output.to_string()),
        Value::Array(items) => items.first().and_then(flatten_output),
        Value::Object(map) => {
            if let Some(first) = map.get("content").and_then(Value::as_array).and_then(|c| c.first()) {
                return match first.get("text") {
                    Some(text) => flatten_output(text),
                    None => flatten_output(first),
                };
            }
            for key in ["result", "text", "output"] {
                if let Some(value) = map.get(key) {
                    return flatten_output(value);
                }
            }
            if map.is_empty() {
                None
            } else {
                Some(output.to_string())
            }
        }
    }
}

fn truncate_chars(text: &str, limit: usize) -> String {
    match text.char_indices().nth(limit) {
        Some((cut, _)) => text[..cut].to_string(),
        None => text.to_string(),
    }
}
