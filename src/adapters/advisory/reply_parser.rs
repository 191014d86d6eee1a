//! Parses advisory replies into proposals.
//!
//! Two shapes are accepted. The line format:
//!
//! ```text
//! ACTION: context.fts_search
//! RESULT: config loader
//! REASONING: Need to locate the loader first.
//! ```
//!
//! and, as a fallback, a JSON object (fenced ```json block or the first
//! balanced `{...}` in the text) with `action`, `tool_name`/`tool`, `args`,
//! `final` and `reasoning`.

use serde_json::{Map, Value};

use crate::ports::{AdvisoryError, AdvisoryProposal};

const FINISH_ACTIONS: [&str; 4] = ["finish", "final", "done", "answer"];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Label {
    Action,
    Result,
    Reasoning,
}

fn split_label(line: &str) -> Option<(Label, &str)> {
    let (head, rest) = line.split_once(':')?;
    let label = match head.trim().to_ascii_uppercase().as_str() {
        "ACTION" => Label::Action,
        "RESULT" => Label::Result,
        "REASONING" => Label::Reasoning,
        _ => return None,
    };
    Some((label, rest.trim()))
}

fn is_finish_action(action: &str) -> bool {
    FINISH_ACTIONS.iter().any(|f| action.eq_ignore_ascii_case(f))
}

/// Parses a raw reply. `Unparseable` when neither shape yields an action.
pub fn parse_reply(reply: &str) -> Result<AdvisoryProposal, AdvisoryError> {
    if let Some(proposal) = parse_lines(reply) {
        return Ok(proposal);
    }
    if let Some(proposal) = extract_json(reply).as_ref().and_then(parse_json) {
        return Ok(proposal);
    }

    let preview: String = reply.chars().take(80).collect();
    Err(AdvisoryError::Unparseable(preview))
}

fn parse_lines(reply: &str) -> Option<AdvisoryProposal> {
    let mut action: Option<String> = None;
    let mut result: Vec<&str> = Vec::new();
    let mut reasoning: Vec<&str> = Vec::new();
    let mut current: Option<Label> = None;

    for line in reply.lines() {
        match split_label(line) {
            Some((Label::Action, value)) => {
                action = Some(value.trim_matches('`').to_string());
                current = Some(Label::Action);
            }
            Some((Label::Result, value)) => {
                result.push(value);
                current = Some(Label::Result);
            }
            Some((Label::Reasoning, value)) => {
                reasoning.push(value);
                current = Some(Label::Reasoning);
            }
            None => match current {
                Some(Label::Result) => result.push(line),
                Some(Label::Reasoning) => reasoning.push(line.trim()),
                _ => {}
            },
        }
    }

    let action = action.filter(|a| !a.is_empty())?;
    let result = result.join("\n").trim().to_string();
    let reasoning = reasoning.join(" ").trim().to_string();

    if is_finish_action(&action) {
        return Some(AdvisoryProposal::Finish {
            final_text: result,
            reasoning,
        });
    }

    Some(AdvisoryProposal::Tool {
        tool_name: action,
        argument: (!result.is_empty()).then_some(result),
        args: Map::new(),
        reasoning,
    })
}

/// Fenced ```json block first, then the first balanced object.
fn extract_json(reply: &str) -> Option<Value> {
    if let Some(start) = reply.find("```json") {
        let body = &reply[start + "```json".len()..];
        if let Some(end) = body.find("```") {
            if let Ok(value) = serde_json::from_str::<Value>(body[..end].trim()) {
                return Some(value);
            }
        }
    }

    let candidate = first_balanced_object(reply)?;
    serde_json::from_str(candidate).ok()
}

fn first_balanced_object(text: &str) -> Option<&str> {
    let start = text.find('{')?;
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;

    for (offset, ch) in text[start..].char_indices() {
        if in_string {
            match ch {
                _ if escaped => escaped = false,
                '\\' => escaped = true,
                '"' => in_string = false,
                _ => {}
            }
            continue;
        }
        match ch {
            '"' => in_string = true,
            '{' => depth += 1,
            '}' => {
                depth -= 1;
                if depth == 0 {
                    return Some(&text[start..start + offset + 1]);
                }
            }
            _ => {}
        }
    }
    None
}

fn parse_json(value: &Value) -> Option<AdvisoryProposal> {
    let obj = value.as_object()?;
    let text = |key: &str| {
        obj.get(key)
            .and_then(Value::as_str)
            .map(str::trim)
            .filter(|s| !s.is_empty())
    };

    let reasoning = text("reasoning").unwrap_or_default().to_string();
    let action = text("action");
    let tool = text("tool_name").or_else(|| text("tool"));
    let final_text = obj.get("final").map(|v| match v {
        Value::String(s) => s.trim().to_string(),
        other => other.to_string(),
    });

    let wants_finish = action.map(is_finish_action).unwrap_or(false)
        || (tool.is_none() && final_text.is_some());
    if wants_finish {
        return Some(AdvisoryProposal::Finish {
            final_text: final_text.unwrap_or_default(),
            reasoning,
        });
    }

    // `action` may itself name the tool.
    let tool_name = tool.or(action.filter(|a| !a.eq_ignore_ascii_case("tool")))?;
    let args = obj
        .get("args")
        .and_then(Value::as_object)
        .cloned()
        .unwrap_or_default();

    Some(AdvisoryProposal::Tool {
        tool_name: tool_name.to_string(),
        argument: None,
        args,
        reasoning,
    })
}
