//! Advisory prompt assembly.
//!
//! The system prompt briefs the model (persona, driver, instructions,
//! rules). The user turn carries the repository, goal, weighted history,
//! the tools it may name and the reply format the parser expects.

use serde_json::Value;

use crate::domain::intent::{weighted_summary, DecisionRequest, ToolPolicy};
use crate::ports::{CompletionRequest, MessageRole, RequestMetadata};

const BASE_SYSTEM_PROMPT: &str = "You choose the next action for an autonomous agent. \
Either call one tool to gather more information, or finish with a final answer.";

const OUTPUT_FORMAT: &str = "Reply with exactly these lines:\n\
ACTION: <tool name, or finish>\n\
RESULT: <the tool query, or the final answer when finishing>\n\
REASONING: <one short sentence>";

/// Max tokens requested from the provider; replies are a few lines.
pub const ADVISORY_MAX_TOKENS: u32 = 512;
pub const ADVISORY_TEMPERATURE: f32 = 0.2;

/// Builds the completion request for one decision.
pub fn build_completion(request: &DecisionRequest) -> CompletionRequest {
    CompletionRequest::new(RequestMetadata::new(
        request.session_id.clone(),
        request.correlation_id.clone(),
    ))
    .with_system_prompt(system_prompt(request))
    .with_message(MessageRole::User, user_prompt(request))
    .with_max_tokens(ADVISORY_MAX_TOKENS)
    .with_temperature(ADVISORY_TEMPERATURE)
}

pub fn system_prompt(request: &DecisionRequest) -> String {
    let ctx = &request.context;
    let mut sections = vec![BASE_SYSTEM_PROMPT.to_string()];

    if let Some(persona) = ctx
        .persona
        .as_ref()
        .and_then(|v| text_of(v, &["prompt_md", "summary", "text"]))
    {
        sections.push(format!("## Persona\n{}", persona));
    }
    if let Some(driver) = ctx.driver.as_ref().and_then(|v| text_of(v, &["prompt_md", "text"])) {
        sections.push(format!("## Driver\n{}", driver));
    }
    if let Some(instructions) = &ctx.instructions {
        sections.push(format!("## Instructions\n{}", instructions));
    }
    if let Some(rules) = ctx.rules.as_ref().and_then(rules_text) {
        sections.push(format!("## Rules\n{}", rules));
    }

    sections.join("\n\n")
}

pub fn user_prompt(request: &DecisionRequest) -> String {
    let mut sections = Vec::new();

    if let Some(repo) = repo_section(request) {
        sections.push(format!("## Repository\n{}", repo));
    }

    let goal = if request.goal.is_empty() {
        "(none)"
    } else {
        request.goal.as_str()
    };
    sections.push(format!("## Goal\n{}", goal));

    let history = weighted_summary(&request.history);
    if !history.is_empty() {
        sections.push(format!("## History\n{}", history));
    }

    sections.push(format!("## Tools available\n{}", tools_section(&request.tools)));
    sections.push(format!("## Output format\n{}", OUTPUT_FORMAT));

    sections.join("\n\n")
}

fn tools_section(tools: &ToolPolicy) -> String {
    match tools {
        ToolPolicy::Unrestricted => "Any tool you find appropriate.".to_string(),
        ToolPolicy::Disabled => "None. You must finish.".to_string(),
        ToolPolicy::Only(list) => list
            .iter()
            .map(|t| format!("- {}", t))
            .collect::<Vec<_>>()
            .join("\n"),
    }
}

fn repo_section(request: &DecisionRequest) -> Option<String> {
    let ctx = request.repo_context.as_ref()?;
    let name = request.repo_name();
    let path = ctx.get("path").and_then(Value::as_str);
    let branch = ctx.get("branch").and_then(Value::as_str);

    let mut parts = Vec::new();
    if let Some(name) = name {
        parts.push(name.to_string());
    }
    if let Some(path) = path {
        parts.push(format!("path: {}", path));
    }
    if let Some(branch) = branch {
        parts.push(format!("branch: {}", branch));
    }
    if parts.is_empty() {
        None
    } else {
        Some(parts.join(", "))
    }
}

/// Text of a string value, or the first non-blank string among `keys`.
fn text_of(value: &Value, keys: &[&str]) -> Option<String> {
    let text = match value {
        Value::String(s) => Some(s.as_str()),
        Value::Object(map) => keys
            .iter()
            .find_map(|k| map.get(*k).and_then(Value::as_str).filter(|s| !s.trim().is_empty())),
        _ => None,
    }?;
    let text = text.trim();
    (!text.is_empty()).then(|| text.to_string())
}

fn rules_text(value: &Value) -> Option<String> {
    match value {
        Value::Array(items) => {
            let lines: Vec<String> = items
                .iter()
                .filter_map(|item| text_of(item, &["text", "rule", "prompt_md"]))
                .map(|line| format!("- {}", line))
                .collect();
            (!lines.is_empty()).then(|| lines.join("\n"))
        }
        Value::Object(map) => match map.get("rules") {
            Some(inner @ Value::Array(_)) => rules_text(inner),
            _ => text_of(value, &["prompt_md", "text"]),
        },
        other => text_of(other, &[]),
    }
}
