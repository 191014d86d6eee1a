//! Intent engine: turns a decision request into exactly one decision.
//!
//! Precedence, highest first:
//!
//! 1. forced tool
//! 2. tools disabled (explicit empty allowlist)
//! 3. search budget spent: finish with the findings so far
//! 4. advisory proposal
//! 5. heuristic fallback when the advisory source gave no decision
//! 6. search arbitration for every search-class candidate
//! 7. numeric safety net on every finish
//!
//! An advisory finish outranks the heuristic "history already has search
//! results" rule; that rule only runs when the advisory source is silent.

use std::sync::Arc;

use serde_json::{Map, Value};
use tracing::{debug, info};

use super::arithmetic::{correct_final_answer, evaluate_goal};
use super::analyzer::extract_searches;
use super::classifier::{classify_goal, GoalClass};
use super::decision::{Decision, ARITHMETIC_CORRECTION_MARKER};
use super::request::DecisionRequest;
use super::selector::{select_next, SearchContext, SearchSelection};
use super::tools::is_search_tool;
use crate::ports::{AdvisoryOutcome, AdvisoryProposal, AdvisoryReasoner};

const FORCED_TOOL_REASONING: &str = "Forced tool was specified in the request.";
const EMPTY_GOAL_TEXT: &str = "No goal provided. Nothing to do right now.";

/// Action under consideration before arbitration.
#[derive(Debug)]
enum Candidate {
    /// Permitted non-search tool; passes straight through.
    Tool {
        tool_name: String,
        tool_args: Map<String, Value>,
        reasoning: String,
    },
    /// Needs the selector. Hints may be absent.
    Search {
        tool: Option<String>,
        query: Option<String>,
    },
    Finish {
        final_text: String,
        reasoning: String,
    },
}

/// Decides the next agent action.
pub struct IntentEngine {
    reasoner: Arc<dyn AdvisoryReasoner>,
}

impl IntentEngine {
    pub fn new(reasoner: Arc<dyn AdvisoryReasoner>) -> Self {
        Self { reasoner }
    }

    /// Always returns a structurally valid decision. The advisory call is the
    /// only suspension point.
    pub async fn decide(&self, request: &DecisionRequest) -> Decision {
        if let Some(tool) = &request.forced_tool {
            return forced_tool_call(tool, &request.goal);
        }

        if request.tools.is_disabled() {
            return tools_disabled_finish(&request.goal);
        }

        if extract_searches(&request.history).total() >= request.max_steps as usize {
            return arbitrate(request, None, None);
        }

        let candidate = match self.reasoner.propose(request).await {
            AdvisoryOutcome::Proposal(proposal) => adopt(request, proposal),
            AdvisoryOutcome::NoDecision(reason) => {
                debug!(
                    session_id = %request.session_id,
                    reason = %reason,
                    "No advisory decision, using heuristics"
                );
                heuristic(request)
            }
        };

        let decision = match candidate {
            Candidate::Tool {
                tool_name,
                tool_args,
                reasoning,
            } => Decision::tool_call(tool_name, tool_args, reasoning),
            Candidate::Search { tool, query } => arbitrate(request, tool.as_deref(), query.as_deref()),
            Candidate::Finish {
                final_text,
                reasoning,
            } => finish(request, final_text, reasoning),
        };

        info!(
            session_id = %request.session_id,
            intent_id = %decision.intent_id,
            finish = decision.is_finish(),
            tool = decision.tool_name().unwrap_or(""),
            "Decision made"
        );
        decision
    }
}

fn forced_tool_call(tool: &str, goal: &str) -> Decision {
    let mut args = Map::new();
    if !goal.is_empty() {
        args.insert("query".to_string(), Value::String(goal.to_string()));
    }
    Decision::tool_call(tool, args, FORCED_TOOL_REASONING)
}

fn tools_disabled_finish(goal: &str) -> Decision {
    match evaluate_goal(goal) {
        Some(result) => Decision::finish(
            result,
            "Tools are disabled for this request; evaluated the arithmetic in the goal.",
        ),
        None => Decision::finish(
            goal_echo(goal),
            "Tools are disabled for this request; answering directly.",
        ),
    }
}

fn adopt(request: &DecisionRequest, proposal: AdvisoryProposal) -> Candidate {
    match proposal {
        AdvisoryProposal::Finish {
            final_text,
            reasoning,
        } => {
            let final_text = if final_text.trim().is_empty() {
                goal_echo(&request.goal)
            } else {
                final_text
            };
            Candidate::Finish {
                final_text,
                reasoning: non_empty_or(reasoning, "Advisory source proposed finishing."),
            }
        }
        AdvisoryProposal::Tool {
            tool_name,
            argument,
            args,
            reasoning,
        } => {
            if is_search_tool(&tool_name) {
                let query = args
                    .get("query")
                    .or_else(|| args.get("q"))
                    .or_else(|| args.get("jql"))
                    .and_then(Value::as_str)
                    .map(str::to_string)
                    .or(argument);
                return Candidate::Search {
                    tool: Some(tool_name),
                    query,
                };
            }

            if !request.tools.permits(&tool_name) {
                debug!(
                    session_id = %request.session_id,
                    tool = %tool_name,
                    "Advisory tool not permitted, arbitrating instead"
                );
                return Candidate::Search {
                    tool: None,
                    query: None,
                };
            }

            let tool_args = if !args.is_empty() {
                args
            } else {
                let mut built = Map::new();
                if let Some(argument) = argument.filter(|a| !a.trim().is_empty()) {
                    built.insert("query".to_string(), Value::String(argument));
                }
                built
            };
            Candidate::Tool {
                tool_name,
                tool_args,
                reasoning: non_empty_or(reasoning, "Advisory source proposed this tool."),
            }
        }
    }
}

fn heuristic(request: &DecisionRequest) -> Candidate {
    let searches = extract_searches(&request.history);
    if searches.has_output() {
        return Candidate::Finish {
            final_text: format!("Based on previous search results:\n{}", searches.findings()),
            reasoning: "History already contains search results; finishing instead of searching again."
                .to_string(),
        };
    }

    match classify_goal(&request.goal) {
        GoalClass::Search | GoalClass::Analysis => Candidate::Search {
            tool: None,
            query: None,
        },
        GoalClass::Direct => Candidate::Finish {
            final_text: goal_echo(&request.goal),
            reasoning: "Goal can be answered directly without tools.".to_string(),
        },
    }
}

fn arbitrate(request: &DecisionRequest, tool: Option<&str>, query: Option<&str>) -> Decision {
    let ctx = SearchContext {
        goal: &request.goal,
        history: &request.history,
        suggested_tool: tool,
        suggested_query: query,
        repo: request.repo_name(),
        max_searches: request.max_steps,
        tools: &request.tools,
    };

    match select_next(&ctx) {
        SearchSelection::Search {
            tool_name,
            tool_args,
            reasoning,
            ..
        } => Decision::tool_call(tool_name, tool_args, reasoning),
        SearchSelection::Finish { summary, reason } => {
            debug!(session_id = %request.session_id, ?reason, "Search arbitration finished");
            finish(request, summary, format!("Search arbitration ended: {:?}.", reason))
        }
    }
}

/// Applies the numeric safety net before building a finish.
fn finish(request: &DecisionRequest, final_text: String, reasoning: String) -> Decision {
    match correct_final_answer(&request.goal, &final_text) {
        Some(corrected) => {
            debug!(
                session_id = %request.session_id,
                proposed = %final_text,
                corrected = %corrected,
                "Arithmetic answer corrected"
            );
            Decision::finish(corrected, format!("{} {}", ARITHMETIC_CORRECTION_MARKER, reasoning))
        }
        None => Decision::finish(final_text, reasoning),
    }
}

fn goal_echo(goal: &str) -> String {
    if goal.trim().is_empty() {
        EMPTY_GOAL_TEXT.to_string()
    } else {
        goal.to_string()
    }
}

fn non_empty_or(text: String, fallback: &str) -> String {
    if text.trim().is_empty() {
        fallback.to_string()
    } else {
        text
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::intent::{DecisionPayload, HistoryItem, TICKET_SEARCH_TOOL};
    use crate::ports::AdvisoryError;
    use async_trait::async_trait;
    use serde_json::json;
    use std::sync::Mutex;

    /// Replays one fixed outcome and counts calls.
    struct ScriptedReasoner {
        outcome: AdvisoryOutcome,
        calls: Mutex<u32>,
    }

    impl ScriptedReasoner {
        fn new(outcome: AdvisoryOutcome) -> Arc<Self> {
            Arc::new(Self {
                outcome,
                calls: Mutex::new(0),
            })
        }

        fn silent() -> Arc<Self> {
            Self::new(AdvisoryOutcome::NoDecision(AdvisoryError::NotConfigured))
        }

        fn calls(&self) -> u32 {
            *self.calls.lock().unwrap()
        }
    }

    #[async_trait]
    impl AdvisoryReasoner for ScriptedReasoner {
        async fn propose(&self, _request: &DecisionRequest) -> AdvisoryOutcome {
            *self.calls.lock().unwrap() += 1;
            self.outcome.clone()
        }
    }

    fn request(goal: &str) -> DecisionRequest {
        DecisionRequest::from_payload(DecisionPayload::new("s-1", goal)).unwrap()
    }

    fn tool_proposal(name: &str, argument: Option<&str>) -> AdvisoryOutcome {
        AdvisoryOutcome::Proposal(AdvisoryProposal::Tool {
            tool_name: name.to_string(),
            argument: argument.map(str::to_string),
            args: Map::new(),
            reasoning: "because".to_string(),
        })
    }

    fn finish_proposal(text: &str) -> AdvisoryOutcome {
        AdvisoryOutcome::Proposal(AdvisoryProposal::Finish {
            final_text: text.to_string(),
            reasoning: "done".to_string(),
        })
    }

    #[tokio::test]
    async fn forced_tool_bypasses_advisory() {
        let reasoner = ScriptedReasoner::new(finish_proposal("nope"));
        let engine = IntentEngine::new(reasoner.clone());
        let mut req = request("database schema");
        req.forced_tool = Some("context.fts_search".into());

        let decision = engine.decide(&req).await;
        assert_eq!(decision.tool_name(), Some("context.fts_search"));
        assert_eq!(decision.tool_args().unwrap()["query"], "database schema");
        assert_eq!(decision.reasoning, FORCED_TOOL_REASONING);
        assert_eq!(reasoner.calls(), 0);
    }

    #[tokio::test]
    async fn forced_tool_with_empty_goal_has_empty_args() {
        let engine = IntentEngine::new(ScriptedReasoner::silent());
        let mut req = request("");
        req.forced_tool = Some("shell.exec".into());
        assert!(engine.decide(&req).await.tool_args().unwrap().is_empty());
    }

    #[tokio::test]
    async fn disabled_tools_evaluate_arithmetic() {
        let engine = IntentEngine::new(ScriptedReasoner::new(tool_proposal("context.fts_search", None)));
        let mut req = request("What is 6 * 7?");
        req.tools = crate::domain::intent::ToolPolicy::Disabled;

        let decision = engine.decide(&req).await;
        assert!(decision.is_finish());
        assert_eq!(decision.final_text(), Some("42"));
        assert_eq!(decision.tool_name(), None);
    }

    #[tokio::test]
    async fn goal_echo_is_arithmetic_corrected() {
        let engine = IntentEngine::new(ScriptedReasoner::silent());
        let decision = engine.decide(&request("What is 12 + 30?")).await;
        assert_eq!(decision.final_text(), Some("42"));
        assert!(decision.reasoning.starts_with(ARITHMETIC_CORRECTION_MARKER));
    }

    #[tokio::test]
    async fn hallucinated_advisory_number_is_replaced() {
        let engine = IntentEngine::new(ScriptedReasoner::new(finish_proposal("41")));
        let decision = engine.decide(&request("What is 12 + 30?")).await;
        assert_eq!(decision.final_text(), Some("42"));
    }

    #[tokio::test]
    async fn advisory_prose_answer_is_kept() {
        let engine = IntentEngine::new(ScriptedReasoner::new(finish_proposal("It is 42.")));
        let decision = engine.decide(&request("What is 12 + 30?")).await;
        assert_eq!(decision.final_text(), Some("It is 42."));
        assert_eq!(decision.reasoning, "done");
    }

    #[tokio::test]
    async fn advisory_finish_outranks_existing_results() {
        let engine = IntentEngine::new(ScriptedReasoner::new(finish_proposal("Use the pool.")));
        let mut req = request("How are connections pooled?");
        req.history = vec![HistoryItem::tool(
            "context.fts_search",
            json!({"query": "pool"}),
            Some(json!("PgPool in db.rs")),
        )];
        assert_eq!(engine.decide(&req).await.final_text(), Some("Use the pool."));
    }

    #[tokio::test]
    async fn silent_advisory_with_results_finishes() {
        let engine = IntentEngine::new(ScriptedReasoner::silent());
        let mut req = request("Unrelated goal");
        req.history = vec![HistoryItem::tool(
            "context.fts_search",
            json!({"query": "pool"}),
            Some(json!({"content": [{"type": "text", "text": "PgPool in db.rs"}]})),
        )];

        let decision = engine.decide(&req).await;
        let text = decision.final_text().unwrap();
        assert!(text.starts_with("Based on previous search results"));
        assert!(text.contains("PgPool in db.rs"));
    }

    #[tokio::test]
    async fn advisory_search_is_arbitrated() {
        let engine = IntentEngine::new(ScriptedReasoner::new(tool_proposal(
            "context.memory_search",
            Some("retry budget"),
        )));
        let mut req = request("Where is retry handled?");
        req.history = vec![HistoryItem::tool(
            "context.memory_search",
            json!({"query": "Retry Budget"}),
            None,
        )];

        let decision = engine.decide(&req).await;
        assert_eq!(decision.tool_name(), Some("context.memory_search"));
        assert_eq!(decision.tool_args().unwrap()["query"], "Where is retry handled?");
    }

    #[tokio::test]
    async fn permitted_non_search_tool_passes_through() {
        let engine = IntentEngine::new(ScriptedReasoner::new(tool_proposal("shell.exec", Some("cargo tree"))));
        let decision = engine.decide(&request("List dependencies")).await;
        assert_eq!(decision.tool_name(), Some("shell.exec"));
        assert_eq!(decision.tool_args().unwrap()["query"], "cargo tree");
    }

    #[tokio::test]
    async fn unpermitted_tool_falls_to_selector() {
        let engine = IntentEngine::new(ScriptedReasoner::new(tool_proposal("shell.exec", None)));
        let mut req = request("Find open bugs");
        req.tools = crate::domain::intent::ToolPolicy::Only(vec![TICKET_SEARCH_TOOL.into()]);

        let decision = engine.decide(&req).await;
        assert_eq!(decision.tool_name(), Some(TICKET_SEARCH_TOOL));
        assert_eq!(decision.tool_args().unwrap()["jql"], "Find open bugs");
    }

    #[tokio::test]
    async fn analysis_goal_searches_for_context() {
        let engine = IntentEngine::new(ScriptedReasoner::silent());
        let mut req = request("Explain the worker architecture");
        req.repo_context = Some(json!({"repo": "acme/engine", "branch": "main"}));

        let decision = engine.decide(&req).await;
        assert_eq!(decision.tool_name(), Some("context.fts_search"));
        assert_eq!(decision.tool_args().unwrap()["repo"], "acme/engine");
    }

    #[tokio::test]
    async fn spent_search_budget_finishes_without_advisory() {
        let reasoner = ScriptedReasoner::new(tool_proposal("context.fts_search", Some("more")));
        let engine = IntentEngine::new(reasoner.clone());
        let mut req = request("Hello there");
        req.max_steps = 2;
        req.history = vec![
            HistoryItem::tool("context.fts_search", json!({"query": "a"}), None),
            HistoryItem::tool("context.memory_search", json!({"query": "b"}), None),
        ];

        let decision = engine.decide(&req).await;
        assert!(decision.final_text().unwrap().starts_with("Reached search limit (2)."));
        assert_eq!(reasoner.calls(), 0);
    }

    #[tokio::test]
    async fn date_in_goal_is_echoed_not_evaluated() {
        let engine = IntentEngine::new(ScriptedReasoner::silent());
        let goal = "Summarize the 2024-01-15 release notes";

        let decision = engine.decide(&request(goal)).await;
        assert_eq!(decision.final_text(), Some(goal));
        assert!(!decision.reasoning.starts_with(ARITHMETIC_CORRECTION_MARKER));

        let mut req = request(goal);
        req.tools = crate::domain::intent::ToolPolicy::Disabled;
        assert_eq!(engine.decide(&req).await.final_text(), Some(goal));
    }

    #[tokio::test]
    async fn numeric_range_goal_keeps_advisory_answer() {
        let engine = IntentEngine::new(ScriptedReasoner::new(finish_proposal("7")));
        let decision = engine.decide(&request("Pick a number in 1-10")).await;
        assert_eq!(decision.final_text(), Some("7"));
    }

    #[tokio::test]
    async fn empty_goal_finishes_with_placeholder() {
        let engine = IntentEngine::new(ScriptedReasoner::silent());
        let decision = engine.decide(&request("   ")).await;
        assert_eq!(decision.final_text(), Some(EMPTY_GOAL_TEXT));
    }
}
