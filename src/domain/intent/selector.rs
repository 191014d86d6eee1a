//! Deterministic choice of the next unexplored `(tool, query)` search pair.
//!
//! Candidate tools are tried in order (advisory suggestion, then the allowlist
//! or defaults), and for each tool the candidate queries in order (advisory
//! suggestion, raw goal, keyword variant). The first pair absent from the
//! tried-set wins. Identical input always yields the identical pair.

use serde_json::{Map, Value};

use super::analyzer::{extract_searches, SearchHistory};
use super::history::HistoryItem;
use super::normalizer::{keyword_variant, normalize};
use super::request::ToolPolicy;
use super::tools::{
    mentions_tickets, query_key, CONTEXT_SEARCH_TOOL, MEMORY_SEARCH_TOOL, TICKET_SEARCH_TOOL,
};

/// Inputs for one selection.
#[derive(Debug, Clone, Copy)]
pub struct SearchContext<'a> {
    pub goal: &'a str,
    pub history: &'a [HistoryItem],
    pub suggested_tool: Option<&'a str>,
    pub suggested_query: Option<&'a str>,
    pub repo: Option<&'a str>,
    pub max_searches: u32,
    pub tools: &'a ToolPolicy,
}

/// Why the selector declined to search.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Exhaustion {
    BudgetReached,
    NoTools,
    CombinationsExhausted,
}

#[derive(Debug, Clone, PartialEq)]
pub enum SearchSelection {
    Search {
        tool_name: String,
        tool_args: Map<String, Value>,
        query: String,
        reasoning: String,
    },
    Finish {
        summary: String,
        reason: Exhaustion,
    },
}

impl SearchSelection {
    pub fn is_search(&self) -> bool {
        matches!(self, SearchSelection::Search { .. })
    }
}

/// Picks the next search action or explains why there is none.
pub fn select_next(ctx: &SearchContext<'_>) -> SearchSelection {
    let searches = extract_searches(ctx.history);

    if searches.total() >= ctx.max_searches as usize {
        return SearchSelection::Finish {
            summary: format!(
                "Reached search limit ({}).\n{}",
                ctx.max_searches,
                searches.findings()
            ),
            reason: Exhaustion::BudgetReached,
        };
    }

    let tools = candidate_tools(ctx);
    if tools.is_empty() {
        return SearchSelection::Finish {
            summary: "No tools available.".to_string(),
            reason: Exhaustion::NoTools,
        };
    }

    let queries = candidate_queries(ctx);
    for tool in &tools {
        for query in &queries {
            if searches.has_tried(tool, &normalize(query)) {
                continue;
            }
            return SearchSelection::Search {
                tool_name: tool.clone(),
                tool_args: search_args(tool, query, ctx.repo),
                query: query.clone(),
                reasoning: reasoning_for(tool, query, &searches, ctx.max_searches),
            };
        }
    }

    SearchSelection::Finish {
        summary: format!("No new search combinations left.\n{}", searches.findings()),
        reason: Exhaustion::CombinationsExhausted,
    }
}

fn candidate_tools(ctx: &SearchContext<'_>) -> Vec<String> {
    let suggested = ctx
        .suggested_tool
        .map(str::trim)
        .filter(|t| !t.is_empty() && ctx.tools.permits(t));

    let base: Vec<String> = match ctx.tools.allowlist() {
        Some(allowed) => allowed.to_vec(),
        None => {
            let mut defaults = vec![CONTEXT_SEARCH_TOOL.to_string(), MEMORY_SEARCH_TOOL.to_string()];
            if mentions_tickets(ctx.goal) {
                defaults.push(TICKET_SEARCH_TOOL.to_string());
            }
            defaults
        }
    };

    let mut tools = Vec::with_capacity(base.len() + 1);
    if let Some(tool) = suggested {
        tools.push(tool.to_string());
    }
    for tool in base {
        if !tools.contains(&tool) {
            tools.push(tool);
        }
    }
    tools
}

fn candidate_queries(ctx: &SearchContext<'_>) -> Vec<String> {
    let mut queries: Vec<String> = Vec::with_capacity(3);
    let mut seen: Vec<String> = Vec::with_capacity(3);

    let candidates = [
        ctx.suggested_query.map(|q| q.trim().to_string()),
        Some(ctx.goal.trim().to_string()),
        Some(keyword_variant(ctx.goal)),
    ];
    for candidate in candidates.into_iter().flatten() {
        let normalized = normalize(&candidate);
        if normalized.is_empty() || seen.contains(&normalized) {
            continue;
        }
        seen.push(normalized);
        queries.push(candidate);
    }
    queries
}

fn search_args(tool: &str, query: &str, repo: Option<&str>) -> Map<String, Value> {
    let mut args = Map::new();
    args.insert(query_key(tool).to_string(), Value::String(query.to_string()));
    if let Some(repo) = repo {
        args.insert("repo".to_string(), Value::String(repo.to_string()));
    }
    args
}

fn reasoning_for(tool: &str, query: &str, searches: &SearchHistory, max: u32) -> String {
    format!(
        "Searching {} for \"{}\" (search {} of {}); this combination has not been tried yet.",
        tool,
        query,
        searches.total() + 1,
        max
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use serde_json::json;

    fn search(tool: &str, query: &str) -> HistoryItem {
        HistoryItem::tool(tool, json!({ "query": query }), Some(json!("hit")))
    }

    fn ctx<'a>(goal: &'a str, history: &'a [HistoryItem], tools: &'a ToolPolicy) -> SearchContext<'a> {
        SearchContext {
            goal,
            history,
            suggested_tool: None,
            suggested_query: None,
            repo: None,
            max_searches: 4,
            tools,
        }
    }

    #[test]
    fn first_pick_is_context_search_with_goal() {
        let policy = ToolPolicy::Unrestricted;
        let selection = select_next(&ctx("Where is the retry logic?", &[], &policy));
        match selection {
            SearchSelection::Search { tool_name, tool_args, .. } => {
                assert_eq!(tool_name, CONTEXT_SEARCH_TOOL);
                assert_eq!(tool_args["query"], "Where is the retry logic?");
            }
            other => panic!("expected search, got {:?}", other),
        }
    }

    #[test]
    fn tried_goal_moves_to_keyword_variant() {
        let policy = ToolPolicy::Unrestricted;
        let history = vec![search(CONTEXT_SEARCH_TOOL, "where is the RETRY logic?")];
        let selection = select_next(&ctx("Where is the retry logic?", &history, &policy));
        match selection {
            SearchSelection::Search { tool_name, query, .. } => {
                assert_eq!(tool_name, CONTEXT_SEARCH_TOOL);
                assert_eq!(query, "retry logic");
            }
            other => panic!("expected search, got {:?}", other),
        }
    }

    #[test]
    fn advisory_hints_outrank_goal() {
        let policy = ToolPolicy::Unrestricted;
        let mut c = ctx("Where is the retry logic?", &[], &policy);
        c.suggested_tool = Some(MEMORY_SEARCH_TOOL);
        c.suggested_query = Some("backoff policy");
        c.repo = Some("acme/core");
        match select_next(&c) {
            SearchSelection::Search { tool_name, tool_args, .. } => {
                assert_eq!(tool_name, MEMORY_SEARCH_TOOL);
                assert_eq!(tool_args["query"], "backoff policy");
                assert_eq!(tool_args["repo"], "acme/core");
            }
            other => panic!("expected search, got {:?}", other),
        }
    }

    #[test]
    fn ticket_goal_adds_jira_with_jql() {
        let policy = ToolPolicy::Unrestricted;
        let goal = "Find the open login bugs";
        let mut history = vec![
            search(CONTEXT_SEARCH_TOOL, goal),
            search(CONTEXT_SEARCH_TOOL, "open login bugs"),
            search(MEMORY_SEARCH_TOOL, goal),
        ];

        let mut c = ctx(goal, &history, &policy);
        c.max_searches = 10;
        match select_next(&c) {
            SearchSelection::Search { tool_name, tool_args, .. } => {
                assert_eq!(tool_name, MEMORY_SEARCH_TOOL);
                assert_eq!(tool_args["query"], "open login bugs");
            }
            other => panic!("expected search, got {:?}", other),
        }

        history.push(search(MEMORY_SEARCH_TOOL, "open login bugs"));
        let mut c = ctx(goal, &history, &policy);
        c.max_searches = 10;
        match select_next(&c) {
            SearchSelection::Search { tool_name, tool_args, .. } => {
                assert_eq!(tool_name, TICKET_SEARCH_TOOL);
                assert_eq!(tool_args["jql"], goal);
                assert!(tool_args.get("query").is_none());
            }
            other => panic!("expected search, got {:?}", other),
        }
    }

    #[test]
    fn budget_reached_finishes_with_summary() {
        let policy = ToolPolicy::Unrestricted;
        let history: Vec<HistoryItem> = (0..4).map(|i| search(CONTEXT_SEARCH_TOOL, &format!("q{}", i))).collect();
        match select_next(&ctx("anything at all", &history, &policy)) {
            SearchSelection::Finish { summary, reason } => {
                assert_eq!(reason, Exhaustion::BudgetReached);
                assert!(summary.starts_with("Reached search limit (4)."));
                assert!(summary.contains("hit"));
            }
            other => panic!("expected finish, got {:?}", other),
        }
    }

    #[test]
    fn allowlist_restricts_and_respects_order() {
        let policy = ToolPolicy::Only(vec!["docs_search".into(), CONTEXT_SEARCH_TOOL.into()]);
        let mut c = ctx("rate limiter", &[], &policy);
        c.suggested_tool = Some(MEMORY_SEARCH_TOOL);
        match select_next(&c) {
            SearchSelection::Search { tool_name, .. } => assert_eq!(tool_name, "docs_search"),
            other => panic!("expected search, got {:?}", other),
        }
    }

    #[test]
    fn disabled_tools_yield_no_tools_available() {
        let policy = ToolPolicy::Disabled;
        match select_next(&ctx("rate limiter", &[], &policy)) {
            SearchSelection::Finish { summary, reason } => {
                assert_eq!(reason, Exhaustion::NoTools);
                assert_eq!(summary, "No tools available.");
            }
            other => panic!("expected finish, got {:?}", other),
        }
    }

    #[test]
    fn exhausted_space_finishes() {
        let policy = ToolPolicy::Only(vec![CONTEXT_SEARCH_TOOL.into()]);
        let history = vec![search(CONTEXT_SEARCH_TOOL, "retry")];
        let mut c = ctx("retry", &history, &policy);
        c.max_searches = 10;
        match select_next(&c) {
            SearchSelection::Finish { summary, reason } => {
                assert_eq!(reason, Exhaustion::CombinationsExhausted);
                assert!(summary.starts_with("No new search combinations left."));
            }
            other => panic!("expected finish, got {:?}", other),
        }
    }

    #[test]
    fn selection_is_deterministic() {
        let policy = ToolPolicy::Unrestricted;
        let history = vec![search(MEMORY_SEARCH_TOOL, "cache eviction")];
        let c = ctx("How does cache eviction work?", &history, &policy);
        assert_eq!(select_next(&c), select_next(&c));
    }

    fn arb_history() -> impl Strategy<Value = Vec<HistoryItem>> {
        let tools = prop::sample::select(vec![
            CONTEXT_SEARCH_TOOL,
            MEMORY_SEARCH_TOOL,
            TICKET_SEARCH_TOOL,
            "shell.exec",
        ]);
        let queries = prop::sample::select(vec![
            "retry logic",
            "Retry Logic",
            "where is the retry logic",
            "open bugs",
            "",
        ]);
        prop::collection::vec((tools, queries), 0..8).prop_map(|steps| {
            steps
                .into_iter()
                .map(|(tool, query)| {
                    let mut args = Map::new();
                    args.insert(query_key(tool).to_string(), json!(query));
                    HistoryItem::tool(tool, Value::Object(args), None)
                })
                .collect()
        })
    }

    proptest! {
        #[test]
        fn never_reoffers_a_tried_pair(
            history in arb_history(),
            goal in prop::sample::select(vec!["where is the retry logic", "open bugs", "retry logic"]),
            max in 0u32..10,
        ) {
            let policy = ToolPolicy::Unrestricted;
            let mut c = ctx(goal, &history, &policy);
            c.max_searches = max;
            let tried = extract_searches(&history);
            if let SearchSelection::Search { tool_name, query, .. } = select_next(&c) {
                prop_assert!(!tried.has_tried(&tool_name, &normalize(&query)));
                prop_assert!((tried.total() as u32) < max);
            }
        }

        #[test]
        fn never_searches_past_budget(history in arb_history(), max in 0u32..8) {
            let policy = ToolPolicy::Unrestricted;
            let mut c = ctx("retry logic", &history, &policy);
            c.max_searches = max;
            if extract_searches(&history).total() >= max as usize {
                prop_assert!(!select_next(&c).is_search());
            }
        }
    }
}
