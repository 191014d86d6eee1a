//! Tool names the engine proposes on its own and tool classification.

/// Full-text search over the repository context.
pub const CONTEXT_SEARCH_TOOL: &str = "context.fts_search";

/// Search over stored agent memory.
pub const MEMORY_SEARCH_TOOL: &str = "context.memory_search";

/// Ticket tracker search, queried with JQL.
pub const TICKET_SEARCH_TOOL: &str = "jira_search";

const SEARCH_MARKERS: [&str; 2] = ["search", "fts_search"];

const TICKET_VOCABULARY: [&str; 12] = [
    "ticket", "tickets", "issue", "issues", "jira", "bug", "bugs", "epic", "epics", "story",
    "stories", "sprint",
];

/// Tools whose name marks them as search-class.
pub fn is_search_tool(name: &str) -> bool {
    let lowered = name.to_lowercase();
    SEARCH_MARKERS.iter().any(|marker| lowered.contains(marker))
}

/// Ticket search takes `{jql: ...}` instead of `{query: ...}`.
pub fn is_ticket_tool(name: &str) -> bool {
    let lowered = name.to_lowercase();
    lowered == TICKET_SEARCH_TOOL || lowered.starts_with("jira")
}

/// Argument key a search tool expects its query under.
pub fn query_key(tool: &str) -> &'static str {
    if is_ticket_tool(tool) {
        "jql"
    } else {
        "query"
    }
}

/// True when the goal talks about tickets or issues.
pub fn mentions_tickets(goal: &str) -> bool {
    goal.to_lowercase()
        .split(|c: char| !c.is_alphanumeric())
        .any(|word| TICKET_VOCABULARY.contains(&word))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn search_tools_are_detected_by_substring() {
        assert!(is_search_tool(CONTEXT_SEARCH_TOOL));
        assert!(is_search_tool(MEMORY_SEARCH_TOOL));
        assert!(is_search_tool(TICKET_SEARCH_TOOL));
        assert!(is_search_tool("Web_Search"));
        assert!(!is_search_tool("shell.exec"));
    }

    #[test]
    fn ticket_tool_uses_jql_key() {
        assert_eq!(query_key(TICKET_SEARCH_TOOL), "jql");
        assert_eq!(query_key(CONTEXT_SEARCH_TOOL), "query");
    }

    #[test]
    fn ticket_vocabulary_matches_whole_words() {
        assert!(mentions_tickets("Which Jira tickets mention login?"));
        assert!(mentions_tickets("open bugs for the parser"));
        assert!(!mentions_tickets("tissues and debugging"));
    }
}
