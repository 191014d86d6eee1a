//! Keyword classification of goals for the heuristic fallback path.

const SEARCH_PHRASES: [&str; 12] = [
    "search", "find", "locate", "lookup", "look up", "look for", "where is", "where are", "grep",
    "which file", "show me", "list all",
];

const ANALYSIS_PHRASES: [&str; 14] = [
    "analyze", "analyse", "analysis", "explain", "review", "understand", "investigate",
    "refactor", "debug", "architecture", "how does", "how do", "trace", "walk me through",
];

/// What a goal is asking for, in the absence of advisory input.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GoalClass {
    /// Wants something located.
    Search,
    /// Wants codebase understanding, which starts with a search for context.
    Analysis,
    /// Answerable without tools.
    Direct,
}

impl GoalClass {
    pub fn wants_search(&self) -> bool {
        matches!(self, GoalClass::Search | GoalClass::Analysis)
    }
}

pub fn classify_goal(goal: &str) -> GoalClass {
    let words: String = goal
        .to_lowercase()
        .chars()
        .map(|c| if c.is_alphanumeric() { c } else { ' ' })
        .collect();
    let padded = format!(" {} ", words.split_whitespace().collect::<Vec<_>>().join(" "));
    let has = |phrase: &&str| padded.contains(&format!(" {} ", phrase));

    if SEARCH_PHRASES.iter().any(has) {
        GoalClass::Search
    } else if ANALYSIS_PHRASES.iter().any(has) {
        GoalClass::Analysis
    } else {
        GoalClass::Direct
    }
}
