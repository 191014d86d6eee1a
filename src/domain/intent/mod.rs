//! Intent domain - choosing an agent's next action.
//!
//! Leaves first: normalizer, history, analyzer, selector, classifier and
//! arithmetic are pure. The engine composes them behind the advisory port.

mod analyzer;
mod arithmetic;
mod classifier;
mod decision;
mod engine;
mod history;
mod normalizer;
mod request;
mod selector;
mod tools;

pub use analyzer::{extract_searches, recency_weights, weighted_summary, SearchAttempt, SearchHistory};
pub use arithmetic::{
    correct_final_answer, evaluate, evaluate_goal, extract_expression, format_number,
    ArithmeticError,
};
pub use classifier::{classify_goal, GoalClass};
pub use decision::{
    Decision, DecisionAction, DecisionResult, ResultStatus, ARITHMETIC_CORRECTION_MARKER,
};
pub use engine::IntentEngine;
pub use history::{
    normalize_history, ActionKind, HistoryItem, NestedAction, RawHistoryItem, EXCERPT_LIMIT,
};
pub use normalizer::{keyword_variant, normalize, MAX_KEYWORDS};
pub use request::{
    AdvisoryConfig, DecisionPayload, DecisionRequest, PromptContext, ToolPolicy,
    DEFAULT_MAX_STEPS,
};
pub use selector::{select_next, Exhaustion, SearchContext, SearchSelection};
pub use tools::{
    is_search_tool, is_ticket_tool, mentions_tickets, query_key, CONTEXT_SEARCH_TOOL,
    MEMORY_SEARCH_TOOL, TICKET_SEARCH_TOOL,
};
