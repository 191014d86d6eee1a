//! Derives prior search attempts and a recency-weighted summary from history.

use std::collections::HashSet;
use std::fmt::Write as _;

use super::history::HistoryItem;
use super::normalizer::normalize;
use super::tools::is_search_tool;

/// One prior search step.
#[derive(Debug, Clone, PartialEq)]
pub struct SearchAttempt {
    pub tool: String,
    pub query: String,
    pub had_output: bool,
    pub excerpt: Option<String>,
}

/// Everything the selector needs to know about searches already made.
#[derive(Debug, Clone, Default)]
pub struct SearchHistory {
    pub attempts: Vec<SearchAttempt>,
    pub tried_pairs: HashSet<(String, String)>,
    pub tried_queries: HashSet<String>,
    pub tried_tools: HashSet<String>,
}

impl SearchHistory {
    /// Number of prior search steps, with or without a usable query.
    pub fn total(&self) -> usize {
        self.attempts.len()
    }

    pub fn has_tried(&self, tool: &str, normalized_query: &str) -> bool {
        self.tried_pairs
            .contains(&(tool.to_string(), normalized_query.to_string()))
    }

    pub fn has_output(&self) -> bool {
        self.attempts.iter().any(|a| a.had_output)
    }

    /// Bullet list of what earlier searches returned.
    pub fn findings(&self) -> String {
        let lines: Vec<String> = self
            .attempts
            .iter()
            .filter_map(|attempt| {
                attempt.excerpt.as_ref().map(|excerpt| {
                    if attempt.query.is_empty() {
                        format!("- {}: {}", attempt.tool, excerpt)
                    } else {
                        format!("- {} \"{}\": {}", attempt.tool, attempt.query, excerpt)
                    }
                })
            })
            .collect();

        if lines.is_empty() {
            "No results were returned by previous searches.".to_string()
        } else {
            lines.join("\n")
        }
    }
}

/// Walks history and collects every search-class tool step.
pub fn extract_searches(history: &[HistoryItem]) -> SearchHistory {
    let mut searches = SearchHistory::default();

    for item in history.iter().filter(|item| item.is_tool()) {
        let Some(tool) = item.tool_name.as_deref() else {
            continue;
        };
        if !is_search_tool(tool) {
            continue;
        }

        let query = item.query().map(normalize).unwrap_or_default();
        let excerpt = item.output_excerpt();

        searches.tried_tools.insert(tool.to_string());
        if !query.is_empty() {
            searches.tried_queries.insert(query.clone());
            searches.tried_pairs.insert((tool.to_string(), query.clone()));
        }
        searches.attempts.push(SearchAttempt {
            tool: tool.to_string(),
            query,
            had_output: excerpt.is_some(),
            excerpt,
        });
    }

    searches
}

/// Recency weights for `n` items, oldest first.
///
/// A single item gets 1.0. Otherwise the newest item gets 0.7 and the rest
/// share 0.3 in proportion to their 1-based position.
pub fn recency_weights(n: usize) -> Vec<f64> {
    match n {
        0 => Vec::new(),
        1 => vec![1.0],
        _ => {
            let older = n - 1;
            let total: f64 = (1..=older).map(|i| i as f64).sum();
            let mut weights: Vec<f64> = (1..=older).map(|i| 0.3 * i as f64 / total).collect();
            weights.push(0.7);
            weights
        }
    }
}

/// Indexed, weighted rendering of the history for the advisory prompt.
pub fn weighted_summary(history: &[HistoryItem]) -> String {
    if history.is_empty() {
        return String::new();
    }

    let mut out = String::from("History (later steps are weighted higher):\n");
    for (i, (item, weight)) in history.iter().zip(recency_weights(history.len())).enumerate() {
        let _ = write!(out, "{}. (weight {:.2}) {}", i + 1, weight, item.kind.as_str());
        if let Some(tool) = &item.tool_name {
            let _ = write!(out, " {}", tool);
        }
        if let Some(excerpt) = item.output_excerpt() {
            let _ = write!(out, ": {}", excerpt);
        }
        out.push('\n');
    }
    out.truncate(out.trim_end().len());
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use serde_json::json;

    fn search(tool: &str, query: &str, output: Option<&str>) -> HistoryItem {
        HistoryItem::tool(tool, json!({ "query": query }), output.map(|o| json!(o)))
    }

    #[test]
    fn extracts_normalized_pairs_for_search_tools_only() {
        let history = vec![
            search("context.fts_search", "  Retry  Logic ", Some("src/retry.rs")),
            HistoryItem::tool("shell.exec", json!({"query": "ls"}), None),
            search("context.memory_search", "", None),
        ];

        let searches = extract_searches(&history);
        assert_eq!(searches.total(), 2);
        assert!(searches.has_tried("context.fts_search", "retry logic"));
        assert_eq!(searches.tried_pairs.len(), 1);
        assert_eq!(searches.tried_tools.len(), 2);
        assert!(searches.has_output());
    }

    #[test]
    fn findings_lists_excerpts() {
        let history = vec![search("context.fts_search", "db", Some("schema.sql"))];
        let findings = extract_searches(&history).findings();
        assert_eq!(findings, "- context.fts_search \"db\": schema.sql");
    }

    #[test]
    fn findings_without_output_says_so() {
        let history = vec![search("context.fts_search", "db", None)];
        assert!(extract_searches(&history).findings().starts_with("No results"));
    }

    #[test]
    fn two_items_split_point_three_and_point_seven() {
        assert_eq!(recency_weights(2), vec![0.3, 0.7]);
    }

    #[test]
    fn summary_renders_indexed_lines() {
        let history = vec![
            search("context.fts_search", "db", Some("schema.sql")),
            search("context.memory_search", "db", None),
        ];
        let summary = weighted_summary(&history);
        let lines: Vec<&str> = summary.lines().collect();
        assert_eq!(lines.len(), 3);
        assert!(lines[0].contains("weighted higher"));
        assert_eq!(lines[1], "1. (weight 0.30) tool context.fts_search: schema.sql");
        assert_eq!(lines[2], "2. (weight 0.70) tool context.memory_search");
    }

    #[test]
    fn empty_history_gives_empty_summary() {
        assert_eq!(weighted_summary(&[]), "");
    }

    proptest! {
        #[test]
        fn weights_sum_to_one_with_fixed_tail(n in 2usize..200) {
            let weights = recency_weights(n);
            prop_assert_eq!(weights.len(), n);
            prop_assert_eq!(*weights.last().unwrap(), 0.7);
            let sum: f64 = weights.iter().sum();
            prop_assert!((sum - 1.0).abs() < 1e-9);
        }

        #[test]
        fn older_items_weigh_strictly_less(n in 3usize..100) {
            let weights = recency_weights(n);
            for pair in weights.windows(2) {
                prop_assert!(pair[0] < pair[1]);
            }
        }
    }
}
