//! Query canonicalization used wherever queries are compared or generated.

use once_cell::sync::Lazy;
use std::collections::HashSet;

/// Maximum number of tokens kept in a keyword variant.
pub const MAX_KEYWORDS: usize = 8;

static STOP_WORDS: Lazy<HashSet<&'static str>> = Lazy::new(|| {
    [
        // articles and function words
        "a", "an", "the", "is", "are", "was", "were", "be", "of", "for", "in", "on", "to", "at",
        "by", "from", "with", "and", "or", "me", "my", "i", "we", "you", "it", "this", "that",
        "these", "those", "all", "any", "some", "about", "do", "does", "did", "can", "could",
        "please", "there",
        // wh-words
        "what", "where", "when", "which", "who", "whom", "whose", "why", "how",
        // generic verbs
        "search", "find", "show", "list", "get", "look", "locate", "lookup", "tell", "give",
        "fetch", "display",
        // generic nouns
        "repo", "repos", "repository", "file", "files", "code", "codebase", "project",
    ]
    .into_iter()
    .collect()
});

/// Trims, lower-cases and collapses internal whitespace.
pub fn normalize(text: &str) -> String {
    text.to_lowercase()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

/// Keyword-only form of `text`: stop-words removed, at most eight tokens.
///
/// Falls back to the normalized text when every token is a stop-word, so the
/// result is never empty for non-blank input.
pub fn keyword_variant(text: &str) -> String {
    let normalized = normalize(text);
    let keywords: Vec<&str> = normalized
        .split(' ')
        .map(|token| token.trim_matches(|c: char| !c.is_alphanumeric() && c != '_'))
        .filter(|token| !token.is_empty() && !STOP_WORDS.contains(token))
        .take(MAX_KEYWORDS)
        .collect();

    if keywords.is_empty() {
        normalized
    } else {
        keywords.join(" ")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn normalize_folds_case_and_whitespace() {
        assert_eq!(normalize("  Database\tSCHEMA \n migrations "), "database schema migrations");
        assert_eq!(normalize(""), "");
    }

    #[test]
    fn keyword_variant_strips_stop_words() {
        assert_eq!(
            keyword_variant("Where is the retry logic in the repo?"),
            "retry logic"
        );
    }

    #[test]
    fn keyword_variant_caps_token_count() {
        let variant = keyword_variant("alpha beta gamma delta epsilon zeta eta theta iota kappa");
        assert_eq!(variant.split(' ').count(), MAX_KEYWORDS);
        assert!(variant.ends_with("theta"));
    }

    #[test]
    fn keyword_variant_falls_back_when_only_stop_words() {
        assert_eq!(keyword_variant("Find the file"), "find the file");
    }

    proptest! {
        #[test]
        fn normalize_is_idempotent(s in "\\PC*") {
            let once = normalize(&s);
            prop_assert_eq!(normalize(&once), once);
        }

        #[test]
        fn keyword_variant_never_empty_for_non_blank(s in "[a-zA-Z ?.]{0,40}[a-zA-Z][a-zA-Z ?.]{0,40}") {
            prop_assert!(!keyword_variant(&s).is_empty());
        }
    }
}
