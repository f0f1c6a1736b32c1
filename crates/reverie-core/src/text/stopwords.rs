//! Canonical stop-word set and query normalization
//!
//! Single source of truth for stop-word handling. Stop words are grammar
//! words (pronouns, articles, prepositions, conjunctions, auxiliaries) that
//! are rarely meaningful for semantic search or keyword analysis.

use std::collections::HashSet;
use std::sync::LazyLock;

/// Standard English stop words (grammar words that are never meaningful entities)
pub static STOP_WORDS: LazyLock<HashSet<&'static str>> = LazyLock::new(|| {
    [
        // Pronouns
        "i", "me", "my", "mine", "myself", "you", "your", "yours", "yourself",
        "he", "him", "his", "himself", "she", "her", "hers", "herself",
        "it", "its", "itself", "we", "us", "our", "ours", "ourselves",
        "they", "them", "their", "theirs", "themselves",
        // Articles
        "a", "an", "the",
        // Prepositions
        "in", "on", "at", "to", "for", "of", "with", "by", "from",
        "about", "into", "through", "during", "before", "after", "above",
        "below", "between", "under", "over", "against", "within",
        // Conjunctions
        "and", "or", "but", "if", "then", "else", "nor", "yet", "so",
        // Auxiliaries
        "is", "are", "was", "were", "be", "been", "being",
        "have", "has", "had", "having",
        "do", "does", "did", "doing", "done",
        "will", "would", "could", "should", "may", "might", "must", "can",
        // Demonstratives
        "this", "that", "these", "those",
        // Question words
        "what", "when", "where", "how", "why", "which", "who", "whom", "whose",
        // Common fillers and adverbs
        "very", "really", "just", "too", "now", "there", "here",
        "such", "even", "also", "still", "more", "most", "less", "much", "many",
        "some", "any", "all", "both", "each", "every", "either", "neither",
        // Other function words
        "as", "than", "because", "while", "however", "therefore", "thus",
        "not", "no", "yes", "maybe", "perhaps",
    ]
    .into_iter()
    .collect()
});

/// Clean text with optional stop-word removal.
///
/// Lowercases, strips punctuation (preserving apostrophes for contractions
/// like "don't"), collapses whitespace, and optionally drops stop words.
/// Idempotent: `clean(clean(x)) == clean(x)`.
pub fn clean(text: &str, drop_stop_words: bool) -> String {
    if text.is_empty() {
        return String::new();
    }

    let lowered = text.to_lowercase();
    let stripped: String = lowered
        .chars()
        .map(|c| {
            if c.is_alphanumeric() || c == '_' || c == '\'' || c.is_whitespace() {
                c
            } else {
                ' '
            }
        })
        .collect();

    let words = stripped
        .split_whitespace()
        .filter(|w| !drop_stop_words || !STOP_WORDS.contains(w));

    words.collect::<Vec<_>>().join(" ")
}

/// Extract content words (non-stop words) of at least `min_len` characters.
pub fn content_words(text: &str, min_len: usize) -> Vec<String> {
    clean(text, true)
        .split_whitespace()
        .filter(|w| w.chars().count() >= min_len)
        .map(str::to_string)
        .collect()
}

/// Optimize query text for semantic search.
///
/// Removes noise (stop words), keeps meaningful terms (`min_len` filter),
/// and optionally truncates to `max_words` for performance.
pub fn optimize_query(query: &str, min_len: usize, max_words: Option<usize>) -> String {
    let cleaned = clean(query, true);
    let mut words: Vec<&str> = cleaned
        .split_whitespace()
        .filter(|w| w.chars().count() >= min_len)
        .collect();

    if let Some(max) = max_words {
        words.truncate(max);
    }

    words.join(" ")
}

/// Check whether a single word is a stop word (case-insensitive).
pub fn is_stop_word(word: &str) -> bool {
    STOP_WORDS.contains(word.to_lowercase().as_str())
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clean_removes_punctuation_keeps_apostrophes() {
        assert_eq!(clean("The cat's name is Max!", true), "cat's name max");
    }

    #[test]
    fn test_clean_without_stop_word_removal() {
        assert_eq!(
            clean("What did I do yesterday?", false),
            "what did i do yesterday"
        );
    }

    #[test]
    fn test_clean_idempotent() {
        for input in ["The quick brown fox!", "  what's UP??  ", "", "a the of"] {
            let once = clean(input, true);
            assert_eq!(clean(&once, true), once, "clean not idempotent for {input:?}");
        }
    }

    #[test]
    fn test_content_words_length_filter() {
        assert_eq!(
            content_words("The quick brown fox", 5),
            vec!["quick", "brown"]
        );
    }

    #[test]
    fn test_optimize_query_spec_example() {
        assert_eq!(
            optimize_query("What did the cat do yesterday?", 3, None),
            "cat yesterday"
        );
    }

    #[test]
    fn test_optimize_query_max_words() {
        let out = optimize_query("machine learning with large language models", 3, Some(2));
        assert_eq!(out.split_whitespace().count(), 2);
    }

    #[test]
    fn test_empty_inputs() {
        assert_eq!(clean("", true), "");
        assert!(content_words("", 3).is_empty());
        assert_eq!(optimize_query("", 3, None), "");
    }

    #[test]
    fn test_is_stop_word() {
        assert!(is_stop_word("the"));
        assert!(is_stop_word("The"));
        assert!(!is_stop_word("max"));
    }
}
