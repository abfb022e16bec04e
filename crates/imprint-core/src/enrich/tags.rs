//! Semantic tag generation
//!
//! Keyword extraction over the combined highlight and note text.
//! Deterministic: identical input text always yields identical tags.

use std::collections::HashMap;

/// Maximum semantic tags per record
pub const MAX_SEMANTIC_TAGS: usize = 8;

/// Minimum token length considered tag-worthy
const MIN_TOKEN_LEN: usize = 4;

const STOPWORDS: &[&str] = &[
    "about", "above", "after", "again", "along", "because", "been", "before", "being", "between",
    "both", "could", "does", "doing", "down", "during", "each", "every", "from", "have", "having",
    "here", "into", "just", "more", "most", "only", "other", "over", "same", "should", "some",
    "such", "than", "that", "their", "them", "then", "there", "these", "they", "this", "those",
    "through", "under", "until", "very", "were", "what", "when", "where", "which", "while", "will",
    "with", "would", "your",
];

/// Produce up to [`MAX_SEMANTIC_TAGS`] lowercase tags for the given text
///
/// Tokens are ranked by frequency, ties broken by first occurrence, so the
/// result is stable under identical input.
pub fn generate_semantic_tags(text: &str) -> Vec<String> {
    let mut counts: HashMap<String, (usize, usize)> = HashMap::new();

    for (position, raw) in text.split_whitespace().enumerate() {
        let token: String = raw
            .chars()
            .filter(|c| c.is_alphanumeric() || *c == '-')
            .collect::<String>()
            .to_lowercase();
        if token.len() < MIN_TOKEN_LEN || STOPWORDS.contains(&token.as_str()) {
            continue;
        }
        let entry = counts.entry(token).or_insert((0, position));
        entry.0 += 1;
    }

    let mut ranked: Vec<(String, usize, usize)> = counts
        .into_iter()
        .map(|(token, (count, first))| (token, count, first))
        .collect();
    ranked.sort_by(|a, b| b.1.cmp(&a.1).then(a.2.cmp(&b.2)));

    ranked
        .into_iter()
        .take(MAX_SEMANTIC_TAGS)
        .map(|(token, _, _)| token)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tags_are_lowercase_and_bounded() {
        let text = "Machine Learning models require VALIDATION. Machine learning needs data \
                    pipelines, feature engineering, hyperparameter tuning, regularization, \
                    monitoring and deployment discipline.";
        let tags = generate_semantic_tags(text);
        assert!(tags.len() <= MAX_SEMANTIC_TAGS);
        assert!(tags.iter().all(|t| t.chars().all(|c| !c.is_uppercase())));
        // "machine" and "learning" repeat, so they rank first
        assert_eq!(tags[0], "machine");
        assert_eq!(tags[1], "learning");
    }

    #[test]
    fn test_tags_stable_under_identical_input() {
        let text = "Rust ownership, borrowing, lifetimes. Ownership again.";
        assert_eq!(generate_semantic_tags(text), generate_semantic_tags(text));
    }

    #[test]
    fn test_stopwords_and_short_tokens_skipped() {
        let tags = generate_semantic_tags("this is that with the cat");
        assert!(tags.is_empty());
    }

    #[test]
    fn test_empty_text_yields_no_tags() {
        assert!(generate_semantic_tags("").is_empty());
    }
}
