//! Semantic summary
//!
//! Lightweight lexical analysis of record content: main topics, sentiment
//! polarity, structural complexity, key concepts. Deterministic given the
//! input text.

use crate::record::{Complexity, SemanticSummary, Sentiment};

const POSITIVE_WORDS: &[&str] = &["good", "great", "excellent", "amazing", "wonderful"];
const NEGATIVE_WORDS: &[&str] = &["bad", "terrible", "awful", "horrible", "disappointing"];

const MAX_TOPICS: usize = 3;
const MAX_CONCEPTS: usize = 5;

/// Minimum word length for topics/concepts
const MIN_CONCEPT_LEN: usize = 5;

/// Summarize record content
pub fn summarize(text: &str) -> SemanticSummary {
    let lower = text.to_lowercase();

    let positive = POSITIVE_WORDS.iter().filter(|w| lower.contains(*w)).count();
    let negative = NEGATIVE_WORDS.iter().filter(|w| lower.contains(*w)).count();
    let sentiment = match positive.cmp(&negative) {
        std::cmp::Ordering::Greater => Sentiment::Positive,
        std::cmp::Ordering::Less => Sentiment::Negative,
        std::cmp::Ordering::Equal => Sentiment::Neutral,
    };

    let complexity = complexity_of(text);

    let mut seen = std::collections::BTreeSet::new();
    let mut concepts = Vec::new();
    for word in text.split_whitespace() {
        let cleaned: String = word
            .chars()
            .filter(|c| c.is_alphanumeric())
            .collect::<String>()
            .to_lowercase();
        if cleaned.len() >= MIN_CONCEPT_LEN && seen.insert(cleaned.clone()) {
            concepts.push(cleaned);
            if concepts.len() == MAX_CONCEPTS {
                break;
            }
        }
    }
    let topics = concepts.iter().take(MAX_TOPICS).cloned().collect();

    SemanticSummary {
        topics,
        sentiment,
        complexity,
        concepts,
    }
}

/// Complexity from mean sentence length: >20 words high, >10 medium, else low
pub fn complexity_of(text: &str) -> Complexity {
    let sentences: Vec<&str> = text
        .split(['.', '!', '?'])
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .collect();
    if sentences.is_empty() {
        return Complexity::Low;
    }
    let words: usize = sentences.iter().map(|s| s.split_whitespace().count()).sum();
    let mean = words as f64 / sentences.len() as f64;
    if mean > 20.0 {
        Complexity::High
    } else if mean > 10.0 {
        Complexity::Medium
    } else {
        Complexity::Low
    }
}
