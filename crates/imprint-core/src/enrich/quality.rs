//! Quality scoring
//!
//! Five factors with fixed weights, each in [0, 1], each a pure function
//! of record content. Novelty is the one factor without a content-only
//! definition; it goes through a policy trait so a history-aware
//! comparator can be plugged in without touching the scorer.

use crate::record::Record;

/// Factor weights; must sum to 1.0
const W_CONTENT_DEPTH: f64 = 0.25;
const W_INFORMATION_VALUE: f64 = 0.25;
const W_ENGAGEMENT: f64 = 0.20;
const W_COMPLEXITY: f64 = 0.15;
const W_NOVELTY: f64 = 0.15;

const INFO_INDICATORS: &[&str] = &[
    "how to", "why", "because", "explain", "steps", "process", "important", "key", "main",
    "significant", "crucial",
];

const STRUCTURE_MARKERS: &[&str] = &["1.", "2.", "-", "*", ":"];

// ============================================================================
// NOVELTY POLICY
// ============================================================================

/// Pluggable novelty estimator
pub trait NoveltyPolicy: Send + Sync {
    /// Novelty of the record in [0, 1]
    fn novelty(&self, record: &Record) -> f64;
}

/// Source-prior fallback: estimates novelty from where content came from
/// when no historical comparator is available
#[derive(Debug, Clone, Copy, Default)]
pub struct SourcePriorNovelty;

impl NoveltyPolicy for SourcePriorNovelty {
    fn novelty(&self, record: &Record) -> f64 {
        let source = record.source.to_lowercase();
        if source.ends_with("_chatbot") || source.contains("chat") {
            0.6
        } else if source.contains("browser") {
            0.5
        } else {
            0.7
        }
    }
}

// ============================================================================
// SCORER
// ============================================================================

/// Breakdown of the quality score, useful in diagnostics
#[derive(Debug, Clone, PartialEq)]
pub struct QualityFactors {
    pub content_depth: f64,
    pub information_value: f64,
    pub engagement: f64,
    pub complexity: f64,
    pub novelty: f64,
}

/// Record quality scorer
pub struct QualityScorer {
    novelty: Box<dyn NoveltyPolicy>,
}

impl Default for QualityScorer {
    fn default() -> Self {
        Self::new(Box::new(SourcePriorNovelty))
    }
}

impl QualityScorer {
    /// Create a scorer with the given novelty policy
    pub fn new(novelty: Box<dyn NoveltyPolicy>) -> Self {
        Self { novelty }
    }

    /// Weighted quality score, clamped to [0, 1]
    pub fn score(&self, record: &Record) -> f64 {
        let f = self.factors(record);
        let weighted = f.content_depth * W_CONTENT_DEPTH
            + f.information_value * W_INFORMATION_VALUE
            + f.engagement * W_ENGAGEMENT
            + f.complexity * W_COMPLEXITY
            + f.novelty * W_NOVELTY;
        weighted.clamp(0.0, 1.0)
    }

    /// Individual factor values
    pub fn factors(&self, record: &Record) -> QualityFactors {
        QualityFactors {
            content_depth: content_depth(record),
            information_value: information_value(record),
            engagement: engagement(record),
            complexity: complexity(record),
            novelty: self.novelty.novelty(record).clamp(0.0, 1.0),
        }
    }
}

fn content_depth(record: &Record) -> f64 {
    let highlight_words = record.highlight.split_whitespace().count();
    let note_words = record.note.split_whitespace().count();

    let mut depth: f64 = match highlight_words {
        w if w > 10 => 0.3,
        w if w > 5 => 0.2,
        _ => 0.1,
    };
    depth += match note_words {
        w if w > 50 => 0.4,
        w if w > 20 => 0.3,
        w if w > 10 => 0.2,
        _ => 0.1,
    };
    depth += match record.tags.len() {
        t if t > 3 => 0.3,
        t if t > 1 => 0.2,
        _ => 0.1,
    };
    depth.min(1.0)
}

fn information_value(record: &Record) -> f64 {
    let text = record.content_text().to_lowercase();
    let hits = INFO_INDICATORS.iter().filter(|i| text.contains(*i)).count();
    (hits as f64 * 0.2).min(1.0)
}

fn engagement(record: &Record) -> f64 {
    let note_words = record.note.split_whitespace().count();
    let mut score: f64 = match note_words {
        w if w > 100 => 0.5,
        w if w > 50 => 0.3,
        w if w > 20 => 0.2,
        _ => 0.1,
    };
    score += match record.tags.len() {
        t if t > 5 => 0.3,
        t if t > 2 => 0.2,
        _ => 0.1,
    };
    if STRUCTURE_MARKERS.iter().any(|m| record.note.contains(m)) {
        score += 0.2;
    }
    score.min(1.0)
}

fn complexity(record: &Record) -> f64 {
    let text = record.content_text();
    let sentences: Vec<&str> = text
        .split('.')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .collect();
    if sentences.is_empty() {
        return 0.2;
    }
    let words: usize = sentences.iter().map(|s| s.split_whitespace().count()).sum();
    let mean = words as f64 / sentences.len() as f64;
    if mean > 20.0 {
        0.8
    } else if mean > 15.0 {
        0.6
    } else if mean > 10.0 {
        0.4
    } else {
        0.2
    }
}

// ============================================================================
// TESTS
// ============================================================================
