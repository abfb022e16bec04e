//! Attention scorer
//!
//! Converts a user's recent behavior into a single attention weight per
//! record, plus the sub-metrics behind it. All signals are computed over
//! the user's last-30-day history window and normalized through monotone
//! step tables, then combined and modulated by interaction depth.

use crate::record::Record;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// History window length in days
pub const HISTORY_WINDOW_DAYS: i64 = 30;

/// Jaccard word-similarity threshold for "same highlight"
const HIGHLIGHT_SIMILARITY_THRESHOLD: f64 = 0.7;

/// Shared-tag count for two records to be topic-related
const TOPIC_RELATED_MIN_SHARED_TAGS: usize = 2;

/// Seconds of investment credited per topic-related prior record
const SECONDS_PER_RELATED_RECORD: f64 = 300.0;

/// Cap on estimated time investment
const MAX_TIME_INVESTMENT_SECS: f64 = 3600.0;

// ============================================================================
// INTERACTION DEPTH
// ============================================================================

/// Qualitative engagement band, used as a multiplier on the combined score
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum InteractionDepth {
    #[default]
    Low,
    Medium,
    High,
}

impl InteractionDepth {
    /// Multiplier applied to the weighted sub-signal sum
    pub fn multiplier(&self) -> f64 {
        match self {
            InteractionDepth::Low => 0.8,
            InteractionDepth::Medium => 1.0,
            InteractionDepth::High => 1.2,
        }
    }
}

// ============================================================================
// METRICS
// ============================================================================

/// Raw sub-signals behind an attention weight, kept on the record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct AttentionMetrics {
    /// Prior records with a near-identical highlight
    pub highlight_frequency: u32,
    /// Prior records at the same address carrying a non-empty note
    pub note_density: u32,
    /// Visits to the same address, this record included
    pub address_revisit: u32,
    /// Estimated seconds invested in this topic, capped
    pub time_investment_sec: f64,
    /// Engagement band
    pub interaction_depth: InteractionDepth,
}

// ============================================================================
// HISTORY ENTRY
// ============================================================================

/// The slice of a prior record the scorer needs
#[derive(Debug, Clone)]
pub struct HistoryEntry {
    /// Record id, so rescoring can exclude a record from its own window
    pub id: String,
    /// Prior highlight text
    pub highlight: String,
    /// Whether the prior record carried a non-empty note
    pub has_note: bool,
    /// Prior address
    pub address: String,
    /// Prior event time
    pub timestamp: DateTime<Utc>,
    /// Union of user and semantic tags on the prior record
    pub tags: BTreeSet<String>,
}

impl From<&Record> for HistoryEntry {
    fn from(record: &Record) -> Self {
        Self {
            id: record.id.clone(),
            highlight: record.highlight.clone(),
            has_note: !record.note.trim().is_empty(),
            address: record.address.clone(),
            timestamp: record.timestamp,
            tags: record.all_tags(),
        }
    }
}

// ============================================================================
// SCORER
// ============================================================================

/// Per-user attention scorer
#[derive(Debug, Clone, Copy, Default)]
pub struct AttentionScorer;

impl AttentionScorer {
    /// Create a scorer
    pub fn new() -> Self {
        Self
    }

    /// Score a record against the user's history window
    ///
    /// `attention = min(1, depth · (0.30·hf + 0.25·nd + 0.30·rv + 0.15·ti))`
    pub fn score(&self, record: &Record, history: &[HistoryEntry]) -> (f64, AttentionMetrics) {
        let record_tags = record.all_tags();

        let highlight_frequency = history
            .iter()
            .filter(|h| {
                jaccard_words(&record.highlight, &h.highlight) >= HIGHLIGHT_SIMILARITY_THRESHOLD
            })
            .count() as u32;

        let note_density = history
            .iter()
            .filter(|h| h.address == record.address && h.has_note)
            .count() as u32;

        // Total visit count: prior records at this address plus this one
        let address_revisit = history
            .iter()
            .filter(|h| h.address == record.address)
            .count() as u32
            + 1;

        let related_count = history
            .iter()
            .filter(|h| is_topic_related(&record_tags, &h.tags))
            .count();

        let time_investment_sec =
            (related_count as f64 * SECONDS_PER_RELATED_RECORD).min(MAX_TIME_INVESTMENT_SECS);

        let interaction_depth =
            self.interaction_depth(record, history, related_count);

        let weighted = 0.30 * normalize_frequency(highlight_frequency)
            + 0.25 * normalize_density(note_density)
            + 0.30 * normalize_revisit(address_revisit)
            + 0.15 * normalize_time(time_investment_sec);

        let attention = (weighted * interaction_depth.multiplier()).min(1.0);

        (
            attention,
            AttentionMetrics {
                highlight_frequency,
                note_density,
                address_revisit,
                time_investment_sec,
                interaction_depth,
            },
        )
    }

    /// Depth from four engagement factors: ≥3 high, 2 medium, else low
    fn interaction_depth(
        &self,
        record: &Record,
        history: &[HistoryEntry],
        related_count: usize,
    ) -> InteractionDepth {
        let mut factors = 0u8;

        // detailed_note
        if record.note.chars().count() > 200 {
            factors += 1;
        }
        // rich_tagging
        if record.tags.len() > 3 {
            factors += 1;
        }
        // extensive_exploration
        if related_count > 5 {
            factors += 1;
        }
        // sustained_interest
        if topic_span_days(record, history) > 7 {
            factors += 1;
        }

        match factors {
            n if n >= 3 => InteractionDepth::High,
            2 => InteractionDepth::Medium,
            _ => InteractionDepth::Low,
        }
    }
}

/// Days between this record and the earliest topic-related prior record
fn topic_span_days(record: &Record, history: &[HistoryEntry]) -> i64 {
    let record_tags = record.all_tags();
    history
        .iter()
        .filter(|h| is_topic_related(&record_tags, &h.tags))
        .map(|h| (record.timestamp - h.timestamp).num_days())
        .max()
        .unwrap_or(0)
}

fn is_topic_related(a: &BTreeSet<String>, b: &BTreeSet<String>) -> bool {
    if a.is_empty() || b.is_empty() {
        return false;
    }
    a.intersection(b).count() >= TOPIC_RELATED_MIN_SHARED_TAGS
}

/// Jaccard similarity over lowercase word sets
pub fn jaccard_words(a: &str, b: &str) -> f64 {
    let words_a: BTreeSet<String> = a.split_whitespace().map(|w| w.to_lowercase()).collect();
    let words_b: BTreeSet<String> = b.split_whitespace().map(|w| w.to_lowercase()).collect();
    if words_a.is_empty() || words_b.is_empty() {
        return 0.0;
    }
    let intersection = words_a.intersection(&words_b).count();
    let union = words_a.union(&words_b).count();
    intersection as f64 / union as f64
}

// ============================================================================
// NORMALIZERS (MONOTONE STEP TABLES)
// ============================================================================

fn normalize_frequency(count: u32) -> f64 {
    match count {
        0..=1 => 0.1,
        2..=3 => 0.4,
        4..=5 => 0.7,
        _ => 1.0,
    }
}

fn normalize_density(count: u32) -> f64 {
    match count {
        0..=1 => 0.2,
        2..=3 => 0.6,
        4..=5 => 0.8,
        _ => 1.0,
    }
}

fn normalize_revisit(count: u32) -> f64 {
    match count {
        0..=1 => 0.1,
        2..=3 => 0.5,
        4..=6 => 0.8,
        _ => 1.0,
    }
}

fn normalize_time(seconds: f64) -> f64 {
    if seconds < 30.0 {
        0.1
    } else if seconds < 120.0 {
        0.4
    } else if seconds < 300.0 {
        0.7
    } else {
        1.0
    }
}

// ============================================================================
// TESTS
// ============================================================================
