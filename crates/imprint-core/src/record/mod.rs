//! Record module - the canonical observation and its invariants
//!
//! A record is the unit every other component consumes: what a user
//! looked at, highlighted, or wrote, plus the derived fields the
//! pipeline assigns (enrichment, scores, influence, tier).

mod validate;

pub use validate::{normalize_tags, ValidationIssue, Validator, MAX_HIGHLIGHT_CHARS, MAX_NOTE_CHARS};

use crate::attention::AttentionMetrics;
use crate::config::TierPolicy;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

// ============================================================================
// ACCESS LEVEL
// ============================================================================

/// Who may see a record
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum AccessLevel {
    /// Visible to the owning user only
    #[default]
    Private,
    /// Visible to anyone
    Public,
    /// Visible to explicitly shared parties
    Shared,
}

impl AccessLevel {
    /// Convert to string representation
    pub fn as_str(&self) -> &'static str {
        match self {
            AccessLevel::Private => "private",
            AccessLevel::Public => "public",
            AccessLevel::Shared => "shared",
        }
    }

    /// Parse from a string, rejecting anything outside the closed set
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "private" => Some(AccessLevel::Private),
            "public" => Some(AccessLevel::Public),
            "shared" => Some(AccessLevel::Shared),
            _ => None,
        }
    }
}

impl std::fmt::Display for AccessLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

// ============================================================================
// STORAGE TIER
// ============================================================================

/// Storage tier placement, a pure function of influence and age
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Tier {
    /// Low-latency in-process store, TTL- and capacity-bounded
    #[default]
    Hot,
    /// Relational store with composite indexes
    Warm,
    /// Append-only compressed shards
    Cold,
}

impl Tier {
    /// Convert to string representation
    pub fn as_str(&self) -> &'static str {
        match self {
            Tier::Hot => "hot",
            Tier::Warm => "warm",
            Tier::Cold => "cold",
        }
    }

    /// Parse from string name; unknown names fall back to cold
    pub fn parse_name(s: &str) -> Self {
        match s {
            "hot" => Tier::Hot,
            "warm" => Tier::Warm,
            _ => Tier::Cold,
        }
    }
}

impl std::fmt::Display for Tier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

// ============================================================================
// SEMANTIC SUMMARY
// ============================================================================

/// Sentiment classification of record content
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Sentiment {
    Positive,
    #[default]
    Neutral,
    Negative,
}

/// Content complexity band derived from sentence structure
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Complexity {
    #[default]
    Low,
    Medium,
    High,
}

/// Compact semantic description of a record's content
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct SemanticSummary {
    /// Main topics, most salient first
    pub topics: Vec<String>,
    /// Overall sentiment
    pub sentiment: Sentiment,
    /// Structural complexity band
    pub complexity: Complexity,
    /// Key concepts mentioned
    pub concepts: Vec<String>,
}

// ============================================================================
// PROCESSING METADATA
// ============================================================================

/// Pipeline provenance attached to every ingested record
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct ProcessingMetadata {
    /// When the pipeline finished with this record
    pub processed_at: Option<DateTime<Utc>>,
    /// Version of the processing pipeline
    pub processor_version: String,
    /// Enrichment stages that completed
    pub enhancements_applied: Vec<String>,
    /// Enrichment stages that failed (record still ingestible)
    pub failed_stages: Vec<String>,
}

impl ProcessingMetadata {
    /// True when at least one enrichment stage failed
    pub fn is_degraded(&self) -> bool {
        !self.failed_stages.is_empty()
    }
}

// ============================================================================
// RAW RECORD (INGESTION INPUT)
// ============================================================================

/// An observation as submitted by an application, before validation
///
/// Uses `deny_unknown_fields` to prevent field injection.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct RawRecord {
    /// Stable unique identifier assigned by the submitting app
    pub id: Option<String>,
    /// Event time, ISO-8601
    pub timestamp: Option<String>,
    /// Originating application tag
    pub source: Option<String>,
    /// Short focus text
    pub highlight: Option<String>,
    /// User-authored detail
    pub note: Option<String>,
    /// Resource locator the record refers to
    pub address: Option<String>,
    /// User tags
    #[serde(default)]
    pub tags: Option<Vec<String>>,
    /// Access level: private, public, or shared
    pub access: Option<String>,
    /// Opaque source metadata
    #[serde(default)]
    pub raw: Option<serde_json::Value>,
}

// ============================================================================
// RECORD
// ============================================================================

/// The canonical observation record
///
/// Created by ingestion, enriched in place once, then read-mostly.
/// Derived fields are immutable except through governed rewrite.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Record {
    /// Stable unique identifier
    pub id: String,
    /// Owner; never changes after create
    pub user_id: String,
    /// Event time, UTC
    pub timestamp: DateTime<Utc>,
    /// Originating application tag
    pub source: String,
    /// Short focus text (≤ 10,000 chars)
    pub highlight: String,
    /// User-authored detail (≤ 50,000 chars)
    pub note: String,
    /// Resource locator
    pub address: String,
    /// Lowercase, trimmed, deduplicated user tags
    pub tags: Vec<String>,
    /// Access level
    pub access: AccessLevel,
    /// Opaque source metadata; outside all invariants
    pub raw: serde_json::Value,

    // ========== Derived by the pipeline ==========
    /// Semantic tags (≤ 8, lowercase)
    #[serde(default)]
    pub enhanced_tags: Vec<String>,
    /// Suggested salient spans from the note, best first
    #[serde(default)]
    pub recommended_highlights: Vec<String>,
    /// Semantic summary
    #[serde(default)]
    pub semantic: Option<SemanticSummary>,
    /// Embedding vector; one fixed dimension per user corpus
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub embedding: Option<Vec<f32>>,
    /// Content quality in [0, 1]
    #[serde(default)]
    pub quality: f64,
    /// Attention weight in [0, 1]
    #[serde(default)]
    pub attention: f64,
    /// Sub-metrics behind the attention weight
    #[serde(default)]
    pub attention_metrics: Option<AttentionMetrics>,
    /// Composite influence in [0.05, 1.0]; drives tier and profile weight
    #[serde(default)]
    pub influence: f64,
    /// Current storage tier
    #[serde(default)]
    pub tier: Tier,

    // ========== Lifecycle ==========
    /// Soft-delete marker; invisible to retrieval and profile updates
    #[serde(default)]
    pub deleted: bool,
    /// When the record was soft-deleted
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deleted_at: Option<DateTime<Utc>>,
    /// When the record entered the store
    pub created_at: DateTime<Utc>,
    /// When the record was last mutated
    pub updated_at: DateTime<Utc>,
    /// Pipeline provenance
    #[serde(default)]
    pub processing: ProcessingMetadata,
}

impl Record {
    /// Age of the record in whole days at `now`, by event time
    pub fn age_days(&self, now: DateTime<Utc>) -> i64 {
        (now - self.timestamp).num_days().max(0)
    }

    /// Highlight and note joined, the text enrichment operates on
    pub fn content_text(&self) -> String {
        let mut text = self.highlight.clone();
        if !self.note.is_empty() {
            if !text.is_empty() {
                text.push(' ');
            }
            text.push_str(&self.note);
        }
        text
    }

    /// Union of user tags and semantic tags
    pub fn all_tags(&self) -> BTreeSet<String> {
        self.tags
            .iter()
            .chain(self.enhanced_tags.iter())
            .cloned()
            .collect()
    }

    /// Stable hash of the content-bearing fields, for the warm index and
    /// change detection on governed updates
    pub fn content_hash(&self) -> String {
        use std::hash::{Hash, Hasher};
        let mut hasher = std::hash::DefaultHasher::new();
        self.highlight.hash(&mut hasher);
        self.note.hash(&mut hasher);
        self.address.hash(&mut hasher);
        self.tags.hash(&mut hasher);
        format!("{:016x}", hasher.finish())
    }

    /// Recompute influence and tier after quality or attention changed
    pub fn reroute(&mut self, policy: &TierPolicy, now: DateTime<Utc>) {
        self.influence = influence_weight(self.quality, self.attention);
        self.tier = tier_for(self.influence, self.age_days(now), policy);
    }

    /// One-line summary used in retrieval results and write previews
    pub fn summary(&self, max_len: usize) -> String {
        let text = if self.highlight.is_empty() {
            &self.note
        } else {
            &self.highlight
        };
        let mut out: String = text.chars().take(max_len).collect();
        if text.chars().count() > max_len {
            out.push('…');
        }
        out
    }
}

// ============================================================================
// INFLUENCE AND TIER (PURE FUNCTIONS)
// ============================================================================

/// Composite influence weight from quality and attention
///
/// `influence = clamp(0.05, 1.0, 0.05 + 0.95·(0.6·quality + 0.4·attention))`
pub fn influence_weight(quality: f64, attention: f64) -> f64 {
    let base = 0.6 * quality.clamp(0.0, 1.0) + 0.4 * attention.clamp(0.0, 1.0);
    (0.05 + 0.95 * base).clamp(0.05, 1.0)
}

/// Tier placement from influence and age
pub fn tier_for(influence: f64, age_days: i64, policy: &TierPolicy) -> Tier {
    if influence > policy.min_influence_hot || age_days < policy.recency_hot_days {
        Tier::Hot
    } else if influence > policy.min_influence_warm || age_days < policy.recency_warm_days {
        Tier::Warm
    } else {
        Tier::Cold
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_record() -> Record {
        let now = Utc::now();
        Record {
            id: "rec-1".into(),
            user_id: "user-1".into(),
            timestamp: now,
            source: "browser_extension".into(),
            highlight: "Rust ownership rules".into(),
            note: "The borrow checker enforces aliasing XOR mutation.".into(),
            address: "https://example.com/rust".into(),
            tags: vec!["rust".into()],
            access: AccessLevel::Private,
            raw: serde_json::json!({}),
            enhanced_tags: vec!["ownership".into()],
            recommended_highlights: vec![],
            semantic: None,
            embedding: None,
            quality: 0.0,
            attention: 0.0,
            attention_metrics: None,
            influence: 0.05,
            tier: Tier::Hot,
            deleted: false,
            deleted_at: None,
            created_at: now,
            updated_at: now,
            processing: ProcessingMetadata::default(),
        }
    }

    #[test]
    fn test_access_level_closed_set() {
        assert_eq!(AccessLevel::parse("private"), Some(AccessLevel::Private));
        assert_eq!(AccessLevel::parse("public"), Some(AccessLevel::Public));
        assert_eq!(AccessLevel::parse("shared"), Some(AccessLevel::Shared));
        assert_eq!(AccessLevel::parse("internal"), None);
        assert_eq!(AccessLevel::parse("Private"), None);
    }

    #[test]
    fn test_influence_bounds() {
        assert!((influence_weight(0.0, 0.0) - 0.05).abs() < 1e-9);
        assert!((influence_weight(1.0, 1.0) - 1.0).abs() < 1e-9);
        // Midpoint: 0.05 + 0.95 * 0.5 = 0.525
        assert!((influence_weight(0.5, 0.5) - 0.525).abs() < 1e-9);
        // Out-of-range inputs are clamped before combining
        assert!((influence_weight(2.0, -1.0) - influence_weight(1.0, 0.0)).abs() < 1e-9);
    }

    #[test]
    fn test_tier_routing() {
        let p = TierPolicy::default();
        assert_eq!(tier_for(0.9, 100, &p), Tier::Hot);
        assert_eq!(tier_for(0.1, 0, &p), Tier::Hot);
        assert_eq!(tier_for(0.5, 100, &p), Tier::Warm);
        assert_eq!(tier_for(0.1, 15, &p), Tier::Warm);
        assert_eq!(tier_for(0.1, 100, &p), Tier::Cold);
        // Boundary: influence exactly at the threshold is not hot
        assert_eq!(tier_for(0.7, 10, &p), Tier::Warm);
        assert_eq!(tier_for(0.3, 40, &p), Tier::Cold);
    }

    #[test]
    fn test_content_hash_tracks_content_fields() {
        let a = sample_record();
        let mut b = sample_record();
        assert_eq!(a.content_hash(), b.content_hash());
        b.note.push_str(" Updated.");
        assert_ne!(a.content_hash(), b.content_hash());
        // Derived fields do not affect the hash
        let mut c = sample_record();
        c.quality = 0.9;
        assert_eq!(a.content_hash(), c.content_hash());
    }

    #[test]
    fn test_all_tags_union() {
        let rec = sample_record();
        let tags = rec.all_tags();
        assert!(tags.contains("rust"));
        assert!(tags.contains("ownership"));
        assert_eq!(tags.len(), 2);
    }

    #[test]
    fn test_summary_truncation() {
        let mut rec = sample_record();
        rec.highlight = "abcdefghij".into();
        assert_eq!(rec.summary(4), "abcd…");
        assert_eq!(rec.summary(20), "abcdefghij");
    }
}
