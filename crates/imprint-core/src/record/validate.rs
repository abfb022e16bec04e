//! Record validation and normalization
//!
//! Pure and deterministic: no I/O, no clock reads beyond the caller-supplied
//! `now`. Normalization is idempotent - normalizing an already-normalized
//! record is a no-op.

use super::{AccessLevel, ProcessingMetadata, RawRecord, Record, Tier};
use chrono::{DateTime, Utc};

/// Maximum highlight length in characters
pub const MAX_HIGHLIGHT_CHARS: usize = 10_000;
/// Maximum note length in characters
pub const MAX_NOTE_CHARS: usize = 50_000;

/// Maximum nesting depth accepted for the opaque `raw` map
const MAX_RAW_DEPTH: usize = 8;

/// A single validation failure, reported per item
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ValidationIssue {
    /// Field the issue refers to
    pub field: String,
    /// What is wrong with it
    pub message: String,
}

impl ValidationIssue {
    fn new(field: &str, message: impl Into<String>) -> Self {
        Self {
            field: field.to_string(),
            message: message.into(),
        }
    }
}

impl std::fmt::Display for ValidationIssue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

/// Validates and normalizes raw observation records
#[derive(Debug, Clone, Copy, Default)]
pub struct Validator;

impl Validator {
    /// Create a validator
    pub fn new() -> Self {
        Self
    }

    /// Check a raw record against the schema; empty result means valid
    pub fn validate(&self, raw: &RawRecord) -> Vec<ValidationIssue> {
        let mut issues = Vec::new();

        for (field, value) in [
            ("id", &raw.id),
            ("timestamp", &raw.timestamp),
            ("source", &raw.source),
            ("highlight", &raw.highlight),
            ("note", &raw.note),
            ("address", &raw.address),
            ("access", &raw.access),
        ] {
            if value.is_none() {
                issues.push(ValidationIssue::new(field, "missing required field"));
            }
        }
        if raw.tags.is_none() {
            issues.push(ValidationIssue::new("tags", "missing required field"));
        }
        if !issues.is_empty() {
            return issues;
        }

        if let Some(id) = &raw.id {
            if id.trim().is_empty() {
                issues.push(ValidationIssue::new("id", "must not be empty"));
            }
        }

        if let Some(access) = &raw.access {
            if AccessLevel::parse(access).is_none() {
                issues.push(ValidationIssue::new(
                    "access",
                    format!("invalid access level: {access}"),
                ));
            }
        }

        if let Some(ts) = &raw.timestamp {
            if parse_timestamp(ts).is_none() {
                issues.push(ValidationIssue::new("timestamp", "invalid timestamp format"));
            }
        }

        if let Some(highlight) = &raw.highlight {
            if highlight.chars().count() > MAX_HIGHLIGHT_CHARS {
                issues.push(ValidationIssue::new(
                    "highlight",
                    format!("too long (max {MAX_HIGHLIGHT_CHARS} characters)"),
                ));
            }
        }

        if let Some(note) = &raw.note {
            if note.chars().count() > MAX_NOTE_CHARS {
                issues.push(ValidationIssue::new(
                    "note",
                    format!("too long (max {MAX_NOTE_CHARS} characters)"),
                ));
            }
        }

        if let Some(raw_map) = &raw.raw {
            if !raw_map.is_object() && !raw_map.is_null() {
                issues.push(ValidationIssue::new("raw", "must be a map"));
            } else if json_depth(raw_map) > MAX_RAW_DEPTH {
                issues.push(ValidationIssue::new(
                    "raw",
                    format!("nested deeper than {MAX_RAW_DEPTH} levels"),
                ));
            }
        }

        issues
    }

    /// Turn a validated raw record into the canonical form
    ///
    /// The caller supplies the owner (batch-scoped) and the ingestion time.
    /// Returns the remaining issues when the input was never valid.
    pub fn normalize(
        &self,
        raw: RawRecord,
        user_id: &str,
        now: DateTime<Utc>,
    ) -> Result<Record, Vec<ValidationIssue>> {
        let issues = self.validate(&raw);
        if !issues.is_empty() {
            return Err(issues);
        }

        // validate() guarantees presence of every required field here
        let timestamp = raw
            .timestamp
            .as_deref()
            .and_then(parse_timestamp)
            .ok_or_else(|| vec![ValidationIssue::new("timestamp", "invalid timestamp format")])?;

        let access = raw
            .access
            .as_deref()
            .and_then(AccessLevel::parse)
            .unwrap_or_default();

        let raw_map = match raw.raw {
            Some(v) if v.is_object() => v,
            _ => serde_json::Value::Object(serde_json::Map::new()),
        };

        Ok(Record {
            id: raw.id.unwrap_or_default(),
            user_id: user_id.to_string(),
            timestamp,
            source: raw.source.unwrap_or_default(),
            highlight: raw.highlight.unwrap_or_default(),
            note: raw.note.unwrap_or_default(),
            address: raw.address.unwrap_or_default(),
            tags: normalize_tags(raw.tags.unwrap_or_default()),
            access,
            raw: raw_map,
            enhanced_tags: Vec::new(),
            recommended_highlights: Vec::new(),
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
        })
    }
}

/// Lowercase, trim, drop empties, dedupe; order-independent result
pub fn normalize_tags(tags: Vec<String>) -> Vec<String> {
    let mut out: Vec<String> = tags
        .into_iter()
        .map(|t| t.trim().to_lowercase())
        .filter(|t| !t.is_empty())
        .collect();
    out.sort();
    out.dedup();
    out
}

/// Parse an ISO-8601 timestamp, accepting both `Z` and offset suffixes
fn parse_timestamp(s: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(s)
        .ok()
        .map(|dt| dt.with_timezone(&Utc))
}

fn json_depth(value: &serde_json::Value) -> usize {
    match value {
        serde_json::Value::Object(map) => {
            1 + map.values().map(json_depth).max().unwrap_or(0)
        }
        serde_json::Value::Array(items) => {
            1 + items.iter().map(json_depth).max().unwrap_or(0)
        }
        _ => 0,
    }
}

// ============================================================================
// TESTS
// ============================================================================
