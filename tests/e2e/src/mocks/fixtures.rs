//! Observation fixtures
//!
//! Realistic raw records for journey tests. Timestamps default to now;
//! `days_ago` shifts the event time for history-sensitive scenarios.

use chrono::{Duration, Utc};
use imprint_core::RawRecord;

/// A generic observation
pub fn observation(id: &str, highlight: &str, note: &str, tags: &[&str]) -> RawRecord {
    RawRecord {
        id: Some(id.to_string()),
        timestamp: Some(Utc::now().to_rfc3339()),
        source: Some("browser_extension".into()),
        highlight: Some(highlight.to_string()),
        note: Some(note.to_string()),
        address: Some(format!("https://example.com/{id}")),
        tags: Some(tags.iter().map(|t| t.to_string()).collect()),
        access: Some("private".into()),
        raw: None,
    }
}

/// The canonical single-learning-note scenario record
pub fn learning_note(id: &str) -> RawRecord {
    observation(
        id,
        "Machine learning models require careful validation",
        "Cross-validation is the key process to learn here because it explains how well a \
         model generalizes: 1. split the data into folds, 2. train on most folds, 3. validate \
         on the held-out fold. This is important for small datasets and significant for \
         honest model selection.",
        &["ml", "validation"],
    )
}

/// A series of visits to the same address spread over `span_days`
pub fn revisit_series(count: usize, address: &str, span_days: i64) -> Vec<RawRecord> {
    (0..count)
        .map(|i| {
            let days_back = span_days - (i as i64 * span_days / count.max(1) as i64);
            let ts = Utc::now() - Duration::days(days_back.max(0));
            RawRecord {
                id: Some(format!("visit-{i}")),
                timestamp: Some(ts.to_rfc3339()),
                source: Some("browser_extension".into()),
                highlight: Some("Reading the async runtime internals guide".into()),
                note: Some(format!(
                    "Visit {i}: working through how to understand the scheduler section."
                )),
                address: Some(address.to_string()),
                tags: Some(vec!["rust".into(), "async".into()]),
                access: Some("private".into()),
                raw: None,
            }
        })
        .collect()
}
