//! Result fusion
//!
//! Candidates from every strategy are scored with one fixed linear
//! combination, so ranking does not depend on which strategy surfaced a
//! record:
//!
//! `relevance = 0.30·influence + 0.25·attention + 0.20·quality
//!            + 0.15·recency + 0.10·source_pref`

use dashmap::DashMap;
use std::collections::HashMap;

const W_INFLUENCE: f64 = 0.30;
const W_ATTENTION: f64 = 0.25;
const W_QUALITY: f64 = 0.20;
const W_RECENCY: f64 = 0.15;
const W_SOURCE_PREF: f64 = 0.10;

/// Source preference when the user has no recorded preference
pub const DEFAULT_SOURCE_PREF: f64 = 0.5;

/// Inputs the fusion formula needs per candidate
#[derive(Debug, Clone, Copy)]
pub struct FusionInputs {
    pub influence: f64,
    pub attention: f64,
    pub quality: f64,
    /// Whole days since the record's event time
    pub age_days: i64,
    /// Per-user preference for the record's source
    pub source_pref: f64,
}

/// The fixed fusion formula
pub fn relevance(inputs: &FusionInputs) -> f64 {
    W_INFLUENCE * inputs.influence
        + W_ATTENTION * inputs.attention
        + W_QUALITY * inputs.quality
        + W_RECENCY * recency_score(inputs.age_days)
        + W_SOURCE_PREF * inputs.source_pref
}

/// Exponential recency decay with a floor: `max(0.1, 0.95^age_days)`
pub fn recency_score(age_days: i64) -> f64 {
    0.95_f64.powi(age_days.max(0) as i32).max(0.1)
}

/// Per-user source preference lookup
#[derive(Default)]
pub struct SourcePreferences {
    by_user: DashMap<String, HashMap<String, f64>>,
}

impl SourcePreferences {
    /// Create an empty preference table
    pub fn new() -> Self {
        Self::default()
    }

    /// Preference for `(user, source)`, defaulting to [`DEFAULT_SOURCE_PREF`]
    pub fn get(&self, user_id: &str, source: &str) -> f64 {
        self.by_user
            .get(user_id)
            .and_then(|prefs| prefs.get(source).copied())
            .unwrap_or(DEFAULT_SOURCE_PREF)
    }

    /// Record a preference, clamped to [0, 1]
    pub fn set(&self, user_id: &str, source: &str, preference: f64) {
        self.by_user
            .entry(user_id.to_string())
            .or_default()
            .insert(source.to_string(), preference.clamp(0.0, 1.0));
    }
}

// ============================================================================
// TESTS
// ============================================================================
