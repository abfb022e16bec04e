//! Intent-to-component matcher
//!
//! Finds the best existing component of the intent's kind by cosine
//! similarity and maps the similarity band onto an update action.
//! Components lacking embeddings fall back to description word overlap;
//! when similarity stays indeterminate the intent creates a new
//! component.

use super::{Profile, ProfileComponent};
use crate::embeddings::cosine_similarity;
use crate::intent::Intent;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// Similarity above which an intent matches an existing component
pub const MATCH_THRESHOLD: f64 = 0.7;
/// Similarity above which the match is an update rather than a merge
const UPDATE_THRESHOLD: f64 = 0.8;
/// Similarity above which the match strengthens the component as-is
const STRENGTHEN_THRESHOLD: f64 = 0.9;

/// How a matched intent is applied
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MatchAction {
    /// No sufficient match: new component
    Create,
    /// Similar but different: blend embedding, accumulate attention
    Update,
    /// Near-identical: reinforce weight and confidence
    Strengthen,
    /// Related: fold in with reduced strength
    Merge,
}

impl MatchAction {
    /// Convert to string representation
    pub fn as_str(&self) -> &'static str {
        match self {
            MatchAction::Create => "create",
            MatchAction::Update => "update",
            MatchAction::Strengthen => "strengthen",
            MatchAction::Merge => "merge",
        }
    }
}

/// Outcome of matching one intent against a profile
#[derive(Debug, Clone)]
pub struct MatchOutcome {
    /// Action to apply
    pub action: MatchAction,
    /// Matched component, when the action is not create
    pub component_id: Option<String>,
    /// Best similarity found
    pub similarity: f64,
}

/// Merge strength from attention weight
///
/// Governs how far an update pulls the component embedding toward the
/// intent embedding.
pub fn merge_strength(attention: f64) -> f64 {
    if attention > 0.8 {
        1.0
    } else if attention > 0.6 {
        0.8
    } else if attention > 0.4 {
        0.6
    } else {
        0.3
    }
}

/// The matcher
#[derive(Debug, Clone, Copy, Default)]
pub struct Matcher;

impl Matcher {
    /// Create a matcher
    pub fn new() -> Self {
        Self
    }

    /// Match an intent against the profile's live components of its kind
    pub fn match_intent(&self, intent: &Intent, profile: &Profile) -> MatchOutcome {
        let mut best: Option<(&ProfileComponent, f64)> = None;

        for component in profile
            .live_components()
            .filter(|c| c.kind == intent.kind)
        {
            let Some(similarity) = self.similarity(intent, component) else {
                continue;
            };
            if similarity <= MATCH_THRESHOLD {
                continue;
            }
            match best {
                Some((_, best_sim)) if similarity <= best_sim => {}
                _ => best = Some((component, similarity)),
            }
        }

        match best {
            Some((component, similarity)) => MatchOutcome {
                action: action_for(similarity),
                component_id: Some(component.id.clone()),
                similarity,
            },
            None => MatchOutcome {
                action: MatchAction::Create,
                component_id: None,
                similarity: 0.0,
            },
        }
    }

    /// Cosine over embeddings, else description word overlap, else None
    fn similarity(&self, intent: &Intent, component: &ProfileComponent) -> Option<f64> {
        match (&intent.embedding, &component.embedding) {
            (Some(a), Some(b)) => {
                let sim = cosine_similarity(a, b) as f64;
                Some(sim.max(0.0))
            }
            _ => description_similarity(&intent.description, &component.description),
        }
    }
}

fn action_for(similarity: f64) -> MatchAction {
    if similarity > STRENGTHEN_THRESHOLD {
        MatchAction::Strengthen
    } else if similarity > UPDATE_THRESHOLD {
        MatchAction::Update
    } else {
        MatchAction::Merge
    }
}

/// Jaccard word overlap between descriptions; None when either is empty
fn description_similarity(a: &str, b: &str) -> Option<f64> {
    let words_a: BTreeSet<String> = a.split_whitespace().map(|w| w.to_lowercase()).collect();
    let words_b: BTreeSet<String> = b.split_whitespace().map(|w| w.to_lowercase()).collect();
    if words_a.is_empty() || words_b.is_empty() {
        return None;
    }
    let intersection = words_a.intersection(&words_b).count();
    let union = words_a.union(&words_b).count();
    Some(intersection as f64 / union as f64)
}

// ============================================================================
// TESTS
// ============================================================================
