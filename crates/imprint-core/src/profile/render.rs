//! Context renderer
//!
//! Projects a profile into the ranked context view downstream apps
//! prepend to their LLM calls. Pure read over an already-loaded profile;
//! callers go through the profile cache.

use super::{ComponentKind, MemoryLayer, Priority, Profile, ProfileComponent};
use crate::embeddings::cosine_similarity;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

const MAX_CORE_INTERESTS: usize = 5;
const MAX_CURRENT_GOALS: usize = 3;
const MAX_LEARNING_PREFERENCES: usize = 3;
const MAX_COMMUNICATION_STYLE: usize = 2;
const MAX_WORK_CONTEXT: usize = 3;
const MAX_HIGH_PRIORITY: usize = 3;
const MAX_RELEVANT: usize = 5;

/// The ranked context view for prompt assembly
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContextView {
    /// Durable interests, heaviest first (≤ 5)
    pub core_interests: Vec<String>,
    /// Active goals, high priority only (≤ 3)
    pub current_goals: Vec<String>,
    /// Learning preferences (≤ 3)
    pub learning_preferences: Vec<String>,
    /// Communication style markers (≤ 2)
    pub communication_style: Vec<String>,
    /// Professional context (≤ 3)
    pub work_context: Vec<String>,
    /// Descriptions of the heaviest high-priority components (≤ 3)
    pub high_priority_focus: Vec<String>,
    /// Active components most relevant to the current request (≤ 5)
    pub relevant_context: Vec<String>,
    /// Size of the active set
    pub active_components_count: usize,
    /// When the profile last changed
    pub last_updated: DateTime<Utc>,
}

/// Render the context view for a profile
///
/// `request_embedding` ranks `relevant_context` by similarity to the
/// current request; without it, recency of update decides.
pub fn render(profile: &Profile, request_embedding: Option<&[f32]>) -> ContextView {
    ContextView {
        core_interests: bucket(
            profile,
            MemoryLayer::Core,
            ComponentKind::CoreInterest,
            false,
            MAX_CORE_INTERESTS,
        ),
        current_goals: bucket(
            profile,
            MemoryLayer::Working,
            ComponentKind::CurrentGoal,
            true,
            MAX_CURRENT_GOALS,
        ),
        learning_preferences: bucket(
            profile,
            MemoryLayer::Learning,
            ComponentKind::LearningPreference,
            false,
            MAX_LEARNING_PREFERENCES,
        ),
        communication_style: bucket(
            profile,
            MemoryLayer::Context,
            ComponentKind::CommunicationStyle,
            false,
            MAX_COMMUNICATION_STYLE,
        ),
        work_context: bucket(
            profile,
            MemoryLayer::Working,
            ComponentKind::WorkContext,
            false,
            MAX_WORK_CONTEXT,
        ),
        high_priority_focus: profile
            .high_priority()
            .into_iter()
            .take(MAX_HIGH_PRIORITY)
            .map(|c| c.description.clone())
            .collect(),
        relevant_context: relevant_context(profile, request_embedding),
        active_components_count: profile.active.len(),
        last_updated: profile.last_updated,
    }
}

/// Render the view as the plain-text personalization preamble
pub fn personalized_prompt(view: &ContextView, question: &str) -> String {
    let mut out = String::from("User profile for personalization:\n");

    let mut section = |title: &str, items: &[String]| {
        if items.is_empty() {
            return;
        }
        out.push_str(title);
        out.push('\n');
        for item in items {
            out.push_str("- ");
            out.push_str(item);
            out.push('\n');
        }
    };

    section("Core interests:", &view.core_interests);
    section("Current goals:", &view.current_goals);
    section("Learning preferences:", &view.learning_preferences);
    section("Communication style:", &view.communication_style);
    section("Work context:", &view.work_context);
    section("Most relevant to this request:", &view.relevant_context);

    if !question.is_empty() {
        out.push_str("\nUser question: ");
        out.push_str(question);
        out.push('\n');
    }
    out
}

/// Components of one kind inside a layer, filtered by priority
fn bucket(
    profile: &Profile,
    layer: MemoryLayer,
    kind: ComponentKind,
    high_only: bool,
    limit: usize,
) -> Vec<String> {
    profile
        .layer_components(layer)
        .into_iter()
        .filter(|c| c.kind == kind)
        .filter(|c| {
            if high_only {
                c.priority == Priority::High
            } else {
                matches!(c.priority, Priority::High | Priority::Medium)
            }
        })
        .take(limit)
        .map(|c| c.description.clone())
        .collect()
}

fn relevant_context(profile: &Profile, request_embedding: Option<&[f32]>) -> Vec<String> {
    let mut active: Vec<&ProfileComponent> = profile
        .active
        .iter()
        .filter_map(|id| profile.components.get(id))
        .filter(|c| !c.archived)
        .collect();

    match request_embedding {
        Some(query) => {
            active.sort_by(|a, b| {
                let sim_a = a
                    .embedding
                    .as_deref()
                    .map(|e| cosine_similarity(query, e))
                    .unwrap_or(0.0);
                let sim_b = b
                    .embedding
                    .as_deref()
                    .map(|e| cosine_similarity(query, e))
                    .unwrap_or(0.0);
                sim_b.partial_cmp(&sim_a).unwrap_or(std::cmp::Ordering::Equal)
            });
        }
        None => {
            active.sort_by(|a, b| b.updated_at.cmp(&a.updated_at));
        }
    }

    active
        .into_iter()
        .take(MAX_RELEVANT)
        .map(|c| c.description.clone())
        .collect()
}

// ============================================================================
// TESTS
// ============================================================================
