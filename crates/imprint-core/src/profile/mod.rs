//! Profile module - the Personal System Prompt (PSP)
//!
//! A user's profile is a set of typed, weighted components partitioned
//! into four memory layers. Components are created from unmatched
//! intents, reinforced by matched ones, rebalanced after every update
//! batch, and archived when their weight stays below a configured floor.

mod matcher;
mod render;
mod store;
mod updater;

pub use matcher::{merge_strength, MatchAction, MatchOutcome, Matcher, MATCH_THRESHOLD};
pub use render::{personalized_prompt, render, ContextView};
pub use store::ProfileStore;
pub use updater::{ArchivePolicy, Synthesizer, UpdateSummary};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap};

/// Days after the last update a component still counts as active
pub const ACTIVE_UPDATED_DAYS: i64 = 7;
/// Days after the last activation a component still counts as active
pub const ACTIVE_ACTIVATED_DAYS: i64 = 3;

// ============================================================================
// COMPONENT KIND AND MEMORY LAYERS
// ============================================================================

/// Typed profile component kinds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ComponentKind {
    /// A durable topic the user keeps returning to
    CoreInterest,
    /// Something the user is actively trying to accomplish
    CurrentGoal,
    /// How the user prefers to learn
    LearningPreference,
    /// How the user communicates
    CommunicationStyle,
    /// The user's professional context
    WorkContext,
    /// A value or principle the user holds
    PersonalValue,
}

impl ComponentKind {
    /// Convert to string representation
    pub fn as_str(&self) -> &'static str {
        match self {
            ComponentKind::CoreInterest => "core_interest",
            ComponentKind::CurrentGoal => "current_goal",
            ComponentKind::LearningPreference => "learning_preference",
            ComponentKind::CommunicationStyle => "communication_style",
            ComponentKind::WorkContext => "work_context",
            ComponentKind::PersonalValue => "personal_value",
        }
    }

    /// Parse from string name
    pub fn parse_name(s: &str) -> Option<Self> {
        match s {
            "core_interest" => Some(ComponentKind::CoreInterest),
            "current_goal" => Some(ComponentKind::CurrentGoal),
            "learning_preference" => Some(ComponentKind::LearningPreference),
            "communication_style" => Some(ComponentKind::CommunicationStyle),
            "work_context" => Some(ComponentKind::WorkContext),
            "personal_value" => Some(ComponentKind::PersonalValue),
            _ => None,
        }
    }

    /// Memory layer this kind belongs to
    pub fn layer(&self) -> MemoryLayer {
        match self {
            ComponentKind::CoreInterest | ComponentKind::PersonalValue => MemoryLayer::Core,
            ComponentKind::CurrentGoal | ComponentKind::WorkContext => MemoryLayer::Working,
            ComponentKind::LearningPreference => MemoryLayer::Learning,
            ComponentKind::CommunicationStyle => MemoryLayer::Context,
        }
    }
}

impl std::fmt::Display for ComponentKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// The four memory layers a profile is partitioned into
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MemoryLayer {
    Core,
    Working,
    Learning,
    Context,
}

// ============================================================================
// PRIORITY
// ============================================================================

/// Component priority, a function of normalized weight
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    High,
    Medium,
    #[default]
    Low,
}

impl Priority {
    /// Priority mapping: high above 0.15, medium above 0.08, else low
    pub fn from_weight(normalized_weight: f64) -> Self {
        if normalized_weight > 0.15 {
            Priority::High
        } else if normalized_weight > 0.08 {
            Priority::Medium
        } else {
            Priority::Low
        }
    }

    /// Convert to string representation
    pub fn as_str(&self) -> &'static str {
        match self {
            Priority::High => "high",
            Priority::Medium => "medium",
            Priority::Low => "low",
        }
    }

    /// Parse from string name; unknown names fall back to low
    pub fn parse_name(s: &str) -> Self {
        match s {
            "high" => Priority::High,
            "medium" => Priority::Medium,
            _ => Priority::Low,
        }
    }
}

// ============================================================================
// EVIDENCE AND EVOLUTION
// ============================================================================

/// One append-only evidence entry behind a component
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Evidence {
    /// Intent that contributed
    pub intent_id: String,
    /// Record the intent was derived from
    pub record_id: String,
    /// Attention weight the intent carried
    pub attention: f64,
    /// When the intent was extracted
    pub timestamp: DateTime<Utc>,
    /// Application the record came from
    pub source_app: String,
    /// How the component was touched
    pub update_kind: MatchAction,
}

/// One step in a component's evolution history
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EvolutionEntry {
    /// Action applied
    pub action: MatchAction,
    /// When it happened
    pub timestamp: DateTime<Utc>,
    /// Intent that triggered it
    pub intent_id: String,
}

// ============================================================================
// COMPONENT
// ============================================================================

/// One typed, weighted profile component
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProfileComponent {
    /// Unique id within the user's profile
    pub id: String,
    /// Kind; never changes after creation
    pub kind: ComponentKind,
    /// Human-readable description
    pub description: String,
    /// Component embedding, blended from contributing intents
    #[serde(skip_serializing_if = "Option::is_none")]
    pub embedding: Option<Vec<f32>>,
    /// Confidence in [0, 1]
    pub confidence: f64,
    /// Accumulated attention; never negative
    pub total_attention: f64,
    /// Share of the user's total attention, set by the rebalancer
    pub normalized_weight: f64,
    /// Priority band derived from the normalized weight
    pub priority: Priority,
    /// Activation threshold in [0.1, 0.9]
    pub activation_threshold: f64,
    /// Append-only evidence list
    pub evidence: Vec<Evidence>,
    /// Evolution history
    pub evolution: Vec<EvolutionEntry>,
    /// Applications that contributed
    pub source_apps: BTreeSet<String>,
    /// When the component was created
    pub created_at: DateTime<Utc>,
    /// When the component was last touched
    pub updated_at: DateTime<Utc>,
    /// When the component was last strengthened
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_activated_at: Option<DateTime<Utc>>,
    /// Archived components are invisible to matching and rendering
    #[serde(default)]
    pub archived: bool,
    /// When the normalized weight first fell below the archival floor
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub below_floor_since: Option<DateTime<Utc>>,
}

// ============================================================================
// PROFILE
// ============================================================================

/// A user's full profile
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Profile {
    /// Owner
    pub user_id: String,
    /// All components, archived ones included
    pub components: HashMap<String, ProfileComponent>,
    /// When the profile last changed
    pub last_updated: DateTime<Utc>,
    /// Ids of currently active components
    pub active: Vec<String>,
}

impl Profile {
    /// An empty profile for a user
    pub fn empty(user_id: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            components: HashMap::new(),
            last_updated: Utc::now(),
            active: Vec::new(),
        }
    }

    /// Live (non-archived) components
    pub fn live_components(&self) -> impl Iterator<Item = &ProfileComponent> {
        self.components.values().filter(|c| !c.archived)
    }

    /// Live components in a memory layer
    pub fn layer_components(&self, layer: MemoryLayer) -> Vec<&ProfileComponent> {
        let mut components: Vec<&ProfileComponent> = self
            .live_components()
            .filter(|c| c.kind.layer() == layer)
            .collect();
        components.sort_by(|a, b| {
            b.normalized_weight
                .partial_cmp(&a.normalized_weight)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        components
    }

    /// High-priority live components, heaviest first
    pub fn high_priority(&self) -> Vec<&ProfileComponent> {
        let mut components: Vec<&ProfileComponent> = self
            .live_components()
            .filter(|c| c.priority == Priority::High)
            .collect();
        components.sort_by(|a, b| {
            b.normalized_weight
                .partial_cmp(&a.normalized_weight)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        components
    }

    /// Recompute the active set: high priority, or updated within 7 days,
    /// or activated within 3 days
    pub fn recompute_active(&mut self, now: DateTime<Utc>) {
        let mut active: Vec<String> = self
            .live_components()
            .filter(|c| {
                c.priority == Priority::High
                    || (now - c.updated_at).num_days() < ACTIVE_UPDATED_DAYS
                    || c.last_activated_at
                        .map(|t| (now - t).num_days() < ACTIVE_ACTIVATED_DAYS)
                        .unwrap_or(false)
            })
            .map(|c| c.id.clone())
            .collect();
        active.sort();
        self.active = active;
    }

    /// Sum of live normalized weights; 1.0 when any live component exists
    pub fn total_normalized_weight(&self) -> f64 {
        self.live_components().map(|c| c.normalized_weight).sum()
    }
}

// ============================================================================
// TESTS
// ============================================================================
