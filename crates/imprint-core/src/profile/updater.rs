//! Profile updater and rebalancer
//!
//! Applies a batch of intents to a profile. Intents are applied in
//! descending attention order (ties keep arrival order), each one either
//! creating a component or folding into its best match. After every
//! batch the rebalancer restores the weight invariant: normalized
//! weights of live components sum to 1 and priorities follow from them.

use super::{
    merge_strength, Evidence, EvolutionEntry, MatchAction, Matcher, Priority, Profile,
    ProfileComponent,
};
use crate::embeddings::blend;
use crate::intent::Intent;
use chrono::{DateTime, Utc};
use std::collections::BTreeSet;

/// Strengthen accumulation factor
const STRENGTHEN_FACTOR: f64 = 1.2;
/// Confidence added per strengthen, saturating at 1.0
const STRENGTHEN_CONFIDENCE_STEP: f64 = 0.1;
/// Attention share accumulated by a merge
const MERGE_ATTENTION_FACTOR: f64 = 0.8;
/// Embedding blend reduction for merges
const MERGE_BLEND_FACTOR: f64 = 0.5;

/// Archival policy for long-tail low-weight components
#[derive(Debug, Clone, Copy)]
pub struct ArchivePolicy {
    /// Components below this normalized weight are candidates
    pub weight_floor: f64,
    /// Days a component must stay below the floor before archival
    pub after_days: i64,
}

/// Counts of what an update batch did
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UpdateSummary {
    pub intents_processed: usize,
    pub created: usize,
    pub updated: usize,
    pub strengthened: usize,
    pub merged: usize,
}

/// The profile synthesizer
#[derive(Debug, Clone, Copy, Default)]
pub struct Synthesizer {
    matcher: Matcher,
}

impl Synthesizer {
    /// Create a synthesizer
    pub fn new() -> Self {
        Self {
            matcher: Matcher::new(),
        }
    }

    /// Apply a batch of intents, then rebalance and refresh the active set
    pub fn apply(
        &self,
        profile: &mut Profile,
        mut intents: Vec<Intent>,
        now: DateTime<Utc>,
    ) -> UpdateSummary {
        // Descending attention; sort is stable so ties keep arrival order
        intents.sort_by(|a, b| {
            b.attention
                .partial_cmp(&a.attention)
                .unwrap_or(std::cmp::Ordering::Equal)
        });

        let mut summary = UpdateSummary {
            intents_processed: intents.len(),
            ..Default::default()
        };

        for intent in intents {
            let outcome = self.matcher.match_intent(&intent, profile);
            match (outcome.action, outcome.component_id) {
                (MatchAction::Create, _) | (_, None) => {
                    let component = self.create_component(&intent, now);
                    profile.components.insert(component.id.clone(), component);
                    summary.created += 1;
                }
                (action, Some(component_id)) => {
                    let Some(component) = profile.components.get_mut(&component_id) else {
                        continue;
                    };
                    match action {
                        MatchAction::Update => {
                            apply_update(component, &intent, now);
                            summary.updated += 1;
                        }
                        MatchAction::Strengthen => {
                            apply_strengthen(component, &intent, now);
                            summary.strengthened += 1;
                        }
                        MatchAction::Merge => {
                            apply_merge(component, &intent, now);
                            summary.merged += 1;
                        }
                        MatchAction::Create => unreachable!(),
                    }
                }
            }
        }

        self.rebalance(profile);
        profile.recompute_active(now);
        profile.last_updated = now;
        summary
    }

    /// Restore the weight invariant over live components
    ///
    /// Stable: rebalancing twice without new intents changes nothing.
    pub fn rebalance(&self, profile: &mut Profile) {
        let total: f64 = profile
            .components
            .values()
            .filter(|c| !c.archived)
            .map(|c| c.total_attention)
            .sum();

        for component in profile.components.values_mut().filter(|c| !c.archived) {
            component.normalized_weight = if total > 0.0 {
                component.total_attention / total
            } else {
                0.0
            };
            component.priority = Priority::from_weight(component.normalized_weight);
        }
    }

    /// Archive components whose weight stayed below the floor long enough
    ///
    /// Returns the number of components archived. Archived components
    /// keep their evidence; only user-initiated deletion removes them.
    pub fn archive_low_weight(
        &self,
        profile: &mut Profile,
        policy: &ArchivePolicy,
        now: DateTime<Utc>,
    ) -> usize {
        let mut archived = 0;
        for component in profile.components.values_mut().filter(|c| !c.archived) {
            if component.normalized_weight >= policy.weight_floor {
                component.below_floor_since = None;
                continue;
            }
            match component.below_floor_since {
                None => component.below_floor_since = Some(now),
                Some(since) if (now - since).num_days() >= policy.after_days => {
                    component.archived = true;
                    component.updated_at = now;
                    archived += 1;
                    tracing::debug!(
                        component_id = %component.id,
                        user_id = %profile.user_id,
                        "archived long-tail profile component"
                    );
                }
                Some(_) => {}
            }
        }
        if archived > 0 {
            self.rebalance(profile);
            profile.recompute_active(now);
        }
        archived
    }

    fn create_component(&self, intent: &Intent, now: DateTime<Utc>) -> ProfileComponent {
        ProfileComponent {
            id: format!("psp_{}", uuid::Uuid::new_v4()),
            kind: intent.kind,
            description: intent.description.clone(),
            embedding: intent.embedding.clone(),
            confidence: intent.confidence,
            total_attention: intent.attention,
            normalized_weight: 0.0,
            priority: Priority::Low,
            activation_threshold: activation_threshold(intent.attention),
            evidence: vec![evidence(intent, MatchAction::Create)],
            evolution: vec![EvolutionEntry {
                action: MatchAction::Create,
                timestamp: now,
                intent_id: intent.id.clone(),
            }],
            source_apps: BTreeSet::from([intent.source_app.clone()]),
            created_at: now,
            updated_at: now,
            last_activated_at: None,
            archived: false,
            below_floor_since: None,
        }
    }
}

/// Activation threshold: higher attention lowers the bar, inside [0.1, 0.9]
fn activation_threshold(attention: f64) -> f64 {
    (0.5 - 0.3 * (attention - 0.5)).clamp(0.1, 0.9)
}

fn evidence(intent: &Intent, update_kind: MatchAction) -> Evidence {
    Evidence {
        intent_id: intent.id.clone(),
        record_id: intent.record_id.clone(),
        attention: intent.attention,
        timestamp: intent.extracted_at,
        source_app: intent.source_app.clone(),
        update_kind,
    }
}

fn touch(component: &mut ProfileComponent, intent: &Intent, now: DateTime<Utc>, action: MatchAction) {
    component.evidence.push(evidence(intent, action));
    component.evolution.push(EvolutionEntry {
        action,
        timestamp: now,
        intent_id: intent.id.clone(),
    });
    component.source_apps.insert(intent.source_app.clone());
    component.updated_at = now;
}

fn apply_update(component: &mut ProfileComponent, intent: &Intent, now: DateTime<Utc>) {
    let strength = merge_strength(intent.attention);
    blend_embedding(component, intent, strength);
    component.total_attention += intent.attention;
    touch(component, intent, now, MatchAction::Update);
}

fn apply_strengthen(component: &mut ProfileComponent, intent: &Intent, now: DateTime<Utc>) {
    component.total_attention += STRENGTHEN_FACTOR * intent.attention;
    component.confidence = (component.confidence + STRENGTHEN_CONFIDENCE_STEP).min(1.0);
    component.last_activated_at = Some(now);
    touch(component, intent, now, MatchAction::Strengthen);
}

fn apply_merge(component: &mut ProfileComponent, intent: &Intent, now: DateTime<Utc>) {
    let strength = MERGE_BLEND_FACTOR * merge_strength(intent.attention);
    blend_embedding(component, intent, strength);
    component.total_attention += MERGE_ATTENTION_FACTOR * intent.attention;
    touch(component, intent, now, MatchAction::Merge);
}

fn blend_embedding(component: &mut ProfileComponent, intent: &Intent, strength: f64) {
    if let (Some(current), Some(incoming)) = (&component.embedding, &intent.embedding) {
        component.embedding = Some(blend(current, incoming, strength as f32));
    } else if component.embedding.is_none() {
        component.embedding = intent.embedding.clone();
    }
}

// ============================================================================
// TESTS
// ============================================================================
