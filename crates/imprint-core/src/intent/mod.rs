//! Intent extractor
//!
//! Derives zero or more typed intents from a single enriched record.
//! Three rule families: content keywords, behavior signals (attention,
//! address revisits), and context (source kind, sentiment). Deterministic
//! given the record; no I/O.

use crate::profile::ComponentKind;
use crate::record::{Record, Sentiment};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Attention above which a record signals a core interest
const HIGH_ATTENTION_THRESHOLD: f64 = 0.7;

/// Revisit count above which a record signals a goal
const GOAL_REVISIT_THRESHOLD: u32 = 3;

const LEARNING_KEYWORDS: &[&str] = &["learn", "understand", "study", "tutorial", "guide", "how to"];
const WORK_KEYWORDS: &[&str] = &["project", "task", "deadline", "meeting", "work", "job", "career"];

/// A typed signal derived from one record, consumed by the synthesizer
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Intent {
    /// Stable id, derived from the record id and the rule that fired
    pub id: String,
    /// Record this intent came from
    pub record_id: String,
    /// Component kind the intent maps onto
    pub kind: ComponentKind,
    /// Human-readable description
    pub description: String,
    /// Embedding carried over from the record
    #[serde(skip_serializing_if = "Option::is_none")]
    pub embedding: Option<Vec<f32>>,
    /// Rule confidence in [0, 1]
    pub confidence: f64,
    /// Attention weight carried over from the record
    pub attention: f64,
    /// Application the record came from
    pub source_app: String,
    /// Rule-specific context payload
    pub context: serde_json::Value,
    /// Extraction time
    pub extracted_at: DateTime<Utc>,
}

/// Rule-based intent extractor
#[derive(Debug, Clone, Copy, Default)]
pub struct IntentExtractor;

impl IntentExtractor {
    /// Create an extractor
    pub fn new() -> Self {
        Self
    }

    /// Extract intents from an enriched record
    ///
    /// Soft-deleted records yield nothing.
    pub fn extract(&self, record: &Record) -> Vec<Intent> {
        if record.deleted {
            return Vec::new();
        }
        let now = Utc::now();
        let mut intents = Vec::new();
        let content = record.content_text().to_lowercase();

        // Content: learning interest
        if LEARNING_KEYWORDS.iter().any(|k| content.contains(k)) {
            let topics: Vec<&str> = record
                .enhanced_tags
                .iter()
                .take(3)
                .map(String::as_str)
                .collect();
            intents.push(self.intent(
                record,
                "learning",
                ComponentKind::CoreInterest,
                format!("Learning interest in: {}", topics.join(", ")),
                0.8,
                serde_json::json!({
                    "topics": record.enhanced_tags,
                    "contentType": "learning",
                }),
                now,
            ));
        }

        // Content: work context
        if WORK_KEYWORDS.iter().any(|k| content.contains(k)) {
            intents.push(self.intent(
                record,
                "work",
                ComponentKind::WorkContext,
                format!("Work-related activity: {}", truncate(&record.highlight, 100)),
                0.7,
                serde_json::json!({
                    "workArea": record.enhanced_tags,
                    "priority": "medium",
                }),
                now,
            ));
        }

        // Behavior: sustained high attention marks a core interest
        if record.attention > HIGH_ATTENTION_THRESHOLD {
            intents.push(self.intent(
                record,
                "core",
                ComponentKind::CoreInterest,
                format!("High attention on: {}", truncate(&record.highlight, 100)),
                record.attention,
                serde_json::json!({
                    "attentionMetrics": record.attention_metrics,
                    "intensity": "high",
                }),
                now,
            ));
        }

        // Behavior: repeated revisits mark a current goal
        let revisit = record
            .attention_metrics
            .as_ref()
            .map(|m| m.address_revisit)
            .unwrap_or(0);
        if revisit > GOAL_REVISIT_THRESHOLD {
            intents.push(self.intent(
                record,
                "goal",
                ComponentKind::CurrentGoal,
                format!("Persistent goal related to: {}", record.address),
                (revisit as f64 / 10.0).min(1.0),
                serde_json::json!({
                    "revisitCount": revisit,
                    "persistence": "high",
                }),
                now,
            ));
        }

        // Context: conversational sources mark a learning preference
        let source = record.source.to_lowercase();
        if source.contains("chat") {
            let topics = record
                .semantic
                .as_ref()
                .map(|s| s.topics.clone())
                .unwrap_or_default();
            intents.push(self.intent(
                record,
                "learning_style",
                ComponentKind::LearningPreference,
                "AI-assisted learning preference".to_string(),
                0.6,
                serde_json::json!({
                    "interactionType": "ai_chat",
                    "topics": topics,
                }),
                now,
            ));
        }

        // Context: non-neutral sentiment marks a communication style
        if let Some(semantic) = &record.semantic {
            if semantic.sentiment != Sentiment::Neutral {
                let label = match semantic.sentiment {
                    Sentiment::Positive => "positive",
                    Sentiment::Negative => "negative",
                    Sentiment::Neutral => unreachable!(),
                };
                intents.push(self.intent(
                    record,
                    "communication",
                    ComponentKind::CommunicationStyle,
                    format!("Communication style: {label}"),
                    0.5,
                    serde_json::json!({
                        "sentiment": label,
                        "styleIndicator": true,
                    }),
                    now,
                ));
            }
        }

        intents
    }

    #[allow(clippy::too_many_arguments)]
    fn intent(
        &self,
        record: &Record,
        suffix: &str,
        kind: ComponentKind,
        description: String,
        confidence: f64,
        context: serde_json::Value,
        now: DateTime<Utc>,
    ) -> Intent {
        Intent {
            id: format!("intent_{}_{suffix}", record.id),
            record_id: record.id.clone(),
            kind,
            description,
            embedding: record.embedding.clone(),
            confidence: confidence.clamp(0.0, 1.0),
            attention: record.attention,
            source_app: record.source.clone(),
            context,
            extracted_at: now,
        }
    }
}

fn truncate(text: &str, max_chars: usize) -> String {
    text.chars().take(max_chars).collect()
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::attention::AttentionMetrics;
    use crate::record::{AccessLevel, ProcessingMetadata, SemanticSummary, Tier};

    fn base_record() -> Record {
        let now = Utc::now();
        Record {
            id: "rec-1".into(),
            user_id: "u1".into(),
            timestamp: now,
            source: "browser_extension".into(),
            highlight: "plain highlight".into(),
            note: "plain note".into(),
            address: "https://example.com".into(),
            tags: vec![],
            access: AccessLevel::Private,
            raw: serde_json::json!({}),
            enhanced_tags: vec!["ml".into(), "validation".into()],
            recommended_highlights: vec![],
            semantic: Some(SemanticSummary::default()),
            embedding: Some(vec![1.0, 0.0]),
            quality: 0.5,
            attention: 0.3,
            attention_metrics: None,
            influence: 0.5,
            tier: Tier::Hot,
            deleted: false,
            deleted_at: None,
            created_at: now,
            updated_at: now,
            processing: ProcessingMetadata::default(),
        }
    }

    #[test]
    fn test_learning_keywords_emit_core_interest() {
        let mut record = base_record();
        record.note = "I want to learn about cross validation".into();
        let intents = IntentExtractor::new().extract(&record);
        let learning = intents
            .iter()
            .find(|i| i.id.ends_with("_learning"))
            .expect("learning intent");
        assert_eq!(learning.kind, ComponentKind::CoreInterest);
        assert!((learning.confidence - 0.8).abs() < 1e-9);
        assert!(learning.description.contains("ml"));
    }

    #[test]
    fn test_work_keywords_emit_work_context() {
        let mut record = base_record();
        record.highlight = "quarterly project deadline planning".into();
        let intents = IntentExtractor::new().extract(&record);
        assert!(intents
            .iter()
            .any(|i| i.kind == ComponentKind::WorkContext && (i.confidence - 0.7).abs() < 1e-9));
    }

    #[test]
    fn test_high_attention_emits_core_interest() {
        let mut record = base_record();
        record.attention = 0.85;
        let intents = IntentExtractor::new().extract(&record);
        let core = intents
            .iter()
            .find(|i| i.id.ends_with("_core"))
            .expect("core intent");
        assert_eq!(core.kind, ComponentKind::CoreInterest);
        assert!((core.confidence - 0.85).abs() < 1e-9);
    }

    #[test]
    fn test_revisits_emit_goal_with_scaled_confidence() {
        let mut record = base_record();
        record.attention_metrics = Some(AttentionMetrics {
            address_revisit: 4,
            ..Default::default()
        });
        let intents = IntentExtractor::new().extract(&record);
        let goal = intents
            .iter()
            .find(|i| i.kind == ComponentKind::CurrentGoal)
            .expect("goal intent");
        assert!((goal.confidence - 0.4).abs() < 1e-9);
        assert!(goal.description.contains(&record.address));

        // Revisit count below the threshold emits nothing
        record.attention_metrics = Some(AttentionMetrics {
            address_revisit: 3,
            ..Default::default()
        });
        let intents = IntentExtractor::new().extract(&record);
        assert!(!intents.iter().any(|i| i.kind == ComponentKind::CurrentGoal));
    }

    #[test]
    fn test_chat_source_emits_learning_preference() {
        let mut record = base_record();
        record.source = "study_chatbot".into();
        let intents = IntentExtractor::new().extract(&record);
        assert!(intents
            .iter()
            .any(|i| i.kind == ComponentKind::LearningPreference));
    }

    #[test]
    fn test_sentiment_emits_communication_style() {
        let mut record = base_record();
        record.semantic = Some(SemanticSummary {
            sentiment: Sentiment::Positive,
            ..Default::default()
        });
        let intents = IntentExtractor::new().extract(&record);
        let style = intents
            .iter()
            .find(|i| i.kind == ComponentKind::CommunicationStyle)
            .expect("style intent");
        assert!(style.description.contains("positive"));

        record.semantic = Some(SemanticSummary::default());
        let intents = IntentExtractor::new().extract(&record);
        assert!(!intents
            .iter()
            .any(|i| i.kind == ComponentKind::CommunicationStyle));
    }

    #[test]
    fn test_plain_record_emits_nothing() {
        let intents = IntentExtractor::new().extract(&base_record());
        assert!(intents.is_empty());
    }

    #[test]
    fn test_deleted_record_emits_nothing() {
        let mut record = base_record();
        record.attention = 0.9;
        record.deleted = true;
        assert!(IntentExtractor::new().extract(&record).is_empty());
    }

    #[test]
    fn test_deterministic_ids() {
        let mut record = base_record();
        record.note = "trying to understand lifetimes".into();
        let a = IntentExtractor::new().extract(&record);
        let b = IntentExtractor::new().extract(&record);
        let ids_a: Vec<&str> = a.iter().map(|i| i.id.as_str()).collect();
        let ids_b: Vec<&str> = b.iter().map(|i| i.id.as_str()).collect();
        assert_eq!(ids_a, ids_b);
    }
}
