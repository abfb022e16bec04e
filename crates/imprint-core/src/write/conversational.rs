//! Conversational write surface
//!
//! The natural-language parser lives outside the core; what arrives here
//! is its structured product: a tagged [`WriteIntent`]. The intent is
//! mapped deterministically onto a [`WriteOp`] - no behavioral code ever
//! runs on untrusted strings - and risky intents park in a pending
//! session until the user confirms by session id.

use super::{RecordPatch, SplitSpec, UpdateOptions, WriteOp, WriteOpKind};
use crate::error::EngineError;
use crate::record::{RawRecord, ValidationIssue};
use crate::store::QueryFilter;
use chrono::{DateTime, Duration, Utc};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};

/// Intents below this confidence are bounced back for clarification
const MIN_INTENT_CONFIDENCE: f64 = 0.3;

/// Pending confirmations expire after this many minutes
const SESSION_TTL_MINUTES: i64 = 10;

/// What the conversational intent wants to do
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WriteIntentType {
    CreateRecord,
    UpdateRecord,
    DeleteRecords,
    BulkTag,
    BulkRetag,
    BatchUpdate,
    MergeRecords,
    SplitRecord,
}

impl WriteIntentType {
    /// The operation kind this intent maps to
    pub fn operation_kind(&self) -> WriteOpKind {
        match self {
            WriteIntentType::CreateRecord => WriteOpKind::Create,
            WriteIntentType::UpdateRecord => WriteOpKind::Update,
            WriteIntentType::DeleteRecords => WriteOpKind::Delete,
            WriteIntentType::BulkTag => WriteOpKind::BulkTag,
            WriteIntentType::BulkRetag => WriteOpKind::BulkRetag,
            WriteIntentType::BatchUpdate => WriteOpKind::BatchUpdate,
            WriteIntentType::MergeRecords => WriteOpKind::Merge,
            WriteIntentType::SplitRecord => WriteOpKind::Split,
        }
    }
}

/// The structured intent produced by the external parser
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WriteIntent {
    /// What the user wants to do
    pub intent_type: WriteIntentType,
    /// Operation the intent maps to; must agree with `intent_type`
    pub operation_type: WriteOpKind,
    /// Filter for bulk-style intents
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target_filter: Option<QueryFilter>,
    /// Payload for the mapped operation
    pub operation_data: serde_json::Value,
    /// Parser confidence in [0, 1]
    pub confidence: f64,
    /// Human-readable restatement shown at confirmation
    pub description: String,
}

impl WriteIntent {
    /// Map the intent onto a concrete operation
    pub fn to_op(&self, user_id: &str) -> Result<WriteOp, EngineError> {
        if self.confidence < MIN_INTENT_CONFIDENCE {
            return Err(EngineError::Validation(vec![ValidationIssue {
                field: "confidence".into(),
                message: format!(
                    "intent confidence {:.2} too low; ask the user to rephrase",
                    self.confidence
                ),
            }]));
        }
        if self.operation_type != self.intent_type.operation_kind() {
            return Err(EngineError::Validation(vec![ValidationIssue {
                field: "operationType".into(),
                message: format!(
                    "operation {} does not match intent {:?}",
                    self.operation_type, self.intent_type
                ),
            }]));
        }

        let data = &self.operation_data;
        let op = match self.intent_type {
            WriteIntentType::CreateRecord => WriteOp::Create {
                draft: parse_field::<RawRecord>(data, None)?,
            },
            WriteIntentType::UpdateRecord => WriteOp::Update {
                id: parse_field::<String>(data, Some("id"))?,
                patch: parse_field::<RecordPatch>(data, Some("patch"))?,
                options: parse_optional::<UpdateOptions>(data, "options")?.unwrap_or_default(),
            },
            WriteIntentType::DeleteRecords => WriteOp::Delete {
                ids: parse_field::<Vec<String>>(data, Some("ids"))?,
                soft: parse_optional::<bool>(data, "soft")?.unwrap_or(true),
            },
            WriteIntentType::BulkTag => WriteOp::BulkTag {
                filter: self.scoped_filter(user_id)?,
                tags: parse_field::<Vec<String>>(data, Some("tags"))?,
            },
            WriteIntentType::BulkRetag => WriteOp::BulkRetag {
                filter: self.scoped_filter(user_id)?,
                tags: parse_field::<Vec<String>>(data, Some("tags"))?,
            },
            WriteIntentType::BatchUpdate => WriteOp::BatchUpdate {
                filter: self.scoped_filter(user_id)?,
                patch: parse_field::<RecordPatch>(data, Some("patch"))?,
            },
            WriteIntentType::MergeRecords => WriteOp::Merge {
                ids: parse_field::<Vec<String>>(data, Some("ids"))?,
            },
            WriteIntentType::SplitRecord => WriteOp::Split {
                id: parse_field::<String>(data, Some("id"))?,
                spec: SplitSpec {
                    parts: parse_field::<Vec<String>>(data, Some("parts"))?,
                },
            },
        };
        Ok(op)
    }

    fn scoped_filter(&self, user_id: &str) -> Result<QueryFilter, EngineError> {
        let mut filter = self.target_filter.clone().ok_or_else(|| {
            EngineError::Validation(vec![ValidationIssue {
                field: "targetFilter".into(),
                message: "bulk intents need a target filter".into(),
            }])
        })?;
        filter.user_id = user_id.to_string();
        Ok(filter)
    }
}

fn parse_field<T: serde::de::DeserializeOwned>(
    data: &serde_json::Value,
    key: Option<&str>,
) -> Result<T, EngineError> {
    let value = match key {
        Some(key) => data.get(key).cloned().ok_or_else(|| {
            EngineError::Validation(vec![ValidationIssue {
                field: format!("operationData.{key}"),
                message: "missing field".into(),
            }])
        })?,
        None => data.clone(),
    };
    serde_json::from_value(value).map_err(|e| {
        EngineError::Validation(vec![ValidationIssue {
            field: format!("operationData.{}", key.unwrap_or("")),
            message: e.to_string(),
        }])
    })
}

fn parse_optional<T: serde::de::DeserializeOwned>(
    data: &serde_json::Value,
    key: &str,
) -> Result<Option<T>, EngineError> {
    match data.get(key) {
        None | Some(serde_json::Value::Null) => Ok(None),
        Some(value) => serde_json::from_value(value.clone()).map(Some).map_err(|e| {
            EngineError::Validation(vec![ValidationIssue {
                field: format!("operationData.{key}"),
                message: e.to_string(),
            }])
        }),
    }
}

// ============================================================================
// CONFIRMATION SESSIONS
// ============================================================================

struct PendingWrite {
    user_id: String,
    op: WriteOp,
    description: String,
    created_at: DateTime<Utc>,
}

/// Outcome of proposing a conversational write
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConversationalOutcome {
    /// Set when the operation parked awaiting confirmation
    #[serde(skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,
    /// Whether a confirmation call is required to proceed
    pub needs_confirmation: bool,
    /// Restatement of what will happen
    pub description: String,
}

/// Maps intents to operations and tracks pending confirmations
#[derive(Default)]
pub struct ConversationalWriter {
    pending: DashMap<String, PendingWrite>,
}

impl ConversationalWriter {
    /// Create a writer
    pub fn new() -> Self {
        Self::default()
    }

    /// Map an intent; either hand back the operation for immediate
    /// execution or park it behind a confirmation session
    pub fn propose(
        &self,
        user_id: &str,
        intent: &WriteIntent,
        auto_confirm: bool,
    ) -> Result<(Option<WriteOp>, ConversationalOutcome), EngineError> {
        let op = intent.to_op(user_id)?;

        if auto_confirm {
            return Ok((
                Some(op),
                ConversationalOutcome {
                    session_id: None,
                    needs_confirmation: false,
                    description: intent.description.clone(),
                },
            ));
        }

        let session_id = format!("confirm_{}", uuid::Uuid::new_v4());
        self.pending.insert(
            session_id.clone(),
            PendingWrite {
                user_id: user_id.to_string(),
                op,
                description: intent.description.clone(),
                created_at: Utc::now(),
            },
        );
        Ok((
            None,
            ConversationalOutcome {
                session_id: Some(session_id),
                needs_confirmation: true,
                description: intent.description.clone(),
            },
        ))
    }

    /// Resolve a pending session
    ///
    /// Returns the parked operation when confirmed; `None` when the user
    /// declined (the session is consumed either way).
    pub fn confirm(
        &self,
        session_id: &str,
        confirmed: bool,
    ) -> Result<Option<(String, WriteOp, String)>, EngineError> {
        let (_, pending) = self
            .pending
            .remove(session_id)
            .ok_or_else(|| EngineError::NotFound(format!("confirmation session {session_id}")))?;

        if Utc::now() - pending.created_at > Duration::minutes(SESSION_TTL_MINUTES) {
            return Err(EngineError::NotFound(format!(
                "confirmation session {session_id} expired"
            )));
        }
        if !confirmed {
            return Ok(None);
        }
        Ok(Some((pending.user_id, pending.op, pending.description)))
    }

    /// Drop expired sessions; returns the count removed
    pub fn sweep_expired(&self) -> usize {
        let cutoff = Utc::now() - Duration::minutes(SESSION_TTL_MINUTES);
        let before = self.pending.len();
        self.pending.retain(|_, p| p.created_at >= cutoff);
        before - self.pending.len()
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn bulk_tag_intent(confidence: f64) -> WriteIntent {
        WriteIntent {
            intent_type: WriteIntentType::BulkTag,
            operation_type: WriteOpKind::BulkTag,
            target_filter: Some(QueryFilter {
                tags: Some(vec!["python".into()]),
                ..Default::default()
            }),
            operation_data: serde_json::json!({ "tags": ["programming-language"] }),
            confidence,
            description: "Add tag programming-language to python records".into(),
        }
    }

    #[test]
    fn test_intent_maps_to_operation() {
        let op = bulk_tag_intent(0.9).to_op("u1").expect("map");
        match op {
            WriteOp::BulkTag { filter, tags } => {
                assert_eq!(filter.user_id, "u1", "filter is forced to the caller's user");
                assert_eq!(tags, vec!["programming-language".to_string()]);
            }
            other => panic!("unexpected op: {other:?}"),
        }
    }

    #[test]
    fn test_low_confidence_bounced() {
        let err = bulk_tag_intent(0.2).to_op("u1").unwrap_err();
        assert!(matches!(err, EngineError::Validation(_)));
    }

    #[test]
    fn test_mismatched_operation_type_rejected() {
        let mut intent = bulk_tag_intent(0.9);
        intent.operation_type = WriteOpKind::Delete;
        assert!(intent.to_op("u1").is_err());
    }

    #[test]
    fn test_delete_intent_defaults_soft() {
        let intent = WriteIntent {
            intent_type: WriteIntentType::DeleteRecords,
            operation_type: WriteOpKind::Delete,
            target_filter: None,
            operation_data: serde_json::json!({ "ids": ["r1", "r2"] }),
            confidence: 0.8,
            description: "Delete two records".into(),
        };
        match intent.to_op("u1").expect("map") {
            WriteOp::Delete { ids, soft } => {
                assert_eq!(ids.len(), 2);
                assert!(soft);
            }
            other => panic!("unexpected op: {other:?}"),
        }
    }

    #[test]
    fn test_confirmation_flow() {
        let writer = ConversationalWriter::new();
        let (op, outcome) = writer
            .propose("u1", &bulk_tag_intent(0.9), false)
            .expect("propose");
        assert!(op.is_none());
        assert!(outcome.needs_confirmation);
        let session_id = outcome.session_id.expect("session");

        let confirmed = writer.confirm(&session_id, true).expect("confirm");
        let (user_id, op, _) = confirmed.expect("op");
        assert_eq!(user_id, "u1");
        assert!(matches!(op, WriteOp::BulkTag { .. }));

        // Session is consumed
        assert!(writer.confirm(&session_id, true).is_err());
    }

    #[test]
    fn test_decline_consumes_session() {
        let writer = ConversationalWriter::new();
        let (_, outcome) = writer
            .propose("u1", &bulk_tag_intent(0.9), false)
            .expect("propose");
        let session_id = outcome.session_id.expect("session");

        assert!(writer.confirm(&session_id, false).expect("decline").is_none());
        assert!(writer.confirm(&session_id, true).is_err());
    }

    #[test]
    fn test_auto_confirm_returns_op_directly() {
        let writer = ConversationalWriter::new();
        let (op, outcome) = writer
            .propose("u1", &bulk_tag_intent(0.9), true)
            .expect("propose");
        assert!(op.is_some());
        assert!(!outcome.needs_confirmation);
        assert!(outcome.session_id.is_none());
    }
}
