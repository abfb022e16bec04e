//! Governed write path
//!
//! Typed mutation operations over the stored corpus. Every operation
//! supports dry-run, creates a pre-mutation backup snapshot, and reports
//! per-item outcomes. The natural-language surface maps onto these same
//! operations through a tagged intent; no behavioral code runs on
//! untrusted strings.

mod backup;
mod conversational;
mod executor;

pub use backup::{BackupSnapshot, BackupStore};
pub use conversational::{
    ConversationalOutcome, ConversationalWriter, WriteIntent, WriteIntentType,
};
pub use executor::{ImpactEstimate, MutatedRecord, MutationResult, WriteExecutor};

use crate::error::Status;
use crate::record::{AccessLevel, RawRecord};
use crate::store::QueryFilter;
use serde::{Deserialize, Serialize};

// ============================================================================
// OPERATION KINDS
// ============================================================================

/// The closed set of mutation kinds, used for risk scoring and audit
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WriteOpKind {
    Create,
    Update,
    Delete,
    BulkTag,
    BulkRetag,
    BatchUpdate,
    Merge,
    Split,
}

impl WriteOpKind {
    /// Convert to string representation
    pub fn as_str(&self) -> &'static str {
        match self {
            WriteOpKind::Create => "create",
            WriteOpKind::Update => "update",
            WriteOpKind::Delete => "delete",
            WriteOpKind::BulkTag => "bulk_tag",
            WriteOpKind::BulkRetag => "bulk_retag",
            WriteOpKind::BatchUpdate => "batch_update",
            WriteOpKind::Merge => "merge",
            WriteOpKind::Split => "split",
        }
    }

    /// Whether the kind targets many records through a filter
    pub fn is_bulk(&self) -> bool {
        matches!(
            self,
            WriteOpKind::BulkTag | WriteOpKind::BulkRetag | WriteOpKind::BatchUpdate
        )
    }
}

impl std::fmt::Display for WriteOpKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

// ============================================================================
// OPERATIONS
// ============================================================================

/// Patch applied to a record's user-authored fields
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RecordPatch {
    pub highlight: Option<String>,
    pub note: Option<String>,
    pub address: Option<String>,
    pub tags: Option<Vec<String>>,
    pub access: Option<AccessLevel>,
}

impl RecordPatch {
    /// True when the patch touches content-bearing fields
    /// (tag-only and access-only patches do not trigger re-enrichment)
    pub fn touches_content(&self) -> bool {
        self.highlight.is_some() || self.note.is_some() || self.address.is_some()
    }
}

/// Options modifying how an update patch is applied
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct UpdateOptions {
    /// Union the patch tags with existing tags instead of replacing them
    pub merge_tags: bool,
    /// Keep derived fields even when content changed (skips re-enrichment)
    pub preserve_derived: bool,
}

/// Specification for splitting one record into parts
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SplitSpec {
    /// Each part becomes a new record with this note
    pub parts: Vec<String>,
}

/// A governed mutation
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum WriteOp {
    /// Create one record from a draft
    Create { draft: RawRecord },
    /// Patch one record
    Update {
        id: String,
        patch: RecordPatch,
        #[serde(default)]
        options: UpdateOptions,
    },
    /// Delete records; soft by default
    Delete {
        ids: Vec<String>,
        #[serde(default = "default_soft")]
        soft: bool,
    },
    /// Add tags to every record matching the filter
    BulkTag {
        filter: QueryFilter,
        tags: Vec<String>,
    },
    /// Replace user tags on every record matching the filter
    BulkRetag {
        filter: QueryFilter,
        tags: Vec<String>,
    },
    /// Patch every record matching the filter
    BatchUpdate {
        filter: QueryFilter,
        patch: RecordPatch,
    },
    /// Merge records into the first id
    Merge { ids: Vec<String> },
    /// Split one record into parts
    Split { id: String, spec: SplitSpec },
}

fn default_soft() -> bool {
    true
}

impl WriteOp {
    /// The operation kind, for risk scoring and audit
    pub fn kind(&self) -> WriteOpKind {
        match self {
            WriteOp::Create { .. } => WriteOpKind::Create,
            WriteOp::Update { .. } => WriteOpKind::Update,
            WriteOp::Delete { .. } => WriteOpKind::Delete,
            WriteOp::BulkTag { .. } => WriteOpKind::BulkTag,
            WriteOp::BulkRetag { .. } => WriteOpKind::BulkRetag,
            WriteOp::BatchUpdate { .. } => WriteOpKind::BatchUpdate,
            WriteOp::Merge { .. } => WriteOpKind::Merge,
            WriteOp::Split { .. } => WriteOpKind::Split,
        }
    }

    /// True for hard deletes
    pub fn is_hard_delete(&self) -> bool {
        matches!(self, WriteOp::Delete { soft: false, .. })
    }
}

// ============================================================================
// OUTCOMES
// ============================================================================

/// Per-item result of a batched mutation
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ItemOutcome {
    /// Record the item refers to
    pub id: String,
    /// Whether the item applied
    pub success: bool,
    /// Failure detail
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Result of a governed write
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WriteOutcome {
    /// Server-generated operation id
    pub operation_id: String,
    /// Aggregate status
    pub status: Status,
    /// Records actually mutated
    pub affected_count: usize,
    /// Records the operation matched (equals affected for non-dry runs
    /// without per-item failures)
    pub matched_count: usize,
    /// Sample of matched ids, for dry-run previews
    pub sample: Vec<String>,
    /// Per-item outcomes
    pub per_item: Vec<ItemOutcome>,
    /// Operation-level errors
    pub errors: Vec<String>,
    /// Non-fatal warnings (index retries, partial propagation)
    pub warnings: Vec<String>,
    /// Backup snapshot covering the affected records, when one was taken
    #[serde(skip_serializing_if = "Option::is_none")]
    pub backup_id: Option<String>,
    /// Wall-clock processing time
    pub processing_time_ms: u64,
    /// True when no mutation was performed
    pub dry_run: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_op_kind_mapping() {
        let op = WriteOp::Delete {
            ids: vec!["a".into()],
            soft: false,
        };
        assert_eq!(op.kind(), WriteOpKind::Delete);
        assert!(op.is_hard_delete());

        let op = WriteOp::BulkTag {
            filter: QueryFilter::default(),
            tags: vec!["x".into()],
        };
        assert_eq!(op.kind(), WriteOpKind::BulkTag);
        assert!(op.kind().is_bulk());
        assert!(!op.is_hard_delete());
    }

    #[test]
    fn test_delete_defaults_to_soft() {
        let op: WriteOp =
            serde_json::from_str(r#"{"op": "delete", "ids": ["r1"]}"#).expect("parse");
        assert!(matches!(op, WriteOp::Delete { soft: true, .. }));
    }

    #[test]
    fn test_patch_content_detection() {
        let tags_only = RecordPatch {
            tags: Some(vec!["x".into()]),
            ..Default::default()
        };
        assert!(!tags_only.touches_content());

        let note = RecordPatch {
            note: Some("new".into()),
            ..Default::default()
        };
        assert!(note.touches_content());
    }
}
