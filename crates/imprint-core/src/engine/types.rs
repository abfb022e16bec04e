//! Engine request and response types

use crate::error::Status;
use crate::index::RankedResult;
use crate::permission::OperationContext;
use crate::profile::{ComponentKind, ContextView, Priority};
use crate::store::QueryFilter;
use crate::write::{WriteIntent, WriteOp, WriteOutcome};
use serde::{Deserialize, Serialize};

/// One failed item in an ingestion batch
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchItemError {
    /// Position of the record in the submitted batch
    pub index: usize,
    /// Record id when the submission carried one
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    /// What went wrong
    pub message: String,
}

/// Result of a batch submission
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchResult {
    /// Aggregate status
    pub status: Status,
    /// Records accepted into the store
    pub processed_count: usize,
    /// Per-item failures; the rest of the batch still applies
    pub errors: Vec<BatchItemError>,
    /// True when any accepted record was only partially enriched
    pub degraded: bool,
}

/// Request for a profile context view
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContextRequest {
    /// Profile owner
    pub user_id: String,
    /// Current request text, used to rank relevant context
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub current_request: Option<String>,
    /// Include the per-component breakdown
    #[serde(default)]
    pub include_details: bool,
}

/// One component in the detailed context response
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ComponentSummary {
    pub id: String,
    pub kind: ComponentKind,
    pub description: String,
    pub normalized_weight: f64,
    pub priority: Priority,
    pub confidence: f64,
    pub evidence_count: usize,
}

/// Context view plus optional component details
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContextResponse {
    /// The rendered view
    #[serde(flatten)]
    pub view: ContextView,
    /// Per-component breakdown when requested
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<Vec<ComponentSummary>>,
}

/// Retrieval request
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase", default)]
pub struct SearchRequest {
    /// Corpus owner
    pub user_id: String,
    /// Free-text query
    pub query_text: Option<String>,
    /// Pre-computed query vector
    pub query_vector: Option<Vec<f32>>,
    /// Filter predicates
    pub filters: QueryFilter,
    /// Maximum results (capped at 50)
    pub limit: usize,
    /// Relevance floor; engine default when absent
    pub min_relevance_score: Option<f64>,
    /// Per-request deadline in milliseconds
    pub deadline_ms: Option<u64>,
}

/// Personalized enhancement response
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EnhancementResponse {
    /// Plain-text rendering of the profile view, tailored to the question
    pub personalized_prompt: String,
    /// Ranked retrieval results supporting the question
    pub knowledge_components: Vec<RankedResult>,
    /// One-line profile summary
    pub psp_summary: String,
}

/// Governed write request
#[derive(Debug, Clone)]
pub struct WriteRequest {
    /// Operator / profile owner
    pub user_id: String,
    /// The mutation
    pub op: WriteOp,
    /// Why the operator is doing this (carried into audit context)
    pub intent_description: String,
    /// Report impact without mutating
    pub dry_run: bool,
    /// Bulk commit batch size; engine default when absent
    pub batch_size: Option<usize>,
    /// Deadline in milliseconds; bulk work stops at the next batch
    /// checkpoint once it expires
    pub deadline_ms: Option<u64>,
    /// Session context from the transport
    pub context: OperationContext,
}

/// Conversational write request
#[derive(Debug, Clone)]
pub struct ConversationalWriteRequest {
    /// Operator / profile owner
    pub user_id: String,
    /// Structured intent from the external parser
    pub intent: WriteIntent,
    /// Preview the impact before confirming
    pub dry_run: bool,
    /// Skip the confirmation round-trip
    pub auto_confirm: bool,
    /// Session context from the transport
    pub context: OperationContext,
}

/// Conversational write response
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConversationalWriteResponse {
    /// Confirmation session to reference, when one was created
    #[serde(skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,
    /// Whether a confirmation call must follow
    pub needs_confirmation: bool,
    /// Restatement of what will happen
    pub description: String,
    /// Outcome of the executed or previewed operation
    #[serde(skip_serializing_if = "Option::is_none")]
    pub preview: Option<WriteOutcome>,
}
