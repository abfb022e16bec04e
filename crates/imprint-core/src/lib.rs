//! # Imprint Core
//!
//! Personalization middleware core. Applications submit small structured
//! observation records; the engine refines them, scores how strongly each
//! should shape the user's profile, stores them in a tiered knowledge
//! store, and continuously synthesizes a compact **Personal System
//! Prompt** (PSP) that downstream apps prepend to their LLM calls.
//!
//! The pipeline, end to end:
//!
//! - **Validation & normalization**: canonical record schema with hard
//!   invariants (stable ids, immutable ownership, normalized tags)
//! - **Enrichment**: semantic tags, recommended highlights, semantic
//!   summary, embedding, five-factor quality score
//! - **Attention scoring**: per-user recency/repetition/depth signals over
//!   a 30-day history window
//! - **Tiered storage**: hot (in-process, influence-ranked), warm
//!   (SQLite + FTS5), cold (gzip date shards), routed by influence and age
//! - **Multi-strategy retrieval**: semantic, full-text, high-influence,
//!   and recency candidates fused with one fixed relevance formula
//! - **Profile synthesis**: typed intents matched into weighted components
//!   across four memory layers, rebalanced after every batch
//! - **Governed writes**: dry-run, pre-mutation backups, risk-scored
//!   authorization, and an append-only audit log
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use imprint_core::{Engine, EngineConfig, RawRecord};
//!
//! let engine = Engine::new(EngineConfig::default())?;
//!
//! // Ingest a batch of observations
//! let result = engine
//!     .submit_batch("browser_extension", "user-1", records, None)
//!     .await?;
//!
//! // Fetch the profile context for prompt assembly
//! let context = engine
//!     .get_context(ContextRequest {
//!         user_id: "user-1".into(),
//!         current_request: Some("explain cross-validation".into()),
//!         include_details: false,
//!     })
//!     .await?;
//! ```
//!
//! ## Feature Flags
//!
//! - `bundled-sqlite` (default): bundle SQLite into the binary
//! - `local-embeddings`: fastembed-backed local embedding inference;
//!   without it a deterministic hash-projection provider is used

#![cfg_attr(docsrs, feature(doc_cfg))]
#![warn(rustdoc::missing_crate_level_docs)]

// ============================================================================
// MODULES
// ============================================================================

pub mod attention;
pub mod config;
pub mod embeddings;
pub mod engine;
pub mod enrich;
pub mod error;
pub mod index;
pub mod intent;
pub mod permission;
pub mod profile;
pub mod record;
pub mod store;
pub mod write;

// ============================================================================
// PUBLIC API RE-EXPORTS
// ============================================================================

// Engine facade
pub use engine::{
    BatchItemError, BatchResult, ComponentSummary, ContextRequest, ContextResponse,
    ConversationalWriteRequest, ConversationalWriteResponse, EnhancementResponse, Engine,
    SearchRequest, WriteRequest, MAX_BATCH_RECORDS, MAX_SEARCH_LIMIT,
};

// Configuration and errors
pub use config::{EngineConfig, TierPolicy};
pub use error::{EngineError, Result, Status, StoreError};

// Record schema
pub use record::{
    influence_weight, tier_for, AccessLevel, Complexity, ProcessingMetadata, RawRecord, Record,
    SemanticSummary, Sentiment, Tier, ValidationIssue, Validator,
};

// Enrichment and scoring
pub use attention::{AttentionMetrics, AttentionScorer, HistoryEntry, InteractionDepth};
pub use enrich::{
    EnrichmentOutcome, EnrichmentPipeline, NoveltyPolicy, QualityScorer, SourcePriorNovelty,
    UserContext,
};

// Embeddings
pub use embeddings::{
    cosine_similarity, EmbeddingError, EmbeddingProvider, HashProjectionEmbedder,
    EMBEDDING_DIMENSIONS,
};

// Storage and retrieval
pub use index::{
    IndexLayer, RankedResult, ResultMetadata, SearchQuery, SearchResponse, SourcePreferences,
    Strategy,
};
pub use store::{Database, MigrationReport, QueryFilter, StoreMetrics, TieredStore};

// Profile synthesis
pub use intent::{Intent, IntentExtractor};
pub use profile::{
    merge_strength, ComponentKind, ContextView, Evidence, MatchAction, Matcher, MemoryLayer,
    Priority, Profile, ProfileComponent, ProfileStore, Synthesizer,
};

// Governed writes and permissions
pub use permission::{
    AuditEntry, AuditLog, Authorizer, OperationContext, PermissionLevel, PermissionProfile,
    RiskLevel,
};
pub use write::{
    BackupSnapshot, BackupStore, ImpactEstimate, RecordPatch, SplitSpec, UpdateOptions,
    WriteExecutor, WriteIntent, WriteIntentType, WriteOp, WriteOpKind, WriteOutcome,
};

// ============================================================================
// VERSION INFO
// ============================================================================

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

// ============================================================================
// PRELUDE
// ============================================================================

/// Convenient imports for common usage
pub mod prelude {
    pub use crate::{
        AccessLevel, BatchResult, ComponentKind, ContextRequest, ContextView, Engine,
        EngineConfig, EngineError, Priority, Profile, QueryFilter, RankedResult, RawRecord,
        Record, Result, SearchRequest, Status, Tier, WriteOp, WriteOutcome, WriteRequest,
    };

    pub use crate::{EmbeddingProvider, HashProjectionEmbedder};
    pub use crate::{OperationContext, PermissionLevel, PermissionProfile};
}
