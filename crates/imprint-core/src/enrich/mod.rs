//! Enrichment pipeline
//!
//! Stages run in a fixed order, each deterministic given its inputs:
//! semantic tags → recommended highlights → semantic summary → embedding
//! → quality score. The pipeline is best-effort: a failing stage is
//! retried once, then recorded on the record's processing metadata, and
//! the record stays ingestible.

mod highlights;
mod quality;
mod semantic;
mod tags;

pub use highlights::{recommend_highlights, MAX_RECOMMENDED};
pub use quality::{NoveltyPolicy, QualityFactors, QualityScorer, SourcePriorNovelty};
pub use semantic::{complexity_of, summarize};
pub use tags::{generate_semantic_tags, MAX_SEMANTIC_TAGS};

use crate::embeddings::{EmbeddingError, EmbeddingProvider};
use crate::record::Record;
use chrono::Utc;
use std::sync::Arc;

/// Stage names as they appear in processing metadata
pub const STAGE_SEMANTIC_TAGS: &str = "semantic_tags";
pub const STAGE_RECOMMENDED_HIGHLIGHTS: &str = "recommended_highlights";
pub const STAGE_SEMANTIC_SUMMARY: &str = "semantic_summary";
pub const STAGE_EMBEDDING: &str = "embedding";
pub const STAGE_QUALITY: &str = "quality_score";

/// Per-user context the pipeline needs
#[derive(Debug, Clone, Default)]
pub struct UserContext {
    /// Owner of the record being enriched
    pub user_id: String,
    /// Embedding dimension the user's corpus was created with, if any.
    /// A provider returning a different dimension fails the embedding
    /// stage instead of splitting the corpus across vector spaces.
    pub corpus_dimensions: Option<usize>,
}

/// What the pipeline did to a record
#[derive(Debug, Clone, Default)]
pub struct EnrichmentOutcome {
    /// Stages that completed
    pub applied: Vec<String>,
    /// Stages that failed after one retry
    pub failed: Vec<String>,
}

impl EnrichmentOutcome {
    /// True when any stage failed
    pub fn is_degraded(&self) -> bool {
        !self.failed.is_empty()
    }
}

/// The enrichment pipeline
pub struct EnrichmentPipeline {
    embedder: Arc<dyn EmbeddingProvider>,
    scorer: QualityScorer,
}

impl EnrichmentPipeline {
    /// Create a pipeline with the default novelty policy
    pub fn new(embedder: Arc<dyn EmbeddingProvider>) -> Self {
        Self {
            embedder,
            scorer: QualityScorer::default(),
        }
    }

    /// Create a pipeline with a custom novelty policy
    pub fn with_novelty(embedder: Arc<dyn EmbeddingProvider>, novelty: Box<dyn NoveltyPolicy>) -> Self {
        Self {
            embedder,
            scorer: QualityScorer::new(novelty),
        }
    }

    /// Dimension of vectors this pipeline produces
    pub fn embedding_dimensions(&self) -> usize {
        self.embedder.dimensions()
    }

    /// Enrich a record in place
    pub fn enrich(&self, record: &mut Record, ctx: &UserContext) -> EnrichmentOutcome {
        let mut outcome = EnrichmentOutcome::default();
        let text = record.content_text();

        record.enhanced_tags = generate_semantic_tags(&text);
        outcome.applied.push(STAGE_SEMANTIC_TAGS.into());

        record.recommended_highlights = recommend_highlights(&record.note);
        outcome.applied.push(STAGE_RECOMMENDED_HIGHLIGHTS.into());

        record.semantic = Some(summarize(&text));
        outcome.applied.push(STAGE_SEMANTIC_SUMMARY.into());

        match self.embed_with_retry(&text, ctx) {
            Ok(vector) => {
                record.embedding = Some(vector);
                outcome.applied.push(STAGE_EMBEDDING.into());
            }
            Err(e) => {
                tracing::warn!(
                    user_id = %ctx.user_id,
                    record_id = %record.id,
                    "embedding stage failed: {e}"
                );
                outcome.failed.push(STAGE_EMBEDDING.into());
            }
        }

        record.quality = self.scorer.score(record);
        outcome.applied.push(STAGE_QUALITY.into());

        record.processing.processed_at = Some(Utc::now());
        record.processing.processor_version = env!("CARGO_PKG_VERSION").to_string();
        record.processing.enhancements_applied = outcome.applied.clone();
        record.processing.failed_stages = outcome.failed.clone();

        outcome
    }

    /// At most one retry per stage
    fn embed_with_retry(&self, text: &str, ctx: &UserContext) -> Result<Vec<f32>, EmbeddingError> {
        let attempt = || -> Result<Vec<f32>, EmbeddingError> {
            let vector = self.embedder.embed(text)?;
            if let Some(expected) = ctx.corpus_dimensions {
                if vector.len() != expected {
                    return Err(EmbeddingError::DimensionMismatch {
                        expected,
                        got: vector.len(),
                    });
                }
            }
            Ok(vector)
        };

        attempt().or_else(|first| match first {
            // Retrying identical invalid input cannot help
            EmbeddingError::InvalidInput(_) | EmbeddingError::DimensionMismatch { .. } => Err(first),
            _ => attempt(),
        })
    }
}

// ============================================================================
// TESTS
// ============================================================================
