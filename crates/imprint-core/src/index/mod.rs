//! Index layer
//!
//! Multi-strategy retrieval over a user's corpus: semantic k-NN,
//! full-text, high-influence, and recency candidates are unioned and
//! ranked with the fixed fusion formula. Vector and full-text strategies
//! are optional per configuration; when one is disabled or failing the
//! response is flagged degraded and the remaining strategies carry it.

mod fusion;
mod vector;

pub use fusion::{recency_score, relevance, FusionInputs, SourcePreferences, DEFAULT_SOURCE_PREF};
pub use vector::VectorIndex;

use crate::config::EngineConfig;
use crate::embeddings::EmbeddingProvider;
use crate::error::StoreError;
use crate::record::{Record, Tier};
use crate::store::{QueryFilter, TieredStore};
use chrono::{DateTime, Utc};
use lru::LruCache;
use serde::{Deserialize, Serialize};
use std::num::NonZeroUsize;
use std::sync::{Arc, Mutex};

/// Query-embedding cache capacity
const QUERY_CACHE_SIZE: usize = 100;

/// Similarity floor for semantic candidates
const MIN_SEMANTIC_SIMILARITY: f32 = 0.3;

/// Influence floor for the high-influence strategy
const HIGH_INFLUENCE_FLOOR: f64 = 0.7;

/// Retrieval strategies
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Strategy {
    /// k-nearest over embedding vectors
    Semantic,
    /// Token match over highlight (2x) and note
    FullText,
    /// Top records by influence
    HighInfluence,
    /// Records inside the query's time range
    Recent,
}

impl Strategy {
    /// All strategies, in probe order
    pub const ALL: [Strategy; 4] = [
        Strategy::Semantic,
        Strategy::FullText,
        Strategy::HighInfluence,
        Strategy::Recent,
    ];

    /// Name as reported in responses
    pub fn as_str(&self) -> &'static str {
        match self {
            Strategy::Semantic => "semantic",
            Strategy::FullText => "full_text",
            Strategy::HighInfluence => "high_influence",
            Strategy::Recent => "recent",
        }
    }
}

// ============================================================================
// QUERY AND RESULT TYPES
// ============================================================================

/// A retrieval query
#[derive(Debug, Clone, Default)]
pub struct SearchQuery {
    /// Owner of the corpus searched
    pub user_id: String,
    /// Free-text query, used by semantic (via embedding) and full-text
    pub query_text: Option<String>,
    /// Pre-computed query vector; overrides embedding the text
    pub query_vector: Option<Vec<f32>>,
    /// Filter predicates applied to every candidate
    pub filter: QueryFilter,
    /// Maximum results
    pub limit: usize,
    /// Results below this relevance are discarded
    pub min_relevance: f64,
    /// Restrict to a subset of strategies; `None` runs all four
    pub strategies: Option<Vec<Strategy>>,
}

/// Compact metadata shipped with each result
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResultMetadata {
    pub influence: f64,
    pub attention: f64,
    pub quality: f64,
    pub tier: Tier,
    pub source: String,
    pub timestamp: DateTime<Utc>,
    pub tags: Vec<String>,
}

/// One ranked retrieval result
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RankedResult {
    /// Record id
    pub id: String,
    /// Fusion relevance score
    pub relevance: f64,
    /// One-line content summary
    pub content_summary: String,
    /// Record metadata
    pub metadata: ResultMetadata,
}

/// A ranked, possibly degraded, retrieval response
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct SearchResponse {
    /// Results sorted by descending relevance
    pub results: Vec<RankedResult>,
    /// True when strategy 1 or 2 was unavailable for this query
    pub degraded: bool,
    /// Strategies that contributed candidates
    pub strategies_used: Vec<String>,
}

// ============================================================================
// INDEX LAYER
// ============================================================================

/// Vector, full-text, and composite retrieval over the tiered store
pub struct IndexLayer {
    store: Arc<TieredStore>,
    vectors: VectorIndex,
    embedder: Arc<dyn EmbeddingProvider>,
    query_cache: Mutex<LruCache<String, Vec<f32>>>,
    source_prefs: SourcePreferences,
    vector_enabled: bool,
    fulltext_enabled: bool,
}

impl IndexLayer {
    /// Build the index layer and rebuild the vector index from the store
    pub fn new(
        store: Arc<TieredStore>,
        embedder: Arc<dyn EmbeddingProvider>,
        config: &EngineConfig,
    ) -> Result<Self, StoreError> {
        let layer = Self {
            store,
            vectors: VectorIndex::new(),
            embedder,
            query_cache: Mutex::new(LruCache::new(
                NonZeroUsize::new(QUERY_CACHE_SIZE).expect("cache size is non-zero"),
            )),
            source_prefs: SourcePreferences::new(),
            vector_enabled: config.enable_vector_index,
            fulltext_enabled: config.enable_fulltext_index,
        };
        if layer.vector_enabled {
            layer.rebuild()?;
        }
        Ok(layer)
    }

    /// Whether the semantic strategy is configured on
    pub fn vector_enabled(&self) -> bool {
        self.vector_enabled
    }

    /// Per-user source preference table
    pub fn source_preferences(&self) -> &SourcePreferences {
        &self.source_prefs
    }

    /// Reload every stored embedding into the vector index
    pub fn rebuild(&self) -> Result<(), StoreError> {
        for (user_id, id, vector) in self.store.load_embeddings()? {
            if let Err(e) = self.vectors.add(&user_id, &id, vector) {
                tracing::warn!(record_id = %id, "skipping embedding during rebuild: {e}");
            }
        }
        Ok(())
    }

    /// Index (or re-index) one record
    ///
    /// Full-text rows are maintained by the warm store on put; this keeps
    /// the vector side in step.
    pub fn index_record(&self, record: &Record) {
        if !self.vector_enabled {
            return;
        }
        if record.deleted {
            self.vectors.remove(&record.user_id, &record.id);
            return;
        }
        if let Some(vector) = &record.embedding {
            if let Err(e) = self.vectors.add(&record.user_id, &record.id, vector.clone()) {
                tracing::warn!(record_id = %record.id, "vector index update failed: {e}");
            }
        }
    }

    /// Drop a record from the vector index
    pub fn remove_record(&self, user_id: &str, id: &str) {
        self.vectors.remove(user_id, id);
    }

    /// Multi-strategy search with fusion ranking
    pub fn search(&self, query: &SearchQuery) -> Result<SearchResponse, StoreError> {
        let now = Utc::now();
        let wanted: Vec<Strategy> = query
            .strategies
            .clone()
            .unwrap_or_else(|| Strategy::ALL.to_vec());

        let mut candidates: Vec<String> = Vec::new();
        let mut used: Vec<String> = Vec::new();
        let mut degraded = false;
        let overfetch = (query.limit.max(1)) * 2;

        // Strategy 1: semantic
        if wanted.contains(&Strategy::Semantic) {
            if self.vector_enabled {
                match self.query_vector(query) {
                    Some(vector) => {
                        let hits = self.vectors.search(
                            &query.user_id,
                            &vector,
                            overfetch,
                            MIN_SEMANTIC_SIMILARITY,
                        );
                        if !hits.is_empty() {
                            used.push(Strategy::Semantic.as_str().into());
                        }
                        candidates.extend(hits.into_iter().map(|(id, _)| id));
                    }
                    None if query.query_text.is_some() || query.query_vector.is_some() => {
                        degraded = true;
                    }
                    None => {}
                }
            } else if query.query_text.is_some() || query.query_vector.is_some() {
                degraded = true;
            }
        }

        // Strategy 2: full-text
        if wanted.contains(&Strategy::FullText) {
            if let Some(text) = &query.query_text {
                if self.fulltext_enabled {
                    match self.store.fulltext(&query.user_id, text, overfetch) {
                        Ok(hits) => {
                            if !hits.is_empty() {
                                used.push(Strategy::FullText.as_str().into());
                            }
                            candidates.extend(hits.into_iter().map(|(id, _)| id));
                        }
                        Err(e) => {
                            tracing::warn!(user_id = %query.user_id, "full-text strategy failed: {e}");
                            degraded = true;
                        }
                    }
                } else {
                    degraded = true;
                }
            }
        }

        // Strategy 3: high influence
        if wanted.contains(&Strategy::HighInfluence) {
            let filter = QueryFilter {
                user_id: query.user_id.clone(),
                min_influence: Some(
                    query.filter.min_influence.unwrap_or(HIGH_INFLUENCE_FLOOR),
                ),
                sources: query.filter.sources.clone(),
                tags: query.filter.tags.clone(),
                time_range: query.filter.time_range,
                limit: Some(overfetch),
            };
            let hits = self.store.query_by_filter(&filter)?;
            if !hits.is_empty() {
                used.push(Strategy::HighInfluence.as_str().into());
            }
            candidates.extend(hits);
        }

        // Strategy 4: recent
        if wanted.contains(&Strategy::Recent) {
            if let Some((from, to)) = query.filter.time_range {
                let hits = self.store.query_by_time_range(&query.user_id, from, to)?;
                if !hits.is_empty() {
                    used.push(Strategy::Recent.as_str().into());
                }
                candidates.extend(hits.into_iter().take(overfetch));
            }
        }

        candidates.sort();
        candidates.dedup();

        // Score the union with the fusion formula
        let mut results: Vec<RankedResult> = Vec::new();
        for id in candidates {
            let Some(record) = self.store.get(&id, &query.user_id)? else {
                continue;
            };
            if !matches_filter(&record, &query.filter) {
                continue;
            }
            let inputs = FusionInputs {
                influence: record.influence,
                attention: record.attention,
                quality: record.quality,
                age_days: record.age_days(now),
                source_pref: self.source_prefs.get(&query.user_id, &record.source),
            };
            let score = relevance(&inputs);
            if score < query.min_relevance {
                continue;
            }
            results.push(RankedResult {
                id: record.id.clone(),
                relevance: score,
                content_summary: record.summary(120),
                metadata: ResultMetadata {
                    influence: record.influence,
                    attention: record.attention,
                    quality: record.quality,
                    tier: record.tier,
                    source: record.source.clone(),
                    timestamp: record.timestamp,
                    tags: record.tags.clone(),
                },
            });
        }

        // Ties break by influence, then by event time
        results.sort_by(|a, b| {
            b.relevance
                .partial_cmp(&a.relevance)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then(
                    b.metadata
                        .influence
                        .partial_cmp(&a.metadata.influence)
                        .unwrap_or(std::cmp::Ordering::Equal),
                )
                .then(b.metadata.timestamp.cmp(&a.metadata.timestamp))
        });
        results.truncate(query.limit.max(1));

        Ok(SearchResponse {
            results,
            degraded,
            strategies_used: used,
        })
    }

    /// Resolve the query vector: explicit, or embedded text via the cache
    fn query_vector(&self, query: &SearchQuery) -> Option<Vec<f32>> {
        if let Some(vector) = &query.query_vector {
            return Some(vector.clone());
        }
        let text = query.query_text.as_deref()?.trim();
        if text.is_empty() {
            return None;
        }

        if let Ok(mut cache) = self.query_cache.lock() {
            if let Some(vector) = cache.get(text) {
                return Some(vector.clone());
            }
        }
        match self.embedder.embed(text) {
            Ok(vector) => {
                if let Ok(mut cache) = self.query_cache.lock() {
                    cache.put(text.to_string(), vector.clone());
                }
                Some(vector)
            }
            Err(e) => {
                tracing::warn!("query embedding failed: {e}");
                None
            }
        }
    }
}

fn matches_filter(record: &Record, filter: &QueryFilter) -> bool {
    if let Some(min) = filter.min_influence {
        if record.influence < min {
            return false;
        }
    }
    if let Some(sources) = &filter.sources {
        if !sources.is_empty() && !sources.contains(&record.source) {
            return false;
        }
    }
    if let Some(tags) = &filter.tags {
        if !tags.is_empty() {
            let record_tags = record.all_tags();
            if !tags.iter().any(|t| record_tags.contains(t)) {
                return false;
            }
        }
    }
    if let Some((from, to)) = &filter.time_range {
        if record.timestamp < *from || record.timestamp > *to {
            return false;
        }
    }
    true
}

// ============================================================================
// TESTS
// ============================================================================
