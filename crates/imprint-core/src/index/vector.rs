//! Per-user vector index
//!
//! Exact cosine search over each user's corpus. Corpora are per-user and
//! bounded, so a brute-force scan stays inside interactive latency; the
//! index enforces one embedding dimension per user for the lifetime of
//! the corpus.

use crate::embeddings::{cosine_similarity, EmbeddingError};
use dashmap::DashMap;
use std::sync::RwLock;

/// In-memory vector index, keyed by user
#[derive(Default)]
pub struct VectorIndex {
    by_user: DashMap<String, RwLock<Vec<(String, Vec<f32>)>>>,
    dimensions: DashMap<String, usize>,
}

impl VectorIndex {
    /// Create an empty index
    pub fn new() -> Self {
        Self::default()
    }

    /// Add or replace a vector for `(user, id)`
    ///
    /// The first vector a user stores pins the corpus dimension; anything
    /// else is rejected.
    pub fn add(&self, user_id: &str, id: &str, vector: Vec<f32>) -> Result<(), EmbeddingError> {
        if vector.is_empty() {
            return Err(EmbeddingError::InvalidInput("empty vector".into()));
        }
        let expected = *self
            .dimensions
            .entry(user_id.to_string())
            .or_insert(vector.len());
        if vector.len() != expected {
            return Err(EmbeddingError::DimensionMismatch {
                expected,
                got: vector.len(),
            });
        }

        let entries = self.by_user.entry(user_id.to_string()).or_default();
        let Ok(mut entries) = entries.write() else {
            return Ok(());
        };
        if let Some(slot) = entries.iter_mut().find(|(eid, _)| eid == id) {
            slot.1 = vector;
        } else {
            entries.push((id.to_string(), vector));
        }
        Ok(())
    }

    /// Remove a vector
    pub fn remove(&self, user_id: &str, id: &str) {
        if let Some(entries) = self.by_user.get(user_id) {
            if let Ok(mut entries) = entries.write() {
                entries.retain(|(eid, _)| eid != id);
            }
        }
    }

    /// k-nearest by cosine similarity, best first
    pub fn search(
        &self,
        user_id: &str,
        query: &[f32],
        k: usize,
        min_similarity: f32,
    ) -> Vec<(String, f32)> {
        let Some(entries) = self.by_user.get(user_id) else {
            return Vec::new();
        };
        let Ok(entries) = entries.read() else {
            return Vec::new();
        };
        let mut scored: Vec<(String, f32)> = entries
            .iter()
            .map(|(id, vector)| (id.clone(), cosine_similarity(query, vector)))
            .filter(|(_, sim)| *sim >= min_similarity)
            .collect();
        scored.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));
        scored.truncate(k);
        scored
    }

    /// Vectors stored for a user
    pub fn len(&self, user_id: &str) -> usize {
        self.by_user
            .get(user_id)
            .and_then(|e| e.read().map(|v| v.len()).ok())
            .unwrap_or(0)
    }

    /// True when the user has no vectors
    pub fn is_empty(&self, user_id: &str) -> bool {
        self.len(user_id) == 0
    }

    /// The corpus dimension pinned for a user, if any
    pub fn user_dimensions(&self, user_id: &str) -> Option<usize> {
        self.dimensions.get(user_id).map(|d| *d)
    }
}

// ============================================================================
// TESTS
// ============================================================================
