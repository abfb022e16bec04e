//! Embeddings
//!
//! The embedding model is an external collaborator; this module pins the
//! contract the core depends on: fixed-dimension vectors, one dimension
//! per user corpus for the corpus lifetime, cosine similarity, and a
//! provider seam. The default provider is a deterministic token-hash
//! projection so the whole pipeline runs without model downloads; the
//! `local-embeddings` feature swaps in fastembed-backed local inference.

#[cfg(feature = "local-embeddings")]
#[cfg_attr(docsrs, doc(cfg(feature = "local-embeddings")))]
pub mod local;

use std::hash::{Hash, Hasher};

/// Embedding dimensions used by the built-in providers
pub const EMBEDDING_DIMENSIONS: usize = 256;

/// Maximum text length fed to a provider (truncated beyond this)
pub const MAX_TEXT_LENGTH: usize = 8192;

// ============================================================================
// ERROR TYPE
// ============================================================================

/// Embedding provider failure
#[non_exhaustive]
#[derive(Debug, Clone, thiserror::Error)]
pub enum EmbeddingError {
    /// Provider could not be initialized
    #[error("model initialization failed: {0}")]
    ModelInit(String),
    /// Provider failed to produce a vector
    #[error("embedding generation failed: {0}")]
    EmbeddingFailed(String),
    /// Empty or otherwise unusable input
    #[error("invalid input: {0}")]
    InvalidInput(String),
    /// Vector dimension differs from the corpus dimension
    #[error("dimension mismatch: expected {expected}, got {got}")]
    DimensionMismatch {
        /// Dimension the corpus was created with
        expected: usize,
        /// Dimension the provider returned
        got: usize,
    },
}

// ============================================================================
// PROVIDER SEAM
// ============================================================================

/// Source of embedding vectors
///
/// Implementations must be deterministic for identical input text within
/// one provider instance, and must always return vectors of
/// [`EmbeddingProvider::dimensions`] length.
pub trait EmbeddingProvider: Send + Sync {
    /// Vector dimension this provider produces
    fn dimensions(&self) -> usize;

    /// Embed a single text
    fn embed(&self, text: &str) -> Result<Vec<f32>, EmbeddingError>;

    /// Embed many texts; default implementation loops
    fn embed_batch(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>, EmbeddingError> {
        texts.iter().map(|t| self.embed(t)).collect()
    }

    /// Identifier recorded alongside stored vectors
    fn model_name(&self) -> &'static str;
}

// ============================================================================
// DEFAULT PROVIDER: TOKEN-HASH PROJECTION
// ============================================================================

/// Deterministic bag-of-tokens feature hashing into a fixed dimension
///
/// Each token is hashed to a bucket and a sign; token counts accumulate
/// and the vector is L2-normalized. Shared vocabulary between two texts
/// yields genuinely higher cosine similarity, which is what the profile
/// matcher and the semantic strategy need from a model-free provider.
#[derive(Debug, Clone)]
pub struct HashProjectionEmbedder {
    dimensions: usize,
}

impl Default for HashProjectionEmbedder {
    fn default() -> Self {
        Self::new(EMBEDDING_DIMENSIONS)
    }
}

impl HashProjectionEmbedder {
    /// Create a provider with the given output dimension
    pub fn new(dimensions: usize) -> Self {
        Self {
            dimensions: dimensions.max(8),
        }
    }
}

impl EmbeddingProvider for HashProjectionEmbedder {
    fn dimensions(&self) -> usize {
        self.dimensions
    }

    fn embed(&self, text: &str) -> Result<Vec<f32>, EmbeddingError> {
        if text.trim().is_empty() {
            return Err(EmbeddingError::InvalidInput("text cannot be empty".into()));
        }
        let text: String = text.chars().take(MAX_TEXT_LENGTH).collect();

        let mut vector = vec![0.0_f32; self.dimensions];
        for token in tokenize(&text) {
            let mut hasher = std::hash::DefaultHasher::new();
            token.hash(&mut hasher);
            let h = hasher.finish();
            let bucket = (h % self.dimensions as u64) as usize;
            let sign = if (h >> 63) == 0 { 1.0 } else { -1.0 };
            vector[bucket] += sign;
        }

        normalize_in_place(&mut vector);
        Ok(vector)
    }

    fn model_name(&self) -> &'static str {
        "imprint/hash-projection-v1"
    }
}

fn tokenize(text: &str) -> impl Iterator<Item = String> + '_ {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|t| t.len() > 1)
        .map(|t| t.to_lowercase())
}

// ============================================================================
// VECTOR OPERATIONS
// ============================================================================

/// Compute cosine similarity between two vectors
#[inline]
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }

    let mut dot = 0.0_f32;
    let mut norm_a = 0.0_f32;
    let mut norm_b = 0.0_f32;
    for (x, y) in a.iter().zip(b.iter()) {
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }

    let denominator = (norm_a * norm_b).sqrt();
    if denominator > 0.0 { dot / denominator } else { 0.0 }
}

/// Weighted mean of two vectors, renormalized to unit length
///
/// `weight` is the share of `b` in the blend, clamped to [0.1, 1.0].
/// Used by the profile updater to fold an intent vector into a component.
pub fn blend(a: &[f32], b: &[f32], weight: f32) -> Vec<f32> {
    if a.is_empty() {
        return b.to_vec();
    }
    if b.is_empty() || a.len() != b.len() {
        return a.to_vec();
    }
    let w = weight.clamp(0.1, 1.0);
    let mut merged: Vec<f32> = a
        .iter()
        .zip(b.iter())
        .map(|(x, y)| x * (1.0 - w) + y * w)
        .collect();
    normalize_in_place(&mut merged);
    merged
}

/// L2-normalize a vector in place; zero vectors are left untouched
pub fn normalize_in_place(vector: &mut [f32]) {
    let norm = vector.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm > 0.0 {
        for x in vector.iter_mut() {
            *x /= norm;
        }
    }
}

/// Serialize a vector to little-endian bytes for blob storage
pub fn to_bytes(vector: &[f32]) -> Vec<u8> {
    vector.iter().flat_map(|f| f.to_le_bytes()).collect()
}

/// Deserialize a vector from little-endian bytes
pub fn from_bytes(bytes: &[u8]) -> Option<Vec<f32>> {
    if bytes.len() % 4 != 0 {
        return None;
    }
    Some(
        bytes
            .chunks_exact(4)
            .map(|c| f32::from_le_bytes([c[0], c[1], c[2], c[3]]))
            .collect(),
    )
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cosine_similarity_identical() {
        let a = vec![1.0, 2.0, 3.0];
        assert!((cosine_similarity(&a, &a) - 1.0).abs() < 1e-4);
    }

    #[test]
    fn test_cosine_similarity_orthogonal() {
        let a = vec![1.0, 0.0, 0.0];
        let b = vec![0.0, 1.0, 0.0];
        assert!(cosine_similarity(&a, &b).abs() < 1e-4);
    }

    #[test]
    fn test_cosine_dimension_mismatch_is_zero() {
        assert_eq!(cosine_similarity(&[1.0], &[1.0, 0.0]), 0.0);
    }

    #[test]
    fn test_hash_embedder_deterministic() {
        let provider = HashProjectionEmbedder::default();
        let a = provider.embed("rust borrow checker ownership").unwrap();
        let b = provider.embed("rust borrow checker ownership").unwrap();
        assert_eq!(a, b);
        assert_eq!(a.len(), EMBEDDING_DIMENSIONS);
    }

    #[test]
    fn test_hash_embedder_similarity_tracks_overlap() {
        let provider = HashProjectionEmbedder::default();
        let base = provider
            .embed("machine learning model validation and cross validation")
            .unwrap();
        let near = provider
            .embed("careful validation of machine learning models")
            .unwrap();
        let far = provider.embed("sourdough hydration baking schedule").unwrap();

        let sim_near = cosine_similarity(&base, &near);
        let sim_far = cosine_similarity(&base, &far);
        assert!(sim_near > sim_far);
        assert!(sim_near > 0.3);
    }

    #[test]
    fn test_hash_embedder_rejects_empty() {
        let provider = HashProjectionEmbedder::default();
        assert!(matches!(
            provider.embed("   "),
            Err(EmbeddingError::InvalidInput(_))
        ));
    }

    #[test]
    fn test_blend_moves_toward_second_vector() {
        let a = vec![1.0, 0.0];
        let b = vec![0.0, 1.0];
        let merged = blend(&a, &b, 0.5);
        assert!((cosine_similarity(&merged, &a) - cosine_similarity(&merged, &b)).abs() < 1e-4);

        let mostly_b = blend(&a, &b, 1.0);
        assert!(cosine_similarity(&mostly_b, &b) > cosine_similarity(&mostly_b, &a));
    }

    #[test]
    fn test_blend_handles_missing_sides() {
        let a = vec![1.0, 0.0];
        assert_eq!(blend(&a, &[], 0.5), a);
        assert_eq!(blend(&[], &a, 0.5), a);
    }

    #[test]
    fn test_bytes_round_trip() {
        let original = vec![1.5_f32, -2.25, 0.0, 3.125];
        let restored = from_bytes(&to_bytes(&original)).unwrap();
        assert_eq!(original, restored);
        assert!(from_bytes(&[1, 2, 3]).is_none());
    }
}
