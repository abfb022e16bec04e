//! Local embedding inference
//!
//! fastembed-backed provider behind the `local-embeddings` feature.
//! The model output is truncated to [`EMBEDDING_DIMENSIONS`] and
//! L2-normalized (Matryoshka truncation), so locally-embedded corpora
//! share a dimension with the default provider.

use super::{normalize_in_place, EmbeddingError, EmbeddingProvider, EMBEDDING_DIMENSIONS, MAX_TEXT_LENGTH};
use fastembed::{EmbeddingModel, InitOptions, TextEmbedding};
use std::sync::{Mutex, OnceLock};

static MODEL: OnceLock<Result<Mutex<TextEmbedding>, String>> = OnceLock::new();

fn cache_dir() -> std::path::PathBuf {
    if let Ok(path) = std::env::var("IMPRINT_EMBED_CACHE") {
        return std::path::PathBuf::from(path);
    }
    if let Some(proj_dirs) = directories::ProjectDirs::from("com", "imprint", "core") {
        return proj_dirs.cache_dir().join("fastembed");
    }
    std::path::PathBuf::from(".fastembed_cache")
}

fn get_model() -> Result<std::sync::MutexGuard<'static, TextEmbedding>, EmbeddingError> {
    let result = MODEL.get_or_init(|| {
        let cache = cache_dir();
        if let Err(e) = std::fs::create_dir_all(&cache) {
            tracing::warn!("failed to create embedding cache dir {:?}: {}", cache, e);
        }
        let options = InitOptions::new(EmbeddingModel::NomicEmbedTextV15)
            .with_show_download_progress(false)
            .with_cache_dir(cache);
        TextEmbedding::try_new(options)
            .map(Mutex::new)
            .map_err(|e| format!("failed to initialize embedding model: {e}"))
    });

    match result {
        Ok(model) => model
            .lock()
            .map_err(|e| EmbeddingError::ModelInit(format!("lock poisoned: {e}"))),
        Err(err) => Err(EmbeddingError::ModelInit(err.clone())),
    }
}

/// fastembed-backed local embedding provider
#[derive(Debug, Default)]
pub struct LocalEmbedder {
    _unused: (),
}

impl LocalEmbedder {
    /// Create the provider; the model loads lazily on first use
    pub fn new() -> Self {
        Self::default()
    }

    /// Force model initialization, downloading weights if necessary
    pub fn init(&self) -> Result<(), EmbeddingError> {
        get_model().map(|_| ())
    }
}

impl EmbeddingProvider for LocalEmbedder {
    fn dimensions(&self) -> usize {
        EMBEDDING_DIMENSIONS
    }

    fn embed(&self, text: &str) -> Result<Vec<f32>, EmbeddingError> {
        if text.trim().is_empty() {
            return Err(EmbeddingError::InvalidInput("text cannot be empty".into()));
        }
        let text = if text.len() > MAX_TEXT_LENGTH {
            &text[..MAX_TEXT_LENGTH]
        } else {
            text
        };

        let mut model = get_model()?;
        let embeddings = model
            .embed(vec![text], None)
            .map_err(|e| EmbeddingError::EmbeddingFailed(e.to_string()))?;
        let mut vector = embeddings
            .into_iter()
            .next()
            .ok_or_else(|| EmbeddingError::EmbeddingFailed("no embedding generated".into()))?;

        vector.truncate(EMBEDDING_DIMENSIONS);
        normalize_in_place(&mut vector);
        Ok(vector)
    }

    fn embed_batch(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>, EmbeddingError> {
        if texts.is_empty() {
            return Ok(vec![]);
        }
        let truncated: Vec<&str> = texts
            .iter()
            .map(|t| {
                if t.len() > MAX_TEXT_LENGTH {
                    &t[..MAX_TEXT_LENGTH]
                } else {
                    *t
                }
            })
            .collect();

        let mut model = get_model()?;
        let embeddings = model
            .embed(truncated, None)
            .map_err(|e| EmbeddingError::EmbeddingFailed(e.to_string()))?;

        Ok(embeddings
            .into_iter()
            .map(|mut v| {
                v.truncate(EMBEDDING_DIMENSIONS);
                normalize_in_place(&mut v);
                v
            })
            .collect())
    }

    fn model_name(&self) -> &'static str {
        "nomic-ai/nomic-embed-text-v1.5"
    }
}
