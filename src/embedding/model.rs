//! Sentence embedding backed by fastembed's ONNX runtime.

use std::sync::Mutex;

use fastembed::{EmbeddingModel, InitOptions, TextEmbedding};

use super::{Embedder, EmbeddingError, normalize};
use crate::index::VectorDimension;

/// Embedder over a pretrained sentence-embedding model.
///
/// The default model is AllMiniLML6V2 (384 dimensions). The model handle
/// needs `&mut self` to run, so it sits behind a `Mutex`; retrieval is
/// single-threaded, so the lock is uncontended.
pub struct FastEmbedder {
    model: Mutex<TextEmbedding>,
    dimension: VectorDimension,
}

impl FastEmbedder {
    /// Load the default model (AllMiniLML6V2, 384 dimensions).
    pub fn new() -> Result<Self, EmbeddingError> {
        Self::with_model(EmbeddingModel::AllMiniLML6V2)
    }

    /// Load a specific fastembed model.
    pub fn with_model(model: EmbeddingModel) -> Result<Self, EmbeddingError> {
        let mut backend =
            TextEmbedding::try_new(InitOptions::new(model).with_show_download_progress(false))
                .map_err(|e| EmbeddingError::ModelInit(e.to_string()))?;

        // Probe once to learn the output dimension.
        let probe = backend
            .embed(vec!["dimension probe"], None)
            .map_err(|e| EmbeddingError::ModelInit(e.to_string()))?;
        let width = probe
            .first()
            .map(Vec::len)
            .ok_or_else(|| EmbeddingError::ModelInit("model returned no probe vector".into()))?;
        let dimension = VectorDimension::new(width)
            .ok_or_else(|| EmbeddingError::ModelInit("model reports zero dimension".into()))?;

        Ok(Self {
            model: Mutex::new(backend),
            dimension,
        })
    }
}

impl Embedder for FastEmbedder {
    fn dimension(&self) -> VectorDimension {
        self.dimension
    }

    fn embed(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>, EmbeddingError> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }
        if texts.iter().any(|t| t.trim().is_empty()) {
            return Err(EmbeddingError::EmptyText);
        }

        let mut vectors = self
            .model
            .lock()
            .map_err(|_| EmbeddingError::Backend("model lock poisoned".to_string()))?
            .embed(texts.to_vec(), None)
            .map_err(|e| EmbeddingError::Backend(e.to_string()))?;

        for vector in &mut vectors {
            if vector.len() != self.dimension.get() {
                return Err(EmbeddingError::Backend(format!(
                    "model returned {} dimensions, expected {}",
                    vector.len(),
                    self.dimension.get()
                )));
            }
            normalize(vector);
        }

        Ok(vectors)
    }
}
