//! Chunk and query embedding.
//!
//! The sentence-embedding backend sits behind the [`Embedder`] trait so
//! the retrieval pipeline can run against the ONNX model in production
//! and a deterministic hashed embedder in tests and offline environments.
//! Every vector leaving this module has unit L2 norm, which is what lets
//! the index score by plain inner product.

pub mod hashed;
pub mod model;

pub use hashed::HashedEmbedder;
pub use model::FastEmbedder;

use thiserror::Error;

use crate::index::VectorDimension;

/// Errors from embedding operations.
#[derive(Debug, Error)]
pub enum EmbeddingError {
    #[error("failed to initialize embedding model: {0}")]
    ModelInit(String),

    #[error("embedding backend failed: {0}")]
    Backend(String),

    #[error("cannot embed empty text")]
    EmptyText,
}

/// Maps text to fixed-dimension unit-norm vectors.
///
/// Batches are processed independently and output order matches input
/// order. Implementations fail fast on empty input rather than returning
/// a degenerate vector.
pub trait Embedder: Send + Sync {
    /// Output width of every vector this embedder produces.
    fn dimension(&self) -> VectorDimension;

    /// Embed a batch of texts.
    fn embed(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>, EmbeddingError>;

    /// Embed a single text.
    fn embed_one(&self, text: &str) -> Result<Vec<f32>, EmbeddingError> {
        let mut vectors = self.embed(&[text])?;
        vectors
            .pop()
            .ok_or_else(|| EmbeddingError::Backend("backend returned no vector".to_string()))
    }
}

/// Scale `v` to unit L2 norm in place. Zero vectors are left untouched.
pub fn normalize(v: &mut [f32]) {
    let norm = v.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm > f32::EPSILON {
        for x in v.iter_mut() {
            *x /= norm;
        }
    }
}
