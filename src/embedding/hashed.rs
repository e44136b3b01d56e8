//! Deterministic hashed bag-of-words embedder.

use std::hash::Hasher;

use twox_hash::XxHash64;

use super::{Embedder, EmbeddingError, normalize};
use crate::index::VectorDimension;

/// Embedder that folds token hashes into a fixed-width vector.
///
/// No model download, no I/O. Retrieval quality is crude next to a real
/// sentence model, but the output is fully deterministic, which is what
/// offline environments and the test suite need. Each lowercased token
/// adds ±1 to a hash-chosen slot; the result is L2-normalized, so two
/// texts score by the weighted count of shared tokens.
pub struct HashedEmbedder {
    dimension: VectorDimension,
}

impl HashedEmbedder {
    /// Create a hashed embedder with the given output width.
    pub fn new(dimension: VectorDimension) -> Self {
        Self { dimension }
    }

    fn embed_text(&self, text: &str) -> Result<Vec<f32>, EmbeddingError> {
        if text.trim().is_empty() {
            return Err(EmbeddingError::EmptyText);
        }

        let mut vector = vec![0f32; self.dimension.get()];
        for token in text.split_whitespace() {
            let token = token.trim_matches(|c: char| !c.is_alphanumeric());
            if token.is_empty() {
                continue;
            }
            let lowered = token.to_lowercase();

            let mut hasher = XxHash64::with_seed(0);
            hasher.write(lowered.as_bytes());
            let hash = hasher.finish();

            let slot = (hash as usize) % vector.len();
            let sign = if hash & (1 << 63) == 0 { 1.0 } else { -1.0 };
            vector[slot] += sign;
        }

        if vector.iter().all(|x| *x == 0.0) {
            return Err(EmbeddingError::Backend(
                "text contains no hashable tokens".to_string(),
            ));
        }
        normalize(&mut vector);
        Ok(vector)
    }
}

impl Embedder for HashedEmbedder {
    fn dimension(&self) -> VectorDimension {
        self.dimension
    }

    fn embed(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>, EmbeddingError> {
        texts.iter().map(|text| self.embed_text(text)).collect()
    }
}
