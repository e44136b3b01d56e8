//! Multi-query retrieval over the knowledge store.
//!
//! A student's stated interest fans out into three category-targeted
//! queries. Each query searches the shared vector index, keeps only hits
//! from its own source category, and the three filtered lists merge into
//! one deduplicated, grouped context bundle for prompt construction.

use std::collections::HashSet;

use serde::Serialize;
use thiserror::Error;

use crate::config::RetrievalConfig;
use crate::corpus::{ChunkId, DocumentMeta, SourceCategory};
use crate::embedding::{Embedder, EmbeddingError};
use crate::index::{KnowledgeStore, ScoredChunk, StoreError};

/// Which sub-corpus a fan-out query targets.
///
/// Each kind carries its query template and its source filter, so the
/// fan-out is one loop over a lookup table rather than three hand-rolled
/// branches.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueryKind {
    Occupation,
    Standard,
    Example,
}

impl QueryKind {
    /// Fixed fan-out order. This is also the concatenation order used for
    /// deduplication, so it decides which category keeps a chunk that
    /// matches more than one query.
    pub const ALL: [QueryKind; 3] = [QueryKind::Occupation, QueryKind::Standard, QueryKind::Example];

    fn template(self) -> &'static str {
        match self {
            QueryKind::Occupation => "occupation duties requirements training for {interest}",
            QueryKind::Standard => "employability skills communication workplace for {interest}",
            QueryKind::Example => "IEP transition goal employment training for {interest}",
        }
    }

    /// Source category this query's results are filtered to.
    pub fn source(self) -> SourceCategory {
        match self {
            QueryKind::Occupation => SourceCategory::Occupation,
            QueryKind::Standard => SourceCategory::Standard,
            QueryKind::Example => SourceCategory::Example,
        }
    }

    /// Render the query text for a student interest.
    pub fn query_text(self, interest: &str) -> String {
        self.template().replace("{interest}", interest)
    }
}

/// One retrieved chunk as handed to prompt construction.
#[derive(Debug, Clone, Serialize)]
pub struct RetrievedChunk {
    pub chunk_id: ChunkId,
    pub doc_id: String,
    pub source: SourceCategory,
    pub score: f32,
    pub text: String,
    pub meta: DocumentMeta,
}

impl From<ScoredChunk> for RetrievedChunk {
    fn from(hit: ScoredChunk) -> Self {
        Self {
            chunk_id: hit.chunk.id,
            doc_id: hit.chunk.doc_id,
            source: hit.chunk.source,
            score: hit.score,
            text: hit.chunk.text,
            meta: hit.chunk.meta,
        }
    }
}

/// The grouped, deduplicated retrieval output.
///
/// Lists keep their intra-category score order; the category order
/// (occupations, standards, examples) is fixed and matches the prompt
/// section order downstream.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ContextBundle {
    pub occupations: Vec<RetrievedChunk>,
    pub standards: Vec<RetrievedChunk>,
    pub examples: Vec<RetrievedChunk>,
}

impl ContextBundle {
    /// Total chunks across all three lists.
    pub fn total(&self) -> usize {
        self.occupations.len() + self.standards.len() + self.examples.len()
    }

    /// True when every list is empty.
    pub fn is_empty(&self) -> bool {
        self.total() == 0
    }

    /// The list for a source category.
    pub fn list(&self, source: SourceCategory) -> &[RetrievedChunk] {
        match source {
            SourceCategory::Occupation => &self.occupations,
            SourceCategory::Standard => &self.standards,
            SourceCategory::Example => &self.examples,
        }
    }

    fn list_mut(&mut self, source: SourceCategory) -> &mut Vec<RetrievedChunk> {
        match source {
            SourceCategory::Occupation => &mut self.occupations,
            SourceCategory::Standard => &mut self.standards,
            SourceCategory::Example => &mut self.examples,
        }
    }
}

/// Errors from retrieval.
#[derive(Debug, Error)]
pub enum RetrieveError {
    #[error("no index is built; run a build before retrieving")]
    IndexNotBuilt,

    #[error("interest text is empty")]
    EmptyInterest,

    #[error("embedding error: {0}")]
    Embedding(#[from] EmbeddingError),

    #[error("store error: {0}")]
    Store(#[from] StoreError),
}

/// Multi-query retriever.
///
/// Holds a read-only borrow of the store and the embedder; it never
/// mutates the index. Construct one per store generation and drop it
/// before rebuilding.
pub struct Retriever<'a> {
    store: &'a KnowledgeStore,
    embedder: &'a dyn Embedder,
    config: RetrievalConfig,
}

impl<'a> Retriever<'a> {
    /// Create a retriever over an opened store.
    pub fn new(
        store: &'a KnowledgeStore,
        embedder: &'a dyn Embedder,
        config: RetrievalConfig,
    ) -> Self {
        Self {
            store,
            embedder,
            config,
        }
    }

    /// Retrieve a context bundle for a student's stated interest.
    ///
    /// A failed sub-query costs its category, not the bundle: the other
    /// categories still return, and the failure is logged. With a built
    /// index and non-empty input this never errors; lists may still come
    /// back empty when filtering removes every hit.
    pub fn retrieve(&self, interest: &str) -> Result<ContextBundle, RetrieveError> {
        let interest = interest.trim();
        if interest.is_empty() {
            return Err(RetrieveError::EmptyInterest);
        }
        if self.store.is_empty() {
            return Err(RetrieveError::IndexNotBuilt);
        }

        // Fan out and concatenate the filtered lists in fixed order.
        let mut merged: Vec<RetrievedChunk> = Vec::new();
        for kind in QueryKind::ALL {
            match self.retrieve_category(kind, interest) {
                Ok(list) => merged.extend(list),
                Err(err) => {
                    tracing::warn!(
                        target: "retrieval",
                        "{} sub-query failed; that category's context will be empty: {err}",
                        kind.source()
                    );
                }
            }
        }

        // Dedup keeps the first occurrence, so the concatenation order
        // above decides which category owns a shared chunk. No
        // re-ranking across categories.
        let mut seen: HashSet<ChunkId> = HashSet::new();
        let mut bundle = ContextBundle::default();
        for chunk in merged {
            if seen.insert(chunk.chunk_id) {
                bundle.list_mut(chunk.source).push(chunk);
            }
        }

        tracing::debug!(
            target: "retrieval",
            "retrieved {} chunks ({} occupation, {} standard, {} example)",
            bundle.total(),
            bundle.occupations.len(),
            bundle.standards.len(),
            bundle.examples.len()
        );
        Ok(bundle)
    }

    fn retrieve_category(
        &self,
        kind: QueryKind,
        interest: &str,
    ) -> Result<Vec<RetrievedChunk>, RetrieveError> {
        let query = kind.query_text(interest);
        let vector = self.embedder.embed_one(&query)?;
        let hits = self.store.search(&vector, self.config.fan_out_k)?;

        Ok(hits
            .into_iter()
            .filter(|hit| hit.chunk.source == kind.source())
            .take(self.config.per_category)
            .map(RetrievedChunk::from)
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn templates_substitute_the_interest() {
        assert_eq!(
            QueryKind::Occupation.query_text("retail sales"),
            "occupation duties requirements training for retail sales"
        );
        assert_eq!(
            QueryKind::Standard.query_text("retail sales"),
            "employability skills communication workplace for retail sales"
        );
        assert_eq!(
            QueryKind::Example.query_text("retail sales"),
            "IEP transition goal employment training for retail sales"
        );
    }

    #[test]
    fn query_kinds_map_to_their_categories() {
        for kind in QueryKind::ALL {
            match kind {
                QueryKind::Occupation => assert_eq!(kind.source(), SourceCategory::Occupation),
                QueryKind::Standard => assert_eq!(kind.source(), SourceCategory::Standard),
                QueryKind::Example => assert_eq!(kind.source(), SourceCategory::Example),
            }
        }
    }

    #[test]
    fn fan_out_order_is_fixed() {
        assert_eq!(
            QueryKind::ALL,
            [QueryKind::Occupation, QueryKind::Standard, QueryKind::Example]
        );
    }
}
