//! The persisted knowledge index.
//!
//! Two halves, written together and verified against each other on open:
//! - A flat inner-product vector index over chunk embeddings
//! - A tantivy metadata table mapping chunk ids to source/text/metadata

pub mod schema;
pub mod store;
pub mod vector;

pub use schema::ChunkSchema;
pub use store::{
    BuildProgress, BuildStats, KnowledgeStore, Manifest, ScoredChunk, StoreError, StoreResult,
    StoreStats,
};
pub use vector::{IndexError, VectorDimension, VectorIndex};
