//! Retrieval core for drafting IEP transition goals.
//!
//! Corpus documents are chunked into overlapping windows, embedded into
//! unit-norm vectors, and indexed for inner-product search. At query time
//! a student's stated interest fans out into three category-targeted
//! queries whose filtered results merge into one deduplicated context
//! bundle for downstream prompt construction. Prompt formatting and the
//! language-model call live outside this crate.

pub mod config;
pub mod corpus;
pub mod embedding;
pub mod index;
pub mod logging;
pub mod retrieval;

pub use config::Settings;
pub use corpus::{Chunk, ChunkId, Chunker, Document, DocumentMeta, SourceCategory};
pub use embedding::{Embedder, EmbeddingError, FastEmbedder, HashedEmbedder};
pub use index::{IndexError, KnowledgeStore, StoreError, VectorDimension, VectorIndex};
pub use retrieval::{ContextBundle, QueryKind, RetrieveError, RetrievedChunk, Retriever};
