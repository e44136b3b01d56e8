//! The knowledge corpus: document records, loading, and chunking.
//!
//! This module provides:
//! - Corpus record types tagged with a source category
//! - JSONL loading with fail-fast validation
//! - Sliding-window chunking with boundary-preferring cuts

pub mod chunker;
pub mod loader;
pub mod types;

pub use chunker::{Chunker, RawChunk};
pub use loader::{CorpusError, corpus_fingerprint, load_corpus};
pub use types::{Chunk, ChunkId, DocId, Document, DocumentMeta, SourceCategory};
