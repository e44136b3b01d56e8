//! Knowledge store: chunk metadata in tantivy beside the vector index.
//!
//! The store owns both halves of the persisted knowledge base: a tantivy
//! index holding one metadata row per chunk, and the flat vector index
//! holding the chunk embeddings. Both are written together at build time
//! and cross-checked at open time so the retrieval layer can never hand
//! out a hit whose chunk is missing from the metadata table.

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tantivy::collector::{Count, TopDocs};
use tantivy::directory::MmapDirectory;
use tantivy::directory::error::OpenDirectoryError;
use tantivy::query::{AllQuery, TermQuery};
use tantivy::schema::{IndexRecordOption, Value};
use tantivy::{Index, IndexReader, IndexSettings, IndexWriter, ReloadPolicy, TantivyDocument, Term};
use thiserror::Error;

use super::schema::ChunkSchema;
use super::vector::{IndexError, VectorIndex};
use crate::corpus::{Chunk, ChunkId, Chunker, Document, DocumentMeta, SourceCategory};
use crate::embedding::{Embedder, EmbeddingError};

/// File holding the vector index blob.
const VECTORS_FILE: &str = "vectors.bin";

/// Directory holding the tantivy metadata table.
const CHUNKS_DIR: &str = "chunks";

/// File holding the build manifest.
const MANIFEST_FILE: &str = "manifest.json";

/// Bump when the manifest layout changes.
const MANIFEST_VERSION: u32 = 1;

/// Chunks embedded per backend call. Smaller batches reduce memory
/// pressure and give smoother progress reporting.
const EMBEDDING_BATCH_SIZE: usize = 64;

/// Tantivy writer heap.
const WRITER_HEAP_BYTES: usize = 50_000_000;

/// Upper bound when enumerating metadata rows; far above any real corpus.
const METADATA_SCAN_LIMIT: usize = 100_000;

/// Errors from knowledge store operations.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("tantivy error: {0}")]
    Tantivy(#[from] tantivy::TantivyError),

    #[error("directory error: {0}")]
    Directory(#[from] OpenDirectoryError),

    #[error("vector index error: {0}")]
    Index(#[from] IndexError),

    #[error("embedding error: {0}")]
    Embedding(#[from] EmbeddingError),

    #[error("serialization error: {0}")]
    Serialize(#[from] serde_json::Error),

    #[error("no index found at {0}; run a build first")]
    Missing(String),

    #[error("index metadata mismatch: {0}")]
    MetadataMismatch(String),
}

/// Result type for knowledge store operations.
pub type StoreResult<T> = Result<T, StoreError>;

/// Progress updates during an index build.
#[derive(Debug, Clone)]
pub enum BuildProgress<'a> {
    /// Chunking a corpus document.
    ChunkingDocument {
        current: usize,
        total: usize,
        doc_id: &'a str,
    },
    /// Embedding chunk batches.
    EmbeddingChunks { current: usize, total: usize },
}

/// Statistics from a build.
#[derive(Debug, Clone, Default, Serialize)]
pub struct BuildStats {
    /// Corpus documents processed.
    pub documents: usize,
    /// Chunks embedded and indexed.
    pub chunks: usize,
    /// Chunks dropped because the embedder rejected them.
    pub chunks_skipped: usize,
}

/// Manifest persisted beside the index and verified on open.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Manifest {
    pub format_version: u32,
    pub dimension: usize,
    pub chunk_count: usize,
    pub model: String,
    pub corpus_fingerprint: String,
}

/// A search hit joined with its metadata row.
#[derive(Debug, Clone)]
pub struct ScoredChunk {
    pub chunk: Chunk,
    pub score: f32,
}

/// Aggregate statistics for the `stats` command.
#[derive(Debug, Clone, Serialize)]
pub struct StoreStats {
    pub chunk_count: usize,
    pub dimension: usize,
    pub model: String,
    pub occupation_chunks: usize,
    pub standard_chunks: usize,
    pub example_chunks: usize,
}

/// The persisted knowledge base: chunk metadata plus chunk vectors.
///
/// Exactly one store is live at a time; retrieval borrows it read-only.
/// Rebuilding produces a fresh store that replaces the old one wholesale.
pub struct KnowledgeStore {
    base_path: PathBuf,
    reader: IndexReader,
    schema: ChunkSchema,
    vectors: VectorIndex,
    manifest: Manifest,
}

impl std::fmt::Debug for KnowledgeStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KnowledgeStore")
            .field("base_path", &self.base_path)
            .field("chunk_count", &self.vectors.len())
            .field("dimension", &self.vectors.dimension().get())
            .finish()
    }
}

impl KnowledgeStore {
    /// Build a fresh store from corpus documents, replacing any index at
    /// `base_path`. Nothing is written until the in-memory build has
    /// succeeded, and the manifest is written last, so a failed build
    /// never leaves an openable partial index behind.
    ///
    /// An empty corpus builds an empty store; retrieval against it fails
    /// with `IndexNotBuilt` until a real corpus is indexed.
    pub fn build<F>(
        base_path: impl AsRef<Path>,
        documents: &[Document],
        chunker: &Chunker,
        embedder: &dyn Embedder,
        model_name: &str,
        corpus_fingerprint: String,
        mut on_progress: F,
    ) -> StoreResult<(Self, BuildStats)>
    where
        F: FnMut(BuildProgress<'_>),
    {
        // Phase 1: chunk every document, allocating sequential chunk ids.
        let mut chunks: Vec<Chunk> = Vec::new();
        let mut next_id = 1u32;
        let total_documents = documents.len();

        for (idx, document) in documents.iter().enumerate() {
            on_progress(BuildProgress::ChunkingDocument {
                current: idx + 1,
                total: total_documents,
                doc_id: &document.id,
            });

            for (seq, raw) in chunker.chunk(&document.text).into_iter().enumerate() {
                let id = ChunkId::from_u32(next_id).expect("chunk ids are allocated from 1");
                next_id += 1;
                chunks.push(Chunk {
                    id,
                    doc_id: document.id.clone(),
                    source: document.source(),
                    meta: document.meta.clone(),
                    seq,
                    char_range: raw.char_range,
                    text: raw.text,
                });
            }
        }

        // Phase 2: embed in batches. A failed batch is retried item by
        // item so one bad chunk costs itself, not the whole build.
        let mut entries: Vec<(ChunkId, Vec<f32>)> = Vec::with_capacity(chunks.len());
        let mut skipped: HashSet<ChunkId> = HashSet::new();
        let total_chunks = chunks.len();
        let mut processed = 0;

        for batch in chunks.chunks(EMBEDDING_BATCH_SIZE) {
            let texts: Vec<&str> = batch.iter().map(|c| c.text.as_str()).collect();
            match embedder.embed(&texts) {
                Ok(vectors) => {
                    for (chunk, vector) in batch.iter().zip(vectors) {
                        entries.push((chunk.id, vector));
                    }
                }
                Err(batch_err) => {
                    tracing::warn!(
                        target: "store",
                        "batch embedding failed ({batch_err}); retrying items individually"
                    );
                    for chunk in batch {
                        match embedder.embed_one(&chunk.text) {
                            Ok(vector) => entries.push((chunk.id, vector)),
                            Err(item_err) => {
                                tracing::warn!(
                                    target: "store",
                                    "skipping chunk {} of {}: {item_err}",
                                    chunk.id,
                                    chunk.doc_id
                                );
                                skipped.insert(chunk.id);
                            }
                        }
                    }
                }
            }
            processed += batch.len();
            on_progress(BuildProgress::EmbeddingChunks {
                current: processed,
                total: total_chunks,
            });
        }

        if entries.is_empty() && !chunks.is_empty() {
            return Err(StoreError::Embedding(EmbeddingError::Backend(
                "embedding failed for every chunk".to_string(),
            )));
        }

        let vectors = VectorIndex::build(embedder.dimension(), entries)?;

        // Phase 3: persist. Replace any prior index wholesale.
        let base_path = base_path.as_ref().to_path_buf();
        if base_path.exists() {
            std::fs::remove_dir_all(&base_path)?;
        }
        let chunks_dir = base_path.join(CHUNKS_DIR);
        std::fs::create_dir_all(&chunks_dir)?;

        let (tantivy_schema, schema) = ChunkSchema::build();
        let dir = MmapDirectory::open(&chunks_dir)?;
        let index = Index::create(dir, tantivy_schema, IndexSettings::default())?;

        let mut writer: IndexWriter<TantivyDocument> = index.writer(WRITER_HEAP_BYTES)?;
        let mut stored = 0usize;
        for chunk in &chunks {
            if skipped.contains(&chunk.id) {
                continue;
            }
            writer.add_document(encode_chunk(&schema, chunk)?)?;
            stored += 1;
        }
        writer.commit()?;

        vectors.save(&base_path.join(VECTORS_FILE))?;

        let manifest = Manifest {
            format_version: MANIFEST_VERSION,
            dimension: vectors.dimension().get(),
            chunk_count: vectors.len(),
            model: model_name.to_string(),
            corpus_fingerprint,
        };
        std::fs::write(
            base_path.join(MANIFEST_FILE),
            serde_json::to_string_pretty(&manifest)?,
        )?;

        let reader = index
            .reader_builder()
            .reload_policy(ReloadPolicy::Manual)
            .try_into()?;
        reader.reload()?;

        let stats = BuildStats {
            documents: total_documents,
            chunks: stored,
            chunks_skipped: skipped.len(),
        };
        tracing::info!(
            target: "store",
            "built index at {}: {} documents, {} chunks ({} skipped)",
            base_path.display(),
            stats.documents,
            stats.chunks,
            stats.chunks_skipped
        );

        Ok((
            Self {
                base_path,
                reader,
                schema,
                vectors,
                manifest,
            },
            stats,
        ))
    }

    /// Open a persisted store, verifying that the manifest, the vector
    /// index, and the metadata table all describe the same chunk set.
    pub fn open(base_path: impl AsRef<Path>) -> StoreResult<Self> {
        let base_path = base_path.as_ref().to_path_buf();

        let manifest_path = base_path.join(MANIFEST_FILE);
        if !manifest_path.exists() {
            return Err(StoreError::Missing(base_path.display().to_string()));
        }
        let manifest: Manifest = serde_json::from_str(&std::fs::read_to_string(&manifest_path)?)?;
        if manifest.format_version != MANIFEST_VERSION {
            return Err(StoreError::MetadataMismatch(format!(
                "manifest format version {} is not supported (expected {MANIFEST_VERSION})",
                manifest.format_version
            )));
        }

        let vectors = VectorIndex::load(&base_path.join(VECTORS_FILE))?;
        if vectors.dimension().get() != manifest.dimension || vectors.len() != manifest.chunk_count
        {
            return Err(StoreError::MetadataMismatch(format!(
                "manifest describes {} vectors of dimension {}, index holds {} of dimension {}",
                manifest.chunk_count,
                manifest.dimension,
                vectors.len(),
                vectors.dimension().get()
            )));
        }

        let index = Index::open_in_dir(base_path.join(CHUNKS_DIR))?;
        let (_tantivy_schema, schema) = ChunkSchema::build();
        let reader = index
            .reader_builder()
            .reload_policy(ReloadPolicy::Manual)
            .try_into()?;
        reader.reload()?;

        let stored: HashSet<ChunkId> = stored_chunk_ids(&reader, &schema)?;
        let indexed: HashSet<ChunkId> = vectors.chunk_ids().iter().copied().collect();
        if stored != indexed {
            return Err(StoreError::MetadataMismatch(format!(
                "metadata table holds {} chunks, vector index holds {}",
                stored.len(),
                indexed.len()
            )));
        }

        Ok(Self {
            base_path,
            reader,
            schema,
            vectors,
            manifest,
        })
    }

    /// Number of indexed chunks.
    pub fn len(&self) -> usize {
        self.vectors.len()
    }

    /// True when no chunks are indexed.
    pub fn is_empty(&self) -> bool {
        self.vectors.is_empty()
    }

    /// The manifest this store was opened or built with.
    pub fn manifest(&self) -> &Manifest {
        &self.manifest
    }

    /// Directory this store lives in.
    pub fn base_path(&self) -> &Path {
        &self.base_path
    }

    /// Nearest chunks to `query`, metadata attached, ranked descending.
    pub fn search(&self, query: &[f32], k: usize) -> StoreResult<Vec<ScoredChunk>> {
        let hits = self.vectors.search(query, k)?;
        let mut results = Vec::with_capacity(hits.len());
        for (id, score) in hits {
            let chunk = self.chunk(id)?.ok_or_else(|| {
                StoreError::MetadataMismatch(format!("chunk {id} missing from metadata table"))
            })?;
            results.push(ScoredChunk { chunk, score });
        }
        Ok(results)
    }

    /// Fetch the metadata row for a chunk id.
    pub fn chunk(&self, id: ChunkId) -> StoreResult<Option<Chunk>> {
        let searcher = self.reader.searcher();
        let term = Term::from_field_u64(self.schema.chunk_id, u64::from(id.get()));
        let query = TermQuery::new(term, IndexRecordOption::Basic);

        let top = searcher.search(&query, &TopDocs::with_limit(1))?;
        let Some((_score, address)) = top.first() else {
            return Ok(None);
        };
        let doc: TantivyDocument = searcher.doc(*address)?;
        decode_chunk(&self.schema, id, &doc).map(Some)
    }

    /// Aggregate statistics for display.
    pub fn stats(&self) -> StoreResult<StoreStats> {
        let searcher = self.reader.searcher();
        let mut counts = [0usize; 3];
        for (slot, category) in SourceCategory::ALL.iter().enumerate() {
            let term = Term::from_field_text(self.schema.source, category.as_str());
            let query = TermQuery::new(term, IndexRecordOption::Basic);
            counts[slot] = searcher.search(&query, &Count)?;
        }

        Ok(StoreStats {
            chunk_count: self.vectors.len(),
            dimension: self.vectors.dimension().get(),
            model: self.manifest.model.clone(),
            occupation_chunks: counts[0],
            standard_chunks: counts[1],
            example_chunks: counts[2],
        })
    }
}

fn encode_chunk(schema: &ChunkSchema, chunk: &Chunk) -> StoreResult<TantivyDocument> {
    let mut doc = TantivyDocument::new();
    doc.add_u64(schema.chunk_id, u64::from(chunk.id.get()));
    doc.add_text(schema.doc_id, &chunk.doc_id);
    doc.add_text(schema.source, chunk.source.as_str());
    doc.add_text(schema.text, &chunk.text);
    doc.add_text(schema.meta, serde_json::to_string(&chunk.meta)?);
    doc.add_u64(schema.seq, chunk.seq as u64);
    doc.add_u64(schema.char_start, chunk.char_range.0 as u64);
    doc.add_u64(schema.char_end, chunk.char_range.1 as u64);
    Ok(doc)
}

fn decode_chunk(schema: &ChunkSchema, id: ChunkId, doc: &TantivyDocument) -> StoreResult<Chunk> {
    let corrupt =
        |what: &str| StoreError::MetadataMismatch(format!("chunk {id}: corrupt row ({what})"));

    let doc_id = doc
        .get_first(schema.doc_id)
        .and_then(|v| v.as_str())
        .ok_or_else(|| corrupt("doc_id"))?
        .to_string();

    let source_raw = doc
        .get_first(schema.source)
        .and_then(|v| v.as_str())
        .ok_or_else(|| corrupt("source"))?;
    let source = SourceCategory::parse(source_raw).ok_or_else(|| corrupt("source"))?;

    let text = doc
        .get_first(schema.text)
        .and_then(|v| v.as_str())
        .ok_or_else(|| corrupt("text"))?
        .to_string();

    let meta_json = doc
        .get_first(schema.meta)
        .and_then(|v| v.as_str())
        .ok_or_else(|| corrupt("meta"))?;
    let meta: DocumentMeta = serde_json::from_str(meta_json).map_err(|_| corrupt("meta"))?;

    let seq = doc
        .get_first(schema.seq)
        .and_then(|v| v.as_u64())
        .ok_or_else(|| corrupt("seq"))? as usize;
    let char_start = doc
        .get_first(schema.char_start)
        .and_then(|v| v.as_u64())
        .ok_or_else(|| corrupt("char_start"))? as usize;
    let char_end = doc
        .get_first(schema.char_end)
        .and_then(|v| v.as_u64())
        .ok_or_else(|| corrupt("char_end"))? as usize;

    Ok(Chunk {
        id,
        doc_id,
        source,
        meta,
        seq,
        char_range: (char_start, char_end),
        text,
    })
}

fn stored_chunk_ids(reader: &IndexReader, schema: &ChunkSchema) -> StoreResult<HashSet<ChunkId>> {
    let searcher = reader.searcher();
    let top = searcher.search(&AllQuery, &TopDocs::with_limit(METADATA_SCAN_LIMIT))?;

    let mut ids = HashSet::with_capacity(top.len());
    for (_score, address) in top {
        let doc: TantivyDocument = searcher.doc(address)?;
        if let Some(raw) = doc.get_first(schema.chunk_id).and_then(|v| v.as_u64()) {
            if let Some(id) = ChunkId::from_u32(raw as u32) {
                ids.insert(id);
            }
        }
    }
    Ok(ids)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ChunkingConfig;
    use crate::embedding::HashedEmbedder;
    use crate::index::VectorDimension;
    use tempfile::TempDir;

    fn fixture_documents() -> Vec<Document> {
        vec![
            Document {
                id: "ooh-retail".to_string(),
                text: "Retail sales workers greet customers and explain product features."
                    .to_string(),
                meta: DocumentMeta::Occupation {
                    title: "Retail Sales Workers".to_string(),
                    section: "What They Do".to_string(),
                },
            },
            Document {
                id: "es-comm".to_string(),
                text: "Students communicate effectively in workplace settings.".to_string(),
                meta: DocumentMeta::Standard {
                    framework: "Employability Skills".to_string(),
                    code: "ES.2".to_string(),
                },
            },
            Document {
                id: "goal-retail".to_string(),
                text: "Given job coaching, student will stock shelves in a retail setting."
                    .to_string(),
                meta: DocumentMeta::Example {
                    goal_area: "employment".to_string(),
                },
            },
        ]
    }

    fn build_fixture(dir: &TempDir) -> (KnowledgeStore, BuildStats) {
        let embedder = HashedEmbedder::new(VectorDimension::new(64).unwrap());
        let chunker = Chunker::new(ChunkingConfig::default());
        KnowledgeStore::build(
            dir.path().join("index"),
            &fixture_documents(),
            &chunker,
            &embedder,
            "hashed-64",
            "fingerprint".to_string(),
            |_| {},
        )
        .unwrap()
    }

    #[test]
    fn build_indexes_every_chunk() {
        let dir = TempDir::new().unwrap();
        let (store, stats) = build_fixture(&dir);

        assert_eq!(stats.documents, 3);
        assert_eq!(stats.chunks, 3);
        assert_eq!(stats.chunks_skipped, 0);
        assert_eq!(store.len(), 3);
    }

    #[test]
    fn empty_corpus_builds_an_empty_store() {
        let dir = TempDir::new().unwrap();
        let embedder = HashedEmbedder::new(VectorDimension::new(64).unwrap());
        let chunker = Chunker::new(ChunkingConfig::default());
        let (store, stats) = KnowledgeStore::build(
            dir.path().join("index"),
            &[],
            &chunker,
            &embedder,
            "hashed-64",
            "fingerprint".to_string(),
            |_| {},
        )
        .unwrap();

        assert!(store.is_empty());
        assert_eq!(stats.chunks, 0);

        let reopened = KnowledgeStore::open(dir.path().join("index")).unwrap();
        assert!(reopened.is_empty());
    }

    #[test]
    fn open_roundtrips_chunk_metadata() {
        let dir = TempDir::new().unwrap();
        let (built, _stats) = build_fixture(&dir);
        let id = built.vectors.chunk_ids()[0];

        let opened = KnowledgeStore::open(dir.path().join("index")).unwrap();
        assert_eq!(opened.len(), built.len());

        let chunk = opened.chunk(id).unwrap().unwrap();
        assert_eq!(chunk.id, id);
        assert_eq!(chunk.source, SourceCategory::Occupation);
        assert!(chunk.text.contains("Retail"));
    }

    #[test]
    fn open_fails_without_an_index() {
        let dir = TempDir::new().unwrap();
        assert!(matches!(
            KnowledgeStore::open(dir.path().join("index")),
            Err(StoreError::Missing(_))
        ));
    }

    #[test]
    fn search_attaches_metadata_to_hits() {
        let dir = TempDir::new().unwrap();
        let (store, _stats) = build_fixture(&dir);

        let embedder = HashedEmbedder::new(VectorDimension::new(64).unwrap());
        let query = embedder.embed_one("retail sales workers customers").unwrap();
        let hits = store.search(&query, 3).unwrap();

        assert!(!hits.is_empty());
        assert_eq!(hits[0].chunk.doc_id, "ooh-retail");
        for window in hits.windows(2) {
            assert!(window[0].score >= window[1].score);
        }
    }

    #[test]
    fn stats_count_by_category() {
        let dir = TempDir::new().unwrap();
        let (store, _stats) = build_fixture(&dir);

        let stats = store.stats().unwrap();
        assert_eq!(stats.chunk_count, 3);
        assert_eq!(stats.occupation_chunks, 1);
        assert_eq!(stats.standard_chunks, 1);
        assert_eq!(stats.example_chunks, 1);
        assert_eq!(stats.dimension, 64);
    }

    #[test]
    fn rebuild_replaces_prior_content() {
        let dir = TempDir::new().unwrap();
        let (_first, _stats) = build_fixture(&dir);

        let embedder = HashedEmbedder::new(VectorDimension::new(64).unwrap());
        let chunker = Chunker::new(ChunkingConfig::default());
        let only_doc = vec![fixture_documents().remove(1)];
        let (second, stats) = KnowledgeStore::build(
            dir.path().join("index"),
            &only_doc,
            &chunker,
            &embedder,
            "hashed-64",
            "fingerprint-2".to_string(),
            |_| {},
        )
        .unwrap();

        assert_eq!(stats.chunks, 1);
        assert_eq!(second.len(), 1);

        let reopened = KnowledgeStore::open(dir.path().join("index")).unwrap();
        assert_eq!(reopened.len(), 1);
        assert_eq!(reopened.manifest().corpus_fingerprint, "fingerprint-2");
    }
}
