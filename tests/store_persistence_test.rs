//! Persistence round-trips and consistency checks for the knowledge store.
//!
//! Builds fixture stores with the deterministic hashed embedder, then
//! verifies that reopening reproduces search rankings, that the manifest
//! and the two index halves are cross-checked on open, and that chunking
//! boundaries survive the full pipeline.

use std::path::{Path, PathBuf};

use tempfile::TempDir;

use goalpath::config::ChunkingConfig;
use goalpath::corpus::{ChunkId, Chunker, Document, DocumentMeta};
use goalpath::embedding::{Embedder, EmbeddingError, HashedEmbedder};
use goalpath::index::{IndexError, KnowledgeStore, StoreError, VectorDimension, VectorIndex};

const DIM: usize = 64;

fn embedder() -> HashedEmbedder {
    HashedEmbedder::new(VectorDimension::new(DIM).unwrap())
}

fn document(id: &str, text: &str) -> Document {
    Document {
        id: id.to_string(),
        text: text.to_string(),
        meta: DocumentMeta::Occupation {
            title: id.to_string(),
            section: String::new(),
        },
    }
}

fn fixture_documents() -> Vec<Document> {
    vec![
        document("ooh-retail", "Retail sales workers greet customers and explain products."),
        document("ooh-food", "Food preparation workers keep kitchens clean and chop vegetables."),
        document("ooh-stock", "Stock clerks receive shipments and organize shelves in stores."),
    ]
}

fn build_at(path: &Path, documents: &[Document], chunking: ChunkingConfig) -> KnowledgeStore {
    let chunker = Chunker::new(chunking);
    let (store, _stats) = KnowledgeStore::build(
        path,
        documents,
        &chunker,
        &embedder(),
        "hashed-64",
        "fixture".to_string(),
        |_| {},
    )
    .unwrap();
    store
}

fn index_dir(dir: &TempDir) -> PathBuf {
    dir.path().join("index")
}

#[test]
fn reopened_store_reproduces_search_rankings() {
    let dir = TempDir::new().unwrap();
    let built = build_at(&index_dir(&dir), &fixture_documents(), ChunkingConfig::default());
    let reopened = KnowledgeStore::open(index_dir(&dir)).unwrap();

    let probes = [
        "retail sales customers",
        "kitchens vegetables",
        "shipments shelves stores",
    ];
    for probe in probes {
        let query = embedder().embed_one(probe).unwrap();
        let before: Vec<ChunkId> = built
            .search(&query, 3)
            .unwrap()
            .into_iter()
            .map(|hit| hit.chunk.id)
            .collect();
        let after: Vec<ChunkId> = reopened
            .search(&query, 3)
            .unwrap()
            .into_iter()
            .map(|hit| hit.chunk.id)
            .collect();
        assert_eq!(before, after, "ranking changed after reopen for '{probe}'");
    }
}

#[test]
fn manifest_disagreement_fails_on_open() {
    let dir = TempDir::new().unwrap();
    build_at(&index_dir(&dir), &fixture_documents(), ChunkingConfig::default());

    let manifest_path = index_dir(&dir).join("manifest.json");
    let mut manifest: serde_json::Value =
        serde_json::from_str(&std::fs::read_to_string(&manifest_path).unwrap()).unwrap();
    manifest["chunk_count"] = serde_json::json!(99);
    std::fs::write(&manifest_path, serde_json::to_string_pretty(&manifest).unwrap()).unwrap();

    assert!(matches!(
        KnowledgeStore::open(index_dir(&dir)),
        Err(StoreError::MetadataMismatch(_))
    ));
}

#[test]
fn vector_and_metadata_chunk_sets_must_agree() {
    let dir = TempDir::new().unwrap();
    let built = build_at(&index_dir(&dir), &fixture_documents(), ChunkingConfig::default());
    let count = built.len();
    drop(built);

    // Replace the vector blob with one holding the same number of
    // vectors under different chunk ids.
    let dimension = VectorDimension::new(DIM).unwrap();
    let entries: Vec<(ChunkId, Vec<f32>)> = (0..count)
        .map(|row| {
            let id = ChunkId::from_u32(1000 + row as u32).unwrap();
            let mut vector = vec![0.0f32; DIM];
            vector[row % DIM] = 1.0;
            (id, vector)
        })
        .collect();
    let replacement = VectorIndex::build(dimension, entries).unwrap();
    replacement.save(&index_dir(&dir).join("vectors.bin")).unwrap();

    assert!(matches!(
        KnowledgeStore::open(index_dir(&dir)),
        Err(StoreError::MetadataMismatch(_))
    ));
}

#[test]
fn corrupt_vector_blob_fails_on_open() {
    let dir = TempDir::new().unwrap();
    build_at(&index_dir(&dir), &fixture_documents(), ChunkingConfig::default());

    let vectors_path = index_dir(&dir).join("vectors.bin");
    std::fs::write(&vectors_path, b"definitely not a vector index").unwrap();

    assert!(matches!(
        KnowledgeStore::open(index_dir(&dir)),
        Err(StoreError::Index(IndexError::Corrupt(_)))
    ));
}

#[test]
fn chunk_boundaries_survive_the_full_pipeline() {
    let dir = TempDir::new().unwrap();
    let chunking = ChunkingConfig {
        max_chars: 512,
        overlap_chars: 50,
        boundary_lookback: 64,
    };

    // One document exactly at the bound, one a single char over.
    let documents = vec![
        document("doc-exact", &"a ".repeat(256)),
        document("doc-over", &format!("b{}", "c".repeat(512))),
    ];
    let store = build_at(&index_dir(&dir), &documents, chunking);

    // 1 chunk for the exact-size document, 2 for the oversized one.
    assert_eq!(store.len(), 3);

    let stats = store.stats().unwrap();
    assert_eq!(stats.chunk_count, 3);
}

#[test]
fn rebuild_wholesale_replaces_the_index_directory() {
    let dir = TempDir::new().unwrap();
    let first = build_at(&index_dir(&dir), &fixture_documents(), ChunkingConfig::default());
    assert_eq!(first.len(), 3);
    drop(first);

    let second = build_at(
        &index_dir(&dir),
        &fixture_documents()[..1],
        ChunkingConfig::default(),
    );
    assert_eq!(second.len(), 1);

    let reopened = KnowledgeStore::open(index_dir(&dir)).unwrap();
    assert_eq!(reopened.len(), 1);
}

/// Embedder that rejects chunks containing a marker token, for driving
/// the skip-and-continue path during builds.
struct RejectingEmbedder {
    inner: HashedEmbedder,
    marker: &'static str,
}

impl Embedder for RejectingEmbedder {
    fn dimension(&self) -> VectorDimension {
        self.inner.dimension()
    }

    fn embed(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>, EmbeddingError> {
        if texts.iter().any(|t| t.contains(self.marker)) {
            return Err(EmbeddingError::Backend("rejected marker text".to_string()));
        }
        self.inner.embed(texts)
    }
}

#[test]
fn rejected_chunks_are_skipped_without_aborting_the_build() {
    let dir = TempDir::new().unwrap();
    let documents = vec![
        document("doc-good", "Retail sales workers greet customers."),
        document("doc-bad", "UNEMBEDDABLE text the backend refuses."),
        document("doc-also-good", "Stock clerks organize shelves."),
    ];

    let rejecting = RejectingEmbedder {
        inner: embedder(),
        marker: "UNEMBEDDABLE",
    };
    let chunker = Chunker::new(ChunkingConfig::default());
    let (store, stats) = KnowledgeStore::build(
        index_dir(&dir),
        &documents,
        &chunker,
        &rejecting,
        "hashed-64",
        "fixture".to_string(),
        |_| {},
    )
    .unwrap();

    assert_eq!(stats.chunks, 2);
    assert_eq!(stats.chunks_skipped, 1);
    assert_eq!(store.len(), 2);

    // The skipped chunk is absent from both halves: reopening passes the
    // consistency check.
    let reopened = KnowledgeStore::open(index_dir(&dir)).unwrap();
    assert_eq!(reopened.len(), 2);

    let query = embedder().embed_one("retail customers").unwrap();
    let hits = reopened.search(&query, 5).unwrap();
    assert!(hits.iter().all(|hit| hit.chunk.doc_id != "doc-bad"));
}

#[test]
fn build_reports_two_progress_phases() {
    let dir = TempDir::new().unwrap();
    let chunker = Chunker::new(ChunkingConfig::default());

    let mut chunked = 0usize;
    let mut embedded = 0usize;
    let (_store, _stats) = KnowledgeStore::build(
        index_dir(&dir),
        &fixture_documents(),
        &chunker,
        &embedder(),
        "hashed-64",
        "fixture".to_string(),
        |update| match update {
            goalpath::index::BuildProgress::ChunkingDocument { .. } => chunked += 1,
            goalpath::index::BuildProgress::EmbeddingChunks { .. } => embedded += 1,
        },
    )
    .unwrap();

    assert_eq!(chunked, 3);
    assert!(embedded >= 1);
}
