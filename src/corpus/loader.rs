//! Corpus loading.
//!
//! The knowledge base arrives as JSONL files, one per source category,
//! each line one [`Document`] record. The loader validates only what the
//! pipeline relies on: non-empty text, unique ids, and agreement between
//! a record's category tag and the file it lives in.

use sha2::{Digest, Sha256};
use std::collections::HashSet;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;
use thiserror::Error;

use super::types::{Document, SourceCategory};
use crate::config::CorpusConfig;

/// Errors from corpus loading.
#[derive(Debug, Error)]
pub enum CorpusError {
    #[error("failed to read {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("{path}:{line}: invalid corpus record: {source}")]
    Parse {
        path: String,
        line: usize,
        #[source]
        source: serde_json::Error,
    },

    #[error("{path}:{line}: document '{id}' has empty text")]
    EmptyText {
        path: String,
        line: usize,
        id: String,
    },

    #[error("{path}:{line}: document '{id}' is tagged '{found}' but this file holds '{expected}' records")]
    CategoryMismatch {
        path: String,
        line: usize,
        id: String,
        found: SourceCategory,
        expected: SourceCategory,
    },

    #[error("{path}:{line}: duplicate document id '{id}'")]
    DuplicateId {
        path: String,
        line: usize,
        id: String,
    },
}

/// Load every corpus file named in `config`, in fixed category order.
pub fn load_corpus(config: &CorpusConfig) -> Result<Vec<Document>, CorpusError> {
    let mut documents = Vec::new();
    let mut seen_ids = HashSet::new();
    for category in SourceCategory::ALL {
        let path = config.path_for(category);
        documents.extend(load_file(path, category, &mut seen_ids)?);
    }
    Ok(documents)
}

fn load_file(
    path: &Path,
    expected: SourceCategory,
    seen_ids: &mut HashSet<String>,
) -> Result<Vec<Document>, CorpusError> {
    let path_display = path.display().to_string();
    let io_err = |source| CorpusError::Io {
        path: path_display.clone(),
        source,
    };

    let file = File::open(path).map_err(io_err)?;
    let reader = BufReader::new(file);

    let mut documents = Vec::new();
    for (idx, line) in reader.lines().enumerate() {
        let line = line.map_err(|source| CorpusError::Io {
            path: path_display.clone(),
            source,
        })?;
        let record = line.trim();
        if record.is_empty() {
            continue;
        }
        let line_no = idx + 1;

        let document: Document =
            serde_json::from_str(record).map_err(|source| CorpusError::Parse {
                path: path_display.clone(),
                line: line_no,
                source,
            })?;

        if document.text.trim().is_empty() {
            return Err(CorpusError::EmptyText {
                path: path_display.clone(),
                line: line_no,
                id: document.id,
            });
        }
        if document.source() != expected {
            return Err(CorpusError::CategoryMismatch {
                path: path_display.clone(),
                line: line_no,
                found: document.source(),
                id: document.id,
                expected,
            });
        }
        if !seen_ids.insert(document.id.clone()) {
            return Err(CorpusError::DuplicateId {
                path: path_display.clone(),
                line: line_no,
                id: document.id,
            });
        }

        documents.push(document);
    }

    tracing::debug!(target: "corpus", "loaded {} {} documents from {}", documents.len(), expected, path_display);
    Ok(documents)
}

/// SHA-256 over the corpus files, recorded in the index manifest so a
/// stale index is distinguishable from one built against the current
/// corpus. Stable across rebuilds of identical input.
pub fn corpus_fingerprint(config: &CorpusConfig) -> Result<String, CorpusError> {
    let mut hasher = Sha256::new();
    for category in SourceCategory::ALL {
        let path = config.path_for(category);
        let bytes = std::fs::read(path).map_err(|source| CorpusError::Io {
            path: path.display().to_string(),
            source,
        })?;
        hasher.update(category.as_str().as_bytes());
        hasher.update(&bytes);
    }
    Ok(format!("{:x}", hasher.finalize()))
}
