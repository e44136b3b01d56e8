//! Flat inner-product vector index.
//!
//! Exact nearest-neighbor search over unit-norm chunk embeddings. Scores
//! are inner products, which equal cosine similarity because every stored
//! vector is L2-normalized before it gets here. The index is always
//! rebuilt wholesale; there is no incremental update path.

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

use memmap2::Mmap;
use thiserror::Error;

use crate::corpus::ChunkId;

/// Magic prefix of the persisted index blob.
const MAGIC: &[u8; 4] = b"GPVI";

/// Bump when the on-disk layout changes.
const FORMAT_VERSION: u32 = 1;

/// Fixed embedding width, validated non-zero.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VectorDimension(u32);

impl VectorDimension {
    /// Create a dimension, rejecting zero.
    pub fn new(dim: usize) -> Option<Self> {
        u32::try_from(dim).ok().filter(|&d| d > 0).map(Self)
    }

    /// Get the dimension as usize.
    pub fn get(&self) -> usize {
        self.0 as usize
    }

    /// Width of the default sentence-embedding model (AllMiniLML6V2).
    pub fn dim_384() -> Self {
        Self(384)
    }
}

/// Errors from vector index operations.
#[derive(Debug, Error)]
pub enum IndexError {
    #[error("vector dimension mismatch: expected {expected}, got {got}")]
    DimensionMismatch { expected: usize, got: usize },

    #[error("corrupt index file: {0}")]
    Corrupt(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// Exact inner-product index over chunk embeddings.
///
/// Rows are stored in insertion order; ranking ties resolve to the
/// earlier row, so identical inputs produce identical orderings across
/// save/load round-trips.
pub struct VectorIndex {
    dimension: VectorDimension,
    ids: Vec<ChunkId>,
    data: Vec<f32>,
}

impl std::fmt::Debug for VectorIndex {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VectorIndex")
            .field("dimension", &self.dimension.get())
            .field("entries", &self.ids.len())
            .finish()
    }
}

impl VectorIndex {
    /// Build an index from chunk ids and their embeddings, replacing any
    /// prior content. Fails without producing a partial index if any
    /// vector's width differs from `dimension`.
    pub fn build(
        dimension: VectorDimension,
        entries: Vec<(ChunkId, Vec<f32>)>,
    ) -> Result<Self, IndexError> {
        let dim = dimension.get();
        let mut ids = Vec::with_capacity(entries.len());
        let mut data = Vec::with_capacity(entries.len() * dim);

        for (id, vector) in entries {
            if vector.len() != dim {
                return Err(IndexError::DimensionMismatch {
                    expected: dim,
                    got: vector.len(),
                });
            }
            ids.push(id);
            data.extend_from_slice(&vector);
        }

        Ok(Self {
            dimension,
            ids,
            data,
        })
    }

    /// Number of indexed vectors.
    pub fn len(&self) -> usize {
        self.ids.len()
    }

    /// True when the index holds no vectors.
    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    /// Embedding width of this index.
    pub fn dimension(&self) -> VectorDimension {
        self.dimension
    }

    /// Chunk ids in insertion order.
    pub fn chunk_ids(&self) -> &[ChunkId] {
        &self.ids
    }

    /// Top-`k` entries by inner product, descending. Ties resolve by
    /// insertion order (the sort is stable).
    pub fn search(&self, query: &[f32], k: usize) -> Result<Vec<(ChunkId, f32)>, IndexError> {
        let dim = self.dimension.get();
        if query.len() != dim {
            return Err(IndexError::DimensionMismatch {
                expected: dim,
                got: query.len(),
            });
        }

        let mut scored: Vec<(ChunkId, f32)> = self
            .ids
            .iter()
            .enumerate()
            .map(|(row, &id)| {
                let offset = row * dim;
                (id, dot(query, &self.data[offset..offset + dim]))
            })
            .collect();

        scored.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));
        scored.truncate(k);
        Ok(scored)
    }

    /// Persist the index as a little-endian binary blob.
    ///
    /// Layout: magic, format version, dimension, entry count, then the
    /// chunk ids, then the row-major f32 data.
    pub fn save(&self, path: &Path) -> Result<(), IndexError> {
        let file = File::create(path)?;
        let mut writer = BufWriter::new(file);

        writer.write_all(MAGIC)?;
        writer.write_all(&FORMAT_VERSION.to_le_bytes())?;
        writer.write_all(&self.dimension.0.to_le_bytes())?;
        writer.write_all(&(self.ids.len() as u32).to_le_bytes())?;

        for id in &self.ids {
            writer.write_all(&id.to_bytes())?;
        }
        for value in &self.data {
            writer.write_all(&value.to_le_bytes())?;
        }

        writer.flush()?;
        Ok(())
    }

    /// Load an index persisted by [`VectorIndex::save`]. Ranking for any
    /// query matches the saved index exactly: ids and vectors round-trip
    /// in insertion order.
    pub fn load(path: &Path) -> Result<Self, IndexError> {
        let file = File::open(path)?;
        let mmap = unsafe { Mmap::map(&file)? };
        let bytes: &[u8] = &mmap;
        let mut cursor = 0usize;

        let magic = take(bytes, &mut cursor, 4)?;
        if magic != MAGIC {
            return Err(IndexError::Corrupt("bad magic".to_string()));
        }
        let version = read_u32(bytes, &mut cursor)?;
        if version != FORMAT_VERSION {
            return Err(IndexError::Corrupt(format!(
                "unsupported format version {version}"
            )));
        }

        let dim_raw = read_u32(bytes, &mut cursor)?;
        let dimension = VectorDimension::new(dim_raw as usize)
            .ok_or_else(|| IndexError::Corrupt("zero dimension".to_string()))?;
        let count = read_u32(bytes, &mut cursor)? as usize;

        let mut ids = Vec::with_capacity(count);
        for _ in 0..count {
            let raw = read_u32(bytes, &mut cursor)?;
            let id = ChunkId::from_u32(raw)
                .ok_or_else(|| IndexError::Corrupt("zero chunk id".to_string()))?;
            ids.push(id);
        }

        let value_count = count * dimension.get();
        let mut data = Vec::with_capacity(value_count);
        for _ in 0..value_count {
            let raw = take(bytes, &mut cursor, 4)?;
            data.push(f32::from_le_bytes([raw[0], raw[1], raw[2], raw[3]]));
        }

        if cursor != bytes.len() {
            return Err(IndexError::Corrupt(format!(
                "{} trailing bytes",
                bytes.len() - cursor
            )));
        }

        Ok(Self {
            dimension,
            ids,
            data,
        })
    }
}

fn dot(a: &[f32], b: &[f32]) -> f32 {
    a.iter().zip(b.iter()).map(|(x, y)| x * y).sum()
}

fn take<'a>(bytes: &'a [u8], cursor: &mut usize, n: usize) -> Result<&'a [u8], IndexError> {
    let end = cursor
        .checked_add(n)
        .filter(|&end| end <= bytes.len())
        .ok_or_else(|| IndexError::Corrupt("truncated file".to_string()))?;
    let slice = &bytes[*cursor..end];
    *cursor = end;
    Ok(slice)
}

fn read_u32(bytes: &[u8], cursor: &mut usize) -> Result<u32, IndexError> {
    let raw = take(bytes, cursor, 4)?;
    Ok(u32::from_le_bytes([raw[0], raw[1], raw[2], raw[3]]))
}
