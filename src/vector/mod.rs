//! Vector index abstractions for semantic search.
//!
//! ```text
//! ┌──────────────────────────────────┐
//! │         VectorIndex trait         │
//! └──────────┬───────────────┬───────┘
//!            │               │
//!    ┌───────┴──────┐ ┌──────┴───────┐
//!    │  FlatIndex   │ │  HnswIndex   │
//!    │ (exact L2)   │ │ (hnsw_rs)    │
//!    └──────────────┘ └──────────────┘
//! ```
//!
//! The persisted [`VectorFile`] is the source of truth. Both indexes are
//! derived in-memory structures built from it when a bundle is loaded.
//! Row `i` of the vector file is row `i` of the metadata table.

mod flat;
mod hnsw;

pub use flat::FlatIndex;
pub use hnsw::HnswIndex;

use std::fs;
use std::io::Write;
use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::config::VectorIndexKind;
use crate::error::{NotFoundError, Result, StorageError, TroubleSearchError};
use crate::types::Embedding;

/// Vector file name inside an index directory.
pub const VECTOR_FILE_NAME: &str = "trouble.vectors";

/// Vector index trait for nearest neighbor search.
///
/// IDs are row positions (`usize`), aligned with hnsw_rs's `DataId`.
pub trait VectorIndex: Send + Sync {
    /// Searches for the `k` nearest rows to `query`.
    ///
    /// Returns `(row, distance)` pairs sorted by distance ascending
    /// (closest first). Distance is squared L2.
    fn search(&self, query: &[f32], k: usize) -> Result<Vec<(usize, f32)>>;

    /// Number of indexed vectors.
    fn len(&self) -> usize;

    /// Returns true if the index holds no vectors.
    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Vector dimension.
    fn dimension(&self) -> usize;
}

/// Persisted row-major vectors for one corpus snapshot.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct VectorFile {
    /// Dimension of every vector.
    pub dimension: usize,
    /// One vector per metadata row.
    pub vectors: Vec<Embedding>,
}

impl VectorFile {
    /// Creates a vector file, checking every vector has `dimension` entries.
    pub fn new(dimension: usize, vectors: Vec<Embedding>) -> Result<Self> {
        if let Some((row, v)) = vectors
            .iter()
            .enumerate()
            .find(|(_, v)| v.len() != dimension)
        {
            return Err(TroubleSearchError::vector(format!(
                "Row {row} has dimension {}, expected {dimension}",
                v.len()
            )));
        }
        Ok(Self { dimension, vectors })
    }

    /// Number of stored vectors.
    pub fn len(&self) -> usize {
        self.vectors.len()
    }

    /// Returns true if no vectors are stored.
    pub fn is_empty(&self) -> bool {
        self.vectors.is_empty()
    }

    /// Reads the vector file from an index directory.
    ///
    /// # Errors
    ///
    /// - `NotFound::Index` if the file is absent
    /// - `Storage` if it cannot be decoded or is internally inconsistent
    pub fn load(dir: &Path) -> Result<Self> {
        let path = dir.join(VECTOR_FILE_NAME);
        if !path.is_file() {
            return Err(NotFoundError::Index(path).into());
        }

        let bytes = fs::read(&path)?;
        let file: VectorFile = bincode::deserialize(&bytes).map_err(|e| {
            StorageError::corrupted(format!("{}: {}", path.display(), e))
        })?;

        if file.vectors.iter().any(|v| v.len() != file.dimension) {
            return Err(StorageError::corrupted(format!(
                "{}: vectors do not match declared dimension {}",
                path.display(),
                file.dimension
            ))
            .into());
        }

        debug!(path = %path.display(), rows = file.len(), dimension = file.dimension, "Vector file loaded");
        Ok(file)
    }

    /// Writes the vector file into an index directory (temp file + rename).
    pub fn save(&self, dir: &Path) -> Result<()> {
        fs::create_dir_all(dir)?;
        let path = dir.join(VECTOR_FILE_NAME);
        let tmp = dir.join(format!("{VECTOR_FILE_NAME}.tmp"));

        let bytes = bincode::serialize(self)?;
        {
            let mut f = fs::File::create(&tmp)?;
            f.write_all(&bytes)?;
            f.sync_all()?;
        }
        fs::rename(&tmp, &path)?;
        Ok(())
    }
}

/// Builds the configured index over a vector file.
///
/// # Errors
///
/// Returns `DependencyUnavailable` if the index cannot be constructed.
pub fn build_index(kind: &VectorIndexKind, file: &VectorFile) -> Result<Box<dyn VectorIndex>> {
    match kind {
        VectorIndexKind::Flat => Ok(Box::new(FlatIndex::new(
            file.dimension,
            file.vectors.clone(),
        )?)),
        VectorIndexKind::Hnsw(config) => {
            let index = HnswIndex::build(file.dimension, config, &file.vectors)
                .map_err(|e| TroubleSearchError::dependency("vector index", e.to_string()))?;
            Ok(Box::new(index))
        }
    }
}
