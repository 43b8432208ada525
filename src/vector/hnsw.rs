//! HNSW vector index implementation using hnsw_rs.
//!
//! Wraps `hnsw_rs::Hnsw<f32, DistL2>`. Data ids are metadata row
//! positions, so no id mapping is needed. The graph is built in memory
//! from the vector file each time a bundle is loaded and never persisted.

use anndists::dist::DistL2;
use hnsw_rs::prelude::*;
use tracing::debug;

use crate::config::HnswConfig;
use crate::error::{Result, TroubleSearchError};
use crate::types::Embedding;

use super::VectorIndex;

/// Approximate HNSW index backed by `hnsw_rs`.
pub struct HnswIndex {
    /// `'static` because all data is heap-owned (not memory-mapped).
    hnsw: Hnsw<'static, f32, DistL2>,

    ef_search: usize,

    dimension: usize,

    count: usize,
}

impl HnswIndex {
    /// Builds an index over `vectors`; row `i` gets data id `i`.
    ///
    /// # Errors
    ///
    /// Returns `Vector` if any vector has the wrong dimension.
    pub fn build(dimension: usize, config: &HnswConfig, vectors: &[Embedding]) -> Result<Self> {
        if let Some(row) = vectors.iter().position(|v| v.len() != dimension) {
            return Err(TroubleSearchError::vector(format!(
                "Embedding dimension mismatch at row {row}: expected {dimension}"
            )));
        }

        let hnsw = Hnsw::new(
            config.max_nb_connection,
            config.max_elements.max(vectors.len()),
            config.max_layer,
            config.ef_construction,
            DistL2 {},
        );

        if !vectors.is_empty() {
            let batch: Vec<(&Vec<f32>, usize)> =
                vectors.iter().enumerate().map(|(i, v)| (v, i)).collect();
            // Parallel bulk insert (uses rayon internally)
            hnsw.parallel_insert(&batch);
        }

        debug!(
            rows = vectors.len(),
            dimension,
            m = config.max_nb_connection,
            "HNSW graph built"
        );

        Ok(Self {
            hnsw,
            ef_search: config.ef_search,
            dimension,
            count: vectors.len(),
        })
    }
}

impl VectorIndex for HnswIndex {
    fn search(&self, query: &[f32], k: usize) -> Result<Vec<(usize, f32)>> {
        if query.len() != self.dimension {
            return Err(TroubleSearchError::vector(format!(
                "Query dimension mismatch: expected {}, got {}",
                self.dimension,
                query.len()
            )));
        }
        if self.count == 0 || k == 0 {
            return Ok(Vec::new());
        }

        let k = k.min(self.count);
        let ef = self.ef_search.max(k);
        let mut results: Vec<(usize, f32)> = self
            .hnsw
            .search(query, k, ef)
            .into_iter()
            // DistL2 is the Euclidean norm; report squared L2 like FlatIndex
            .map(|n| (n.d_id, n.distance * n.distance))
            .collect();
        results.sort_by(|a, b| a.1.total_cmp(&b.1));
        Ok(results)
    }

    fn len(&self) -> usize {
        self.count
    }

    fn dimension(&self) -> usize {
        self.dimension
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_embedding(seed: u64, dim: usize) -> Vec<f32> {
        (0..dim)
            .map(|i| (seed as f64 * 0.1 + i as f64 * 0.01).sin() as f32)
            .collect()
    }

    #[test]
    fn test_hnsw_finds_exact_match() {
        let vectors: Vec<Embedding> = (0..50).map(|s| make_embedding(s, 16)).collect();
        let index = HnswIndex::build(16, &HnswConfig::default(), &vectors).unwrap();
        assert_eq!(index.len(), 50);

        let hits = index.search(&vectors[17], 5).unwrap();
        assert_eq!(hits[0].0, 17);
        assert!(hits[0].1 < 1e-6);
        assert!(hits.windows(2).all(|w| w[0].1 <= w[1].1));
    }

    #[test]
    fn test_hnsw_empty_index() {
        let index = HnswIndex::build(8, &HnswConfig::default(), &[]).unwrap();
        assert!(index.is_empty());
        assert!(index.search(&[0.0; 8], 3).unwrap().is_empty());
    }

    #[test]
    fn test_hnsw_rejects_wrong_dimension() {
        let err = HnswIndex::build(4, &HnswConfig::default(), &[vec![1.0; 3]]).err();
        assert!(err.is_some());

        let index = HnswIndex::build(4, &HnswConfig::default(), &[vec![1.0; 4]]).unwrap();
        assert!(index.search(&[1.0; 3], 1).is_err());
    }

    #[test]
    fn test_hnsw_is_send_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<HnswIndex>();
    }
}
