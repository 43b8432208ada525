//! Exact brute-force L2 index.

use crate::error::{Result, TroubleSearchError};
use crate::types::Embedding;

use super::VectorIndex;

/// Exhaustive squared-L2 scan over every stored vector.
///
/// Results are identical to a reference brute-force search, which keeps
/// rankings reproducible across loads.
pub struct FlatIndex {
    dimension: usize,
    vectors: Vec<Embedding>,
}

impl FlatIndex {
    /// Creates an index over `vectors`.
    pub fn new(dimension: usize, vectors: Vec<Embedding>) -> Result<Self> {
        if vectors.iter().any(|v| v.len() != dimension) {
            return Err(TroubleSearchError::vector(format!(
                "All vectors must have dimension {dimension}"
            )));
        }
        Ok(Self { dimension, vectors })
    }
}

fn squared_l2(a: &[f32], b: &[f32]) -> f32 {
    a.iter().zip(b).map(|(x, y)| (x - y) * (x - y)).sum()
}

impl VectorIndex for FlatIndex {
    fn search(&self, query: &[f32], k: usize) -> Result<Vec<(usize, f32)>> {
        if query.len() != self.dimension {
            return Err(TroubleSearchError::vector(format!(
                "Query dimension mismatch: expected {}, got {}",
                self.dimension,
                query.len()
            )));
        }

        let mut scored: Vec<(usize, f32)> = self
            .vectors
            .iter()
            .enumerate()
            .map(|(i, v)| (i, squared_l2(query, v)))
            .collect();
        // Stable: equal distances keep row order
        scored.sort_by(|a, b| a.1.total_cmp(&b.1));
        scored.truncate(k);
        Ok(scored)
    }

    fn len(&self) -> usize {
        self.vectors.len()
    }

    fn dimension(&self) -> usize {
        self.dimension
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_flat_search_orders_by_distance() {
        let index = FlatIndex::new(
            2,
            vec![vec![0.0, 0.0], vec![3.0, 4.0], vec![1.0, 0.0]],
        )
        .unwrap();
        let hits = index.search(&[0.0, 0.0], 3).unwrap();
        assert_eq!(hits, vec![(0, 0.0), (2, 1.0), (1, 25.0)]);
    }

    #[test]
    fn test_flat_search_k_larger_than_rows() {
        let index = FlatIndex::new(1, vec![vec![1.0], vec![2.0]]).unwrap();
        assert_eq!(index.search(&[0.0], 30).unwrap().len(), 2);
    }

    #[test]
    fn test_flat_ties_keep_row_order() {
        let index = FlatIndex::new(1, vec![vec![1.0], vec![-1.0], vec![1.0]]).unwrap();
        let hits = index.search(&[0.0], 3).unwrap();
        let rows: Vec<usize> = hits.iter().map(|h| h.0).collect();
        assert_eq!(rows, vec![0, 1, 2]);
    }

    #[test]
    fn test_flat_dimension_mismatch() {
        let index = FlatIndex::new(2, vec![vec![1.0, 0.0]]).unwrap();
        assert!(index.search(&[1.0], 1).is_err());
    }

    #[test]
    fn test_flat_empty_index() {
        let index = FlatIndex::new(4, vec![]).unwrap();
        assert!(index.is_empty());
        assert!(index.search(&[0.0; 4], 5).unwrap().is_empty());
    }
}
