//! Exact flat vector index.
//!
//! Stores vectors in insertion order and scans all of them on every
//! query, so results are the true nearest neighbors under the chosen
//! metric. The ordinal of a vector is its insertion position; callers
//! join ordinals back to their own ordered corpus.

use serde::{Deserialize, Serialize};

/// Ordinal returned in place of a match when fewer vectors exist than
/// were requested. Callers must filter these out.
pub const NO_MATCH: i64 = -1;

/// Distance metric for the flat scan.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DistanceMetric {
    /// Squared euclidean distance (smaller is closer).
    L2,
    /// Cosine distance, `1 - cosine similarity`.
    Cosine,
}

impl Default for DistanceMetric {
    fn default() -> Self {
        DistanceMetric::L2
    }
}

impl DistanceMetric {
    pub(crate) fn as_u8(self) -> u8 {
        match self {
            DistanceMetric::L2 => 0,
            DistanceMetric::Cosine => 1,
        }
    }

    pub(crate) fn from_u8(value: u8) -> Option<Self> {
        match value {
            0 => Some(DistanceMetric::L2),
            1 => Some(DistanceMetric::Cosine),
            _ => None,
        }
    }
}

/// One search hit: distance to the query and the insertion ordinal of
/// the matched vector. Padding slots carry `NO_MATCH` and an infinite
/// distance.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Neighbor {
    pub distance: f32,
    pub ordinal: i64,
}

/// Errors that can occur during index operations.
#[derive(Debug, thiserror::Error)]
pub enum IndexError {
    #[error("Dimension mismatch: expected {expected}, got {got}")]
    DimensionMismatch { expected: usize, got: usize },

    #[error("Cannot search with zero-norm vector under cosine distance")]
    ZeroNormVector,
}

/// Exact nearest-neighbor index over an ordered sequence of vectors.
pub struct FlatIndex {
    dimensions: usize,
    metric: DistanceMetric,
    vectors: Vec<Vec<f32>>,
}

impl FlatIndex {
    /// Create an empty index.
    pub fn new(dimensions: usize, metric: DistanceMetric) -> Self {
        Self {
            dimensions,
            metric,
            vectors: Vec::new(),
        }
    }

    /// Build an index from an ordered batch of vectors.
    /// `len()` equals `vectors.len()` afterwards.
    pub fn build(
        dimensions: usize,
        metric: DistanceMetric,
        vectors: Vec<Vec<f32>>,
    ) -> Result<Self, IndexError> {
        let mut index = Self::new(dimensions, metric);
        index.vectors.reserve(vectors.len());
        for vector in vectors {
            index.push(vector)?;
        }
        Ok(index)
    }

    /// Append one vector at the next ordinal.
    ///
    /// The orchestrator only ever builds fresh, but incremental adds are
    /// supported at this level.
    pub fn push(&mut self, vector: Vec<f32>) -> Result<(), IndexError> {
        if vector.len() != self.dimensions {
            return Err(IndexError::DimensionMismatch {
                expected: self.dimensions,
                got: vector.len(),
            });
        }
        self.vectors.push(vector);
        Ok(())
    }

    pub fn dimensions(&self) -> usize {
        self.dimensions
    }

    pub fn metric(&self) -> DistanceMetric {
        self.metric
    }

    pub fn len(&self) -> usize {
        self.vectors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.vectors.is_empty()
    }

    /// The vector stored at `ordinal`, if any.
    pub fn vector(&self, ordinal: usize) -> Option<&[f32]> {
        self.vectors.get(ordinal).map(Vec::as_slice)
    }

    /// Exact k-NN search.
    ///
    /// Returns exactly `k` neighbors sorted ascending by distance. When
    /// fewer than `k` vectors exist the tail is padded with `NO_MATCH`
    /// sentinels. Equal distances are broken by ascending ordinal, so
    /// identical input always produces identical output.
    pub fn search(&self, query: &[f32], k: usize) -> Result<Vec<Neighbor>, IndexError> {
        if query.len() != self.dimensions {
            return Err(IndexError::DimensionMismatch {
                expected: self.dimensions,
                got: query.len(),
            });
        }

        let query_norm = l2_norm(query);
        if self.metric == DistanceMetric::Cosine && query_norm < f32::EPSILON {
            return Err(IndexError::ZeroNormVector);
        }

        let mut neighbors: Vec<Neighbor> = self
            .vectors
            .iter()
            .enumerate()
            .map(|(ordinal, target)| Neighbor {
                distance: self.distance(query, query_norm, target),
                ordinal: ordinal as i64,
            })
            .collect();

        // Stable sort keeps first-inserted first on distance ties.
        neighbors.sort_by(|a, b| {
            a.distance
                .partial_cmp(&b.distance)
                .unwrap_or(std::cmp::Ordering::Equal)
        });

        neighbors.truncate(k);
        while neighbors.len() < k {
            neighbors.push(Neighbor {
                distance: f32::INFINITY,
                ordinal: NO_MATCH,
            });
        }

        Ok(neighbors)
    }

    fn distance(&self, query: &[f32], query_norm: f32, target: &[f32]) -> f32 {
        match self.metric {
            DistanceMetric::L2 => query
                .iter()
                .zip(target.iter())
                .map(|(a, b)| (a - b) * (a - b))
                .sum(),
            DistanceMetric::Cosine => {
                let target_norm = l2_norm(target);
                if target_norm < f32::EPSILON {
                    // Zero-norm target has no direction; treat as maximally distant.
                    return 1.0;
                }
                let dot: f32 = query.iter().zip(target.iter()).map(|(a, b)| a * b).sum();
                1.0 - dot / (query_norm * target_norm)
            }
        }
    }
}

fn l2_norm(v: &[f32]) -> f32 {
    v.iter().map(|x| x * x).sum::<f32>().sqrt()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_index() {
        let index = FlatIndex::new(384, DistanceMetric::L2);
        assert_eq!(index.dimensions(), 384);
        assert!(index.is_empty());
        assert_eq!(index.len(), 0);
    }

    #[test]
    fn test_build_counts_vectors() {
        let index = FlatIndex::build(
            3,
            DistanceMetric::L2,
            vec![vec![1.0, 0.0, 0.0], vec![0.0, 1.0, 0.0]],
        )
        .unwrap();
        assert_eq!(index.len(), 2);
    }

    #[test]
    fn test_build_dimension_mismatch() {
        let result = FlatIndex::build(3, DistanceMetric::L2, vec![vec![1.0, 0.0, 0.0, 0.0]]);
        assert!(matches!(
            result,
            Err(IndexError::DimensionMismatch { expected: 3, got: 4 })
        ));
    }

    #[test]
    fn test_search_exact_match_has_zero_distance() {
        let index = FlatIndex::build(
            3,
            DistanceMetric::L2,
            vec![vec![1.0, 0.0, 0.0], vec![0.0, 1.0, 0.0]],
        )
        .unwrap();

        let neighbors = index.search(&[0.0, 1.0, 0.0], 1).unwrap();
        assert_eq!(neighbors[0].ordinal, 1);
        assert!(neighbors[0].distance.abs() < f32::EPSILON);
    }

    #[test]
    fn test_search_sorted_ascending() {
        let index = FlatIndex::build(
            2,
            DistanceMetric::L2,
            vec![vec![3.0, 0.0], vec![1.0, 0.0], vec![2.0, 0.0]],
        )
        .unwrap();

        let neighbors = index.search(&[0.0, 0.0], 3).unwrap();
        let ordinals: Vec<i64> = neighbors.iter().map(|n| n.ordinal).collect();
        assert_eq!(ordinals, vec![1, 2, 0]);
        assert!(neighbors[0].distance <= neighbors[1].distance);
        assert!(neighbors[1].distance <= neighbors[2].distance);
    }

    #[test]
    fn test_search_pads_with_sentinel() {
        let index =
            FlatIndex::build(2, DistanceMetric::L2, vec![vec![1.0, 0.0]]).unwrap();

        let neighbors = index.search(&[1.0, 0.0], 3).unwrap();
        assert_eq!(neighbors.len(), 3);
        assert_eq!(neighbors[0].ordinal, 0);
        assert_eq!(neighbors[1].ordinal, NO_MATCH);
        assert_eq!(neighbors[2].ordinal, NO_MATCH);
        assert!(neighbors[1].distance.is_infinite());
    }

    #[test]
    fn test_search_empty_index_all_sentinels() {
        let index = FlatIndex::new(2, DistanceMetric::L2);
        let neighbors = index.search(&[1.0, 0.0], 2).unwrap();
        assert!(neighbors.iter().all(|n| n.ordinal == NO_MATCH));
    }

    #[test]
    fn test_ties_broken_by_insertion_order() {
        // Two identical vectors: first-inserted must win.
        let index = FlatIndex::build(
            2,
            DistanceMetric::L2,
            vec![vec![1.0, 0.0], vec![1.0, 0.0]],
        )
        .unwrap();

        let neighbors = index.search(&[1.0, 0.0], 2).unwrap();
        assert_eq!(neighbors[0].ordinal, 0);
        assert_eq!(neighbors[1].ordinal, 1);
    }

    #[test]
    fn test_search_deterministic() {
        let index = FlatIndex::build(
            2,
            DistanceMetric::L2,
            vec![vec![1.0, 1.0], vec![1.0, -1.0], vec![-1.0, 1.0]],
        )
        .unwrap();

        let first = index.search(&[0.5, 0.5], 3).unwrap();
        let second = index.search(&[0.5, 0.5], 3).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn test_search_query_dimension_mismatch() {
        let index = FlatIndex::new(3, DistanceMetric::L2);
        let result = index.search(&[1.0, 0.0], 1);
        assert!(matches!(result, Err(IndexError::DimensionMismatch { .. })));
    }

    #[test]
    fn test_cosine_distance_orders_by_angle() {
        let index = FlatIndex::build(
            2,
            DistanceMetric::Cosine,
            vec![vec![0.0, 1.0], vec![10.0, 0.0]],
        )
        .unwrap();

        // Magnitude does not matter under cosine: the second vector points
        // the same way as the query.
        let neighbors = index.search(&[1.0, 0.0], 2).unwrap();
        assert_eq!(neighbors[0].ordinal, 1);
        assert!(neighbors[0].distance.abs() < 1e-6);
    }

    #[test]
    fn test_cosine_zero_norm_query_rejected() {
        let index =
            FlatIndex::build(2, DistanceMetric::Cosine, vec![vec![1.0, 0.0]]).unwrap();
        let result = index.search(&[0.0, 0.0], 1);
        assert!(matches!(result, Err(IndexError::ZeroNormVector)));
    }

    #[test]
    fn test_metric_roundtrip_tags() {
        for metric in [DistanceMetric::L2, DistanceMetric::Cosine] {
            assert_eq!(DistanceMetric::from_u8(metric.as_u8()), Some(metric));
        }
        assert_eq!(DistanceMetric::from_u8(9), None);
    }
}
