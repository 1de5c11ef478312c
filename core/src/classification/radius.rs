use crate::features::{FeatureVector, FEATURE_COUNT};
use crate::math::MatrixHelper;
use crate::prelude::{FusionError, FusionResult};
use ndarray::{Array2, ArrayView1};

/// One historical vector found inside the query radius.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Neighbor {
    pub distance: f64,
    /// Row of the classifier history the neighbour came from.
    pub index: usize,
}

/// Fixed-radius neighbour search over the classifier history.
pub trait RadiusQuery: Send {
    fn fit(&mut self, points: &[FeatureVector]) -> FusionResult<()>;

    /// Neighbours with `distance <= radius`, ordered by distance then index.
    fn neighbors_within_radius(&self, point: &FeatureVector, radius: f64) -> Vec<Neighbor>;

    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Exhaustive scan; the history is small enough that no tree is needed.
pub struct BruteForceIndex {
    points: Array2<f64>,
}

impl BruteForceIndex {
    pub fn new() -> Self {
        Self {
            points: Array2::zeros((0, FEATURE_COUNT)),
        }
    }
}

impl Default for BruteForceIndex {
    fn default() -> Self {
        Self::new()
    }
}

impl RadiusQuery for BruteForceIndex {
    fn fit(&mut self, points: &[FeatureVector]) -> FusionResult<()> {
        let flat: Vec<f64> = points.iter().flat_map(|p| p.0).collect();
        self.points = Array2::from_shape_vec((points.len(), FEATURE_COUNT), flat)
            .map_err(|err| FusionError::Internal(format!("history matrix: {}", err)))?;
        Ok(())
    }

    fn neighbors_within_radius(&self, point: &FeatureVector, radius: f64) -> Vec<Neighbor> {
        if self.points.nrows() == 0 {
            return Vec::new();
        }
        let distances = MatrixHelper::row_distances(self.points.view(), ArrayView1::from(&point.0[..]));
        let mut found: Vec<Neighbor> = distances
            .iter()
            .enumerate()
            .filter(|(_, d)| **d <= radius)
            .map(|(index, &distance)| Neighbor { distance, index })
            .collect();
        found.sort_by(|a, b| a.distance.total_cmp(&b.distance).then(a.index.cmp(&b.index)));
        found
    }

    fn len(&self) -> usize {
        self.points.nrows()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn vector(size: f64, speed: f64) -> FeatureVector {
        FeatureVector([size, speed, 0.0, 0.0, 0.0, 0.0])
    }

    #[test]
    fn query_returns_sorted_neighbours_inside_radius() {
        let mut index = BruteForceIndex::new();
        index
            .fit(&[vector(0.5, 0.5), vector(0.1, 0.0), vector(0.0, 0.1), vector(0.9, 0.9)])
            .unwrap();
        assert_eq!(index.len(), 4);

        let found = index.neighbors_within_radius(&vector(0.0, 0.0), 0.2);
        let rows: Vec<usize> = found.iter().map(|n| n.index).collect();
        assert_eq!(rows, vec![1, 2]);
        assert!((found[0].distance - 0.1).abs() < 1e-12);
    }

    #[test]
    fn empty_index_finds_nothing() {
        let mut index = BruteForceIndex::new();
        index.fit(&[]).unwrap();
        assert!(index.is_empty());
        assert!(index.neighbors_within_radius(&vector(0.0, 0.0), 10.0).is_empty());
    }

    #[test]
    fn radius_boundary_is_inclusive() {
        let mut index = BruteForceIndex::new();
        index.fit(&[vector(0.25, 0.0)]).unwrap();
        assert_eq!(index.neighbors_within_radius(&vector(0.0, 0.0), 0.25).len(), 1);
    }
}
