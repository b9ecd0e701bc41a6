//! Precomputed dissimilarities between the frames of one window
//!
//! Copyright (c) 2025 Mohammad Atashi <mohammadaliatashi@icloud.com>

use rayon::prelude::*;

use crate::analysis::AnalysisError;
use crate::reference::StoredFrame;

/// What the cached entries hold
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DissimilarityKind {
    Distance,
    Squared,
}

/// Symmetric matrix with a zero diagonal, stored as its packed strict lower
/// triangle.
#[derive(Debug, Clone, PartialEq)]
pub struct DissimilarityMatrix {
    dimension: usize,
    kind: DissimilarityKind,
    values: Vec<f64>,
}

impl DissimilarityMatrix {
    pub fn new(dimension: usize, kind: DissimilarityKind) -> Self {
        Self {
            dimension,
            kind,
            values: vec![0.0; dimension * dimension.saturating_sub(1) / 2],
        }
    }

    /// Compute every pairwise distance between `frames`, one row per task
    pub fn compute(frames: &[StoredFrame], kind: DissimilarityKind) -> Self {
        let squared = kind == DissimilarityKind::Squared;
        let values: Vec<f64> = (1..frames.len())
            .into_par_iter()
            .flat_map_iter(|i| {
                (0..i).map(move |j| frames[i].distance(&frames[j], squared))
            })
            .collect();

        Self {
            dimension: frames.len(),
            kind,
            values,
        }
    }

    pub fn dimension(&self) -> usize {
        self.dimension
    }

    pub fn kind(&self) -> DissimilarityKind {
        self.kind
    }

    /// Entry `(i, j)`; indices outside the matrix are an invariant violation
    pub fn get(&self, i: usize, j: usize) -> Result<f64, AnalysisError> {
        Ok(self.slot(i, j)?.map_or(0.0, |k| self.values[k]))
    }

    /// Set entry `(i, j)` and its mirror. Diagonal entries are always zero.
    pub fn set(&mut self, i: usize, j: usize, value: f64) -> Result<(), AnalysisError> {
        match self.slot(i, j)? {
            Some(k) => {
                self.values[k] = value;
                Ok(())
            }
            None if value == 0.0 => Ok(()),
            None => Err(AnalysisError::invariant(format!(
                "cannot set diagonal dissimilarity ({}, {}) to {}",
                i, j, value
            ))),
        }
    }

    /// Entry `(i, j)` converted to the requested kind
    pub fn distance(&self, i: usize, j: usize, squared: bool) -> Result<f64, AnalysisError> {
        let value = self.get(i, j)?;
        Ok(match (self.kind, squared) {
            (DissimilarityKind::Squared, false) => value.sqrt(),
            (DissimilarityKind::Distance, true) => value * value,
            _ => value,
        })
    }

    fn slot(&self, i: usize, j: usize) -> Result<Option<usize>, AnalysisError> {
        if i >= self.dimension || j >= self.dimension {
            return Err(AnalysisError::invariant(format!(
                "dissimilarity index ({}, {}) out of range for dimension {}",
                i, j, self.dimension
            )));
        }
        Ok(match i.cmp(&j) {
            std::cmp::Ordering::Equal => None,
            std::cmp::Ordering::Greater => Some(i * (i - 1) / 2 + j),
            std::cmp::Ordering::Less => Some(j * (j - 1) / 2 + i),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reference::{ArgumentSpec, FrameLayout, MetricRegistry};
    use approx::assert_relative_eq;
    use std::sync::Arc;

    fn frames(points: &[[f64; 2]]) -> Vec<StoredFrame> {
        let layout = Arc::new(
            FrameLayout::new(
                MetricRegistry::create("EUCLIDEAN").unwrap(),
                vec![],
                vec![ArgumentSpec::new("x"), ArgumentSpec::new("y")],
            )
            .unwrap(),
        );
        points
            .iter()
            .map(|p| {
                let mut frame = StoredFrame::empty(layout.clone());
                frame.set_reference_config(&[], p).unwrap();
                frame
            })
            .collect()
    }

    #[test]
    fn test_compute_matches_direct_distances() {
        let frames = frames(&[[0.0, 0.0], [3.0, 4.0], [1.0, 1.0], [-2.0, 0.5]]);
        let matrix = DissimilarityMatrix::compute(&frames, DissimilarityKind::Distance);

        assert_eq!(matrix.dimension(), 4);
        for i in 0..4 {
            assert_eq!(matrix.get(i, i).unwrap(), 0.0);
            for j in 0..4 {
                assert_relative_eq!(
                    matrix.get(i, j).unwrap(),
                    frames[i].distance(&frames[j], false),
                    epsilon = 1e-12
                );
                assert_eq!(matrix.get(i, j).unwrap(), matrix.get(j, i).unwrap());
            }
        }
        assert_relative_eq!(matrix.get(0, 1).unwrap(), 5.0, epsilon = 1e-12);
    }

    #[test]
    fn test_conversion_policy() {
        let frames = frames(&[[0.0, 0.0], [3.0, 4.0]]);
        let squared = DissimilarityMatrix::compute(&frames, DissimilarityKind::Squared);
        let plain = DissimilarityMatrix::compute(&frames, DissimilarityKind::Distance);

        assert_relative_eq!(squared.distance(0, 1, false).unwrap(), 5.0, epsilon = 1e-12);
        assert_relative_eq!(squared.distance(0, 1, true).unwrap(), 25.0, epsilon = 1e-12);
        assert_relative_eq!(plain.distance(1, 0, true).unwrap(), 25.0, epsilon = 1e-12);
        assert_relative_eq!(plain.distance(1, 0, false).unwrap(), 5.0, epsilon = 1e-12);
    }

    #[test]
    fn test_set_is_symmetric() {
        let mut matrix = DissimilarityMatrix::new(3, DissimilarityKind::Distance);
        matrix.set(2, 0, 1.5).unwrap();
        assert_eq!(matrix.get(0, 2).unwrap(), 1.5);
        assert!(matrix.set(1, 1, 0.0).is_ok());
        assert!(matches!(
            matrix.set(1, 1, 2.0),
            Err(AnalysisError::InvariantViolation(_))
        ));
    }

    #[test]
    fn test_out_of_range_indices_are_rejected() {
        let mut matrix = DissimilarityMatrix::new(3, DissimilarityKind::Squared);
        assert!(matches!(
            matrix.get(3, 0),
            Err(AnalysisError::InvariantViolation(_))
        ));
        assert!(matches!(
            matrix.distance(1, 7, false),
            Err(AnalysisError::InvariantViolation(_))
        ));
        assert!(matches!(
            matrix.set(0, 3, 1.0),
            Err(AnalysisError::InvariantViolation(_))
        ));
        assert!(DissimilarityMatrix::new(0, DissimilarityKind::Distance).get(0, 0).is_err());
    }
}
