//! Dissimilarity metrics between stored frames
//!
//! Each metric advertises which parts of a frame it consumes (atomic positions,
//! scalar arguments) and computes the distance between two frames laid out
//! identically. Metrics are selected once, at setup, through the closed
//! [`MetricRegistry`]; unknown names are configuration errors.
//!
//! # Available metrics
//! - `EUCLIDEAN`: weighted Euclidean distance over arguments, periodic
//!   differences wrapped into the argument domain
//! - `DOTPRODUCT`: `-ln(a · b)` over arguments
//! - `SIMPLE`: root mean-square deviation over atoms, no alignment
//! - `OPTIMAL`: root mean-square deviation over atoms after optimal rigid
//!   superposition
//!
//! Copyright (c) 2025 Mohammad Atashi <mohammadaliatashi@icloud.com>

use std::fmt::Debug;
use std::sync::Arc;

use nalgebra::{Matrix3, Vector3};
use thiserror::Error;

use crate::reference::frame::StoredFrame;

/// Metric resolution and layout errors
#[derive(Debug, Error, PartialEq)]
pub enum MetricError {
    #[error("unknown metric type {0}")]
    UnknownMetric(String),

    #[error("use of arguments with metric type {0} is invalid")]
    ArgumentsNotSupported(String),

    #[error("use of atoms with metric type {0} is invalid")]
    AtomsNotSupported(String),

    #[error("metric type {0} cannot track atoms and arguments together")]
    MixedLayout(String),

    #[error("periodic domain of argument {argument} is empty: [{min}, {max})")]
    EmptyDomain { argument: String, min: f64, max: f64 },

    #[error("frame layout expects {expected} {what} but {found} were supplied")]
    LayoutMismatch {
        what: &'static str,
        expected: usize,
        found: usize,
    },
}

/// Capability interface implemented by every metric variant
pub trait Metric: Debug + Send + Sync {
    /// Registry name
    fn name(&self) -> &'static str;

    fn supports_atoms(&self) -> bool {
        false
    }

    fn supports_arguments(&self) -> bool {
        false
    }

    /// Per-argument metric weights stored alongside each frame
    fn argument_weights(&self, n_arguments: usize) -> Vec<f64> {
        vec![1.0; n_arguments]
    }

    /// Distance between two frames sharing a layout. `squared` asks for the
    /// square of the distance.
    fn distance(&self, reference: &StoredFrame, other: &StoredFrame, squared: bool) -> f64;
}

/// Weighted Euclidean distance over arguments
#[derive(Debug, Clone, Copy, Default)]
pub struct EuclideanDistance;

impl Metric for EuclideanDistance {
    fn name(&self) -> &'static str {
        "EUCLIDEAN"
    }

    fn supports_arguments(&self) -> bool {
        true
    }

    fn distance(&self, reference: &StoredFrame, other: &StoredFrame, squared: bool) -> f64 {
        let layout = reference.layout();
        let d2: f64 = reference
            .arguments()
            .iter()
            .zip(other.arguments())
            .zip(layout.metric_weights())
            .enumerate()
            .map(|(i, ((&a, &b), &w))| {
                let diff = layout.periodicity(i).difference(a, b);
                w * diff * diff
            })
            .sum();

        if squared {
            d2
        } else {
            d2.sqrt()
        }
    }
}

/// Negative log overlap of the argument vectors
#[derive(Debug, Clone, Copy, Default)]
pub struct DotProductDistance;

impl Metric for DotProductDistance {
    fn name(&self) -> &'static str {
        "DOTPRODUCT"
    }

    fn supports_arguments(&self) -> bool {
        true
    }

    fn distance(&self, reference: &StoredFrame, other: &StoredFrame, squared: bool) -> f64 {
        let dot: f64 = reference
            .arguments()
            .iter()
            .zip(other.arguments())
            .map(|(a, b)| a * b)
            .sum();

        // Non-positive overlaps have no finite distance.
        let d = if dot > 0.0 { -dot.ln() } else { f64::INFINITY };
        if squared {
            d * d
        } else {
            d
        }
    }
}

/// Root mean-square deviation without alignment
#[derive(Debug, Clone, Copy, Default)]
pub struct SimpleRmsd;

impl Metric for SimpleRmsd {
    fn name(&self) -> &'static str {
        "SIMPLE"
    }

    fn supports_atoms(&self) -> bool {
        true
    }

    fn distance(&self, reference: &StoredFrame, other: &StoredFrame, squared: bool) -> f64 {
        let n = reference.positions().len();
        if n == 0 {
            return 0.0;
        }
        let msd = reference
            .positions()
            .iter()
            .zip(other.positions())
            .map(|(a, b)| (b - a).norm_squared())
            .sum::<f64>()
            / n as f64;

        if squared {
            msd
        } else {
            msd.sqrt()
        }
    }
}

/// Root mean-square deviation after optimal rigid superposition (Kabsch)
#[derive(Debug, Clone, Copy, Default)]
pub struct OptimalRmsd;

impl OptimalRmsd {
    fn centered(positions: &[Vector3<f64>]) -> Vec<Vector3<f64>> {
        let center = positions
            .iter()
            .fold(Vector3::zeros(), |acc, p| acc + p)
            / positions.len() as f64;
        positions.iter().map(|p| p - center).collect()
    }

    /// Rotation taking the centered `reference` onto the centered `other`
    fn optimal_rotation(reference: &[Vector3<f64>], other: &[Vector3<f64>]) -> Matrix3<f64> {
        let covariance = reference
            .iter()
            .zip(other)
            .fold(Matrix3::zeros(), |acc, (p, q)| acc + p * q.transpose());

        let svd = covariance.svd(true, true);
        let (Some(u), Some(v_t)) = (svd.u, svd.v_t) else {
            return Matrix3::identity();
        };
        let v = v_t.transpose();
        let handedness = (v * u.transpose()).determinant().signum();
        let correction = Matrix3::from_diagonal(&Vector3::new(1.0, 1.0, handedness));
        v * correction * u.transpose()
    }
}

impl Metric for OptimalRmsd {
    fn name(&self) -> &'static str {
        "OPTIMAL"
    }

    fn supports_atoms(&self) -> bool {
        true
    }

    fn distance(&self, reference: &StoredFrame, other: &StoredFrame, squared: bool) -> f64 {
        let n = reference.positions().len();
        if n == 0 {
            return 0.0;
        }
        let p = Self::centered(reference.positions());
        let q = Self::centered(other.positions());
        let rotation = Self::optimal_rotation(&p, &q);

        let msd = p
            .iter()
            .zip(&q)
            .map(|(a, b)| (rotation * a - b).norm_squared())
            .sum::<f64>()
            / n as f64;

        if squared {
            msd
        } else {
            msd.sqrt()
        }
    }
}

/// Closed registry of metric implementations keyed by name
pub struct MetricRegistry;

impl MetricRegistry {
    pub const NAMES: [&'static str; 4] = ["EUCLIDEAN", "DOTPRODUCT", "SIMPLE", "OPTIMAL"];

    pub fn create(name: &str) -> Result<Arc<dyn Metric>, MetricError> {
        match name.trim().to_ascii_uppercase().as_str() {
            "EUCLIDEAN" => Ok(Arc::new(EuclideanDistance)),
            "DOTPRODUCT" => Ok(Arc::new(DotProductDistance)),
            "SIMPLE" => Ok(Arc::new(SimpleRmsd)),
            "OPTIMAL" => Ok(Arc::new(OptimalRmsd)),
            _ => Err(MetricError::UnknownMetric(name.to_owned())),
        }
    }
}
