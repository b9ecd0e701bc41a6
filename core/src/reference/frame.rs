//! Stored configurations
//!
//! A [`StoredFrame`] holds one sampled configuration: atomic positions and/or
//! scalar arguments, plus its statistical weight. All frames stored by one
//! accumulator share a single [`FrameLayout`] describing the metric, the
//! tracked atoms and the tracked arguments.
//!
//! Copyright (c) 2025 Mohammad Atashi <mohammadaliatashi@icloud.com>

use std::sync::Arc;

use nalgebra::Vector3;

use crate::reference::metric::{Metric, MetricError};
use crate::reference::periodicity::{ArgumentSpec, Periodicity};

/// Shared description of what a frame contains and how it is compared
#[derive(Debug)]
pub struct FrameLayout {
    metric: Arc<dyn Metric>,
    atoms: Vec<usize>,
    arguments: Vec<ArgumentSpec>,
    metric_weights: Vec<f64>,
}

impl FrameLayout {
    /// Validate the tracked atoms and arguments against the metric's
    /// capabilities.
    pub fn new(
        metric: Arc<dyn Metric>,
        atoms: Vec<usize>,
        arguments: Vec<ArgumentSpec>,
    ) -> Result<Self, MetricError> {
        if !metric.supports_arguments() && !arguments.is_empty() {
            return Err(MetricError::ArgumentsNotSupported(metric.name().to_owned()));
        }
        if !metric.supports_atoms() && !atoms.is_empty() {
            return Err(MetricError::AtomsNotSupported(metric.name().to_owned()));
        }
        if !atoms.is_empty() && !arguments.is_empty() {
            return Err(MetricError::MixedLayout(metric.name().to_owned()));
        }
        for argument in &arguments {
            if let Periodicity::Periodic { min, max } = argument.periodicity {
                if !(max > min) {
                    return Err(MetricError::EmptyDomain {
                        argument: argument.name.clone(),
                        min,
                        max,
                    });
                }
            }
        }

        let metric_weights = if metric.supports_arguments() {
            metric.argument_weights(arguments.len())
        } else {
            Vec::new()
        };

        Ok(Self {
            metric,
            atoms,
            arguments,
            metric_weights,
        })
    }

    pub fn metric(&self) -> &Arc<dyn Metric> {
        &self.metric
    }

    pub fn metric_name(&self) -> &'static str {
        self.metric.name()
    }

    /// Serial numbers of the tracked atoms
    pub fn atoms(&self) -> &[usize] {
        &self.atoms
    }

    pub fn arguments(&self) -> &[ArgumentSpec] {
        &self.arguments
    }

    pub fn argument_names(&self) -> impl Iterator<Item = &str> {
        self.arguments.iter().map(|a| a.name.as_str())
    }

    pub fn number_of_atoms(&self) -> usize {
        self.atoms.len()
    }

    pub fn number_of_arguments(&self) -> usize {
        self.arguments.len()
    }

    pub fn metric_weights(&self) -> &[f64] {
        &self.metric_weights
    }

    pub fn periodicity(&self, index: usize) -> Periodicity {
        self.arguments
            .get(index)
            .map(|a| a.periodicity)
            .unwrap_or_default()
    }
}

/// One accumulated configuration
#[derive(Debug, Clone)]
pub struct StoredFrame {
    layout: Arc<FrameLayout>,
    positions: Vec<Vector3<f64>>,
    arguments: Vec<f64>,
    /// Log-weight until the window is finalized, normalized weight afterwards
    weight: f64,
}

impl StoredFrame {
    /// A zeroed frame sized for `layout`
    pub fn empty(layout: Arc<FrameLayout>) -> Self {
        let positions = vec![Vector3::zeros(); layout.number_of_atoms()];
        let arguments = vec![0.0; layout.number_of_arguments()];
        Self {
            layout,
            positions,
            arguments,
            weight: 1.0,
        }
    }

    /// Overwrite the configuration held by this frame
    pub fn set_reference_config(
        &mut self,
        positions: &[Vector3<f64>],
        arguments: &[f64],
    ) -> Result<(), MetricError> {
        if positions.len() != self.layout.number_of_atoms() {
            return Err(MetricError::LayoutMismatch {
                what: "positions",
                expected: self.layout.number_of_atoms(),
                found: positions.len(),
            });
        }
        if arguments.len() != self.layout.number_of_arguments() {
            return Err(MetricError::LayoutMismatch {
                what: "arguments",
                expected: self.layout.number_of_arguments(),
                found: arguments.len(),
            });
        }
        self.positions.clear();
        self.positions.extend_from_slice(positions);
        self.arguments.clear();
        self.arguments.extend_from_slice(arguments);
        Ok(())
    }

    pub fn layout(&self) -> &Arc<FrameLayout> {
        &self.layout
    }

    pub fn positions(&self) -> &[Vector3<f64>] {
        &self.positions
    }

    pub fn arguments(&self) -> &[f64] {
        &self.arguments
    }

    pub fn argument(&self, index: usize) -> f64 {
        self.arguments[index]
    }

    pub fn weight(&self) -> f64 {
        self.weight
    }

    pub fn set_weight(&mut self, weight: f64) {
        self.weight = weight;
    }

    /// Distance to `other` under this frame's metric
    pub fn distance(&self, other: &StoredFrame, squared: bool) -> f64 {
        self.layout.metric().distance(self, other, squared)
    }
}
