//! Data-reuse chain
//!
//! A stage either stores its own frames or forwards every frame query to one
//! upstream stage. The choice is made once, at setup, by resolving a
//! [`DataSource`] into a [`FrameSource`] proxy.
//!
//! Copyright (c) 2025 Mohammad Atashi <mohammadaliatashi@icloud.com>

use log::{info, warn};

use crate::analysis::{AnalysisError, FrameSource, ProjectionOutput, SharedStage, StageRegistry};
use crate::config::AnalysisConfig;
use crate::reference::StoredFrame;

/// Where a stage's frames come from
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DataSource {
    Local,
    /// Frames stored by the named accumulator
    ReuseData(String),
    /// Projections produced by the named reduction stage
    ReuseProjection(String),
}

impl DataSource {
    pub fn from_config(config: &AnalysisConfig) -> Result<Self, AnalysisError> {
        match (&config.reuse_input_data_from, &config.use_output_data_from) {
            (None, None) => Ok(Self::Local),
            (Some(label), None) => Ok(Self::ReuseData(label.clone())),
            (None, Some(label)) => Ok(Self::ReuseProjection(label.clone())),
            (Some(_), Some(_)) => Err(AnalysisError::configuration(
                "cannot reuse input data and output data of other actions at the same time",
            )),
        }
    }

    pub fn upstream_label(&self) -> Option<&str> {
        match self {
            Self::Local => None,
            Self::ReuseData(label) | Self::ReuseProjection(label) => Some(label),
        }
    }

    /// Resolve the upstream stage and build the proxy answering frame
    /// queries. `Ok(None)` for local storage.
    pub fn resolve(
        &self,
        registry: &StageRegistry,
    ) -> Result<Option<(SharedStage, Box<dyn FrameSource>)>, AnalysisError> {
        match self {
            Self::Local => Ok(None),
            Self::ReuseData(label) => {
                let upstream = registry.resolve(label)?;
                info!("  performing analysis on input data stored by {}", label);
                let proxy: Box<dyn FrameSource> = Box::new(InputReuse::new(upstream.clone()));
                Ok(Some((upstream, proxy)))
            }
            Self::ReuseProjection(label) => {
                let upstream = registry.resolve(label)?;
                let proxy: Box<dyn FrameSource> = Box::new(OutputReuse::new(upstream.clone())?);
                info!("  performing analysis on output from {}", label);
                Ok(Some((upstream, proxy)))
            }
        }
    }
}

/// Forwards frame queries to the stored data of an upstream stage
pub struct InputReuse {
    upstream: SharedStage,
}

impl InputReuse {
    pub fn new(upstream: SharedStage) -> Self {
        Self { upstream }
    }
}

impl FrameSource for InputReuse {
    fn number_of_data_points(&self) -> usize {
        self.upstream.read().number_of_data_points()
    }

    fn weight(&self, index: usize) -> f64 {
        self.upstream.read().weight(index)
    }

    fn data_point(&self, index: usize) -> Result<Vec<f64>, AnalysisError> {
        self.upstream.read().data_point(index)
    }

    fn reference_configuration(&self, index: usize) -> Result<StoredFrame, AnalysisError> {
        self.upstream.read().reference_configuration(index)
    }

    fn distance_between_frames(
        &self,
        iframe: usize,
        jframe: usize,
        squared: bool,
    ) -> Result<f64, AnalysisError> {
        self.upstream
            .read()
            .distance_between_frames(iframe, jframe, squared)
    }
}

/// Forwards frame queries to the projected output of an upstream stage
pub struct OutputReuse {
    upstream: SharedStage,
}

impl OutputReuse {
    /// Fails when the upstream stage exposes no projected output
    pub fn new(upstream: SharedStage) -> Result<Self, AnalysisError> {
        {
            let stage = upstream.read();
            if stage.projection_output().is_none() {
                return Err(AnalysisError::configuration(format!(
                    "action {} does not produce projected output that can be reused",
                    stage.label()
                )));
            }
        }
        Ok(Self { upstream })
    }

    fn with_output<T>(
        &self,
        query: impl FnOnce(&dyn ProjectionOutput) -> Result<T, AnalysisError>,
    ) -> Result<T, AnalysisError> {
        let stage = self.upstream.read();
        let output = stage.projection_output().ok_or_else(|| {
            AnalysisError::invariant(format!("action {} lost its projected output", stage.label()))
        })?;
        query(output)
    }
}

impl FrameSource for OutputReuse {
    fn number_of_data_points(&self) -> usize {
        self.upstream
            .read()
            .projection_output()
            .map_or(0, |output| output.number_of_output_points())
    }

    /// Without projected output the stage reports no points, so any index
    /// is out of range and weighs nothing.
    fn weight(&self, index: usize) -> f64 {
        let stage = self.upstream.read();
        match stage.projection_output() {
            Some(output) => output.output_weight(index),
            None => {
                warn!(
                    "output weight {} requested from {} which has no output",
                    index,
                    stage.label()
                );
                0.0
            }
        }
    }

    fn data_point(&self, index: usize) -> Result<Vec<f64>, AnalysisError> {
        self.with_output(|output| output.output_point(index))
    }

    fn reference_configuration(&self, index: usize) -> Result<StoredFrame, AnalysisError> {
        self.with_output(|output| output.output_configuration(index))
    }

    fn distance_between_frames(
        &self,
        iframe: usize,
        jframe: usize,
        squared: bool,
    ) -> Result<f64, AnalysisError> {
        self.upstream
            .read()
            .distance_between_frames(iframe, jframe, squared)
    }
}
