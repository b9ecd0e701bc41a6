//! Downstream query contract
//!
//! Every stage, whether it stores frames itself, forwards to an upstream stage
//! or projects points into a low-dimensional space, answers the same queries.
//! Downstream analyses and embedders depend only on these traits.
//!
//! Copyright (c) 2025 Mohammad Atashi <mohammadaliatashi@icloud.com>

use std::sync::Arc;

use parking_lot::RwLock;

use crate::analysis::AnalysisError;
use crate::dimred::LandmarkEmbedding;
use crate::reference::StoredFrame;

/// Stage shared through the registry
pub type SharedStage = Arc<RwLock<dyn DataProvider>>;

/// Per-frame queries
///
/// `weight` panics when `index` is out of range, like slice indexing.
pub trait FrameSource {
    fn number_of_data_points(&self) -> usize;

    /// Finalized weight of a frame
    fn weight(&self, index: usize) -> f64;

    /// Argument coordinates of a frame
    fn data_point(&self, index: usize) -> Result<Vec<f64>, AnalysisError>;

    fn reference_configuration(&self, index: usize) -> Result<StoredFrame, AnalysisError>;

    fn distance_between_frames(
        &self,
        iframe: usize,
        jframe: usize,
        squared: bool,
    ) -> Result<f64, AnalysisError>;
}

/// Stage-level queries on top of [`FrameSource`]
pub trait DataProvider: FrameSource {
    fn label(&self) -> &str;

    /// Label of the accumulator that ultimately stored the frames
    fn base_data_label(&self) -> String;

    /// Normalization of the most recently finalized window
    fn retrieve_norm(&self) -> f64;

    /// Normalization downstream analyses should apply
    fn normalization(&self) -> f64;

    /// Steps between analysis runs, `None` in single-run mode
    fn run_frequency(&self) -> Option<u64>;

    fn is_single_run(&self) -> bool {
        self.run_frequency().is_none()
    }

    fn projection_output(&self) -> Option<&dyn ProjectionOutput> {
        None
    }

    fn landmark_embedding(&self) -> Option<&dyn LandmarkEmbedding> {
        None
    }
}

/// Low-dimensional output exposed by projection stages
pub trait ProjectionOutput {
    fn dimension_of_output_points(&self) -> usize;

    fn number_of_output_points(&self) -> usize;

    fn output_weight(&self, index: usize) -> f64;

    fn output_point(&self, index: usize) -> Result<Vec<f64>, AnalysisError>;

    fn output_configuration(&self, index: usize) -> Result<StoredFrame, AnalysisError>;
}
