//! Landmark embeddings
//!
//! A reduction stage selects landmark frames from a base accumulator and
//! assigns each a low-dimensional projection. The reduction algorithm itself
//! lives outside this crate; [`FixedLandmarkEmbedding`] wraps projections
//! computed elsewhere so that they can be registered like any other stage.
//!
//! Copyright (c) 2025 Mohammad Atashi <mohammadaliatashi@icloud.com>

use std::sync::Arc;

use log::info;
use nalgebra::{DMatrix, DVector};

use crate::analysis::{
    AnalysisError, DataProvider, FrameSource, ProjectionOutput, SharedStage, StageRegistry,
};
use crate::dimred::stress::StressFunction;
use crate::optimization::Objective;
use crate::reference::{ArgumentSpec, FrameLayout, MetricRegistry, StoredFrame};

/// Landmarks and their projections, as exposed by a reduction stage
pub trait LandmarkEmbedding {
    fn low_dimension(&self) -> usize;

    fn number_of_landmarks(&self) -> usize;

    /// Index of landmark `landmark` among the frames of the base data
    fn landmark_index_in_base(&self, landmark: usize) -> usize;

    /// One projected landmark per row
    fn projections(&self) -> &DMatrix<f64>;

    /// Stress of `point` against `targets`, one target per landmark.
    /// The gradient is written into `gradient`.
    fn calculate_stress(
        &self,
        point: &DVector<f64>,
        targets: &[f64],
        gradient: &mut DVector<f64>,
    ) -> f64 {
        StressFunction::new(self.projections(), targets).evaluate(point, gradient)
    }
}

/// Layout of a low-dimensional point; coordinates are named `label.1`, `label.2`, ...
pub(crate) fn projection_layout(label: &str, dimension: usize) -> Result<Arc<FrameLayout>, AnalysisError> {
    let arguments = (1..=dimension)
        .map(|k| ArgumentSpec::new(format!("{}.{}", label, k)))
        .collect();
    let layout = FrameLayout::new(MetricRegistry::create("EUCLIDEAN")?, Vec::new(), arguments)?;
    Ok(Arc::new(layout))
}

/// Reduction stage with externally computed landmark projections
pub struct FixedLandmarkEmbedding {
    label: String,
    base: SharedStage,
    landmarks: Vec<usize>,
    projections: DMatrix<f64>,
    layout: Arc<FrameLayout>,
}

impl FixedLandmarkEmbedding {
    /// `projections` holds one row per entry of `landmarks`, which index the
    /// frames of the stage registered as `base`.
    pub fn new(
        label: impl Into<String>,
        base: &str,
        registry: &StageRegistry,
        landmarks: Vec<usize>,
        projections: DMatrix<f64>,
    ) -> Result<Self, AnalysisError> {
        let label = label.into();
        let base = registry.resolve(base)?;

        if projections.nrows() != landmarks.len() {
            return Err(AnalysisError::configuration(format!(
                "{} landmarks but {} projections",
                landmarks.len(),
                projections.nrows()
            )));
        }
        let available = base.read().number_of_data_points();
        if let Some(&bad) = landmarks.iter().find(|&&index| index >= available) {
            return Err(AnalysisError::configuration(format!(
                "landmark {} is not among the {} frames of {}",
                bad,
                available,
                base.read().label()
            )));
        }

        let layout = projection_layout(&label, projections.ncols())?;
        info!(
            "  embedding {} landmarks from {} in {} dimensions",
            landmarks.len(),
            base.read().label(),
            projections.ncols()
        );
        Ok(Self {
            label,
            base,
            landmarks,
            projections,
            layout,
        })
    }

    fn landmark(&self, index: usize) -> Result<usize, AnalysisError> {
        self.landmarks.get(index).copied().ok_or_else(|| {
            AnalysisError::invariant(format!(
                "landmark {} requested from {} which holds {}",
                index,
                self.label,
                self.landmarks.len()
            ))
        })
    }
}

impl LandmarkEmbedding for FixedLandmarkEmbedding {
    fn low_dimension(&self) -> usize {
        self.projections.ncols()
    }

    fn number_of_landmarks(&self) -> usize {
        self.landmarks.len()
    }

    fn landmark_index_in_base(&self, landmark: usize) -> usize {
        self.landmarks[landmark]
    }

    fn projections(&self) -> &DMatrix<f64> {
        &self.projections
    }
}

impl FrameSource for FixedLandmarkEmbedding {
    fn number_of_data_points(&self) -> usize {
        self.landmarks.len()
    }

    fn weight(&self, index: usize) -> f64 {
        self.base.read().weight(self.landmarks[index])
    }

    fn data_point(&self, index: usize) -> Result<Vec<f64>, AnalysisError> {
        self.base.read().data_point(self.landmark(index)?)
    }

    fn reference_configuration(&self, index: usize) -> Result<StoredFrame, AnalysisError> {
        self.base.read().reference_configuration(self.landmark(index)?)
    }

    fn distance_between_frames(
        &self,
        iframe: usize,
        jframe: usize,
        squared: bool,
    ) -> Result<f64, AnalysisError> {
        let (i, j) = (self.landmark(iframe)?, self.landmark(jframe)?);
        self.base.read().distance_between_frames(i, j, squared)
    }
}

impl DataProvider for FixedLandmarkEmbedding {
    fn label(&self) -> &str {
        &self.label
    }

    fn base_data_label(&self) -> String {
        self.base.read().base_data_label()
    }

    fn retrieve_norm(&self) -> f64 {
        self.base.read().retrieve_norm()
    }

    fn normalization(&self) -> f64 {
        self.base.read().normalization()
    }

    fn run_frequency(&self) -> Option<u64> {
        self.base.read().run_frequency()
    }

    fn projection_output(&self) -> Option<&dyn ProjectionOutput> {
        Some(self)
    }

    fn landmark_embedding(&self) -> Option<&dyn LandmarkEmbedding> {
        Some(self)
    }
}

impl ProjectionOutput for FixedLandmarkEmbedding {
    fn dimension_of_output_points(&self) -> usize {
        self.projections.ncols()
    }

    fn number_of_output_points(&self) -> usize {
        self.projections.nrows()
    }

    fn output_weight(&self, index: usize) -> f64 {
        self.weight(index)
    }

    fn output_point(&self, index: usize) -> Result<Vec<f64>, AnalysisError> {
        self.landmark(index)?;
        Ok(self.projections.row(index).iter().copied().collect())
    }

    fn output_configuration(&self, index: usize) -> Result<StoredFrame, AnalysisError> {
        let point = self.output_point(index)?;
        let mut frame = StoredFrame::empty(self.layout.clone());
        frame.set_reference_config(&[], &point)?;
        frame.set_weight(self.output_weight(index));
        Ok(frame)
    }
}
