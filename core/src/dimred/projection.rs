//! Out-of-sample projection
//!
//! Places arbitrary frames of the base data into an existing landmark
//! embedding. For frame `i` the dissimilarity to every landmark becomes a
//! target distance; starting next to the closest landmark's projection, the
//! stress against those targets is minimised by conjugate gradients.
//!
//! Projections are recomputed on every query.
//!
//! Copyright (c) 2025 Mohammad Atashi <mohammadaliatashi@icloud.com>

use std::sync::Arc;

use log::{info, trace};
use nalgebra::DVector;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha20Rng;

use crate::analysis::{
    AnalysisError, DataProvider, FrameSource, ProjectionOutput, SharedStage, StageRegistry,
};
use crate::config::ProjectionConfig;
use crate::dimred::landmarks::projection_layout;
use crate::optimization::ConjugateGradient;
use crate::reference::{FrameLayout, StoredFrame};

/// Half-width of the uniform perturbation applied to the initial guess
const INITIAL_JITTER: f64 = 0.005;

pub struct OutOfSampleProjector {
    label: String,
    data: SharedStage,
    reduction: SharedStage,
    low_dimension: usize,
    minimizer: ConjugateGradient,
    seed: u64,
    layout: Arc<FrameLayout>,
}

impl OutOfSampleProjector {
    pub fn new(config: &ProjectionConfig, registry: &StageRegistry) -> Result<Self, AnalysisError> {
        let data = registry.resolve(&config.data)?;
        let reduction = registry.get(&config.projection).ok_or_else(|| {
            AnalysisError::configuration(format!(
                "could not find projection of data named {}",
                config.projection
            ))
        })?;

        let low_dimension = {
            let stage = reduction.read();
            let embedding = stage.landmark_embedding().ok_or_else(|| {
                AnalysisError::configuration(format!(
                    "{} does not provide a landmark embedding",
                    config.projection
                ))
            })?;
            let reduction_base = stage.base_data_label();
            let data_base = data.read().base_data_label();
            if reduction_base != data_base {
                return Err(AnalysisError::configuration(format!(
                    "mismatch between base data labels for {} ({}) and {} ({})",
                    config.projection, reduction_base, config.data, data_base
                )));
            }
            embedding.low_dimension()
        };

        info!(
            "  projecting points from {} into the {}-dimensional embedding {}",
            config.data, low_dimension, config.projection
        );
        info!("  tolerance for conjugate gradient algorithm equals {}", config.cgtol);

        Ok(Self {
            layout: projection_layout(&config.label, low_dimension)?,
            label: config.label.clone(),
            data,
            reduction,
            low_dimension,
            minimizer: ConjugateGradient::new(config.cgtol),
            seed: config.seed,
        })
    }

    pub fn low_dimension(&self) -> usize {
        self.low_dimension
    }

    /// Project frame `index` with a generator seeded from the configured seed
    pub fn generate_projection(&self, index: usize) -> Result<Vec<f64>, AnalysisError> {
        let mut rng = ChaCha20Rng::seed_from_u64(self.seed);
        self.generate_projection_with(index, &mut rng)
    }

    /// Project frame `index`, drawing the initial-guess perturbation from `rng`
    pub fn generate_projection_with<R: Rng>(
        &self,
        index: usize,
        rng: &mut R,
    ) -> Result<Vec<f64>, AnalysisError> {
        let stage = self.reduction.read();
        let embedding = stage.landmark_embedding().ok_or_else(|| {
            AnalysisError::invariant(format!("{} lost its landmark embedding", stage.label()))
        })?;

        let targets = {
            let data = self.data.read();
            (0..embedding.number_of_landmarks())
                .map(|landmark| {
                    data.distance_between_frames(index, embedding.landmark_index_in_base(landmark), true)
                        .map(f64::sqrt)
                })
                .collect::<Result<Vec<f64>, AnalysisError>>()?
        };

        let closest = targets
            .iter()
            .enumerate()
            .min_by(|a, b| a.1.total_cmp(b.1))
            .map(|(landmark, _)| landmark)
            .ok_or_else(|| {
                AnalysisError::configuration(format!("{} has no landmarks", stage.label()))
            })?;

        let projections = embedding.projections();
        let start = DVector::from_iterator(
            self.low_dimension,
            (0..self.low_dimension).map(|k| {
                projections[(closest, k)] + (rng.gen::<f64>() - 0.5) * 2.0 * INITIAL_JITTER
            }),
        );

        let stress = |point: &DVector<f64>, gradient: &mut DVector<f64>| {
            embedding.calculate_stress(point, &targets, gradient)
        };
        let minimum = self.minimizer.minimise(&stress, start);
        trace!(
            "{}: frame {} projected after {} iterations, stress {:e}",
            self.label,
            index,
            minimum.iterations,
            minimum.value
        );

        Ok(minimum.point.iter().copied().collect())
    }
}

impl FrameSource for OutOfSampleProjector {
    fn number_of_data_points(&self) -> usize {
        self.data.read().number_of_data_points()
    }

    fn weight(&self, index: usize) -> f64 {
        self.data.read().weight(index)
    }

    fn data_point(&self, index: usize) -> Result<Vec<f64>, AnalysisError> {
        self.generate_projection(index)
    }

    fn reference_configuration(&self, index: usize) -> Result<StoredFrame, AnalysisError> {
        let point = self.generate_projection(index)?;
        let mut frame = StoredFrame::empty(self.layout.clone());
        frame.set_reference_config(&[], &point)?;
        frame.set_weight(self.weight(index));
        Ok(frame)
    }

    fn distance_between_frames(
        &self,
        iframe: usize,
        jframe: usize,
        squared: bool,
    ) -> Result<f64, AnalysisError> {
        self.data
            .read()
            .distance_between_frames(iframe, jframe, squared)
    }
}

impl DataProvider for OutOfSampleProjector {
    fn label(&self) -> &str {
        &self.label
    }

    fn base_data_label(&self) -> String {
        self.data.read().base_data_label()
    }

    fn retrieve_norm(&self) -> f64 {
        self.data.read().retrieve_norm()
    }

    fn normalization(&self) -> f64 {
        self.data.read().normalization()
    }

    fn run_frequency(&self) -> Option<u64> {
        self.data.read().run_frequency()
    }

    fn projection_output(&self) -> Option<&dyn ProjectionOutput> {
        Some(self)
    }
}

impl ProjectionOutput for OutOfSampleProjector {
    fn dimension_of_output_points(&self) -> usize {
        self.low_dimension
    }

    fn number_of_output_points(&self) -> usize {
        self.number_of_data_points()
    }

    fn output_weight(&self, index: usize) -> f64 {
        self.weight(index)
    }

    fn output_point(&self, index: usize) -> Result<Vec<f64>, AnalysisError> {
        self.generate_projection(index)
    }

    fn output_configuration(&self, index: usize) -> Result<StoredFrame, AnalysisError> {
        self.reference_configuration(index)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::Accumulator;
    use crate::config::{AnalysisConfig, HostContext, StepData};
    use crate::dimred::FixedLandmarkEmbedding;
    use approx::assert_abs_diff_eq;
    use nalgebra::DMatrix;
    use parking_lot::RwLock;

    const THIRD: f64 = 1.0 / 3.0;

    fn store(registry: &mut StageRegistry, label: &str, points: &[[f64; 2]]) {
        let config = AnalysisConfig::windowed(label, &["x", "y"], 1, points.len() as u64);
        let mut acc = Accumulator::new(&config, &HostContext::default(), registry).unwrap();
        for (n, p) in points.iter().enumerate() {
            acc.accumulate(&StepData::with_arguments(n as u64 + 1, n as f64 + 1.0, p.to_vec()))
                .unwrap();
        }
        registry.register(Arc::new(RwLock::new(acc))).unwrap();
    }

    fn triangle(registry: &mut StageRegistry, base: &str) {
        let projections = DMatrix::from_row_slice(3, 2, &[0.0, 0.0, 1.0, 0.0, 0.0, 1.0]);
        let embedding =
            FixedLandmarkEmbedding::new("smap", base, registry, vec![0, 1, 2], projections).unwrap();
        registry.register(Arc::new(RwLock::new(embedding))).unwrap();
    }

    fn setup() -> StageRegistry {
        let mut registry = StageRegistry::new();
        store(
            &mut registry,
            "store",
            &[[0.0, 0.0], [1.0, 0.0], [0.0, 1.0], [THIRD, THIRD], [0.8, 0.6]],
        );
        triangle(&mut registry, "store");
        registry
    }

    #[test]
    fn test_projection_recovers_trilaterated_point() {
        let registry = setup();
        let projector =
            OutOfSampleProjector::new(&ProjectionConfig::new("oos", "store", "smap"), &registry)
                .unwrap();

        let point = projector.generate_projection(3).unwrap();
        assert_eq!(point.len(), 2);
        assert_abs_diff_eq!(point[0], THIRD, epsilon = 1e-3);
        assert_abs_diff_eq!(point[1], THIRD, epsilon = 1e-3);
        assert_eq!(projector.data_point(3).unwrap(), point);
    }

    #[test]
    fn test_projection_is_reproducible() {
        let registry = setup();
        let projector =
            OutOfSampleProjector::new(&ProjectionConfig::new("oos", "store", "smap"), &registry)
                .unwrap();
        assert_eq!(
            projector.generate_projection(3).unwrap(),
            projector.generate_projection(3).unwrap()
        );

        let mut rng = ChaCha20Rng::seed_from_u64(99);
        let other = projector.generate_projection_with(3, &mut rng).unwrap();
        assert_abs_diff_eq!(other[0], THIRD, epsilon = 1e-3);
    }

    #[test]
    fn test_reference_configuration_names_coordinates() {
        let registry = setup();
        let projector =
            OutOfSampleProjector::new(&ProjectionConfig::new("oos", "store", "smap"), &registry)
                .unwrap();
        let frame = projector.reference_configuration(3).unwrap();
        let names: Vec<&str> = frame.layout().argument_names().collect();
        assert_eq!(names, vec!["oos.1", "oos.2"]);
        assert_eq!(frame.weight(), projector.weight(3));
        assert_eq!(projector.base_data_label(), "store");
    }

    #[test]
    fn test_unresolved_projection_is_rejected() {
        let registry = setup();
        let err = OutOfSampleProjector::new(&ProjectionConfig::new("oos", "store", "nothing"), &registry)
            .err()
            .unwrap();
        assert!(err.to_string().contains("could not find projection of data named nothing"));
    }

    #[test]
    fn test_base_label_mismatch_is_rejected() {
        let mut registry = setup();
        store(&mut registry, "other", &[[0.0, 0.0], [1.0, 1.0]]);
        let err = OutOfSampleProjector::new(&ProjectionConfig::new("oos", "other", "smap"), &registry)
            .err()
            .unwrap();
        assert!(matches!(err, AnalysisError::Configuration(_)));
        assert!(err.to_string().contains("mismatch between base data labels"));
    }

    #[test]
    fn test_projection_without_embedding_is_rejected() {
        let registry = setup();
        let err = OutOfSampleProjector::new(&ProjectionConfig::new("oos", "store", "store"), &registry)
            .err()
            .unwrap();
        assert!(matches!(err, AnalysisError::Configuration(_)));
    }
}
