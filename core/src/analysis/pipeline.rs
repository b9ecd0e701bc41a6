//! Step-synchronous driver
//!
//! Owns the stage registry and calls every accumulator once per simulation
//! step, in the order they were added, so upstream stages finish a window
//! before the stages reusing them look at it.
//!
//! Copyright (c) 2025 Mohammad Atashi <mohammadaliatashi@icloud.com>

use std::sync::Arc;

use log::{debug, info};
use parking_lot::RwLock;

use crate::analysis::{Accumulator, AnalysisError, SharedStage, StageRegistry};
use crate::config::{AnalysisConfig, HostContext, ProjectionConfig, StepData};
use crate::dimred::OutOfSampleProjector;

pub struct Pipeline {
    host: HostContext,
    registry: StageRegistry,
    accumulators: Vec<Arc<RwLock<Accumulator>>>,
}

impl Pipeline {
    pub fn new(host: HostContext) -> Self {
        Self {
            host,
            registry: StageRegistry::new(),
            accumulators: Vec::new(),
        }
    }

    pub fn host(&self) -> &HostContext {
        &self.host
    }

    pub fn registry(&self) -> &StageRegistry {
        &self.registry
    }

    /// Build an accumulator, register it and schedule it for updates
    pub fn add_accumulator(
        &mut self,
        config: &AnalysisConfig,
    ) -> Result<Arc<RwLock<Accumulator>>, AnalysisError> {
        let accumulator = Arc::new(RwLock::new(Accumulator::new(
            config,
            &self.host,
            &self.registry,
        )?));
        self.registry.register(accumulator.clone())?;
        self.accumulators.push(accumulator.clone());
        Ok(accumulator)
    }

    /// Register a stage built outside the pipeline, such as a reduction stage
    pub fn add_stage(&mut self, stage: SharedStage) -> Result<(), AnalysisError> {
        self.registry.register(stage)
    }

    pub fn add_projector(
        &mut self,
        config: &ProjectionConfig,
    ) -> Result<Arc<RwLock<OutOfSampleProjector>>, AnalysisError> {
        let projector = Arc::new(RwLock::new(OutOfSampleProjector::new(config, &self.registry)?));
        self.registry.register(projector.clone())?;
        Ok(projector)
    }

    /// Feed one simulation step to every accumulator
    pub fn update(&self, step: &StepData) -> Result<(), AnalysisError> {
        debug!("Pipeline step {}", step.step);
        for accumulator in &self.accumulators {
            accumulator.write().update(step)?;
        }
        Ok(())
    }

    /// End-of-run analyses of single-run accumulators
    pub fn run_final_jobs(&self) -> Result<(), AnalysisError> {
        for accumulator in &self.accumulators {
            accumulator.write().run_final_jobs()?;
        }
        info!("Completed final analyses for {} stages", self.accumulators.len());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::{DataProvider, FrameSource};
    use crate::dimred::FixedLandmarkEmbedding;
    use approx::assert_abs_diff_eq;
    use nalgebra::DMatrix;
    use std::cell::Cell;
    use std::rc::Rc;

    fn host() -> HostContext {
        HostContext {
            boltzmann: 1.0,
            kbt: 1.0,
            timestep: 0.5,
        }
    }

    fn step(n: u64) -> StepData {
        let x = n as f64;
        StepData::with_arguments(n, 0.5 * x, vec![x.cos(), x.sin()])
    }

    #[test]
    fn test_reusing_stage_follows_upstream_schedule() -> Result<(), AnalysisError> {
        let mut pipeline = Pipeline::new(host());
        let raw = pipeline.add_accumulator(&AnalysisConfig::windowed("raw", &["c", "s"], 2, 8))?;
        let reuse = pipeline.add_accumulator(&AnalysisConfig::reusing_input("again", "raw"))?;

        let calls = Rc::new(Cell::new(0));
        let counter = calls.clone();
        let upstream = raw.clone();
        reuse.write().set_task(move |data: &dyn DataProvider| -> Result<(), AnalysisError> {
            let up = upstream.read();
            assert_eq!(data.number_of_data_points(), up.number_of_data_points());
            for i in 0..data.number_of_data_points() {
                assert_eq!(data.weight(i), up.weight(i));
                assert_eq!(data.data_point(i)?, up.data_point(i)?);
            }
            counter.set(counter.get() + 1);
            Ok(())
        });

        for n in 0..=24 {
            pipeline.update(&step(n))?;
        }
        pipeline.run_final_jobs()?;

        assert_eq!(raw.read().analyses_run(), 3);
        assert_eq!(reuse.read().analyses_run(), 3);
        assert_eq!(calls.get(), 3);
        Ok(())
    }

    #[test]
    fn test_duplicate_labels_are_rejected() {
        let mut pipeline = Pipeline::new(host());
        pipeline
            .add_accumulator(&AnalysisConfig::windowed("raw", &["c"], 1, 4))
            .unwrap();
        assert!(matches!(
            pipeline.add_accumulator(&AnalysisConfig::windowed("raw", &["c"], 1, 4)),
            Err(AnalysisError::Configuration(_))
        ));
        assert_eq!(pipeline.registry().len(), 1);
    }

    #[test]
    fn test_output_reuse_reads_projections() -> Result<(), AnalysisError> {
        let mut pipeline = Pipeline::new(host());
        let raw = pipeline.add_accumulator(&AnalysisConfig::windowed("raw", &["c", "s"], 1, 6))?;
        let points = [[0.0, 0.0], [1.0, 0.0], [0.0, 1.0], [0.3, 0.2], [0.2, 0.3]];
        for (n, p) in points.iter().enumerate() {
            let n = n as u64 + 1;
            raw.write()
                .accumulate(&StepData::with_arguments(n, 0.5 * n as f64, p.to_vec()))?;
        }

        let projections = DMatrix::from_row_slice(3, 2, &[0.0, 0.0, 1.0, 0.0, 0.0, 1.0]);
        let embedding =
            FixedLandmarkEmbedding::new("smap", "raw", pipeline.registry(), vec![0, 1, 2], projections)?;
        pipeline.add_stage(Arc::new(RwLock::new(embedding)))?;
        let projector = pipeline.add_projector(&ProjectionConfig::new("oos", "raw", "smap"))?;

        let reader = pipeline.add_accumulator(&AnalysisConfig::using_output("plot", "oos"))?;
        let reader = reader.read();
        assert_eq!(reader.run_frequency(), Some(6));
        assert_eq!(reader.base_data_label(), "raw");
        assert_eq!(reader.number_of_data_points(), 6);

        let direct = projector.read().generate_projection(3)?;
        let through_chain = reader.data_point(3)?;
        assert_eq!(direct, through_chain);
        assert_abs_diff_eq!(through_chain[0], 0.3, epsilon = 1e-3);
        assert_abs_diff_eq!(through_chain[1], 0.2, epsilon = 1e-3);
        Ok(())
    }

    #[test]
    fn test_output_reuse_of_plain_accumulator_is_rejected() {
        let mut pipeline = Pipeline::new(host());
        pipeline
            .add_accumulator(&AnalysisConfig::windowed("raw", &["c"], 1, 4))
            .unwrap();
        assert!(matches!(
            pipeline.add_accumulator(&AnalysisConfig::using_output("plot", "raw")),
            Err(AnalysisError::Configuration(_))
        ));
    }
}
