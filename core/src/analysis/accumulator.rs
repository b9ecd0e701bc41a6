//! Weight & accumulation engine
//!
//! An [`Accumulator`] stores one frame per `stride` steps, each tagged with
//! its log-weight. In windowed mode the frames go into a fixed buffer of
//! `run / stride` slots; when the step count reaches a multiple of `run` the
//! weights are finalized, the analysis task runs over the window and the
//! cursor returns to zero. In single-run mode frames are appended for the
//! whole simulation and analysed once by [`Accumulator::run_final_jobs`].
//!
//! Stages configured to reuse another stage's data store nothing: every frame
//! query is forwarded upstream and window size and run frequency are inherited.
//!
//! Windowed local stages can persist the current window to an append-mode
//! checkpoint and rebuild it on restart.
//!
//! Copyright (c) 2025 Mohammad Atashi <mohammadaliatashi@icloud.com>

use std::path::Path;
use std::sync::Arc;

use log::{debug, info, trace, warn};

use crate::analysis::dissimilarity::{DissimilarityKind, DissimilarityMatrix};
use crate::analysis::reuse::DataSource;
use crate::analysis::weights::{NormalizationMode, NormalizationState, Reweighting};
use crate::analysis::{AnalysisError, DataProvider, FrameSource, SharedStage, StageRegistry};
use crate::config::{AnalysisConfig, HostContext, StepData};
use crate::reference::{FrameLayout, MetricRegistry, Periodicity, StoredFrame};
use crate::temporal::{CheckpointLog, CheckpointWriter, NumberFormat};

/// Algorithm run over each completed window
pub trait AnalysisTask {
    fn perform_analysis(&mut self, data: &dyn DataProvider) -> Result<(), AnalysisError>;
}

impl<F> AnalysisTask for F
where
    F: FnMut(&dyn DataProvider) -> Result<(), AnalysisError>,
{
    fn perform_analysis(&mut self, data: &dyn DataProvider) -> Result<(), AnalysisError> {
        self(data)
    }
}

/// Frames held by a local accumulator
struct FrameStore {
    frames: Vec<StoredFrame>,
    log_weights: Vec<f64>,
    dissimilarities: Option<DissimilarityMatrix>,
}

impl FrameStore {
    fn windowed(layout: &Arc<FrameLayout>, window: usize) -> Self {
        Self {
            frames: vec![StoredFrame::empty(layout.clone()); window],
            log_weights: vec![0.0; window],
            dissimilarities: None,
        }
    }

    fn unbounded() -> Self {
        Self {
            frames: Vec::new(),
            log_weights: Vec::new(),
            dissimilarities: None,
        }
    }

    fn frame(&self, index: usize) -> Result<&StoredFrame, AnalysisError> {
        self.frames.get(index).ok_or_else(|| {
            AnalysisError::invariant(format!(
                "frame {} requested but only {} are stored",
                index,
                self.frames.len()
            ))
        })
    }
}

impl FrameSource for FrameStore {
    fn number_of_data_points(&self) -> usize {
        self.frames.len()
    }

    fn weight(&self, index: usize) -> f64 {
        self.frames[index].weight()
    }

    fn data_point(&self, index: usize) -> Result<Vec<f64>, AnalysisError> {
        Ok(self.frame(index)?.arguments().to_vec())
    }

    fn reference_configuration(&self, index: usize) -> Result<StoredFrame, AnalysisError> {
        self.frame(index).cloned()
    }

    fn distance_between_frames(
        &self,
        iframe: usize,
        jframe: usize,
        squared: bool,
    ) -> Result<f64, AnalysisError> {
        let a = self.frame(iframe)?;
        let b = self.frame(jframe)?;
        match &self.dissimilarities {
            Some(matrix) => matrix.distance(iframe, jframe, squared),
            None => Ok(a.distance(b, squared)),
        }
    }
}

enum Source {
    Local(FrameStore),
    Reused(Box<dyn FrameSource>),
}

impl Source {
    fn as_frames(&self) -> &dyn FrameSource {
        match self {
            Source::Local(store) => store,
            Source::Reused(proxy) => proxy.as_ref(),
        }
    }
}

/// One accumulating analysis stage
pub struct Accumulator {
    label: String,
    layout: Arc<FrameLayout>,
    source: Source,
    upstream: Option<SharedStage>,
    reweighting: Reweighting,
    normalization: NormalizationState,
    /// `None` in single-run mode
    run_frequency: Option<u64>,
    stride: u64,
    /// Frames per window, `None` when unbounded
    window: Option<usize>,
    cursor: usize,
    checkpoint: Option<CheckpointWriter>,
    task: Option<Box<dyn AnalysisTask>>,
    analyses_run: usize,
}

impl Accumulator {
    /// Validate `config`, resolve any upstream stage and, when restarting,
    /// rebuild the current window from the checkpoint.
    pub fn new(
        config: &AnalysisConfig,
        host: &HostContext,
        registry: &StageRegistry,
    ) -> Result<Self, AnalysisError> {
        info!("Setting up analysis {}", config.label);

        let metric = MetricRegistry::create(&config.metric)?;
        let layout = Arc::new(FrameLayout::new(
            metric,
            config.atoms.clone(),
            config.arguments.clone(),
        )?);
        let reweighting = Reweighting::from_config(config, host)?;

        let data_source = DataSource::from_config(config)?;
        if let Some((upstream, proxy)) = data_source.resolve(registry)? {
            return Self::delegating(config, layout, reweighting, upstream, proxy);
        }

        if config.stride == 0 {
            return Err(AnalysisError::configuration("STRIDE must be positive"));
        }

        if config.use_all_data {
            info!("  analysing all data in trajectory");
            if config.restart {
                return Err(AnalysisError::configuration(
                    "cannot restart an analysis that uses all data",
                ));
            }
            if config.write_checkpoint {
                warn!("  checkpointing is ignored when USE_ALL_DATA is set");
            }
            return Ok(Self {
                label: config.label.clone(),
                layout,
                source: Source::Local(FrameStore::unbounded()),
                upstream: None,
                reweighting,
                normalization: NormalizationState::new(NormalizationMode::BlockLocal),
                run_frequency: None,
                stride: config.stride,
                window: None,
                cursor: 0,
                checkpoint: None,
                task: None,
                analyses_run: 0,
            });
        }

        let run = config.run.ok_or_else(|| {
            AnalysisError::configuration("RUN must be specified unless USE_ALL_DATA is set")
        })?;
        if run == 0 || run % config.stride != 0 {
            return Err(AnalysisError::configuration(format!(
                "RUN ({}) must be a positive multiple of STRIDE ({})",
                run, config.stride
            )));
        }
        let window = (run / config.stride) as usize;
        info!("  running analysis every {} steps", run);

        let mode = if config.nomemory {
            info!("  normalizing each block of data separately");
            NormalizationMode::BlockLocal
        } else {
            info!("  normalizing with all data accumulated so far");
            NormalizationMode::Cumulative
        };

        let mut accumulator = Self {
            label: config.label.clone(),
            layout: layout.clone(),
            source: Source::Local(FrameStore::windowed(&layout, window)),
            upstream: None,
            reweighting,
            normalization: NormalizationState::new(mode),
            run_frequency: Some(run),
            stride: config.stride,
            window: Some(window),
            cursor: 0,
            checkpoint: None,
            task: None,
            analyses_run: 0,
        };

        let path = config.checkpoint_path();
        let format: NumberFormat = config.fmt.parse()?;
        if config.restart {
            let log = CheckpointLog::read(&path)?;
            accumulator.replay(&log, host.timestep)?;
            if config.write_checkpoint {
                accumulator.checkpoint = Some(CheckpointWriter::resume(
                    &path,
                    format,
                    &log,
                    accumulator.normalization.old_norm(),
                )?);
            } else {
                warn!("  restarting without writing a checkpoint file is somewhat strange");
            }
        } else if config.write_checkpoint {
            accumulator.checkpoint = Some(CheckpointWriter::create(
                &path,
                format,
                accumulator.normalization.old_norm(),
            )?);
        }
        if let Some(writer) = &accumulator.checkpoint {
            info!("  writing checkpoint to {}", writer.path().display());
        }

        Ok(accumulator)
    }

    fn delegating(
        config: &AnalysisConfig,
        layout: Arc<FrameLayout>,
        reweighting: Reweighting,
        upstream: SharedStage,
        proxy: Box<dyn FrameSource>,
    ) -> Result<Self, AnalysisError> {
        let run_frequency = upstream.read().run_frequency();
        if config.run.is_some() || config.use_all_data {
            warn!("  RUN and USE_ALL_DATA are inherited from the reused action and ignored");
        }
        if config.write_checkpoint || config.restart {
            warn!("  checkpointing is ignored when reusing data from another action");
        }
        match run_frequency {
            Some(freq) => info!("  running analysis every {} steps", freq),
            None => info!("  analysing all data in trajectory"),
        }

        Ok(Self {
            label: config.label.clone(),
            layout,
            source: Source::Reused(proxy),
            upstream: Some(upstream),
            reweighting,
            normalization: NormalizationState::new(NormalizationMode::BlockLocal),
            run_frequency,
            stride: run_frequency.unwrap_or(1),
            window: None,
            cursor: 0,
            checkpoint: None,
            task: None,
            analyses_run: 0,
        })
    }

    /// Rebuild the current window from a checkpoint log
    fn replay(&mut self, log: &CheckpointLog, timestep: f64) -> Result<(), AnalysisError> {
        let old_norm = log
            .records
            .last()
            .map(|record| record.old_norm)
            .or(log.old_normalization)
            .unwrap_or(0.0);
        self.normalization.restore(old_norm);

        let window = self.window.unwrap_or(0);
        let expected_gap = self.stride as f64 * timestep;
        let Source::Local(store) = &mut self.source else {
            return Ok(());
        };

        let mut previous_time: Option<f64> = None;
        for record in &log.records {
            if self.cursor >= window {
                return Err(AnalysisError::restart(format!(
                    "checkpoint holds more frames than the analysis window of {}",
                    window
                )));
            }
            if let Some(previous) = previous_time {
                if ((record.time - previous) - expected_gap).abs() > timestep {
                    return Err(AnalysisError::restart(format!(
                        "frequency of data storage in checkpoint is not equal to frequency of data storage in analysis (time {} follows {})",
                        record.time, previous
                    )));
                }
            }
            previous_time = Some(record.time);

            let mut positions = Vec::with_capacity(self.layout.number_of_atoms());
            for serial in self.layout.atoms() {
                let position = record
                    .positions
                    .iter()
                    .find(|(s, _)| s == serial)
                    .map(|&(_, p)| p)
                    .ok_or_else(|| {
                        AnalysisError::restart(format!(
                            "checkpoint record at time {} has no position for atom {}",
                            record.time, serial
                        ))
                    })?;
                positions.push(position);
            }
            let mut arguments = Vec::with_capacity(self.layout.number_of_arguments());
            for name in self.layout.argument_names() {
                let value = record.argument(name).ok_or_else(|| {
                    AnalysisError::restart(format!(
                        "checkpoint record at time {} has no value for {}",
                        record.time, name
                    ))
                })?;
                arguments.push(value);
            }

            let frame = &mut store.frames[self.cursor];
            frame.set_reference_config(&positions, &arguments)?;
            frame.set_weight(record.log_weight);
            store.log_weights[self.cursor] = record.log_weight;
            self.cursor += 1;
        }

        info!(
            "  restarting analysis with {} points read from restart file",
            self.cursor
        );
        Ok(())
    }

    /// Store the frame supplied for this step. Returns whether it was stored.
    pub fn accumulate(&mut self, step: &StepData) -> Result<bool, AnalysisError> {
        let single_run = self.run_frequency.is_none();
        let Source::Local(store) = &mut self.source else {
            return Ok(false);
        };
        if step.step == 0 && !single_run {
            return Ok(false);
        }
        if let Some(window) = self.window {
            if self.cursor >= window {
                debug!("{}: window full, frame at step {} not stored", self.label, step.step);
                return Ok(false);
            }
        }

        let log_weight = self.reweighting.log_weight(step)?;
        if self.window.is_some() {
            store.frames[self.cursor].set_reference_config(&step.positions, &step.arguments)?;
            store.log_weights[self.cursor] = log_weight;
        } else {
            let mut frame = StoredFrame::empty(self.layout.clone());
            frame.set_reference_config(&step.positions, &step.arguments)?;
            store.frames.push(frame);
            store.log_weights.push(log_weight);
        }
        let frame = &mut store.frames[self.cursor];
        frame.set_weight(log_weight);
        store.dissimilarities = None;

        if let Some(writer) = self.checkpoint.as_mut() {
            writer.write_frame(step.time, log_weight, self.normalization.old_norm(), frame)?;
        }

        self.cursor += 1;
        trace!(
            "{}: stored frame {} at step {} with log-weight {}",
            self.label,
            self.cursor,
            step.step,
            log_weight
        );
        Ok(true)
    }

    /// Turn the stored log-weights into weights
    pub fn finalize_weights(&mut self, ignore_weights: bool) -> Result<(), AnalysisError> {
        let store = match &mut self.source {
            Source::Reused(_) => {
                if let Some(upstream) = &self.upstream {
                    self.normalization.set_window_norm(upstream.read().retrieve_norm());
                }
                return Ok(());
            }
            Source::Local(store) => store,
        };

        if store.log_weights.len() != store.frames.len() {
            return Err(AnalysisError::invariant(format!(
                "{} frames stored but {} log-weights",
                store.frames.len(),
                store.log_weights.len()
            )));
        }
        if self.cursor != store.frames.len() {
            return Err(AnalysisError::invariant(format!(
                "cannot finalize weights of {} with {} of {} frames stored",
                self.label,
                self.cursor,
                store.frames.len()
            )));
        }

        let weights = self.normalization.finalize(&store.log_weights, ignore_weights);
        for (frame, weight) in store.frames.iter_mut().zip(weights) {
            frame.set_weight(weight);
        }
        debug!("{}: window normalization {}", self.label, self.normalization.norm());
        Ok(())
    }

    /// Finalize the window, run the analysis task over it and reset the window
    pub fn run_analysis(&mut self) -> Result<(), AnalysisError> {
        self.finalize_weights(false)?;

        if let Some(mut task) = self.task.take() {
            let result = task.perform_analysis(&*self);
            self.task = Some(task);
            result?;
        }
        self.analyses_run += 1;

        self.cursor = 0;
        self.normalization.complete_window();
        if let Source::Local(store) = &mut self.source {
            store.dissimilarities = None;
        }
        if let Some(writer) = self.checkpoint.as_mut() {
            writer.rewind(self.normalization.old_norm())?;
        }
        debug!(
            "{}: analysis {} complete, running normalization {}",
            self.label,
            self.analyses_run,
            self.normalization.old_norm()
        );
        Ok(())
    }

    /// Per-step entry point
    pub fn update(&mut self, step: &StepData) -> Result<(), AnalysisError> {
        if step.step % self.stride != 0 {
            return Ok(());
        }
        self.accumulate(step)?;

        let Some(freq) = self.run_frequency else {
            return Ok(());
        };
        if step.step > 0 && step.step % freq == 0 {
            self.run_analysis()
        } else if self.window_is_full() {
            Err(AnalysisError::restart(format!(
                "analysis window of {} filled before step {}: restart time does not match the stored data",
                self.label, step.step
            )))
        } else {
            Ok(())
        }
    }

    /// Analyse everything stored in single-run mode. Nothing to do otherwise.
    pub fn run_final_jobs(&mut self) -> Result<(), AnalysisError> {
        if self.run_frequency.is_some() {
            return Ok(());
        }
        if self.number_of_data_points() == 0 {
            return Err(AnalysisError::configuration(format!(
                "no data is available for analysis by {}",
                self.label
            )));
        }
        self.run_analysis()
    }

    pub fn set_task(&mut self, task: impl AnalysisTask + 'static) {
        self.task = Some(Box::new(task));
    }

    /// Install a dissimilarity matrix computed by a reduction stage
    pub fn set_dissimilarity_matrix(
        &mut self,
        matrix: DissimilarityMatrix,
    ) -> Result<(), AnalysisError> {
        let Source::Local(store) = &mut self.source else {
            return Err(AnalysisError::configuration(format!(
                "{} reuses data from another action and cannot hold dissimilarities",
                self.label
            )));
        };
        if matrix.dimension() != store.frames.len() {
            return Err(AnalysisError::invariant(format!(
                "dissimilarity matrix of dimension {} does not match {} stored frames",
                matrix.dimension(),
                store.frames.len()
            )));
        }
        store.dissimilarities = Some(matrix);
        Ok(())
    }

    /// Precompute all pairwise dissimilarities of the stored frames
    pub fn compute_dissimilarities(&mut self, kind: DissimilarityKind) -> Result<(), AnalysisError> {
        let matrix = match &self.source {
            Source::Local(store) => DissimilarityMatrix::compute(&store.frames, kind),
            Source::Reused(_) => {
                return Err(AnalysisError::configuration(format!(
                    "{} reuses data from another action and cannot hold dissimilarities",
                    self.label
                )))
            }
        };
        debug!("{}: computed {}x{} dissimilarities", self.label, matrix.dimension(), matrix.dimension());
        self.set_dissimilarity_matrix(matrix)
    }

    pub fn dissimilarity_matrix(&self) -> Option<&DissimilarityMatrix> {
        match &self.source {
            Source::Local(store) => store.dissimilarities.as_ref(),
            Source::Reused(_) => None,
        }
    }

    pub fn periodicity_information(&self, argument: usize) -> Periodicity {
        self.layout.periodicity(argument)
    }

    pub fn layout(&self) -> &Arc<FrameLayout> {
        &self.layout
    }

    pub fn cursor(&self) -> usize {
        self.cursor
    }

    /// Log-weights of the stored frames, empty when reusing
    pub fn log_weights(&self) -> &[f64] {
        match &self.source {
            Source::Local(store) => &store.log_weights,
            Source::Reused(_) => &[],
        }
    }

    pub fn old_norm(&self) -> f64 {
        self.normalization.old_norm()
    }

    pub fn normalization_state(&self) -> &NormalizationState {
        &self.normalization
    }

    pub fn simulation_kbt(&self) -> f64 {
        self.reweighting.simulation_kbt()
    }

    pub fn stride(&self) -> u64 {
        self.stride
    }

    pub fn window_size(&self) -> Option<usize> {
        self.window
    }

    pub fn is_reusing(&self) -> bool {
        self.upstream.is_some()
    }

    pub fn analyses_run(&self) -> usize {
        self.analyses_run
    }

    pub fn checkpoint_path(&self) -> Option<&Path> {
        self.checkpoint.as_ref().map(|writer| writer.path())
    }

    fn window_is_full(&self) -> bool {
        self.window.map_or(false, |window| self.cursor >= window)
    }
}

impl FrameSource for Accumulator {
    fn number_of_data_points(&self) -> usize {
        self.source.as_frames().number_of_data_points()
    }

    fn weight(&self, index: usize) -> f64 {
        self.source.as_frames().weight(index)
    }

    fn data_point(&self, index: usize) -> Result<Vec<f64>, AnalysisError> {
        self.source.as_frames().data_point(index)
    }

    fn reference_configuration(&self, index: usize) -> Result<StoredFrame, AnalysisError> {
        self.source.as_frames().reference_configuration(index)
    }

    fn distance_between_frames(
        &self,
        iframe: usize,
        jframe: usize,
        squared: bool,
    ) -> Result<f64, AnalysisError> {
        self.source
            .as_frames()
            .distance_between_frames(iframe, jframe, squared)
    }
}

impl DataProvider for Accumulator {
    fn label(&self) -> &str {
        &self.label
    }

    fn base_data_label(&self) -> String {
        match &self.upstream {
            Some(upstream) => upstream.read().base_data_label(),
            None => self.label.clone(),
        }
    }

    fn retrieve_norm(&self) -> f64 {
        self.normalization.norm()
    }

    fn normalization(&self) -> f64 {
        self.normalization.normalization()
    }

    fn run_frequency(&self) -> Option<u64> {
        self.run_frequency
    }
}
