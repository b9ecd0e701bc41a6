//! Weight & accumulation engine
//!
//! Accumulators store a stream of reweighted frames, finalize their weights
//! once per analysis window and hand the window to a downstream analysis task.
//! Stages can transparently reuse the data, or the projected output, of an
//! upstream stage.
//!
//! Copyright (c) 2025 Mohammad Atashi <mohammadaliatashi@icloud.com>

pub mod accumulator;
pub mod dissimilarity;
pub mod pipeline;
pub mod provider;
pub mod registry;
pub mod reuse;
pub mod weights;

use thiserror::Error;

use crate::reference::MetricError;
use crate::temporal::CheckpointError;

pub use self::accumulator::{Accumulator, AnalysisTask};
pub use self::dissimilarity::{DissimilarityKind, DissimilarityMatrix};
pub use self::pipeline::Pipeline;
pub use self::provider::{DataProvider, FrameSource, ProjectionOutput, SharedStage};
pub use self::registry::StageRegistry;
pub use self::reuse::{DataSource, InputReuse, OutputReuse};
pub use self::weights::{NormalizationMode, NormalizationState, Reweighting};

/// Analysis errors. Every variant is fatal for the run.
#[derive(Debug, Error)]
pub enum AnalysisError {
    #[error("configuration error: {0}")]
    Configuration(String),

    #[error("restart inconsistency: {0}")]
    RestartConsistency(String),

    #[error("internal inconsistency: {0}")]
    InvariantViolation(String),

    #[error("missing input: {0}")]
    MissingInput(String),

    #[error("metric error: {0}")]
    Metric(#[from] MetricError),

    #[error("checkpoint error: {0}")]
    Checkpoint(#[from] CheckpointError),
}

impl AnalysisError {
    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration(message.into())
    }

    pub fn restart(message: impl Into<String>) -> Self {
        Self::RestartConsistency(message.into())
    }

    pub fn invariant(message: impl Into<String>) -> Self {
        Self::InvariantViolation(message.into())
    }
}
