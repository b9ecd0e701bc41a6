//! Trajectory analysis core
//!
//! Online accumulation of reweighted simulation frames into analysis windows,
//! transparent reuse of one stage's data by another, checkpointed restarts and
//! out-of-sample projection of frames into an existing landmark embedding.
//!
//! The host drives a [`Pipeline`] once per simulation step; stages find each
//! other by label through its [`StageRegistry`].
//!
//! Copyright (c) 2025 Mohammad Atashi <mohammadaliatashi@icloud.com>

pub mod analysis;
pub mod config;
pub mod dimred;
pub mod optimization;
pub mod reference;
pub mod temporal;

pub use analysis::{
    Accumulator, AnalysisError, AnalysisTask, DataProvider, FrameSource, Pipeline,
    ProjectionOutput, SharedStage, StageRegistry,
};
pub use config::{AnalysisConfig, HostContext, ProjectionConfig, StepData};
pub use dimred::{FixedLandmarkEmbedding, LandmarkEmbedding, OutOfSampleProjector};
pub use reference::{Metric, MetricRegistry, StoredFrame};

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Install the `env_logger` backend for the `log` facade.
///
/// Filtering follows `RUST_LOG`. Calling this more than once is harmless.
pub fn init_logging() {
    let _ = env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .format_timestamp_millis()
        .try_init();
}
