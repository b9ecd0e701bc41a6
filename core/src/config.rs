//! Configuration surface
//!
//! Already-parsed settings for accumulators and out-of-sample projectors,
//! plus the per-step data and constants supplied by the host engine. Settings
//! deserialize from JSON with the defaults below.
//!
//! Copyright (c) 2025 Mohammad Atashi <mohammadaliatashi@icloud.com>

use std::collections::BTreeMap;
use std::path::PathBuf;

use nalgebra::Vector3;
use serde::{Deserialize, Serialize};

use crate::reference::ArgumentSpec;

/// Settings of one accumulating analysis stage
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalysisConfig {
    pub label: String,

    /// How distances between configurations are measured
    #[serde(default = "AnalysisConfig::default_metric")]
    pub metric: String,

    /// Serial numbers of the atoms whose positions are tracked
    #[serde(default)]
    pub atoms: Vec<usize>,

    #[serde(default)]
    pub arguments: Vec<ArgumentSpec>,

    /// Frequency with which data is stored
    #[serde(default = "AnalysisConfig::default_stride")]
    pub stride: u64,

    /// Frequency with which the analysis runs (`RUN`)
    #[serde(default)]
    pub run: Option<u64>,

    /// Analyse the whole trajectory once at the end of the run
    #[serde(default)]
    pub use_all_data: bool,

    #[serde(default)]
    pub reuse_input_data_from: Option<String>,

    #[serde(default)]
    pub use_output_data_from: Option<String>,

    /// Reweight using the biases named in `bias_labels`
    #[serde(default)]
    pub reweight_bias: bool,

    #[serde(default)]
    pub bias_labels: Vec<String>,

    /// Simulation temperature; the host temperature is used when absent
    #[serde(default)]
    pub temp: Option<f64>,

    /// Temperature at which probabilities are reported
    #[serde(default)]
    pub reweight_temp: Option<f64>,

    #[serde(default)]
    pub write_checkpoint: bool,

    #[serde(default)]
    pub restart: bool,

    /// Analyse each block of data separately
    #[serde(default = "AnalysisConfig::default_nomemory")]
    pub nomemory: bool,

    #[serde(default = "AnalysisConfig::default_fmt")]
    pub fmt: String,

    #[serde(default = "AnalysisConfig::default_checkpoint_dir")]
    pub checkpoint_dir: PathBuf,
}

impl AnalysisConfig {
    fn default_metric() -> String {
        "EUCLIDEAN".to_owned()
    }
    fn default_stride() -> u64 {
        1
    }
    fn default_nomemory() -> bool {
        true
    }
    fn default_fmt() -> String {
        "%f".to_owned()
    }
    fn default_checkpoint_dir() -> PathBuf {
        PathBuf::from(".")
    }

    /// Minimal windowed configuration over named, non-periodic arguments
    pub fn windowed(label: impl Into<String>, arguments: &[&str], stride: u64, run: u64) -> Self {
        Self {
            arguments: arguments.iter().map(|a| ArgumentSpec::new(*a)).collect(),
            stride,
            run: Some(run),
            ..Self::new(label)
        }
    }

    pub fn new(label: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            metric: Self::default_metric(),
            atoms: Vec::new(),
            arguments: Vec::new(),
            stride: Self::default_stride(),
            run: None,
            use_all_data: false,
            reuse_input_data_from: None,
            use_output_data_from: None,
            reweight_bias: false,
            bias_labels: Vec::new(),
            temp: None,
            reweight_temp: None,
            write_checkpoint: false,
            restart: false,
            nomemory: Self::default_nomemory(),
            fmt: Self::default_fmt(),
            checkpoint_dir: Self::default_checkpoint_dir(),
        }
    }

    /// A stage that re-analyses the data stored by `upstream`
    pub fn reusing_input(label: impl Into<String>, upstream: impl Into<String>) -> Self {
        Self {
            reuse_input_data_from: Some(upstream.into()),
            ..Self::new(label)
        }
    }

    /// A stage that analyses the projections produced by `upstream`
    pub fn using_output(label: impl Into<String>, upstream: impl Into<String>) -> Self {
        Self {
            use_output_data_from: Some(upstream.into()),
            ..Self::new(label)
        }
    }

    pub fn from_json(json: &str) -> serde_json::Result<Self> {
        serde_json::from_str(json)
    }

    /// Checkpoint file for this stage
    pub fn checkpoint_path(&self) -> PathBuf {
        self.checkpoint_dir
            .join(format!("analysis_{}.chkpnt", self.label))
    }
}

/// Settings of an out-of-sample projector
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProjectionConfig {
    pub label: String,

    /// Accumulator holding the points to project
    pub data: String,

    /// Reduction stage providing the landmark embedding
    pub projection: String,

    /// Tolerance for the conjugate gradient optimisation
    #[serde(default = "ProjectionConfig::default_cgtol")]
    pub cgtol: f64,

    /// Seed of the initial-guess perturbation
    #[serde(default = "ProjectionConfig::default_seed")]
    pub seed: u64,
}

impl ProjectionConfig {
    fn default_cgtol() -> f64 {
        1.0e-6
    }
    fn default_seed() -> u64 {
        1234
    }

    pub fn new(label: impl Into<String>, data: impl Into<String>, projection: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            data: data.into(),
            projection: projection.into(),
            cgtol: Self::default_cgtol(),
            seed: Self::default_seed(),
        }
    }

    pub fn from_json(json: &str) -> serde_json::Result<Self> {
        serde_json::from_str(json)
    }
}

/// Constants supplied by the host engine
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct HostContext {
    /// Boltzmann constant in the host's energy units
    pub boltzmann: f64,

    /// Thermal energy passed by the engine, 0 when it passes none
    #[serde(default)]
    pub kbt: f64,

    /// Length of one simulation step in time units
    pub timestep: f64,
}

impl Default for HostContext {
    fn default() -> Self {
        Self {
            boltzmann: 1.0,
            kbt: 0.0,
            timestep: 1.0,
        }
    }
}

/// Data fed by the host on one simulation step
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StepData {
    pub step: u64,
    pub time: f64,
    pub positions: Vec<Vector3<f64>>,
    pub arguments: Vec<f64>,
    /// Instantaneous potential energy, required for temperature reweighting
    pub energy: Option<f64>,
    /// Bias contributions keyed by bias label
    pub biases: BTreeMap<String, f64>,
}

impl StepData {
    pub fn with_arguments(step: u64, time: f64, arguments: Vec<f64>) -> Self {
        Self {
            step,
            time,
            arguments,
            ..Self::default()
        }
    }

    pub fn with_energy(mut self, energy: f64) -> Self {
        self.energy = Some(energy);
        self
    }

    pub fn with_bias(mut self, label: impl Into<String>, value: f64) -> Self {
        self.biases.insert(label.into(), value);
        self
    }
}
