//! Log-weights and their normalization
//!
//! A frame sampled from a biased or differently tempered simulation carries a
//! log-weight
//!
//! ```text
//! ww = -(1/kT_target - 1/kT_sim) (E + V) + V / kT_sim
//! ```
//!
//! where the first term is present only when a reweighting temperature is
//! configured and the second only when biases are. Once a window is complete
//! the log-weights are exponentiated either block-locally (shifted by the
//! window maximum) or cumulatively against a running normalization constant
//! that carries over between windows.
//!
//! Copyright (c) 2025 Mohammad Atashi <mohammadaliatashi@icloud.com>

use log::info;

use crate::analysis::AnalysisError;
use crate::config::{AnalysisConfig, HostContext, StepData};

/// How a finished window's weights are normalized
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NormalizationMode {
    /// Each window on its own, shifted by the window's largest log-weight
    BlockLocal,
    /// Against the running constant accumulated over all previous windows
    Cumulative,
}

/// Converts host energies and biases into log-weights
#[derive(Debug, Clone, PartialEq)]
pub struct Reweighting {
    simulation_kbt: f64,
    target_kbt: Option<f64>,
    biases: Vec<String>,
}

impl Reweighting {
    pub fn from_config(config: &AnalysisConfig, host: &HostContext) -> Result<Self, AnalysisError> {
        let biases = if config.reweight_bias {
            if config.bias_labels.is_empty() {
                return Err(AnalysisError::configuration(
                    "asking to reweight bias but there does not appear to be a bias acting on the system",
                ));
            }
            info!("  reweighting using the following biases {}", config.bias_labels.join(" "));
            config.bias_labels.clone()
        } else {
            Vec::new()
        };

        let target_kbt = match config.reweight_temp {
            Some(t) if t != 0.0 => {
                info!("  reweighting simulation to probabilities at temperature {}", t);
                Some(t * host.boltzmann)
            }
            _ => None,
        };

        let simulation_kbt = match config.temp {
            Some(t) if t > 0.0 => t * host.boltzmann,
            _ => host.kbt,
        };

        if (target_kbt.is_some() || !biases.is_empty()) && simulation_kbt == 0.0 {
            return Err(AnalysisError::configuration(
                "the MD engine does not pass the temperature so it has to be specified using TEMP",
            ));
        }

        Ok(Self {
            simulation_kbt,
            target_kbt,
            biases,
        })
    }

    /// Every frame gets log-weight zero
    pub fn unweighted(simulation_kbt: f64) -> Self {
        Self {
            simulation_kbt,
            target_kbt: None,
            biases: Vec::new(),
        }
    }

    pub fn simulation_kbt(&self) -> f64 {
        self.simulation_kbt
    }

    pub fn needs_energy(&self) -> bool {
        self.target_kbt.is_some()
    }

    pub fn bias_labels(&self) -> &[String] {
        &self.biases
    }

    pub fn log_weight(&self, step: &StepData) -> Result<f64, AnalysisError> {
        let mut bias = 0.0;
        for label in &self.biases {
            bias += step.biases.get(label).copied().ok_or_else(|| {
                AnalysisError::MissingInput(format!("no value for bias {} at step {}", label, step.step))
            })?;
        }

        let mut ww = 0.0;
        if let Some(target) = self.target_kbt {
            let energy = step.energy.ok_or_else(|| {
                AnalysisError::MissingInput(format!("no potential energy at step {}", step.step))
            })?;
            ww = -((1.0 / target) - (1.0 / self.simulation_kbt)) * (energy + bias);
        }
        if !self.biases.is_empty() {
            ww += bias / self.simulation_kbt;
        }
        Ok(ww)
    }
}

/// Window and running normalization constants
#[derive(Debug, Clone, PartialEq)]
pub struct NormalizationState {
    mode: NormalizationMode,
    norm: f64,
    old_norm: f64,
    first_analysis_done: bool,
}

impl NormalizationState {
    pub fn new(mode: NormalizationMode) -> Self {
        Self {
            mode,
            norm: 0.0,
            old_norm: 0.0,
            first_analysis_done: false,
        }
    }

    pub fn mode(&self) -> NormalizationMode {
        self.mode
    }

    /// Normalization of the current window
    pub fn norm(&self) -> f64 {
        self.norm
    }

    /// Running normalization over all completed windows
    pub fn old_norm(&self) -> f64 {
        self.old_norm
    }

    pub fn first_analysis_done(&self) -> bool {
        self.first_analysis_done
    }

    /// Reinstate the running constant read back from a checkpoint
    pub fn restore(&mut self, old_norm: f64) {
        self.old_norm = old_norm;
        self.first_analysis_done = old_norm > 0.0;
    }

    /// Adopt a window normalization computed elsewhere
    pub fn set_window_norm(&mut self, norm: f64) {
        self.norm = norm;
    }

    /// Convert a window of log-weights into weights, updating the window norm
    pub fn finalize(&mut self, log_weights: &[f64], ignore_weights: bool) -> Vec<f64> {
        if ignore_weights {
            self.norm = log_weights.len() as f64;
            return vec![1.0; log_weights.len()];
        }

        match self.mode {
            NormalizationMode::BlockLocal => {
                let max = log_weights
                    .iter()
                    .copied()
                    .fold(f64::NEG_INFINITY, f64::max);
                let weights: Vec<f64> = log_weights.iter().map(|&l| (l - max).exp()).collect();
                self.norm = weights.iter().sum();
                weights
            }
            NormalizationMode::Cumulative => {
                self.norm = log_weights.iter().map(|&l| l.exp()).sum();
                if !self.first_analysis_done {
                    self.old_norm = 1.0;
                }
                let weights = log_weights
                    .iter()
                    .map(|&l| l.exp() / self.old_norm)
                    .collect();
                if !self.first_analysis_done {
                    self.old_norm = 0.0;
                }
                weights
            }
        }
    }

    /// Fold the window normalization into the running constant
    pub fn complete_window(&mut self) {
        self.old_norm += self.norm;
        self.first_analysis_done = true;
    }

    /// Normalization reported to downstream analyses
    pub fn normalization(&self) -> f64 {
        if self.mode == NormalizationMode::BlockLocal || !self.first_analysis_done {
            self.norm
        } else {
            1.0 + self.norm / self.old_norm
        }
    }
}
