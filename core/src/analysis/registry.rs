//! Label-based stage registry
//!
//! Stages are registered once they are constructed, and a stage can only
//! resolve upstreams that are already registered, so the delegation graph is
//! acyclic by construction.
//!
//! Copyright (c) 2025 Mohammad Atashi <mohammadaliatashi@icloud.com>

use std::collections::HashMap;

use log::debug;

use crate::analysis::{AnalysisError, SharedStage};

#[derive(Default)]
pub struct StageRegistry {
    stages: HashMap<String, SharedStage>,
}

impl StageRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, stage: SharedStage) -> Result<(), AnalysisError> {
        let label = stage.read().label().to_owned();
        if self.stages.contains_key(&label) {
            return Err(AnalysisError::configuration(format!(
                "an action labelled {} is already registered",
                label
            )));
        }
        debug!("Registered stage {}", label);
        self.stages.insert(label, stage);
        Ok(())
    }

    pub fn get(&self, label: &str) -> Option<SharedStage> {
        self.stages.get(label).cloned()
    }

    /// Resolve `label` or fail with a configuration error naming it
    pub fn resolve(&self, label: &str) -> Result<SharedStage, AnalysisError> {
        self.get(label).ok_or_else(|| {
            AnalysisError::configuration(format!("could not find action named {}", label))
        })
    }

    pub fn contains(&self, label: &str) -> bool {
        self.stages.contains_key(label)
    }

    pub fn len(&self) -> usize {
        self.stages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.stages.is_empty()
    }
}

impl std::fmt::Debug for StageRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut labels: Vec<&String> = self.stages.keys().collect();
        labels.sort();
        f.debug_struct("StageRegistry").field("stages", &labels).finish()
    }
}
