use std::sync::Arc;

use chrono::{DateTime, Utc};

use crate::training::LoadedModels;

/// Per-repository units of pipeline work.
#[derive(Debug, Clone)]
pub enum Task {
    /// Snapshot resolved and open issues visible at `until`.
    BuildDataset {
        owner: String,
        name: String,
        until: DateTime<Utc>,
    },
    /// Assign newly resolved snapshots to the train/test split of every
    /// threshold.
    UpdateSplits { owner: String, name: String },
    /// Score open issues and refresh held-out metrics.
    Publish {
        owner: String,
        name: String,
        until: DateTime<Utc>,
        models: Arc<Vec<LoadedModels>>,
    },
}

impl Task {
    pub fn repo_full_name(&self) -> String {
        let (owner, name) = match self {
            Task::BuildDataset { owner, name, .. } => (owner, name),
            Task::UpdateSplits { owner, name } => (owner, name),
            Task::Publish { owner, name, .. } => (owner, name),
        };
        format!("{owner}/{name}")
    }

    pub fn description(&self) -> String {
        match self {
            Task::BuildDataset { until, .. } => format!(
                "Build dataset of {} until {}",
                self.repo_full_name(),
                until.to_rfc3339()
            ),
            Task::UpdateSplits { .. } => format!("Update splits of {}", self.repo_full_name()),
            Task::Publish { models, .. } => format!(
                "Publish {} thresholds for {}",
                models.len(),
                self.repo_full_name()
            ),
        }
    }
}
