/// Outcome of a per-repository task.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WorkflowOutcome {
    /// Snapshots were built or found already present.
    DatasetBuilt {
        resolved_snapshots: usize,
        open_snapshots: usize,
        failed: usize,
    },
    /// New ids were placed into the splits, summed over thresholds.
    SplitsUpdated { train_add: usize, test_add: usize },
    /// Predictions were written, summed over thresholds.
    Published { predictions: u64, gfis: u64 },
    /// The task failed; nothing after the failure point was committed.
    Failed { error: String },
}

impl WorkflowOutcome {
    pub fn is_failed(&self) -> bool {
        matches!(self, WorkflowOutcome::Failed { .. })
    }
}

/// Pipeline stages, in execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Stage {
    /// Build snapshots from the data source.
    Dataset,
    /// Maintain splits and update the model lineages.
    Train,
    /// Write predictions and metrics.
    Publish,
}
