use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::dataset::SnapshotKey;
use crate::training::metrics::Metrics;

/// Owner and name of the summary that aggregates every repository.
pub const GLOBAL: &str = "";

/// Train/test split, latest metrics and deployed models of one repository
/// under one newcomer threshold.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrainingSummary {
    pub owner: String,
    pub name: String,
    pub threshold: u8,
    /// Training snapshots in assignment order. Items assigned during warm-up
    /// appear twice.
    pub issues_train: Vec<SnapshotKey>,
    /// Held-out snapshots, oldest first.
    pub issues_test: Vec<SnapshotKey>,
    pub n_resolved_issues: u64,
    pub n_newcomer_resolved: u64,
    pub n_open_issues: u64,
    pub n_gfis: u64,
    pub metrics: Option<Metrics>,
    pub model_90_file: Option<String>,
    pub model_full_file: Option<String>,
    pub last_updated: Option<DateTime<Utc>>,
}

impl TrainingSummary {
    pub fn new(owner: &str, name: &str, threshold: u8) -> Self {
        Self {
            owner: owner.to_string(),
            name: name.to_string(),
            threshold,
            issues_train: Vec::new(),
            issues_test: Vec::new(),
            n_resolved_issues: 0,
            n_newcomer_resolved: 0,
            n_open_issues: 0,
            n_gfis: 0,
            metrics: None,
            model_90_file: None,
            model_full_file: None,
            last_updated: None,
        }
    }

    pub fn global(threshold: u8) -> Self {
        Self::new(GLOBAL, GLOBAL, threshold)
    }

    pub fn is_global(&self) -> bool {
        self.owner == GLOBAL && self.name == GLOBAL
    }
}

/// Latest score of one open issue under one newcomer threshold.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Prediction {
    pub owner: String,
    pub name: String,
    pub number: u64,
    pub threshold: u8,
    pub probability: f64,
    /// `probability >= gfi_threshold`.
    pub is_gfi: bool,
    /// Snapshot the probability was computed from.
    pub before: DateTime<Utc>,
    pub last_updated: DateTime<Utc>,
    /// The issue was already labeled on GitHub.
    pub tagged: bool,
    /// A recommendation comment was already posted on GitHub.
    pub commented: bool,
}
