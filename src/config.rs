use serde::Deserialize;
use std::path::PathBuf;

use crate::error::{AppError, Result};

#[derive(Debug, Deserialize, Clone, Default)]
pub struct AppConfig {
    #[serde(default)]
    pub store: StoreConfig,
    #[serde(default)]
    pub training: TrainingConfig,
    #[serde(default)]
    pub model: ModelConfig,
    #[serde(default)]
    pub workers: WorkerConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct StoreConfig {
    /// Directory holding the snapshot, summary and prediction collections.
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,
    /// Directory of ingested repository archives.
    #[serde(default = "default_archive_dir")]
    pub archive_dir: PathBuf,
    #[serde(default = "default_model_dir")]
    pub model_dir: PathBuf,
}

#[derive(Debug, Deserialize, Clone)]
pub struct TrainingConfig {
    /// Commit counts below which a resolver counts as a newcomer.
    #[serde(default = "default_newcomer_thresholds")]
    pub newcomer_thresholds: Vec<u8>,
    /// Probability at or above which an open issue is recommended.
    #[serde(default = "default_gfi_threshold")]
    pub gfi_threshold: f64,
    #[serde(default = "default_min_test_size")]
    pub min_test_size: usize,
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    /// Chunk size used when streaming snapshots out of the store.
    #[serde(default = "default_dataset_size")]
    pub dataset_size: usize,
    #[serde(default = "default_seed")]
    pub seed: u64,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ModelConfig {
    #[serde(default = "default_rounds_per_batch")]
    pub rounds_per_batch: usize,
    #[serde(default = "default_max_depth")]
    pub max_depth: usize,
    #[serde(default = "default_learning_rate")]
    pub learning_rate: f64,
    #[serde(default = "default_lambda")]
    pub lambda: f64,
    #[serde(default = "default_min_child_weight")]
    pub min_child_weight: f64,
    /// Upper bound on candidate split points per feature.
    #[serde(default = "default_max_bins")]
    pub max_bins: usize,
}

#[derive(Debug, Deserialize, Clone)]
pub struct WorkerConfig {
    #[serde(default = "default_max_concurrent_repos")]
    pub max_concurrent_repos: usize,
}

fn default_data_dir() -> PathBuf {
    PathBuf::from("data/store")
}

fn default_archive_dir() -> PathBuf {
    PathBuf::from("data/archive")
}

fn default_model_dir() -> PathBuf {
    PathBuf::from("data/models")
}

fn default_newcomer_thresholds() -> Vec<u8> {
    vec![1, 2, 3, 4, 5]
}

fn default_gfi_threshold() -> f64 {
    0.5
}

fn default_min_test_size() -> usize {
    10
}

fn default_batch_size() -> usize {
    1000
}

fn default_dataset_size() -> usize {
    5000
}

fn default_seed() -> u64 {
    0x6f1b_07
}

fn default_rounds_per_batch() -> usize {
    10
}

fn default_max_depth() -> usize {
    4
}

fn default_learning_rate() -> f64 {
    0.3
}

fn default_lambda() -> f64 {
    1.0
}

fn default_min_child_weight() -> f64 {
    1.0
}

fn default_max_bins() -> usize {
    32
}

fn default_max_concurrent_repos() -> usize {
    4
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
            archive_dir: default_archive_dir(),
            model_dir: default_model_dir(),
        }
    }
}

impl Default for TrainingConfig {
    fn default() -> Self {
        Self {
            newcomer_thresholds: default_newcomer_thresholds(),
            gfi_threshold: default_gfi_threshold(),
            min_test_size: default_min_test_size(),
            batch_size: default_batch_size(),
            dataset_size: default_dataset_size(),
            seed: default_seed(),
        }
    }
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            rounds_per_batch: default_rounds_per_batch(),
            max_depth: default_max_depth(),
            learning_rate: default_learning_rate(),
            lambda: default_lambda(),
            min_child_weight: default_min_child_weight(),
            max_bins: default_max_bins(),
        }
    }
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            max_concurrent_repos: default_max_concurrent_repos(),
        }
    }
}

impl AppConfig {
    pub fn load(config_path: Option<&str>) -> Result<Self> {
        let mut builder = config::Config::builder();

        // Load from file if specified
        if let Some(path) = config_path {
            builder = builder.add_source(config::File::with_name(path));
        } else {
            builder = builder.add_source(config::File::with_name("gfibot").required(false));
        }

        // Environment variable overrides with GFIBOT_ prefix
        builder = builder.add_source(
            config::Environment::with_prefix("GFIBOT")
                .separator("__")
                .list_separator(",")
                .with_list_parse_key("training.newcomer_thresholds")
                .try_parsing(true),
        );

        let config: AppConfig = builder
            .build()
            .map_err(|e| AppError::Config(e.to_string()))?
            .try_deserialize()
            .map_err(|e| AppError::Config(e.to_string()))?;

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        let training = &self.training;

        if training.newcomer_thresholds.is_empty() {
            return Err(AppError::Config(
                "training.newcomer_thresholds must not be empty".to_string(),
            ));
        }
        if let Some(t) = training
            .newcomer_thresholds
            .iter()
            .find(|t| !(1..=5).contains(*t))
        {
            return Err(AppError::Config(format!(
                "newcomer threshold {t} is outside 1..=5"
            )));
        }
        if !(0.0..=1.0).contains(&training.gfi_threshold) {
            return Err(AppError::Config(format!(
                "gfi_threshold {} is outside 0.0..=1.0",
                training.gfi_threshold
            )));
        }
        if training.min_test_size == 0 || training.batch_size == 0 || training.dataset_size == 0 {
            return Err(AppError::Config(
                "min_test_size, batch_size and dataset_size must be positive".to_string(),
            ));
        }
        if self.model.max_depth == 0 || self.model.rounds_per_batch == 0 || self.model.max_bins < 2
        {
            return Err(AppError::Config(
                "model.max_depth and model.rounds_per_batch must be positive, model.max_bins at least 2"
                    .to_string(),
            ));
        }
        if self.workers.max_concurrent_repos == 0 {
            return Err(AppError::Config(
                "workers.max_concurrent_repos must be positive".to_string(),
            ));
        }
        Ok(())
    }
}
