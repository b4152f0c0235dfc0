use std::sync::Arc;

use crate::background::Aggregator;
use crate::config::AppConfig;
use crate::dataset::SnapshotBuilder;
use crate::error::Result;
use crate::source::{archive, RepoDataSource};
use crate::store::Store;
use crate::training::{ModelStore, ModelUpdater, Publisher};

/// Shared handles passed to every pipeline stage.
pub struct AppContext {
    pub config: AppConfig,
    pub source: Arc<dyn RepoDataSource>,
    pub store: Arc<Store>,
    pub aggregator: Arc<Aggregator>,
    pub builder: SnapshotBuilder,
    pub updater: ModelUpdater,
    pub publisher: Publisher,
}

impl AppContext {
    /// Load the archives and open the store named in `config`.
    pub async fn new(config: AppConfig) -> Result<Self> {
        let source = archive::load_dir(&config.store.archive_dir).await?;
        let store = Store::open(&config.store.data_dir).await?;
        Ok(Self::with_parts(config, Arc::new(source), Arc::new(store)))
    }

    pub fn with_parts(config: AppConfig, source: Arc<dyn RepoDataSource>, store: Arc<Store>) -> Self {
        let aggregator = Arc::new(Aggregator::new(Arc::clone(&source)));
        let models = ModelStore::new(config.store.model_dir.clone());
        let training = &config.training;

        let builder = SnapshotBuilder::new(Arc::clone(&aggregator), Arc::clone(&store));
        let updater = ModelUpdater::new(
            Arc::clone(&store),
            models.clone(),
            config.model.clone(),
            training.seed,
            training.dataset_size,
        );
        let publisher = Publisher::new(
            Arc::clone(&store),
            models,
            training.gfi_threshold,
            training.dataset_size,
        );

        Self {
            config,
            source,
            store,
            aggregator,
            builder,
            updater,
            publisher,
        }
    }
}
