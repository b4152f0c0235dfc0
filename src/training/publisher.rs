use std::sync::Arc;

use chrono::{DateTime, Utc};

use crate::dataset::SnapshotKey;
use crate::error::{AppError, Result};
use crate::store::Store;
use crate::training::artifact::{ModelArtifact, ModelStore};
use crate::training::metrics::{evaluate, Metrics};
use crate::training::summary::{Prediction, TrainingSummary, GLOBAL};
use crate::training::vector::vectorize;

/// The deployed models of one threshold.
#[derive(Debug, Clone)]
pub struct LoadedModels {
    pub threshold: u8,
    /// Absent until some training ids exist.
    pub ninety: Option<ModelArtifact>,
    pub full: ModelArtifact,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PublishOutcome {
    pub n_predictions: u64,
    pub n_gfis: u64,
}

/// Writes predictions and evaluation metrics from the deployed models.
pub struct Publisher {
    store: Arc<Store>,
    models: ModelStore,
    gfi_threshold: f64,
    dataset_size: usize,
}

impl Publisher {
    pub fn new(store: Arc<Store>, models: ModelStore, gfi_threshold: f64, dataset_size: usize) -> Self {
        Self {
            store,
            models,
            gfi_threshold,
            dataset_size,
        }
    }

    /// Load the models recorded in the global summary of `threshold`.
    pub async fn load_models(&self, threshold: u8) -> Result<LoadedModels> {
        let global = self
            .store
            .summary(GLOBAL, GLOBAL, threshold)
            .await
            .ok_or(AppError::ModelNotFound { threshold })?;
        let full_file = global
            .model_full_file
            .as_deref()
            .ok_or(AppError::ModelNotFound { threshold })?;

        let full = self.models.load(full_file).await?;
        let ninety = match global.model_90_file.as_deref() {
            Some(file) => Some(self.models.load(file).await?),
            None => None,
        };
        Ok(LoadedModels {
            threshold,
            ninety,
            full,
        })
    }

    /// Score the open issues of a repository and refresh its metrics.
    ///
    /// Predictions of issues missing from `open` are dropped.
    pub async fn publish_repo(
        &self,
        owner: &str,
        name: &str,
        models: &LoadedModels,
        open: &[u64],
        now: DateTime<Utc>,
    ) -> Result<PublishOutcome> {
        let threshold = models.threshold;
        let mut outcome = PublishOutcome::default();

        for &number in open {
            let Some(snapshot) = self.store.latest_snapshot(owner, name, number).await else {
                tracing::debug!(repo = %format!("{owner}/{name}"), issue = number, "No snapshot to score");
                continue;
            };
            let probability = models.full.predict(&vectorize(&snapshot));
            let is_gfi = probability >= self.gfi_threshold;
            self.store
                .upsert_prediction(Prediction {
                    owner: owner.to_string(),
                    name: name.to_string(),
                    number,
                    threshold,
                    probability,
                    is_gfi,
                    before: snapshot.before,
                    last_updated: now,
                    tagged: false,
                    commented: false,
                })
                .await;
            outcome.n_predictions += 1;
            outcome.n_gfis += u64::from(is_gfi);
        }
        self.store.retain_predictions(owner, name, threshold, open).await;

        let mut summary = self
            .store
            .summary(owner, name, threshold)
            .await
            .unwrap_or_else(|| TrainingSummary::new(owner, name, threshold));
        summary.n_open_issues = open.len() as u64;
        summary.n_gfis = outcome.n_gfis;
        summary.metrics = match &models.ninety {
            Some(model) => self.score_held_out(model, &summary.issues_test, threshold).await,
            None => None,
        };
        summary.last_updated = Some(now);
        self.store.upsert_summary(summary).await;

        tracing::info!(
            repo = %format!("{owner}/{name}"),
            threshold,
            predictions = outcome.n_predictions,
            gfis = outcome.n_gfis,
            "Published predictions"
        );
        Ok(outcome)
    }

    /// Aggregate the repository summaries of a threshold into the global one
    /// and score the union of their held-out sets.
    pub async fn publish_global(&self, models: &LoadedModels, now: DateTime<Utc>) -> Result<TrainingSummary> {
        let threshold = models.threshold;
        let repos = self.store.repo_summaries(threshold).await;

        let mut global = self
            .store
            .summary(GLOBAL, GLOBAL, threshold)
            .await
            .unwrap_or_else(|| TrainingSummary::global(threshold));
        global.n_resolved_issues = repos.iter().map(|s| s.n_resolved_issues).sum();
        global.n_newcomer_resolved = repos.iter().map(|s| s.n_newcomer_resolved).sum();
        global.n_open_issues = repos.iter().map(|s| s.n_open_issues).sum();
        global.n_gfis = repos.iter().map(|s| s.n_gfis).sum();

        let test: Vec<SnapshotKey> = repos.iter().flat_map(|s| s.issues_test.iter().cloned()).collect();
        global.metrics = match &models.ninety {
            Some(model) => self.score_held_out(model, &test, threshold).await,
            None => None,
        };
        global.last_updated = Some(now);
        self.store.upsert_summary(global.clone()).await;

        tracing::info!(
            threshold,
            repos = repos.len(),
            test = test.len(),
            auc = ?global.metrics.as_ref().and_then(|m| m.auc),
            "Published global summary"
        );
        Ok(global)
    }

    async fn score_held_out(
        &self,
        model: &ModelArtifact,
        keys: &[SnapshotKey],
        threshold: u8,
    ) -> Option<Metrics> {
        let snapshots = self.store.snapshots_chunked(keys, self.dataset_size).await;
        let (labels, scores): (Vec<bool>, Vec<f64>) = snapshots
            .iter()
            .filter_map(|s| {
                s.is_newcomer_resolved(threshold)
                    .map(|label| (label, model.predict(&vectorize(s))))
            })
            .unzip();
        evaluate(&labels, &scores, self.gfi_threshold)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ModelConfig;
    use crate::dataset::Snapshot;
    use crate::training::artifact::Lineage;
    use crate::training::model::Booster;
    use chrono::TimeZone;

    fn ts(secs: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(secs, 0).unwrap()
    }

    async fn snapshot(store: &Store, number: u64, before: i64, resolver: Option<u32>) -> SnapshotKey {
        let key = SnapshotKey::new("octo", "demo", number, ts(before));
        let mut snapshot = Snapshot::blank(&key);
        snapshot.reporter_feat.n_commits = if resolver == Some(0) { 0 } else { 40 };
        store.insert_snapshot(snapshot).await;
        if let Some(n) = resolver {
            store.annotate_resolution(&key, ts(before + 5), n).await;
        }
        key
    }

    async fn trained(models: &ModelStore, lineage: Lineage, store: &Store, keys: &[SnapshotKey]) -> String {
        let snapshots = store.snapshots_chunked(keys, 10).await;
        let rows: Vec<Vec<f64>> = snapshots.iter().map(vectorize).collect();
        let labels: Vec<bool> = snapshots.iter().map(|s| s.is_newcomer_resolved(1) == Some(true)).collect();
        let mut artifact = ModelArtifact::new(lineage, 1);
        let mut booster = Booster::new(rows[0].len());
        let params = ModelConfig {
            min_child_weight: 0.1,
            ..ModelConfig::default()
        };
        booster.boost(&rows, &labels, &params).unwrap();
        artifact.booster = booster;
        models.save(&artifact).await.unwrap()
    }

    #[tokio::test]
    async fn test_missing_model_is_an_error() {
        let tmp = tempfile::tempdir().unwrap();
        let store = Arc::new(Store::in_memory());
        let publisher = Publisher::new(store.clone(), ModelStore::new(tmp.path()), 0.5, 100);

        let err = publisher.load_models(2).await;
        assert!(matches!(err, Err(AppError::ModelNotFound { threshold: 2 })));

        store.upsert_summary(TrainingSummary::global(2)).await;
        assert!(matches!(
            publisher.load_models(2).await,
            Err(AppError::ModelNotFound { threshold: 2 })
        ));
        assert!(store.predictions("octo", "demo", 2).await.is_empty());
    }

    #[tokio::test]
    async fn test_publish_repo_and_global() {
        let tmp = tempfile::tempdir().unwrap();
        let store = Arc::new(Store::in_memory());
        let models = ModelStore::new(tmp.path());

        let mut train = Vec::new();
        for n in 0..6 {
            train.push(snapshot(&store, n, n as i64 * 10, Some(if n % 2 == 0 { 0 } else { 9 })).await);
        }
        let test = vec![
            snapshot(&store, 10, 100, Some(0)).await,
            snapshot(&store, 11, 110, Some(9)).await,
        ];
        snapshot(&store, 20, 200, None).await;

        let mut global = TrainingSummary::global(1);
        global.model_90_file = Some(trained(&models, Lineage::Ninety, &store, &train).await);
        global.model_full_file = Some(trained(&models, Lineage::Full, &store, &train).await);
        store.upsert_summary(global).await;

        let mut repo = TrainingSummary::new("octo", "demo", 1);
        repo.issues_train = train;
        repo.issues_test = test;
        repo.n_resolved_issues = 8;
        store.upsert_summary(repo).await;

        let mut stale = Prediction {
            owner: "octo".to_string(),
            name: "demo".to_string(),
            number: 20,
            threshold: 1,
            probability: 0.0,
            is_gfi: false,
            before: ts(0),
            last_updated: ts(0),
            tagged: true,
            commented: false,
        };
        store.upsert_prediction(stale.clone()).await;
        stale.number = 99;
        store.upsert_prediction(stale).await;

        let publisher = Publisher::new(store.clone(), models, 0.5, 100);
        let loaded = publisher.load_models(1).await.unwrap();
        let outcome = publisher
            .publish_repo("octo", "demo", &loaded, &[20], ts(1000))
            .await
            .unwrap();
        assert_eq!(outcome.n_predictions, 1);

        let prediction = store.prediction("octo", "demo", 20, 1).await.unwrap();
        assert!(prediction.tagged);
        assert_eq!(prediction.before, ts(200));
        assert!(prediction.probability < 0.5);
        assert!(store.prediction("octo", "demo", 99, 1).await.is_none());

        let summary = store.summary("octo", "demo", 1).await.unwrap();
        let metrics = summary.metrics.unwrap();
        assert_eq!(metrics.n_samples, 2);
        assert_eq!(metrics.auc, Some(1.0));
        assert_eq!(summary.n_open_issues, 1);

        let global = publisher.publish_global(&loaded, ts(1000)).await.unwrap();
        assert_eq!(global.n_resolved_issues, 8);
        assert_eq!(global.metrics.unwrap().n_samples, 2);
        assert!(global.model_full_file.is_some());
    }
}
