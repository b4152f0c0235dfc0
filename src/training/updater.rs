//! Batched warm-start updates of a model lineage.

use std::sync::Arc;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use sha2::{Digest, Sha256};

use crate::config::ModelConfig;
use crate::dataset::SnapshotKey;
use crate::error::{AppError, Result};
use crate::store::Store;
use crate::training::artifact::{Lineage, ModelArtifact, ModelStore};
use crate::training::vector::vectorize;

pub struct ModelUpdater {
    store: Arc<Store>,
    models: ModelStore,
    params: ModelConfig,
    seed: u64,
    dataset_size: usize,
}

impl ModelUpdater {
    pub fn new(
        store: Arc<Store>,
        models: ModelStore,
        params: ModelConfig,
        seed: u64,
        dataset_size: usize,
    ) -> Self {
        Self {
            store,
            models,
            params,
            seed,
            dataset_size,
        }
    }

    /// Feed `items` to the lineage rooted at `existing`, `batch_size` at a time.
    ///
    /// Every batch warm-starts from the artifact written by the previous one
    /// and is saved as a new artifact. Items the artifact has already
    /// absorbed are skipped, so repeating a call is a no-op. A one-class
    /// batch adds no trees; while the model is still empty its items are
    /// carried into the next batch instead. Returns the latest artifact file
    /// name, or `None` when no model exists yet.
    pub async fn update_model(
        &self,
        lineage: Lineage,
        existing: Option<&str>,
        threshold: u8,
        items: &[SnapshotKey],
        batch_size: usize,
    ) -> Result<Option<String>> {
        let mut artifact = match existing {
            Some(file) => self.models.load(file).await?,
            None => ModelArtifact::new(lineage, threshold),
        };
        if artifact.lineage != lineage || artifact.threshold != threshold {
            return Err(AppError::Model(format!(
                "Artifact is {}-t{}, expected {lineage}-t{threshold}",
                artifact.lineage, artifact.threshold
            )));
        }

        let pending: Vec<SnapshotKey> = items
            .iter()
            .filter(|k| !artifact.trained.contains(*k))
            .cloned()
            .collect();
        let mut current = existing.map(str::to_string);
        if pending.is_empty() {
            return Ok(current);
        }

        // Ids of batches skipped before anything was learned ride along with
        // the next batch.
        let mut carried: Vec<SnapshotKey> = Vec::new();
        for chunk in pending.chunks(batch_size.max(1)) {
            let batch: Vec<SnapshotKey> = carried.drain(..).chain(chunk.iter().cloned()).collect();
            let applied = self.apply_batch(&mut artifact, &batch).await?;
            if artifact.booster.is_empty() {
                carried = batch;
                continue;
            }

            let batch_len = batch.len();
            artifact.trained.extend(batch);
            artifact.n_batches += 1;
            let file = self.models.save(&artifact).await?;
            tracing::info!(
                lineage = %lineage,
                threshold,
                batch = batch_len,
                applied,
                file = %file,
                "Model lineage updated"
            );
            current = Some(file);
        }
        Ok(current)
    }

    /// Fit one batch into `artifact`. Returns false when the batch was
    /// skipped for lacking one of the classes.
    async fn apply_batch(&self, artifact: &mut ModelArtifact, batch: &[SnapshotKey]) -> Result<bool> {
        let snapshots = self.store.snapshots_chunked(batch, self.dataset_size).await;

        let mut positives: Vec<Vec<f64>> = Vec::new();
        let mut negatives: Vec<Vec<f64>> = Vec::new();
        for snapshot in &snapshots {
            match snapshot.is_newcomer_resolved(artifact.threshold) {
                Some(true) => positives.push(vectorize(snapshot)),
                Some(false) => negatives.push(vectorize(snapshot)),
                None => tracing::warn!(snapshot = %snapshot.key(), "Unresolved snapshot in training batch"),
            }
        }

        if positives.is_empty() || negatives.is_empty() {
            tracing::warn!(
                lineage = %artifact.lineage,
                threshold = artifact.threshold,
                positives = positives.len(),
                negatives = negatives.len(),
                "Skipping batch with a single class"
            );
            return Ok(false);
        }

        let mut rng = StdRng::seed_from_u64(self.seed ^ batch_seed(batch));
        let n_positive = positives.len();
        let mut rows = positives;
        rows.extend((0..n_positive).map(|_| negatives[rng.gen_range(0..negatives.len())].clone()));
        let mut labels = vec![true; n_positive];
        labels.extend(std::iter::repeat(false).take(n_positive));

        let mut booster = artifact.booster.clone();
        let params = self.params.clone();
        artifact.booster = tokio::task::spawn_blocking(move || -> Result<_> {
            booster.boost(&rows, &labels, &params)?;
            Ok(booster)
        })
        .await
        .map_err(|e| AppError::Model(format!("Training task panicked: {e}")))??;
        Ok(true)
    }
}

/// Seed material derived from the ids of a batch.
fn batch_seed(batch: &[SnapshotKey]) -> u64 {
    let mut hasher = Sha256::new();
    for key in batch {
        hasher.update(key.to_string().as_bytes());
        hasher.update([0u8]);
    }
    let digest = hasher.finalize();
    let mut bytes = [0u8; 8];
    bytes.copy_from_slice(&digest[..8]);
    u64::from_le_bytes(bytes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dataset::Snapshot;
    use chrono::{DateTime, TimeZone, Utc};

    fn ts(secs: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(secs, 0).unwrap()
    }

    /// Resolved snapshot whose reporter commit count separates the classes.
    async fn resolved(store: &Store, number: u64, newcomer: bool) -> SnapshotKey {
        let key = SnapshotKey::new("octo", "demo", number, ts(number as i64));
        let mut snapshot = Snapshot::blank(&key);
        snapshot.reporter_feat.n_commits = if newcomer { 0 } else { 50 };
        store.insert_snapshot(snapshot).await;
        store
            .annotate_resolution(&key, ts(number as i64 + 10), if newcomer { 0 } else { 7 })
            .await;
        key
    }

    fn updater(store: Arc<Store>, dir: &std::path::Path) -> ModelUpdater {
        let params = ModelConfig {
            min_child_weight: 0.1,
            ..ModelConfig::default()
        };
        ModelUpdater::new(store, ModelStore::new(dir), params, 7, 100)
    }

    #[tokio::test]
    async fn test_update_creates_artifact() {
        let tmp = tempfile::tempdir().unwrap();
        let store = Arc::new(Store::in_memory());
        let mut items = Vec::new();
        for n in 0..8 {
            items.push(resolved(&store, n, n % 2 == 0).await);
        }

        let updater = updater(store, tmp.path());
        let file = updater
            .update_model(Lineage::Full, None, 1, &items, 4)
            .await
            .unwrap()
            .unwrap();
        let artifact = updater.models.load(&file).await.unwrap();
        assert_eq!(artifact.trained.len(), 8);
        assert_eq!(artifact.n_batches, 2);
        assert!(!artifact.booster.is_empty());
    }

    #[tokio::test]
    async fn test_reapplying_items_is_a_noop() {
        let tmp = tempfile::tempdir().unwrap();
        let store = Arc::new(Store::in_memory());
        let mut items = Vec::new();
        for n in 0..6 {
            items.push(resolved(&store, n, n < 3).await);
        }
        let updater = updater(store, tmp.path());

        let first = updater
            .update_model(Lineage::Ninety, None, 1, &items, 10)
            .await
            .unwrap();
        let second = updater
            .update_model(Lineage::Ninety, first.as_deref(), 1, &items, 10)
            .await
            .unwrap();
        assert_eq!(first, second);
    }

    #[tokio::test]
    async fn test_single_class_batch_is_skipped() {
        let tmp = tempfile::tempdir().unwrap();
        let store = Arc::new(Store::in_memory());
        let mut items = Vec::new();
        for n in 0..4 {
            items.push(resolved(&store, n, true).await);
        }
        let updater = updater(store.clone(), tmp.path());

        let none = updater
            .update_model(Lineage::Full, None, 1, &items, 10)
            .await
            .unwrap();
        assert!(none.is_none());

        // Once a model exists, a one-class batch is recorded but adds no trees.
        items.push(resolved(&store, 10, false).await);
        let file = updater
            .update_model(Lineage::Full, None, 1, &items, 10)
            .await
            .unwrap()
            .unwrap();
        let trees = updater.models.load(&file).await.unwrap().booster.trees.len();

        let more = vec![resolved(&store, 20, true).await];
        let next = updater
            .update_model(Lineage::Full, Some(&file), 1, &more, 10)
            .await
            .unwrap()
            .unwrap();
        let artifact = updater.models.load(&next).await.unwrap();
        assert_eq!(artifact.booster.trees.len(), trees);
        assert!(artifact.trained.contains(&more[0]));
    }

    #[tokio::test]
    async fn test_single_class_batch_before_first_model_is_carried() {
        let tmp = tempfile::tempdir().unwrap();
        let store = Arc::new(Store::in_memory());
        let mut items = Vec::new();
        for n in 0..4 {
            items.push(resolved(&store, n, false).await);
        }
        for n in 4..8 {
            items.push(resolved(&store, n, n % 2 == 0).await);
        }
        let updater = updater(store, tmp.path());

        let file = updater
            .update_model(Lineage::Ninety, None, 1, &items, 4)
            .await
            .unwrap()
            .unwrap();
        let artifact = updater.models.load(&file).await.unwrap();
        assert_eq!(artifact.trained.len(), 8);
        assert_eq!(artifact.n_batches, 1);

        let again = updater
            .update_model(Lineage::Ninety, Some(&file), 1, &items, 4)
            .await
            .unwrap();
        assert_eq!(again.as_deref(), Some(file.as_str()));
    }

    #[tokio::test]
    async fn test_rejects_other_lineage() {
        let tmp = tempfile::tempdir().unwrap();
        let store = Arc::new(Store::in_memory());
        let items = vec![resolved(&store, 1, true).await, resolved(&store, 2, false).await];
        let updater = updater(store, tmp.path());

        let file = updater
            .update_model(Lineage::Full, None, 2, &items, 10)
            .await
            .unwrap()
            .unwrap();
        let err = updater
            .update_model(Lineage::Ninety, Some(&file), 2, &items, 10)
            .await;
        assert!(matches!(err, Err(AppError::Model(_))));
    }

    #[test]
    fn test_batch_seed_is_stable() {
        let a = vec![SnapshotKey::new("o", "n", 1, ts(0))];
        assert_eq!(batch_seed(&a), batch_seed(&a.clone()));
        let b = vec![SnapshotKey::new("o", "n", 2, ts(0))];
        assert_ne!(batch_seed(&a), batch_seed(&b));
    }
}
