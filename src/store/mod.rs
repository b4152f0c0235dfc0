//! Snapshot, summary and prediction collections.
//!
//! All mutation is upsert-by-key behind one lock, so writers touching
//! different keys never conflict. Summaries are read-modify-written by the
//! single worker that owns their repository. A store opened on a directory
//! persists each collection as JSON arrays replaced atomically: snapshots in
//! one file per repository, summaries and predictions in one file each. Only
//! files whose contents changed since the last persist are rewritten.

use std::collections::{BTreeMap, BTreeSet};
use std::ops::RangeInclusive;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};

use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use tokio::sync::{Mutex, RwLock};

use crate::dataset::{Snapshot, SnapshotKey};
use crate::error::{AppError, Result};
use crate::training::summary::{Prediction, TrainingSummary};

const SNAPSHOTS_DIR: &str = "dataset";
const SUMMARIES_FILE: &str = "training_summary.json";
const PREDICTIONS_FILE: &str = "prediction.json";

type SummaryKey = (String, String, u8);
type PredictionKey = (String, String, u64, u8);

/// What changed since the last persist.
#[derive(Debug, Default)]
struct Dirty {
    repos: BTreeSet<(String, String)>,
    summaries: bool,
    predictions: bool,
}

impl Dirty {
    fn is_empty(&self) -> bool {
        self.repos.is_empty() && !self.summaries && !self.predictions
    }

    fn merge(&mut self, other: Dirty) {
        self.repos.extend(other.repos);
        self.summaries |= other.summaries;
        self.predictions |= other.predictions;
    }
}

#[derive(Default)]
struct Collections {
    snapshots: BTreeMap<SnapshotKey, Snapshot>,
    summaries: BTreeMap<SummaryKey, TrainingSummary>,
    predictions: BTreeMap<PredictionKey, Prediction>,
    dirty: Dirty,
}

impl Collections {
    fn mark_repo(&mut self, key: &SnapshotKey) {
        self.dirty.repos.insert((key.owner.clone(), key.name.clone()));
    }

    fn repo_snapshots(&self, owner: &str, name: &str) -> impl Iterator<Item = &Snapshot> {
        let range = SnapshotKey::new(owner, name, 0, DateTime::<Utc>::MIN_UTC)
            ..=SnapshotKey::new(owner, name, u64::MAX, DateTime::<Utc>::MAX_UTC);
        self.snapshots.range(range).map(|(_, s)| s)
    }

    /// Serialized contents of every file that `dirty` touches.
    fn dirty_files(&self, dir: &Path) -> Result<Vec<(PathBuf, Vec<u8>)>> {
        let mut files = Vec::new();
        for (owner, name) in &self.dirty.repos {
            let snapshots: Vec<&Snapshot> = self.repo_snapshots(owner, name).collect();
            files.push((
                dir.join(SNAPSHOTS_DIR).join(format!("{owner}__{name}.json")),
                serde_json::to_vec(&snapshots)?,
            ));
        }
        if self.dirty.summaries {
            let summaries: Vec<&TrainingSummary> = self.summaries.values().collect();
            files.push((dir.join(SUMMARIES_FILE), serde_json::to_vec(&summaries)?));
        }
        if self.dirty.predictions {
            let predictions: Vec<&Prediction> = self.predictions.values().collect();
            files.push((dir.join(PREDICTIONS_FILE), serde_json::to_vec(&predictions)?));
        }
        Ok(files)
    }
}

fn issue_range(owner: &str, name: &str, number: u64) -> RangeInclusive<SnapshotKey> {
    SnapshotKey::new(owner, name, number, DateTime::<Utc>::MIN_UTC)
        ..=SnapshotKey::new(owner, name, number, DateTime::<Utc>::MAX_UTC)
}

pub struct Store {
    dir: Option<PathBuf>,
    inner: RwLock<Collections>,
    snapshot_writes: AtomicU64,
    /// Serializes writers of the collection files.
    persist_lock: Mutex<()>,
}

impl Store {
    pub fn in_memory() -> Self {
        Self {
            dir: None,
            inner: RwLock::new(Collections::default()),
            snapshot_writes: AtomicU64::new(0),
            persist_lock: Mutex::new(()),
        }
    }

    /// Open the store persisted under `dir`, creating it if needed.
    pub async fn open(dir: &Path) -> Result<Self> {
        let snapshots_dir = dir.join(SNAPSHOTS_DIR);
        tokio::fs::create_dir_all(&snapshots_dir)
            .await
            .map_err(|e| AppError::Store(format!("Failed to create {}: {e}", snapshots_dir.display())))?;

        let mut snapshots: Vec<Snapshot> = Vec::new();
        let mut entries = tokio::fs::read_dir(&snapshots_dir)
            .await
            .map_err(|e| AppError::Store(format!("Failed to list {}: {e}", snapshots_dir.display())))?;
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if path.extension().is_some_and(|ext| ext == "json") {
                snapshots.extend(read_collection::<Snapshot>(&path).await?);
            }
        }
        let summaries: Vec<TrainingSummary> = read_collection(&dir.join(SUMMARIES_FILE)).await?;
        let predictions: Vec<Prediction> = read_collection(&dir.join(PREDICTIONS_FILE)).await?;

        let collections = Collections {
            snapshots: snapshots.into_iter().map(|s| (s.key(), s)).collect(),
            summaries: summaries
                .into_iter()
                .map(|s| ((s.owner.clone(), s.name.clone(), s.threshold), s))
                .collect(),
            predictions: predictions
                .into_iter()
                .map(|p| ((p.owner.clone(), p.name.clone(), p.number, p.threshold), p))
                .collect(),
            dirty: Dirty::default(),
        };

        tracing::info!(
            dir = %dir.display(),
            snapshots = collections.snapshots.len(),
            summaries = collections.summaries.len(),
            predictions = collections.predictions.len(),
            "Opened store"
        );

        Ok(Self {
            dir: Some(dir.to_path_buf()),
            inner: RwLock::new(collections),
            snapshot_writes: AtomicU64::new(0),
            persist_lock: Mutex::new(()),
        })
    }

    /// Write the files changed since the last persist. No-op for in-memory
    /// stores.
    ///
    /// Contents are serialized under the lock and written after releasing it.
    /// A failed write leaves its changes pending for the next persist.
    pub async fn persist(&self) -> Result<()> {
        let Some(dir) = &self.dir else {
            return Ok(());
        };
        let _guard = self.persist_lock.lock().await;
        let (pending, files) = {
            let mut inner = self.inner.write().await;
            if inner.dirty.is_empty() {
                return Ok(());
            }
            let files = inner.dirty_files(dir)?;
            (std::mem::take(&mut inner.dirty), files)
        };

        for (path, bytes) in &files {
            if let Err(e) = write_atomic(path, bytes).await {
                self.inner.write().await.dirty.merge(pending);
                return Err(e);
            }
        }
        tracing::debug!(files = files.len(), "Persisted store");
        Ok(())
    }

    // --- Snapshots ---

    pub async fn snapshot(&self, key: &SnapshotKey) -> Option<Snapshot> {
        self.inner.read().await.snapshots.get(key).cloned()
    }

    /// Insert a snapshot unless one already exists for its key.
    ///
    /// Returns the stored record, which is the existing one on a repeat.
    pub async fn insert_snapshot(&self, snapshot: Snapshot) -> Snapshot {
        let key = snapshot.key();
        let mut inner = self.inner.write().await;
        if let Some(existing) = inner.snapshots.get(&key) {
            return existing.clone();
        }
        self.snapshot_writes.fetch_add(1, Ordering::Relaxed);
        inner.mark_repo(&key);
        inner.snapshots.entry(key).or_insert(snapshot).clone()
    }

    /// Record the resolution of an issue on an existing snapshot.
    ///
    /// This is the only change a stored snapshot ever receives; a snapshot
    /// that already carries a resolution is left untouched.
    pub async fn annotate_resolution(
        &self,
        key: &SnapshotKey,
        closed_at: DateTime<Utc>,
        resolver_commit_num: u32,
    ) -> Option<Snapshot> {
        let mut inner = self.inner.write().await;
        let snapshot = inner.snapshots.get_mut(key)?;
        if snapshot.resolver_commit_num.is_some() {
            return Some(snapshot.clone());
        }
        snapshot.closed_at = Some(closed_at);
        snapshot.resolver_commit_num = Some(resolver_commit_num);
        let annotated = snapshot.clone();
        self.snapshot_writes.fetch_add(1, Ordering::Relaxed);
        inner.mark_repo(key);
        Some(annotated)
    }

    /// Number of snapshot writes performed since the store was opened.
    pub fn snapshot_writes(&self) -> u64 {
        self.snapshot_writes.load(Ordering::Relaxed)
    }

    pub async fn snapshot_count(&self) -> usize {
        self.inner.read().await.snapshots.len()
    }

    /// Resolved snapshots of one repository in resolution order.
    pub async fn resolved_snapshots(&self, owner: &str, name: &str) -> Vec<Snapshot> {
        let mut resolved: Vec<Snapshot> = self
            .inner
            .read()
            .await
            .repo_snapshots(owner, name)
            .filter(|s| s.is_resolved())
            .cloned()
            .collect();
        resolved.sort_by(|a, b| a.chronological_key().cmp(&b.chronological_key()));
        resolved
    }

    /// The most recent snapshot of an issue.
    pub async fn latest_snapshot(&self, owner: &str, name: &str, number: u64) -> Option<Snapshot> {
        self.inner
            .read()
            .await
            .snapshots
            .range(issue_range(owner, name, number))
            .next_back()
            .map(|(_, s)| s.clone())
    }

    /// Fetch snapshots by key, `chunk_size` keys per lock acquisition.
    /// Missing keys are skipped.
    pub async fn snapshots_chunked(&self, keys: &[SnapshotKey], chunk_size: usize) -> Vec<Snapshot> {
        let mut out = Vec::with_capacity(keys.len());
        for chunk in keys.chunks(chunk_size.max(1)) {
            let inner = self.inner.read().await;
            out.extend(chunk.iter().filter_map(|k| inner.snapshots.get(k).cloned()));
        }
        out
    }

    // --- Training summaries ---

    pub async fn summary(&self, owner: &str, name: &str, threshold: u8) -> Option<TrainingSummary> {
        self.inner
            .read()
            .await
            .summaries
            .get(&(owner.to_string(), name.to_string(), threshold))
            .cloned()
    }

    pub async fn upsert_summary(&self, summary: TrainingSummary) {
        let key = (summary.owner.clone(), summary.name.clone(), summary.threshold);
        let mut inner = self.inner.write().await;
        inner.summaries.insert(key, summary);
        inner.dirty.summaries = true;
    }

    /// Per-repository summaries of a threshold, excluding the global one.
    pub async fn repo_summaries(&self, threshold: u8) -> Vec<TrainingSummary> {
        self.inner
            .read()
            .await
            .summaries
            .values()
            .filter(|s| s.threshold == threshold && !s.is_global())
            .cloned()
            .collect()
    }

    // --- Predictions ---

    pub async fn prediction(&self, owner: &str, name: &str, number: u64, threshold: u8) -> Option<Prediction> {
        self.inner
            .read()
            .await
            .predictions
            .get(&(owner.to_string(), name.to_string(), number, threshold))
            .cloned()
    }

    /// Insert or replace a prediction, keeping the GitHub action flags of the
    /// record it replaces.
    pub async fn upsert_prediction(&self, mut prediction: Prediction) {
        let key = (
            prediction.owner.clone(),
            prediction.name.clone(),
            prediction.number,
            prediction.threshold,
        );
        let mut inner = self.inner.write().await;
        if let Some(existing) = inner.predictions.get(&key) {
            prediction.tagged |= existing.tagged;
            prediction.commented |= existing.commented;
        }
        inner.predictions.insert(key, prediction);
        inner.dirty.predictions = true;
    }

    pub async fn predictions(&self, owner: &str, name: &str, threshold: u8) -> Vec<Prediction> {
        self.inner
            .read()
            .await
            .predictions
            .values()
            .filter(|p| p.owner == owner && p.name == name && p.threshold == threshold)
            .cloned()
            .collect()
    }

    /// Drop predictions of issues that are no longer open.
    pub async fn retain_predictions(&self, owner: &str, name: &str, threshold: u8, open: &[u64]) {
        let mut inner = self.inner.write().await;
        let before = inner.predictions.len();
        inner.predictions.retain(|(o, n, number, t), _| {
            !(o == owner && n == name && *t == threshold) || open.contains(number)
        });
        if inner.predictions.len() != before {
            inner.dirty.predictions = true;
        }
    }
}

async fn read_collection<T: DeserializeOwned>(path: &Path) -> Result<Vec<T>> {
    match tokio::fs::read(path).await {
        Ok(bytes) => Ok(serde_json::from_slice(&bytes)?),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Vec::new()),
        Err(e) => Err(AppError::Store(format!("Failed to read {}: {e}", path.display()))),
    }
}

/// Serialize to a sibling temp file and rename it over `path`.
pub async fn write_atomic(path: &Path, bytes: &[u8]) -> Result<()> {
    let tmp = path.with_extension("json.tmp");
    tokio::fs::write(&tmp, bytes)
        .await
        .map_err(|e| AppError::Store(format!("Failed to write {}: {e}", tmp.display())))?;
    tokio::fs::rename(&tmp, path)
        .await
        .map_err(|e| AppError::Store(format!("Failed to replace {}: {e}", path.display())))
}
