use std::collections::BTreeSet;
use std::fmt;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::dataset::SnapshotKey;
use crate::error::{AppError, Result};
use crate::store::write_atomic;
use crate::training::model::Booster;
use crate::training::vector::FEATURE_NAMES;

/// Which ids a model lineage trains on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Lineage {
    /// Training ids only; scored against the held-out set.
    #[serde(rename = "90")]
    Ninety,
    /// Training and held-out ids; used for predictions.
    #[serde(rename = "full")]
    Full,
}

impl Lineage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Lineage::Ninety => "90",
            Lineage::Full => "full",
        }
    }
}

impl fmt::Display for Lineage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A trained booster together with every snapshot id it has absorbed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelArtifact {
    pub lineage: Lineage,
    pub threshold: u8,
    pub feature_names: Vec<String>,
    pub booster: Booster,
    /// Ids already applied, including those of skipped batches.
    pub trained: BTreeSet<SnapshotKey>,
    pub n_batches: u64,
}

impl ModelArtifact {
    pub fn new(lineage: Lineage, threshold: u8) -> Self {
        Self {
            lineage,
            threshold,
            feature_names: FEATURE_NAMES.iter().map(|n| n.to_string()).collect(),
            booster: Booster::new(FEATURE_NAMES.len()),
            trained: BTreeSet::new(),
            n_batches: 0,
        }
    }

    pub fn predict(&self, row: &[f64]) -> f64 {
        self.booster.predict_proba(row)
    }
}

/// Content-addressed artifact files under one directory.
///
/// Artifacts are immutable: a new training batch always yields a new file,
/// so a crash mid-write never damages the previous model.
#[derive(Debug, Clone)]
pub struct ModelStore {
    dir: PathBuf,
}

impl ModelStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// Write `artifact` and return its file name.
    pub async fn save(&self, artifact: &ModelArtifact) -> Result<String> {
        let bytes = serde_json::to_vec(artifact)?;
        let file_name = artifact_file_name(artifact.lineage, artifact.threshold, &bytes);
        let path = self.dir.join(&file_name);

        if tokio::fs::try_exists(&path).await? {
            tracing::debug!(file = %file_name, "Model artifact already present");
            return Ok(file_name);
        }
        tokio::fs::create_dir_all(&self.dir).await?;
        write_atomic(&path, &bytes).await?;
        tracing::info!(
            file = %file_name,
            lineage = %artifact.lineage,
            threshold = artifact.threshold,
            trees = artifact.booster.trees.len(),
            trained = artifact.trained.len(),
            "Saved model artifact"
        );
        Ok(file_name)
    }

    pub async fn load(&self, file_name: &str) -> Result<ModelArtifact> {
        let path = self.dir.join(file_name);
        let bytes = tokio::fs::read(&path)
            .await
            .map_err(|e| AppError::Model(format!("Failed to read {}: {e}", path.display())))?;
        let artifact: ModelArtifact = serde_json::from_slice(&bytes)?;
        if artifact.feature_names.len() != FEATURE_NAMES.len()
            || artifact.feature_names.iter().zip(FEATURE_NAMES).any(|(a, b)| a != b)
        {
            return Err(AppError::Model(format!(
                "{file_name} was trained on a different feature layout"
            )));
        }
        Ok(artifact)
    }
}

fn artifact_file_name(lineage: Lineage, threshold: u8, bytes: &[u8]) -> String {
    let digest = Sha256::digest(bytes);
    format!("{lineage}-t{threshold}-{}.json", &hex::encode(digest)[..16])
}
