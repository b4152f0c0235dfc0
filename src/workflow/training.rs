use std::collections::{BTreeSet, HashMap};

use chrono::{DateTime, Utc};

use crate::context::AppContext;
use crate::dataset::SnapshotKey;
use crate::error::Result;
use crate::training::split;
use crate::training::summary::{TrainingSummary, GLOBAL};
use crate::training::Lineage;
use crate::workflow::types::WorkflowOutcome;

/// Assign the resolved snapshots of a repository to the split of every
/// configured threshold and refresh its resolution counts.
pub async fn update_repo_splits(ctx: &AppContext, owner: &str, name: &str) -> Result<WorkflowOutcome> {
    let resolved = ctx.store.resolved_snapshots(owner, name).await;
    let keys: Vec<SnapshotKey> = resolved.iter().map(|s| s.key()).collect();
    let resolved_numbers: BTreeSet<u64> = resolved.iter().map(|s| s.number).collect();

    let mut train_add = 0;
    let mut test_add = 0;
    for &threshold in &ctx.config.training.newcomer_thresholds {
        let mut summary = ctx
            .store
            .summary(owner, name, threshold)
            .await
            .unwrap_or_else(|| TrainingSummary::new(owner, name, threshold));

        let assignment = split::assign(&mut summary, &keys, ctx.config.training.min_test_size);
        summary.n_resolved_issues = resolved_numbers.len() as u64;
        summary.n_newcomer_resolved = resolved
            .iter()
            .filter(|s| s.is_newcomer_resolved(threshold) == Some(true))
            .map(|s| s.number)
            .collect::<BTreeSet<_>>()
            .len() as u64;

        tracing::debug!(
            repo = %format!("{owner}/{name}"),
            threshold,
            train = summary.issues_train.len(),
            test = summary.issues_test.len(),
            train_add = assignment.train_add.len(),
            test_add = assignment.test_add.len(),
            "Updated split"
        );
        train_add += assignment.train_add.len();
        test_add += assignment.test_add.len();
        ctx.store.upsert_summary(summary).await;
    }

    ctx.store.persist().await?;
    Ok(WorkflowOutcome::SplitsUpdated { train_add, test_add })
}

/// Feed the pending ids of every repository into both lineages of
/// `threshold` and record the resulting artifacts in the global summary.
///
/// Pending ids are those not yet absorbed by the artifact, so an interrupted
/// update resumes where it stopped.
pub async fn update_models(ctx: &AppContext, threshold: u8, until: DateTime<Utc>) -> Result<TrainingSummary> {
    let repos = ctx.store.repo_summaries(threshold).await;
    let mut global = ctx
        .store
        .summary(GLOBAL, GLOBAL, threshold)
        .await
        .unwrap_or_else(|| TrainingSummary::global(threshold));

    let train: Vec<SnapshotKey> = repos.iter().flat_map(|s| s.issues_train.iter().cloned()).collect();
    let full: Vec<SnapshotKey> = repos
        .iter()
        .flat_map(|s| s.issues_train.iter().chain(&s.issues_test).cloned())
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect();

    let batch_size = ctx.config.training.batch_size;
    for (lineage, ids) in [(Lineage::Ninety, train), (Lineage::Full, full)] {
        let ordered = chronological(ctx, ids).await;
        let slot = match lineage {
            Lineage::Ninety => &mut global.model_90_file,
            Lineage::Full => &mut global.model_full_file,
        };
        let latest = ctx
            .updater
            .update_model(lineage, slot.as_deref(), threshold, &ordered, batch_size)
            .await?;
        *slot = latest;
    }

    global.last_updated = Some(until);
    ctx.store.upsert_summary(global.clone()).await;
    ctx.store.persist().await?;

    tracing::info!(
        threshold,
        model_90 = ?global.model_90_file,
        model_full = ?global.model_full_file,
        "Model lineages up to date"
    );
    Ok(global)
}

/// Order ids by resolution time, keeping duplicates adjacent. Ids whose
/// snapshot is gone are dropped.
async fn chronological(ctx: &AppContext, ids: Vec<SnapshotKey>) -> Vec<SnapshotKey> {
    let unique: Vec<SnapshotKey> = ids.iter().cloned().collect::<BTreeSet<_>>().into_iter().collect();
    let order: HashMap<SnapshotKey, _> = ctx
        .store
        .snapshots_chunked(&unique, ctx.config.training.dataset_size)
        .await
        .into_iter()
        .map(|s| (s.key(), s.chronological_key()))
        .collect();

    let mut ordered: Vec<SnapshotKey> = ids.into_iter().filter(|k| order.contains_key(k)).collect();
    if order.len() < unique.len() {
        tracing::warn!(missing = unique.len() - order.len(), "Split ids without snapshots");
    }
    ordered.sort_by(|a, b| order[a].cmp(&order[b]));
    ordered
}
