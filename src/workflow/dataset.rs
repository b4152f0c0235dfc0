use chrono::{DateTime, Utc};

use crate::context::AppContext;
use crate::error::Result;
use crate::source::types::IssueRecord;
use crate::workflow::types::WorkflowOutcome;

/// Snapshot every resolved issue at creation and resolution, and every open
/// issue at its latest visible activity.
///
/// Failures on single issues are logged and counted; the store is persisted
/// once the repository is done.
pub async fn build_repo_dataset(
    ctx: &AppContext,
    owner: &str,
    name: &str,
    until: DateTime<Utc>,
) -> Result<WorkflowOutcome> {
    let repo = format!("{owner}/{name}");
    let mut resolved_snapshots = 0;
    let mut open_snapshots = 0;
    let mut failed = 0;

    let resolved = ctx.aggregator.resolved_issues(owner, name, until).await?;
    tracing::info!(repo = %repo, resolved = resolved.len(), "Building resolved snapshots");
    for issue in &resolved {
        match ctx.builder.build_resolved(owner, name, issue).await {
            Ok(snapshots) => resolved_snapshots += snapshots.len(),
            Err(e) => {
                failed += 1;
                tracing::warn!(repo = %repo, issue = issue.number, error = %e, "Failed to snapshot resolved issue");
            }
        }
    }

    let issues = ctx.source.issues(owner, name, until).await?;
    let open: Vec<&IssueRecord> = issues.iter().filter(|i| i.is_open() && !i.is_pull).collect();
    tracing::info!(repo = %repo, open = open.len(), "Building open issue snapshots");
    for issue in open {
        match snapshot_open(ctx, owner, name, issue, until).await {
            Ok(true) => open_snapshots += 1,
            Ok(false) => {}
            Err(e) => {
                failed += 1;
                tracing::warn!(repo = %repo, issue = issue.number, error = %e, "Failed to snapshot open issue");
            }
        }
    }

    ctx.store.persist().await?;
    Ok(WorkflowOutcome::DatasetBuilt {
        resolved_snapshots,
        open_snapshots,
        failed,
    })
}

async fn snapshot_open(
    ctx: &AppContext,
    owner: &str,
    name: &str,
    issue: &IssueRecord,
    until: DateTime<Utc>,
) -> Result<bool> {
    let events = ctx.source.events(owner, name, issue.number, until).await?;
    let before = events
        .last()
        .map(|e| e.time)
        .unwrap_or(issue.created_at)
        .max(issue.created_at);
    Ok(ctx
        .builder
        .build_snapshot(owner, name, issue.number, before)
        .await?
        .is_some())
}
