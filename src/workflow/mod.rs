pub mod dataset;
pub mod publish;
pub mod training;
pub mod types;

use std::sync::Arc;

use chrono::{DateTime, Utc};

use crate::context::AppContext;
use crate::error::{AppError, Result};
use crate::queue::task::Task;
use crate::queue::{TaskQueue, TaskReport};
use crate::source::types::Repo;

use types::Stage;

/// Repositories to process: all known ones, or those named in `filter`
/// as `owner/name`.
pub async fn select_repos(ctx: &AppContext, filter: &[String]) -> Result<Vec<Repo>> {
    let repos = ctx.source.list_repos().await?;
    if filter.is_empty() {
        return Ok(repos);
    }
    for wanted in filter {
        if !repos.iter().any(|r| &r.full_name() == wanted) {
            return Err(AppError::Source(format!("Unknown repository {wanted}")));
        }
    }
    Ok(repos
        .into_iter()
        .filter(|r| filter.contains(&r.full_name()))
        .collect())
}

/// Run `stages` in order over `repos`, with `until` as the data cutoff.
///
/// Per-repository failures are reported and do not stop the run. The model
/// update and the global summaries span every repository of the store.
pub async fn run(
    ctx: Arc<AppContext>,
    stages: &[Stage],
    repos: &[Repo],
    until: DateTime<Utc>,
) -> Result<Vec<TaskReport>> {
    let mut stages = stages.to_vec();
    stages.sort();
    stages.dedup();

    let mut reports = Vec::new();
    for stage in stages {
        tracing::info!(stage = ?stage, repos = repos.len(), until = %until.to_rfc3339(), "Starting stage");
        let mut queue = TaskQueue::new(ctx.config.workers.max_concurrent_repos);

        match stage {
            Stage::Dataset => {
                for repo in repos {
                    queue.enqueue(Task::BuildDataset {
                        owner: repo.owner.clone(),
                        name: repo.name.clone(),
                        until,
                    });
                }
                reports.extend(queue.run(Arc::clone(&ctx)).await);
            }
            Stage::Train => {
                for repo in repos {
                    queue.enqueue(Task::UpdateSplits {
                        owner: repo.owner.clone(),
                        name: repo.name.clone(),
                    });
                }
                reports.extend(queue.run(Arc::clone(&ctx)).await);
                for &threshold in &ctx.config.training.newcomer_thresholds {
                    training::update_models(&ctx, threshold, until).await?;
                }
            }
            Stage::Publish => {
                let models = Arc::new(publish::load_models(&ctx).await?);
                for repo in repos {
                    queue.enqueue(Task::Publish {
                        owner: repo.owner.clone(),
                        name: repo.name.clone(),
                        until,
                        models: Arc::clone(&models),
                    });
                }
                reports.extend(queue.run(Arc::clone(&ctx)).await);
                publish::publish_global(&ctx, &models, until).await?;
            }
        }
    }

    let failed = reports.iter().filter(|r| r.outcome.is_failed()).count();
    tracing::info!(tasks = reports.len(), failed, "Run finished");
    Ok(reports)
}
