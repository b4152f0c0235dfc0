use chrono::{DateTime, Utc};

use crate::context::AppContext;
use crate::error::{AppError, Result};
use crate::training::LoadedModels;
use crate::workflow::types::WorkflowOutcome;

/// Load the deployed models of every configured threshold.
///
/// A threshold without a model is logged and left out. Fails with
/// [`AppError::ModelNotFound`] when no threshold has one.
pub async fn load_models(ctx: &AppContext) -> Result<Vec<LoadedModels>> {
    let mut loaded = Vec::new();
    let mut first_error = None;
    for &threshold in &ctx.config.training.newcomer_thresholds {
        match ctx.publisher.load_models(threshold).await {
            Ok(models) => loaded.push(models),
            Err(e) => {
                tracing::error!(threshold, error = %e, "Cannot publish threshold");
                first_error.get_or_insert(e);
            }
        }
    }
    match (loaded.is_empty(), first_error) {
        (true, Some(e)) => Err(e),
        (true, None) => Err(AppError::Config("No newcomer thresholds configured".to_string())),
        _ => Ok(loaded),
    }
}

/// Score the open issues of a repository under every loaded threshold.
pub async fn publish_repo(
    ctx: &AppContext,
    owner: &str,
    name: &str,
    until: DateTime<Utc>,
    models: &[LoadedModels],
) -> Result<WorkflowOutcome> {
    let open: Vec<u64> = ctx
        .source
        .issues(owner, name, until)
        .await?
        .into_iter()
        .filter(|i| i.is_open() && !i.is_pull)
        .map(|i| i.number)
        .collect();

    let mut predictions = 0;
    let mut gfis = 0;
    for threshold_models in models {
        let outcome = ctx
            .publisher
            .publish_repo(owner, name, threshold_models, &open, until)
            .await?;
        predictions += outcome.n_predictions;
        gfis += outcome.n_gfis;
    }

    ctx.store.persist().await?;
    Ok(WorkflowOutcome::Published { predictions, gfis })
}

/// Refresh the global summary of every loaded threshold.
pub async fn publish_global(ctx: &AppContext, models: &[LoadedModels], until: DateTime<Utc>) -> Result<()> {
    for threshold_models in models {
        ctx.publisher.publish_global(threshold_models, until).await?;
    }
    ctx.store.persist().await
}
