use std::sync::Arc;

use clap::{Args, Parser, Subcommand};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use gfibot::config::AppConfig;
use gfibot::context::AppContext;
use gfibot::shutdown::{graceful_shutdown, wait_for_shutdown};
use gfibot::workflow::{self, types::Stage};

#[derive(Parser)]
#[command(name = "gfibot", about = "Good first issue dataset builder and recommender")]
struct Cli {
    /// Path to configuration file
    #[arg(short, long, global = true)]
    config: Option<String>,

    /// Emit logs as JSON lines
    #[arg(long, global = true)]
    json_logs: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Build snapshots of resolved and open issues
    Dataset(RepoFilter),
    /// Update train/test splits and the model lineages
    Train(RepoFilter),
    /// Write predictions and metrics
    Publish(RepoFilter),
    /// Run dataset, train and publish in order
    Update(RepoFilter),
}

#[derive(Args)]
struct RepoFilter {
    /// Restrict to a repository, as owner/name (repeatable)
    #[arg(long = "repo")]
    repos: Vec<String>,
}

impl Command {
    fn stages(&self) -> (&[Stage], &RepoFilter) {
        match self {
            Command::Dataset(f) => (&[Stage::Dataset], f),
            Command::Train(f) => (&[Stage::Train], f),
            Command::Publish(f) => (&[Stage::Publish], f),
            Command::Update(f) => (&[Stage::Dataset, Stage::Train, Stage::Publish], f),
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Initialize tracing
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(cli.json_logs.then(|| tracing_subscriber::fmt::layer().json()))
        .with((!cli.json_logs).then(tracing_subscriber::fmt::layer))
        .init();

    let config = AppConfig::load(cli.config.as_deref())?;
    let (stages, filter) = cli.command.stages();

    tracing::info!(
        data_dir = %config.store.data_dir.display(),
        archive_dir = %config.store.archive_dir.display(),
        thresholds = ?config.training.newcomer_thresholds,
        "Starting gfibot"
    );

    let ctx = Arc::new(AppContext::new(config).await?);
    let repos = workflow::select_repos(&ctx, &filter.repos).await?;
    let until = chrono::Utc::now();

    tokio::select! {
        result = workflow::run(Arc::clone(&ctx), stages, &repos, until) => {
            let reports = result?;
            let failed = reports.iter().filter(|r| r.outcome.is_failed()).count();
            if failed > 0 {
                tracing::warn!(failed, "Some repositories failed; see errors above");
            }
        }
        _ = wait_for_shutdown() => {
            graceful_shutdown(&ctx.store).await;
        }
    }

    Ok(())
}
