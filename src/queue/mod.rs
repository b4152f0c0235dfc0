pub mod task;

use std::collections::{BTreeMap, VecDeque};
use std::sync::Arc;

use tokio::sync::Semaphore;
use tokio::task::JoinSet;

use crate::context::AppContext;
use crate::error::Result;
use crate::workflow;
use crate::workflow::types::WorkflowOutcome;

use task::Task;

/// Result of one task, tagged with its repository.
#[derive(Debug)]
pub struct TaskReport {
    pub repo: String,
    pub task: String,
    pub outcome: WorkflowOutcome,
}

/// Task queue with one FIFO per repository.
///
/// Repositories are processed in parallel up to the concurrency limit; the
/// tasks of one repository always run in the order they were enqueued.
pub struct TaskQueue {
    queues: BTreeMap<String, VecDeque<Task>>,
    max_concurrent: usize,
}

impl TaskQueue {
    pub fn new(max_concurrent: usize) -> Self {
        Self {
            queues: BTreeMap::new(),
            max_concurrent: max_concurrent.max(1),
        }
    }

    pub fn enqueue(&mut self, task: Task) {
        let repo = task.repo_full_name();
        tracing::debug!(repo = %repo, task = %task.description(), "Enqueuing task");
        self.queues.entry(repo).or_default().push_back(task);
    }

    pub fn len(&self) -> usize {
        self.queues.values().map(VecDeque::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Drain every queue. A failed task is logged and reported; later tasks
    /// of the same repository still run.
    pub async fn run(self, ctx: Arc<AppContext>) -> Vec<TaskReport> {
        let permits = Arc::new(Semaphore::new(self.max_concurrent));
        let mut workers = JoinSet::new();

        tracing::info!(
            repos = self.queues.len(),
            tasks = self.len(),
            max_concurrent = self.max_concurrent,
            "Queue processor started"
        );

        for (repo, tasks) in self.queues {
            let ctx = Arc::clone(&ctx);
            let permits = Arc::clone(&permits);
            workers.spawn(async move {
                let Ok(_permit) = permits.acquire_owned().await else {
                    return Vec::new();
                };
                let mut reports = Vec::with_capacity(tasks.len());
                for task in tasks {
                    let outcome = match execute(&ctx, &task).await {
                        Ok(outcome) => {
                            tracing::info!(
                                task = %task.description(),
                                outcome = ?outcome,
                                "Task completed"
                            );
                            outcome
                        }
                        Err(e) => {
                            tracing::error!(
                                task = %task.description(),
                                error = %e,
                                "Task failed"
                            );
                            WorkflowOutcome::Failed {
                                error: e.to_string(),
                            }
                        }
                    };
                    reports.push(TaskReport {
                        repo: repo.clone(),
                        task: task.description(),
                        outcome,
                    });
                }
                reports
            });
        }

        let mut reports = Vec::new();
        while let Some(joined) = workers.join_next().await {
            match joined {
                Ok(batch) => reports.extend(batch),
                Err(e) => tracing::error!(error = %e, "Repository worker panicked"),
            }
        }
        reports
    }
}

async fn execute(ctx: &AppContext, task: &Task) -> Result<WorkflowOutcome> {
    match task {
        Task::BuildDataset { owner, name, until } => {
            workflow::dataset::build_repo_dataset(ctx, owner, name, *until).await
        }
        Task::UpdateSplits { owner, name } => {
            workflow::training::update_repo_splits(ctx, owner, name).await
        }
        Task::Publish {
            owner,
            name,
            until,
            models,
        } => workflow::publish::publish_repo(ctx, owner, name, *until, models).await,
    }
}
