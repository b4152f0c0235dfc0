pub mod archive;
pub mod memory;
pub mod types;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::error::Result;
use types::*;

/// Read access to ingested GitHub data.
///
/// Every accessor that returns repository activity takes a `before` bound and
/// returns only records with timestamps `<= before`. Issue records are masked
/// with [`IssueRecord::as_of`] so later closes and merges are invisible.
/// Returned sequences are in chronological order.
#[async_trait]
pub trait RepoDataSource: Send + Sync {
    /// List all repositories known to the source.
    async fn list_repos(&self) -> Result<Vec<Repo>>;

    /// A single issue or pull request, if it existed at `before`.
    async fn issue(
        &self,
        owner: &str,
        name: &str,
        number: u64,
        before: DateTime<Utc>,
    ) -> Result<Option<IssueRecord>>;

    /// Issues and pull requests created at or before `before`.
    async fn issues(&self, owner: &str, name: &str, before: DateTime<Utc>)
        -> Result<Vec<IssueRecord>>;

    /// Commits that landed in the repository at or before `before`.
    async fn commits(&self, owner: &str, name: &str, before: DateTime<Utc>) -> Result<Vec<Commit>>;

    /// Stars given at or before `before`.
    async fn stars(&self, owner: &str, name: &str, before: DateTime<Utc>) -> Result<Vec<Star>>;

    /// Timeline of one issue up to `before`.
    async fn events(
        &self,
        owner: &str,
        name: &str,
        number: u64,
        before: DateTime<Utc>,
    ) -> Result<Vec<Event>>;

    /// Contributions of `login` across GitHub up to `before`.
    async fn contributions(&self, login: &str, before: DateTime<Utc>) -> Result<Vec<Contribution>>;
}
