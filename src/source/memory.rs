use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::error::Result;
use crate::source::types::*;
use crate::source::RepoDataSource;

/// Everything ingestion collected for one repository.
#[derive(Debug, Clone)]
pub struct RepoArchive {
    pub repo: Repo,
    pub commits: Vec<Commit>,
    pub issues: Vec<IssueRecord>,
    pub stars: Vec<Star>,
    /// Issue number -> timeline.
    pub events: HashMap<u64, Vec<Event>>,
}

impl RepoArchive {
    pub fn new(repo: Repo) -> Self {
        Self {
            repo,
            commits: Vec::new(),
            issues: Vec::new(),
            stars: Vec::new(),
            events: HashMap::new(),
        }
    }

    /// Sort every collection chronologically. Time-bounded lookups rely on it.
    fn normalize(&mut self) {
        self.commits.sort_by_key(|c| c.committed_at);
        self.issues.sort_by_key(|i| (i.created_at, i.number));
        self.stars.sort_by_key(|s| s.starred_at);
        for timeline in self.events.values_mut() {
            timeline.sort_by_key(|e| e.time);
        }
    }
}

/// In-memory [`RepoDataSource`] over a set of repository archives.
#[derive(Debug, Default, Clone)]
pub struct MemorySource {
    repos: HashMap<(String, String), RepoArchive>,
    contributions: HashMap<String, Vec<Contribution>>,
}

impl MemorySource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_repo(&mut self, mut archive: RepoArchive) {
        archive.normalize();
        let key = (archive.repo.owner.clone(), archive.repo.name.clone());
        self.repos.insert(key, archive);
    }

    pub fn add_contributions(&mut self, login: &str, mut contributions: Vec<Contribution>) {
        contributions.sort_by_key(|c| c.at);
        self.contributions.insert(login.to_string(), contributions);
    }

    fn archive(&self, owner: &str, name: &str) -> Option<&RepoArchive> {
        self.repos.get(&(owner.to_string(), name.to_string()))
    }
}

#[async_trait]
impl RepoDataSource for MemorySource {
    async fn list_repos(&self) -> Result<Vec<Repo>> {
        let mut repos: Vec<Repo> = self.repos.values().map(|a| a.repo.clone()).collect();
        repos.sort_by(|a, b| (&a.owner, &a.name).cmp(&(&b.owner, &b.name)));
        Ok(repos)
    }

    async fn issue(
        &self,
        owner: &str,
        name: &str,
        number: u64,
        before: DateTime<Utc>,
    ) -> Result<Option<IssueRecord>> {
        Ok(self.archive(owner, name).and_then(|a| {
            a.issues
                .iter()
                .find(|i| i.number == number && i.created_at <= before)
                .map(|i| i.as_of(before))
        }))
    }

    async fn issues(
        &self,
        owner: &str,
        name: &str,
        before: DateTime<Utc>,
    ) -> Result<Vec<IssueRecord>> {
        Ok(self
            .archive(owner, name)
            .map(|a| {
                let visible = a.issues.partition_point(|i| i.created_at <= before);
                a.issues[..visible].iter().map(|i| i.as_of(before)).collect()
            })
            .unwrap_or_default())
    }

    async fn commits(&self, owner: &str, name: &str, before: DateTime<Utc>) -> Result<Vec<Commit>> {
        Ok(self
            .archive(owner, name)
            .map(|a| {
                let visible = a.commits.partition_point(|c| c.committed_at <= before);
                a.commits[..visible].to_vec()
            })
            .unwrap_or_default())
    }

    async fn stars(&self, owner: &str, name: &str, before: DateTime<Utc>) -> Result<Vec<Star>> {
        Ok(self
            .archive(owner, name)
            .map(|a| {
                let visible = a.stars.partition_point(|s| s.starred_at <= before);
                a.stars[..visible].to_vec()
            })
            .unwrap_or_default())
    }

    async fn events(
        &self,
        owner: &str,
        name: &str,
        number: u64,
        before: DateTime<Utc>,
    ) -> Result<Vec<Event>> {
        Ok(self
            .archive(owner, name)
            .and_then(|a| a.events.get(&number))
            .map(|timeline| {
                timeline
                    .iter()
                    .filter(|e| e.time <= before)
                    .cloned()
                    .collect()
            })
            .unwrap_or_default())
    }

    async fn contributions(&self, login: &str, before: DateTime<Utc>) -> Result<Vec<Contribution>> {
        Ok(self
            .contributions
            .get(login)
            .map(|all| all.iter().filter(|c| c.at <= before).cloned().collect())
            .unwrap_or_default())
    }
}
