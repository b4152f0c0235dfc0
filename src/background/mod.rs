//! Contributor and repository statistics as of a point in time.
//!
//! Everything here is reached through accessors taking a `before` bound, so
//! snapshot features can only see activity visible at that time.

pub mod identity;
pub mod resolution;

use std::collections::{BTreeSet, HashMap, HashSet};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;

use crate::error::Result;
use crate::source::types::{Commit, Contribution, ContributionKind, IssueRecord};
use crate::source::RepoDataSource;

use identity::{commit_author, normalize_login};
use resolution::ResolvedIssue;

/// Median close time reported when no issue has been closed yet.
///
/// Negative so it can never be mistaken for a very fast repository.
pub const NO_CLOSE_TIME: f64 = -1.0;

/// Contributor statistics as of a timestamp.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct UserFeature {
    pub login: String,
    /// Commits to this repository.
    pub n_commits: u64,
    /// Issues opened in this repository.
    pub n_issues: u64,
    /// Pull requests opened in this repository.
    pub n_pulls: u64,
    /// `resolver_commit_num` of every issue this user resolved here.
    pub resolver_commits: Vec<u32>,
    /// Commits anywhere on GitHub.
    pub n_commits_all: u64,
    pub n_issues_all: u64,
    pub n_pulls_all: u64,
    /// Distinct repositories contributed to.
    pub n_repos_all: u64,
}

impl UserFeature {
    /// Statistics for an account that has none (ghost, unknown user).
    pub fn empty(login: &str) -> Self {
        Self {
            login: login.to_string(),
            ..Default::default()
        }
    }
}

/// Repository-level background as of a timestamp.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RepoBackground {
    pub contributors: BTreeSet<String>,
    pub n_closed: u64,
    pub n_open: u64,
    /// Seconds from creation to close of every closed issue.
    pub close_times: Vec<f64>,
    pub n_stars: u64,
    pub n_commits: u64,
    pub n_pulls: u64,
    /// `resolver_commit_num` of every issue resolved so far.
    pub prev_resolver_commits: Vec<u32>,
}

impl RepoBackground {
    pub fn open_ratio(&self) -> f64 {
        let total = self.n_open + self.n_closed;
        if total == 0 {
            0.0
        } else {
            self.n_open as f64 / total as f64
        }
    }

    /// Median of `close_times`, or [`NO_CLOSE_TIME`] when there are none.
    pub fn median_close_time(&self) -> f64 {
        median(&self.close_times).unwrap_or(NO_CLOSE_TIME)
    }
}

pub fn median(values: &[f64]) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    let mut sorted = values.to_vec();
    sorted.sort_by(f64::total_cmp);
    let mid = sorted.len() / 2;
    Some(if sorted.len() % 2 == 0 {
        (sorted[mid - 1] + sorted[mid]) / 2.0
    } else {
        sorted[mid]
    })
}

/// Repository activity visible at `before`, fetched once and shared by the
/// per-user computations of a snapshot.
#[derive(Debug, Clone)]
pub struct RepoActivity {
    pub before: DateTime<Utc>,
    pub commits: Vec<Commit>,
    pub issues: Vec<IssueRecord>,
    pub resolved: Vec<ResolvedIssue>,
}

type RepoId = (String, String);

pub struct Aggregator {
    source: Arc<dyn RepoDataSource>,
    /// Resolutions of every repository seen so far, in resolution order.
    resolutions: RwLock<HashMap<RepoId, Arc<Vec<ResolvedIssue>>>>,
}

impl Aggregator {
    /// The source must not change while the aggregator is in use; resolutions
    /// are detected once per repository and reused.
    pub fn new(source: Arc<dyn RepoDataSource>) -> Self {
        Self {
            source,
            resolutions: RwLock::new(HashMap::new()),
        }
    }

    pub fn source(&self) -> &Arc<dyn RepoDataSource> {
        &self.source
    }

    pub async fn activity(&self, owner: &str, name: &str, before: DateTime<Utc>) -> Result<RepoActivity> {
        let resolved = self.resolved_issues(owner, name, before).await?;
        let commits = self.source.commits(owner, name, before).await?;
        let issues = self.source.issues(owner, name, before).await?;
        Ok(RepoActivity {
            before,
            commits,
            issues,
            resolved,
        })
    }

    /// Issues resolved at or before `before`, in resolution order.
    ///
    /// A resolution only depends on records up to the issue's close, so
    /// detecting over the whole history and keeping those closed by `before`
    /// gives the same answer as detecting over the history up to `before`.
    pub async fn resolved_issues(
        &self,
        owner: &str,
        name: &str,
        before: DateTime<Utc>,
    ) -> Result<Vec<ResolvedIssue>> {
        let all = self.all_resolutions(owner, name).await?;
        let visible = all.partition_point(|r| r.resolved_at <= before);
        Ok(all[..visible].to_vec())
    }

    async fn all_resolutions(&self, owner: &str, name: &str) -> Result<Arc<Vec<ResolvedIssue>>> {
        let id = (owner.to_string(), name.to_string());
        if let Some(cached) = self.resolutions.read().await.get(&id) {
            return Ok(Arc::clone(cached));
        }

        let commits = self.source.commits(owner, name, DateTime::<Utc>::MAX_UTC).await?;
        let issues = self.source.issues(owner, name, DateTime::<Utc>::MAX_UTC).await?;
        let resolved = Arc::new(resolution::detect_resolved(&issues, &commits));
        tracing::debug!(
            repo = %format!("{owner}/{name}"),
            resolved = resolved.len(),
            "Detected issue resolutions"
        );

        let mut cache = self.resolutions.write().await;
        Ok(Arc::clone(cache.entry(id).or_insert(resolved)))
    }

    pub async fn user_stats(
        &self,
        owner: &str,
        name: &str,
        login: &str,
        before: DateTime<Utc>,
    ) -> Result<UserFeature> {
        if normalize_login(login).is_none() {
            return Ok(UserFeature::empty(login));
        }
        let activity = self.activity(owner, name, before).await?;
        self.user_stats_in(&activity, login).await
    }

    /// [`Aggregator::user_stats`] against already fetched activity.
    pub async fn user_stats_in(&self, activity: &RepoActivity, login: &str) -> Result<UserFeature> {
        let Some(login) = normalize_login(login) else {
            return Ok(UserFeature::empty(login));
        };
        let contributions = self.source.contributions(login, activity.before).await?;
        Ok(user_feature(activity, login, &contributions))
    }

    pub async fn repo_background(
        &self,
        owner: &str,
        name: &str,
        before: DateTime<Utc>,
    ) -> Result<RepoBackground> {
        let activity = self.activity(owner, name, before).await?;
        self.repo_background_in(owner, name, &activity).await
    }

    /// [`Aggregator::repo_background`] against already fetched activity.
    pub async fn repo_background_in(
        &self,
        owner: &str,
        name: &str,
        activity: &RepoActivity,
    ) -> Result<RepoBackground> {
        let n_stars = self.source.stars(owner, name, activity.before).await?.len() as u64;
        Ok(RepoBackground {
            n_stars,
            ..repo_background(activity)
        })
    }
}

/// Pure part of [`Aggregator::user_stats`].
pub fn user_feature(activity: &RepoActivity, login: &str, contributions: &[Contribution]) -> UserFeature {
    let n_commits = activity
        .commits
        .iter()
        .filter(|c| commit_author(c) == Some(login))
        .count() as u64;
    let (n_pulls, n_issues) = activity
        .issues
        .iter()
        .filter(|i| i.user == login)
        .fold((0, 0), |(p, i), issue| {
            if issue.is_pull {
                (p + 1, i)
            } else {
                (p, i + 1)
            }
        });
    let resolver_commits = activity
        .resolved
        .iter()
        .filter(|r| r.resolver == login)
        .map(|r| r.resolver_commit_num)
        .collect();

    let sum_of = |kind: ContributionKind| -> u64 {
        contributions
            .iter()
            .filter(|c| c.kind == kind)
            .map(|c| c.count)
            .sum()
    };
    let n_repos_all = contributions
        .iter()
        .map(|c| c.repo.as_str())
        .collect::<HashSet<_>>()
        .len() as u64;

    UserFeature {
        login: login.to_string(),
        n_commits,
        n_issues,
        n_pulls,
        resolver_commits,
        n_commits_all: sum_of(ContributionKind::Commit),
        n_issues_all: sum_of(ContributionKind::Issue),
        n_pulls_all: sum_of(ContributionKind::Pull),
        n_repos_all,
    }
}

/// Pure part of [`Aggregator::repo_background`], without stars.
pub fn repo_background(activity: &RepoActivity) -> RepoBackground {
    let contributors: BTreeSet<String> = activity
        .commits
        .iter()
        .filter_map(commit_author)
        .map(str::to_string)
        .collect();

    let mut background = RepoBackground {
        contributors,
        n_commits: activity.commits.len() as u64,
        prev_resolver_commits: activity
            .resolved
            .iter()
            .map(|r| r.resolver_commit_num)
            .collect(),
        ..Default::default()
    };

    for issue in &activity.issues {
        if issue.is_pull {
            background.n_pulls += 1;
            continue;
        }
        match issue.closed_at {
            Some(closed_at) => {
                background.n_closed += 1;
                background
                    .close_times
                    .push((closed_at - issue.created_at).num_seconds() as f64);
            }
            None => background.n_open += 1,
        }
    }

    background
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source::memory::{MemorySource, RepoArchive};
    use crate::source::types::Repo;
    use chrono::TimeZone;

    fn ts(secs: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(secs, 0).unwrap()
    }

    fn issue(number: u64, user: &str, created: i64, closed: Option<i64>, is_pull: bool) -> IssueRecord {
        IssueRecord {
            number,
            user: user.to_string(),
            created_at: ts(created),
            closed_at: closed.map(ts),
            is_pull,
            merged_at: None,
            title: String::new(),
            body: None,
            labels: Vec::new(),
        }
    }

    fn commit(author: Option<&str>, committer: &str, at: i64) -> Commit {
        Commit {
            sha: format!("{at}"),
            author: author.map(str::to_string),
            committer: Some(committer.to_string()),
            authored_at: ts(at),
            committed_at: ts(at),
            message: String::new(),
        }
    }

    fn aggregator() -> Aggregator {
        let mut archive = RepoArchive::new(Repo {
            owner: "octo".to_string(),
            name: "demo".to_string(),
            language: None,
            created_at: ts(0),
        });
        archive.commits = vec![
            commit(Some("alice"), "web-flow", 10),
            commit(None, "web-flow", 20),
            commit(Some("bob"), "bob", 30),
            commit(Some("alice"), "alice", 500),
        ];
        archive.issues = vec![
            issue(1, "alice", 5, Some(105), false),
            issue(2, "carol", 50, Some(350), false),
            issue(3, "carol", 60, None, false),
            issue(4, "alice", 70, None, true),
        ];
        let mut source = MemorySource::new();
        source.add_repo(archive);
        source.add_contributions(
            "alice",
            vec![
                Contribution {
                    repo: "x/y".to_string(),
                    kind: ContributionKind::Commit,
                    at: ts(1),
                    count: 40,
                },
                Contribution {
                    repo: "x/z".to_string(),
                    kind: ContributionKind::Pull,
                    at: ts(900),
                    count: 2,
                },
            ],
        );
        Aggregator::new(Arc::new(source))
    }

    #[tokio::test]
    async fn test_user_stats_are_time_bounded() {
        let agg = aggregator();

        let at_100 = agg.user_stats("octo", "demo", "alice", ts(100)).await.unwrap();
        assert_eq!(at_100.n_commits, 1);
        assert_eq!(at_100.n_issues, 1);
        assert_eq!(at_100.n_pulls, 1);
        assert_eq!(at_100.n_commits_all, 40);
        assert_eq!(at_100.n_pulls_all, 0);
        assert_eq!(at_100.n_repos_all, 1);

        let at_1000 = agg.user_stats("octo", "demo", "alice", ts(1000)).await.unwrap();
        assert_eq!(at_1000.n_commits, 2);
        assert_eq!(at_1000.n_pulls_all, 2);
        assert_eq!(at_1000.n_repos_all, 2);
    }

    #[tokio::test]
    async fn test_ghost_is_never_queried() {
        let agg = aggregator();
        let ghost = agg.user_stats("octo", "demo", "ghost", ts(1000)).await.unwrap();
        assert_eq!(ghost, UserFeature::empty("ghost"));
    }

    #[tokio::test]
    async fn test_repo_background() {
        let agg = aggregator();

        let early = agg.repo_background("octo", "demo", ts(200)).await.unwrap();
        assert_eq!(early.n_closed, 1);
        assert_eq!(early.n_open, 2);
        assert_eq!(early.n_pulls, 1);
        assert_eq!(early.n_commits, 3);
        assert_eq!(early.median_close_time(), 100.0);
        let contributors: Vec<_> = early.contributors.iter().cloned().collect();
        assert_eq!(contributors, vec!["alice".to_string(), "bob".to_string()]);

        let late = agg.repo_background("octo", "demo", ts(400)).await.unwrap();
        assert_eq!(late.n_closed, 2);
        assert_eq!(late.median_close_time(), 200.0);
        assert!((late.open_ratio() - 1.0 / 3.0).abs() < 1e-12);
    }

    #[tokio::test]
    async fn test_no_closed_issues_uses_sentinel() {
        let agg = aggregator();
        let background = agg.repo_background("octo", "demo", ts(8)).await.unwrap();
        assert_eq!(background.n_open, 1);
        assert_eq!(background.median_close_time(), NO_CLOSE_TIME);

        let empty = RepoBackground::default();
        assert_eq!(empty.open_ratio(), 0.0);
    }

    #[tokio::test]
    async fn test_resolved_issues_are_cut_at_before() {
        let mut archive = RepoArchive::new(Repo {
            owner: "octo".to_string(),
            name: "fixes".to_string(),
            language: None,
            created_at: ts(0),
        });
        archive.issues = vec![
            issue(1, "carol", 10, Some(100), false),
            issue(2, "carol", 20, Some(300), false),
            issue(3, "carol", 30, None, false),
        ];
        archive.commits = vec![
            Commit {
                message: "fixes #1".to_string(),
                ..commit(Some("alice"), "web-flow", 90)
            },
            Commit {
                message: "closes #2".to_string(),
                ..commit(Some("bob"), "bob", 250)
            },
        ];
        let mut source = MemorySource::new();
        source.add_repo(archive);
        let agg = Aggregator::new(Arc::new(source));

        let numbers = |resolved: Vec<ResolvedIssue>| resolved.iter().map(|r| r.number).collect::<Vec<_>>();
        assert!(agg.resolved_issues("octo", "fixes", ts(99)).await.unwrap().is_empty());
        assert_eq!(numbers(agg.resolved_issues("octo", "fixes", ts(100)).await.unwrap()), vec![1]);
        assert_eq!(numbers(agg.resolved_issues("octo", "fixes", ts(1000)).await.unwrap()), vec![1, 2]);

        let activity = agg.activity("octo", "fixes", ts(200)).await.unwrap();
        assert_eq!(repo_background(&activity).prev_resolver_commits, vec![0]);
        let bob = user_feature(&agg.activity("octo", "fixes", ts(400)).await.unwrap(), "bob", &[]);
        assert_eq!(bob.resolver_commits, vec![0]);
    }

    #[test]
    fn test_median() {
        assert_eq!(median(&[]), None);
        assert_eq!(median(&[3.0, 1.0, 2.0]), Some(2.0));
        assert_eq!(median(&[4.0, 1.0, 2.0, 3.0]), Some(2.5));
    }
}
