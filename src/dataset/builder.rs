use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};

use crate::background::resolution::ResolvedIssue;
use crate::background::{Aggregator, RepoActivity, UserFeature};
use crate::dataset::snapshot::{Snapshot, SnapshotKey};
use crate::error::Result;
use crate::features;
use crate::source::types::{Event, EventKind};
use crate::store::Store;

/// Builds point-in-time snapshots and records them in the store.
pub struct SnapshotBuilder {
    aggregator: Arc<Aggregator>,
    store: Arc<Store>,
}

impl SnapshotBuilder {
    pub fn new(aggregator: Arc<Aggregator>, store: Arc<Store>) -> Self {
        Self { aggregator, store }
    }

    /// Snapshot of an issue as of `before`.
    ///
    /// An existing snapshot for the same key is returned unchanged. Returns
    /// `None` when the issue did not exist at `before` or is a pull request.
    pub async fn build_snapshot(
        &self,
        owner: &str,
        name: &str,
        number: u64,
        before: DateTime<Utc>,
    ) -> Result<Option<Snapshot>> {
        let key = SnapshotKey::new(owner, name, number, before);
        if let Some(existing) = self.store.snapshot(&key).await {
            tracing::trace!(snapshot = %key, "Snapshot already built");
            return Ok(Some(existing));
        }

        match self.compute(&key).await? {
            Some(snapshot) => Ok(Some(self.store.insert_snapshot(snapshot).await)),
            None => Ok(None),
        }
    }

    /// The creation-time and resolution-time snapshots of a resolved issue,
    /// both carrying its resolution.
    ///
    /// Returns nothing when the issue is not closed at its resolution time.
    pub async fn build_resolved(
        &self,
        owner: &str,
        name: &str,
        resolved: &ResolvedIssue,
    ) -> Result<Vec<Snapshot>> {
        let closed = self
            .aggregator
            .source()
            .issue(owner, name, resolved.number, resolved.resolved_at)
            .await?
            .is_some_and(|issue| !issue.is_open() && !issue.is_pull);
        if !closed {
            tracing::debug!(
                repo = %format!("{owner}/{name}"),
                issue = resolved.number,
                "Issue not closed at resolution time, skipping"
            );
            return Ok(Vec::new());
        }

        let mut snapshots: Vec<Snapshot> = Vec::with_capacity(2);
        for before in [resolved.created_at, resolved.resolved_at] {
            if snapshots.last().is_some_and(|s| s.before == before) {
                continue;
            }
            if self
                .build_snapshot(owner, name, resolved.number, before)
                .await?
                .is_none()
            {
                continue;
            }
            let key = SnapshotKey::new(owner, name, resolved.number, before);
            if let Some(annotated) = self
                .store
                .annotate_resolution(&key, resolved.resolved_at, resolved.resolver_commit_num)
                .await
            {
                snapshots.push(annotated);
            }
        }
        Ok(snapshots)
    }

    async fn compute(&self, key: &SnapshotKey) -> Result<Option<Snapshot>> {
        let (owner, name, before) = (key.owner.as_str(), key.name.as_str(), key.before);
        let source = self.aggregator.source();

        let Some(issue) = source.issue(owner, name, key.number, before).await? else {
            return Ok(None);
        };
        if issue.is_pull {
            return Ok(None);
        }

        let events = source.events(owner, name, key.number, before).await?;
        let activity = self.aggregator.activity(owner, name, before).await?;
        let background = self.aggregator.repo_background_in(owner, name, &activity).await?;

        let mut users = UserCache::new(&self.aggregator, &activity);
        let reporter_feat = users.get(&issue.user).await?;
        let owner_feat = users.get(owner).await?;

        let mut comments = Vec::new();
        let mut commenters: Vec<&str> = Vec::new();
        let mut eventers: Vec<&str> = Vec::new();
        for event in &events {
            match &event.kind {
                EventKind::Commented { body } => {
                    comments.push(body.clone());
                    push_unique(&mut commenters, &event.actor);
                }
                _ => push_unique(&mut eventers, &event.actor),
            }
        }

        let mut comment_users = Vec::with_capacity(commenters.len());
        for login in commenters {
            comment_users.push(users.get(login).await?);
        }
        let mut event_users = Vec::with_capacity(eventers.len());
        for login in eventers {
            event_users.push(users.get(login).await?);
        }

        let labels = replay_labels(&events);
        let body = issue.body.unwrap_or_default();

        Ok(Some(Snapshot {
            owner: owner.to_string(),
            name: name.to_string(),
            number: key.number,
            created_at: issue.created_at,
            before,
            closed_at: None,
            resolver_commit_num: None,
            text: features::extract(Some(&issue.title), Some(&body)),
            label_category: features::categorize(&labels),
            title: issue.title,
            body,
            labels,
            reporter_feat,
            owner_feat,
            n_stars: background.n_stars,
            n_pulls: background.n_pulls,
            n_commits: background.n_commits,
            n_contributors: background.contributors.len() as u64,
            n_closed_issues: background.n_closed,
            n_open_issues: background.n_open,
            r_open_issues: background.open_ratio(),
            issue_close_time: background.median_close_time(),
            prev_resolver_commits: background.prev_resolver_commits,
            comments,
            events: events.iter().map(|e| e.kind.name().to_string()).collect(),
            comment_users,
            event_users,
        }))
    }
}

/// Per-snapshot memo of user statistics.
struct UserCache<'a> {
    aggregator: &'a Aggregator,
    activity: &'a RepoActivity,
    cache: HashMap<String, UserFeature>,
}

impl<'a> UserCache<'a> {
    fn new(aggregator: &'a Aggregator, activity: &'a RepoActivity) -> Self {
        Self {
            aggregator,
            activity,
            cache: HashMap::new(),
        }
    }

    async fn get(&mut self, login: &str) -> Result<UserFeature> {
        if let Some(feature) = self.cache.get(login) {
            return Ok(feature.clone());
        }
        let feature = self.aggregator.user_stats_in(self.activity, login).await?;
        self.cache.insert(login.to_string(), feature.clone());
        Ok(feature)
    }
}

fn push_unique<'a>(logins: &mut Vec<&'a str>, login: &'a str) {
    if !logins.contains(&login) {
        logins.push(login);
    }
}

/// Labels present after replaying labeled/unlabeled events in order.
///
/// Removing a label that is not present is a no-op; GitHub timelines are not
/// always consistent.
pub fn replay_labels(events: &[Event]) -> Vec<String> {
    let mut labels: Vec<String> = Vec::new();
    for event in events {
        match &event.kind {
            EventKind::Labeled { label } => {
                if !labels.contains(label) {
                    labels.push(label.clone());
                }
            }
            EventKind::Unlabeled { label } => labels.retain(|l| l != label),
            _ => {}
        }
    }
    labels
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source::memory::{MemorySource, RepoArchive};
    use crate::source::types::{Commit, IssueRecord, Repo, Star};
    use chrono::TimeZone;

    fn ts(secs: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(secs, 0).unwrap()
    }

    fn event(at: i64, actor: &str, kind: EventKind) -> Event {
        Event {
            time: ts(at),
            actor: actor.to_string(),
            kind,
        }
    }

    fn labeled(at: i64, label: &str) -> Event {
        event(at, "maint", EventKind::Labeled { label: label.to_string() })
    }

    fn unlabeled(at: i64, label: &str) -> Event {
        event(at, "maint", EventKind::Unlabeled { label: label.to_string() })
    }

    fn fixture() -> (SnapshotBuilder, Arc<Store>) {
        let mut archive = RepoArchive::new(Repo {
            owner: "octo".to_string(),
            name: "demo".to_string(),
            language: Some("Rust".to_string()),
            created_at: ts(0),
        });
        archive.issues = vec![
            IssueRecord {
                number: 1,
                user: "alice".to_string(),
                created_at: ts(100),
                closed_at: Some(ts(1000)),
                is_pull: false,
                merged_at: None,
                title: "Crash on start".to_string(),
                body: Some("It crashes. See https://x.io/a.png".to_string()),
                labels: vec!["bug".to_string()],
            },
            IssueRecord {
                number: 2,
                user: "bob".to_string(),
                created_at: ts(200),
                closed_at: Some(ts(900)),
                is_pull: true,
                merged_at: Some(ts(900)),
                title: "Fix crash".to_string(),
                body: Some("fixes #1".to_string()),
                labels: Vec::new(),
            },
        ];
        archive.commits = vec![Commit {
            sha: "c1".to_string(),
            author: Some("bob".to_string()),
            committer: Some("web-flow".to_string()),
            authored_at: ts(50),
            committed_at: ts(50),
            message: "init".to_string(),
        }];
        archive.stars = vec![
            Star {
                user: "s1".to_string(),
                starred_at: ts(10),
            },
            Star {
                user: "s2".to_string(),
                starred_at: ts(700),
            },
        ];
        archive.events.insert(
            1,
            vec![
                labeled(150, "bug"),
                event(160, "carol", EventKind::Commented { body: "same here".to_string() }),
                labeled(600, "good first issue"),
                event(650, "dave", EventKind::Commented { body: "on it".to_string() }),
                event(1000, "bob", EventKind::Closed),
            ],
        );

        let mut source = MemorySource::new();
        source.add_repo(archive);
        let store = Arc::new(Store::in_memory());
        let aggregator = Arc::new(Aggregator::new(Arc::new(source)));
        (SnapshotBuilder::new(aggregator, Arc::clone(&store)), store)
    }

    #[test]
    fn test_replay_labels_tolerates_missing_unlabel() {
        let events = vec![
            unlabeled(1, "ghost-label"),
            labeled(2, "bug"),
            labeled(3, "docs"),
            labeled(4, "bug"),
            unlabeled(5, "bug"),
        ];
        assert_eq!(replay_labels(&events), vec!["docs".to_string()]);
    }

    #[tokio::test]
    async fn test_snapshot_only_sees_the_past() {
        let (builder, _) = fixture();

        let early = builder.build_snapshot("octo", "demo", 1, ts(300)).await.unwrap().unwrap();
        assert_eq!(early.labels, vec!["bug".to_string()]);
        assert_eq!(early.label_category.bug, 1);
        assert_eq!(early.label_category.gfi, 0);
        assert_eq!(early.comments, vec!["same here".to_string()]);
        assert_eq!(early.comment_users.len(), 1);
        assert_eq!(early.n_stars, 1);
        assert_eq!(early.n_pulls, 1);
        assert_eq!(early.n_open_issues, 1);
        assert_eq!(early.n_closed_issues, 0);

        let late = builder.build_snapshot("octo", "demo", 1, ts(800)).await.unwrap().unwrap();
        assert_eq!(late.label_category.gfi, 1);
        assert_eq!(late.comments.len(), 2);
        assert_eq!(late.n_stars, 2);
        assert!(!late.events.contains(&"closed".to_string()));
    }

    #[tokio::test]
    async fn test_content_features() {
        let (builder, _) = fixture();
        let snapshot = builder.build_snapshot("octo", "demo", 1, ts(100)).await.unwrap().unwrap();
        assert_eq!(snapshot.text.n_imgs, 1);
        assert_eq!(snapshot.text.len_title, "Crash on start".len());
        assert!(snapshot.labels.is_empty());
        assert_eq!(snapshot.reporter_feat.n_issues, 1);
        assert_eq!(snapshot.owner_feat.login, "octo");
    }

    #[tokio::test]
    async fn test_not_applicable_cases() {
        let (builder, store) = fixture();
        // pull request
        assert!(builder.build_snapshot("octo", "demo", 2, ts(950)).await.unwrap().is_none());
        // missing issue
        assert!(builder.build_snapshot("octo", "demo", 99, ts(950)).await.unwrap().is_none());
        // before creation
        assert!(builder.build_snapshot("octo", "demo", 1, ts(50)).await.unwrap().is_none());
        assert_eq!(store.snapshot_count().await, 0);
    }

    #[tokio::test]
    async fn test_build_is_idempotent() {
        let (builder, store) = fixture();
        let first = builder.build_snapshot("octo", "demo", 1, ts(300)).await.unwrap().unwrap();
        let second = builder.build_snapshot("octo", "demo", 1, ts(300)).await.unwrap().unwrap();

        assert_eq!(
            serde_json::to_vec(&first).unwrap(),
            serde_json::to_vec(&second).unwrap()
        );
        assert_eq!(store.snapshot_writes(), 1);
    }

    #[tokio::test]
    async fn test_build_resolved_annotates_both_snapshots() {
        let (builder, store) = fixture();
        let resolved = builder
            .aggregator
            .resolved_issues("octo", "demo", ts(2000))
            .await
            .unwrap();
        assert_eq!(resolved.len(), 1);
        assert_eq!(resolved[0].resolver, "bob");
        assert_eq!(resolved[0].resolver_commit_num, 1);

        // An open-issue snapshot at creation time already exists.
        builder.build_snapshot("octo", "demo", 1, ts(100)).await.unwrap();

        let snapshots = builder.build_resolved("octo", "demo", &resolved[0]).await.unwrap();
        assert_eq!(snapshots.len(), 2);
        assert_eq!(snapshots[0].before, ts(100));
        assert_eq!(snapshots[1].before, ts(1000));
        for s in &snapshots {
            assert_eq!(s.resolver_commit_num, Some(1));
            assert_eq!(s.closed_at, Some(ts(1000)));
        }
        assert_eq!(store.snapshot_count().await, 2);

        let again = builder.build_resolved("octo", "demo", &resolved[0]).await.unwrap();
        assert_eq!(again, snapshots);
    }

    #[tokio::test]
    async fn test_build_resolved_requires_closed_issue() {
        let (builder, store) = fixture();
        let bogus = ResolvedIssue {
            number: 1,
            created_at: ts(100),
            resolved_at: ts(500),
            resolver: "bob".to_string(),
            resolver_commit_num: 0,
        };
        assert!(builder.build_resolved("octo", "demo", &bogus).await.unwrap().is_empty());
        assert_eq!(store.snapshot_count().await, 0);
    }
}
