use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::background::UserFeature;
use crate::features::{LabelCategory, TextFeatures};

/// Identity of a snapshot: one issue seen at one point in time.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct SnapshotKey {
    pub owner: String,
    pub name: String,
    pub number: u64,
    pub before: DateTime<Utc>,
}

impl SnapshotKey {
    pub fn new(owner: &str, name: &str, number: u64, before: DateTime<Utc>) -> Self {
        Self {
            owner: owner.to_string(),
            name: name.to_string(),
            number,
            before,
        }
    }
}

impl fmt::Display for SnapshotKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}/{}#{}@{}",
            self.owner,
            self.name,
            self.number,
            self.before.to_rfc3339()
        )
    }
}

/// Point-in-time feature record of one issue.
///
/// Features only use data with timestamps `<= before`. `closed_at` and
/// `resolver_commit_num` are ground truth, filled in once the issue is known
/// to be resolved, and never used as features.
///
/// `title`, `body` and the content features derived from them come from the
/// issue as last ingested: GitHub keeps no body history, so edits made after
/// `before` are visible here.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Snapshot {
    pub owner: String,
    pub name: String,
    pub number: u64,
    pub created_at: DateTime<Utc>,
    pub before: DateTime<Utc>,
    pub closed_at: Option<DateTime<Utc>>,
    pub resolver_commit_num: Option<u32>,

    // Content
    pub title: String,
    pub body: String,
    pub text: TextFeatures,
    pub labels: Vec<String>,
    pub label_category: LabelCategory,

    // Background
    pub reporter_feat: UserFeature,
    pub owner_feat: UserFeature,
    pub prev_resolver_commits: Vec<u32>,
    pub n_stars: u64,
    pub n_pulls: u64,
    pub n_commits: u64,
    pub n_contributors: u64,
    pub n_closed_issues: u64,
    pub n_open_issues: u64,
    pub r_open_issues: f64,
    /// Median seconds to close, or `NO_CLOSE_TIME` when nothing was closed yet.
    pub issue_close_time: f64,

    // Dynamics
    pub comments: Vec<String>,
    pub events: Vec<String>,
    pub comment_users: Vec<UserFeature>,
    pub event_users: Vec<UserFeature>,
}

impl Snapshot {
    pub fn key(&self) -> SnapshotKey {
        SnapshotKey::new(&self.owner, &self.name, self.number, self.before)
    }

    pub fn is_resolved(&self) -> bool {
        self.resolver_commit_num.is_some()
    }

    /// Label under `threshold`, or `None` when the issue is not resolved.
    pub fn is_newcomer_resolved(&self, threshold: u8) -> Option<bool> {
        self.resolver_commit_num
            .map(|n| crate::background::resolution::is_newcomer(n, threshold))
    }

    /// Ordering used wherever snapshots are consumed in resolution order.
    pub fn chronological_key(&self) -> (Option<DateTime<Utc>>, u64, DateTime<Utc>) {
        (self.closed_at, self.number, self.before)
    }
}

#[cfg(test)]
impl Snapshot {
    /// A snapshot with every feature zeroed.
    pub(crate) fn blank(key: &SnapshotKey) -> Self {
        Self {
            owner: key.owner.clone(),
            name: key.name.clone(),
            number: key.number,
            created_at: key.before,
            before: key.before,
            closed_at: None,
            resolver_commit_num: None,
            title: String::new(),
            body: String::new(),
            text: TextFeatures::default(),
            labels: Vec::new(),
            label_category: LabelCategory::default(),
            reporter_feat: UserFeature::default(),
            owner_feat: UserFeature::default(),
            prev_resolver_commits: Vec::new(),
            n_stars: 0,
            n_pulls: 0,
            n_commits: 0,
            n_contributors: 0,
            n_closed_issues: 0,
            n_open_issues: 0,
            r_open_issues: 0.0,
            issue_close_time: crate::background::NO_CLOSE_TIME,
            comments: Vec::new(),
            events: Vec::new(),
            comment_users: Vec::new(),
            event_users: Vec::new(),
        }
    }
}
