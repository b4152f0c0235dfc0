use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Repository metadata.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Repo {
    pub owner: String,
    pub name: String,
    #[serde(default)]
    pub language: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl Repo {
    pub fn full_name(&self) -> String {
        format!("{}/{}", self.owner, self.name)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Commit {
    pub sha: String,
    /// GitHub login of the author, when the commit email maps to an account.
    pub author: Option<String>,
    pub committer: Option<String>,
    pub authored_at: DateTime<Utc>,
    pub committed_at: DateTime<Utc>,
    #[serde(default)]
    pub message: String,
}

/// An issue or pull request as last seen by ingestion.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IssueRecord {
    pub number: u64,
    pub user: String,
    pub created_at: DateTime<Utc>,
    pub closed_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub is_pull: bool,
    #[serde(default)]
    pub merged_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub body: Option<String>,
    /// Labels at ingestion time. Point-in-time labels come from event replay.
    #[serde(default)]
    pub labels: Vec<String>,
}

impl IssueRecord {
    pub fn is_open(&self) -> bool {
        self.closed_at.is_none()
    }

    /// The record as it would have looked at `before`.
    ///
    /// Closing and merging that happened later are hidden, and the current
    /// label set is dropped since it may contain labels added afterwards.
    /// Title and body are not versioned and are kept as-is.
    pub fn as_of(&self, before: DateTime<Utc>) -> Self {
        Self {
            number: self.number,
            user: self.user.clone(),
            created_at: self.created_at,
            closed_at: self.closed_at.filter(|t| *t <= before),
            is_pull: self.is_pull,
            merged_at: self.merged_at.filter(|t| *t <= before),
            title: self.title.clone(),
            body: self.body.clone(),
            labels: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Star {
    pub user: String,
    pub starred_at: DateTime<Utc>,
}

/// A single entry of an issue timeline.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Event {
    pub time: DateTime<Utc>,
    pub actor: String,
    pub kind: EventKind,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EventKind {
    Labeled { label: String },
    Unlabeled { label: String },
    Commented { body: String },
    Assigned { assignee: String },
    Unassigned { assignee: String },
    Referenced { commit: String },
    CrossReferenced { source: u64 },
    Closed,
    Reopened,
    Renamed { from: String, to: String },
    /// Timeline entries that carry no feature-relevant payload.
    Other { name: String },
}

impl EventKind {
    pub fn name(&self) -> &str {
        match self {
            EventKind::Labeled { .. } => "labeled",
            EventKind::Unlabeled { .. } => "unlabeled",
            EventKind::Commented { .. } => "commented",
            EventKind::Assigned { .. } => "assigned",
            EventKind::Unassigned { .. } => "unassigned",
            EventKind::Referenced { .. } => "referenced",
            EventKind::CrossReferenced { .. } => "cross_referenced",
            EventKind::Closed => "closed",
            EventKind::Reopened => "reopened",
            EventKind::Renamed { .. } => "renamed",
            EventKind::Other { name } => name,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContributionKind {
    Commit,
    Issue,
    Pull,
}

/// One contribution of a user anywhere on GitHub.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Contribution {
    /// `owner/name` of the repository contributed to.
    pub repo: String,
    pub kind: ContributionKind,
    pub at: DateTime<Utc>,
    /// Number of contributions of this kind in the entry (e.g. commits in a month).
    #[serde(default = "default_count")]
    pub count: u64,
}

fn default_count() -> u64 {
    1
}
