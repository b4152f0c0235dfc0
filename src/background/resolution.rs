use std::collections::HashMap;

use chrono::{DateTime, Utc};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::background::identity::{commit_author, normalize_login};
use crate::source::types::{Commit, IssueRecord};

static CLOSING_REF: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)\b(?:fix(?:e[sd])?|close[sd]?|resolve[sd]?)\b:?\s+#(\d+)")
        .expect("valid closing reference regex")
});

/// An issue known to have been closed by a specific user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResolvedIssue {
    pub number: u64,
    pub created_at: DateTime<Utc>,
    pub resolved_at: DateTime<Utc>,
    pub resolver: String,
    /// Commits the resolver made to the repository before starting the fix.
    pub resolver_commit_num: u32,
}

/// A resolver with fewer than `threshold` prior commits is a newcomer.
pub fn is_newcomer(resolver_commit_num: u32, threshold: u8) -> bool {
    resolver_commit_num < u32::from(threshold)
}

/// Issue numbers referenced with a closing keyword ("fixes #12").
pub fn closing_refs(text: &str) -> Vec<u64> {
    CLOSING_REF
        .captures_iter(text)
        .filter_map(|c| c.get(1)?.as_str().parse().ok())
        .collect()
}

/// Number of commits `login` made strictly before `at`.
pub fn commits_before(commits: &[Commit], login: &str, at: DateTime<Utc>) -> u32 {
    commits
        .iter()
        .filter(|c| c.committed_at < at && commit_author(c) == Some(login))
        .count() as u32
}

/// A closing reference to an issue.
#[derive(Debug, Clone, Copy)]
struct Evidence<'a> {
    /// When the reference landed: commit time, or merge time of a pull request.
    landed_at: DateTime<Utc>,
    /// When the resolver started the fix: commit time, or creation time of a
    /// pull request. Only commits strictly before this are prior work, which
    /// keeps the fixing commits out of the count.
    started_at: DateTime<Utc>,
    resolver: &'a str,
}

/// Closing references indexed by the issue number they reference.
fn index_evidence<'a>(issues: &'a [IssueRecord], commits: &'a [Commit]) -> HashMap<u64, Vec<Evidence<'a>>> {
    let mut index: HashMap<u64, Vec<Evidence<'a>>> = HashMap::new();

    for commit in commits {
        if let Some(author) = commit_author(commit) {
            for number in closing_refs(&commit.message) {
                index.entry(number).or_default().push(Evidence {
                    landed_at: commit.committed_at,
                    started_at: commit.committed_at,
                    resolver: author,
                });
            }
        }
    }

    for pull in issues.iter().filter(|i| i.is_pull) {
        let (Some(merged_at), Some(user)) = (pull.merged_at, normalize_login(&pull.user)) else {
            continue;
        };
        let text = format!("{}\n{}", pull.title, pull.body.as_deref().unwrap_or_default());
        for number in closing_refs(&text) {
            index.entry(number).or_default().push(Evidence {
                landed_at: merged_at,
                started_at: pull.created_at,
                resolver: user,
            });
        }
    }

    index
}

/// Find the resolver of every closed issue in `issues`.
///
/// Evidence is a commit or a merged pull request referencing the issue with a
/// closing keyword, landed between the issue's creation and its close. The
/// latest evidence wins. Pull requests themselves are never resolved issues.
pub fn detect_resolved(issues: &[IssueRecord], commits: &[Commit]) -> Vec<ResolvedIssue> {
    let evidence = index_evidence(issues, commits);

    let mut resolved: Vec<ResolvedIssue> = issues
        .iter()
        .filter(|i| !i.is_pull)
        .filter_map(|issue| {
            let closed_at = issue.closed_at?;
            let best = evidence
                .get(&issue.number)?
                .iter()
                .filter(|e| e.landed_at >= issue.created_at && e.landed_at <= closed_at)
                .max_by_key(|e| e.landed_at)?;

            Some(ResolvedIssue {
                number: issue.number,
                created_at: issue.created_at,
                resolved_at: closed_at,
                resolver: best.resolver.to_string(),
                resolver_commit_num: commits_before(commits, best.resolver, best.started_at),
            })
        })
        .collect();

    resolved.sort_by_key(|r| (r.resolved_at, r.number));
    resolved
}
