//! Fixed-order numeric encoding of a snapshot.
//!
//! Identifiers, timestamps and the resolution fields are left out; the
//! vector only carries what was observable at `before`.

use crate::background::{median, UserFeature};
use crate::dataset::Snapshot;
use crate::features::Category;

const USER_FIELDS: [&str; 9] = [
    "n_commits",
    "n_issues",
    "n_pulls",
    "n_resolved",
    "mean_resolver_commits",
    "n_commits_all",
    "n_issues_all",
    "n_pulls_all",
    "n_repos_all",
];

pub const FEATURE_NAMES: &[&str] = &[
    // content
    "len_title",
    "len_body",
    "n_code_snips",
    "n_urls",
    "n_imgs",
    "flesch_reading_ease",
    "flesch_kincaid_grade",
    "coleman_liau_index",
    "automated_readability_index",
    "n_labels",
    "label_bug",
    "label_feature",
    "label_test",
    "label_build",
    "label_doc",
    "label_coding",
    "label_enhance",
    "label_gfi",
    "label_medium",
    "label_major",
    "label_triaged",
    "label_untriaged",
    // repository background
    "n_stars",
    "n_pulls",
    "n_commits",
    "n_contributors",
    "n_closed_issues",
    "n_open_issues",
    "r_open_issues",
    "issue_close_time",
    "n_prev_resolved",
    "mean_prev_resolver_commits",
    "median_prev_resolver_commits",
    "r_prev_newcomer_resolved",
    // reporter
    "reporter_n_commits",
    "reporter_n_issues",
    "reporter_n_pulls",
    "reporter_n_resolved",
    "reporter_mean_resolver_commits",
    "reporter_n_commits_all",
    "reporter_n_issues_all",
    "reporter_n_pulls_all",
    "reporter_n_repos_all",
    // owner
    "owner_n_commits",
    "owner_n_issues",
    "owner_n_pulls",
    "owner_n_resolved",
    "owner_mean_resolver_commits",
    "owner_n_commits_all",
    "owner_n_issues_all",
    "owner_n_pulls_all",
    "owner_n_repos_all",
    // dynamics
    "n_comments",
    "n_events",
    "n_comment_users",
    "n_event_users",
    "commenters_mean_n_commits",
    "commenters_max_n_commits",
    "commenters_mean_n_commits_all",
    "eventers_mean_n_commits",
    "eventers_max_n_commits",
    "eventers_mean_n_commits_all",
];

/// Encode a snapshot in [`FEATURE_NAMES`] order. Non-finite values become 0.
pub fn vectorize(snapshot: &Snapshot) -> Vec<f64> {
    let mut row = Vec::with_capacity(FEATURE_NAMES.len());

    let text = &snapshot.text;
    row.extend([
        text.len_title as f64,
        text.len_body as f64,
        text.n_code_snips as f64,
        text.n_urls as f64,
        text.n_imgs as f64,
        text.readability.flesch_reading_ease,
        text.readability.flesch_kincaid_grade,
        text.readability.coleman_liau_index,
        text.readability.automated_readability_index,
        snapshot.labels.len() as f64,
    ]);
    row.extend(
        Category::ALL
            .iter()
            .map(|c| snapshot.label_category.get(*c) as f64),
    );

    let prev: Vec<f64> = snapshot
        .prev_resolver_commits
        .iter()
        .map(|n| *n as f64)
        .collect();
    let newcomer_share = if prev.is_empty() {
        0.0
    } else {
        prev.iter().filter(|n| **n < 1.0).count() as f64 / prev.len() as f64
    };
    row.extend([
        snapshot.n_stars as f64,
        snapshot.n_pulls as f64,
        snapshot.n_commits as f64,
        snapshot.n_contributors as f64,
        snapshot.n_closed_issues as f64,
        snapshot.n_open_issues as f64,
        snapshot.r_open_issues,
        snapshot.issue_close_time,
        prev.len() as f64,
        mean(&prev),
        median(&prev).unwrap_or(0.0),
        newcomer_share,
    ]);

    push_user(&mut row, &snapshot.reporter_feat);
    push_user(&mut row, &snapshot.owner_feat);

    row.extend([
        snapshot.comments.len() as f64,
        snapshot.events.len() as f64,
        snapshot.comment_users.len() as f64,
        snapshot.event_users.len() as f64,
    ]);
    push_group(&mut row, &snapshot.comment_users);
    push_group(&mut row, &snapshot.event_users);

    debug_assert_eq!(row.len(), FEATURE_NAMES.len());
    for value in &mut row {
        if !value.is_finite() {
            *value = 0.0;
        }
    }
    row
}

fn push_user(row: &mut Vec<f64>, user: &UserFeature) {
    let resolver: Vec<f64> = user.resolver_commits.iter().map(|n| *n as f64).collect();
    let values = [
        user.n_commits as f64,
        user.n_issues as f64,
        user.n_pulls as f64,
        resolver.len() as f64,
        mean(&resolver),
        user.n_commits_all as f64,
        user.n_issues_all as f64,
        user.n_pulls_all as f64,
        user.n_repos_all as f64,
    ];
    debug_assert_eq!(values.len(), USER_FIELDS.len());
    row.extend(values);
}

fn push_group(row: &mut Vec<f64>, users: &[UserFeature]) {
    let commits: Vec<f64> = users.iter().map(|u| u.n_commits as f64).collect();
    let commits_all: Vec<f64> = users.iter().map(|u| u.n_commits_all as f64).collect();
    row.extend([
        mean(&commits),
        commits.iter().copied().fold(0.0, f64::max),
        mean(&commits_all),
    ]);
}

fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        0.0
    } else {
        values.iter().sum::<f64>() / values.len() as f64
    }
}
