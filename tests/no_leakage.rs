//! A snapshot taken at `before` must not change when everything that
//! happened after `before` is erased from the data source.

use std::sync::Arc;

use chrono::{DateTime, TimeZone, Utc};
use proptest::prelude::*;

use gfibot::background::Aggregator;
use gfibot::dataset::{Snapshot, SnapshotBuilder};
use gfibot::source::memory::{MemorySource, RepoArchive};
use gfibot::source::types::{
    Commit, Contribution, ContributionKind, Event, EventKind, IssueRecord, Repo, Star,
};
use gfibot::store::Store;

const USERS: [&str; 4] = ["alice", "bob", "carol", "ghost"];
const LABELS: [&str; 4] = ["bug", "good first issue", "docs", "triaged"];

fn ts(secs: i64) -> DateTime<Utc> {
    Utc.timestamp_opt(secs, 0).unwrap()
}

#[derive(Debug, Clone)]
struct World {
    issues: Vec<(u64, usize, i64, Option<i64>)>,
    /// (number, author, created, merged, referenced issue)
    pulls: Vec<(u64, usize, i64, Option<i64>, u64)>,
    commits: Vec<(usize, i64, Option<u64>)>,
    events: Vec<(usize, i64, u8, usize)>,
    stars: Vec<(usize, i64)>,
    contributions: Vec<(usize, i64, u8)>,
}

fn world() -> impl Strategy<Value = World> {
    (
        prop::collection::vec((0usize..4, 0i64..1000, prop::option::of(0i64..1000)), 1..6),
        prop::collection::vec(
            (0usize..4, 0i64..1000, prop::option::of(0i64..500), 1u64..6),
            0..6,
        ),
        prop::collection::vec((0usize..4, 0i64..1000, prop::option::of(1u64..6)), 0..12),
        prop::collection::vec((0usize..4, 0i64..1000, 0u8..4, 0usize..4), 0..12),
        prop::collection::vec((0usize..4, 0i64..1000), 0..6),
        prop::collection::vec((0usize..4, 0i64..1000, 0u8..3), 0..10),
    )
        .prop_map(|(issues, pulls, commits, events, stars, contributions)| World {
            issues: issues
                .into_iter()
                .enumerate()
                .map(|(i, (user, created, close_after))| {
                    (i as u64 + 1, user, created, close_after.map(|d| created + d))
                })
                .collect(),
            pulls: pulls
                .into_iter()
                .enumerate()
                .map(|(i, (user, created, merge_after, fixes))| {
                    (i as u64 + 100, user, created, merge_after.map(|d| created + d), fixes)
                })
                .collect(),
            commits,
            events,
            stars,
            contributions,
        })
}

fn event_kind(kind: u8, arg: usize) -> EventKind {
    match kind {
        0 => EventKind::Labeled {
            label: LABELS[arg].to_string(),
        },
        1 => EventKind::Unlabeled {
            label: LABELS[arg].to_string(),
        },
        2 => EventKind::Commented {
            body: format!("comment {arg}"),
        },
        _ => EventKind::Assigned {
            assignee: USERS[arg].to_string(),
        },
    }
}

/// Materialize `world` keeping only what is visible at `cutoff`, or
/// everything when `cutoff` is `None`.
fn source(world: &World, cutoff: Option<i64>) -> MemorySource {
    let visible = |t: i64| cutoff.map_or(true, |c| t <= c);

    let mut archive = RepoArchive::new(Repo {
        owner: "octo".to_string(),
        name: "demo".to_string(),
        language: None,
        created_at: ts(0),
    });
    archive.issues = world
        .issues
        .iter()
        .filter(|(_, _, created, _)| visible(*created))
        .map(|&(number, user, created, closed)| IssueRecord {
            number,
            user: USERS[user].to_string(),
            created_at: ts(created),
            closed_at: closed.filter(|t| visible(*t)).map(ts),
            is_pull: false,
            merged_at: None,
            title: format!("Issue {number}"),
            body: Some("Steps: run it. See https://example.com/log".to_string()),
            labels: Vec::new(),
        })
        .chain(
            world
                .pulls
                .iter()
                .filter(|(_, _, created, _, _)| visible(*created))
                .map(|&(number, user, created, merged, fixes)| {
                    let merged = merged.filter(|t| visible(*t)).map(ts);
                    IssueRecord {
                        number,
                        user: USERS[user].to_string(),
                        created_at: ts(created),
                        closed_at: merged,
                        is_pull: true,
                        merged_at: merged,
                        title: format!("Pull {number}"),
                        body: Some(format!("Fixes #{fixes}")),
                        labels: Vec::new(),
                    }
                }),
        )
        .collect();
    archive.commits = world
        .commits
        .iter()
        .enumerate()
        .filter(|(_, (_, at, _))| visible(*at))
        .map(|(i, &(author, at, fixes))| Commit {
            sha: format!("c{i}"),
            author: Some(USERS[author].to_string()),
            committer: Some("web-flow".to_string()),
            authored_at: ts(at),
            committed_at: ts(at),
            message: fixes.map_or("chore".to_string(), |n| format!("fixes #{n}")),
        })
        .collect();
    archive.stars = world
        .stars
        .iter()
        .filter(|(_, at)| visible(*at))
        .map(|&(user, at)| Star {
            user: USERS[user].to_string(),
            starred_at: ts(at),
        })
        .collect();
    let timeline: Vec<Event> = world
        .events
        .iter()
        .filter(|(_, at, _, _)| visible(*at))
        .map(|&(actor, at, kind, arg)| Event {
            time: ts(at),
            actor: USERS[actor].to_string(),
            kind: event_kind(kind, arg),
        })
        .collect();
    archive.events.insert(1, timeline);

    let mut source = MemorySource::new();
    source.add_repo(archive);
    for (user, login) in USERS.iter().enumerate() {
        let contributions = world
            .contributions
            .iter()
            .filter(|(u, at, _)| *u == user && visible(*at))
            .map(|&(_, at, kind)| Contribution {
                repo: format!("other/r{kind}"),
                kind: match kind {
                    0 => ContributionKind::Commit,
                    1 => ContributionKind::Issue,
                    _ => ContributionKind::Pull,
                },
                at: ts(at),
                count: 1,
            })
            .collect();
        source.add_contributions(login, contributions);
    }
    source
}

async fn snapshot(source: MemorySource, before: i64) -> Option<Snapshot> {
    let aggregator = Arc::new(Aggregator::new(Arc::new(source)));
    let builder = SnapshotBuilder::new(aggregator, Arc::new(Store::in_memory()));
    builder
        .build_snapshot("octo", "demo", 1, ts(before))
        .await
        .unwrap()
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn snapshot_ignores_the_future(world in world(), cutoff in 0i64..1000) {
        let runtime = tokio::runtime::Builder::new_current_thread().build().unwrap();
        let (full, truncated) = runtime.block_on(async {
            (
                snapshot(source(&world, None), cutoff).await,
                snapshot(source(&world, Some(cutoff)), cutoff).await,
            )
        });
        prop_assert_eq!(full, truncated);
    }
}
