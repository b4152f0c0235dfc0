//! Loading of repository archives written by the ingestion collaborator.
//!
//! The archive directory holds one `<owner>__<name>.json` file per repository
//! and an optional `users.json` mapping logins to their GitHub-wide
//! contributions.

use std::collections::HashMap;
use std::path::Path;

use chrono::{DateTime, Utc};
use serde::Deserialize;

use crate::error::{AppError, Result};
use crate::source::memory::{MemorySource, RepoArchive};
use crate::source::types::*;

const USERS_FILE: &str = "users.json";

#[derive(Debug, Deserialize)]
pub struct RepoArchivePayload {
    pub repo: Repo,
    #[serde(default)]
    pub commits: Vec<Commit>,
    #[serde(default)]
    pub issues: Vec<IssueRecord>,
    #[serde(default)]
    pub stars: Vec<Star>,
    /// Issue number (as a JSON object key) -> raw timeline.
    #[serde(default)]
    pub events: HashMap<String, Vec<EventPayload>>,
}

/// Raw timeline entry. Which optional fields are present depends on `type`.
#[derive(Debug, Deserialize)]
pub struct EventPayload {
    #[serde(rename = "type")]
    pub event_type: String,
    pub time: DateTime<Utc>,
    pub actor: Option<String>,
    pub label: Option<String>,
    pub body: Option<String>,
    pub assignee: Option<String>,
    pub commit: Option<String>,
    pub source: Option<u64>,
    pub from: Option<String>,
    pub to: Option<String>,
}

/// Map a raw timeline entry to an [`Event`].
///
/// Entries missing the field their type requires are rejected. Deleted actors
/// are recorded as `ghost`, the login GitHub shows for them.
pub fn map_event(payload: EventPayload) -> Result<Event> {
    fn field(value: Option<String>, event_type: &str, name: &str) -> Result<String> {
        value.ok_or_else(|| {
            AppError::Source(format!("`{event_type}` event without `{name}` field"))
        })
    }

    let ty = payload.event_type.as_str();
    let kind = match ty {
        "labeled" => EventKind::Labeled {
            label: field(payload.label, ty, "label")?,
        },
        "unlabeled" => EventKind::Unlabeled {
            label: field(payload.label, ty, "label")?,
        },
        "commented" => EventKind::Commented {
            body: payload.body.unwrap_or_default(),
        },
        "assigned" => EventKind::Assigned {
            assignee: field(payload.assignee, ty, "assignee")?,
        },
        "unassigned" => EventKind::Unassigned {
            assignee: field(payload.assignee, ty, "assignee")?,
        },
        "referenced" => EventKind::Referenced {
            commit: field(payload.commit, ty, "commit")?,
        },
        "cross-referenced" | "cross_referenced" => EventKind::CrossReferenced {
            source: payload.source.ok_or_else(|| {
                AppError::Source(format!("`{ty}` event without `source` field"))
            })?,
        },
        "closed" => EventKind::Closed,
        "reopened" => EventKind::Reopened,
        "renamed" => EventKind::Renamed {
            from: payload.from.unwrap_or_default(),
            to: payload.to.unwrap_or_default(),
        },
        other => EventKind::Other {
            name: other.to_string(),
        },
    };

    Ok(Event {
        time: payload.time,
        actor: payload.actor.unwrap_or_else(|| "ghost".to_string()),
        kind,
    })
}

/// Convert a parsed archive into its typed form.
pub fn map_archive(payload: RepoArchivePayload) -> Result<RepoArchive> {
    let mut archive = RepoArchive::new(payload.repo);
    archive.commits = payload.commits;
    archive.issues = payload.issues;
    archive.stars = payload.stars;

    for (number, timeline) in payload.events {
        let number: u64 = number.parse().map_err(|_| {
            AppError::Source(format!(
                "Invalid issue number `{number}` in archive of {}",
                archive.repo.full_name()
            ))
        })?;
        let events = timeline
            .into_iter()
            .map(map_event)
            .collect::<Result<Vec<_>>>()?;
        archive.events.insert(number, events);
    }

    Ok(archive)
}

/// Load every archive under `dir` into a [`MemorySource`].
///
/// A repository file that fails to parse is logged and skipped so one broken
/// export does not block the rest.
pub async fn load_dir(dir: &Path) -> Result<MemorySource> {
    let mut source = MemorySource::new();
    let mut entries = tokio::fs::read_dir(dir).await.map_err(|e| {
        AppError::Source(format!("Failed to read archive dir {}: {e}", dir.display()))
    })?;

    while let Some(entry) = entries.next_entry().await? {
        let path = entry.path();
        let file_name = entry.file_name().to_string_lossy().to_string();
        if !file_name.ends_with(".json") {
            continue;
        }

        let bytes = tokio::fs::read(&path).await?;

        if file_name == USERS_FILE {
            let users: HashMap<String, Vec<Contribution>> = serde_json::from_slice(&bytes)?;
            for (login, contributions) in users {
                source.add_contributions(&login, contributions);
            }
            continue;
        }

        let parsed = serde_json::from_slice::<RepoArchivePayload>(&bytes)
            .map_err(AppError::from)
            .and_then(map_archive);
        match parsed {
            Ok(archive) => {
                tracing::debug!(repo = %archive.repo.full_name(), "Loaded archive");
                source.add_repo(archive);
            }
            Err(e) => {
                tracing::warn!(file = %path.display(), error = %e, "Skipping unreadable archive");
            }
        }
    }

    Ok(source)
}
