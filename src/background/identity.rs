//! The single place where GitHub identities are normalized.

use crate::source::types::Commit;

/// Login GitHub shows for deleted accounts.
pub const GHOST: &str = "ghost";

/// Committer identity GitHub uses for commits made through the web UI and merges.
pub const WEB_FLOW: &str = "web-flow";

pub fn is_ghost(login: &str) -> bool {
    login.is_empty() || login.eq_ignore_ascii_case(GHOST)
}

/// A login that can carry statistics, or `None` for ghost/empty logins.
pub fn normalize_login(login: &str) -> Option<&str> {
    (!is_ghost(login)).then_some(login)
}

/// The user a commit counts for.
///
/// Commits are attributed to their author. The committer is only used when
/// no author is known, and never when it is `web-flow`, which would otherwise
/// absorb every merge made through GitHub.
pub fn commit_author(commit: &Commit) -> Option<&str> {
    match (commit.author.as_deref(), commit.committer.as_deref()) {
        (Some(author), _) => normalize_login(author),
        (None, Some(committer)) if committer != WEB_FLOW => normalize_login(committer),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn commit(author: Option<&str>, committer: Option<&str>) -> Commit {
        Commit {
            sha: "0".to_string(),
            author: author.map(str::to_string),
            committer: committer.map(str::to_string),
            authored_at: Utc::now(),
            committed_at: Utc::now(),
            message: String::new(),
        }
    }

    #[test]
    fn test_web_flow_commits_count_for_author() {
        assert_eq!(commit_author(&commit(Some("alice"), Some(WEB_FLOW))), Some("alice"));
        assert_eq!(commit_author(&commit(None, Some(WEB_FLOW))), None);
        assert_eq!(commit_author(&commit(None, Some("bob"))), Some("bob"));
    }

    #[test]
    fn test_ghost_has_no_identity() {
        assert!(is_ghost("ghost"));
        assert!(is_ghost(""));
        assert!(!is_ghost("ghostwriter"));
        assert_eq!(commit_author(&commit(Some("ghost"), Some("bob"))), None);
    }
}
