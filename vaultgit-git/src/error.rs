//! Error types and failure classification for git invocations.

use thiserror::Error;

/// Result type for git operations.
pub type GitResult<T> = Result<T, GitError>;

/// Classified kind of a failed git invocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum GitErrorKind {
    /// The remote is unreachable (DNS, connection, TLS, timeout).
    Offline,
    /// Credentials were rejected by the remote.
    AuthExpired,
    /// The remote is throttling us.
    RateLimited,
    /// The remote repository does not exist or is not a git repository.
    RepoNotFound,
    /// A commit was requested but the index matches HEAD. Not a true error.
    NothingToCommit,
    /// Anything we could not classify.
    Unknown,
}

/// Errors that can occur running git commands.
#[derive(Debug, Error)]
pub enum GitError {
    /// The git binary could not be spawned.
    #[error("failed to spawn git: {0}")]
    Spawn(#[from] std::io::Error),

    /// A git command exited nonzero.
    #[error("git {command} failed: {message}")]
    Command {
        /// The subcommand that failed, e.g. `"push"`.
        command: String,
        /// Classified failure kind.
        kind: GitErrorKind,
        /// Combined stdout+stderr of the failed invocation.
        message: String,
    },

    /// The configured remote URL could not be parsed.
    #[error("invalid remote url: {0}")]
    RemoteUrl(#[from] url::ParseError),
}

impl GitError {
    /// The classified kind of this error.
    pub fn kind(&self) -> GitErrorKind {
        match self {
            Self::Command { kind, .. } => *kind,
            Self::Spawn(_) | Self::RemoteUrl(_) => GitErrorKind::Unknown,
        }
    }
}

/// Classifies a failed git invocation from its combined stdout+stderr.
///
/// Case-sensitive substring matching against known phrase sets. Inherently
/// fragile across git versions and locales; callers depend only on the
/// resulting `GitErrorKind`, never on the raw text.
pub fn classify_git_failure(output: &str) -> GitErrorKind {
    const NOTHING_TO_COMMIT: &[&str] = &["nothing to commit", "no changes added to commit"];
    const AUTH_EXPIRED: &[&str] = &[
        "401",
        "403",
        "Authentication failed",
        "Unauthorized",
        "Permission denied",
    ];
    const RATE_LIMITED: &[&str] = &["429", "rate limit", "Rate limit"];
    const REPO_NOT_FOUND: &[&str] = &[
        "Repository not found",
        "does not appear to be a git repository",
    ];
    const OFFLINE: &[&str] = &[
        "Could not resolve host",
        "Could not resolve hostname",
        "Connection refused",
        "Connection timed out",
        "Operation timed out",
        "Network is unreachable",
        "Failed to connect",
        "SSL_ERROR",
        "TLS connect error",
        "gnutls_handshake",
    ];

    let matches = |phrases: &[&str]| phrases.iter().any(|p| output.contains(p));

    if matches(NOTHING_TO_COMMIT) {
        GitErrorKind::NothingToCommit
    } else if matches(AUTH_EXPIRED) {
        GitErrorKind::AuthExpired
    } else if matches(RATE_LIMITED) {
        GitErrorKind::RateLimited
    } else if matches(REPO_NOT_FOUND) {
        GitErrorKind::RepoNotFound
    } else if matches(OFFLINE) {
        GitErrorKind::Offline
    } else {
        GitErrorKind::Unknown
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classifies_nothing_to_commit() {
        let out = "On branch main\nnothing to commit, working tree clean\n";
        assert_eq!(classify_git_failure(out), GitErrorKind::NothingToCommit);
    }

    #[test]
    fn classifies_auth_expired() {
        for out in [
            "remote: Invalid username or password.\nfatal: Authentication failed for 'https://x'",
            "The requested URL returned error: 401",
            "remote: Unauthorized",
        ] {
            assert_eq!(classify_git_failure(out), GitErrorKind::AuthExpired);
        }
    }

    #[test]
    fn classifies_rate_limited() {
        let out = "error: RPC failed; HTTP 429 curl 22 The requested URL returned error: 429";
        assert_eq!(classify_git_failure(out), GitErrorKind::RateLimited);
    }

    #[test]
    fn classifies_repo_not_found() {
        for out in [
            "remote: Repository not found.",
            "fatal: 'origin' does not appear to be a git repository",
        ] {
            assert_eq!(classify_git_failure(out), GitErrorKind::RepoNotFound);
        }
    }

    #[test]
    fn classifies_offline() {
        for out in [
            "fatal: unable to access 'https://x/': Could not resolve host: example.com",
            "ssh: connect to host example.com port 22: Connection refused",
            "fatal: unable to access 'https://x/': Failed to connect to example.com port 443",
        ] {
            assert_eq!(classify_git_failure(out), GitErrorKind::Offline);
        }
    }

    #[test]
    fn unrecognized_output_is_unknown() {
        assert_eq!(
            classify_git_failure("fatal: bad object refs/heads/zzz"),
            GitErrorKind::Unknown
        );
    }

    #[test]
    fn nothing_to_commit_wins_over_later_phrases() {
        // A status blob can contain branch names with digits; the commit
        // outcome phrase must take precedence.
        let out = "nothing to commit (branch release-403)";
        assert_eq!(classify_git_failure(out), GitErrorKind::NothingToCommit);
    }
}
