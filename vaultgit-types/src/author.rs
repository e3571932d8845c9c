//! Commit author identity.

use serde::{Deserialize, Serialize};

/// The identity used for author and committer fields on every commit the
/// engine creates.
///
/// Supplied per-commit through process-local environment variables on the
/// spawned git child; the engine never writes it to any git config.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncAuthor {
    /// Display name, e.g. `"Ada Lovelace"`.
    pub name: String,
    /// Email address, e.g. `"ada@example.com"`.
    pub email: String,
}

impl SyncAuthor {
    /// Creates a new author identity.
    pub fn new(name: impl Into<String>, email: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            email: email.into(),
        }
    }
}
