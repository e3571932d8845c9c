//! Conflict classification types.
//!
//! Produced by the conflict detector from a dry-run tree merge; consumed by
//! the merge resolver. Instances live for exactly one detection cycle.

use serde::{Deserialize, Serialize};

/// How a single conflicted path should be handled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ConflictKind {
    /// Both sides changed a text file; needs interactive resolution.
    Text,
    /// Both sides changed a binary file; resolved by keeping the local side.
    Binary,
    /// One side deleted the file while the other modified it.
    DeleteModify,
    /// One side renamed the file while the other modified it.
    RenameModify,
}

/// One conflicted path and its classification.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConflictFile {
    /// Vault-relative path in forward-slash form.
    pub path: String,
    /// Conflict classification.
    pub kind: ConflictKind,
}

impl ConflictFile {
    /// Creates a conflict entry.
    pub fn new(path: impl Into<String>, kind: ConflictKind) -> Self {
        Self {
            path: path.into(),
            kind,
        }
    }
}

/// Aggregate result of one conflict detection pass.
///
/// Invariant: `has_conflicts == !files.is_empty()`. `can_fast_forward` is
/// only meaningful when `has_conflicts` is false and signals whether the
/// local branch can simply be fast-forwarded before pushing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConflictDetectionResult {
    /// Whether any conflicted paths were found.
    pub has_conflicts: bool,
    /// The conflicted paths, classified.
    pub files: Vec<ConflictFile>,
    /// Whether the local branch is a strict ancestor of the fetched head.
    pub can_fast_forward: bool,
}

impl ConflictDetectionResult {
    /// Result with conflicted files. `can_fast_forward` is forced false.
    pub fn conflicts(files: Vec<ConflictFile>) -> Self {
        Self {
            has_conflicts: !files.is_empty(),
            files,
            can_fast_forward: false,
        }
    }

    /// Clean result: nothing to merge, or remote strictly ahead.
    pub fn clean(can_fast_forward: bool) -> Self {
        Self {
            has_conflicts: false,
            files: Vec::new(),
            can_fast_forward,
        }
    }
}
