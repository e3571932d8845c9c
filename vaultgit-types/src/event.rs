//! The typed sync event stream.
//!
//! Every engine component broadcasts `SyncEvent`s on its own bus;
//! orchestrators aggregate child events onto their own. Emission is
//! fire-and-forget: no consumer may assume delivery ordering across
//! listeners registered concurrently with an emission.

use crate::conflict::ConflictFile;
use serde::{Deserialize, Serialize};

/// A single event emitted by the sync engines.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum SyncEvent {
    /// An auto-commit (or merge finalization) created a commit.
    Commit { message: String },
    /// A push is about to start.
    PushStart,
    /// A push completed successfully.
    PushComplete,
    /// A push was skipped; `reason` is e.g. `"not-ahead"`.
    PushSkipped { reason: String },
    /// A fetch/merge (or fast-forward) cycle completed.
    PullComplete,
    /// Conflicts were detected; resolution is starting.
    Conflict { files: Vec<ConflictFile> },
    /// A merge (manual or automatic) finished successfully.
    MergeComplete,
    /// An unexpected error; the current cycle was abandoned.
    Error { message: String },
    /// Credentials were rejected; the network path is halted.
    AuthError { message: String },
    /// The remote is unreachable; will retry on schedule.
    Offline,
    /// A file exceeded the auto-commit size gate and was skipped.
    LargeFile { path: String },
    /// A manifest poll completed (any outcome).
    ManifestCheck,
    /// A manifest update was not applied; `reason` is e.g. `"downgrade"`.
    UpdateSkipped { reason: String },
    /// A shallow resync applied the given manifest version.
    UpdateApplied { version: String },
    /// Locally dirty files were copied to a recovery folder before a reset.
    DirtyRecovered { paths: Vec<String> },
}

impl SyncEvent {
    /// The subscription key for this event.
    pub fn kind(&self) -> SyncEventKind {
        match self {
            Self::Commit { .. } => SyncEventKind::Commit,
            Self::PushStart => SyncEventKind::PushStart,
            Self::PushComplete => SyncEventKind::PushComplete,
            Self::PushSkipped { .. } => SyncEventKind::PushSkipped,
            Self::PullComplete => SyncEventKind::PullComplete,
            Self::Conflict { .. } => SyncEventKind::Conflict,
            Self::MergeComplete => SyncEventKind::MergeComplete,
            Self::Error { .. } => SyncEventKind::Error,
            Self::AuthError { .. } => SyncEventKind::AuthError,
            Self::Offline => SyncEventKind::Offline,
            Self::LargeFile { .. } => SyncEventKind::LargeFile,
            Self::ManifestCheck => SyncEventKind::ManifestCheck,
            Self::UpdateSkipped { .. } => SyncEventKind::UpdateSkipped,
            Self::UpdateApplied { .. } => SyncEventKind::UpdateApplied,
            Self::DirtyRecovered { .. } => SyncEventKind::DirtyRecovered,
        }
    }
}

/// Fieldless discriminant of `SyncEvent`, used as the bus subscription key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SyncEventKind {
    Commit,
    PushStart,
    PushComplete,
    PushSkipped,
    PullComplete,
    Conflict,
    MergeComplete,
    Error,
    AuthError,
    Offline,
    LargeFile,
    ManifestCheck,
    UpdateSkipped,
    UpdateApplied,
    DirtyRecovered,
}
