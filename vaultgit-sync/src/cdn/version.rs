//! Manifest version comparison with downgrade protection.

use std::cmp::Ordering;
use std::sync::atomic::{AtomicBool, Ordering as AtomicOrdering};
use tracing::debug;

/// Outcome of a version check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VersionDecision {
    /// Whether a resync should be applied.
    pub should_update: bool,
    /// Machine-readable reason: `"first-sync"`, `"newer"`, `"up-to-date"`,
    /// `"downgrade"`, `"forced-resync"`, `"check-in-progress"`.
    pub reason: &'static str,
}

impl VersionDecision {
    fn update(reason: &'static str) -> Self {
        Self {
            should_update: true,
            reason,
        }
    }

    fn skip(reason: &'static str) -> Self {
        Self {
            should_update: false,
            reason,
        }
    }
}

/// Pure comparison logic plus a re-entrancy guard.
///
/// A positive decision holds the guard until [`Self::complete`] is
/// called; a concurrent second check during that window returns a
/// non-update result instead of blocking or double-applying.
pub struct VersionController {
    in_progress: AtomicBool,
}

impl VersionController {
    /// Creates an idle controller.
    pub fn new() -> Self {
        Self {
            in_progress: AtomicBool::new(false),
        }
    }

    /// Decides whether the remote manifest version should be applied over
    /// the locally persisted one.
    pub fn should_update(
        &self,
        local: Option<&str>,
        remote: &str,
        force_resync: bool,
    ) -> VersionDecision {
        if self.in_progress.swap(true, AtomicOrdering::SeqCst) {
            return VersionDecision::skip("check-in-progress");
        }

        let decision = match local {
            None => VersionDecision::update("first-sync"),
            Some(local) => match compare_versions(remote, local) {
                Ordering::Greater => VersionDecision::update("newer"),
                Ordering::Equal => VersionDecision::skip("up-to-date"),
                Ordering::Less => {
                    if force_resync {
                        VersionDecision::update("forced-resync")
                    } else {
                        debug!(local, remote, "downgrade rejected");
                        VersionDecision::skip("downgrade")
                    }
                }
            },
        };

        if !decision.should_update {
            self.in_progress.store(false, AtomicOrdering::SeqCst);
        }
        decision
    }

    /// Releases the guard after an update attempt finished (either way).
    pub fn complete(&self) {
        self.in_progress.store(false, AtomicOrdering::SeqCst);
    }

    /// Whether an update is currently being applied.
    pub fn is_in_progress(&self) -> bool {
        self.in_progress.load(AtomicOrdering::SeqCst)
    }
}

impl Default for VersionController {
    fn default() -> Self {
        Self::new()
    }
}

/// Numeric major.minor.patch comparison; missing components are 0 and
/// non-numeric components compare as 0.
pub fn compare_versions(a: &str, b: &str) -> Ordering {
    let parse = |v: &str| -> [u64; 3] {
        let mut parts = [0u64; 3];
        for (i, piece) in v.trim().trim_start_matches('v').split('.').take(3).enumerate() {
            parts[i] = piece.parse().unwrap_or(0);
        }
        parts
    };
    parse(a).cmp(&parse(b))
}
