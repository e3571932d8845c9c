//! Destructive shallow resync with dirty-file recovery.
//!
//! Brings the working tree to the CDN-published state with a depth-1 fetch
//! and a hard reset. Local edits are never silently discarded: every dirty
//! file is copied into a timestamped recovery folder first, and a failed
//! copy aborts the whole resync before anything destructive happens.

use crate::bus::EventBus;
use crate::config::CdnConfig;
use crate::error::{SyncError, SyncResult};
use crate::host::FileStore;
use crate::lock::RepoLock;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{info, warn};
use vaultgit_git::Git;
use vaultgit_types::SyncEvent;

/// Executes one shallow resync against the published branch.
pub struct ShallowSyncExecutor {
    git: Arc<dyn Git>,
    lock: Arc<RepoLock>,
    bus: Arc<EventBus>,
    files: Arc<dyn FileStore>,
    config: CdnConfig,
    sparse_initialized: AtomicBool,
}

impl ShallowSyncExecutor {
    pub fn new(
        git: Arc<dyn Git>,
        lock: Arc<RepoLock>,
        bus: Arc<EventBus>,
        files: Arc<dyn FileStore>,
        config: CdnConfig,
    ) -> Arc<Self> {
        Arc::new(Self {
            git,
            lock,
            bus,
            files,
            config,
            sparse_initialized: AtomicBool::new(false),
        })
    }

    /// One full resync: recover dirty files, shallow-fetch, hard-reset,
    /// refresh. Holds the repository lock for the whole operation since
    /// an interleaved write between recovery and reset would be lost.
    pub async fn execute(&self, token: Option<&str>) -> SyncResult<()> {
        let _guard = self.lock.acquire().await;

        let dirty = self.dirty_paths().await?;
        if !dirty.is_empty() {
            self.recover(&dirty).await?;
            self.bus.emit(SyncEvent::DirtyRecovered {
                paths: dirty.clone(),
            });
        }

        if !self.config.subscribed_folders.is_empty() {
            if !self.sparse_initialized.swap(true, Ordering::SeqCst) {
                self.git.sparse_checkout_init().await?;
            }
            // Re-applied every cycle: the subscription set may have
            // changed since the last resync.
            self.git
                .sparse_checkout_set(&self.config.subscribed_folders)
                .await?;
        }

        self.git.shallow_fetch(&self.config.branch, token).await?;
        self.git.reset_hard("FETCH_HEAD").await?;

        if !dirty.is_empty() {
            self.files.refresh(&dirty).await;
        }
        info!(branch = %self.config.branch, "shallow resync applied");
        Ok(())
    }

    /// Modified and untracked paths from `status --porcelain`.
    async fn dirty_paths(&self) -> SyncResult<Vec<String>> {
        let status = self.git.status_porcelain().await?;
        Ok(parse_porcelain(&status))
    }

    /// Copies every dirty file into a timestamped recovery folder. Any
    /// copy failure aborts the resync; a reset after a partial recovery
    /// would destroy the files that were not copied.
    async fn recover(&self, dirty: &[String]) -> SyncResult<()> {
        let stamp = chrono::Utc::now().format("%Y%m%d-%H%M%S");
        let dest_root = format!("{}/{stamp}", self.config.recovery_dir);

        for path in dirty {
            let dest = format!("{dest_root}/{path}");
            if let Err(e) = self.files.copy(path, &dest).await {
                warn!(path = %path, "dirty-file recovery failed; aborting resync");
                return Err(SyncError::Host(format!(
                    "recovery copy of {path} failed: {e}"
                )));
            }
        }
        info!(count = dirty.len(), dest = %dest_root, "dirty files recovered");
        Ok(())
    }
}

/// Extracts paths from `git status --porcelain` output. Rename lines use
/// the post-rename path; quoted paths keep their quoting stripped.
fn parse_porcelain(output: &str) -> Vec<String> {
    output
        .lines()
        .filter_map(|line| {
            if line.len() < 4 {
                return None;
            }
            let path = &line[3..];
            let path = match path.split_once(" -> ") {
                Some((_, renamed)) => renamed,
                None => path,
            };
            let path = path.trim().trim_matches('"');
            if path.is_empty() {
                None
            } else {
                Some(path.to_string())
            }
        })
        .collect()
}
