//! Merge execution and conflict resolution.
//!
//! Runs the real merge after the detector reported conflicts (or a
//! non-fast-forwardable divergence), auto-resolves the deterministic
//! conflict classes by keeping the local side, delegates remaining text
//! conflicts to the host's interactive surface, and finalizes the merge
//! commit. Also owns crash recovery for interrupted merges.

use crate::bus::EventBus;
use crate::error::{SyncError, SyncResult};
use crate::host::{AuthorProvider, FileStore, MergeFrontend};
use crate::lock::RepoLock;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{debug, info, warn};
use vaultgit_git::{Git, GitError};
use vaultgit_types::{ConflictFile, ConflictKind, SyncEvent};

/// Orchestrates one merge attempt.
pub struct MergeResolver {
    git: Arc<dyn Git>,
    lock: Arc<RepoLock>,
    bus: Arc<EventBus>,
    files: Arc<dyn FileStore>,
    frontend: Arc<dyn MergeFrontend>,
    author: Arc<dyn AuthorProvider>,
    keep_local_fragments: Vec<String>,
    /// Set for the duration of a merge; read by the auto-commit engine to
    /// suppress concurrent commits.
    merging: Arc<AtomicBool>,
    recovered: AtomicBool,
}

impl MergeResolver {
    /// Creates a resolver. `keep_local_fragments` are the config-path
    /// fragments always resolved by keeping the local side.
    pub fn new(
        git: Arc<dyn Git>,
        lock: Arc<RepoLock>,
        bus: Arc<EventBus>,
        files: Arc<dyn FileStore>,
        frontend: Arc<dyn MergeFrontend>,
        author: Arc<dyn AuthorProvider>,
        keep_local_fragments: Vec<String>,
    ) -> Arc<Self> {
        Arc::new(Self {
            git,
            lock,
            bus,
            files,
            frontend,
            author,
            keep_local_fragments,
            merging: Arc::new(AtomicBool::new(false)),
            recovered: AtomicBool::new(false),
        })
    }

    /// Whether a merge is currently in progress.
    pub fn is_merging(&self) -> bool {
        self.merging.load(Ordering::SeqCst)
    }

    /// Shared handle to the merging flag, injected into the auto-commit
    /// engine as its mute signal.
    pub fn merging_flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.merging)
    }

    /// The bus this resolver emits on.
    pub fn events(&self) -> &Arc<EventBus> {
        &self.bus
    }

    /// Crash recovery: if an interrupted-merge marker is present, abort
    /// that merge unconditionally to return to a clean state. Runs once;
    /// must be called before any engine starts.
    pub async fn recover_interrupted(&self) -> SyncResult<bool> {
        if self.recovered.swap(true, Ordering::SeqCst) {
            return Ok(false);
        }
        if !self.git.has_merge_head().await {
            return Ok(false);
        }
        warn!("interrupted merge detected; aborting to recover");
        let _guard = self.lock.acquire().await;
        self.git.merge_abort().await?;
        Ok(true)
    }

    /// Executes the real merge and resolves the detector's file list.
    pub async fn resolve(&self, conflicts: &[ConflictFile]) -> SyncResult<()> {
        // Cleared on drop, covering errors and a cancelled future alike;
        // the auto-commit engine must not stay muted after a dead cycle.
        let _merging = MergingGuard::arm(&self.merging);
        self.run_merge(conflicts).await
    }

    async fn run_merge(&self, conflicts: &[ConflictFile]) -> SyncResult<()> {
        let _guard = self.lock.acquire().await;

        if let Err(e) = self.git.merge("FETCH_HEAD").await {
            if is_expected_conflict(&e) {
                debug!("merge reported conflicts as expected");
            } else {
                return Err(SyncError::MergeFailed(e.to_string()));
            }
        }

        let (keep_local, manual): (Vec<&ConflictFile>, Vec<&ConflictFile>) =
            conflicts.iter().partition(|f| self.keeps_local(f));

        for file in keep_local {
            // Best effort: a delete-on-our-side conflict has no local
            // stage to check out; staging the path still records the
            // resolution.
            if let Err(e) = self.git.checkout_ours(&file.path).await {
                debug!(path = %file.path, "checkout --ours failed: {e}");
            }
            if let Err(e) = self.git.add(&file.path).await {
                warn!(path = %file.path, "failed to stage auto-resolved file: {e}");
            }
        }

        if !manual.is_empty() {
            let paths: Vec<String> = manual.iter().map(|f| f.path.clone()).collect();
            info!("delegating {} text conflict(s) to the merge surface", paths.len());
            if !self.frontend.resolve(self.git.workdir(), &paths).await {
                return Err(SyncError::MergeFailed(
                    "interactive resolution abandoned".to_string(),
                ));
            }
            for path in &paths {
                // Re-read what the surface left on disk and push it back
                // through the host's cache-coherent write path before
                // staging, so any host-side cache stays in sync.
                let on_disk = tokio::fs::read(self.git.workdir().join(path))
                    .await
                    .map_err(|e| SyncError::Host(format!("re-reading {path}: {e}")))?;
                self.files.write(path, &on_disk).await?;
                self.git.add(path).await?;
            }
        }

        let author = self.author.author().await;
        let message = "vault(merge): resolve sync conflicts".to_string();
        match self.git.commit(&message, &author).await {
            // Every conflict auto-resolved without net content change.
            Ok(false) => debug!("merge finalization had nothing to commit"),
            Ok(true) => self.bus.emit(SyncEvent::Commit { message }),
            Err(e) => return Err(SyncError::MergeFailed(e.to_string())),
        }
        Ok(())
    }

    /// Deterministic keep-local classes: binary, delete/rename conflicts,
    /// and config/app-settings paths.
    fn keeps_local(&self, file: &ConflictFile) -> bool {
        match file.kind {
            ConflictKind::Binary | ConflictKind::DeleteModify | ConflictKind::RenameModify => true,
            ConflictKind::Text => self
                .keep_local_fragments
                .iter()
                .any(|fragment| file.path.contains(fragment.as_str())),
        }
    }
}

/// Sets the merging flag for its lifetime and clears it on drop.
struct MergingGuard {
    flag: Arc<AtomicBool>,
}

impl MergingGuard {
    fn arm(flag: &Arc<AtomicBool>) -> Self {
        flag.store(true, Ordering::SeqCst);
        Self {
            flag: Arc::clone(flag),
        }
    }
}

impl Drop for MergingGuard {
    fn drop(&mut self) {
        self.flag.store(false, Ordering::SeqCst);
    }
}

/// Whether a merge failure is the expected "real conflict" outcome rather
/// than an unrelated error.
fn is_expected_conflict(e: &GitError) -> bool {
    let text = e.to_string();
    text.contains("CONFLICT")
        || text.contains("Automatic merge failed")
        || text.contains("fix conflicts")
}
