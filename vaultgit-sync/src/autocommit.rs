//! Per-file debounced auto-commit engine.
//!
//! Each edited path runs its own sliding debounce window: every edit
//! re-arms that path's timer, so N edits inside the window produce at most
//! one commit attempt, no earlier than one window after the last edit.
//! Memory is bounded by the number of distinct edited paths, not the
//! number of edits.

use crate::bus::EventBus;
use crate::config::SyncConfig;
use crate::error::SyncResult;
use crate::host::AuthorProvider;
use crate::lock::RepoLock;
use sha2::{Digest, Sha256};
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex as StdMutex};
use std::time::{SystemTime, UNIX_EPOCH};
use tokio::task::JoinHandle;
use tracing::{debug, warn};
use vaultgit_git::Git;
use vaultgit_types::SyncEvent;

type PausePredicate = Arc<dyn Fn() -> bool + Send + Sync>;

/// Debounced per-path staging and committing of vault edits.
pub struct AutoCommitEngine {
    git: Arc<dyn Git>,
    lock: Arc<RepoLock>,
    bus: Arc<EventBus>,
    author: Arc<dyn AuthorProvider>,
    config: SyncConfig,
    /// Armed debounce timers, keyed by normalized path.
    timers: StdMutex<HashMap<String, JoinHandle<()>>>,
    /// Paths awaiting a commit attempt. Must stay consistent with the
    /// timer map: a path present in one is present in (or has just left)
    /// the other; the flush path depends on this.
    pending: StdMutex<HashSet<String>>,
    running: AtomicBool,
    /// Set by the merge resolver for the duration of a merge.
    muted: Arc<AtomicBool>,
    /// Set while conflict UI is active; suppresses new scheduling only.
    paused: PausePredicate,
}

impl AutoCommitEngine {
    /// Creates an engine. `muted` is shared with the merge resolver;
    /// `paused` is the orchestrator's conflict-pause predicate.
    pub fn new(
        git: Arc<dyn Git>,
        lock: Arc<RepoLock>,
        bus: Arc<EventBus>,
        author: Arc<dyn AuthorProvider>,
        config: SyncConfig,
        muted: Arc<AtomicBool>,
        paused: PausePredicate,
    ) -> Arc<Self> {
        Arc::new(Self {
            git,
            lock,
            bus,
            author,
            config,
            timers: StdMutex::new(HashMap::new()),
            pending: StdMutex::new(HashSet::new()),
            running: AtomicBool::new(false),
            muted,
            paused,
        })
    }

    /// Starts accepting edit notifications.
    pub fn start(&self) {
        self.running.store(true, Ordering::SeqCst);
    }

    /// Stops accepting edits and cancels armed timers. In-flight commit
    /// attempts are not aborted; call [`Self::flush`] first at shutdown.
    pub fn stop(&self) {
        self.running.store(false, Ordering::SeqCst);
        let mut timers = lock_mutex(&self.timers);
        for (_, handle) in timers.drain() {
            handle.abort();
        }
        lock_mutex(&self.pending).clear();
    }

    /// The bus this engine emits on.
    pub fn events(&self) -> &Arc<EventBus> {
        &self.bus
    }

    /// Number of paths currently awaiting a commit. Diagnostics only.
    pub fn pending_count(&self) -> usize {
        lock_mutex(&self.pending).len()
    }

    /// Observes an edit to a vault-relative path, (re-)arming its
    /// debounce timer. New scheduling is suppressed while stopped, muted
    /// by a merge, or paused for conflict resolution; already-armed timers
    /// keep running.
    pub fn record_edit(self: &Arc<Self>, path: &str) {
        if !self.running.load(Ordering::SeqCst)
            || self.muted.load(Ordering::SeqCst)
            || (self.paused)()
        {
            return;
        }

        let path = normalize_path(path);
        lock_mutex(&self.pending).insert(path.clone());

        let engine = Arc::clone(self);
        let task_path = path.clone();
        let window = self.config.debounce;
        let handle = tokio::spawn(async move {
            tokio::time::sleep(window).await;
            engine.commit_path(&task_path).await;
        });

        if let Some(previous) = lock_mutex(&self.timers).insert(path, handle) {
            previous.abort();
        }
    }

    /// Drains every armed timer and pending path into one best-effort
    /// batch commit. Individual staging failures (e.g. a file deleted
    /// between scheduling and flush) never abort the batch. Idempotent
    /// when nothing is pending.
    pub async fn flush(&self) -> SyncResult<()> {
        let mut batch: HashSet<String> = {
            let mut timers = lock_mutex(&self.timers);
            for (_, handle) in timers.drain() {
                handle.abort();
            }
            lock_mutex(&self.pending).drain().collect()
        };
        // Paths whose timer fired concurrently have already left both
        // structures; nothing is lost, they commit individually.
        if batch.is_empty() {
            return Ok(());
        }

        let _guard = self.lock.acquire().await;
        let mut staged = 0usize;
        for path in batch.drain() {
            if !self.git.is_file_safe(&path).await {
                self.bus.emit(SyncEvent::LargeFile { path });
                continue;
            }
            if let Err(e) = self.git.add(&path).await {
                warn!(path = %path, "failed to stage file in flush batch: {e}");
                continue;
            }
            staged += 1;
        }

        let message = format!(
            "{} flush {staged} file(s) @{}",
            self.config.commit_prefix,
            short_time_hash()
        );
        let author = self.author.author().await;
        match self.git.commit(&message, &author).await {
            Ok(true) => self.bus.emit(SyncEvent::Commit { message }),
            Ok(false) => debug!("flush batch had nothing to commit"),
            Err(e) => self.bus.emit(SyncEvent::Error {
                message: format!("flush commit failed: {e}"),
            }),
        }
        Ok(())
    }

    /// One path's timer fired: stage and commit it.
    async fn commit_path(&self, path: &str) {
        // Remove from both structures before any async work so the path
        // is never lost if the process is torn down mid-commit.
        lock_mutex(&self.timers).remove(path);
        lock_mutex(&self.pending).remove(path);

        if !self.git.is_file_safe(path).await {
            self.bus.emit(SyncEvent::LargeFile {
                path: path.to_string(),
            });
            return;
        }

        let _guard = self.lock.acquire().await;
        if let Err(e) = self.git.add(path).await {
            self.bus.emit(SyncEvent::Error {
                message: format!("failed to stage {path}: {e}"),
            });
            return;
        }

        let message = format!("{} {path} @{}", self.config.commit_prefix, short_time_hash());
        let author = self.author.author().await;
        match self.git.commit(&message, &author).await {
            Ok(true) => self.bus.emit(SyncEvent::Commit { message }),
            // Editor saves can race the file already matching HEAD.
            Ok(false) => debug!(path, "nothing to commit"),
            Err(e) => self.bus.emit(SyncEvent::Error {
                message: format!("auto-commit of {path} failed: {e}"),
            }),
        }
    }
}

/// Normalizes to the forward-slash, vault-relative form used as map keys
/// and passed to the runner.
fn normalize_path(path: &str) -> String {
    let path = path.replace('\\', "/");
    path.trim_start_matches("./").to_string()
}

/// Short time-derived hash embedded in commit messages so they are
/// unique-ish and scannable. Nothing parses it.
fn short_time_hash() -> String {
    let now_ms = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis())
        .unwrap_or(0);
    let digest = Sha256::digest(now_ms.to_le_bytes());
    hex::encode(&digest[..4])[..7].to_string()
}

fn lock_mutex<T>(m: &StdMutex<T>) -> std::sync::MutexGuard<'_, T> {
    m.lock().unwrap_or_else(|e| e.into_inner())
}
