//! Lifecycle composition of the read/write engines.
//!
//! Wires the runner, lock, auto-commit engine, conflict detector, merge
//! resolver, and network queue into one unit: `start` / `stop` / `flush`,
//! conflict-pause arbitration, event aggregation onto a single bus, and
//! opportunistic repository GC.

use crate::autocommit::AutoCommitEngine;
use crate::bus::{EventBus, SubscriptionId};
use crate::config::SyncConfig;
use crate::error::SyncResult;
use crate::host::{AuthorProvider, CredentialProvider, FileStore, MergeFrontend, SyncStateStore};
use crate::lock::RepoLock;
use crate::queue::NetworkSyncQueue;
use crate::resolver::MergeResolver;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex as StdMutex};
use std::time::{SystemTime, UNIX_EPOCH};
use tracing::info;
use vaultgit_git::Git;
use vaultgit_types::SyncEventKind;

/// One lifecycle-managed read/write sync engine over one working tree.
pub struct SyncOrchestrator {
    bus: Arc<EventBus>,
    lock: Arc<RepoLock>,
    git: Arc<dyn Git>,
    state: Arc<dyn SyncStateStore>,
    autocommit: Arc<AutoCommitEngine>,
    queue: Arc<NetworkSyncQueue>,
    resolver: Arc<MergeResolver>,
    config: SyncConfig,
    running: AtomicBool,
    forwards: StdMutex<Vec<(ForwardSource, SubscriptionId)>>,
}

#[derive(Clone, Copy)]
enum ForwardSource {
    AutoCommit,
    Queue,
    Resolver,
}

impl SyncOrchestrator {
    /// Builds the engine stack over one working tree. The lock instance
    /// created here is the single mutual-exclusion point for every write
    /// path touching that tree.
    pub fn new(
        git: Arc<dyn Git>,
        files: Arc<dyn FileStore>,
        frontend: Arc<dyn MergeFrontend>,
        credentials: Arc<dyn CredentialProvider>,
        author: Arc<dyn AuthorProvider>,
        state: Arc<dyn SyncStateStore>,
        config: SyncConfig,
    ) -> Arc<Self> {
        let bus = EventBus::new();
        let lock = RepoLock::new();

        let resolver = MergeResolver::new(
            Arc::clone(&git),
            Arc::clone(&lock),
            EventBus::new(),
            files,
            frontend,
            Arc::clone(&author),
            config.keep_local_fragments.clone(),
        );

        // The resolver's merging flag doubles as the conflict-pause
        // signal for both children.
        let merging = resolver.merging_flag();
        let paused: Arc<dyn Fn() -> bool + Send + Sync> = {
            let merging = Arc::clone(&merging);
            Arc::new(move || merging.load(Ordering::SeqCst))
        };

        let autocommit = AutoCommitEngine::new(
            Arc::clone(&git),
            Arc::clone(&lock),
            EventBus::new(),
            author,
            config.clone(),
            merging,
            Arc::clone(&paused),
        );

        let queue = NetworkSyncQueue::new(
            Arc::clone(&git),
            Arc::clone(&lock),
            EventBus::new(),
            Arc::clone(&resolver),
            credentials,
            config.clone(),
            paused,
        );

        Arc::new(Self {
            bus,
            lock,
            git,
            state,
            autocommit,
            queue,
            resolver,
            config,
            running: AtomicBool::new(false),
            forwards: StdMutex::new(Vec::new()),
        })
    }

    /// Recovers from an interrupted merge, wires event forwarding, and
    /// starts both children. Idempotent while running.
    pub async fn start(self: &Arc<Self>) -> SyncResult<()> {
        if self.running.swap(true, Ordering::SeqCst) {
            return Ok(());
        }

        // Crash recovery runs before any engine may touch the tree.
        self.resolver.recover_interrupted().await?;

        self.wire_forwarding();
        self.autocommit.start();
        self.queue.start();
        self.maybe_gc().await;
        info!(branch = %self.config.branch, "sync engine started");
        Ok(())
    }

    /// Stops both children and drops all forwarded subscriptions.
    pub fn stop(&self) {
        if !self.running.swap(false, Ordering::SeqCst) {
            return;
        }
        self.autocommit.stop();
        self.queue.stop();
        for (source, id) in lock_mutex(&self.forwards).drain(..) {
            match source {
                ForwardSource::AutoCommit => self.autocommit.events().unsubscribe(id),
                ForwardSource::Queue => self.queue.events().unsubscribe(id),
                ForwardSource::Resolver => self.resolver.events().unsubscribe(id),
            }
        }
        info!("sync engine stopped");
    }

    /// Drains pending auto-commits, then performs one final network
    /// cycle. The order matters: the final push can only see commits that
    /// already exist.
    pub async fn flush(&self) -> SyncResult<()> {
        self.autocommit.flush().await?;
        self.queue.flush().await
    }

    /// Inbound edit notification from the host file-change source.
    pub fn notify_edit(&self, path: &str) {
        self.autocommit.record_edit(path);
    }

    /// Manual push trigger.
    pub async fn push_now(&self) {
        self.queue.push_now().await;
    }

    /// Clears the network queue's auth halt.
    pub fn reset_auth(&self) {
        self.queue.reset_auth();
    }

    /// True for the exact duration of a merge-resolver invocation; while
    /// set, new auto-commits and new network cycles are suppressed.
    pub fn paused_for_conflict(&self) -> bool {
        self.resolver.is_merging()
    }

    /// The aggregated event stream.
    pub fn events(&self) -> &Arc<EventBus> {
        &self.bus
    }

    /// The shared working-tree lock. Diagnostics only.
    pub fn repo_lock(&self) -> &Arc<RepoLock> {
        &self.lock
    }

    fn wire_forwarding(self: &Arc<Self>) {
        let mut forwards = lock_mutex(&self.forwards);

        for (source, child_bus) in [
            (ForwardSource::AutoCommit, self.autocommit.events()),
            (ForwardSource::Queue, self.queue.events()),
            (ForwardSource::Resolver, self.resolver.events()),
        ] {
            let bus = Arc::clone(&self.bus);
            let id = child_bus.subscribe_all(move |event| bus.emit(event.clone()));
            forwards.push((source, id));
        }

        // A just-resolved merge is published immediately rather than
        // waiting for the next timer tick.
        let orchestrator = Arc::downgrade(self);
        let id = self
            .queue
            .events()
            .subscribe(SyncEventKind::MergeComplete, move |_| {
                if let Some(this) = orchestrator.upgrade() {
                    if this.running.load(Ordering::SeqCst) {
                        let queue = Arc::clone(&this.queue);
                        tokio::spawn(async move { queue.push_now().await });
                    }
                }
            });
        forwards.push((ForwardSource::Queue, id));
    }

    /// Fire-and-forget `gc --auto`, at most once per configured interval.
    async fn maybe_gc(&self) {
        let now = now_ms();
        let due = match self.state.last_gc().await {
            Some(last) => now.saturating_sub(last) >= self.config.gc_interval.as_millis() as u64,
            None => true,
        };
        if !due {
            return;
        }
        self.state.set_last_gc(now).await;
        let git = Arc::clone(&self.git);
        tokio::spawn(async move { git.gc_auto().await });
    }
}

fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

fn lock_mutex<T>(m: &StdMutex<T>) -> std::sync::MutexGuard<'_, T> {
    m.lock().unwrap_or_else(|e| e.into_inner())
}
