//! Lifecycle composition of the read-only CDN engine.
//!
//! Wires the manifest poller, version controller, and shallow executor
//! into one unit. The poller hands every manifest to an update pipeline
//! that consults the persisted local version, applies downgrade
//! protection, and drives the shallow resync.

use super::poller::{ManifestPoller, UpdateHandler};
use super::shallow::ShallowSyncExecutor;
use super::version::VersionController;
use crate::bus::EventBus;
use crate::config::CdnConfig;
use crate::error::SyncResult;
use crate::host::{CredentialProvider, FileStore, SyncStateStore};
use crate::lock::RepoLock;
use async_trait::async_trait;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};
use tracing::info;
use vaultgit_git::Git;
use vaultgit_types::{Manifest, SyncEvent};

/// Manifest-to-resync pipeline, invoked by the poller.
struct UpdatePipeline {
    bus: Arc<EventBus>,
    versions: VersionController,
    executor: Arc<ShallowSyncExecutor>,
    credentials: Arc<dyn CredentialProvider>,
    state: Arc<dyn SyncStateStore>,
    /// One-shot: the next version check treats a downgrade as a forced
    /// resync, then the flag clears.
    force_next: AtomicBool,
}

#[async_trait]
impl UpdateHandler for UpdatePipeline {
    async fn update_available(&self, manifest: Manifest) {
        self.apply(manifest).await;
    }
}

impl UpdatePipeline {
    async fn apply(&self, manifest: Manifest) {
        let local = self.state.local_version().await;
        let force = self.force_next.swap(false, Ordering::SeqCst);
        let decision = self
            .versions
            .should_update(local.as_deref(), &manifest.version, force);

        if !decision.should_update {
            self.bus.emit(SyncEvent::UpdateSkipped {
                reason: decision.reason.to_string(),
            });
            return;
        }

        let token = self.credentials.token().await;
        match self.executor.execute(token.as_deref()).await {
            Ok(()) => {
                self.state.set_local_version(&manifest.version).await;
                self.bus.emit(SyncEvent::UpdateApplied {
                    version: manifest.version.clone(),
                });
            }
            Err(e) => {
                self.bus.emit(SyncEvent::Error {
                    message: format!("shallow resync to {} failed: {e}", manifest.version),
                });
            }
        }
        // Released after the attempt either way; a failed resync may be
        // retried on the next poll.
        self.versions.complete();
    }
}

/// One lifecycle-managed read-only sync engine over one working tree.
pub struct PublicSyncOrchestrator {
    bus: Arc<EventBus>,
    git: Arc<dyn Git>,
    state: Arc<dyn SyncStateStore>,
    poller: Arc<ManifestPoller>,
    pipeline: Arc<UpdatePipeline>,
    config: CdnConfig,
    running: AtomicBool,
}

impl PublicSyncOrchestrator {
    /// Builds the engine stack. Fails only if the HTTP client cannot be
    /// built.
    pub fn new(
        git: Arc<dyn Git>,
        files: Arc<dyn FileStore>,
        credentials: Arc<dyn CredentialProvider>,
        state: Arc<dyn SyncStateStore>,
        config: CdnConfig,
    ) -> SyncResult<Arc<Self>> {
        let bus = EventBus::new();
        let lock = RepoLock::new();

        let executor = ShallowSyncExecutor::new(
            Arc::clone(&git),
            lock,
            Arc::clone(&bus),
            files,
            config.clone(),
        );

        let pipeline = Arc::new(UpdatePipeline {
            bus: Arc::clone(&bus),
            versions: VersionController::new(),
            executor,
            credentials,
            state: Arc::clone(&state),
            force_next: AtomicBool::new(false),
        });

        let poller = ManifestPoller::new(
            config.clone(),
            Arc::clone(&bus),
            Arc::clone(&pipeline) as Arc<dyn UpdateHandler>,
        )?;

        Ok(Arc::new(Self {
            bus,
            git,
            state,
            poller,
            pipeline,
            config,
            running: AtomicBool::new(false),
        }))
    }

    /// Starts the poll timer. Idempotent while running.
    pub async fn start(self: &Arc<Self>) {
        if self.running.swap(true, Ordering::SeqCst) {
            return;
        }
        self.poller.start();
        self.maybe_gc().await;
        info!(url = %self.config.manifest_url, "cdn sync engine started");
    }

    /// Stops the poll timer. An in-flight resync is not aborted.
    pub fn stop(&self) {
        if !self.running.swap(false, Ordering::SeqCst) {
            return;
        }
        self.poller.stop();
        info!("cdn sync engine stopped");
    }

    /// Manual "check for updates now" trigger.
    pub async fn check_now(&self) {
        self.poller.check_now().await;
    }

    /// Forces a resync on the next manifest check even if the published
    /// version is older than the local one.
    pub async fn force_resync(&self) {
        self.pipeline.force_next.store(true, Ordering::SeqCst);
        self.poller.check_now().await;
    }

    /// Whether a resync is currently being applied.
    pub fn is_updating(&self) -> bool {
        self.pipeline.versions.is_in_progress()
    }

    /// The last successfully parsed manifest, if any.
    pub fn last_manifest(&self) -> Option<Manifest> {
        self.poller.last_known_good()
    }

    /// The aggregated event stream.
    pub fn events(&self) -> &Arc<EventBus> {
        &self.bus
    }

    /// Fire-and-forget `gc --auto`, at most once per configured interval.
    async fn maybe_gc(&self) {
        let now = now_ms();
        let due = match self.state.last_cdn_gc().await {
            Some(last) => now.saturating_sub(last) >= self.config.gc_interval.as_millis() as u64,
            None => true,
        };
        if !due {
            return;
        }
        self.state.set_last_cdn_gc(now).await;
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
