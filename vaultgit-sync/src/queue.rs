//! Periodic fetch → detect → resolve → push cycle.
//!
//! Driven by a fixed-interval timer plus on-demand triggers. A cycle still
//! in flight when the next tick fires causes that tick to be skipped
//! entirely (never queued): concurrent git invocations against one working
//! tree are unsafe. Rate-limit backoff reschedules the recurring timer
//! itself, capped at thirty minutes.

use crate::bus::EventBus;
use crate::config::SyncConfig;
use crate::detector::ConflictDetector;
use crate::error::SyncResult;
use crate::host::CredentialProvider;
use crate::lock::RepoLock;
use crate::resolver::MergeResolver;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::{Arc, Mutex as StdMutex};
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use vaultgit_git::{Git, GitError, GitErrorKind};
use vaultgit_types::SyncEvent;

type PausePredicate = Arc<dyn Fn() -> bool + Send + Sync>;

/// The periodic network synchronization queue.
pub struct NetworkSyncQueue {
    git: Arc<dyn Git>,
    lock: Arc<RepoLock>,
    bus: Arc<EventBus>,
    detector: ConflictDetector,
    resolver: Arc<MergeResolver>,
    credentials: Arc<dyn CredentialProvider>,
    config: SyncConfig,
    running: AtomicBool,
    /// Zombie protection: true while a cycle is in flight.
    in_flight: AtomicBool,
    /// Persistent halt after a classified auth failure; cleared only by
    /// an explicit [`Self::reset_auth`].
    halted: AtomicBool,
    failures: AtomicU32,
    current_interval: StdMutex<Duration>,
    last_push_ms: StdMutex<Option<u64>>,
    timer: StdMutex<Option<JoinHandle<()>>>,
    shutdown: Notify,
    paused: PausePredicate,
}

impl NetworkSyncQueue {
    /// Creates a queue. `paused` is the orchestrator's conflict-pause
    /// predicate; while it holds, timer ticks are skipped.
    pub fn new(
        git: Arc<dyn Git>,
        lock: Arc<RepoLock>,
        bus: Arc<EventBus>,
        resolver: Arc<MergeResolver>,
        credentials: Arc<dyn CredentialProvider>,
        config: SyncConfig,
        paused: PausePredicate,
    ) -> Arc<Self> {
        let detector = ConflictDetector::new(Arc::clone(&git));
        let interval = config.sync_interval;
        Arc::new(Self {
            git,
            lock,
            bus,
            detector,
            resolver,
            credentials,
            config,
            running: AtomicBool::new(false),
            in_flight: AtomicBool::new(false),
            halted: AtomicBool::new(false),
            failures: AtomicU32::new(0),
            current_interval: StdMutex::new(interval),
            last_push_ms: StdMutex::new(None),
            timer: StdMutex::new(None),
            shutdown: Notify::new(),
            paused,
        })
    }

    /// Starts the recurring cycle timer.
    pub fn start(self: &Arc<Self>) {
        if self.running.swap(true, Ordering::SeqCst) {
            return;
        }
        *lock_mutex(&self.current_interval) = self.config.sync_interval;

        let queue = Arc::clone(self);
        let handle = tokio::spawn(async move {
            loop {
                let interval = *lock_mutex(&queue.current_interval);
                tokio::select! {
                    _ = tokio::time::sleep(interval) => {}
                    _ = queue.shutdown.notified() => {
                        if !queue.running.load(Ordering::SeqCst) {
                            break;
                        }
                        // Stale permit from an earlier stop.
                        continue;
                    }
                }
                if !queue.running.load(Ordering::SeqCst) {
                    break;
                }
                if (queue.paused)() {
                    debug!("cycle skipped: paused for conflict");
                    continue;
                }
                queue.run_cycle().await;
            }
        });
        *lock_mutex(&self.timer) = Some(handle);
    }

    /// Cancels future ticks. An in-flight cycle is never aborted; it runs
    /// to completion and the timer task exits at its next loop turn.
    pub fn stop(&self) {
        self.running.store(false, Ordering::SeqCst);
        self.shutdown.notify_one();
        lock_mutex(&self.timer).take();
    }

    /// Manual trigger: runs one cycle now, honoring the halt flag and the
    /// zombie-skip.
    pub async fn push_now(self: &Arc<Self>) {
        self.run_cycle().await;
    }

    /// Forces exactly one full cycle regardless of the timer, honoring
    /// halt and pause but not the zombie-skip. Callers invoke this only at
    /// shutdown, when no other cycle can be in flight.
    pub async fn flush(&self) -> SyncResult<()> {
        if self.halted.load(Ordering::SeqCst) {
            self.bus.emit(SyncEvent::AuthError {
                message: "sync halted: credentials rejected".to_string(),
            });
            return Ok(());
        }
        if (self.paused)() {
            return Ok(());
        }
        self.cycle_inner().await;
        Ok(())
    }

    /// Clears the auth halt after the user supplied a new credential.
    pub fn reset_auth(&self) {
        self.halted.store(false, Ordering::SeqCst);
        self.failures.store(0, Ordering::SeqCst);
        *lock_mutex(&self.current_interval) = self.config.sync_interval;
        info!("auth halt cleared");
    }

    /// Whether the network path is halted on an auth failure.
    pub fn is_halted(&self) -> bool {
        self.halted.load(Ordering::SeqCst)
    }

    /// Consecutive failure count. Diagnostics only.
    pub fn failure_count(&self) -> u32 {
        self.failures.load(Ordering::SeqCst)
    }

    /// Whether a cycle is currently in flight.
    pub fn is_syncing(&self) -> bool {
        self.in_flight.load(Ordering::SeqCst)
    }

    /// Timestamp of the last successful push, ms since epoch.
    pub fn last_push_ms(&self) -> Option<u64> {
        *lock_mutex(&self.last_push_ms)
    }

    /// The bus this queue emits on.
    pub fn events(&self) -> &Arc<EventBus> {
        &self.bus
    }

    async fn run_cycle(&self) {
        if self.halted.load(Ordering::SeqCst) {
            self.bus.emit(SyncEvent::AuthError {
                message: "sync halted: credentials rejected".to_string(),
            });
            return;
        }
        if self.in_flight.swap(true, Ordering::SeqCst) {
            debug!("cycle skipped: previous cycle still in flight");
            return;
        }
        self.cycle_inner().await;
        self.in_flight.store(false, Ordering::SeqCst);
    }

    /// One full cycle: fetch, detect, resolve or merge, gated push.
    async fn cycle_inner(&self) {
        let branch = self.config.branch.clone();
        let token = self.credentials.token().await;

        {
            let _guard = self.lock.acquire().await;
            if let Err(e) = self.git.fetch(&branch, token.as_deref()).await {
                self.handle_failure("fetch", &e);
                return;
            }
        }

        let detection = match self.detector.detect().await {
            Ok(d) => d,
            Err(e) => {
                self.bus.emit(SyncEvent::Error {
                    message: format!("conflict detection failed: {e}"),
                });
                return;
            }
        };

        if detection.has_conflicts {
            self.bus.emit(SyncEvent::Conflict {
                files: detection.files.clone(),
            });
            if let Err(e) = self.resolver.resolve(&detection.files).await {
                self.bus.emit(SyncEvent::Error {
                    message: format!("merge resolution failed: {e}"),
                });
                return;
            }
            self.bus.emit(SyncEvent::MergeComplete);
        } else if !detection.can_fast_forward {
            // Diverged or remote-ahead without conflicts: an explicit
            // merge, kept separate from fetch so each step stays
            // independently observable and retryable.
            let _guard = self.lock.acquire().await;
            if let Err(e) = self.git.merge("FETCH_HEAD").await {
                drop(_guard);
                self.handle_failure("merge", &e);
                return;
            }
            self.bus.emit(SyncEvent::PullComplete);
        } else {
            self.bus.emit(SyncEvent::PullComplete);
        }

        // Smart-push gate: pushing with nothing new is a pointless round
        // trip and remote rate-limit pressure.
        let ahead = match self.git.ahead_count().await {
            Ok(n) => n,
            Err(e) => {
                self.handle_failure("rev-list", &e);
                return;
            }
        };
        if ahead == 0 {
            self.bus.emit(SyncEvent::PushSkipped {
                reason: "not-ahead".to_string(),
            });
            return;
        }

        self.bus.emit(SyncEvent::PushStart);
        let push_result = {
            let _guard = self.lock.acquire().await;
            self.git.push(&branch, token.as_deref(), false).await
        };
        match push_result {
            Ok(()) => {
                self.failures.store(0, Ordering::SeqCst);
                *lock_mutex(&self.current_interval) = self.config.sync_interval;
                *lock_mutex(&self.last_push_ms) = Some(now_ms());
                self.bus.emit(SyncEvent::PushComplete);
            }
            Err(e) => self.handle_failure("push", &e),
        }
    }

    /// Classified failure handling for one cycle step.
    fn handle_failure(&self, step: &str, error: &GitError) {
        match error.kind() {
            GitErrorKind::Offline => {
                self.failures.fetch_add(1, Ordering::SeqCst);
                self.bus.emit(SyncEvent::Offline);
            }
            GitErrorKind::AuthExpired => {
                self.halted.store(true, Ordering::SeqCst);
                warn!("credentials rejected during {step}; halting network sync");
                self.bus.emit(SyncEvent::AuthError {
                    message: format!("{step} rejected: credentials expired"),
                });
            }
            GitErrorKind::RateLimited => {
                let failures = self.failures.fetch_add(1, Ordering::SeqCst) + 1;
                let backoff = backoff_interval(
                    self.config.sync_interval,
                    failures,
                    self.config.backoff_cap,
                );
                *lock_mutex(&self.current_interval) = backoff;
                warn!("rate limited during {step}; backing off to {backoff:?}");
                self.bus.emit(SyncEvent::Error {
                    message: format!("{step} rate-limited; retrying in {}s", backoff.as_secs()),
                });
            }
            _ => {
                self.failures.fetch_add(1, Ordering::SeqCst);
                self.bus.emit(SyncEvent::Error {
                    message: format!("{step} failed: {error}"),
                });
            }
        }
    }
}

/// Exponential backoff: base × 2^failures, capped.
pub(crate) fn backoff_interval(base: Duration, failures: u32, cap: Duration) -> Duration {
    let multiplier = 2u32.checked_pow(failures.min(16)).unwrap_or(u32::MAX);
    base.checked_mul(multiplier).map_or(cap, |d| d.min(cap))
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
