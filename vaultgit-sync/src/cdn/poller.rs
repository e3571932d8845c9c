//! CDN manifest polling with ETag caching.
//!
//! Polls one fixed manifest URL on a timer, issuing conditional requests
//! with the previously cached ETag. Malformed responses degrade to the
//! last known-good manifest instead of breaking polling; 429/503 apply
//! the same reschedule-the-timer backoff as the network queue.

use crate::bus::EventBus;
use crate::config::CdnConfig;
use crate::error::SyncResult;
use crate::queue::backoff_interval;
use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::{Arc, Mutex as StdMutex};
use std::time::Duration;
use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tracing::{debug, warn};
use vaultgit_types::{Manifest, SyncEvent};

/// Receives freshly parsed manifests from the poller.
#[async_trait]
pub trait UpdateHandler: Send + Sync {
    /// Invoked after every poll that produced a manifest (fresh or the
    /// retained last known-good).
    async fn update_available(&self, manifest: Manifest);
}

/// Periodic conditional polling of the release manifest.
pub struct ManifestPoller {
    client: Client,
    config: CdnConfig,
    bus: Arc<EventBus>,
    handler: Arc<dyn UpdateHandler>,
    /// Cached entity tag, weak-validator prefix stripped.
    etag: StdMutex<Option<String>>,
    /// Last successfully parsed manifest, retained across polls.
    last_known_good: StdMutex<Option<Manifest>>,
    failures: AtomicU32,
    current_interval: StdMutex<Duration>,
    running: AtomicBool,
    timer: StdMutex<Option<JoinHandle<()>>>,
    shutdown: Notify,
}

impl ManifestPoller {
    /// Creates a poller. Fails only if the HTTP client cannot be built.
    pub fn new(
        config: CdnConfig,
        bus: Arc<EventBus>,
        handler: Arc<dyn UpdateHandler>,
    ) -> SyncResult<Arc<Self>> {
        let client = Client::builder()
            .timeout(config.request_timeout)
            .user_agent(config.user_agent.clone())
            .build()?;
        let interval = config.poll_interval;
        Ok(Arc::new(Self {
            client,
            config,
            bus,
            handler,
            etag: StdMutex::new(None),
            last_known_good: StdMutex::new(None),
            failures: AtomicU32::new(0),
            current_interval: StdMutex::new(interval),
            running: AtomicBool::new(false),
            timer: StdMutex::new(None),
            shutdown: Notify::new(),
        }))
    }

    /// Starts the recurring poll timer.
    pub fn start(self: &Arc<Self>) {
        if self.running.swap(true, Ordering::SeqCst) {
            return;
        }
        *lock_mutex(&self.current_interval) = self.config.poll_interval;

        let poller = Arc::clone(self);
        let handle = tokio::spawn(async move {
            loop {
                let interval = *lock_mutex(&poller.current_interval);
                tokio::select! {
                    _ = tokio::time::sleep(interval) => {}
                    _ = poller.shutdown.notified() => {
                        if !poller.running.load(Ordering::SeqCst) {
                            break;
                        }
                        // Stale permit from an earlier stop.
                        continue;
                    }
                }
                if !poller.running.load(Ordering::SeqCst) {
                    break;
                }
                poller.poll_and_dispatch().await;
            }
        });
        *lock_mutex(&self.timer) = Some(handle);
    }

    /// Cancels future polls. An in-flight poll is never aborted; it runs
    /// to completion and the timer task exits at its next loop turn.
    pub fn stop(&self) {
        self.running.store(false, Ordering::SeqCst);
        self.shutdown.notify_one();
        lock_mutex(&self.timer).take();
    }

    /// Manual "check for updates now" trigger.
    pub async fn check_now(self: &Arc<Self>) {
        self.poll_and_dispatch().await;
    }

    /// The last successfully parsed manifest, if any.
    pub fn last_known_good(&self) -> Option<Manifest> {
        lock_mutex(&self.last_known_good).clone()
    }

    /// Consecutive failure count. Diagnostics only.
    pub fn failure_count(&self) -> u32 {
        self.failures.load(Ordering::SeqCst)
    }

    /// The bus this poller emits on.
    pub fn events(&self) -> &Arc<EventBus> {
        &self.bus
    }

    async fn poll_and_dispatch(self: &Arc<Self>) {
        if let Some(manifest) = self.poll_once().await {
            self.handler.update_available(manifest).await;
        }
    }

    /// One conditional poll. Returns a manifest to dispatch, which is the
    /// freshly parsed document or, after a parse failure, the retained
    /// last known-good.
    async fn poll_once(&self) -> Option<Manifest> {
        self.bus.emit(SyncEvent::ManifestCheck);

        let mut request = self.client.get(&self.config.manifest_url);
        if let Some(etag) = lock_mutex(&self.etag).clone() {
            request = request.header("If-None-Match", etag);
        }

        let response = match request.send().await {
            Ok(r) => r,
            Err(e) => {
                self.failures.fetch_add(1, Ordering::SeqCst);
                if is_offline_error(&e) {
                    self.bus.emit(SyncEvent::Offline);
                } else {
                    self.bus.emit(SyncEvent::Error {
                        message: format!("manifest poll failed: {e}"),
                    });
                }
                return None;
            }
        };

        match response.status() {
            StatusCode::NOT_MODIFIED => {
                self.failures.store(0, Ordering::SeqCst);
                *lock_mutex(&self.current_interval) = self.config.poll_interval;
                debug!("manifest unchanged (304)");
                None
            }
            StatusCode::TOO_MANY_REQUESTS | StatusCode::SERVICE_UNAVAILABLE => {
                let failures = self.failures.fetch_add(1, Ordering::SeqCst) + 1;
                let backoff = backoff_interval(
                    self.config.poll_interval,
                    failures,
                    self.config.backoff_cap,
                );
                *lock_mutex(&self.current_interval) = backoff;
                warn!("manifest endpoint throttling; backing off to {backoff:?}");
                self.bus.emit(SyncEvent::Error {
                    message: format!(
                        "manifest poll throttled; retrying in {}s",
                        backoff.as_secs()
                    ),
                });
                None
            }
            StatusCode::OK => {
                if let Some(etag) = response.headers().get("etag").and_then(|v| v.to_str().ok())
                {
                    // The weak-validator prefix is stripped before reuse
                    // since the value is sent back verbatim.
                    *lock_mutex(&self.etag) =
                        Some(etag.trim_start_matches("W/").to_string());
                }

                let body = match response.bytes().await {
                    Ok(b) => b,
                    Err(e) => {
                        self.failures.fetch_add(1, Ordering::SeqCst);
                        self.bus.emit(SyncEvent::Error {
                            message: format!("manifest body read failed: {e}"),
                        });
                        return None;
                    }
                };

                match parse_manifest(&body) {
                    Ok(manifest) => {
                        self.failures.store(0, Ordering::SeqCst);
                        *lock_mutex(&self.current_interval) = self.config.poll_interval;
                        *lock_mutex(&self.last_known_good) = Some(manifest.clone());
                        Some(manifest)
                    }
                    Err(e) => {
                        // A transient bad deploy of the manifest must not
                        // break polling; fall back to last known-good.
                        warn!("manifest parse failed: {e}; using last known-good");
                        self.last_known_good()
                    }
                }
            }
            status => {
                self.bus.emit(SyncEvent::Error {
                    message: format!("manifest poll returned {status}"),
                });
                None
            }
        }
    }
}

/// Parses and validates the manifest document.
fn parse_manifest(body: &[u8]) -> Result<Manifest, String> {
    let manifest: Manifest =
        serde_json::from_slice(body).map_err(|e| format!("invalid json: {e}"))?;
    if manifest.version.trim().is_empty() {
        return Err("missing version field".to_string());
    }
    Ok(manifest)
}

/// Offline-vs-generic classification of a network-level failure.
fn is_offline_error(e: &reqwest::Error) -> bool {
    if e.is_timeout() || e.is_connect() {
        return true;
    }
    let text = e.to_string();
    ["dns error", "unresolved host", "connection refused", "timed out"]
        .iter()
        .any(|phrase| text.contains(phrase))
}

fn lock_mutex<T>(m: &StdMutex<T>) -> std::sync::MutexGuard<'_, T> {
    m.lock().unwrap_or_else(|e| e.into_inner())
}
