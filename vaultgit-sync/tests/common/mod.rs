//! Shared test harness: a scripted `Git` double and in-memory hosts.
#![allow(dead_code)]

use async_trait::async_trait;
use std::collections::{HashMap, HashSet, VecDeque};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::{Arc, Mutex as StdMutex};
use std::time::Duration;
use tokio::sync::Notify;
use vaultgit_git::{Git, GitError, GitErrorKind, GitResult};
use vaultgit_sync::{
    AuthorProvider, CredentialProvider, EventBus, FileStore, MergeFrontend, SyncError, SyncResult,
    SyncStateStore,
};
use vaultgit_types::{SyncAuthor, SyncEvent, SyncEventKind};

/// Builds a classified command failure.
pub fn command_err(kind: GitErrorKind, message: &str) -> GitError {
    GitError::Command {
        command: "test".to_string(),
        kind,
        message: message.to_string(),
    }
}

// ── scripted git double ─────────────────────────────────────────

/// Scripted `Git` implementation. Every invocation is appended to `calls`
/// (name plus salient arguments); per-operation result queues pop one
/// scripted outcome per call and default to success when empty.
pub struct MockGit {
    workdir: PathBuf,
    pub calls: StdMutex<Vec<String>>,
    pub rev_parse: StdMutex<HashMap<String, String>>,
    pub merge_base: StdMutex<Option<String>>,
    pub merge_tree_output: StdMutex<String>,
    pub ahead: AtomicU32,
    pub status_output: StdMutex<String>,
    pub merge_head: AtomicBool,
    pub unsafe_paths: StdMutex<HashSet<String>>,
    /// Artificial latency applied to every fetch, for overlap tests.
    pub fetch_delay: StdMutex<Duration>,
    pub fetch_results: StdMutex<VecDeque<GitResult<()>>>,
    pub push_results: StdMutex<VecDeque<GitResult<()>>>,
    pub merge_results: StdMutex<VecDeque<GitResult<()>>>,
    pub commit_results: StdMutex<VecDeque<GitResult<bool>>>,
    pub add_results: StdMutex<VecDeque<GitResult<()>>>,
}

impl MockGit {
    pub fn new(workdir: impl Into<PathBuf>) -> Arc<Self> {
        Arc::new(Self {
            workdir: workdir.into(),
            calls: StdMutex::new(Vec::new()),
            rev_parse: StdMutex::new(HashMap::new()),
            merge_base: StdMutex::new(None),
            merge_tree_output: StdMutex::new(String::new()),
            ahead: AtomicU32::new(0),
            status_output: StdMutex::new(String::new()),
            merge_head: AtomicBool::new(false),
            unsafe_paths: StdMutex::new(HashSet::new()),
            fetch_delay: StdMutex::new(Duration::ZERO),
            fetch_results: StdMutex::new(VecDeque::new()),
            push_results: StdMutex::new(VecDeque::new()),
            merge_results: StdMutex::new(VecDeque::new()),
            commit_results: StdMutex::new(VecDeque::new()),
            add_results: StdMutex::new(VecDeque::new()),
        })
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    /// Index of the first call starting with `prefix`, if any.
    pub fn call_index(&self, prefix: &str) -> Option<usize> {
        self.calls().iter().position(|c| c.starts_with(prefix))
    }

    pub fn set_rev(&self, rev: &str, oid: &str) {
        self.rev_parse
            .lock()
            .unwrap()
            .insert(rev.to_string(), oid.to_string());
    }

    pub fn script_fetch(&self, result: GitResult<()>) {
        self.fetch_results.lock().unwrap().push_back(result);
    }

    pub fn script_push(&self, result: GitResult<()>) {
        self.push_results.lock().unwrap().push_back(result);
    }

    pub fn script_merge(&self, result: GitResult<()>) {
        self.merge_results.lock().unwrap().push_back(result);
    }

    pub fn script_commit(&self, result: GitResult<bool>) {
        self.commit_results.lock().unwrap().push_back(result);
    }

    fn record(&self, call: impl Into<String>) {
        self.calls.lock().unwrap().push(call.into());
    }

    fn pop<T>(queue: &StdMutex<VecDeque<GitResult<T>>>, default: T) -> GitResult<T> {
        queue.lock().unwrap().pop_front().unwrap_or(Ok(default))
    }
}

#[async_trait]
impl Git for MockGit {
    fn workdir(&self) -> &Path {
        &self.workdir
    }

    async fn add(&self, path: &str) -> GitResult<()> {
        self.record(format!("add {path}"));
        Self::pop(&self.add_results, ())
    }

    async fn commit(&self, message: &str, author: &SyncAuthor) -> GitResult<bool> {
        self.record(format!("commit {} <{}> {message}", author.name, author.email));
        Self::pop(&self.commit_results, true)
    }

    async fn fetch(&self, branch: &str, token: Option<&str>) -> GitResult<()> {
        self.record(format!("fetch {branch} token={}", token.is_some()));
        let delay = *self.fetch_delay.lock().unwrap();
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        Self::pop(&self.fetch_results, ())
    }

    async fn push(&self, branch: &str, token: Option<&str>, force: bool) -> GitResult<()> {
        self.record(format!(
            "push {branch} token={} force={force}",
            token.is_some()
        ));
        Self::pop(&self.push_results, ())
    }

    async fn merge(&self, rev: &str) -> GitResult<()> {
        self.record(format!("merge {rev}"));
        Self::pop(&self.merge_results, ())
    }

    async fn merge_abort(&self) -> GitResult<()> {
        self.record("merge-abort");
        Ok(())
    }

    async fn merge_tree(&self, _base: &str, _local: &str, _remote: &str) -> GitResult<String> {
        self.record("merge-tree");
        Ok(self.merge_tree_output.lock().unwrap().clone())
    }

    async fn merge_base(&self, _a: &str, _b: &str) -> GitResult<Option<String>> {
        self.record("merge-base");
        Ok(self.merge_base.lock().unwrap().clone())
    }

    async fn rev_parse(&self, rev: &str) -> GitResult<Option<String>> {
        self.record(format!("rev-parse {rev}"));
        Ok(self.rev_parse.lock().unwrap().get(rev).cloned())
    }

    async fn ahead_count(&self) -> GitResult<u32> {
        self.record("rev-list");
        Ok(self.ahead.load(Ordering::SeqCst))
    }

    async fn status_porcelain(&self) -> GitResult<String> {
        self.record("status");
        Ok(self.status_output.lock().unwrap().clone())
    }

    async fn checkout_ours(&self, path: &str) -> GitResult<()> {
        self.record(format!("checkout-ours {path}"));
        Ok(())
    }

    async fn has_merge_head(&self) -> bool {
        self.merge_head.load(Ordering::SeqCst)
    }

    async fn is_file_safe(&self, path: &str) -> bool {
        !self.unsafe_paths.lock().unwrap().contains(path)
    }

    async fn gc_auto(&self) {
        self.record("gc");
    }

    async fn shallow_fetch(&self, branch: &str, token: Option<&str>) -> GitResult<()> {
        self.record(format!("shallow-fetch {branch} token={}", token.is_some()));
        Self::pop(&self.fetch_results, ())
    }

    async fn reset_hard(&self, rev: &str) -> GitResult<()> {
        self.record(format!("reset-hard {rev}"));
        Ok(())
    }

    async fn sparse_checkout_init(&self) -> GitResult<()> {
        self.record("sparse-init");
        Ok(())
    }

    async fn sparse_checkout_set(&self, folders: &[String]) -> GitResult<()> {
        self.record(format!("sparse-set {}", folders.join(",")));
        Ok(())
    }
}

// ── in-memory hosts ─────────────────────────────────────────────

/// In-memory `FileStore` recording every copy and refresh.
#[derive(Default)]
pub struct MemFileStore {
    pub files: StdMutex<HashMap<String, Vec<u8>>>,
    pub writes: StdMutex<Vec<String>>,
    pub copies: StdMutex<Vec<(String, String)>>,
    pub refreshed: StdMutex<Vec<Vec<String>>>,
    pub fail_copy_of: StdMutex<HashSet<String>>,
}

impl MemFileStore {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn insert(&self, path: &str, bytes: &[u8]) {
        self.files
            .lock()
            .unwrap()
            .insert(path.to_string(), bytes.to_vec());
    }
}

#[async_trait]
impl FileStore for MemFileStore {
    async fn read(&self, path: &str) -> SyncResult<Vec<u8>> {
        self.files
            .lock()
            .unwrap()
            .get(path)
            .cloned()
            .ok_or_else(|| SyncError::Host(format!("no such file: {path}")))
    }

    async fn write(&self, path: &str, bytes: &[u8]) -> SyncResult<()> {
        self.writes.lock().unwrap().push(path.to_string());
        self.insert(path, bytes);
        Ok(())
    }

    async fn copy(&self, from: &str, to: &str) -> SyncResult<()> {
        if self.fail_copy_of.lock().unwrap().contains(from) {
            return Err(SyncError::Host(format!("copy of {from} refused")));
        }
        let content = self.files.lock().unwrap().get(from).cloned();
        self.copies
            .lock()
            .unwrap()
            .push((from.to_string(), to.to_string()));
        self.insert(to, &content.unwrap_or_default());
        Ok(())
    }

    async fn exists(&self, path: &str) -> bool {
        self.files.lock().unwrap().contains_key(path)
    }

    async fn refresh(&self, paths: &[String]) {
        self.refreshed.lock().unwrap().push(paths.to_vec());
    }
}

/// Fixed credential.
pub struct StaticCredentials(pub Option<String>);

#[async_trait]
impl CredentialProvider for StaticCredentials {
    async fn token(&self) -> Option<String> {
        self.0.clone()
    }
}

/// Fixed author identity.
pub struct StaticAuthor;

#[async_trait]
impl AuthorProvider for StaticAuthor {
    async fn author(&self) -> SyncAuthor {
        SyncAuthor::new("Test User", "test@example.com")
    }
}

/// Scripted interactive merge surface. When accepting, writes `resolution`
/// to each presented path under the workdir so the resolver can re-read it.
pub struct ScriptedFrontend {
    pub accept: bool,
    pub resolution: Vec<u8>,
    pub presented: StdMutex<Vec<Vec<String>>>,
}

impl ScriptedFrontend {
    pub fn accepting(resolution: &[u8]) -> Arc<Self> {
        Arc::new(Self {
            accept: true,
            resolution: resolution.to_vec(),
            presented: StdMutex::new(Vec::new()),
        })
    }

    pub fn declining() -> Arc<Self> {
        Arc::new(Self {
            accept: false,
            resolution: Vec::new(),
            presented: StdMutex::new(Vec::new()),
        })
    }
}

#[async_trait]
impl MergeFrontend for ScriptedFrontend {
    async fn resolve(&self, workdir: &Path, files: &[String]) -> bool {
        self.presented.lock().unwrap().push(files.to_vec());
        if self.accept {
            for file in files {
                let path = workdir.join(file);
                if let Some(parent) = path.parent() {
                    let _ = std::fs::create_dir_all(parent);
                }
                std::fs::write(&path, &self.resolution).unwrap();
            }
        }
        self.accept
    }
}

/// Merge surface that never returns; callers are expected to be cancelled
/// while it is pending.
pub struct HangingFrontend {
    pub presented: StdMutex<Vec<Vec<String>>>,
}

impl HangingFrontend {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            presented: StdMutex::new(Vec::new()),
        })
    }
}

#[async_trait]
impl MergeFrontend for HangingFrontend {
    async fn resolve(&self, _workdir: &Path, files: &[String]) -> bool {
        self.presented.lock().unwrap().push(files.to_vec());
        std::future::pending::<bool>().await
    }
}

/// Merge surface that blocks until released, then accepts by writing
/// `resolution` to each presented path like [`ScriptedFrontend`].
pub struct GatedFrontend {
    pub gate: Notify,
    pub resolution: Vec<u8>,
    pub presented: StdMutex<Vec<Vec<String>>>,
}

impl GatedFrontend {
    pub fn new(resolution: &[u8]) -> Arc<Self> {
        Arc::new(Self {
            gate: Notify::new(),
            resolution: resolution.to_vec(),
            presented: StdMutex::new(Vec::new()),
        })
    }

    pub fn release(&self) {
        self.gate.notify_one();
    }
}

#[async_trait]
impl MergeFrontend for GatedFrontend {
    async fn resolve(&self, workdir: &Path, files: &[String]) -> bool {
        self.presented.lock().unwrap().push(files.to_vec());
        self.gate.notified().await;
        for file in files {
            let path = workdir.join(file);
            if let Some(parent) = path.parent() {
                let _ = std::fs::create_dir_all(parent);
            }
            std::fs::write(&path, &self.resolution).unwrap();
        }
        true
    }
}

/// In-memory persisted scalars.
#[derive(Default)]
pub struct MemState {
    pub last_gc: StdMutex<Option<u64>>,
    pub last_cdn_gc: StdMutex<Option<u64>>,
    pub version: StdMutex<Option<String>>,
}

impl MemState {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }
}

#[async_trait]
impl SyncStateStore for MemState {
    async fn last_gc(&self) -> Option<u64> {
        *self.last_gc.lock().unwrap()
    }

    async fn set_last_gc(&self, timestamp_ms: u64) {
        *self.last_gc.lock().unwrap() = Some(timestamp_ms);
    }

    async fn last_cdn_gc(&self) -> Option<u64> {
        *self.last_cdn_gc.lock().unwrap()
    }

    async fn set_last_cdn_gc(&self, timestamp_ms: u64) {
        *self.last_cdn_gc.lock().unwrap() = Some(timestamp_ms);
    }

    async fn local_version(&self) -> Option<String> {
        self.version.lock().unwrap().clone()
    }

    async fn set_local_version(&self, version: &str) {
        *self.version.lock().unwrap() = Some(version.to_string());
    }
}

// ── event capture ───────────────────────────────────────────────

/// Subscribes a recorder to every event on the bus.
pub fn capture(bus: &Arc<EventBus>) -> Arc<StdMutex<Vec<SyncEvent>>> {
    let captured = Arc::new(StdMutex::new(Vec::new()));
    let sink = Arc::clone(&captured);
    bus.subscribe_all(move |event| sink.lock().unwrap().push(event.clone()));
    captured
}

/// The kinds of all captured events, in emission order.
pub fn kinds(captured: &Arc<StdMutex<Vec<SyncEvent>>>) -> Vec<SyncEventKind> {
    captured.lock().unwrap().iter().map(SyncEvent::kind).collect()
}
