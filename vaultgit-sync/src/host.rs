//! Host capability traits.
//!
//! The engines' only coupling to the embedding application: file
//! read/write/copy through the host's cache-coherent paths, credential and
//! author retrieval, the interactive merge surface, and a handful of
//! persisted scalars. Everything is injected, so a synthetic harness can
//! exercise the engines without any real host.

use crate::error::SyncResult;
use async_trait::async_trait;
use std::path::Path;
use vaultgit_types::SyncAuthor;

/// File operations routed through the host.
///
/// Writes and copies must go through the host's cache-coherent path, not
/// raw filesystem calls, so any cache the host maintains stays in sync
/// with what the engine just changed on disk.
#[async_trait]
pub trait FileStore: Send + Sync {
    /// Reads a vault-relative file.
    async fn read(&self, path: &str) -> SyncResult<Vec<u8>>;

    /// Writes a vault-relative file through the host's write path.
    async fn write(&self, path: &str, bytes: &[u8]) -> SyncResult<()>;

    /// Copies a vault-relative file through the host's copy path,
    /// creating parent directories as needed.
    async fn copy(&self, from: &str, to: &str) -> SyncResult<()>;

    /// Whether the vault-relative path exists.
    async fn exists(&self, path: &str) -> bool;

    /// Tells the host the given paths changed on disk underneath it, so
    /// open views can reload.
    async fn refresh(&self, paths: &[String]);
}

/// Supplies the transient git credential, fetched fresh per network call.
/// The engine never caches the token or touches an OS credential store.
#[async_trait]
pub trait CredentialProvider: Send + Sync {
    /// The current token, or `None` for anonymous access.
    async fn token(&self) -> Option<String>;
}

/// Supplies the commit author identity.
#[async_trait]
pub trait AuthorProvider: Send + Sync {
    /// The identity for the next commit.
    async fn author(&self) -> SyncAuthor;
}

/// The external interactive resolution surface for text conflicts.
#[async_trait]
pub trait MergeFrontend: Send + Sync {
    /// Presents the conflicted paths to the user. Returns `true` once
    /// every file has been resolved on disk, `false` if resolution was
    /// abandoned.
    async fn resolve(&self, workdir: &Path, files: &[String]) -> bool;
}

/// Persisted engine scalars, stored however the host chooses.
#[async_trait]
pub trait SyncStateStore: Send + Sync {
    /// Last `gc --auto` run of the read/write engine, ms since epoch.
    async fn last_gc(&self) -> Option<u64>;
    /// Records a `gc --auto` run of the read/write engine.
    async fn set_last_gc(&self, timestamp_ms: u64);

    /// Last GC run of the read-only engine, ms since epoch.
    async fn last_cdn_gc(&self) -> Option<u64>;
    /// Records a GC run of the read-only engine.
    async fn set_last_cdn_gc(&self, timestamp_ms: u64);

    /// Last manifest version applied by a shallow resync.
    async fn local_version(&self) -> Option<String>;
    /// Records an applied manifest version.
    async fn set_local_version(&self, version: &str);
}
