//! Local git synchronization engine for vaults.
//!
//! Two engines over one embedded `git` binary:
//! - a **read/write engine** for personal vaults: debounced auto-commits,
//!   a periodic fetch/merge/push cycle, pre-merge conflict detection, and
//!   partially automated conflict resolution
//! - a **read-only engine** for CDN-published vaults: manifest polling
//!   with ETag caching, semantic-version gating with downgrade
//!   protection, and destructive shallow resyncs that recover dirty
//!   files first
//!
//! # Architecture
//!
//! Every write path to one working tree funnels through one [`RepoLock`],
//! a FIFO async mutex, because concurrent git invocations against one
//! tree corrupt it. Host integration is trait-shaped ([`FileStore`],
//! [`CredentialProvider`], [`MergeFrontend`], ...) so the engines run
//! against a synthetic harness in tests.
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use vaultgit_git::GitCli;
//! use vaultgit_sync::{SyncConfig, SyncOrchestrator};
//! # use vaultgit_sync::{AuthorProvider, CredentialProvider, FileStore, MergeFrontend, SyncStateStore};
//! # fn host() -> (Arc<dyn FileStore>, Arc<dyn MergeFrontend>, Arc<dyn CredentialProvider>, Arc<dyn AuthorProvider>, Arc<dyn SyncStateStore>) { unimplemented!() }
//!
//! # async fn run() -> vaultgit_sync::SyncResult<()> {
//! let git = Arc::new(GitCli::new("/vault", "https://example.com/vault.git"));
//! let (files, frontend, credentials, author, state) = host();
//! let engine = SyncOrchestrator::new(
//!     git, files, frontend, credentials, author, state,
//!     SyncConfig::default(),
//! );
//! engine.start().await?;
//! engine.notify_edit("notes/daily.md");
//! # Ok(())
//! # }
//! ```

mod autocommit;
mod bus;
pub mod cdn;
mod config;
mod detector;
mod error;
mod host;
mod lock;
mod orchestrator;
mod queue;
mod resolver;

pub use autocommit::AutoCommitEngine;
pub use bus::{EventBus, SubscriptionId};
pub use cdn::PublicSyncOrchestrator;
pub use config::{CdnConfig, SyncConfig};
pub use detector::ConflictDetector;
pub use error::{SyncError, SyncResult};
pub use host::{AuthorProvider, CredentialProvider, FileStore, MergeFrontend, SyncStateStore};
pub use lock::{RepoLock, RepoLockGuard};
pub use orchestrator::SyncOrchestrator;
pub use queue::NetworkSyncQueue;
pub use resolver::MergeResolver;
