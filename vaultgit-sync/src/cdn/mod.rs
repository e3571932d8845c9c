//! Read-only CDN-distributed sync engine.
//!
//! The counterpart to the read/write engine for vaults consumed from a
//! CDN-fronted repository: polls a versioned manifest over HTTP with ETag
//! caching, compares semantic versions with downgrade protection, and
//! performs a destructive shallow-fetch plus hard-reset resync that never
//! silently discards local edits.

mod orchestrator;
mod poller;
mod shallow;
mod version;

pub use orchestrator::PublicSyncOrchestrator;
pub use poller::{ManifestPoller, UpdateHandler};
pub use shallow::ShallowSyncExecutor;
pub use version::{compare_versions, VersionController, VersionDecision};
