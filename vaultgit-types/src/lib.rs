//! Core type definitions for the VaultGit sync engine.
//!
//! This crate defines the fundamental, host-agnostic types shared by the
//! engine crates:
//! - Commit author identity
//! - Conflict classification results
//! - The typed sync event stream
//! - The CDN release manifest
//!
//! Anything host-specific (view models, settings forms, UI state) belongs
//! to the embedding application, not here.

mod author;
mod conflict;
mod event;
mod manifest;

pub use author::SyncAuthor;
pub use conflict::{ConflictDetectionResult, ConflictFile, ConflictKind};
pub use event::{SyncEvent, SyncEventKind};
pub use manifest::Manifest;
