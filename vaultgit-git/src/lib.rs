//! Git process runner for VaultGit.
//!
//! The one component that touches the actual repository. Exposes a
//! trait-based interface (`Git`) so the engines can be exercised against a
//! scripted double, and a `GitCli` implementation that shells out to the
//! external `git` binary against one fixed working directory.
//!
//! Failure classification is a single pure function
//! (`classify_git_failure`) over combined stdout+stderr, so the phrase
//! heuristics can be swapped for a structured classifier without touching
//! callers.

mod error;
mod runner;

pub use error::{classify_git_failure, GitError, GitErrorKind, GitResult};
pub use runner::{Git, GitCli, MAX_AUTO_COMMIT_BYTES};
