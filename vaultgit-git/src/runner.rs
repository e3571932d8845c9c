//! The `Git` trait and its CLI-backed implementation.

use crate::error::{classify_git_failure, GitError, GitErrorKind, GitResult};
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::process::Output;
use tokio::process::Command;
use tracing::{debug, warn};
use url::Url;
use vaultgit_types::SyncAuthor;

/// Files larger than this are never auto-committed (50 MiB).
pub const MAX_AUTO_COMMIT_BYTES: u64 = 50 * 1024 * 1024;

/// Executes version-control operations against one fixed working directory.
///
/// All mutating operations must be invoked while holding the repository
/// lock; the trait itself does not enforce this.
#[async_trait]
pub trait Git: Send + Sync {
    /// The working directory this runner operates on.
    fn workdir(&self) -> &Path;

    /// Stages exactly one path (forward-slash form, vault-relative).
    async fn add(&self, path: &str) -> GitResult<()>;

    /// Creates a commit with the given message and author identity.
    ///
    /// Returns `Ok(false)` when there was nothing to commit; that outcome
    /// is not an error. The author becomes both author and committer via
    /// process-local environment, never the global config.
    async fn commit(&self, message: &str, author: &SyncAuthor) -> GitResult<bool>;

    /// Fetches the given branch from the remote. A fresh token, when
    /// present, is spliced into the remote URL for this call only.
    async fn fetch(&self, branch: &str, token: Option<&str>) -> GitResult<()>;

    /// Pushes HEAD to the given remote branch.
    async fn push(&self, branch: &str, token: Option<&str>, force: bool) -> GitResult<()>;

    /// Merges the given revision into HEAD (a real merge, not a dry run).
    async fn merge(&self, rev: &str) -> GitResult<()>;

    /// Aborts an in-progress merge, returning the tree to a clean state.
    async fn merge_abort(&self) -> GitResult<()>;

    /// Three-way dry-run tree merge. Returns whatever output was produced
    /// even on a nonzero exit: the exit status of `merge-tree` is not a
    /// reliable conflict signal.
    async fn merge_tree(&self, base: &str, local: &str, remote: &str) -> GitResult<String>;

    /// Merge base of two revisions, or `None` for unrelated histories.
    async fn merge_base(&self, a: &str, b: &str) -> GitResult<Option<String>>;

    /// Resolves a revision to an object id, or `None` if it doesn't exist.
    async fn rev_parse(&self, rev: &str) -> GitResult<Option<String>>;

    /// Number of local-only commits relative to the last fetched remote
    /// head (`FETCH_HEAD`).
    ///
    /// Returns 1 when nothing has been fetched yet, so a first push is
    /// never gated off.
    async fn ahead_count(&self) -> GitResult<u32>;

    /// Raw `status --porcelain` output; empty when the tree is clean.
    async fn status_porcelain(&self) -> GitResult<String>;

    /// Checks out the local ("ours") version of a conflicted path.
    async fn checkout_ours(&self, path: &str) -> GitResult<()>;

    /// Whether an interrupted-merge marker is present (crash recovery).
    async fn has_merge_head(&self) -> bool;

    /// Whether the file exists and is within the auto-commit size gate.
    async fn is_file_safe(&self, path: &str) -> bool;

    /// Opportunistic garbage collection. Callers must never await the
    /// outcome on any latency-sensitive path; spawn and forget.
    async fn gc_auto(&self);

    /// Depth-1 fetch of the given branch.
    async fn shallow_fetch(&self, branch: &str, token: Option<&str>) -> GitResult<()>;

    /// Hard-resets the working tree to the given revision.
    async fn reset_hard(&self, rev: &str) -> GitResult<()>;

    /// Initializes cone-mode sparse checkout.
    async fn sparse_checkout_init(&self) -> GitResult<()>;

    /// Replaces the sparse checkout folder list.
    async fn sparse_checkout_set(&self, folders: &[String]) -> GitResult<()>;
}

/// `Git` implementation that shells out to the external `git` binary.
pub struct GitCli {
    workdir: PathBuf,
    remote_url: String,
}

impl GitCli {
    /// Creates a runner for one working directory and remote.
    pub fn new(workdir: impl Into<PathBuf>, remote_url: impl Into<String>) -> Self {
        Self {
            workdir: workdir.into(),
            remote_url: remote_url.into(),
        }
    }

    /// Runs a git subcommand, classifying a nonzero exit into a typed error.
    async fn run(&self, args: &[&str]) -> GitResult<Output> {
        self.run_with_env(args, &[]).await
    }

    async fn run_with_env(&self, args: &[&str], env: &[(&str, &str)]) -> GitResult<Output> {
        debug!(args = ?args.first(), "running git");
        let mut cmd = Command::new("git");
        cmd.args(args).current_dir(&self.workdir);
        for (k, v) in env {
            cmd.env(k, v);
        }
        let output = cmd.output().await?;

        if output.status.success() {
            Ok(output)
        } else {
            Err(command_error(args, &output))
        }
    }

    /// The remote URL with the transient token spliced into the userinfo
    /// component. The result is passed as an explicit argument and never
    /// written to git config or disk.
    fn auth_url(&self, token: Option<&str>) -> GitResult<String> {
        let Some(token) = token else {
            return Ok(self.remote_url.clone());
        };
        let mut url = Url::parse(&self.remote_url)?;
        if url.set_username(token).is_err() {
            warn!("remote url does not accept userinfo; using it unmodified");
            return Ok(self.remote_url.clone());
        }
        Ok(url.into())
    }
}

fn combined_output(output: &Output) -> String {
    let mut s = String::from_utf8_lossy(&output.stdout).into_owned();
    s.push_str(&String::from_utf8_lossy(&output.stderr));
    s
}

fn command_error(args: &[&str], output: &Output) -> GitError {
    let message = combined_output(output);
    GitError::Command {
        command: args.first().unwrap_or(&"git").to_string(),
        kind: classify_git_failure(&message),
        message,
    }
}

#[async_trait]
impl Git for GitCli {
    fn workdir(&self) -> &Path {
        &self.workdir
    }

    async fn add(&self, path: &str) -> GitResult<()> {
        self.run(&["add", "--", path]).await?;
        Ok(())
    }

    async fn commit(&self, message: &str, author: &SyncAuthor) -> GitResult<bool> {
        let env = [
            ("GIT_AUTHOR_NAME", author.name.as_str()),
            ("GIT_AUTHOR_EMAIL", author.email.as_str()),
            ("GIT_COMMITTER_NAME", author.name.as_str()),
            ("GIT_COMMITTER_EMAIL", author.email.as_str()),
        ];
        match self.run_with_env(&["commit", "-m", message], &env).await {
            Ok(_) => Ok(true),
            Err(e) if e.kind() == GitErrorKind::NothingToCommit => Ok(false),
            Err(e) => Err(e),
        }
    }

    async fn fetch(&self, branch: &str, token: Option<&str>) -> GitResult<()> {
        let url = self.auth_url(token)?;
        self.run(&["fetch", &url, branch]).await?;
        Ok(())
    }

    async fn push(&self, branch: &str, token: Option<&str>, force: bool) -> GitResult<()> {
        let url = self.auth_url(token)?;
        let refspec = format!("HEAD:refs/heads/{branch}");
        let mut args = vec!["push", &url, &refspec];
        if force {
            args.push("--force");
        }
        self.run(&args).await?;
        Ok(())
    }

    async fn merge(&self, rev: &str) -> GitResult<()> {
        self.run(&["merge", "--no-edit", rev]).await?;
        Ok(())
    }

    async fn merge_abort(&self) -> GitResult<()> {
        self.run(&["merge", "--abort"]).await?;
        Ok(())
    }

    async fn merge_tree(&self, base: &str, local: &str, remote: &str) -> GitResult<String> {
        // merge-tree is known to exit nonzero on some clean merges; return
        // whatever it printed and let the caller scan for conflict markers.
        let mut cmd = Command::new("git");
        cmd.args(["merge-tree", base, local, remote])
            .current_dir(&self.workdir);
        let output = cmd.output().await?;
        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }

    async fn merge_base(&self, a: &str, b: &str) -> GitResult<Option<String>> {
        match self.run(&["merge-base", a, b]).await {
            Ok(out) => Ok(Some(
                String::from_utf8_lossy(&out.stdout).trim().to_string(),
            )),
            // Unrelated histories: merge-base exits 1 with no output.
            Err(GitError::Command { .. }) => Ok(None),
            Err(e) => Err(e),
        }
    }

    async fn rev_parse(&self, rev: &str) -> GitResult<Option<String>> {
        match self.run(&["rev-parse", "--verify", "--quiet", rev]).await {
            Ok(out) => Ok(Some(
                String::from_utf8_lossy(&out.stdout).trim().to_string(),
            )),
            Err(GitError::Command { .. }) => Ok(None),
            Err(e) => Err(e),
        }
    }

    async fn ahead_count(&self) -> GitResult<u32> {
        // Fetch and push address the remote by URL, so no origin/*
        // tracking ref is ever updated; FETCH_HEAD is the only remote
        // head this runner maintains.
        match self.run(&["rev-list", "--count", "FETCH_HEAD..HEAD"]).await {
            Ok(out) => {
                let text = String::from_utf8_lossy(&out.stdout);
                Ok(text.trim().parse().unwrap_or(0))
            }
            // Nothing fetched yet: treat as ahead to unblock first push.
            Err(GitError::Command { .. }) => Ok(1),
            Err(e) => Err(e),
        }
    }

    async fn status_porcelain(&self) -> GitResult<String> {
        let out = self.run(&["status", "--porcelain"]).await?;
        Ok(String::from_utf8_lossy(&out.stdout).into_owned())
    }

    async fn checkout_ours(&self, path: &str) -> GitResult<()> {
        self.run(&["checkout", "--ours", "--", path]).await?;
        Ok(())
    }

    async fn has_merge_head(&self) -> bool {
        tokio::fs::try_exists(self.workdir.join(".git").join("MERGE_HEAD"))
            .await
            .unwrap_or(false)
    }

    async fn is_file_safe(&self, path: &str) -> bool {
        match tokio::fs::metadata(self.workdir.join(path)).await {
            Ok(meta) => meta.is_file() && meta.len() <= MAX_AUTO_COMMIT_BYTES,
            Err(_) => false,
        }
    }

    async fn gc_auto(&self) {
        if let Err(e) = self.run(&["gc", "--auto", "--quiet"]).await {
            debug!("gc --auto failed: {e}");
        }
    }

    async fn shallow_fetch(&self, branch: &str, token: Option<&str>) -> GitResult<()> {
        let url = self.auth_url(token)?;
        self.run(&["fetch", "--depth", "1", &url, branch]).await?;
        Ok(())
    }

    async fn reset_hard(&self, rev: &str) -> GitResult<()> {
        self.run(&["reset", "--hard", rev]).await?;
        Ok(())
    }

    async fn sparse_checkout_init(&self) -> GitResult<()> {
        self.run(&["sparse-checkout", "init", "--cone"]).await?;
        Ok(())
    }

    async fn sparse_checkout_set(&self, folders: &[String]) -> GitResult<()> {
        let mut args = vec!["sparse-checkout".to_string(), "set".to_string()];
        args.extend(folders.iter().cloned());
        let arg_refs: Vec<&str> = args.iter().map(String::as_str).collect();
        self.run(&arg_refs).await?;
        Ok(())
    }
}
