//! Tests for runner.rs — GitCli against real repositories.

use pretty_assertions::assert_eq;
use std::path::Path;
use vaultgit_git::{Git, GitCli};
use vaultgit_types::SyncAuthor;

fn git(dir: &Path, args: &[&str]) {
    let out = std::process::Command::new("git")
        .args(args)
        .current_dir(dir)
        .output()
        .unwrap();
    assert!(
        out.status.success(),
        "git {args:?} failed: {}",
        String::from_utf8_lossy(&out.stderr)
    );
}

fn author() -> SyncAuthor {
    SyncAuthor::new("Test User", "test@example.com")
}

/// A fresh working tree plus a bare remote it can push to. The remote is
/// addressed by path, exactly like the URL-addressed remotes in
/// production: no origin remote and no tracking refs exist.
fn vault_with_remote() -> (tempfile::TempDir, GitCli) {
    let root = tempfile::tempdir().unwrap();
    let remote = root.path().join("remote.git");
    let workdir = root.path().join("vault");
    std::fs::create_dir_all(&remote).unwrap();
    std::fs::create_dir_all(&workdir).unwrap();
    git(&remote, &["init", "--bare", "-b", "main"]);
    git(&workdir, &["init", "-b", "main"]);
    let cli = GitCli::new(&workdir, remote.to_string_lossy().into_owned());
    (root, cli)
}

async fn commit_file(cli: &GitCli, name: &str, content: &str) {
    std::fs::write(cli.workdir().join(name), content).unwrap();
    cli.add(name).await.unwrap();
    assert!(cli
        .commit(&format!("add {name}"), &author())
        .await
        .unwrap());
}

// ── smart-push gate input ───────────────────────────────────────

#[tokio::test]
async fn ahead_count_is_zero_after_own_push_and_fetch() {
    let (_root, cli) = vault_with_remote();
    commit_file(&cli, "notes.md", "hello").await;

    cli.push("main", None, false).await.unwrap();
    cli.fetch("main", None).await.unwrap();

    // The remote has every local commit; the next cycle must gate its
    // push off instead of pushing again.
    assert_eq!(cli.ahead_count().await.unwrap(), 0);
}

#[tokio::test]
async fn ahead_count_unblocks_the_first_push() {
    let (_root, cli) = vault_with_remote();
    commit_file(&cli, "notes.md", "hello").await;

    // Nothing fetched yet.
    assert_eq!(cli.ahead_count().await.unwrap(), 1);
}

#[tokio::test]
async fn ahead_count_tracks_new_local_commits() {
    let (_root, cli) = vault_with_remote();
    commit_file(&cli, "notes.md", "hello").await;
    cli.push("main", None, false).await.unwrap();
    cli.fetch("main", None).await.unwrap();

    commit_file(&cli, "daily.md", "entry").await;
    commit_file(&cli, "scratch.md", "idea").await;

    assert_eq!(cli.ahead_count().await.unwrap(), 2);
}

// ── commit and status ───────────────────────────────────────────

#[tokio::test]
async fn commit_with_a_clean_tree_reports_false() {
    let (_root, cli) = vault_with_remote();
    commit_file(&cli, "notes.md", "hello").await;

    assert!(!cli.commit("empty", &author()).await.unwrap());
}

#[tokio::test]
async fn status_reports_dirty_paths() {
    let (_root, cli) = vault_with_remote();
    commit_file(&cli, "notes.md", "hello").await;
    assert_eq!(cli.status_porcelain().await.unwrap(), "");

    std::fs::write(cli.workdir().join("scratch.md"), "wip").unwrap();
    let status = cli.status_porcelain().await.unwrap();
    assert!(status.contains("?? scratch.md"), "{status:?}");
}
