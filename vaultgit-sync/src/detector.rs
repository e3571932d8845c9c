//! Stateless conflict detection over a fetched-but-unmerged tree.
//!
//! Runs a dry-run three-way tree merge and classifies the outcome without
//! mutating any working state. The dry-run tool's exit code is not a
//! reliable conflict signal on some configurations (it can report failure
//! on a clean merge, a "ghost conflict"), so conflict presence is keyed
//! solely on the in-content conflict marker.

use crate::error::SyncResult;
use std::collections::HashSet;
use std::sync::Arc;
use tracing::debug;
use vaultgit_git::Git;
use vaultgit_types::{ConflictDetectionResult, ConflictFile, ConflictKind};

/// In-content marker that signals a genuine text conflict.
const CONFLICT_MARKER: &str = "<<<<<<<";

/// File extensions classified as binary for conflict resolution.
const BINARY_EXTENSIONS: &[&str] = &[
    // images
    "png", "jpg", "jpeg", "gif", "bmp", "tiff", "webp", "ico", "heic",
    // audio / video
    "mp3", "wav", "ogg", "flac", "m4a", "mp4", "mov", "avi", "mkv", "webm",
    // archives
    "zip", "tar", "gz", "7z", "rar",
    // fonts
    "ttf", "otf", "woff", "woff2",
    // executables / libraries
    "exe", "dll", "so", "dylib", "bin",
    // office documents
    "pdf", "doc", "docx", "xls", "xlsx", "ppt", "pptx",
];

/// Stateless dry-run conflict analysis.
pub struct ConflictDetector {
    git: Arc<dyn Git>,
}

impl ConflictDetector {
    /// Creates a detector over the given runner.
    pub fn new(git: Arc<dyn Git>) -> Self {
        Self { git }
    }

    /// Classifies the relationship between local head and the last
    /// fetched head. Read-only; callers may invoke it without the repo
    /// lock.
    pub async fn detect(&self) -> SyncResult<ConflictDetectionResult> {
        let Some(fetched) = self.git.rev_parse("FETCH_HEAD").await? else {
            // Nothing was fetched; nothing to merge.
            return Ok(ConflictDetectionResult::clean(true));
        };
        let Some(local) = self.git.rev_parse("HEAD").await? else {
            // Unborn local branch with a fetched head: an explicit merge
            // step is required.
            return Ok(ConflictDetectionResult::clean(false));
        };

        if fetched == local {
            return Ok(ConflictDetectionResult::clean(true));
        }

        let Some(base) = self.git.merge_base("HEAD", "FETCH_HEAD").await? else {
            // Unrelated histories: report no conflicts but force the
            // caller down the explicit-merge path rather than silently
            // skipping the sync.
            debug!("merge-base failed; unrelated histories");
            return Ok(ConflictDetectionResult::clean(false));
        };

        if base == fetched {
            // Local is strictly ahead; nothing to merge before push.
            return Ok(ConflictDetectionResult::clean(true));
        }
        if base == local {
            // Remote is strictly ahead; fast-forward only.
            return Ok(ConflictDetectionResult::clean(false));
        }

        let output = self.git.merge_tree(&base, &local, &fetched).await?;
        let files = parse_merge_tree(&output);
        if files.is_empty() {
            // Diverged but cleanly mergeable.
            return Ok(ConflictDetectionResult::clean(false));
        }
        Ok(ConflictDetectionResult::conflicts(files))
    }
}

/// Parses dry-run tree-merge output into classified conflict files.
///
/// Best-effort heuristic over an external tool's text format: section
/// headers name the conflict class, and the following entry lines carry
/// the path. Only invoked when the output contains the conflict marker.
pub fn parse_merge_tree(output: &str) -> Vec<ConflictFile> {
    if !output.contains(CONFLICT_MARKER) {
        return Vec::new();
    }

    let lines: Vec<&str> = output.lines().collect();
    let mut seen: HashSet<String> = HashSet::new();
    let mut files = Vec::new();
    let mut push = |path: String, kind: ConflictKind, files: &mut Vec<ConflictFile>| {
        if seen.insert(path.clone()) {
            files.push(ConflictFile::new(path, kind));
        }
    };

    for (i, line) in lines.iter().enumerate() {
        let header = line.trim();
        let kind = if header.starts_with("changed in both") || header.starts_with("added in both")
        {
            None // classified per-extension below
        } else if header.starts_with("removed in local")
            || header.starts_with("removed in remote")
            || header.starts_with("deleted by us")
            || header.starts_with("deleted by them")
        {
            Some(ConflictKind::DeleteModify)
        } else if header.starts_with("renamed in") {
            Some(ConflictKind::RenameModify)
        } else {
            continue;
        };

        // Entry lines follow within a small window after the header.
        for entry in lines.iter().skip(i + 1).take(3) {
            let Some(path) = entry_path(entry) else {
                break;
            };
            let kind = kind.unwrap_or_else(|| {
                if is_binary_path(&path) {
                    ConflictKind::Binary
                } else {
                    ConflictKind::Text
                }
            });
            push(path, kind, &mut files);
        }
    }

    files
}

/// Extracts the path from an entry line of the form
/// `  <base|our|their> <mode> <oid> <path>`.
fn entry_path(line: &str) -> Option<String> {
    let mut rest = line.trim_start();
    let label = take_word(&mut rest)?;
    if !matches!(label, "base" | "our" | "their") {
        return None;
    }
    let mode = take_word(&mut rest)?;
    if mode.is_empty() || !mode.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    let oid = take_word(&mut rest)?;
    if oid.len() < 7 || !oid.bytes().all(|b| b.is_ascii_hexdigit()) {
        return None;
    }
    let path = rest.trim();
    if path.is_empty() {
        None
    } else {
        Some(path.to_string())
    }
}

fn take_word<'a>(rest: &mut &'a str) -> Option<&'a str> {
    let trimmed = rest.trim_start();
    if trimmed.is_empty() {
        return None;
    }
    let end = trimmed.find(char::is_whitespace).unwrap_or(trimmed.len());
    let (word, remainder) = trimmed.split_at(end);
    *rest = remainder;
    Some(word)
}

/// Whether the path's extension belongs to the fixed binary set.
pub fn is_binary_path(path: &str) -> bool {
    path.rsplit('.')
        .next()
        .map(|ext| {
            let ext = ext.to_ascii_lowercase();
            BINARY_EXTENSIONS.contains(&ext.as_str())
        })
        .unwrap_or(false)
}
