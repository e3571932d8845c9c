//! Engine configuration.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Configuration for the read/write sync engine.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncConfig {
    /// Target branch on the remote.
    pub branch: String,
    /// Sliding debounce window for auto-commits.
    #[serde(with = "duration_secs")]
    pub debounce: Duration,
    /// Interval of the periodic network cycle.
    #[serde(with = "duration_secs")]
    pub sync_interval: Duration,
    /// Upper bound for rate-limit backoff.
    #[serde(with = "duration_secs")]
    pub backoff_cap: Duration,
    /// Minimum time between `gc --auto` runs.
    #[serde(with = "duration_secs")]
    pub gc_interval: Duration,
    /// Prefix for auto-generated commit messages.
    pub commit_prefix: String,
    /// Path fragments identifying config/app-settings files that are
    /// always auto-resolved by keeping the local side.
    pub keep_local_fragments: Vec<String>,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            branch: "main".to_string(),
            debounce: Duration::from_secs(5),
            sync_interval: Duration::from_secs(60),
            backoff_cap: Duration::from_secs(30 * 60),
            gc_interval: Duration::from_secs(7 * 24 * 60 * 60),
            commit_prefix: "vault(auto):".to_string(),
            keep_local_fragments: vec![
                ".config/".to_string(),
                "settings.json".to_string(),
                "workspace.json".to_string(),
            ],
        }
    }
}

/// Configuration for the read-only CDN engine.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CdnConfig {
    /// The fixed manifest URL.
    pub manifest_url: String,
    /// Target branch for shallow resyncs.
    pub branch: String,
    /// Manifest polling interval.
    #[serde(with = "duration_secs")]
    pub poll_interval: Duration,
    /// Per-request timeout; expiry is a retryable network failure.
    #[serde(with = "duration_secs")]
    pub request_timeout: Duration,
    /// Upper bound for 429/503 backoff.
    #[serde(with = "duration_secs")]
    pub backoff_cap: Duration,
    /// Minimum time between GC runs of the read-only engine.
    #[serde(with = "duration_secs")]
    pub gc_interval: Duration,
    /// User-agent string sent with every manifest request.
    pub user_agent: String,
    /// Subscribed subfolders for sparse checkout; empty means full tree.
    pub subscribed_folders: Vec<String>,
    /// Folder that receives pre-reset copies of dirty files.
    pub recovery_dir: String,
}

impl Default for CdnConfig {
    fn default() -> Self {
        Self {
            manifest_url: String::new(),
            branch: "main".to_string(),
            poll_interval: Duration::from_secs(15 * 60),
            request_timeout: Duration::from_secs(15),
            backoff_cap: Duration::from_secs(30 * 60),
            gc_interval: Duration::from_secs(14 * 24 * 60 * 60),
            user_agent: "vaultgit-cdn-sync".to_string(),
            subscribed_folders: Vec::new(),
            recovery_dir: "_recovered".to_string(),
        }
    }
}

mod duration_secs {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_u64(d.as_secs())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        Ok(Duration::from_secs(u64::deserialize(d)?))
    }
}
