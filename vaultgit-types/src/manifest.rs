//! The CDN release manifest.

use serde::{Deserialize, Serialize};

/// The versioned manifest document polled from the CDN in read-only mode.
///
/// Unknown fields are ignored so the manifest format can grow without
/// breaking older pollers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Manifest {
    /// Semantic version of the published vault snapshot, e.g. `"1.4.0"`.
    pub version: String,
    /// Publish timestamp, milliseconds since the Unix epoch.
    #[serde(default)]
    pub timestamp: u64,
}

impl Manifest {
    /// Creates a manifest.
    pub fn new(version: impl Into<String>, timestamp: u64) -> Self {
        Self {
            version: version.into(),
            timestamp,
        }
    }
}
