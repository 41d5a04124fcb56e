//! Types for the extractor module.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// One downloadable format reported by a probe.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FormatDescriptor {
    /// Identifier passed back to `fetch` to select this format.
    pub format_id: String,
    /// Container extension (e.g. "mp4").
    pub extension: Option<String>,
    /// Human readable resolution (e.g. "1080x1920" or "audio only").
    pub resolution: Option<String>,
    /// Size in bytes, when known up front.
    pub filesize: Option<u64>,
    /// Extra description from the upstream host.
    pub note: Option<String>,
}

impl FormatDescriptor {
    /// Create a descriptor carrying only an identifier.
    pub fn new(format_id: impl Into<String>) -> Self {
        Self {
            format_id: format_id.into(),
            extension: None,
            resolution: None,
            filesize: None,
            note: None,
        }
    }
}

/// Result of a successful fetch.
#[derive(Debug, Clone)]
pub struct FetchedMedia {
    /// Caption to send along with the file.
    pub caption: String,
    /// Local path of the downloaded file.
    pub path: PathBuf,
}
