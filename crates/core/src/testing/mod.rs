//! Testing utilities and mock implementations.
//!
//! Mock collaborators for the download core, so lifecycle tests run without
//! a chat platform or a yt-dlp binary.
//!
//! # Example
//!
//! ```rust,ignore
//! use zenload_core::testing::{fixtures, MockExtractor, MockGateway};
//!
//! let extractor = MockExtractor::new();
//! let gateway = MockGateway::new();
//! let config = fixtures::download_config(dir.path());
//!
//! // Build a DownloadManager from these...
//! ```

mod mock_extractor;
mod mock_gateway;

pub use mock_extractor::{FetchBehavior, MockExtractor, RecordedFetch};
pub use mock_gateway::{MockBehavior, MockGateway, RecordedEdit, SentFile, SentText};

/// Test fixtures and helper functions.
pub mod fixtures {
    use std::path::Path;

    use crate::extractor::FormatDescriptor;
    use crate::orchestrator::DownloadConfig;

    /// A supported URL, distinct per `n`.
    pub fn tiktok_url(n: usize) -> String {
        format!("https://www.tiktok.com/@user/video/{}", n)
    }

    /// A supported URL on a second host.
    pub fn youtube_url(id: &str) -> String {
        format!("https://www.youtube.com/watch?v={}", id)
    }

    /// A format with the fields a probe usually fills in.
    pub fn format(format_id: &str, extension: &str, resolution: &str) -> FormatDescriptor {
        FormatDescriptor {
            extension: Some(extension.to_string()),
            resolution: Some(resolution.to_string()),
            ..FormatDescriptor::new(format_id)
        }
    }

    /// Download config rooted at `dir` with fast progress settings.
    pub fn download_config(dir: &Path) -> DownloadConfig {
        DownloadConfig {
            download_dir: dir.to_path_buf(),
            progress_throttle_ms: 0,
            progress_grace_ms: 50,
            gateway_timeout_secs: 5,
            ..Default::default()
        }
    }
}
