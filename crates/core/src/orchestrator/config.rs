//! Download orchestration configuration.

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::progress::PumpConfig;

/// Configuration for the download manager.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DownloadConfig {
    /// Downloads running at once across all users.
    #[serde(default = "default_max_concurrent")]
    pub max_concurrent_downloads: usize,

    /// Queued plus running downloads allowed per user.
    /// Submissions beyond this are rejected, not queued.
    #[serde(default = "default_max_per_user")]
    pub max_downloads_per_user: usize,

    /// Global bound on waiting downloads.
    #[serde(default = "default_max_queued")]
    pub max_queued_downloads: usize,

    /// Concurrent extractor calls per upstream host.
    #[serde(default = "default_per_host_limit")]
    pub per_host_limit: usize,

    /// Minimum spacing between two status edits of one task (milliseconds).
    #[serde(default = "default_progress_throttle")]
    pub progress_throttle_ms: u64,

    /// Progress events buffered per task before new ones are dropped.
    #[serde(default = "default_progress_buffer")]
    pub progress_buffer: usize,

    /// Time a task's progress pump gets to drain when stopped (milliseconds).
    #[serde(default = "default_progress_grace")]
    pub progress_grace_ms: u64,

    /// Upper bound for every gateway call made by a worker (seconds).
    #[serde(default = "default_gateway_timeout")]
    pub gateway_timeout_secs: u64,

    /// Upper bound for draining workers on shutdown (seconds).
    #[serde(default = "default_shutdown_timeout")]
    pub shutdown_timeout_secs: u64,

    /// Root of the per-task scratch directories.
    #[serde(default = "default_download_dir")]
    pub download_dir: PathBuf,
}

fn default_max_concurrent() -> usize {
    4
}

fn default_max_per_user() -> usize {
    2
}

fn default_max_queued() -> usize {
    100
}

fn default_per_host_limit() -> usize {
    crate::rate_limiter::DEFAULT_PER_HOST_LIMIT
}

fn default_progress_throttle() -> u64 {
    500
}

fn default_progress_buffer() -> usize {
    64
}

fn default_progress_grace() -> u64 {
    1000
}

fn default_gateway_timeout() -> u64 {
    60
}

fn default_shutdown_timeout() -> u64 {
    30
}

fn default_download_dir() -> PathBuf {
    std::env::temp_dir().join("zenload-downloads")
}

impl Default for DownloadConfig {
    fn default() -> Self {
        Self {
            max_concurrent_downloads: default_max_concurrent(),
            max_downloads_per_user: default_max_per_user(),
            max_queued_downloads: default_max_queued(),
            per_host_limit: default_per_host_limit(),
            progress_throttle_ms: default_progress_throttle(),
            progress_buffer: default_progress_buffer(),
            progress_grace_ms: default_progress_grace(),
            gateway_timeout_secs: default_gateway_timeout(),
            shutdown_timeout_secs: default_shutdown_timeout(),
            download_dir: default_download_dir(),
        }
    }
}

impl DownloadConfig {
    pub fn gateway_timeout(&self) -> Duration {
        Duration::from_secs(self.gateway_timeout_secs)
    }

    pub fn shutdown_timeout(&self) -> Duration {
        Duration::from_secs(self.shutdown_timeout_secs)
    }

    pub fn pump_config(&self) -> PumpConfig {
        PumpConfig {
            throttle: Duration::from_millis(self.progress_throttle_ms),
            buffer: self.progress_buffer,
            grace: Duration::from_millis(self.progress_grace_ms),
            edit_timeout: self.gateway_timeout(),
        }
    }
}
