//! Configuration for the extractor module.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Configuration for the yt-dlp extractor.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExtractorConfig {
    /// Path to the yt-dlp binary.
    #[serde(default = "default_binary")]
    pub binary: PathBuf,

    /// Directory holding per-platform cookie files (`<platform>.txt`).
    #[serde(default)]
    pub cookies_dir: Option<PathBuf>,

    /// Attempts made when the upstream host signals rate limiting.
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    /// Delay before the first retry; doubled on every further attempt.
    #[serde(default = "default_retry_delay")]
    pub retry_base_delay_secs: u64,

    /// Socket timeout passed to yt-dlp.
    #[serde(default = "default_socket_timeout")]
    pub socket_timeout_secs: u64,

    /// Upper bound for a format probe.
    #[serde(default = "default_probe_timeout")]
    pub probe_timeout_secs: u64,
}

fn default_binary() -> PathBuf {
    PathBuf::from("yt-dlp")
}

fn default_max_attempts() -> u32 {
    3
}

fn default_retry_delay() -> u64 {
    5
}

fn default_socket_timeout() -> u64 {
    30
}

fn default_probe_timeout() -> u64 {
    60
}

impl Default for ExtractorConfig {
    fn default() -> Self {
        Self {
            binary: default_binary(),
            cookies_dir: None,
            max_attempts: default_max_attempts(),
            retry_base_delay_secs: default_retry_delay(),
            socket_timeout_secs: default_socket_timeout(),
            probe_timeout_secs: default_probe_timeout(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = ExtractorConfig::default();
        assert_eq!(config.binary, PathBuf::from("yt-dlp"));
        assert_eq!(config.max_attempts, 3);
        assert_eq!(config.retry_base_delay_secs, 5);
        assert!(config.cookies_dir.is_none());
    }

    #[test]
    fn test_deserialize_partial() {
        let toml = r#"
            binary = "/opt/bin/yt-dlp"
            cookies_dir = "/etc/zenload/cookies"
        "#;
        let config: ExtractorConfig = toml::from_str(toml).unwrap();
        assert_eq!(config.binary, PathBuf::from("/opt/bin/yt-dlp"));
        assert_eq!(
            config.cookies_dir,
            Some(PathBuf::from("/etc/zenload/cookies"))
        );
        assert_eq!(config.probe_timeout_secs, 60);
    }
}
