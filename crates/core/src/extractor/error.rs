//! Error types for the extractor module.

use std::path::PathBuf;
use thiserror::Error;

/// Errors that can occur while probing or fetching media.
#[derive(Debug, Error)]
pub enum ExtractError {
    /// Upstream host signaled throttling.
    #[error("Rate limited by {host}")]
    RateLimited { host: String },

    /// Content is private or needs a logged-in session.
    #[error("Authentication required: {reason}")]
    AuthRequired { reason: String },

    /// Content does not exist or was removed.
    #[error("Content not found: {reason}")]
    NotFound { reason: String },

    /// No extractor handles this URL.
    #[error("Unsupported URL: {url}")]
    UnsupportedUrl { url: String },

    /// The yt-dlp binary could not be started.
    #[error("Extractor binary not found at path: {path}")]
    BinaryNotFound { path: PathBuf },

    /// The extractor did not finish in time.
    #[error("Extraction timed out after {timeout_secs} seconds")]
    Timeout { timeout_secs: u64 },

    /// Any other extraction failure.
    #[error("Extraction failed: {reason}")]
    Failed { reason: String },

    /// I/O error while running the extractor.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The caller cancelled the operation.
    #[error("Extraction cancelled")]
    Cancelled,
}

impl ExtractError {
    pub fn auth_required(reason: impl Into<String>) -> Self {
        Self::AuthRequired {
            reason: reason.into(),
        }
    }

    pub fn not_found(reason: impl Into<String>) -> Self {
        Self::NotFound {
            reason: reason.into(),
        }
    }

    pub fn failed(reason: impl Into<String>) -> Self {
        Self::Failed {
            reason: reason.into(),
        }
    }

    /// Whether the extractor's own backoff should try again.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::RateLimited { .. })
    }

    /// Classify yt-dlp error output.
    pub fn from_stderr(host: &str, stderr: &str) -> Self {
        let lower = stderr.to_lowercase();
        let reason = last_error_line(stderr);

        if lower.contains("http error 429")
            || lower.contains("too many requests")
            || lower.contains("rate-limit")
            || lower.contains("rate limit")
        {
            Self::RateLimited {
                host: host.to_string(),
            }
        } else if lower.contains("private video")
            || lower.contains("private profile")
            || lower.contains("login required")
            || lower.contains("sign in")
            || lower.contains("cookies")
        {
            Self::auth_required(reason)
        } else if lower.contains("http error 404")
            || lower.contains("not available")
            || lower.contains("does not exist")
            || lower.contains("has been removed")
        {
            Self::not_found(reason)
        } else if lower.contains("unsupported url") {
            Self::UnsupportedUrl { url: reason }
        } else {
            Self::failed(reason)
        }
    }
}

/// The most relevant line of yt-dlp output: the last `ERROR:` line, or the
/// last non-empty line.
fn last_error_line(stderr: &str) -> String {
    let lines: Vec<&str> = stderr
        .lines()
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .collect();
    lines
        .iter()
        .rev()
        .find(|l| l.starts_with("ERROR:"))
        .or_else(|| lines.last())
        .map(|l| l.trim_start_matches("ERROR:").trim().to_string())
        .unwrap_or_else(|| "unknown error".to_string())
}
