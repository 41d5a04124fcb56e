//! Trait definitions for the extractor module.

use async_trait::async_trait;
use std::path::Path;
use tokio_util::sync::CancellationToken;

use super::error::ExtractError;
use super::types::{FetchedMedia, FormatDescriptor};
use crate::progress::ProgressCallback;

/// Fetches media for a content URL.
///
/// Retry with backoff for throttled hosts is the implementation's concern;
/// callers only see the final classified result.
#[async_trait]
pub trait Extractor: Send + Sync {
    /// Returns the name of this extractor implementation.
    fn name(&self) -> &str;

    /// Lists the formats available for `url`.
    async fn probe(&self, url: &str) -> Result<Vec<FormatDescriptor>, ExtractError>;

    /// Downloads `url` into `dest_dir`.
    ///
    /// `progress` may be invoked zero or more times, from any thread, with a
    /// status key and a percentage. Implementations should stop early and
    /// return `ExtractError::Cancelled` once `cancel` fires.
    async fn fetch(
        &self,
        url: &str,
        format_id: Option<&str>,
        dest_dir: &Path,
        progress: ProgressCallback,
        cancel: CancellationToken,
    ) -> Result<FetchedMedia, ExtractError>;
}
