//! Mock extractor for testing.

use async_trait::async_trait;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{watch, RwLock, Semaphore};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::extractor::{ExtractError, Extractor, FetchedMedia, FormatDescriptor};
use crate::messages::keys;
use crate::progress::ProgressCallback;
use crate::rate_limiter::host_of;

/// What a mocked fetch does.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum FetchBehavior {
    /// Write a small file and return it.
    #[default]
    Succeed,
    /// Write a zero-byte file and return it.
    Empty,
    /// Return a path that was never written.
    Missing,
    RateLimited,
    AuthRequired(String),
    NotFound(String),
    Failed(String),
    /// Never complete, ignoring cancellation.
    Hang,
    /// Write a partial file, then wait for [`MockExtractor::release`] or
    /// cancellation. Counts as started once the partial file exists.
    Block,
}

/// A recorded fetch call.
#[derive(Debug, Clone)]
pub struct RecordedFetch {
    pub url: String,
    pub format_id: Option<String>,
    pub dest_dir: PathBuf,
    pub at: Instant,
}

/// Mock implementation of the Extractor trait.
///
/// Provides controllable behavior for testing:
/// - Per-URL or default fetch outcome
/// - Gated fetches released one at a time
/// - Progress reports emitted during a fetch
/// - Peak concurrency tracking
///
/// # Example
///
/// ```rust,ignore
/// use zenload_core::testing::{FetchBehavior, MockExtractor};
///
/// let extractor = MockExtractor::new();
/// extractor.set_default_behavior(FetchBehavior::Block).await;
///
/// // ... submit downloads ...
///
/// extractor.wait_for_fetches(2).await;
/// extractor.release(2);
/// assert!(extractor.max_concurrent() <= 2);
/// ```
#[derive(Debug)]
pub struct MockExtractor {
    formats: Arc<RwLock<Vec<FormatDescriptor>>>,
    default_behavior: Arc<RwLock<FetchBehavior>>,
    url_behaviors: Arc<RwLock<HashMap<String, FetchBehavior>>>,
    progress_steps: Arc<RwLock<Vec<u8>>>,
    fetch_delay: Arc<RwLock<Duration>>,
    calls: Arc<RwLock<Vec<RecordedFetch>>>,
    started: watch::Sender<usize>,
    gate: Arc<Semaphore>,
    running: AtomicUsize,
    peak: AtomicUsize,
    host_running: std::sync::Mutex<HashMap<String, usize>>,
    host_peak: AtomicUsize,
}

impl Default for MockExtractor {
    fn default() -> Self {
        Self::new()
    }
}

impl MockExtractor {
    pub fn new() -> Self {
        Self {
            formats: Arc::new(RwLock::new(vec![FormatDescriptor::new("best")])),
            default_behavior: Arc::new(RwLock::new(FetchBehavior::Succeed)),
            url_behaviors: Arc::new(RwLock::new(HashMap::new())),
            progress_steps: Arc::new(RwLock::new(vec![25, 50, 100])),
            fetch_delay: Arc::new(RwLock::new(Duration::ZERO)),
            calls: Arc::new(RwLock::new(Vec::new())),
            started: watch::Sender::new(0),
            gate: Arc::new(Semaphore::new(0)),
            running: AtomicUsize::new(0),
            peak: AtomicUsize::new(0),
            host_running: std::sync::Mutex::new(HashMap::new()),
            host_peak: AtomicUsize::new(0),
        }
    }

    pub async fn set_formats(&self, formats: Vec<FormatDescriptor>) {
        *self.formats.write().await = formats;
    }

    pub async fn set_default_behavior(&self, behavior: FetchBehavior) {
        *self.default_behavior.write().await = behavior;
    }

    /// Override the behavior for one URL.
    pub async fn set_behavior(&self, url: impl Into<String>, behavior: FetchBehavior) {
        self.url_behaviors.write().await.insert(url.into(), behavior);
    }

    /// Download percentages reported before a fetch completes.
    pub async fn set_progress_steps(&self, steps: Vec<u8>) {
        *self.progress_steps.write().await = steps;
    }

    /// Simulated transfer time for successful fetches.
    pub async fn set_fetch_delay(&self, delay: Duration) {
        *self.fetch_delay.write().await = delay;
    }

    /// Let `n` blocked fetches finish.
    pub fn release(&self, n: usize) {
        self.gate.add_permits(n);
    }

    pub async fn fetch_calls(&self) -> Vec<RecordedFetch> {
        self.calls.read().await.clone()
    }

    /// Wait until at least `n` fetches have started.
    pub async fn wait_for_fetches(&self, n: usize) {
        let mut started = self.started.subscribe();
        let _ = started.wait_for(|count| *count >= n).await;
    }

    /// Fetches running right now.
    pub fn running(&self) -> usize {
        self.running.load(Ordering::SeqCst)
    }

    /// Highest number of fetches ever running at once.
    pub fn max_concurrent(&self) -> usize {
        self.peak.load(Ordering::SeqCst)
    }

    /// Highest number of fetches ever running at once against one host.
    pub fn max_concurrent_per_host(&self) -> usize {
        self.host_peak.load(Ordering::SeqCst)
    }

    fn enter(&self, host: &str) {
        let now = self.running.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);
        let mut hosts = self.host_running.lock().unwrap_or_else(|e| e.into_inner());
        let count = hosts.entry(host.to_string()).or_default();
        *count += 1;
        self.host_peak.fetch_max(*count, Ordering::SeqCst);
    }

    fn leave(&self, host: &str) {
        self.running.fetch_sub(1, Ordering::SeqCst);
        let mut hosts = self.host_running.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(count) = hosts.get_mut(host) {
            *count = count.saturating_sub(1);
        }
    }

    async fn behavior_for(&self, url: &str) -> FetchBehavior {
        match self.url_behaviors.read().await.get(url) {
            Some(behavior) => behavior.clone(),
            None => self.default_behavior.read().await.clone(),
        }
    }

    async fn run_fetch(
        &self,
        url: &str,
        dest_dir: &Path,
        progress: &ProgressCallback,
        cancel: &CancellationToken,
    ) -> Result<FetchedMedia, ExtractError> {
        let host = host_of(url).unwrap_or_default();
        let media = FetchedMedia {
            caption: format!("Downloaded from {}", host),
            path: dest_dir.join("media.mp4"),
        };

        let behavior = self.behavior_for(url).await;
        if behavior == FetchBehavior::Block {
            tokio::fs::write(dest_dir.join("media.mp4.part"), b"partial").await?;
        }
        self.started.send_modify(|count| *count += 1);

        match behavior {
            FetchBehavior::Succeed => {
                let delay = *self.fetch_delay.read().await;
                let steps = self.progress_steps.read().await.clone();
                for percent in steps {
                    progress(keys::STATUS_DOWNLOADING, percent);
                    if !delay.is_zero() {
                        tokio::select! {
                            _ = cancel.cancelled() => return Err(ExtractError::Cancelled),
                            _ = tokio::time::sleep(delay) => {}
                        }
                    }
                }
                tokio::fs::write(&media.path, b"media-bytes").await?;
                Ok(media)
            }
            FetchBehavior::Empty => {
                tokio::fs::write(&media.path, b"").await?;
                Ok(media)
            }
            FetchBehavior::Missing => Ok(media),
            FetchBehavior::RateLimited => Err(ExtractError::RateLimited { host }),
            FetchBehavior::AuthRequired(reason) => Err(ExtractError::auth_required(reason)),
            FetchBehavior::NotFound(reason) => Err(ExtractError::not_found(reason)),
            FetchBehavior::Failed(reason) => Err(ExtractError::failed(reason)),
            FetchBehavior::Hang => std::future::pending().await,
            FetchBehavior::Block => {
                progress(keys::STATUS_DOWNLOADING, 10);
                tokio::select! {
                    _ = cancel.cancelled() => Err(ExtractError::Cancelled),
                    permit = self.gate.acquire() => {
                        if let Ok(permit) = permit {
                            permit.forget();
                        }
                        tokio::fs::write(&media.path, b"media-bytes").await?;
                        Ok(media)
                    }
                }
            }
        }
    }
}

/// Decrements the running counters when a fetch ends or is dropped.
struct Running<'a> {
    extractor: &'a MockExtractor,
    host: String,
}

impl Drop for Running<'_> {
    fn drop(&mut self) {
        self.extractor.leave(&self.host);
    }
}

#[async_trait]
impl Extractor for MockExtractor {
    fn name(&self) -> &str {
        "mock"
    }

    async fn probe(&self, _url: &str) -> Result<Vec<FormatDescriptor>, ExtractError> {
        Ok(self.formats.read().await.clone())
    }

    async fn fetch(
        &self,
        url: &str,
        format_id: Option<&str>,
        dest_dir: &Path,
        progress: ProgressCallback,
        cancel: CancellationToken,
    ) -> Result<FetchedMedia, ExtractError> {
        let host = host_of(url).unwrap_or_default();
        self.enter(&host);
        let _running = Running {
            extractor: self,
            host,
        };

        self.calls.write().await.push(RecordedFetch {
            url: url.to_string(),
            format_id: format_id.map(str::to_string),
            dest_dir: dest_dir.to_path_buf(),
            at: Instant::now(),
        });
        tokio::fs::create_dir_all(dest_dir).await?;
        self.run_fetch(url, dest_dir, &progress, &cancel).await
    }
}
