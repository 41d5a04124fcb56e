//! Types for the download orchestrator.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::watch;
use uuid::Uuid;

use crate::extractor::ExtractError;
use crate::gateway::{ChatId, GatewayError};
use crate::messages::{escape_html, keys, Localizer};
use crate::rate_limiter::HostLimitStatus;

/// Identifier of one download task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TaskId(Uuid);

impl TaskId {
    pub fn new() -> Self {
        TaskId(Uuid::new_v4())
    }
}

impl Default for TaskId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl FromStr for TaskId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(s).map(TaskId)
    }
}

/// A user's request to download one URL. Immutable once created.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DownloadRequest {
    pub user_id: i64,
    /// Where status messages and the result are delivered.
    pub chat_id: ChatId,
    pub url: String,
    pub format_id: Option<String>,
    pub submitted_at: DateTime<Utc>,
}

impl DownloadRequest {
    /// Request delivered to the user's private chat.
    pub fn new(user_id: i64, url: impl Into<String>) -> Self {
        Self {
            user_id,
            chat_id: ChatId(user_id),
            url: url.into(),
            format_id: None,
            submitted_at: Utc::now(),
        }
    }

    pub fn in_chat(mut self, chat_id: ChatId) -> Self {
        self.chat_id = chat_id;
        self
    }

    pub fn with_format(mut self, format_id: impl Into<String>) -> Self {
        self.format_id = Some(format_id.into());
        self
    }
}

/// Classified failure of a download task.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum DownloadError {
    #[error("rate limited by {host}")]
    RateLimited { host: String },

    #[error("authentication required: {reason}")]
    AuthRequired { reason: String },

    #[error("not found: {reason}")]
    NotFound { reason: String },

    #[error("corrupted download: {reason}")]
    Corrupted { reason: String },

    #[error("delivery failed: {reason}")]
    GatewayTransient { reason: String },

    #[error("{reason}")]
    Unclassified { reason: String },

    #[error("cancelled")]
    Cancelled,
}

impl DownloadError {
    /// Message key of the user-visible notice for this error.
    pub fn message_key(&self) -> &'static str {
        match self {
            DownloadError::RateLimited { .. } => keys::RATE_LIMITED,
            DownloadError::AuthRequired { .. } => keys::AUTH_REQUIRED,
            DownloadError::NotFound { .. } | DownloadError::Corrupted { .. } => {
                keys::DOWNLOAD_FAILED
            }
            DownloadError::GatewayTransient { .. } | DownloadError::Unclassified { .. } => {
                keys::ERROR_OCCURRED
            }
            DownloadError::Cancelled => keys::CANCELLED,
        }
    }

    /// Label used in metrics.
    pub fn kind(&self) -> &'static str {
        match self {
            DownloadError::RateLimited { .. } => "rate_limited",
            DownloadError::AuthRequired { .. } => "auth_required",
            DownloadError::NotFound { .. } => "not_found",
            DownloadError::Corrupted { .. } => "corrupted",
            DownloadError::GatewayTransient { .. } => "gateway_transient",
            DownloadError::Unclassified { .. } => "unclassified",
            DownloadError::Cancelled => "cancelled",
        }
    }

    /// Localized notice sent to the user.
    pub fn user_message(&self, localizer: &Localizer) -> String {
        let detail = match self {
            DownloadError::AuthRequired { reason }
            | DownloadError::NotFound { reason }
            | DownloadError::Corrupted { reason } => reason.as_str(),
            _ => "",
        };
        let detail = escape_html(detail);
        localizer.format(self.message_key(), &[("error", detail.as_str())])
    }
}

impl From<ExtractError> for DownloadError {
    fn from(err: ExtractError) -> Self {
        match err {
            ExtractError::RateLimited { host } => DownloadError::RateLimited { host },
            ExtractError::AuthRequired { reason } => DownloadError::AuthRequired { reason },
            ExtractError::NotFound { reason } => DownloadError::NotFound { reason },
            ExtractError::Cancelled => DownloadError::Cancelled,
            other => DownloadError::Unclassified {
                reason: other.to_string(),
            },
        }
    }
}

impl From<GatewayError> for DownloadError {
    fn from(err: GatewayError) -> Self {
        DownloadError::GatewayTransient {
            reason: err.to_string(),
        }
    }
}

/// Lifecycle of a download task.
///
/// `Queued → Admitted → FetchingInfo → Downloading → Sending → Completed`,
/// with `Failed` and `Cancelled` reachable from any non-terminal state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum TaskState {
    Queued,
    Admitted,
    FetchingInfo,
    Downloading,
    Sending,
    Completed,
    Failed { error: DownloadError },
    Cancelled,
}

impl TaskState {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            TaskState::Completed | TaskState::Failed { .. } | TaskState::Cancelled
        )
    }

    /// Position in the lifecycle. A task's rank never decreases; all
    /// terminal states share the highest rank.
    pub fn rank(&self) -> u8 {
        match self {
            TaskState::Queued => 0,
            TaskState::Admitted => 1,
            TaskState::FetchingInfo => 2,
            TaskState::Downloading => 3,
            TaskState::Sending => 4,
            TaskState::Completed | TaskState::Failed { .. } | TaskState::Cancelled => 5,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            TaskState::Queued => "queued",
            TaskState::Admitted => "admitted",
            TaskState::FetchingInfo => "fetching_info",
            TaskState::Downloading => "downloading",
            TaskState::Sending => "sending",
            TaskState::Completed => "completed",
            TaskState::Failed { .. } => "failed",
            TaskState::Cancelled => "cancelled",
        }
    }
}

impl From<DownloadError> for TaskState {
    fn from(error: DownloadError) -> Self {
        match error {
            DownloadError::Cancelled => TaskState::Cancelled,
            error => TaskState::Failed { error },
        }
    }
}

/// Observer of one accepted task.
#[derive(Debug, Clone)]
pub struct TaskHandle {
    id: TaskId,
    user_id: i64,
    state: watch::Receiver<TaskState>,
}

impl TaskHandle {
    pub(crate) fn new(id: TaskId, user_id: i64, state: watch::Receiver<TaskState>) -> Self {
        Self { id, user_id, state }
    }

    pub fn id(&self) -> TaskId {
        self.id
    }

    pub fn user_id(&self) -> i64 {
        self.user_id
    }

    /// Current state.
    pub fn state(&self) -> TaskState {
        self.state.borrow().clone()
    }

    /// Wait for the next state change. Returns `None` once no further change
    /// can happen.
    pub async fn changed(&mut self) -> Option<TaskState> {
        self.state.changed().await.ok()?;
        Some(self.state.borrow_and_update().clone())
    }

    /// Wait until the task reaches a terminal state.
    pub async fn wait_terminal(&mut self) -> TaskState {
        let reached = self
            .state
            .wait_for(TaskState::is_terminal)
            .await
            .map(|state| TaskState::clone(&state));
        reached.unwrap_or_else(|_| self.state.borrow().clone())
    }
}

/// Why a submission was refused. No task is created.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize)]
#[serde(tag = "reason", rename_all = "snake_case")]
pub enum RejectReason {
    #[error("too many concurrent downloads (limit {limit})")]
    TooManyDownloads { limit: usize },

    #[error("download queue is full (capacity {capacity})")]
    QueueFull { capacity: usize },

    #[error("download manager is shutting down")]
    ShuttingDown,

    #[error("unsupported URL: {url}")]
    UnsupportedUrl { url: String },
}

impl RejectReason {
    pub fn message_key(&self) -> &'static str {
        match self {
            RejectReason::TooManyDownloads { .. } => keys::TOO_MANY_DOWNLOADS,
            RejectReason::QueueFull { .. } => keys::QUEUE_FULL,
            RejectReason::ShuttingDown => keys::SHUTTING_DOWN,
            RejectReason::UnsupportedUrl { .. } => keys::UNSUPPORTED_URL,
        }
    }

    /// Label used in metrics.
    pub fn kind(&self) -> &'static str {
        match self {
            RejectReason::TooManyDownloads { .. } => "too_many_downloads",
            RejectReason::QueueFull { .. } => "queue_full",
            RejectReason::ShuttingDown => "shutting_down",
            RejectReason::UnsupportedUrl { .. } => "unsupported_url",
        }
    }
}

/// Result of [`DownloadManager::submit`](super::DownloadManager::submit).
#[derive(Debug)]
pub enum SubmitOutcome {
    Accepted(TaskHandle),
    Rejected(RejectReason),
}

impl SubmitOutcome {
    pub fn is_accepted(&self) -> bool {
        matches!(self, SubmitOutcome::Accepted(_))
    }

    pub fn handle(self) -> Option<TaskHandle> {
        match self {
            SubmitOutcome::Accepted(handle) => Some(handle),
            SubmitOutcome::Rejected(_) => None,
        }
    }

    pub fn rejection(&self) -> Option<&RejectReason> {
        match self {
            SubmitOutcome::Accepted(_) => None,
            SubmitOutcome::Rejected(reason) => Some(reason),
        }
    }
}

/// One live task as seen from outside.
#[derive(Debug, Clone, Serialize)]
pub struct TaskSummary {
    pub task_id: TaskId,
    pub user_id: i64,
    pub url: String,
    pub state: TaskState,
    pub submitted_at: DateTime<Utc>,
}

/// Snapshot of the manager.
#[derive(Debug, Clone, Serialize)]
pub struct ManagerStatus {
    pub accepting: bool,
    pub in_flight: usize,
    pub queued: usize,
    /// Users with at least one live task.
    pub users: usize,
    pub max_concurrent_downloads: usize,
    pub max_downloads_per_user: usize,
    pub hosts: Vec<HostLimitStatus>,
}

/// Outcome of [`DownloadManager::shutdown`](super::DownloadManager::shutdown).
#[derive(Debug, Clone, Serialize)]
pub struct ShutdownReport {
    /// Queued tasks ended without running.
    pub cancelled_queued: usize,
    /// Running tasks signalled to stop.
    pub cancelled_in_flight: usize,
    /// Whether the wait for workers hit the timeout.
    pub timed_out: bool,
    pub elapsed_ms: u64,
}
