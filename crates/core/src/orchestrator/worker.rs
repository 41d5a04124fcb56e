//! Runs one download task end to end.

use std::future::Future;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tokio::sync::{watch, Notify, OwnedSemaphorePermit};
use tokio::time::{timeout, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use super::manager::Shared;
use super::{DownloadError, DownloadRequest, TaskId, TaskState};
use crate::gateway::{GatewayError, MessageHandle};
use crate::messages::{keys, Localizer};
use crate::metrics;
use crate::progress::{noop_callback, ProgressCallback, ProgressPump};
use crate::rate_limiter::host_of;

/// Holds a task's global slot and index entry.
///
/// Releasing (explicitly or on drop) removes the task from the index before
/// the slot is returned, so a panicking worker still frees both.
pub(crate) struct SlotGuard {
    shared: Arc<Shared>,
    task_id: TaskId,
    user_id: i64,
    permit: Option<OwnedSemaphorePermit>,
}

impl SlotGuard {
    pub(crate) fn new(
        shared: Arc<Shared>,
        task_id: TaskId,
        user_id: i64,
        permit: OwnedSemaphorePermit,
    ) -> Self {
        Self {
            shared,
            task_id,
            user_id,
            permit: Some(permit),
        }
    }

    fn release(&mut self) {
        if let Some(permit) = self.permit.take() {
            self.shared.release(self.task_id, self.user_id);
            drop(permit);
        }
    }
}

impl Drop for SlotGuard {
    fn drop(&mut self) {
        self.release();
    }
}

/// Exclusive owner of a task from admission to its terminal state.
pub(crate) struct DownloadWorker {
    shared: Arc<Shared>,
    task_id: TaskId,
    request: DownloadRequest,
    format_id: Option<String>,
    localizer: Localizer,
    cancel: CancellationToken,
    state_tx: watch::Sender<TaskState>,
}

impl DownloadWorker {
    pub(crate) fn new(
        shared: Arc<Shared>,
        task_id: TaskId,
        request: DownloadRequest,
        format_id: Option<String>,
        localizer: Localizer,
        cancel: CancellationToken,
        state_tx: watch::Sender<TaskState>,
    ) -> Self {
        Self {
            shared,
            task_id,
            request,
            format_id,
            localizer,
            cancel,
            state_tx,
        }
    }

    pub(crate) fn task_id(&self) -> TaskId {
        self.task_id
    }

    pub(crate) fn user_id(&self) -> i64 {
        self.request.user_id
    }

    pub(crate) async fn run(self, mut guard: SlotGuard) {
        let started = Instant::now();
        let scratch = self
            .shared
            .config
            .download_dir
            .join(self.task_id.to_string());
        info!(task_id = %self.task_id, user_id = self.request.user_id, url = %self.request.url, "Download admitted");

        let mut status_message = None;
        let mut pump = None;
        let result = self
            .execute(&scratch, &mut status_message, &mut pump)
            .await;

        if let Err(error) = &result {
            if *error != DownloadError::Cancelled {
                self.notify_failure(error).await;
            }
        }

        self.cleanup(pump, status_message, &scratch).await;
        guard.release();

        let state = match result {
            Ok(()) => TaskState::Completed,
            Err(error) => TaskState::from(error),
        };
        let reason = match &state {
            TaskState::Failed { error } => error.kind(),
            _ => "none",
        };
        metrics::DOWNLOADS_FINISHED
            .with_label_values(&[state.name(), reason])
            .inc();
        metrics::DOWNLOAD_DURATION
            .with_label_values(&[state.name()])
            .observe(started.elapsed().as_secs_f64());

        match &state {
            TaskState::Failed { error } => {
                warn!(task_id = %self.task_id, user_id = self.request.user_id, error = %error, "Download failed")
            }
            _ => info!(task_id = %self.task_id, user_id = self.request.user_id, state = state.name(), "Download finished"),
        }
        self.state_tx.send_replace(state);
    }

    fn transition(&self, state: TaskState) {
        info!(task_id = %self.task_id, state = state.name(), "Download state changed");
        self.state_tx.send_replace(state);
    }

    /// Run a gateway call bounded by the gateway timeout and abandoned on
    /// cancellation.
    async fn bounded<T>(
        &self,
        call: impl Future<Output = Result<T, GatewayError>>,
    ) -> Result<T, DownloadError> {
        let limit = self.shared.config.gateway_timeout();
        tokio::select! {
            _ = self.cancel.cancelled() => Err(DownloadError::Cancelled),
            result = timeout(limit, call) => match result {
                Ok(Ok(value)) => Ok(value),
                Ok(Err(e)) => Err(e.into()),
                Err(_) => Err(GatewayError::Timeout { timeout_secs: limit.as_secs() }.into()),
            },
        }
    }

    async fn execute(
        &self,
        scratch: &Path,
        status_message: &mut Option<MessageHandle>,
        pump: &mut Option<ProgressPump>,
    ) -> Result<(), DownloadError> {
        let gateway = &self.shared.gateway;
        let chat = self.request.chat_id;

        self.transition(TaskState::FetchingInfo);
        let initial = self.localizer.status(keys::STATUS_GETTING_INFO, 0);
        match self.bounded(gateway.send_status(chat, &initial)).await {
            Ok(message) => *status_message = Some(message),
            Err(DownloadError::Cancelled) => return Err(DownloadError::Cancelled),
            Err(e) => {
                warn!(task_id = %self.task_id, error = %e, "Could not send status message, continuing without progress")
            }
        }

        let sink = match status_message {
            Some(message) => {
                let started = ProgressPump::start(
                    Arc::clone(gateway),
                    *message,
                    self.localizer,
                    self.shared.config.pump_config(),
                );
                let callback = started.callback();
                *pump = Some(started);
                callback
            }
            None => noop_callback(),
        };

        // The first download-phase report moves the task to Downloading.
        let download_started = Arc::new(Notify::new());
        let progress: ProgressCallback = {
            let notify = Arc::clone(&download_started);
            let seen = AtomicBool::new(false);
            Arc::new(move |status_key: &str, percent: u8| {
                if status_key == keys::STATUS_DOWNLOADING && !seen.swap(true, Ordering::AcqRel) {
                    notify.notify_one();
                }
                sink(status_key, percent);
            })
        };

        let host = host_of(&self.request.url).unwrap_or_default();
        let mut host_permit = tokio::select! {
            _ = self.cancel.cancelled() => return Err(DownloadError::Cancelled),
            permit = self.shared.limiter.acquire(&host) => permit,
        };

        let fetch = self.shared.extractor.fetch(
            &self.request.url,
            self.format_id.as_deref(),
            scratch,
            Arc::clone(&progress),
            self.cancel.clone(),
        );
        tokio::pin!(fetch);

        let mut downloading = false;
        let media = loop {
            tokio::select! {
                _ = self.cancel.cancelled() => return Err(DownloadError::Cancelled),
                _ = download_started.notified(), if !downloading => {
                    downloading = true;
                    self.transition(TaskState::Downloading);
                }
                result = &mut fetch => break result?,
            }
        };
        host_permit.release();
        if !downloading {
            self.transition(TaskState::Downloading);
        }

        let metadata = tokio::fs::metadata(&media.path)
            .await
            .map_err(|e| DownloadError::NotFound {
                reason: format!("downloaded file missing: {}", e),
            })?;
        if !metadata.is_file() || metadata.len() == 0 {
            return Err(DownloadError::Corrupted {
                reason: "downloaded file is empty".to_string(),
            });
        }
        debug!(task_id = %self.task_id, path = %media.path.display(), bytes = metadata.len(), "Download verified");

        self.transition(TaskState::Sending);
        progress(keys::STATUS_SENDING, 0);
        self.bounded(gateway.send_file(chat, &media.path, &media.caption))
            .await?;
        progress(keys::STATUS_SENDING, 100);
        Ok(())
    }

    async fn notify_failure(&self, error: &DownloadError) {
        let text = error.user_message(&self.localizer);
        if let Err(e) = self
            .bounded(self.shared.gateway.send_text(self.request.chat_id, &text))
            .await
        {
            warn!(task_id = %self.task_id, error = %e, "Failed to deliver failure notice");
        }
    }

    /// Always runs. Failures are logged and never stop the remaining steps.
    async fn cleanup(
        &self,
        pump: Option<ProgressPump>,
        status_message: Option<MessageHandle>,
        scratch: &Path,
    ) {
        if let Some(pump) = pump {
            let stats = pump.stop().await;
            debug!(task_id = %self.task_id, ?stats, "Progress pump stopped");
        }

        match tokio::fs::remove_dir_all(scratch).await {
            Ok(()) => debug!(task_id = %self.task_id, "Scratch directory removed"),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => {
                error!(task_id = %self.task_id, path = %scratch.display(), error = %e, "Failed to remove scratch directory");
                metrics::CLEANUP_FAILURES
                    .with_label_values(&["scratch_dir"])
                    .inc();
            }
        }

        if let Some(message) = status_message {
            let limit = self.shared.config.gateway_timeout();
            let failure = match timeout(limit, self.shared.gateway.delete_message(&message)).await {
                Ok(Ok(())) => None,
                Ok(Err(e)) => Some(e.to_string()),
                Err(_) => Some(format!("timed out after {}s", limit.as_secs())),
            };
            if let Some(reason) = failure {
                error!(task_id = %self.task_id, message_id = message.message_id, error = %reason, "Failed to delete status message");
                metrics::CLEANUP_FAILURES
                    .with_label_values(&["status_message"])
                    .inc();
            }
        }
    }
}
