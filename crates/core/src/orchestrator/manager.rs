//! Download manager: admission control, fair-share dispatch and shutdown.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use tokio::sync::{watch, Notify, Semaphore};
use tokio::task::JoinHandle;
use tokio::time::{timeout, Instant};
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, info, warn};

use super::worker::{DownloadWorker, SlotGuard};
use super::{
    ActiveDownloadIndex, DownloadConfig, DownloadRequest, ManagerStatus, ReadyQueue, RejectReason,
    ShutdownReport, SubmitOutcome, TaskHandle, TaskId, TaskState, TaskSummary,
};
use crate::extractor::{ExtractError, Extractor, FormatDescriptor, Platform};
use crate::gateway::MessagingGateway;
use crate::messages::Localizer;
use crate::metrics;
use crate::rate_limiter::{host_of, HostRateLimiter};
use crate::settings::{SettingsConfig, SettingsStore};

struct TaskRecord {
    request: DownloadRequest,
    format_id: Option<String>,
    localizer: Localizer,
    cancel: CancellationToken,
    state_rx: watch::Receiver<TaskState>,
    /// Present while the task is queued; moves to the worker on admission.
    state_tx: Option<watch::Sender<TaskState>>,
}

impl TaskRecord {
    fn is_queued(&self) -> bool {
        self.state_tx.is_some()
    }
}

/// Mutable scheduler state. Guarded by one mutex that is never held across
/// an await.
#[derive(Default)]
pub(super) struct SchedulerState {
    accepting: bool,
    queue: ReadyQueue,
    index: ActiveDownloadIndex,
    tasks: HashMap<TaskId, TaskRecord>,
    in_flight: usize,
}

impl SchedulerState {
    /// End a task that never started. Returns `false` if it is not queued.
    fn cancel_queued(&mut self, task_id: &TaskId) -> bool {
        if !self.tasks.get(task_id).is_some_and(TaskRecord::is_queued) {
            return false;
        }
        let Some(record) = self.tasks.remove(task_id) else {
            return false;
        };
        self.queue.remove(task_id);
        self.index.remove(record.request.user_id, task_id);
        if let Some(state_tx) = record.state_tx {
            state_tx.send_replace(TaskState::Cancelled);
        }
        metrics::DOWNLOADS_FINISHED
            .with_label_values(&["cancelled", "none"])
            .inc();
        info!(task_id = %task_id, user_id = record.request.user_id, "Queued download cancelled");
        true
    }

    fn update_gauges(&self) {
        metrics::DOWNLOADS_QUEUED.set(self.queue.len() as i64);
        metrics::DOWNLOADS_IN_FLIGHT.set(self.in_flight as i64);
    }
}

/// State shared between the manager, its dispatcher and its workers.
pub(crate) struct Shared {
    pub(super) config: DownloadConfig,
    state: Mutex<SchedulerState>,
    ready: Notify,
    slots: Arc<Semaphore>,
    pub(super) limiter: Arc<HostRateLimiter>,
    pub(super) extractor: Arc<dyn Extractor>,
    pub(super) gateway: Arc<dyn MessagingGateway>,
    settings: Arc<dyn SettingsStore>,
    root: CancellationToken,
    tracker: TaskTracker,
}

impl Shared {
    fn lock(&self) -> MutexGuard<'_, SchedulerState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Pop the best queued task and hand it to a new worker.
    fn promote_next(self: &Arc<Self>) -> Option<DownloadWorker> {
        let mut state = self.lock();
        while let Some(task_id) = state.queue.pop() {
            let Some(record) = state.tasks.get_mut(&task_id) else {
                continue;
            };
            let Some(state_tx) = record.state_tx.take() else {
                continue;
            };
            state_tx.send_replace(TaskState::Admitted);
            let worker = DownloadWorker::new(
                Arc::clone(self),
                task_id,
                record.request.clone(),
                record.format_id.clone(),
                record.localizer,
                record.cancel.clone(),
                state_tx,
            );
            state.in_flight += 1;
            state.update_gauges();
            return Some(worker);
        }
        None
    }

    /// Forget a finished task.
    pub(super) fn release(&self, task_id: TaskId, user_id: i64) {
        let mut state = self.lock();
        state.index.remove(user_id, &task_id);
        state.tasks.remove(&task_id);
        state.in_flight = state.in_flight.saturating_sub(1);
        state.update_gauges();
    }
}

async fn dispatch_loop(shared: Arc<Shared>) {
    debug!("Dispatcher started");
    loop {
        let permit = tokio::select! {
            _ = shared.root.cancelled() => break,
            permit = Arc::clone(&shared.slots).acquire_owned() => match permit {
                Ok(permit) => permit,
                Err(_) => break,
            },
        };

        let worker = loop {
            if let Some(worker) = shared.promote_next() {
                break Some(worker);
            }
            tokio::select! {
                _ = shared.root.cancelled() => break None,
                _ = shared.ready.notified() => {}
            }
        };
        let Some(worker) = worker else {
            break;
        };

        let guard = SlotGuard::new(
            Arc::clone(&shared),
            worker.task_id(),
            worker.user_id(),
            permit,
        );
        shared.tracker.spawn(worker.run(guard));
    }
    debug!("Dispatcher stopped");
}

/// Public façade of the download core.
///
/// Accepts submissions, owns the scheduler, the per-host rate limiter and
/// the collaborators, and drives shutdown.
pub struct DownloadManager {
    shared: Arc<Shared>,
    dispatcher: Mutex<Option<JoinHandle<()>>>,
}

impl DownloadManager {
    /// Create a manager and start its dispatcher.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn new(
        config: DownloadConfig,
        extractor: Arc<dyn Extractor>,
        gateway: Arc<dyn MessagingGateway>,
        settings: Arc<dyn SettingsStore>,
    ) -> Self {
        info!(
            max_concurrent = config.max_concurrent_downloads,
            max_per_user = config.max_downloads_per_user,
            per_host = config.per_host_limit,
            extractor = extractor.name(),
            gateway = gateway.name(),
            "Starting download manager"
        );

        let shared = Arc::new(Shared {
            slots: Arc::new(Semaphore::new(config.max_concurrent_downloads.max(1))),
            limiter: Arc::new(HostRateLimiter::new(config.per_host_limit)),
            state: Mutex::new(SchedulerState {
                accepting: true,
                ..Default::default()
            }),
            ready: Notify::new(),
            extractor,
            gateway,
            settings,
            root: CancellationToken::new(),
            tracker: TaskTracker::new(),
            config,
        });
        let dispatcher = tokio::spawn(dispatch_loop(Arc::clone(&shared)));

        Self {
            shared,
            dispatcher: Mutex::new(Some(dispatcher)),
        }
    }

    pub fn config(&self) -> &DownloadConfig {
        &self.shared.config
    }

    pub fn rate_limiter(&self) -> Arc<HostRateLimiter> {
        Arc::clone(&self.shared.limiter)
    }

    pub fn is_accepting(&self) -> bool {
        self.shared.lock().accepting
    }

    /// Admit, queue or reject a request. Never waits.
    pub fn submit(&self, request: DownloadRequest) -> SubmitOutcome {
        let outcome = self.admit(request);
        let label = match &outcome {
            SubmitOutcome::Accepted(_) => "accepted",
            SubmitOutcome::Rejected(reason) => reason.kind(),
        };
        metrics::SUBMISSIONS_TOTAL.with_label_values(&[label]).inc();
        outcome
    }

    fn admit(&self, request: DownloadRequest) -> SubmitOutcome {
        if Platform::detect(&request.url).is_none() {
            debug!(user_id = request.user_id, url = %request.url, "Unsupported URL rejected");
            return SubmitOutcome::Rejected(RejectReason::UnsupportedUrl { url: request.url });
        }

        let preferences = self
            .shared
            .settings
            .resolve_preferences(request.user_id, Some(request.chat_id))
            .unwrap_or_else(|e| {
                warn!(user_id = request.user_id, error = %e, "Failed to load preferences, using defaults");
                SettingsConfig::default().defaults()
            });
        let format_id = request
            .format_id
            .clone()
            .or_else(|| preferences.default_quality.format_id());
        let localizer = Localizer::for_code(&preferences.language);

        let config = &self.shared.config;
        let mut state = self.shared.lock();
        if !state.accepting {
            return SubmitOutcome::Rejected(RejectReason::ShuttingDown);
        }
        let live = state.index.count(request.user_id);
        if live >= config.max_downloads_per_user {
            debug!(user_id = request.user_id, live, "Per-user limit reached");
            return SubmitOutcome::Rejected(RejectReason::TooManyDownloads {
                limit: config.max_downloads_per_user,
            });
        }
        if state.queue.len() >= config.max_queued_downloads {
            return SubmitOutcome::Rejected(RejectReason::QueueFull {
                capacity: config.max_queued_downloads,
            });
        }

        let task_id = TaskId::new();
        let user_id = request.user_id;
        let url = request.url.clone();
        let (state_tx, state_rx) = watch::channel(TaskState::Queued);
        let record = TaskRecord {
            request,
            format_id,
            localizer,
            cancel: self.shared.root.child_token(),
            state_rx: state_rx.clone(),
            state_tx: Some(state_tx),
        };

        state.queue.push(task_id, live);
        state.index.insert(user_id, task_id);
        state.tasks.insert(task_id, record);
        state.update_gauges();
        drop(state);

        self.shared.ready.notify_one();
        info!(task_id = %task_id, user_id, url = %url, priority = live, "Download queued");
        SubmitOutcome::Accepted(TaskHandle::new(task_id, user_id, state_rx))
    }

    /// List the formats available for `url`, through the per-host limiter.
    pub async fn formats(&self, url: &str) -> Result<Vec<FormatDescriptor>, ExtractError> {
        let unsupported = || ExtractError::UnsupportedUrl {
            url: url.to_string(),
        };
        Platform::detect(url).ok_or_else(unsupported)?;
        let host = host_of(url).ok_or_else(unsupported)?;

        tokio::select! {
            _ = self.shared.root.cancelled() => Err(ExtractError::Cancelled),
            result = async {
                let _permit = self.shared.limiter.acquire(&host).await;
                self.shared.extractor.probe(url).await
            } => result,
        }
    }

    /// Cancel one task. Queued tasks end immediately; running tasks are
    /// signalled and finish their cleanup.
    pub fn cancel(&self, task_id: TaskId) -> bool {
        let mut state = self.shared.lock();
        let cancelled = Self::cancel_locked(&mut state, task_id);
        state.update_gauges();
        cancelled
    }

    /// Cancel every live task of a user. Returns how many were signalled.
    pub fn cancel_user(&self, user_id: i64) -> usize {
        let mut state = self.shared.lock();
        let cancelled = state
            .index
            .tasks(user_id)
            .into_iter()
            .filter(|task_id| Self::cancel_locked(&mut state, *task_id))
            .count();
        state.update_gauges();
        cancelled
    }

    fn cancel_locked(state: &mut SchedulerState, task_id: TaskId) -> bool {
        let Some(record) = state.tasks.get(&task_id) else {
            return false;
        };
        if record.is_queued() {
            return state.cancel_queued(&task_id);
        }
        record.cancel.cancel();
        info!(task_id = %task_id, user_id = record.request.user_id, "Running download cancelled");
        true
    }

    pub fn status(&self) -> ManagerStatus {
        let (accepting, in_flight, queued, users) = {
            let state = self.shared.lock();
            (
                state.accepting,
                state.in_flight,
                state.queue.len(),
                state.index.users(),
            )
        };
        ManagerStatus {
            accepting,
            in_flight,
            queued,
            users,
            max_concurrent_downloads: self.shared.config.max_concurrent_downloads,
            max_downloads_per_user: self.shared.config.max_downloads_per_user,
            hosts: self.shared.limiter.all_status(),
        }
    }

    /// Live tasks of a user, oldest first.
    pub fn user_tasks(&self, user_id: i64) -> Vec<TaskSummary> {
        let state = self.shared.lock();
        let mut tasks: Vec<_> = state
            .index
            .tasks(user_id)
            .into_iter()
            .filter_map(|task_id| {
                state.tasks.get(&task_id).map(|record| TaskSummary {
                    task_id,
                    user_id,
                    url: record.request.url.clone(),
                    state: record.state_rx.borrow().clone(),
                    submitted_at: record.request.submitted_at,
                })
            })
            .collect();
        tasks.sort_by_key(|task| task.submitted_at);
        tasks
    }

    /// Stop accepting work, cancel everything and wait up to `limit` for
    /// workers to finish, then close the gateway.
    ///
    /// Returns even if some worker is still stuck when `limit` expires.
    pub async fn shutdown(&self, limit: Duration) -> ShutdownReport {
        let started = Instant::now();

        let (cancelled_queued, cancelled_in_flight) = {
            let mut state = self.shared.lock();
            if std::mem::replace(&mut state.accepting, false) {
                info!("Shutting down download manager");
            }
            let queued = state.queue.drain();
            for task_id in &queued {
                state.cancel_queued(task_id);
            }
            state.update_gauges();
            (queued.len(), state.in_flight)
        };

        self.shared.root.cancel();
        self.shared.tracker.close();

        let timed_out = timeout(limit, self.shared.tracker.wait()).await.is_err();
        if timed_out {
            warn!(
                timeout_secs = limit.as_secs(),
                in_flight = self.shared.lock().in_flight,
                "Timed out waiting for downloads to finish"
            );
        }

        let dispatcher = self
            .dispatcher
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .take();
        if let Some(dispatcher) = dispatcher {
            dispatcher.abort();
        }

        let remaining = limit.saturating_sub(started.elapsed());
        if remaining.is_zero() {
            // Out of budget: close in the background instead of waiting.
            let gateway = Arc::clone(&self.shared.gateway);
            tokio::spawn(async move { gateway.close().await });
            warn!("No time left to close the gateway, closing in background");
        } else if timeout(remaining, self.shared.gateway.close())
            .await
            .is_err()
        {
            warn!("Gateway did not close in time");
        }

        let report = ShutdownReport {
            cancelled_queued,
            cancelled_in_flight,
            timed_out,
            elapsed_ms: started.elapsed().as_millis() as u64,
        };
        info!(?report, "Download manager stopped");
        report
    }
}

impl Drop for DownloadManager {
    fn drop(&mut self) {
        self.shared.root.cancel();
    }
}
