use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{timeout, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{trace, warn};

use super::{ProgressCallback, ProgressEmitter, ProgressEvent, PumpCounters, PumpStats};
use crate::gateway::{MessageHandle, MessagingGateway};
use crate::messages::Localizer;
use crate::metrics;

/// Pump tuning.
#[derive(Debug, Clone)]
pub struct PumpConfig {
    /// Minimum spacing between two status edits.
    pub throttle: Duration,
    /// Events buffered before `emit` starts dropping.
    pub buffer: usize,
    /// How long `stop` waits for the consumer to finish.
    pub grace: Duration,
    /// Upper bound for one status edit.
    pub edit_timeout: Duration,
}

impl Default for PumpConfig {
    fn default() -> Self {
        Self {
            throttle: Duration::from_millis(500),
            buffer: 64,
            grace: Duration::from_secs(1),
            edit_timeout: Duration::from_secs(60),
        }
    }
}

/// Renders progress for one task into edits of its status message.
pub struct ProgressPump {
    emitter: ProgressEmitter,
    accepting: Arc<AtomicBool>,
    counters: Arc<PumpCounters>,
    stop: CancellationToken,
    grace: Duration,
    handle: Option<JoinHandle<()>>,
}

impl ProgressPump {
    /// Spawn the consumer task for `message`.
    pub fn start(
        gateway: Arc<dyn MessagingGateway>,
        message: MessageHandle,
        localizer: Localizer,
        config: PumpConfig,
    ) -> Self {
        let (tx, rx) = mpsc::channel(config.buffer.max(1));
        let accepting = Arc::new(AtomicBool::new(true));
        let counters = Arc::new(PumpCounters::default());
        let stop = CancellationToken::new();

        let renderer = Renderer {
            gateway,
            message,
            localizer,
            throttle: config.throttle,
            edit_timeout: config.edit_timeout,
            counters: Arc::clone(&counters),
            last_rendered: None,
            last_render_at: None,
        };
        let handle = tokio::spawn(renderer.run(rx, stop.clone(), config.grace));

        Self {
            emitter: ProgressEmitter::new(tx, Arc::clone(&accepting), Arc::clone(&counters)),
            accepting,
            counters,
            stop,
            grace: config.grace,
            handle: Some(handle),
        }
    }

    pub fn emitter(&self) -> ProgressEmitter {
        self.emitter.clone()
    }

    pub fn callback(&self) -> ProgressCallback {
        self.emitter.callback()
    }

    pub fn stats(&self) -> PumpStats {
        self.counters.snapshot()
    }

    /// Stop accepting events and wait for the consumer to drain.
    ///
    /// Returns within the grace period: a consumer still busy after it is
    /// aborted.
    pub async fn stop(mut self) -> PumpStats {
        self.accepting.store(false, Ordering::Release);
        self.stop.cancel();

        if let Some(mut handle) = self.handle.take() {
            if timeout(self.grace, &mut handle).await.is_err() {
                warn!(
                    grace_ms = self.grace.as_millis() as u64,
                    "Progress pump did not stop within grace period, aborting"
                );
                handle.abort();
            }
        }
        self.counters.snapshot()
    }
}

impl Drop for ProgressPump {
    fn drop(&mut self) {
        self.accepting.store(false, Ordering::Release);
        self.stop.cancel();
    }
}

struct Renderer {
    gateway: Arc<dyn MessagingGateway>,
    message: MessageHandle,
    localizer: Localizer,
    throttle: Duration,
    edit_timeout: Duration,
    counters: Arc<PumpCounters>,
    last_rendered: Option<(String, u8)>,
    last_render_at: Option<Instant>,
}

impl Renderer {
    async fn run(
        mut self,
        mut rx: mpsc::Receiver<ProgressEvent>,
        stop: CancellationToken,
        grace: Duration,
    ) {
        loop {
            tokio::select! {
                biased;
                _ = stop.cancelled() => break,
                event = rx.recv() => match event {
                    Some(event) => self.render(event).await,
                    None => break,
                },
            }
        }

        // Events accepted before the stop request are still rendered.
        rx.close();
        if timeout(grace, self.drain(&mut rx)).await.is_err() {
            trace!(message_id = self.message.message_id, "Progress drain cut short");
        }
    }

    async fn drain(&mut self, rx: &mut mpsc::Receiver<ProgressEvent>) {
        while let Some(event) = rx.recv().await {
            self.render(event).await;
        }
    }

    async fn render(&mut self, event: ProgressEvent) {
        let duplicate = self
            .last_rendered
            .as_ref()
            .is_some_and(|(key, percent)| *key == event.status_key && *percent == event.percent);
        if duplicate {
            trace!(status_key = %event.status_key, percent = event.percent, "Duplicate progress skipped");
            self.counters.deduplicated.fetch_add(1, Ordering::Relaxed);
            metrics::PROGRESS_SKIPPED
                .with_label_values(&["duplicate"])
                .inc();
            return;
        }

        if let Some(at) = self.last_render_at {
            if at.elapsed() < self.throttle {
                trace!(status_key = %event.status_key, percent = event.percent, "Progress throttled");
                self.counters.throttled.fetch_add(1, Ordering::Relaxed);
                metrics::PROGRESS_SKIPPED
                    .with_label_values(&["throttled"])
                    .inc();
                return;
            }
        }

        let text = self.localizer.status(&event.status_key, event.percent);
        self.last_render_at = Some(Instant::now());
        self.last_rendered = Some((event.status_key, event.percent));
        self.counters.rendered.fetch_add(1, Ordering::Relaxed);
        metrics::PROGRESS_RENDERS.inc();

        match timeout(self.edit_timeout, self.gateway.edit_status(&self.message, &text)).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) if e.is_not_modified() => {
                trace!(message_id = self.message.message_id, "Status unchanged");
            }
            Ok(Err(e)) => {
                warn!(message_id = self.message.message_id, error = %e, "Failed to update progress status");
                self.counters.failed.fetch_add(1, Ordering::Relaxed);
                metrics::GATEWAY_EDIT_FAILURES.inc();
            }
            Err(_) => {
                warn!(
                    message_id = self.message.message_id,
                    timeout_secs = self.edit_timeout.as_secs(),
                    "Progress status edit timed out"
                );
                self.counters.failed.fetch_add(1, Ordering::Relaxed);
                metrics::GATEWAY_EDIT_FAILURES.inc();
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gateway::ChatId;
    use crate::messages::{keys, Language};
    use crate::testing::{MockBehavior, MockGateway};

    fn config(throttle_ms: u64) -> PumpConfig {
        PumpConfig {
            throttle: Duration::from_millis(throttle_ms),
            buffer: 16,
            grace: Duration::from_millis(200),
            edit_timeout: Duration::from_secs(5),
        }
    }

    fn start(gateway: &Arc<MockGateway>, throttle_ms: u64) -> ProgressPump {
        ProgressPump::start(
            Arc::clone(gateway) as Arc<dyn MessagingGateway>,
            MessageHandle::new(ChatId(1), 10),
            Localizer::new(Language::En),
            config(throttle_ms),
        )
    }

    async fn settle() {
        tokio::time::sleep(Duration::from_millis(1)).await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_identical_events_render_once() {
        let gateway = Arc::new(MockGateway::new());
        let pump = start(&gateway, 0);

        pump.emitter().emit(keys::STATUS_DOWNLOADING, 10);
        settle().await;
        pump.emitter().emit(keys::STATUS_DOWNLOADING, 10);
        settle().await;
        pump.emitter().emit(keys::STATUS_DOWNLOADING, 11);
        settle().await;

        let stats = pump.stop().await;
        assert_eq!(stats.rendered, 2);
        assert_eq!(stats.deduplicated, 1);

        let edits = gateway.edits().await;
        let texts: Vec<_> = edits.iter().map(|e| e.text.as_str()).collect();
        assert_eq!(texts, vec!["⏬ Downloading... 10%", "⏬ Downloading... 11%"]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_throttle_interval() {
        let gateway = Arc::new(MockGateway::new());
        let pump = start(&gateway, 500);
        let emitter = pump.emitter();

        emitter.emit(keys::STATUS_DOWNLOADING, 10);
        settle().await;
        emitter.emit(keys::STATUS_DOWNLOADING, 20);
        settle().await;
        tokio::time::sleep(Duration::from_millis(600)).await;
        emitter.emit(keys::STATUS_DOWNLOADING, 30);
        settle().await;

        let stats = pump.stop().await;
        assert_eq!(stats.rendered, 2);
        assert_eq!(stats.throttled, 1);

        let edits = gateway.edits().await;
        assert_eq!(edits.len(), 2);
        assert!(edits[1].at - edits[0].at >= Duration::from_millis(500));
        assert!(edits[1].text.ends_with("30%"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_not_modified_counts_as_success() {
        let gateway = Arc::new(MockGateway::new());
        gateway.set_edit_behavior(MockBehavior::NotModified).await;
        let pump = start(&gateway, 0);

        pump.emitter().emit(keys::STATUS_SENDING, 0);
        settle().await;

        let stats = pump.stop().await;
        assert_eq!(stats.rendered, 1);
        assert_eq!(stats.failed, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_edit_failures_do_not_stop_rendering() {
        let gateway = Arc::new(MockGateway::new());
        gateway.set_edit_behavior(MockBehavior::Fail).await;
        let pump = start(&gateway, 0);

        pump.emitter().emit(keys::STATUS_DOWNLOADING, 1);
        settle().await;
        gateway.set_edit_behavior(MockBehavior::Succeed).await;
        pump.emitter().emit(keys::STATUS_DOWNLOADING, 2);
        settle().await;

        let stats = pump.stop().await;
        assert_eq!(stats.rendered, 2);
        assert_eq!(stats.failed, 1);
        assert_eq!(gateway.edits().await.len(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_stop_bounded_by_grace_when_gateway_hangs() {
        let gateway = Arc::new(MockGateway::new());
        gateway.set_edit_behavior(MockBehavior::Hang).await;
        let pump = start(&gateway, 0);
        let emitter = pump.emitter();

        emitter.emit(keys::STATUS_DOWNLOADING, 5);
        settle().await;

        let started = Instant::now();
        pump.stop().await;
        assert!(started.elapsed() <= Duration::from_millis(200));

        // producer is refused once stop was requested
        assert!(!emitter.emit(keys::STATUS_DOWNLOADING, 6));
    }

    #[tokio::test(start_paused = true)]
    async fn test_buffered_events_drained_on_stop() {
        let gateway = Arc::new(MockGateway::new());
        let pump = start(&gateway, 0);

        // queued without yielding; the consumer has not run yet
        pump.emitter().emit(keys::STATUS_GETTING_INFO, 0);
        let stats = pump.stop().await;
        assert_eq!(stats.rendered, 1);
        assert_eq!(gateway.edits().await[0].text, "🔍 Getting video info... 0%");
    }
}
