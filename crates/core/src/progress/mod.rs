//! Progress reporting pipeline.
//!
//! Extractors report `(status_key, percent)` pairs through a
//! [`ProgressCallback`], possibly from threads the runtime does not own. The
//! [`ProgressPump`] buffers those events in a bounded channel and a single
//! consumer task turns them into status-message edits, skipping duplicates and
//! anything arriving faster than the throttle interval.

mod pump;

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use serde::Serialize;
use tokio::sync::mpsc;

pub use pump::{ProgressPump, PumpConfig};

/// Callback handed to an extractor.
pub type ProgressCallback = Arc<dyn Fn(&str, u8) + Send + Sync>;

/// One raw progress report.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProgressEvent {
    pub status_key: String,
    pub percent: u8,
}

impl ProgressEvent {
    pub fn new(status_key: impl Into<String>, percent: u8) -> Self {
        Self {
            status_key: status_key.into(),
            percent: percent.min(100),
        }
    }
}

/// Counters kept by a pump.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct PumpStats {
    /// Edits issued to the gateway, whatever their outcome.
    pub rendered: u64,
    pub deduplicated: u64,
    pub throttled: u64,
    /// Issued edits that failed for a reason other than "not modified".
    pub failed: u64,
    /// Events refused because the buffer was full or the pump was stopping.
    pub dropped: u64,
}

#[derive(Debug, Default)]
pub(crate) struct PumpCounters {
    rendered: AtomicU64,
    deduplicated: AtomicU64,
    throttled: AtomicU64,
    failed: AtomicU64,
    dropped: AtomicU64,
}

impl PumpCounters {
    pub(crate) fn snapshot(&self) -> PumpStats {
        PumpStats {
            rendered: self.rendered.load(Ordering::Relaxed),
            deduplicated: self.deduplicated.load(Ordering::Relaxed),
            throttled: self.throttled.load(Ordering::Relaxed),
            failed: self.failed.load(Ordering::Relaxed),
            dropped: self.dropped.load(Ordering::Relaxed),
        }
    }
}

/// Producer side of a pump. Cheap to clone; never blocks.
#[derive(Clone)]
pub struct ProgressEmitter {
    tx: mpsc::Sender<ProgressEvent>,
    accepting: Arc<AtomicBool>,
    counters: Arc<PumpCounters>,
}

impl ProgressEmitter {
    pub(crate) fn new(
        tx: mpsc::Sender<ProgressEvent>,
        accepting: Arc<AtomicBool>,
        counters: Arc<PumpCounters>,
    ) -> Self {
        Self {
            tx,
            accepting,
            counters,
        }
    }

    /// Queue an event for rendering.
    ///
    /// Returns `false` when the event was dropped: the buffer is full, or the
    /// pump is stopping.
    pub fn emit(&self, status_key: &str, percent: u8) -> bool {
        if !self.accepting.load(Ordering::Acquire) {
            self.record_drop();
            return false;
        }
        match self.tx.try_send(ProgressEvent::new(status_key, percent)) {
            Ok(()) => true,
            Err(e) => {
                tracing::trace!(status_key, percent, error = %e, "Progress event dropped");
                self.record_drop();
                false
            }
        }
    }

    fn record_drop(&self) {
        self.counters.dropped.fetch_add(1, Ordering::Relaxed);
        crate::metrics::PROGRESS_SKIPPED
            .with_label_values(&["dropped"])
            .inc();
    }

    /// Wrap this emitter as an extractor callback.
    pub fn callback(&self) -> ProgressCallback {
        let emitter = self.clone();
        Arc::new(move |status_key: &str, percent: u8| {
            emitter.emit(status_key, percent);
        })
    }
}

/// A callback that discards every event.
pub fn noop_callback() -> ProgressCallback {
    Arc::new(|_: &str, _: u8| {})
}
