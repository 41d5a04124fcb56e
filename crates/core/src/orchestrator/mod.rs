//! Download orchestration.
//!
//! The [`DownloadManager`] admits requests, keeps them in a fair-share
//! [`ReadyQueue`] and hands each admitted task to a worker that owns it until
//! a terminal state:
//! - **Admission**: per-user cap, global queue bound, shutdown gate
//! - **Dispatch**: one global slot per running download
//! - **Execution**: rate-limited fetch, upload, then unconditional cleanup

mod config;
mod index;
mod manager;
mod queue;
mod types;
mod worker;

pub use config::DownloadConfig;
pub use index::ActiveDownloadIndex;
pub use manager::DownloadManager;
pub use queue::ReadyQueue;
pub use types::{
    DownloadError, DownloadRequest, ManagerStatus, RejectReason, ShutdownReport, SubmitOutcome,
    TaskHandle, TaskId, TaskState, TaskSummary,
};
