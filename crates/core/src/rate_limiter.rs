//! Per-host concurrency gate for outbound extraction calls.
//!
//! Every upstream host gets its own semaphore, created lazily on first use
//! and kept for the lifetime of the limiter. A [`HostPermit`] holds one slot
//! and returns it when dropped, so release happens on every exit path.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use serde::Serialize;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use url::Url;

/// Default number of concurrent calls allowed per host.
pub const DEFAULT_PER_HOST_LIMIT: usize = 10;

/// Snapshot of one host's slot usage.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct HostLimitStatus {
    pub host: String,
    pub limit: usize,
    pub available: usize,
}

/// Pool of per-host semaphores.
///
/// Thread-safe; the internal map lock is never held across an await.
pub struct HostRateLimiter {
    per_host: usize,
    hosts: Mutex<HashMap<String, Arc<Semaphore>>>,
}

impl Default for HostRateLimiter {
    fn default() -> Self {
        Self::new(DEFAULT_PER_HOST_LIMIT)
    }
}

impl HostRateLimiter {
    /// Create a limiter allowing `per_host` concurrent calls to any single host.
    pub fn new(per_host: usize) -> Self {
        Self {
            per_host: per_host.max(1),
            hosts: Mutex::new(HashMap::new()),
        }
    }

    /// Slots per host.
    pub fn per_host_limit(&self) -> usize {
        self.per_host
    }

    fn semaphore(&self, host: &str) -> Arc<Semaphore> {
        let mut hosts = self.hosts.lock().unwrap_or_else(|e| e.into_inner());
        Arc::clone(
            hosts
                .entry(host.to_string())
                .or_insert_with(|| Arc::new(Semaphore::new(self.per_host))),
        )
    }

    /// Wait until a slot for `host` is free.
    ///
    /// Never fails and has no timeout; callers bound the wait with their own
    /// cancellation.
    pub async fn acquire(&self, host: &str) -> HostPermit {
        let semaphore = self.semaphore(host);
        // The semaphores are never closed, so acquisition only returns once a
        // slot is granted.
        let permit = match semaphore.acquire_owned().await {
            Ok(permit) => Some(permit),
            Err(_) => {
                tracing::warn!(host, "host semaphore closed, proceeding without a slot");
                None
            }
        };
        HostPermit {
            host: host.to_string(),
            permit,
        }
    }

    /// Take a slot for `host` only if one is free right now.
    pub fn try_acquire(&self, host: &str) -> Option<HostPermit> {
        let semaphore = self.semaphore(host);
        semaphore.try_acquire_owned().ok().map(|permit| HostPermit {
            host: host.to_string(),
            permit: Some(permit),
        })
    }

    /// Slot usage for one host, if it has been seen.
    pub fn status(&self, host: &str) -> Option<HostLimitStatus> {
        let hosts = self.hosts.lock().unwrap_or_else(|e| e.into_inner());
        hosts.get(host).map(|semaphore| HostLimitStatus {
            host: host.to_string(),
            limit: self.per_host,
            available: semaphore.available_permits(),
        })
    }

    /// Slot usage for every known host, sorted by host name.
    pub fn all_status(&self) -> Vec<HostLimitStatus> {
        let hosts = self.hosts.lock().unwrap_or_else(|e| e.into_inner());
        let mut statuses: Vec<_> = hosts
            .iter()
            .map(|(host, semaphore)| HostLimitStatus {
                host: host.clone(),
                limit: self.per_host,
                available: semaphore.available_permits(),
            })
            .collect();
        statuses.sort_by(|a, b| a.host.cmp(&b.host));
        statuses
    }

    /// Number of distinct hosts seen so far.
    pub fn host_count(&self) -> usize {
        self.hosts.lock().unwrap_or_else(|e| e.into_inner()).len()
    }
}

/// One held slot for a host. Dropping it returns the slot.
#[derive(Debug)]
pub struct HostPermit {
    host: String,
    permit: Option<OwnedSemaphorePermit>,
}

impl HostPermit {
    pub fn host(&self) -> &str {
        &self.host
    }

    /// Return the slot early. Calling this more than once is a no-op.
    pub fn release(&mut self) {
        self.permit.take();
    }

    pub fn is_held(&self) -> bool {
        self.permit.is_some()
    }
}

/// Extract the rate-limiting key for a URL: its lowercase host without a
/// leading `www.`.
pub fn host_of(url: &str) -> Option<String> {
    let parsed = Url::parse(url).ok()?;
    let host = parsed.host_str()?.to_ascii_lowercase();
    Some(host.strip_prefix("www.").map(str::to_string).unwrap_or(host))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_host_of() {
        assert_eq!(
            host_of("https://www.instagram.com/reel/abc/").as_deref(),
            Some("instagram.com")
        );
        assert_eq!(
            host_of("https://VM.TikTok.com/ZM123/").as_deref(),
            Some("vm.tiktok.com")
        );
        assert_eq!(host_of("not a url"), None);
        assert_eq!(host_of("file:///tmp/x"), None);
    }

    #[test]
    fn test_hosts_created_lazily() {
        let limiter = HostRateLimiter::new(2);
        assert_eq!(limiter.host_count(), 0);
        assert!(limiter.status("a.com").is_none());

        let _permit = limiter.try_acquire("a.com").unwrap();
        assert_eq!(limiter.host_count(), 1);
        assert_eq!(
            limiter.status("a.com"),
            Some(HostLimitStatus {
                host: "a.com".to_string(),
                limit: 2,
                available: 1,
            })
        );
    }

    #[test]
    fn test_try_acquire_respects_limit() {
        let limiter = HostRateLimiter::new(2);
        let p1 = limiter.try_acquire("a.com");
        let p2 = limiter.try_acquire("a.com");
        assert!(p1.is_some());
        assert!(p2.is_some());
        assert!(limiter.try_acquire("a.com").is_none());

        // other hosts are independent
        assert!(limiter.try_acquire("b.com").is_some());

        drop(p1);
        assert!(limiter.try_acquire("a.com").is_some());
    }

    #[test]
    fn test_release_is_idempotent() {
        let limiter = HostRateLimiter::new(1);
        let mut permit = limiter.try_acquire("a.com").unwrap();
        assert!(permit.is_held());

        permit.release();
        permit.release();
        assert!(!permit.is_held());
        assert_eq!(limiter.status("a.com").unwrap().available, 1);

        drop(permit);
        assert_eq!(limiter.status("a.com").unwrap().available, 1);
    }

    #[tokio::test]
    async fn test_acquire_waits_for_free_slot() {
        let limiter = Arc::new(HostRateLimiter::new(1));
        let held = limiter.acquire("a.com").await;

        let waiter = {
            let limiter = Arc::clone(&limiter);
            tokio::spawn(async move { limiter.acquire("a.com").await })
        };

        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!waiter.is_finished());

        drop(held);
        let permit = tokio::time::timeout(Duration::from_secs(1), waiter)
            .await
            .expect("waiter should be granted the slot")
            .unwrap();
        assert_eq!(permit.host(), "a.com");
    }

    #[tokio::test]
    async fn test_permit_released_on_cancellation() {
        let limiter = Arc::new(HostRateLimiter::new(1));

        let task = {
            let limiter = Arc::clone(&limiter);
            tokio::spawn(async move {
                let _permit = limiter.acquire("a.com").await;
                std::future::pending::<()>().await;
            })
        };

        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(limiter.status("a.com").unwrap().available, 0);

        task.abort();
        let _ = task.await;
        assert_eq!(limiter.status("a.com").unwrap().available, 1);
    }

    #[test]
    fn test_all_status_sorted() {
        let limiter = HostRateLimiter::default();
        let _b = limiter.try_acquire("b.com");
        let _a = limiter.try_acquire("a.com");

        let statuses = limiter.all_status();
        let hosts: Vec<_> = statuses.iter().map(|s| s.host.as_str()).collect();
        assert_eq!(hosts, vec!["a.com", "b.com"]);
        assert_eq!(statuses[0].limit, DEFAULT_PER_HOST_LIMIT);
    }
}
