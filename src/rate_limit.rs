use std::collections::HashMap;
use std::future::Future;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::time::Instant;
use tracing::debug;

pub const DEFAULT_INTERVAL_SECS: u64 = 120;

/// Lets a guarded operation run at most once per interval per handler id.
///
/// Calls arriving inside the interval are dropped silently: the wrapped
/// future is never polled and nothing is returned.
#[derive(Debug)]
pub struct RateLimiter {
    interval: Duration,
    last_call: Mutex<HashMap<String, Instant>>,
}

impl RateLimiter {
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            last_call: Mutex::new(HashMap::new()),
        }
    }

    /// Records a permitted call for `handler_id` and returns true, or returns
    /// false if the previous permitted call is less than `interval` ago.
    pub fn try_acquire(&self, handler_id: &str) -> bool {
        let now = Instant::now();
        let mut last_call = self.last_call.lock();

        if let Some(last) = last_call.get(handler_id) {
            if now.duration_since(*last) < self.interval {
                return false;
            }
        }

        last_call.insert(handler_id.to_string(), now);
        true
    }

    /// Runs `operation` to completion if `handler_id` is outside its interval.
    ///
    /// The timestamp is taken before the operation starts, so a slow
    /// operation does not push the next window back.
    pub async fn guard<F, Fut, T>(&self, handler_id: &str, operation: F) -> Option<T>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = T>,
    {
        if !self.try_acquire(handler_id) {
            debug!("Rate limited: skipping '{}'", handler_id);
            return None;
        }
        Some(operation().await)
    }
}

impl Default for RateLimiter {
    fn default() -> Self {
        Self::new(Duration::from_secs(DEFAULT_INTERVAL_SECS))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[tokio::test(start_paused = true)]
    async fn test_first_call_runs() {
        let limiter = RateLimiter::default();
        assert_eq!(limiter.guard("handler", || async { 7 }).await, Some(7));
    }

    #[tokio::test(start_paused = true)]
    async fn test_second_call_inside_interval_is_dropped() {
        let limiter = RateLimiter::new(Duration::from_secs(120));
        let runs = AtomicUsize::new(0);

        limiter
            .guard("handler", || async { runs.fetch_add(1, Ordering::SeqCst) })
            .await;
        tokio::time::advance(Duration::from_secs(10)).await;
        let second = limiter
            .guard("handler", || async { runs.fetch_add(1, Ordering::SeqCst) })
            .await;

        assert!(second.is_none());
        assert_eq!(runs.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_call_after_interval_runs() {
        let limiter = RateLimiter::new(Duration::from_secs(120));

        assert!(limiter.try_acquire("handler"));
        tokio::time::advance(Duration::from_secs(119)).await;
        assert!(!limiter.try_acquire("handler"));
        tokio::time::advance(Duration::from_secs(1)).await;
        assert!(limiter.try_acquire("handler"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_dropped_call_does_not_extend_window() {
        let limiter = RateLimiter::new(Duration::from_secs(60));

        assert!(limiter.try_acquire("handler"));
        tokio::time::advance(Duration::from_secs(59)).await;
        assert!(!limiter.try_acquire("handler"));
        tokio::time::advance(Duration::from_secs(1)).await;
        assert!(limiter.try_acquire("handler"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_handlers_are_limited_independently() {
        let limiter = RateLimiter::default();

        assert!(limiter.try_acquire("a"));
        assert!(limiter.try_acquire("b"));
        assert!(!limiter.try_acquire("a"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_timestamp_set_before_operation_runs() {
        let limiter = RateLimiter::new(Duration::from_secs(30));

        limiter
            .guard("handler", || async {
                tokio::time::sleep(Duration::from_secs(20)).await;
            })
            .await;
        tokio::time::advance(Duration::from_secs(10)).await;

        assert!(limiter.try_acquire("handler"));
    }

    #[tokio::test]
    async fn test_zero_interval_never_limits() {
        let limiter = RateLimiter::new(Duration::ZERO);
        assert!(limiter.try_acquire("handler"));
        assert!(limiter.try_acquire("handler"));
    }
}
