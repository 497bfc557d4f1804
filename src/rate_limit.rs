//! Windowed-counter rate limiter.
//!
//! Counts requests per identifier inside fixed time buckets. Exceeding the
//! per-window budget is a hard failure for the caller, not a retry signal.
//!
//! The identifier is whatever the caller hands the fetcher (an explicit
//! session id, or a per-request random one). A client that varies its id can
//! sidestep the budget; keying on a stable external identity is a policy
//! decision left to the deployment (see DESIGN.md).

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use tracing::{debug, warn};

/// Per-identifier request counter over fixed time windows.
pub struct RateLimiter {
    window: Duration,
    max_per_window: u32,
    /// (identifier, window bucket) -> request count.
    counters: Mutex<HashMap<(String, u64), u32>>,
}

impl RateLimiter {
    pub fn new(window: Duration, max_per_window: u32) -> Self {
        Self {
            window,
            max_per_window,
            counters: Mutex::new(HashMap::new()),
        }
    }

    fn current_bucket(&self) -> u64 {
        let now_ms = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_millis() as u64)
            .unwrap_or(0);
        now_ms / (self.window.as_millis() as u64).max(1)
    }

    /// Record a request for `identifier`. Returns false once the window
    /// budget is spent.
    pub fn allow(&self, identifier: &str) -> bool {
        let bucket = self.current_bucket();
        let mut counters = self.counters.lock().expect("rate limiter poisoned");
        let count = counters
            .entry((identifier.to_string(), bucket))
            .or_insert(0);
        if *count >= self.max_per_window {
            warn!(
                "rate limit exceeded for {} ({} requests this window)",
                identifier, count
            );
            return false;
        }
        *count += 1;
        true
    }

    /// Drop counters older than two windows.
    pub fn sweep(&self) {
        let bucket = self.current_bucket();
        let cutoff = bucket.saturating_sub(1);
        let mut counters = self.counters.lock().expect("rate limiter poisoned");
        let before = counters.len();
        counters.retain(|(_, b), _| *b >= cutoff);
        let removed = before - counters.len();
        if removed > 0 {
            debug!("swept {} stale rate limit counters", removed);
        }
    }

    /// Number of live counters, for diagnostics.
    pub fn counter_count(&self) -> usize {
        self.counters.lock().expect("rate limiter poisoned").len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exact_window_budget() {
        let limiter = RateLimiter::new(Duration::from_secs(30), 5);
        for _ in 0..5 {
            assert!(limiter.allow("client-a"));
        }
        assert!(!limiter.allow("client-a"));
        assert!(!limiter.allow("client-a"));
    }

    #[test]
    fn test_identifiers_independent() {
        let limiter = RateLimiter::new(Duration::from_secs(30), 2);
        assert!(limiter.allow("a"));
        assert!(limiter.allow("a"));
        assert!(!limiter.allow("a"));
        assert!(limiter.allow("b"));
    }

    #[test]
    fn test_window_elapse_resets_budget() {
        let limiter = RateLimiter::new(Duration::from_millis(50), 2);
        assert!(limiter.allow("a"));
        assert!(limiter.allow("a"));
        assert!(!limiter.allow("a"));
        std::thread::sleep(Duration::from_millis(110));
        assert!(limiter.allow("a"));
    }

    #[test]
    fn test_sweep_drops_stale_counters() {
        let limiter = RateLimiter::new(Duration::from_millis(30), 10);
        limiter.allow("a");
        assert_eq!(limiter.counter_count(), 1);
        std::thread::sleep(Duration::from_millis(100));
        limiter.sweep();
        assert_eq!(limiter.counter_count(), 0);
    }

    #[test]
    fn test_sweep_keeps_current_window() {
        let limiter = RateLimiter::new(Duration::from_secs(30), 10);
        limiter.allow("a");
        limiter.sweep();
        assert_eq!(limiter.counter_count(), 1);
    }
}
