//! Per-vendor rate limiting and retry backoff.
//!
//! The arithmetic is kept as pure functions so it can be property-tested
//! without a clock or a network; `TokenBucket` is the thin stateful wrapper
//! adapters actually call through.

use std::sync::Mutex;
use std::time::{Duration, Instant};

use crate::types::Vendor;

#[derive(Debug, Clone, PartialEq)]
pub enum RateLimitResult {
    Allowed,
    RateLimited { retry_after: Duration },
}

/// Pure: decide whether a request in the current window is allowed.
pub fn calculate_rate_limit(
    requests_in_window: u32,
    rate_limit: u32,
    window_start: Instant,
    now: Instant,
    window_duration: Duration,
) -> RateLimitResult {
    if now.duration_since(window_start) > window_duration {
        return RateLimitResult::Allowed;
    }

    if requests_in_window >= rate_limit {
        let retry_after = window_duration - now.duration_since(window_start);
        RateLimitResult::RateLimited { retry_after }
    } else {
        RateLimitResult::Allowed
    }
}

/// Pure: advance (or roll over) the rate-limit window, returning the new
/// `(count, window_start)`.
pub fn update_rate_limit_window(
    current_requests: u32,
    last_window_start: Instant,
    now: Instant,
    window_duration: Duration,
) -> (u32, Instant) {
    if now.duration_since(last_window_start) > window_duration {
        (1, now)
    } else {
        (current_requests + 1, last_window_start)
    }
}

/// Pure: exponential backoff, doubling per attempt and capped at `max_duration`.
pub fn calculate_backoff_duration(attempt: u32, base_duration: Duration, max_duration: Duration) -> Duration {
    let backoff_ms = base_duration.as_millis() as u64 * 2_u64.saturating_pow(attempt);
    std::cmp::min(Duration::from_millis(backoff_ms), max_duration)
}

/// Process-local, per-vendor token bucket. One instance per fetcher process,
/// as assumed by the concurrency model — state is not shared across processes.
pub struct TokenBucket {
    rate_per_second: f64,
    window: Duration,
    state: Mutex<(u32, Instant)>,
}

impl TokenBucket {
    pub fn for_vendor(vendor: Vendor) -> Self {
        Self::new(vendor.default_rps())
    }

    pub fn new(rate_per_second: f64) -> Self {
        Self {
            rate_per_second,
            window: Duration::from_secs(1),
            state: Mutex::new((0, Instant::now())),
        }
    }

    /// Snapshot for the admin/stats surface: configured rate and the number
    /// of requests already counted in the current window.
    pub fn stats(&self) -> (f64, u32) {
        let count = match self.state.lock() {
            Ok(g) => g.0,
            Err(poisoned) => poisoned.into_inner().0,
        };
        (self.rate_per_second, count)
    }

    /// Acquire a token, sleeping as needed. Never panics on a poisoned lock —
    /// it recovers the inner state and proceeds, since losing a rate-limit
    /// counter to a panicked holder is not itself a reason to fail fetching.
    pub async fn acquire(&self) {
        loop {
            let wait = {
                let mut guard = match self.state.lock() {
                    Ok(g) => g,
                    Err(poisoned) => poisoned.into_inner(),
                };
                let (count, window_start) = *guard;
                let now = Instant::now();
                let limit = self.rate_per_second.ceil() as u32;

                match calculate_rate_limit(count, limit, window_start, now, self.window) {
                    RateLimitResult::Allowed => {
                        *guard = update_rate_limit_window(count, window_start, now, self.window);
                        None
                    }
                    RateLimitResult::RateLimited { retry_after } => Some(retry_after),
                }
            };

            match wait {
                None => return,
                Some(retry_after) => tokio::time::sleep(retry_after).await,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rate_limit_allows_under_the_limit() {
        let now = Instant::now();
        let window_start = now - Duration::from_millis(500);
        let result = calculate_rate_limit(2, 3, window_start, now, Duration::from_secs(1));
        assert_eq!(result, RateLimitResult::Allowed);
    }

    #[test]
    fn rate_limit_blocks_at_the_limit() {
        let now = Instant::now();
        let window_start = now - Duration::from_millis(500);
        let result = calculate_rate_limit(3, 3, window_start, now, Duration::from_secs(1));
        match result {
            RateLimitResult::RateLimited { retry_after } => {
                assert!(retry_after > Duration::ZERO);
                assert!(retry_after <= Duration::from_millis(500));
            }
            _ => panic!("expected RateLimited"),
        }
    }

    #[test]
    fn rate_limit_allows_after_window_expires() {
        let now = Instant::now();
        let window_start = now - Duration::from_secs(2);
        let result = calculate_rate_limit(3, 3, window_start, now, Duration::from_secs(1));
        assert_eq!(result, RateLimitResult::Allowed);
    }

    #[test]
    fn update_window_rolls_over_when_expired() {
        let now = Instant::now();
        let old_start = now - Duration::from_secs(2);
        let (count, start) = update_rate_limit_window(5, old_start, now, Duration::from_secs(1));
        assert_eq!(count, 1);
        assert_eq!(start, now);
    }

    #[test]
    fn update_window_increments_within_window() {
        let now = Instant::now();
        let start = now - Duration::from_millis(100);
        let (count, returned_start) = update_rate_limit_window(5, start, now, Duration::from_secs(1));
        assert_eq!(count, 6);
        assert_eq!(returned_start, start);
    }

    #[test]
    fn backoff_doubles_and_caps() {
        let base = Duration::from_millis(100);
        let max = Duration::from_secs(5);

        assert_eq!(calculate_backoff_duration(0, base, max), Duration::from_millis(100));
        assert_eq!(calculate_backoff_duration(1, base, max), Duration::from_millis(200));
        assert_eq!(calculate_backoff_duration(2, base, max), Duration::from_millis(400));
        assert_eq!(calculate_backoff_duration(20, base, max), max);
    }
}
