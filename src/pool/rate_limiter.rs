//! Sliding-window call limiter
//!
//! Allows at most `max_calls` operations within any trailing window of `period`.
//! Both a blocking and an async `acquire` are provided; they share the same queue of
//! call timestamps and therefore the same timing.

use std::collections::VecDeque;
use std::sync::Mutex;
use std::time::{Duration, Instant};

#[derive(Debug)]
pub struct RateLimiter {
    max_calls: usize,
    period: Duration,
    calls: Mutex<VecDeque<Instant>>,
}

impl RateLimiter {
    /// Creates a limiter; `max_calls` and `period` must be non-zero
    pub fn new(max_calls: usize, period: Duration) -> Self {
        assert!(max_calls > 0, "max_calls must be > 0");
        assert!(!period.is_zero(), "period must be > 0");
        Self {
            max_calls,
            period,
            calls: Mutex::new(VecDeque::with_capacity(max_calls)),
        }
    }

    /// Blocks the calling thread until a call is allowed, then records it
    pub fn acquire(&self) {
        while let Some(wait) = self.try_record(Instant::now()) {
            std::thread::sleep(wait);
        }
    }

    /// Async counterpart of [`acquire`](Self::acquire)
    pub async fn acquire_async(&self) {
        while let Some(wait) = self.try_record(Instant::now()) {
            tokio::time::sleep(wait).await;
        }
    }

    /// Records a call at `now` if allowed; otherwise returns how long to wait
    fn try_record(&self, now: Instant) -> Option<Duration> {
        let mut calls = self.calls.lock().unwrap_or_else(|e| e.into_inner());

        while let Some(oldest) = calls.front() {
            if now.duration_since(*oldest) >= self.period {
                calls.pop_front();
            } else {
                break;
            }
        }

        if calls.len() >= self.max_calls {
            // Queue is non-empty here since max_calls > 0
            let until = calls.front().map(|oldest| *oldest + self.period)?;
            return Some(until.saturating_duration_since(now));
        }

        calls.push_back(now);
        None
    }

    /// Calls recorded within the current window
    pub fn in_flight(&self) -> usize {
        let now = Instant::now();
        let calls = self.calls.lock().unwrap_or_else(|e| e.into_inner());
        calls
            .iter()
            .filter(|t| now.duration_since(**t) < self.period)
            .count()
    }
}
