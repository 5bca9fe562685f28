//! Sliding-window rate limiter keyed by form identity.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;

use chrono::{DateTime, Utc};

/// Result of a rate limit check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimitDecision {
    /// Whether the attempt may proceed. Allowed attempts are recorded.
    pub allowed: bool,
    /// Time until the oldest attempt in the window expires; zero when allowed.
    pub wait_time: Duration,
}

/// Allows at most `max_attempts` per key inside any `window`-long span.
#[derive(Debug)]
pub struct RateLimiter {
    max_attempts: usize,
    window: Duration,
    attempts: Mutex<HashMap<String, Vec<DateTime<Utc>>>>,
}

impl RateLimiter {
    /// Creates a limiter.
    #[must_use]
    pub fn new(max_attempts: usize, window: Duration) -> Self {
        Self {
            max_attempts,
            window,
            attempts: Mutex::new(HashMap::new()),
        }
    }

    /// Checks and, if allowed, records an attempt for `key` at `now`.
    pub fn check(&self, key: &str, now: DateTime<Utc>) -> RateLimitDecision {
        let window = chrono::Duration::from_std(self.window).unwrap_or(chrono::Duration::MAX);
        let Ok(mut attempts) = self.attempts.lock() else {
            // A poisoned limiter must not block the form.
            return RateLimitDecision {
                allowed: true,
                wait_time: Duration::ZERO,
            };
        };

        let recent = attempts.entry(key.to_string()).or_default();
        recent.retain(|&t| now - t < window);

        if recent.len() >= self.max_attempts {
            let oldest = recent.iter().min().copied().unwrap_or(now);
            let wait_time = (oldest + window - now).to_std().unwrap_or(Duration::ZERO);
            return RateLimitDecision {
                allowed: false,
                wait_time,
            };
        }

        recent.push(now);
        RateLimitDecision {
            allowed: true,
            wait_time: Duration::ZERO,
        }
    }
}
