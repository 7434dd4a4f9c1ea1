//! Login throttle.
//!
//! Each client key (the login email) owns a fixed window that starts at its
//! first attempt. Attempts are allowed while `attempts < max_attempts`; once
//! `window` has elapsed since the last reset the counter starts over.
//!
//! State is in-memory and resets on process restart. Share it via
//! `Arc<LoginThrottle>` across handler tasks.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use parking_lot::Mutex;

/// Throttle limits, read from `LOGIN_MAX_ATTEMPTS` / `LOGIN_WINDOW_SECS`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ThrottleConfig {
    pub max_attempts: u32,
    pub window: Duration,
}

impl Default for ThrottleConfig {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            window: Duration::from_secs(60),
        }
    }
}

#[derive(Debug, Clone, Copy)]
struct Bucket {
    window_start: Instant,
    attempts: u32,
}

/// Outcome of a throttle check
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ThrottleDecision {
    Allowed { remaining_attempts: u32 },
    Blocked { retry_after: Duration },
}

impl ThrottleDecision {
    pub fn is_allowed(&self) -> bool {
        matches!(self, ThrottleDecision::Allowed { .. })
    }
}

pub struct LoginThrottle {
    buckets: Mutex<HashMap<String, Bucket>>,
    config: ThrottleConfig,
}

impl LoginThrottle {
    pub fn new(config: ThrottleConfig) -> Self {
        Self {
            buckets: Mutex::new(HashMap::new()),
            config,
        }
    }

    pub fn config(&self) -> ThrottleConfig {
        self.config
    }

    /// Check `key` and record the attempt when allowed
    pub fn check_and_record(&self, key: &str) -> ThrottleDecision {
        self.check_and_record_at(key, Instant::now())
    }

    pub fn check_and_record_at(&self, key: &str, now: Instant) -> ThrottleDecision {
        let mut buckets = self.buckets.lock();
        let bucket = buckets.entry(normalize_key(key)).or_insert(Bucket {
            window_start: now,
            attempts: 0,
        });

        if now.saturating_duration_since(bucket.window_start) >= self.config.window {
            bucket.window_start = now;
            bucket.attempts = 0;
        }

        if bucket.attempts < self.config.max_attempts {
            bucket.attempts += 1;
            ThrottleDecision::Allowed {
                remaining_attempts: self.config.max_attempts - bucket.attempts,
            }
        } else {
            ThrottleDecision::Blocked {
                retry_after: remaining(bucket, self.config.window, now),
            }
        }
    }

    /// Time until the window of `key` resets; zero when it is not throttled
    pub fn remaining_time(&self, key: &str) -> Duration {
        self.remaining_time_at(key, Instant::now())
    }

    pub fn remaining_time_at(&self, key: &str, now: Instant) -> Duration {
        let buckets = self.buckets.lock();
        match buckets.get(&normalize_key(key)) {
            Some(bucket) if bucket.attempts >= self.config.max_attempts => {
                remaining(bucket, self.config.window, now)
            }
            _ => Duration::ZERO,
        }
    }

    /// Forget `key`, used after a successful login
    pub fn reset(&self, key: &str) {
        self.buckets.lock().remove(&normalize_key(key));
    }

    /// Drop buckets whose window has expired (call periodically to free memory)
    pub fn cleanup(&self) {
        let now = Instant::now();
        let window = self.config.window;
        self.buckets
            .lock()
            .retain(|_, bucket| now.saturating_duration_since(bucket.window_start) < window);
    }
}

fn normalize_key(key: &str) -> String {
    key.trim().to_lowercase()
}

fn remaining(bucket: &Bucket, window: Duration, now: Instant) -> Duration {
    window.saturating_sub(now.saturating_duration_since(bucket.window_start))
}
