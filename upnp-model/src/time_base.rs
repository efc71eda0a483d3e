//! Refresh timestamp plus lifetime, shared by cached devices and subscriptions.

use std::time::{Duration, Instant};

/// Lifetime bookkeeping for a cache entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimeBase {
    last_refresh: Instant,
    timeout: Duration,
}

impl TimeBase {
    /// Start a lifetime of `timeout` beginning now.
    pub fn new(timeout: Duration) -> Self {
        Self {
            last_refresh: Instant::now(),
            timeout,
        }
    }

    pub fn from_secs(timeout_seconds: u64) -> Self {
        Self::new(Duration::from_secs(timeout_seconds))
    }

    pub fn last_refresh(&self) -> Instant {
        self.last_refresh
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Restart the lifetime from now, keeping the current timeout.
    pub fn refresh(&mut self) {
        self.last_refresh = Instant::now();
    }

    /// Restart the lifetime from now with a new timeout.
    pub fn reset(&mut self, timeout: Duration) {
        self.timeout = timeout;
        self.refresh();
    }

    /// Move the refresh point, e.g. to age an entry artificially.
    pub fn set_last_refresh(&mut self, at: Instant) {
        self.last_refresh = at;
    }

    pub fn elapsed(&self) -> Duration {
        self.last_refresh.elapsed()
    }

    /// Remaining lifetime; zero once expired.
    pub fn remaining(&self) -> Duration {
        self.timeout.saturating_sub(self.elapsed())
    }

    pub fn is_expired(&self) -> bool {
        self.elapsed() >= self.timeout
    }
}

impl Default for TimeBase {
    fn default() -> Self {
        Self::from_secs(1800)
    }
}
