//! Per-job rate limiter for manual triggers.
//!
//! Fixed window of 10 seconds with capacity one: a job may be manually
//! triggered once per window. The limiter is advisory to the API layer
//! only; scheduled fires never consult it.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use uuid::Uuid;

use cronhook_core::error::{Error, Result};

/// Window length for manual triggers
const WINDOW: Duration = Duration::from_secs(10);
/// Table size above which stale entries are collected
const GC_THRESHOLD: usize = 100;

pub struct TriggerRateLimiter {
    window: Duration,
    entries: Mutex<HashMap<Uuid, Instant>>,
}

impl TriggerRateLimiter {
    pub fn new() -> Self {
        Self::with_window(WINDOW)
    }

    pub fn with_window(window: Duration) -> Self {
        Self {
            window,
            entries: Mutex::new(HashMap::new()),
        }
    }

    /// Consume the job's token for this window, or report the remaining
    /// wait as a `RateLimited` error.
    pub fn check(&self, job_id: Uuid) -> Result<()> {
        let now = Instant::now();
        let mut entries = self.entries.lock();

        if let Some(last) = entries.get(&job_id) {
            let elapsed = now.duration_since(*last);
            if elapsed < self.window {
                let remaining = self.window - elapsed;
                // One decimal, rounded up so the wait is never reported
                // as zero
                let retry_after_secs = (remaining.as_secs_f64() * 10.0).ceil() / 10.0;
                return Err(Error::RateLimited { retry_after_secs });
            }
        }

        entries.insert(job_id, now);

        if entries.len() > GC_THRESHOLD {
            let horizon = self.window * 2;
            entries.retain(|_, last| now.duration_since(*last) < horizon);
        }

        Ok(())
    }

    /// Drop a job's entry (e.g. after the job is deleted)
    pub fn forget(&self, job_id: Uuid) {
        self.entries.lock().remove(&job_id);
    }

    #[cfg(test)]
    fn len(&self) -> usize {
        self.entries.lock().len()
    }
}

impl Default for TriggerRateLimiter {
    fn default() -> Self {
        Self::new()
    }
}
