// Retry policy - exponential backoff until the DLQ

use chrono::{DateTime, Duration, Utc};

use crate::application::worker::constants::DEFAULT_BACKOFF_BASE;

/// Decides between "reschedule with backoff" and "park in the DLQ" after a
/// failed attempt. The delay before attempt N+1 is `backoff_base^N` seconds
/// (2s, 4s, 8s, ... for base 2).
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    backoff_base: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(DEFAULT_BACKOFF_BASE)
    }
}

impl RetryPolicy {
    pub fn new(backoff_base: f64) -> Self {
        Self { backoff_base }
    }

    /// Earliest reclaim time for a job that just finished its
    /// `attempts_after`-th attempt, or None once the job is out of retries.
    pub fn next_retry_at(
        &self,
        attempts_after: u32,
        max_retries: u32,
        now: DateTime<Utc>,
    ) -> Option<DateTime<Utc>> {
        if attempts_after >= max_retries {
            return None;
        }
        Some(now + Duration::milliseconds(self.backoff_delay_ms(attempts_after)))
    }

    fn backoff_delay_ms(&self, attempts: u32) -> i64 {
        (self.backoff_base.powi(attempts as i32) * 1000.0) as i64
    }
}
