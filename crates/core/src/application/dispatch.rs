// Dispatch policy - which job a claiming worker gets next
//
// Pure functions over a frozen snapshot of the collection; the store applies
// them inside its transaction so two workers can never select the same job.

use chrono::{DateTime, Duration, Utc};

use crate::application::worker::constants::STALE_LOCK_HORIZON_MS;
use crate::domain::{Job, JobState};

/// A claim whose `locked_at` is older than the stale-lock horizon; the
/// previous holder is presumed crashed.
pub fn is_lock_stale(job: &Job, now: DateTime<Utc>) -> bool {
    job.locked_at
        .is_some_and(|at| now - at > Duration::milliseconds(STALE_LOCK_HORIZON_MS))
}

/// A job a worker may claim right now: pending, failed and past its retry
/// time, or processing under a stale lock.
pub fn is_eligible(job: &Job, now: DateTime<Utc>) -> bool {
    match job.state {
        JobState::Pending => true,
        JobState::Failed => job.next_retry_at.is_some_and(|at| at <= now),
        JobState::Processing => is_lock_stale(job, now),
        JobState::Completed | JobState::Dead | JobState::Cancelled => false,
    }
}

/// Index of the next job to hand out: best (lowest) priority first, ties
/// broken oldest `created_at` first.
pub fn select_next(jobs: &[Job], now: DateTime<Utc>) -> Option<usize> {
    jobs.iter()
        .enumerate()
        .filter(|(_, job)| is_eligible(job, now))
        .min_by(|(_, a), (_, b)| {
            a.priority
                .cmp(&b.priority)
                .then_with(|| a.created_at.cmp(&b.created_at))
        })
        .map(|(idx, _)| idx)
}
