// Job Domain Model

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::domain::error::{DomainError, Result};

/// Job ID (caller-supplied or generated)
pub type JobId = String;

/// Job lifecycle states
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobState {
    Pending,
    Processing,
    Failed,
    Completed,
    Dead,
    Cancelled,
}

impl JobState {
    /// States from which a worker never picks the job up again
    /// (short of an explicit DLQ revival).
    pub fn is_terminal(&self) -> bool {
        matches!(self, JobState::Completed | JobState::Dead | JobState::Cancelled)
    }
}

impl fmt::Display for JobState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            JobState::Pending => write!(f, "pending"),
            JobState::Processing => write!(f, "processing"),
            JobState::Failed => write!(f, "failed"),
            JobState::Completed => write!(f, "completed"),
            JobState::Dead => write!(f, "dead"),
            JobState::Cancelled => write!(f, "cancelled"),
        }
    }
}

impl FromStr for JobState {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "pending" => Ok(JobState::Pending),
            "processing" => Ok(JobState::Processing),
            "failed" => Ok(JobState::Failed),
            "completed" => Ok(JobState::Completed),
            "dead" => Ok(JobState::Dead),
            "cancelled" => Ok(JobState::Cancelled),
            other => Err(format!("unknown job state: {other}")),
        }
    }
}

/// Job Entity
///
/// Timestamps are serialized as ISO-8601 UTC; the serialized form of this
/// struct is the on-disk schema of `jobs.json`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Job {
    pub id: JobId,
    pub command: String,
    pub state: JobState,

    /// 1 = highest, 5 = lowest.
    pub priority: u8,

    /// Completed execution attempts.
    pub attempts: u32,
    pub max_retries: u32,

    /// Per-attempt wall-clock limit.
    pub timeout_ms: u64,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,

    /// Set only while `state == failed`: earliest reclaim time.
    #[serde(default)]
    pub next_retry_at: Option<DateTime<Utc>>,

    /// Last failure's diagnostic.
    #[serde(default)]
    pub error: Option<String>,

    #[serde(default)]
    pub locked_by: Option<String>,
    #[serde(default)]
    pub locked_at: Option<DateTime<Utc>>,
}

impl Job {
    /// Take the claim for `worker_id`.
    ///
    /// Eligibility (pending, retry-ready failed, or stale processing) is
    /// decided by the dispatch policy before this is called.
    pub fn claim(&mut self, worker_id: &str, now: DateTime<Utc>) {
        self.state = JobState::Processing;
        self.locked_by = Some(worker_id.to_string());
        self.locked_at = Some(now);
        self.updated_at = now;
    }

    /// Record a successful execution.
    pub fn complete(&mut self, now: DateTime<Utc>) -> Result<()> {
        if self.state != JobState::Processing {
            return Err(DomainError::InvalidStateTransition {
                from: self.state.to_string(),
                to: JobState::Completed.to_string(),
            });
        }
        self.state = JobState::Completed;
        self.clear_lock();
        self.updated_at = now;
        Ok(())
    }

    /// Record a failed attempt.
    ///
    /// `next_retry_at = Some(_)` reschedules the job; `None` parks it in the
    /// DLQ. The retry policy decides which.
    pub fn record_failure(
        &mut self,
        error: impl Into<String>,
        next_retry_at: Option<DateTime<Utc>>,
        now: DateTime<Utc>,
    ) -> Result<()> {
        if self.state != JobState::Processing {
            return Err(DomainError::InvalidStateTransition {
                from: self.state.to_string(),
                to: JobState::Failed.to_string(),
            });
        }
        self.attempts += 1;
        self.error = Some(error.into());
        match next_retry_at {
            Some(at) => {
                self.state = JobState::Failed;
                self.next_retry_at = Some(at);
            }
            None => {
                self.state = JobState::Dead;
                self.next_retry_at = None;
            }
        }
        self.clear_lock();
        self.updated_at = now;
        Ok(())
    }

    /// Cancel a job that is not running and not already finished.
    pub fn cancel(&mut self, now: DateTime<Utc>) -> Result<()> {
        match self.state {
            JobState::Pending | JobState::Failed | JobState::Dead => {
                self.state = JobState::Cancelled;
                self.clear_lock();
                self.updated_at = now;
                Ok(())
            }
            other => Err(DomainError::InvalidStateTransition {
                from: other.to_string(),
                to: JobState::Cancelled.to_string(),
            }),
        }
    }

    /// Revive a dead job back onto the queue with a clean slate.
    pub fn revive(&mut self, now: DateTime<Utc>) -> Result<()> {
        if self.state != JobState::Dead {
            return Err(DomainError::InvalidStateTransition {
                from: self.state.to_string(),
                to: JobState::Pending.to_string(),
            });
        }
        self.state = JobState::Pending;
        self.attempts = 0;
        self.error = None;
        self.next_retry_at = None;
        self.clear_lock();
        self.updated_at = now;
        Ok(())
    }

    fn clear_lock(&mut self) {
        self.locked_by = None;
        self.locked_at = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_job(state: JobState) -> Job {
        let t = Utc::now();
        Job {
            id: "job-1".to_string(),
            command: "echo hello".to_string(),
            state,
            priority: 5,
            attempts: 0,
            max_retries: 3,
            timeout_ms: 300_000,
            created_at: t,
            updated_at: t,
            next_retry_at: None,
            error: None,
            locked_by: None,
            locked_at: None,
        }
    }

    #[test]
    fn claim_sets_lock_fields() {
        let mut job = test_job(JobState::Pending);
        let now = Utc::now();
        job.claim("worker_1", now);

        assert_eq!(job.state, JobState::Processing);
        assert_eq!(job.locked_by.as_deref(), Some("worker_1"));
        assert_eq!(job.locked_at, Some(now));
    }

    #[test]
    fn complete_requires_processing() {
        let mut job = test_job(JobState::Pending);
        assert!(job.complete(Utc::now()).is_err());

        job.claim("worker_1", Utc::now());
        job.complete(Utc::now()).unwrap();
        assert_eq!(job.state, JobState::Completed);
        assert!(job.locked_by.is_none());
        assert!(job.locked_at.is_none());
    }

    #[test]
    fn failure_with_retry_schedules_next_attempt() {
        let mut job = test_job(JobState::Pending);
        job.claim("worker_1", Utc::now());

        let retry_at = Utc::now() + chrono::Duration::seconds(2);
        job.record_failure("exit 1", Some(retry_at), Utc::now()).unwrap();

        assert_eq!(job.state, JobState::Failed);
        assert_eq!(job.attempts, 1);
        assert_eq!(job.next_retry_at, Some(retry_at));
        assert_eq!(job.error.as_deref(), Some("exit 1"));
        assert!(job.locked_by.is_none());
    }

    #[test]
    fn failure_without_retry_goes_dead() {
        let mut job = test_job(JobState::Pending);
        job.claim("worker_1", Utc::now());
        job.record_failure("boom", None, Utc::now()).unwrap();

        assert_eq!(job.state, JobState::Dead);
        assert_eq!(job.attempts, 1);
        assert!(job.next_retry_at.is_none());
    }

    #[test]
    fn cancel_is_rejected_while_processing_or_completed() {
        let mut processing = test_job(JobState::Pending);
        processing.claim("worker_1", Utc::now());
        assert!(processing.cancel(Utc::now()).is_err());

        let mut completed = test_job(JobState::Completed);
        assert!(completed.cancel(Utc::now()).is_err());

        for state in [JobState::Pending, JobState::Failed, JobState::Dead] {
            let mut job = test_job(state);
            job.cancel(Utc::now()).unwrap();
            assert_eq!(job.state, JobState::Cancelled);
        }
    }

    #[test]
    fn revive_resets_retry_bookkeeping() {
        let mut job = test_job(JobState::Dead);
        job.attempts = 3;
        job.error = Some("kept failing".to_string());

        job.revive(Utc::now()).unwrap();

        assert_eq!(job.state, JobState::Pending);
        assert_eq!(job.attempts, 0);
        assert!(job.error.is_none());
        assert!(job.next_retry_at.is_none());

        // Only dead jobs can be revived; a second revive must be rejected.
        assert!(job.revive(Utc::now()).is_err());
    }

    #[test]
    fn state_serializes_lowercase() {
        let job = test_job(JobState::Pending);
        let json = serde_json::to_string(&job).unwrap();
        assert!(json.contains("\"state\":\"pending\""));

        let back: Job = serde_json::from_str(&json).unwrap();
        assert_eq!(back.state, JobState::Pending);
    }
}
