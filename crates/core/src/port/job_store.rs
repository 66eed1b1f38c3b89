// Job Store Port (Interface)
//
// Every operation is one atomic transaction against the shared store; the
// production adapter serializes them with a cross-process file lock.

use crate::domain::{Job, JobState};
use crate::error::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// Caller-facing enqueue input. Missing fields are filled with defaults
/// (priority 5, configured max-retries, 5-minute timeout).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EnqueueRequest {
    pub command: String,

    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub priority: Option<u8>,
    #[serde(default)]
    pub max_retries: Option<u32>,
    #[serde(default)]
    pub timeout_ms: Option<u64>,
}

/// Per-state counts for `status`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct StatusSummary {
    pub pending: usize,
    pub processing: usize,
    pub failed: usize,
    pub completed: usize,
    pub dead: usize,
    pub cancelled: usize,
}

impl StatusSummary {
    pub fn total(&self) -> usize {
        self.pending + self.processing + self.failed + self.completed + self.dead + self.cancelled
    }

    pub fn count(&mut self, state: JobState) {
        match state {
            JobState::Pending => self.pending += 1,
            JobState::Processing => self.processing += 1,
            JobState::Failed => self.failed += 1,
            JobState::Completed => self.completed += 1,
            JobState::Dead => self.dead += 1,
            JobState::Cancelled => self.cancelled += 1,
        }
    }
}

/// Derived queue metrics. All values are zero for an empty store.
#[derive(Debug, Clone, Copy, Default, Serialize)]
pub struct QueueMetrics {
    pub total: usize,
    pub completed: usize,
    /// completed / total.
    pub success_rate: f64,
    /// Mean `updated_at - created_at` over completed jobs, milliseconds.
    pub avg_completion_ms: f64,
}

/// Store interface for Job persistence and transactional mutation
#[async_trait]
pub trait JobStore: Send + Sync {
    /// Insert a new pending job. Rejects empty commands, out-of-range
    /// fields, and id collisions.
    async fn enqueue(&self, request: EnqueueRequest) -> Result<Job>;

    /// Claim the next runnable job for `worker_id` per the dispatch policy,
    /// or None when nothing is eligible.
    async fn claim_next(&self, worker_id: &str) -> Result<Option<Job>>;

    /// Mark a processing job completed.
    async fn complete(&self, job_id: &str) -> Result<Job>;

    /// Record a failed attempt; the retry policy decides between a
    /// backed-off reschedule and the DLQ, using the backoff base in effect
    /// at failure time.
    async fn fail(&self, job_id: &str, error: &str) -> Result<Job>;

    /// Cancel a pending, failed, or dead job.
    async fn cancel(&self, job_id: &str) -> Result<Job>;

    /// Revive a dead job: pending again, attempts and error reset.
    async fn retry_from_dlq(&self, job_id: &str) -> Result<Job>;

    /// Look a job up by id.
    async fn get(&self, job_id: &str) -> Result<Option<Job>>;

    /// All jobs, optionally filtered by state, newest-first by `created_at`.
    async fn list(&self, state: Option<JobState>) -> Result<Vec<Job>>;

    /// Dead jobs, newest-first by `updated_at`.
    async fn list_dlq(&self) -> Result<Vec<Job>>;

    /// Per-state counts.
    async fn status(&self) -> Result<StatusSummary>;

    /// Completion metrics.
    async fn metrics(&self) -> Result<QueueMetrics>;
}

// ============================================================================
// Mock Implementation for Testing
// ============================================================================

pub mod mocks {
    use super::*;
    use crate::application::dispatch;
    use crate::application::enqueue;
    use crate::application::retry::RetryPolicy;
    use crate::application::stats;
    use crate::error::QueueError;
    use chrono::Utc;
    use std::sync::Mutex;

    /// In-memory store sharing the real dispatch and retry policies, for
    /// worker tests that should not touch the filesystem.
    pub struct InMemoryJobStore {
        jobs: Mutex<Vec<Job>>,
        retry: RetryPolicy,
        default_max_retries: u32,
    }

    impl InMemoryJobStore {
        pub fn new() -> Self {
            Self {
                jobs: Mutex::new(Vec::new()),
                retry: RetryPolicy::default(),
                default_max_retries: 3,
            }
        }

        fn with_job<T>(
            &self,
            job_id: &str,
            f: impl FnOnce(&mut Job) -> Result<T>,
        ) -> Result<T> {
            let mut jobs = self.jobs.lock().unwrap();
            let job = jobs
                .iter_mut()
                .find(|j| j.id == job_id)
                .ok_or_else(|| QueueError::NotFound(format!("job {job_id}")))?;
            f(job)
        }
    }

    impl Default for InMemoryJobStore {
        fn default() -> Self {
            Self::new()
        }
    }

    #[async_trait]
    impl JobStore for InMemoryJobStore {
        async fn enqueue(&self, request: EnqueueRequest) -> Result<Job> {
            let mut jobs = self.jobs.lock().unwrap();
            let id = request
                .id
                .clone()
                .unwrap_or_else(|| format!("mock-{}", jobs.len() + 1));
            if jobs.iter().any(|j| j.id == id) {
                return Err(QueueError::Validation(format!("job id already exists: {id}")));
            }
            let job = enqueue::build_job(request, id, self.default_max_retries, Utc::now())?;
            jobs.push(job.clone());
            Ok(job)
        }

        async fn claim_next(&self, worker_id: &str) -> Result<Option<Job>> {
            let mut jobs = self.jobs.lock().unwrap();
            let now = Utc::now();
            Ok(dispatch::select_next(&jobs, now).map(|idx| {
                jobs[idx].claim(worker_id, now);
                jobs[idx].clone()
            }))
        }

        async fn complete(&self, job_id: &str) -> Result<Job> {
            self.with_job(job_id, |job| {
                job.complete(Utc::now())?;
                Ok(job.clone())
            })
        }

        async fn fail(&self, job_id: &str, error: &str) -> Result<Job> {
            let retry = &self.retry;
            self.with_job(job_id, |job| {
                let now = Utc::now();
                let next = retry.next_retry_at(job.attempts + 1, job.max_retries, now);
                job.record_failure(error, next, now)?;
                Ok(job.clone())
            })
        }

        async fn cancel(&self, job_id: &str) -> Result<Job> {
            self.with_job(job_id, |job| {
                job.cancel(Utc::now())?;
                Ok(job.clone())
            })
        }

        async fn retry_from_dlq(&self, job_id: &str) -> Result<Job> {
            self.with_job(job_id, |job| {
                job.revive(Utc::now())?;
                Ok(job.clone())
            })
        }

        async fn get(&self, job_id: &str) -> Result<Option<Job>> {
            let jobs = self.jobs.lock().unwrap();
            Ok(jobs.iter().find(|j| j.id == job_id).cloned())
        }

        async fn list(&self, state: Option<JobState>) -> Result<Vec<Job>> {
            let jobs = self.jobs.lock().unwrap();
            let mut out: Vec<Job> = jobs
                .iter()
                .filter(|j| state.is_none_or(|s| j.state == s))
                .cloned()
                .collect();
            out.sort_by(|a, b| b.created_at.cmp(&a.created_at));
            Ok(out)
        }

        async fn list_dlq(&self) -> Result<Vec<Job>> {
            let jobs = self.jobs.lock().unwrap();
            let mut out: Vec<Job> = jobs
                .iter()
                .filter(|j| j.state == JobState::Dead)
                .cloned()
                .collect();
            out.sort_by(|a, b| b.updated_at.cmp(&a.updated_at));
            Ok(out)
        }

        async fn status(&self) -> Result<StatusSummary> {
            let jobs = self.jobs.lock().unwrap();
            Ok(stats::summarize(&jobs))
        }

        async fn metrics(&self) -> Result<QueueMetrics> {
            let jobs = self.jobs.lock().unwrap();
            Ok(stats::compute_metrics(&jobs))
        }
    }
}
