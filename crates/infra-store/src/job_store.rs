// File-backed JobStore
//
// One transaction per operation: take the lock file, read jobs.json, mutate
// in memory, write back through a temp sibling + rename, release the lock.
// A failed mutation leaves the on-disk state untouched.
//
// The config tunables (max-retries, backoff-base) are read from config.json
// inside the transaction that needs them, never cached at construction, so
// a `config set` is observed by already-running workers on their next
// enqueue/fail.

use async_trait::async_trait;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::debug;

use jobq_core::application::dispatch;
use jobq_core::application::enqueue;
use jobq_core::application::retry::RetryPolicy;
use jobq_core::application::stats;
use jobq_core::domain::{Job, JobState};
use jobq_core::error::{QueueError, Result};
use jobq_core::port::id_provider::TimestampIdProvider;
use jobq_core::port::job_store::EnqueueRequest;
use jobq_core::port::time_provider::SystemTimeProvider;
use jobq_core::port::{IdProvider, JobStore, QueueMetrics, StatusSummary, TimeProvider};

use crate::config_store::FileConfigStore;
use crate::lock::LockFile;
use crate::paths::{JOBS_FILE, LOCK_FILE};

pub struct FileJobStore {
    jobs_path: PathBuf,
    lock: LockFile,
    config: FileConfigStore,
    time: Arc<dyn TimeProvider>,
    ids: Arc<dyn IdProvider>,
}

impl FileJobStore {
    /// Open the store in `data_dir`, creating the directory if needed.
    pub fn open(data_dir: &Path) -> Result<Self> {
        Self::with_providers(
            data_dir,
            Arc::new(SystemTimeProvider),
            Arc::new(TimestampIdProvider),
        )
    }

    /// Open with injected clock and id generation (deterministic tests).
    pub fn with_providers(
        data_dir: &Path,
        time: Arc<dyn TimeProvider>,
        ids: Arc<dyn IdProvider>,
    ) -> Result<Self> {
        fs::create_dir_all(data_dir)?;
        Ok(Self {
            jobs_path: data_dir.join(JOBS_FILE),
            lock: LockFile::new(data_dir.join(LOCK_FILE)),
            config: FileConfigStore::open(data_dir)?,
            time,
            ids,
        })
    }

    fn read_jobs(&self) -> Result<Vec<Job>> {
        if !self.jobs_path.exists() {
            return Ok(Vec::new());
        }
        let contents = fs::read_to_string(&self.jobs_path)?;
        if contents.trim().is_empty() {
            return Ok(Vec::new());
        }
        Ok(serde_json::from_str(&contents)?)
    }

    fn write_jobs(&self, jobs: &[Job]) -> Result<()> {
        let tmp = self.jobs_path.with_extension("json.tmp");
        fs::write(&tmp, serde_json::to_string_pretty(jobs)?)?;
        fs::rename(&tmp, &self.jobs_path)?;
        Ok(())
    }

    /// Run `f` against the collection under the lock. The closure's second
    /// return value says whether anything changed and must be written back.
    async fn transaction<T>(&self, f: impl FnOnce(&mut Vec<Job>) -> Result<(T, bool)>) -> Result<T> {
        let guard = self.lock.acquire().await?;
        let result = (|| {
            let mut jobs = self.read_jobs()?;
            let (value, dirty) = f(&mut jobs)?;
            if dirty {
                self.write_jobs(&jobs)?;
            }
            Ok(value)
        })();
        guard.release();
        result
    }

    async fn read_snapshot<T>(&self, f: impl FnOnce(&[Job]) -> T) -> Result<T> {
        self.transaction(|jobs| Ok((f(jobs), false))).await
    }

    fn mutate_job<T>(
        jobs: &mut [Job],
        job_id: &str,
        f: impl FnOnce(&mut Job) -> Result<T>,
    ) -> Result<T> {
        let job = jobs
            .iter_mut()
            .find(|j| j.id == job_id)
            .ok_or_else(|| QueueError::NotFound(format!("job {job_id}")))?;
        f(job)
    }
}

#[async_trait]
impl JobStore for FileJobStore {
    async fn enqueue(&self, request: EnqueueRequest) -> Result<Job> {
        self.transaction(|jobs| {
            let id = match &request.id {
                Some(id) => {
                    if jobs.iter().any(|j| j.id == *id) {
                        return Err(QueueError::Validation(format!(
                            "job id already exists: {id}"
                        )));
                    }
                    id.clone()
                }
                None => {
                    // Collision-free by construction; the check guards
                    // against a hand-edited jobs.json.
                    let mut id = self.ids.generate_id();
                    while jobs.iter().any(|j| j.id == id) {
                        id = self.ids.generate_id();
                    }
                    id
                }
            };

            let default_max_retries = self.config.load()?.max_retries;
            let job = enqueue::build_job(request, id, default_max_retries, self.time.now())?;
            debug!(job_id = %job.id, priority = job.priority, "job enqueued");
            jobs.push(job.clone());
            Ok((job, true))
        })
        .await
    }

    async fn claim_next(&self, worker_id: &str) -> Result<Option<Job>> {
        self.transaction(|jobs| {
            let now = self.time.now();
            match dispatch::select_next(jobs, now) {
                Some(idx) => {
                    let job = &mut jobs[idx];
                    if job.state == JobState::Processing {
                        debug!(
                            job_id = %job.id,
                            previous = job.locked_by.as_deref().unwrap_or("?"),
                            "reclaiming stale lock"
                        );
                    }
                    job.claim(worker_id, now);
                    Ok((Some(job.clone()), true))
                }
                None => Ok((None, false)),
            }
        })
        .await
    }

    async fn complete(&self, job_id: &str) -> Result<Job> {
        self.transaction(|jobs| {
            let job = Self::mutate_job(jobs, job_id, |job| {
                job.complete(self.time.now())?;
                Ok(job.clone())
            })?;
            Ok((job, true))
        })
        .await
    }

    async fn fail(&self, job_id: &str, error: &str) -> Result<Job> {
        self.transaction(|jobs| {
            // The backoff base in effect right now, not at store open time.
            let retry = RetryPolicy::new(self.config.load()?.backoff_base);
            let job = Self::mutate_job(jobs, job_id, |job| {
                let now = self.time.now();
                let next_retry_at = retry.next_retry_at(job.attempts + 1, job.max_retries, now);
                job.record_failure(error, next_retry_at, now)?;
                Ok(job.clone())
            })?;
            Ok((job, true))
        })
        .await
    }

    async fn cancel(&self, job_id: &str) -> Result<Job> {
        self.transaction(|jobs| {
            let job = Self::mutate_job(jobs, job_id, |job| {
                job.cancel(self.time.now())?;
                Ok(job.clone())
            })?;
            Ok((job, true))
        })
        .await
    }

    async fn retry_from_dlq(&self, job_id: &str) -> Result<Job> {
        self.transaction(|jobs| {
            let job = Self::mutate_job(jobs, job_id, |job| {
                job.revive(self.time.now())?;
                Ok(job.clone())
            })?;
            Ok((job, true))
        })
        .await
    }

    async fn get(&self, job_id: &str) -> Result<Option<Job>> {
        self.read_snapshot(|jobs| jobs.iter().find(|j| j.id == job_id).cloned())
            .await
    }

    async fn list(&self, state: Option<JobState>) -> Result<Vec<Job>> {
        self.read_snapshot(move |jobs| {
            let mut out: Vec<Job> = jobs
                .iter()
                .filter(|j| state.is_none_or(|s| j.state == s))
                .cloned()
                .collect();
            out.sort_by(|a, b| b.created_at.cmp(&a.created_at));
            out
        })
        .await
    }

    async fn list_dlq(&self) -> Result<Vec<Job>> {
        self.read_snapshot(|jobs| {
            let mut out: Vec<Job> = jobs
                .iter()
                .filter(|j| j.state == JobState::Dead)
                .cloned()
                .collect();
            out.sort_by(|a, b| b.updated_at.cmp(&a.updated_at));
            out
        })
        .await
    }

    async fn status(&self) -> Result<StatusSummary> {
        self.read_snapshot(|jobs| stats::summarize(jobs)).await
    }

    async fn metrics(&self) -> Result<QueueMetrics> {
        self.read_snapshot(|jobs| stats::compute_metrics(jobs)).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, Utc};
    use jobq_core::application::config::{KEY_BACKOFF_BASE, KEY_MAX_RETRIES};
    use jobq_core::port::time_provider::mocks::FixedTimeProvider;
    use tempfile::TempDir;

    fn open_store(dir: &TempDir) -> FileJobStore {
        FileJobStore::open(dir.path()).unwrap()
    }

    fn open_store_at(dir: &TempDir, time: Arc<FixedTimeProvider>) -> FileJobStore {
        FileJobStore::with_providers(dir.path(), time, Arc::new(TimestampIdProvider)).unwrap()
    }

    fn request(id: &str, command: &str) -> EnqueueRequest {
        EnqueueRequest {
            command: command.to_string(),
            id: Some(id.to_string()),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn enqueue_persists_across_store_instances() {
        let dir = TempDir::new().unwrap();
        {
            let store = open_store(&dir);
            store.enqueue(request("j1", "echo A")).await.unwrap();
        }

        // A fresh instance, as after a process restart.
        let store = open_store(&dir);
        let job = store.get("j1").await.unwrap().unwrap();
        assert_eq!(job.state, JobState::Pending);
        assert_eq!(job.command, "echo A");
        assert_eq!(job.attempts, 0);
        assert_eq!(job.max_retries, 3);
    }

    #[tokio::test]
    async fn duplicate_id_is_rejected() {
        let dir = TempDir::new().unwrap();
        let store = open_store(&dir);

        store.enqueue(request("j1", "echo A")).await.unwrap();
        let err = store.enqueue(request("j1", "echo B")).await.unwrap_err();
        assert!(matches!(err, QueueError::Validation(_)));

        // The rejected enqueue must not have altered the collection.
        assert_eq!(store.list(None).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn generated_ids_do_not_collide() {
        let dir = TempDir::new().unwrap();
        let store = open_store(&dir);

        for _ in 0..20 {
            store
                .enqueue(EnqueueRequest {
                    command: "echo generated".to_string(),
                    ..Default::default()
                })
                .await
                .unwrap();
        }
        assert_eq!(store.list(None).await.unwrap().len(), 20);
    }

    #[tokio::test]
    async fn claim_transitions_to_processing() {
        let dir = TempDir::new().unwrap();
        let store = open_store(&dir);
        store.enqueue(request("j1", "echo A")).await.unwrap();

        let claimed = store.claim_next("worker_1").await.unwrap().unwrap();
        assert_eq!(claimed.id, "j1");
        assert_eq!(claimed.state, JobState::Processing);
        assert_eq!(claimed.locked_by.as_deref(), Some("worker_1"));

        // Nothing else is eligible now.
        assert!(store.claim_next("worker_2").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn claim_prefers_high_priority_then_age() {
        let dir = TempDir::new().unwrap();
        let time = Arc::new(FixedTimeProvider::new(Utc::now()));
        let store = open_store_at(&dir, time.clone());

        let mut low = request("low", "echo low");
        low.priority = Some(5);
        store.enqueue(low).await.unwrap();

        time.advance(Duration::seconds(1));
        let mut high = request("high", "echo high");
        high.priority = Some(1);
        store.enqueue(high).await.unwrap();

        time.advance(Duration::seconds(1));
        let mut high_newer = request("high-newer", "echo high");
        high_newer.priority = Some(1);
        store.enqueue(high_newer).await.unwrap();

        // Priority first, then the older of the two priority-1 jobs.
        assert_eq!(store.claim_next("w").await.unwrap().unwrap().id, "high");
        assert_eq!(
            store.claim_next("w").await.unwrap().unwrap().id,
            "high-newer"
        );
        assert_eq!(store.claim_next("w").await.unwrap().unwrap().id, "low");
    }

    #[tokio::test]
    async fn failure_cycle_ends_in_the_dlq() {
        let dir = TempDir::new().unwrap();
        let time = Arc::new(FixedTimeProvider::new(Utc::now()));
        let store = open_store_at(&dir, time.clone());

        let mut req = request("j1", "exit 1");
        req.max_retries = Some(2);
        store.enqueue(req).await.unwrap();

        // First failure: rescheduled with a 2s backoff.
        store.claim_next("w").await.unwrap().unwrap();
        let job = store.fail("j1", "exit status 1").await.unwrap();
        assert_eq!(job.state, JobState::Failed);
        assert_eq!(job.attempts, 1);
        let retry_at = job.next_retry_at.unwrap();
        assert_eq!((retry_at - time.now()).num_seconds(), 2);

        // Not eligible until the backoff elapses.
        assert!(store.claim_next("w").await.unwrap().is_none());
        time.advance(Duration::seconds(3));

        // Second failure exhausts the budget.
        store.claim_next("w").await.unwrap().unwrap();
        let job = store.fail("j1", "exit status 1").await.unwrap();
        assert_eq!(job.state, JobState::Dead);
        assert_eq!(job.attempts, 2);
        assert!(job.next_retry_at.is_none());
        assert!(job.locked_by.is_none());
    }

    #[tokio::test]
    async fn config_changes_apply_to_live_stores() {
        let dir = TempDir::new().unwrap();
        let time = Arc::new(FixedTimeProvider::new(Utc::now()));
        let store = open_store_at(&dir, time.clone());

        store.enqueue(request("before", "echo A")).await.unwrap();

        // Reconfigure through a separate handle, as `jobq config set` would
        // while a worker process has the store open.
        let config = FileConfigStore::open(dir.path()).unwrap();
        config.set(KEY_MAX_RETRIES, 5.0).await.unwrap();
        config.set(KEY_BACKOFF_BASE, 3.0).await.unwrap();

        // New default picked up without reopening the store.
        let job = store.enqueue(request("after", "echo B")).await.unwrap();
        assert_eq!(job.max_retries, 5);
        assert_eq!(
            store.get("before").await.unwrap().unwrap().max_retries,
            3,
            "existing jobs keep the default they were enqueued with"
        );

        // New backoff base picked up on the next failure: 3^1 seconds.
        store.claim_next("w").await.unwrap().unwrap();
        let failed = store.fail("before", "exit status 1").await.unwrap();
        let delay = (failed.next_retry_at.unwrap() - time.now()).num_seconds();
        assert_eq!(delay, 3);
    }

    #[tokio::test]
    async fn single_retry_budget_goes_straight_to_dead() {
        let dir = TempDir::new().unwrap();
        let store = open_store(&dir);

        let mut req = request("j1", "exit 1");
        req.max_retries = Some(1);
        store.enqueue(req).await.unwrap();

        store.claim_next("w").await.unwrap().unwrap();
        let job = store.fail("j1", "exit status 1").await.unwrap();
        assert_eq!(job.state, JobState::Dead);
        assert_eq!(job.attempts, 1);
    }

    #[tokio::test]
    async fn dlq_revival_resets_the_job() {
        let dir = TempDir::new().unwrap();
        let store = open_store(&dir);

        let mut req = request("j1", "exit 1");
        req.max_retries = Some(1);
        store.enqueue(req).await.unwrap();
        store.claim_next("w").await.unwrap().unwrap();
        store.fail("j1", "exit status 1").await.unwrap();

        let revived = store.retry_from_dlq("j1").await.unwrap();
        assert_eq!(revived.state, JobState::Pending);
        assert_eq!(revived.attempts, 0);
        assert!(revived.error.is_none());
        assert!(revived.next_retry_at.is_none());

        // Idempotence law: a second revival is a precondition error.
        assert!(matches!(
            store.retry_from_dlq("j1").await.unwrap_err(),
            QueueError::Domain(_)
        ));
    }

    #[tokio::test]
    async fn cancel_preconditions() {
        let dir = TempDir::new().unwrap();
        let store = open_store(&dir);

        store.enqueue(request("j1", "echo A")).await.unwrap();
        store.cancel("j1").await.unwrap();

        // Cancelled jobs are excluded from dispatch and cannot be
        // re-cancelled.
        assert!(store.claim_next("w").await.unwrap().is_none());
        assert!(store.cancel("j1").await.is_err());

        store.enqueue(request("j2", "echo B")).await.unwrap();
        store.claim_next("w").await.unwrap().unwrap();
        assert!(matches!(
            store.cancel("j2").await.unwrap_err(),
            QueueError::Domain(_)
        ));

        store.complete("j2").await.unwrap();
        assert!(store.cancel("j2").await.is_err());
        assert!(store.complete("j2").await.is_err());
    }

    #[tokio::test]
    async fn unknown_job_is_not_found() {
        let dir = TempDir::new().unwrap();
        let store = open_store(&dir);

        for result in [
            store.complete("ghost").await,
            store.fail("ghost", "x").await,
            store.cancel("ghost").await,
            store.retry_from_dlq("ghost").await,
        ] {
            assert!(matches!(result.unwrap_err(), QueueError::NotFound(_)));
        }
    }

    #[tokio::test]
    async fn stale_processing_lock_is_reclaimed_without_attempt_bump() {
        let dir = TempDir::new().unwrap();
        let time = Arc::new(FixedTimeProvider::new(Utc::now()));
        let store = open_store_at(&dir, time.clone());

        store.enqueue(request("j1", "echo A")).await.unwrap();
        store.claim_next("worker_dead").await.unwrap().unwrap();

        // Within the horizon the claim holds.
        time.advance(Duration::minutes(4));
        assert!(store.claim_next("worker_live").await.unwrap().is_none());

        time.advance(Duration::minutes(2));
        let reclaimed = store.claim_next("worker_live").await.unwrap().unwrap();
        assert_eq!(reclaimed.id, "j1");
        assert_eq!(reclaimed.locked_by.as_deref(), Some("worker_live"));
        assert_eq!(reclaimed.attempts, 0);
    }

    #[tokio::test]
    async fn list_is_newest_first_and_filterable() {
        let dir = TempDir::new().unwrap();
        let time = Arc::new(FixedTimeProvider::new(Utc::now()));
        let store = open_store_at(&dir, time.clone());

        store.enqueue(request("first", "echo 1")).await.unwrap();
        time.advance(Duration::seconds(1));
        store.enqueue(request("second", "echo 2")).await.unwrap();

        let all = store.list(None).await.unwrap();
        assert_eq!(all[0].id, "second");
        assert_eq!(all[1].id, "first");

        let pending = store.list(Some(JobState::Pending)).await.unwrap();
        assert_eq!(pending.len(), 2);
        assert!(store
            .list(Some(JobState::Completed))
            .await
            .unwrap()
            .is_empty());
    }

    #[tokio::test]
    async fn status_and_metrics_reflect_outcomes() {
        let dir = TempDir::new().unwrap();
        let store = open_store(&dir);

        assert_eq!(store.metrics().await.unwrap().total, 0);

        store.enqueue(request("ok", "echo ok")).await.unwrap();
        store.enqueue(request("waiting", "echo later")).await.unwrap();
        store.claim_next("w").await.unwrap().unwrap();
        store.complete("ok").await.unwrap();

        let summary = store.status().await.unwrap();
        assert_eq!(summary.completed, 1);
        assert_eq!(summary.pending, 1);
        assert_eq!(summary.total(), 2);

        let metrics = store.metrics().await.unwrap();
        assert_eq!(metrics.total, 2);
        assert_eq!(metrics.completed, 1);
        assert_eq!(metrics.success_rate, 0.5);
    }

    #[tokio::test]
    async fn collection_round_trips_through_disk() {
        let dir = TempDir::new().unwrap();
        let store = open_store(&dir);

        store.enqueue(request("j1", "echo A")).await.unwrap();
        store.claim_next("w").await.unwrap().unwrap();
        store.fail("j1", "exit status 1").await.unwrap();

        let before = store.list(None).await.unwrap();
        let reopened = open_store(&dir);
        let after = reopened.list(None).await.unwrap();

        assert_eq!(
            serde_json::to_value(&before).unwrap(),
            serde_json::to_value(&after).unwrap()
        );
    }
}
