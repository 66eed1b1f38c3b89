// Worker - claim/execute/record loop

pub mod constants;
mod pool;
mod shutdown;

pub use pool::{ShutdownReport, WorkerPool, WorkerSnapshot};
pub use shutdown::{shutdown_channel, ShutdownSender, ShutdownToken};

use constants::*;

use crate::error::Result;
use crate::port::{CommandExecutor, JobStore};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use tokio::time::sleep;
use tracing::{error, info, warn};

/// Per-worker counters, shared with the pool for status snapshots.
#[derive(Default)]
pub struct WorkerStats {
    pub processed: AtomicU64,
    pub failed: AtomicU64,
    pub busy: AtomicBool,
}

/// A single claim-execute-record loop with a stable identifier.
pub struct Worker {
    id: String,
    store: Arc<dyn JobStore>,
    executor: Arc<dyn CommandExecutor>,
    stats: Arc<WorkerStats>,
}

impl Worker {
    pub fn new(
        id: impl Into<String>,
        store: Arc<dyn JobStore>,
        executor: Arc<dyn CommandExecutor>,
    ) -> Self {
        Self {
            id: id.into(),
            store,
            executor,
            stats: Arc::new(WorkerStats::default()),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn stats(&self) -> Arc<WorkerStats> {
        Arc::clone(&self.stats)
    }

    /// Run until shutdown is signalled. Per-job errors never escape this
    /// loop; transient store errors are logged and retried after a pause.
    pub async fn run(&self, mut shutdown: ShutdownToken) {
        info!(worker = %self.id, "worker started");
        loop {
            if shutdown.is_shutdown() {
                break;
            }
            match self.process_next().await {
                Ok(true) => {}
                Ok(false) => {
                    // Queue idle; nap until work may have arrived.
                    tokio::select! {
                        _ = sleep(IDLE_POLL_INTERVAL) => {}
                        _ = shutdown.wait() => break,
                    }
                }
                Err(e) => {
                    error!(worker = %self.id, error = %e, "worker store error");
                    tokio::select! {
                        _ = sleep(ERROR_RECOVERY_SLEEP) => {}
                        _ = shutdown.wait() => break,
                    }
                }
            }
        }
        info!(worker = %self.id, "worker stopped");
    }

    /// Claim and run one job. Returns false when nothing was eligible.
    pub async fn process_next(&self) -> Result<bool> {
        let Some(job) = self.store.claim_next(&self.id).await? else {
            return Ok(false);
        };

        self.stats.busy.store(true, Ordering::SeqCst);
        let outcome = self.execute_and_record(job).await;
        self.stats.busy.store(false, Ordering::SeqCst);

        outcome.map(|_| true)
    }

    async fn execute_and_record(&self, job: crate::domain::Job) -> Result<()> {
        info!(
            worker = %self.id,
            job_id = %job.id,
            command = %job.command,
            attempt = job.attempts + 1,
            "processing job"
        );

        // Run the executor in its own task so a panic is contained by the
        // JoinHandle instead of taking the worker loop down.
        let executor = Arc::clone(&self.executor);
        let job = Arc::new(job);
        let job_for_exec = Arc::clone(&job);
        let handle = tokio::spawn(async move { executor.execute(&job_for_exec).await });

        match handle.await {
            Ok(Ok(output)) => {
                self.store.complete(&job.id).await?;
                self.stats.processed.fetch_add(1, Ordering::SeqCst);
                info!(
                    worker = %self.id,
                    job_id = %job.id,
                    duration_ms = output.duration_ms,
                    "job completed"
                );
            }
            Ok(Err(e)) => {
                let updated = self.store.fail(&job.id, &e.to_string()).await?;
                self.stats.failed.fetch_add(1, Ordering::SeqCst);
                warn!(
                    worker = %self.id,
                    job_id = %job.id,
                    state = %updated.state,
                    attempts = updated.attempts,
                    error = %e,
                    "job failed"
                );
            }
            Err(join_err) => {
                let diagnostic = if join_err.is_panic() {
                    "Job execution panicked"
                } else {
                    "Job execution was cancelled"
                };
                self.store.fail(&job.id, diagnostic).await?;
                self.stats.failed.fetch_add(1, Ordering::SeqCst);
                error!(worker = %self.id, job_id = %job.id, error = %join_err, "job aborted");
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::JobState;
    use crate::port::command_executor::mocks::MockCommandExecutor;
    use crate::port::job_store::mocks::InMemoryJobStore;
    use crate::port::job_store::EnqueueRequest;

    fn enqueue_request(id: &str) -> EnqueueRequest {
        EnqueueRequest {
            command: "echo test".to_string(),
            id: Some(id.to_string()),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn successful_job_is_completed_and_counted() {
        let store: Arc<dyn JobStore> = Arc::new(InMemoryJobStore::new());
        let executor = Arc::new(MockCommandExecutor::new_success());
        store.enqueue(enqueue_request("j1")).await.unwrap();

        let worker = Worker::new("worker_1", Arc::clone(&store), executor.clone());
        assert!(worker.process_next().await.unwrap());

        let job = store.get("j1").await.unwrap().unwrap();
        assert_eq!(job.state, JobState::Completed);
        assert_eq!(executor.call_count(), 1);
        assert_eq!(worker.stats().processed.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn failed_job_is_rescheduled_with_diagnostic() {
        let store: Arc<dyn JobStore> = Arc::new(InMemoryJobStore::new());
        let executor = Arc::new(MockCommandExecutor::new_fail("boom"));
        store.enqueue(enqueue_request("j1")).await.unwrap();

        let worker = Worker::new("worker_1", Arc::clone(&store), executor);
        assert!(worker.process_next().await.unwrap());

        let job = store.get("j1").await.unwrap().unwrap();
        assert_eq!(job.state, JobState::Failed);
        assert_eq!(job.attempts, 1);
        assert!(job.next_retry_at.is_some());
        assert!(job.error.as_deref().unwrap().contains("exit code 1"));
        assert_eq!(worker.stats().failed.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn panicking_executor_does_not_kill_the_worker() {
        let store: Arc<dyn JobStore> = Arc::new(InMemoryJobStore::new());
        let executor = Arc::new(MockCommandExecutor::new_panicking("executor bug"));
        store.enqueue(enqueue_request("j1")).await.unwrap();

        let worker = Worker::new("worker_1", Arc::clone(&store), executor);
        assert!(worker.process_next().await.unwrap());

        let job = store.get("j1").await.unwrap().unwrap();
        assert_eq!(job.state, JobState::Failed);
        assert!(job.error.as_deref().unwrap().contains("panicked"));
    }

    #[tokio::test]
    async fn empty_queue_reports_no_work() {
        let store: Arc<dyn JobStore> = Arc::new(InMemoryJobStore::new());
        let worker = Worker::new(
            "worker_1",
            store,
            Arc::new(MockCommandExecutor::new_success()),
        );
        assert!(!worker.process_next().await.unwrap());
    }

    #[tokio::test]
    async fn run_loop_drains_queue_and_honors_shutdown() {
        let store: Arc<dyn JobStore> = Arc::new(InMemoryJobStore::new());
        let executor = Arc::new(MockCommandExecutor::new_success());
        for n in 0..3 {
            store.enqueue(enqueue_request(&format!("j{n}"))).await.unwrap();
        }

        let worker = Worker::new("worker_1", Arc::clone(&store), executor);
        let stats = worker.stats();
        let (sender, token) = shutdown_channel();

        let handle = tokio::spawn(async move { worker.run(token).await });
        tokio::time::sleep(std::time::Duration::from_millis(200)).await;
        sender.shutdown();
        tokio::time::timeout(std::time::Duration::from_secs(2), handle)
            .await
            .expect("worker did not stop after shutdown")
            .unwrap();

        assert_eq!(stats.processed.load(Ordering::SeqCst), 3);
        let summary = store.status().await.unwrap();
        assert_eq!(summary.completed, 3);
    }
}
