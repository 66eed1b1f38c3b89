// Worker pool - N worker loops plus the shutdown coordinator

use std::sync::atomic::Ordering;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::{info, warn};

use super::constants::SHUTDOWN_WAIT;
use super::shutdown::{shutdown_channel, ShutdownSender};
use super::{Worker, WorkerStats};
use crate::error::Result;
use crate::port::{CommandExecutor, JobStore};

/// Point-in-time view of one worker, for `status`.
#[derive(Debug, Clone)]
pub struct WorkerSnapshot {
    pub id: String,
    pub processed: u64,
    pub failed: u64,
    pub busy: bool,
}

/// Outcome of a graceful stop.
#[derive(Debug, Default)]
pub struct ShutdownReport {
    pub stopped: usize,
    /// Workers still busy when the shutdown deadline passed. Their in-flight
    /// jobs are reclaimed later through the stale-lock horizon.
    pub orphaned: Vec<String>,
    /// Final per-worker counters.
    pub workers: Vec<WorkerSnapshot>,
}

impl ShutdownReport {
    pub fn is_clean(&self) -> bool {
        self.orphaned.is_empty()
    }
}

struct PoolEntry {
    id: String,
    stats: Arc<WorkerStats>,
    handle: JoinHandle<()>,
}

/// Owns the worker loops of one process.
pub struct WorkerPool {
    store: Arc<dyn JobStore>,
    executor: Arc<dyn CommandExecutor>,
    shutdown: ShutdownSender,
    workers: Vec<PoolEntry>,
}

impl WorkerPool {
    pub fn new(store: Arc<dyn JobStore>, executor: Arc<dyn CommandExecutor>) -> Self {
        let (shutdown, _) = shutdown_channel();
        Self {
            store,
            executor,
            shutdown,
            workers: Vec::new(),
        }
    }

    /// Spawn `count` workers with ids `worker_1..worker_count`.
    pub fn start(&mut self, count: usize) {
        for n in 1..=count {
            let id = format!("worker_{n}");
            let worker = Worker::new(
                id.clone(),
                Arc::clone(&self.store),
                Arc::clone(&self.executor),
            );
            let stats = worker.stats();
            let token = self.shutdown.token();
            let handle = tokio::spawn(async move { worker.run(token).await });
            self.workers.push(PoolEntry { id, stats, handle });
        }
        info!(count, "worker pool started");
    }

    pub fn snapshot(&self) -> Vec<WorkerSnapshot> {
        self.workers
            .iter()
            .map(|w| WorkerSnapshot {
                id: w.id.clone(),
                processed: w.stats.processed.load(Ordering::SeqCst),
                failed: w.stats.failed.load(Ordering::SeqCst),
                busy: w.stats.busy.load(Ordering::SeqCst),
            })
            .collect()
    }

    /// Terminate the child of a running job (graceful, then forceful). The
    /// job's disposition then follows the normal failure handling.
    pub async fn cancel_running(&self, job_id: &str) -> Result<bool> {
        Ok(self.executor.kill(job_id).await?)
    }

    /// Graceful stop: no new claims, busy workers get a bounded wait, and
    /// whoever is still running afterwards is reported as orphaned.
    pub async fn stop(&mut self) -> ShutdownReport {
        self.shutdown.shutdown();

        let deadline = tokio::time::Instant::now() + SHUTDOWN_WAIT;
        let mut report = ShutdownReport::default();

        for entry in self.workers.drain(..) {
            let remaining = deadline.saturating_duration_since(tokio::time::Instant::now());
            match tokio::time::timeout(remaining, entry.handle).await {
                Ok(_) => report.stopped += 1,
                Err(_) => {
                    warn!(worker = %entry.id, "worker still busy at shutdown deadline");
                    report.orphaned.push(entry.id.clone());
                }
            }
            report.workers.push(WorkerSnapshot {
                id: entry.id,
                processed: entry.stats.processed.load(Ordering::SeqCst),
                failed: entry.stats.failed.load(Ordering::SeqCst),
                busy: entry.stats.busy.load(Ordering::SeqCst),
            });
        }

        // Fresh channel so the pool can be started again.
        let (shutdown, _) = shutdown_channel();
        self.shutdown = shutdown;

        info!(
            stopped = report.stopped,
            orphaned = report.orphaned.len(),
            "worker pool stopped"
        );
        report
    }
}
