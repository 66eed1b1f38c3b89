// Status counts and completion metrics over a store snapshot

use crate::domain::{Job, JobState};
use crate::port::job_store::{QueueMetrics, StatusSummary};

pub fn summarize(jobs: &[Job]) -> StatusSummary {
    let mut summary = StatusSummary::default();
    for job in jobs {
        summary.count(job.state);
    }
    summary
}

/// Latency is measured only over completed jobs, as the span from enqueue to
/// completion. An empty store reports all zeros.
pub fn compute_metrics(jobs: &[Job]) -> QueueMetrics {
    let total = jobs.len();
    if total == 0 {
        return QueueMetrics::default();
    }

    let latencies: Vec<i64> = jobs
        .iter()
        .filter(|j| j.state == JobState::Completed)
        .map(|j| (j.updated_at - j.created_at).num_milliseconds())
        .collect();

    let completed = latencies.len();
    let avg_completion_ms = if completed == 0 {
        0.0
    } else {
        latencies.iter().sum::<i64>() as f64 / completed as f64
    };

    QueueMetrics {
        total,
        completed,
        success_rate: completed as f64 / total as f64,
        avg_completion_ms,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, Utc};

    fn job(id: &str, state: JobState, latency_ms: i64) -> Job {
        let created = Utc::now();
        Job {
            id: id.to_string(),
            command: "true".to_string(),
            state,
            priority: 5,
            attempts: 0,
            max_retries: 3,
            timeout_ms: 300_000,
            created_at: created,
            updated_at: created + Duration::milliseconds(latency_ms),
            next_retry_at: None,
            error: None,
            locked_by: None,
            locked_at: None,
        }
    }

    #[test]
    fn empty_store_reports_zeros() {
        let metrics = compute_metrics(&[]);
        assert_eq!(metrics.total, 0);
        assert_eq!(metrics.completed, 0);
        assert_eq!(metrics.success_rate, 0.0);
        assert_eq!(metrics.avg_completion_ms, 0.0);
    }

    #[test]
    fn latency_covers_completed_jobs_only() {
        let jobs = vec![
            job("a", JobState::Completed, 100),
            job("b", JobState::Completed, 300),
            job("c", JobState::Dead, 10_000),
            job("d", JobState::Pending, 0),
        ];
        let metrics = compute_metrics(&jobs);

        assert_eq!(metrics.total, 4);
        assert_eq!(metrics.completed, 2);
        assert_eq!(metrics.success_rate, 0.5);
        assert_eq!(metrics.avg_completion_ms, 200.0);
    }

    #[test]
    fn summary_counts_every_state() {
        let jobs = vec![
            job("a", JobState::Pending, 0),
            job("b", JobState::Pending, 0),
            job("c", JobState::Failed, 0),
            job("d", JobState::Completed, 5),
        ];
        let summary = summarize(&jobs);

        assert_eq!(summary.pending, 2);
        assert_eq!(summary.failed, 1);
        assert_eq!(summary.completed, 1);
        assert_eq!(summary.processing, 0);
        assert_eq!(summary.total(), 4);
    }
}
