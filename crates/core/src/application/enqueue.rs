// Enqueue - request validation and job construction

use chrono::{DateTime, Utc};

use crate::application::worker::constants::{
    DEFAULT_PRIORITY, DEFAULT_TIMEOUT_MS, MAX_PRIORITY, MIN_PRIORITY,
};
use crate::domain::{DomainError, Job, JobState};
use crate::error::{QueueError, Result};
use crate::port::job_store::EnqueueRequest;

/// Validate a request and build the pending job. Id collision checking stays
/// with the store, inside the same transaction as the insert.
pub fn build_job(
    request: EnqueueRequest,
    id: String,
    default_max_retries: u32,
    now: DateTime<Utc>,
) -> Result<Job> {
    validate_request(&request)?;

    Ok(Job {
        id,
        command: request.command,
        state: JobState::Pending,
        priority: request.priority.unwrap_or(DEFAULT_PRIORITY),
        attempts: 0,
        max_retries: request.max_retries.unwrap_or(default_max_retries),
        timeout_ms: request.timeout_ms.unwrap_or(DEFAULT_TIMEOUT_MS),
        created_at: now,
        updated_at: now,
        next_retry_at: None,
        error: None,
        locked_by: None,
        locked_at: None,
    })
}

fn validate_request(request: &EnqueueRequest) -> Result<()> {
    if request.command.trim().is_empty() {
        return Err(QueueError::Validation("Command cannot be empty".to_string()));
    }

    if let Some(priority) = request.priority {
        if !(MIN_PRIORITY..=MAX_PRIORITY).contains(&priority) {
            return Err(DomainError::InvalidPriority(priority).into());
        }
    }

    if request.max_retries == Some(0) {
        return Err(QueueError::Validation(
            "max_retries must be at least 1".to_string(),
        ));
    }

    if request.timeout_ms == Some(0) {
        return Err(QueueError::Validation(
            "timeout_ms must be positive".to_string(),
        ));
    }

    if let Some(id) = &request.id {
        if id.trim().is_empty() {
            return Err(QueueError::Validation("Job id cannot be empty".to_string()));
        }
    }

    Ok(())
}
