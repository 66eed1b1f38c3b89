// Domain Error Types

use thiserror::Error;

#[derive(Error, Debug)]
pub enum DomainError {
    #[error("Invalid job state transition: {from} -> {to}")]
    InvalidStateTransition { from: String, to: String },

    #[error("Invalid priority: {0} (must be 1-5)")]
    InvalidPriority(u8),
}

pub type Result<T> = std::result::Result<T, DomainError>;
