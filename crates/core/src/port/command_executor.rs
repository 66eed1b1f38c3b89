// Command Executor Port
// Abstraction over running a job's shell command as a subprocess.

use crate::domain::Job;
use async_trait::async_trait;
use thiserror::Error;

/// Captured output of a successful execution.
#[derive(Debug, Clone)]
pub struct ExecutionOutput {
    pub stdout: String,
    pub stderr: String,
    pub duration_ms: u64,
}

/// Execution failures. The display strings are recorded verbatim on the job
/// as its `error` diagnostic.
#[derive(Error, Debug)]
pub enum ExecutionError {
    #[error("Failed to execute command: {0}")]
    Spawn(String),

    #[error("Job timeout exceeded ({0}ms)")]
    Timeout(u64),

    #[error("Command failed with exit code {code}: {output}")]
    NonZeroExit { code: i32, output: String },

    #[error("Process killed: {0}")]
    Killed(String),

    #[error("IO error during execution: {0}")]
    Io(String),
}

/// Command Executor trait
///
/// The production implementation spawns through the platform shell and
/// tracks active children by job id so shutdown and cancel-running requests
/// can terminate them.
#[async_trait]
pub trait CommandExecutor: Send + Sync {
    /// Run the job's command under its `timeout_ms` and capture output.
    async fn execute(&self, job: &Job) -> Result<ExecutionOutput, ExecutionError>;

    /// Terminate the child running `job_id`, graceful first, forceful after
    /// the grace period. Returns false when no child is registered for the id.
    async fn kill(&self, job_id: &str) -> Result<bool, ExecutionError>;

    /// Job ids with a currently-running child.
    fn active_jobs(&self) -> Vec<String>;
}

// ============================================================================
// Mock Implementations for Testing
// ============================================================================

pub mod mocks {
    use super::*;
    use std::sync::{Arc, Mutex};
    use std::time::Duration;

    /// Mock executor behavior
    #[derive(Debug, Clone)]
    pub enum MockBehavior {
        /// Always succeed.
        Success,
        /// Always fail with the given diagnostic.
        Fail(String),
        /// Panic with the given message (for panic isolation testing).
        Panic(String),
        /// Sleep before succeeding (for shutdown testing).
        Sleep(Duration),
    }

    /// Mock Command Executor for testing
    pub struct MockCommandExecutor {
        behavior: Arc<Mutex<MockBehavior>>,
        call_count: Arc<Mutex<usize>>,
    }

    impl MockCommandExecutor {
        pub fn new(behavior: MockBehavior) -> Self {
            Self {
                behavior: Arc::new(Mutex::new(behavior)),
                call_count: Arc::new(Mutex::new(0)),
            }
        }

        pub fn new_success() -> Self {
            Self::new(MockBehavior::Success)
        }

        pub fn new_fail(message: impl Into<String>) -> Self {
            Self::new(MockBehavior::Fail(message.into()))
        }

        pub fn new_panicking(message: impl Into<String>) -> Self {
            Self::new(MockBehavior::Panic(message.into()))
        }

        pub fn call_count(&self) -> usize {
            *self.call_count.lock().unwrap()
        }
    }

    #[async_trait]
    impl CommandExecutor for MockCommandExecutor {
        async fn execute(&self, _job: &Job) -> Result<ExecutionOutput, ExecutionError> {
            *self.call_count.lock().unwrap() += 1;

            let behavior = self.behavior.lock().unwrap().clone();

            match behavior {
                MockBehavior::Success => Ok(ExecutionOutput {
                    stdout: "mock output".to_string(),
                    stderr: String::new(),
                    duration_ms: 1,
                }),
                MockBehavior::Fail(msg) => Err(ExecutionError::NonZeroExit {
                    code: 1,
                    output: msg,
                }),
                MockBehavior::Panic(msg) => panic!("{}", msg),
                MockBehavior::Sleep(d) => {
                    tokio::time::sleep(d).await;
                    Ok(ExecutionOutput {
                        stdout: String::new(),
                        stderr: String::new(),
                        duration_ms: d.as_millis() as u64,
                    })
                }
            }
        }

        async fn kill(&self, _job_id: &str) -> Result<bool, ExecutionError> {
            Ok(false)
        }

        fn active_jobs(&self) -> Vec<String> {
            Vec::new()
        }
    }
}
