// Application Layer - Queue Policies and Worker Orchestration

pub mod config;
pub mod dispatch;
pub mod enqueue;
pub mod retry;
pub mod stats;
pub mod worker;

// Re-exports
pub use config::QueueConfig;
pub use retry::RetryPolicy;
pub use worker::{
    shutdown_channel, ShutdownReport, ShutdownSender, ShutdownToken, Worker, WorkerPool,
    WorkerSnapshot,
};
