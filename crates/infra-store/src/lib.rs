// jobq Infrastructure - File-System Adapter
// Implements: JobStore over jobs.json, the config store, and the
// cross-process advisory lock that serializes every store transaction.

mod config_store;
mod job_store;
mod lock;
pub mod paths;

pub use config_store::FileConfigStore;
pub use job_store::FileJobStore;
pub use lock::{LockFile, LockGuard};
