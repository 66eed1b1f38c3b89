// Advisory lock file - cross-process mutual exclusion for the store
//
// Acquisition is an atomic create-if-not-exists of a `.lock` sibling of the
// data file, recording the holder's pid and acquisition time. Crashed
// holders self-evict after the stale horizon, and a process can only delete
// a lock it recorded itself.

use serde::{Deserialize, Serialize};
use std::fs::{self, OpenOptions};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};
use tracing::{debug, warn};

use jobq_core::application::worker::constants::{
    LOCK_RETRY_INTERVAL_MS, LOCK_WAIT_TIMEOUT_MS, STALE_LOCK_HORIZON_MS,
};
use jobq_core::error::{QueueError, Result};

#[derive(Debug, Serialize, Deserialize)]
struct LockInfo {
    pid: u32,
    /// Milliseconds since epoch.
    timestamp: i64,
}

/// Handle to the well-known lock file path.
pub struct LockFile {
    path: PathBuf,
    wait_timeout: Duration,
}

impl LockFile {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            wait_timeout: Duration::from_millis(LOCK_WAIT_TIMEOUT_MS),
        }
    }

    pub fn with_wait_timeout(path: impl Into<PathBuf>, wait_timeout: Duration) -> Self {
        Self {
            path: path.into(),
            wait_timeout,
        }
    }

    /// Acquire the lock, evicting stale or corrupt holders, with a bounded
    /// wait. The guard releases on drop.
    pub async fn acquire(&self) -> Result<LockGuard> {
        let deadline = Instant::now() + self.wait_timeout;

        loop {
            match self.try_create() {
                Ok(()) => {
                    return Ok(LockGuard {
                        path: self.path.clone(),
                        pid: std::process::id(),
                        released: false,
                    });
                }
                Err(e) if e.kind() == ErrorKind::AlreadyExists => {
                    if self.holder_is_stale() {
                        warn!(path = %self.path.display(), "evicting stale lock file");
                        let _ = fs::remove_file(&self.path);
                        continue;
                    }
                }
                Err(e) => return Err(e.into()),
            }

            if Instant::now() >= deadline {
                return Err(QueueError::LockTimeout(self.wait_timeout.as_millis() as u64));
            }
            tokio::time::sleep(Duration::from_millis(LOCK_RETRY_INTERVAL_MS)).await;
        }
    }

    fn try_create(&self) -> std::io::Result<()> {
        let mut file = OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&self.path)?;
        let info = LockInfo {
            pid: std::process::id(),
            timestamp: chrono::Utc::now().timestamp_millis(),
        };
        let payload = serde_json::to_vec(&info).map_err(std::io::Error::other)?;
        file.write_all(&payload)?;
        Ok(())
    }

    /// A holder older than the stale horizon is presumed crashed; an
    /// unparseable lock file is treated the same way.
    fn holder_is_stale(&self) -> bool {
        match fs::read_to_string(&self.path) {
            Ok(contents) => match serde_json::from_str::<LockInfo>(&contents) {
                Ok(info) => {
                    chrono::Utc::now().timestamp_millis() - info.timestamp > STALE_LOCK_HORIZON_MS
                }
                Err(_) => true,
            },
            // Read race with a releasing holder; the acquire loop retries.
            Err(_) => false,
        }
    }
}

/// Held lock. Dropping it deletes the lock file, but only when the file
/// still records this process as the holder.
#[derive(Debug)]
pub struct LockGuard {
    path: PathBuf,
    pid: u32,
    released: bool,
}

impl LockGuard {
    pub fn release(mut self) {
        self.release_if_owner();
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn release_if_owner(&mut self) {
        if self.released {
            return;
        }
        self.released = true;

        match fs::read_to_string(&self.path) {
            Ok(contents) => match serde_json::from_str::<LockInfo>(&contents) {
                Ok(info) if info.pid == self.pid => {
                    let _ = fs::remove_file(&self.path);
                }
                Ok(info) => {
                    debug!(
                        holder = info.pid,
                        "lock file no longer ours; leaving it in place"
                    );
                }
                Err(_) => {}
            },
            Err(_) => {}
        }
    }
}

impl Drop for LockGuard {
    fn drop(&mut self) {
        self.release_if_owner();
    }
}
