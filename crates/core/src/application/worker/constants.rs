// Engine constants (no magic values at call sites)

use std::time::Duration;

/// Sleep between claim attempts when the queue is idle.
pub const IDLE_POLL_INTERVAL: Duration = Duration::from_secs(1);

/// Sleep after a worker hits a transient store error before retrying.
pub const ERROR_RECOVERY_SLEEP: Duration = Duration::from_secs(1);

/// Bounded wait for busy workers during graceful shutdown.
pub const SHUTDOWN_WAIT: Duration = Duration::from_secs(30);

/// A claim (or the store lock file) older than this is presumed abandoned
/// by a crashed holder and is reclaimable.
pub const STALE_LOCK_HORIZON_MS: i64 = 5 * 60 * 1000;

/// Bounded wait for the store lock file.
pub const LOCK_WAIT_TIMEOUT_MS: u64 = 5_000;

/// Backoff between store lock acquisition attempts.
pub const LOCK_RETRY_INTERVAL_MS: u64 = 10;

/// Grace period between the graceful and forceful kill signals.
pub const GRACEFUL_KILL_TIMEOUT_MS: u64 = 5_000;

/// Job field defaults.
pub const DEFAULT_PRIORITY: u8 = 5;
pub const DEFAULT_MAX_RETRIES: u32 = 3;
pub const DEFAULT_TIMEOUT_MS: u64 = 300_000;
pub const DEFAULT_BACKOFF_BASE: f64 = 2.0;

/// Priority bounds (1 = highest).
pub const MIN_PRIORITY: u8 = 1;
pub const MAX_PRIORITY: u8 = 5;
