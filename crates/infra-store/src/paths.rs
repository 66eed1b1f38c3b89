// Data directory layout

use std::path::PathBuf;

pub const JOBS_FILE: &str = "jobs.json";
pub const CONFIG_FILE: &str = "config.json";
pub const LOCK_FILE: &str = ".lock";
pub const PID_FILE: &str = "worker.pid";

pub const DATA_PATH_ENV: &str = "DATA_PATH";
pub const DEFAULT_DATA_DIR: &str = "./data";

/// Resolve the data directory: `DATA_PATH` (tilde-expanded) when set,
/// `./data` otherwise.
pub fn data_dir() -> PathBuf {
    match std::env::var(DATA_PATH_ENV) {
        Ok(path) if !path.trim().is_empty() => {
            PathBuf::from(shellexpand::tilde(&path).into_owned())
        }
        _ => PathBuf::from(DEFAULT_DATA_DIR),
    }
}
