// File-backed config store (config.json)

use std::fs;
use std::path::{Path, PathBuf};
use tracing::debug;

use jobq_core::application::config::QueueConfig;
use jobq_core::error::Result;

use crate::lock::LockFile;
use crate::paths::{CONFIG_FILE, LOCK_FILE};

/// Reads and writes the two queue tunables. Writes go through the same
/// advisory lock as job transactions, and the same temp-then-rename dance.
pub struct FileConfigStore {
    path: PathBuf,
    lock: LockFile,
}

impl FileConfigStore {
    pub fn open(data_dir: &Path) -> Result<Self> {
        fs::create_dir_all(data_dir)?;
        Ok(Self {
            path: data_dir.join(CONFIG_FILE),
            lock: LockFile::new(data_dir.join(LOCK_FILE)),
        })
    }

    /// Current configuration; defaults when the file does not exist yet.
    pub fn load(&self) -> Result<QueueConfig> {
        if !self.path.exists() {
            return Ok(QueueConfig::default());
        }
        let contents = fs::read_to_string(&self.path)?;
        if contents.trim().is_empty() {
            return Ok(QueueConfig::default());
        }
        Ok(serde_json::from_str(&contents)?)
    }

    /// Validate and persist `key = value`; returns the updated config.
    pub async fn set(&self, key: &str, value: f64) -> Result<QueueConfig> {
        let guard = self.lock.acquire().await?;
        let result = (|| {
            let mut config = self.load()?;
            config.set(key, value)?;
            self.write(&config)?;
            debug!(key, value, "config updated");
            Ok(config)
        })();
        guard.release();
        result
    }

    pub fn get(&self, key: &str) -> Result<f64> {
        self.load()?.get(key)
    }

    fn write(&self, config: &QueueConfig) -> Result<()> {
        let tmp = self.path.with_extension("json.tmp");
        fs::write(&tmp, serde_json::to_string_pretty(config)?)?;
        fs::rename(&tmp, &self.path)?;
        Ok(())
    }
}
