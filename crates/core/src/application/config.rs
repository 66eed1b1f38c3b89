// Queue configuration - the two recognized tunables of config.json

use serde::{Deserialize, Serialize};

use crate::application::worker::constants::{DEFAULT_BACKOFF_BASE, DEFAULT_MAX_RETRIES};
use crate::error::{QueueError, Result};

pub const KEY_MAX_RETRIES: &str = "max-retries";
pub const KEY_BACKOFF_BASE: &str = "backoff-base";

/// The serialized form of this struct is the schema of `config.json`.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct QueueConfig {
    /// Default for a job's `max_retries` when the caller supplies none.
    #[serde(rename = "max-retries", default = "default_max_retries")]
    pub max_retries: u32,

    /// Base of the exponential backoff between retries.
    #[serde(rename = "backoff-base", default = "default_backoff_base")]
    pub backoff_base: f64,
}

fn default_max_retries() -> u32 {
    DEFAULT_MAX_RETRIES
}

fn default_backoff_base() -> f64 {
    DEFAULT_BACKOFF_BASE
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            max_retries: DEFAULT_MAX_RETRIES,
            backoff_base: DEFAULT_BACKOFF_BASE,
        }
    }
}

impl QueueConfig {
    /// Apply `key = value`. Only the two recognized keys are legal, and
    /// every value must be a positive number.
    pub fn set(&mut self, key: &str, value: f64) -> Result<()> {
        if !value.is_finite() || value <= 0.0 {
            return Err(QueueError::Validation(format!(
                "Config value for '{key}' must be a positive number, got {value}"
            )));
        }

        match key {
            KEY_MAX_RETRIES => {
                if value.fract() != 0.0 {
                    return Err(QueueError::Validation(format!(
                        "Config value for '{KEY_MAX_RETRIES}' must be a whole number, got {value}"
                    )));
                }
                self.max_retries = value as u32;
            }
            KEY_BACKOFF_BASE => {
                self.backoff_base = value;
            }
            other => {
                return Err(QueueError::Validation(format!(
                    "Unknown config key: {other}"
                )));
            }
        }
        Ok(())
    }

    pub fn get(&self, key: &str) -> Result<f64> {
        match key {
            KEY_MAX_RETRIES => Ok(self.max_retries as f64),
            KEY_BACKOFF_BASE => Ok(self.backoff_base),
            other => Err(QueueError::Validation(format!(
                "Unknown config key: {other}"
            ))),
        }
    }

    pub fn entries(&self) -> [(&'static str, f64); 2] {
        [
            (KEY_MAX_RETRIES, self.max_retries as f64),
            (KEY_BACKOFF_BASE, self.backoff_base),
        ]
    }
}
