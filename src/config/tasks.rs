//! Background task lane configuration.
//!
//! # Example
//!
//! ```toml
//! [tasks]
//! web_workers = 4
//! background_workers = 1
//! queue_capacity = 1000
//! ```

use serde::{Deserialize, Serialize};

use super::ConfigError;

/// Worker pool configuration.
///
/// Each lane has its own bounded queue and its own set of workers, so a slow
/// retention sweep never holds up analytics delivery.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TasksConfig {
    /// Workers serving the `web` lane (analytics delivery).
    /// Default: 4
    #[serde(default = "default_web_workers")]
    pub web_workers: usize,

    /// Workers serving the `background` lane (retention sweeps).
    /// Default: 1
    #[serde(default = "default_background_workers")]
    pub background_workers: usize,

    /// Maximum queued tasks per lane before enqueue is rejected.
    /// Default: 1000
    #[serde(default = "default_queue_capacity")]
    pub queue_capacity: usize,
}

impl Default for TasksConfig {
    fn default() -> Self {
        Self {
            web_workers: default_web_workers(),
            background_workers: default_background_workers(),
            queue_capacity: default_queue_capacity(),
        }
    }
}

impl TasksConfig {
    pub(super) fn validate(&self) -> Result<(), ConfigError> {
        if self.web_workers == 0 || self.background_workers == 0 {
            return Err(ConfigError::Validation(
                "tasks.web_workers and tasks.background_workers must be at least 1".into(),
            ));
        }
        if self.queue_capacity == 0 {
            return Err(ConfigError::Validation(
                "tasks.queue_capacity must be at least 1".into(),
            ));
        }
        Ok(())
    }
}

fn default_web_workers() -> usize {
    4
}

fn default_background_workers() -> usize {
    1
}

fn default_queue_capacity() -> usize {
    1000
}
