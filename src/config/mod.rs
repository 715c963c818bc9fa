//! # Orchestration Configuration
//!
//! Typed configuration for the job queue, the queue worker and job selection.
//! Every field has a default, so an empty source yields a usable
//! configuration; [`ConfigManager`] layers a TOML file and `TAO_*`
//! environment overrides on top.
//!
//! ```rust,no_run
//! use tao_orchestration::config::ConfigManager;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let manager = ConfigManager::load()?;
//! let max_jobs = manager.config().worker.max_jobs();
//! let queue_file = manager.config().queue.queue_file();
//! # Ok(())
//! # }
//! ```

pub mod error;
pub mod loader;

use crate::constants::defaults;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

pub use error::{ConfigResult, ConfigurationError};
pub use loader::ConfigManager;

/// Root configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OrchestrationConfig {
    pub job: JobConfig,
    pub queue: QueueConfig,
    pub worker: WorkerConfig,
}

impl OrchestrationConfig {
    /// Reject values the queue and worker cannot operate with
    pub fn validate(&self) -> ConfigResult<()> {
        if self.queue.poll_interval_ms == 0 {
            return Err(ConfigurationError::invalid_value(
                "queue.poll_interval_ms",
                "0",
                "poll interval must be positive",
            ));
        }
        if self.queue.file_name.trim().is_empty() {
            return Err(ConfigurationError::invalid_value(
                "queue.file_name",
                self.queue.file_name.clone(),
                "queue file name must not be empty",
            ));
        }
        if self.worker.wait_interval_ms == 0 {
            return Err(ConfigurationError::invalid_value(
                "worker.wait_interval_ms",
                "0",
                "wait interval must be positive",
            ));
        }
        if self.worker.max_jobs() == 0 {
            return Err(ConfigurationError::invalid_value(
                "worker.active_nodes * worker.jobs_per_node",
                "0",
                "at least one job must be allowed to run",
            ));
        }
        Ok(())
    }
}

/// Job selection settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct JobConfig {
    /// Name of the job selection strategy
    pub selector: String,
}

impl Default for JobConfig {
    fn default() -> Self {
        Self {
            selector: defaults::JOB_SELECTOR.to_string(),
        }
    }
}

/// Durable queue settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct QueueConfig {
    pub cache_dir: PathBuf,
    pub file_name: String,
    /// Backoff between polls of an empty queue
    pub poll_interval_ms: u64,
}

impl QueueConfig {
    pub fn queue_file(&self) -> PathBuf {
        self.cache_dir.join(&self.file_name)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            cache_dir: std::env::temp_dir().join(defaults::CACHE_DIR_NAME),
            file_name: defaults::QUEUE_FILE_NAME.to_string(),
            poll_interval_ms: defaults::QUEUE_POLL_INTERVAL_MS,
        }
    }
}

/// Queue worker settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkerConfig {
    /// Timed wait while paused or at capacity
    pub wait_interval_ms: u64,
    pub jobs_per_node: usize,
    pub active_nodes: usize,
}

impl WorkerConfig {
    /// Maximum number of concurrently active jobs
    pub fn max_jobs(&self) -> usize {
        self.active_nodes.saturating_mul(self.jobs_per_node)
    }

    pub fn wait_interval(&self) -> Duration {
        Duration::from_millis(self.wait_interval_ms)
    }
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            wait_interval_ms: defaults::WORKER_WAIT_INTERVAL_MS,
            jobs_per_node: defaults::JOBS_PER_NODE,
            active_nodes: defaults::ACTIVE_NODES,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = OrchestrationConfig::default();
        assert_eq!(config.job.selector, "fifo");
        assert_eq!(config.queue.file_name, "wait_jobs.json");
        assert_eq!(config.queue.poll_interval(), Duration::from_secs(2));
        assert_eq!(config.worker.wait_interval(), Duration::from_secs(10));
        assert_eq!(config.worker.max_jobs(), 2);
        assert!(config.queue.queue_file().ends_with("tao/wait_jobs.json"));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_zero_capacity_is_rejected() {
        let mut config = OrchestrationConfig::default();
        config.worker.active_nodes = 0;
        assert!(matches!(
            config.validate(),
            Err(ConfigurationError::InvalidValue { .. })
        ));
    }

    #[test]
    fn test_partial_sections_keep_defaults() {
        let config: OrchestrationConfig =
            serde_json::from_str(r#"{"worker": {"active_nodes": 3}}"#).unwrap();
        assert_eq!(config.worker.max_jobs(), 6);
        assert_eq!(config.queue.poll_interval_ms, 2000);
    }
}
