//! Configuration Loader
//!
//! Layers configuration sources with the `config` crate: built-in defaults,
//! then an optional TOML file, then `TAO_*` environment variables
//! (`TAO_JOB__SELECTOR=balanced`, `TAO_WORKER__ACTIVE_NODES=4`).

use super::error::{ConfigResult, ConfigurationError};
use super::OrchestrationConfig;
use crate::constants::defaults;
use config::{Config, Environment, File};
use std::env;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info};

/// Loaded and validated configuration
#[derive(Debug)]
pub struct ConfigManager {
    config: OrchestrationConfig,
    source_file: Option<PathBuf>,
}

impl ConfigManager {
    /// Load configuration from `TAO_CONFIG_FILE` or the default location
    pub fn load() -> ConfigResult<Arc<ConfigManager>> {
        Self::load_from(None)
    }

    /// Load configuration, reading `path` when given.
    ///
    /// An explicit path (argument or `TAO_CONFIG_FILE`) must exist; the
    /// default `config/orchestration.toml` is optional.
    pub fn load_from(path: Option<&Path>) -> ConfigResult<Arc<ConfigManager>> {
        let explicit = path
            .map(Path::to_path_buf)
            .or_else(|| env::var(defaults::CONFIG_FILE_ENV).ok().map(PathBuf::from));

        let (file, required) = match explicit {
            Some(file) => {
                if !file.is_file() {
                    return Err(ConfigurationError::ConfigFileNotFound {
                        path: file.display().to_string(),
                    });
                }
                (file, true)
            }
            None => (PathBuf::from(defaults::CONFIG_FILE), false),
        };

        debug!(file = %file.display(), required = required, "Loading orchestration configuration");

        let config: OrchestrationConfig = Config::builder()
            .add_source(Config::try_from(&OrchestrationConfig::default())?)
            .add_source(File::from(file.as_path()).required(required))
            .add_source(
                Environment::with_prefix(defaults::ENV_PREFIX)
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?
            .try_deserialize()?;

        config.validate()?;

        let source_file = file.is_file().then_some(file);
        info!(
            selector = %config.job.selector,
            queue_file = %config.queue.queue_file().display(),
            max_jobs = config.worker.max_jobs(),
            source_file = ?source_file,
            "Configuration loaded successfully"
        );

        Ok(Arc::new(ConfigManager { config, source_file }))
    }

    /// Wrap an already built configuration
    pub fn from_config(config: OrchestrationConfig) -> ConfigResult<Arc<ConfigManager>> {
        config.validate()?;
        Ok(Arc::new(ConfigManager {
            config,
            source_file: None,
        }))
    }

    pub fn config(&self) -> &OrchestrationConfig {
        &self.config
    }

    /// File the configuration was read from, if any
    pub fn source_file(&self) -> Option<&Path> {
        self.source_file.as_deref()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_load_from_toml_file() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(
            file,
            "[job]\nselector = \"balanced\"\n\n[worker]\nactive_nodes = 3\njobs_per_node = 4\n"
        )
        .unwrap();

        let manager = ConfigManager::load_from(Some(file.path())).unwrap();

        assert_eq!(manager.config().job.selector, "balanced");
        assert_eq!(manager.config().worker.max_jobs(), 12);
        assert_eq!(manager.config().queue.file_name, "wait_jobs.json");
        assert_eq!(manager.source_file(), Some(file.path()));
    }

    #[test]
    fn test_missing_explicit_file_is_an_error() {
        let result = ConfigManager::load_from(Some(Path::new("/nonexistent/orchestration.toml")));
        assert!(matches!(result, Err(ConfigurationError::ConfigFileNotFound { .. })));
    }

    #[test]
    fn test_invalid_values_are_rejected() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(file, "[queue]\npoll_interval_ms = 0\n").unwrap();

        let result = ConfigManager::load_from(Some(file.path()));
        assert!(matches!(result, Err(ConfigurationError::InvalidValue { .. })));
    }
}
