//! Configuration Loader
//!
//! Environment-aware configuration loading. Sources are layered in order:
//! built-in defaults, a base file, an environment-specific overlay file, then
//! `PARTITION_BATCH_*` environment variables.

use config::{Config, Environment, File};
use std::env;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::debug;

use super::BatchConfig;
use crate::constants::CONFIG_ENV_PREFIX;
use crate::error::{BatchError, Result};

/// Base name of configuration files looked up in a directory
const CONFIG_FILE_STEM: &str = "partition-batch";

/// Loaded and validated configuration
#[derive(Debug, Clone)]
pub struct ConfigManager {
    config: BatchConfig,
    environment: String,
    source: Option<PathBuf>,
}

impl ConfigManager {
    /// Defaults overridden by `PARTITION_BATCH_*` environment variables
    pub fn from_env() -> Result<Arc<ConfigManager>> {
        Self::build(Config::builder(), CONFIG_ENV_PREFIX, None)
    }

    /// Load a single file (format inferred from its extension) plus environment overrides
    pub fn load_from_file(path: impl AsRef<Path>) -> Result<Arc<ConfigManager>> {
        Self::load_from_file_with_prefix(path, CONFIG_ENV_PREFIX)
    }

    /// Like [`ConfigManager::load_from_file`] with an explicit environment variable prefix.
    /// Useful for tests that must not observe the process environment.
    pub fn load_from_file_with_prefix(
        path: impl AsRef<Path>,
        env_prefix: &str,
    ) -> Result<Arc<ConfigManager>> {
        let path = path.as_ref();
        if !path.is_file() {
            return Err(BatchError::configuration(format!(
                "Configuration file not found: {}",
                path.display()
            )));
        }

        let builder = Config::builder().add_source(File::from(path).required(true));
        Self::build(builder, env_prefix, Some(path.to_path_buf()))
    }

    /// Load `partition-batch.<ext>` and `partition-batch.<environment>.<ext>` from a
    /// directory. Both files are optional.
    pub fn load_from_directory_with_env(
        config_dir: impl AsRef<Path>,
        environment: &str,
    ) -> Result<Arc<ConfigManager>> {
        let config_dir = config_dir.as_ref();
        let base = config_dir.join(CONFIG_FILE_STEM);
        let overlay = config_dir.join(format!("{CONFIG_FILE_STEM}.{environment}"));

        debug!(
            "Loading configuration for environment '{}' from directory: {}",
            environment,
            config_dir.display()
        );

        let builder = Config::builder()
            .add_source(File::with_name(&base.to_string_lossy()).required(false))
            .add_source(File::with_name(&overlay.to_string_lossy()).required(false));

        let mut manager = Self::build(builder, CONFIG_ENV_PREFIX, Some(config_dir.to_path_buf()))?;
        Arc::make_mut(&mut manager).environment = environment.to_string();
        Ok(manager)
    }

    fn build(
        builder: config::ConfigBuilder<config::builder::DefaultState>,
        env_prefix: &str,
        source: Option<PathBuf>,
    ) -> Result<Arc<ConfigManager>> {
        let settings = builder
            .add_source(Environment::with_prefix(env_prefix).try_parsing(true))
            .build()
            .map_err(|e| BatchError::configuration(format!("Failed to read configuration: {e}")))?;

        let config: BatchConfig = settings.try_deserialize().map_err(|e| {
            BatchError::configuration(format!("Failed to deserialize configuration: {e}"))
        })?;

        config.validate()?;

        debug!(
            batch_size = config.batch_size,
            max_parallelism = ?config.max_parallelism,
            table_pool_size = config.table_pool_size,
            scan_page_size = ?config.scan_page_size,
            cancel_siblings_on_failure = config.cancel_siblings_on_failure,
            "Configuration loaded successfully"
        );

        Ok(Arc::new(ConfigManager {
            config,
            environment: Self::detect_environment(),
            source,
        }))
    }

    /// Get the loaded configuration
    pub fn config(&self) -> &BatchConfig {
        &self.config
    }

    /// Get the current environment
    pub fn environment(&self) -> &str {
        &self.environment
    }

    /// File or directory the configuration was read from, if any
    pub fn source(&self) -> Option<&Path> {
        self.source.as_deref()
    }

    /// Detect current environment: PARTITION_BATCH_ENV || APP_ENV || 'development'
    pub fn detect_environment() -> String {
        env::var("PARTITION_BATCH_ENV")
            .or_else(|_| env::var("APP_ENV"))
            .unwrap_or_else(|_| "development".to_string())
            .to_lowercase()
    }
}
