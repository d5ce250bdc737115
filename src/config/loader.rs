//! Configuration Loader
//!
//! Environment-aware configuration loading. Sources are layered, later ones
//! winning:
//!
//! 1. built-in defaults
//! 2. `<dir>/agjoin.yaml` (optional)
//! 3. `<dir>/agjoin.<environment>.yaml` (optional)
//! 4. `AGJOIN__<SECTION>__<KEY>` environment variables

use super::error::{ConfigResult, ConfigurationError};
use super::AgJoinConfig;
use config::{Config, Environment, File};
use std::collections::HashMap;
use std::env;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info};

const ENV_PREFIX: &str = "AGJOIN";
const ENV_SEPARATOR: &str = "__";
const BASE_FILE_STEM: &str = "agjoin";

pub struct ConfigManager {
    config: AgJoinConfig,
    environment: String,
    config_directory: PathBuf,
}

impl ConfigManager {
    /// Load configuration with environment auto-detection
    pub fn load() -> ConfigResult<Arc<ConfigManager>> {
        Self::load_from_directory(None)
    }

    /// Load configuration from a specific directory
    pub fn load_from_directory(config_dir: Option<PathBuf>) -> ConfigResult<Arc<ConfigManager>> {
        let environment = Self::detect_environment();
        Self::load_with_overrides(config_dir, &environment, None)
    }

    /// Load with an explicit environment and, optionally, a fixed set of
    /// environment-variable overrides instead of the process environment.
    /// Useful for tests that must not touch global state.
    pub fn load_with_overrides(
        config_dir: Option<PathBuf>,
        environment: &str,
        overrides: Option<HashMap<String, String>>,
    ) -> ConfigResult<Arc<ConfigManager>> {
        let config_directory = config_dir.unwrap_or_else(|| PathBuf::from("config"));

        debug!(
            environment = %environment,
            directory = %config_directory.display(),
            "Loading configuration"
        );

        let base = config_directory.join(format!("{BASE_FILE_STEM}.yaml"));
        let overlay = config_directory.join(format!("{BASE_FILE_STEM}.{environment}.yaml"));

        let builder = Config::builder()
            .add_source(File::from(base.as_path()).required(false))
            .add_source(File::from(overlay.as_path()).required(false))
            .add_source(Self::environment_source(overrides));

        let config = Self::build(builder, &config_directory.display().to_string())?;

        info!(
            environment = %environment,
            existing_timeout_seconds = config.wait.existing_timeout_seconds,
            sync_timeout_seconds = config.wait.sync_timeout_seconds,
            poll_interval_ms = config.wait.poll_interval_ms,
            "Configuration loaded"
        );

        Ok(Arc::new(ConfigManager {
            config,
            environment: environment.to_string(),
            config_directory,
        }))
    }

    /// Load a single file, which must exist, with no environment overlay
    pub fn load_from_file(path: &Path) -> ConfigResult<Arc<ConfigManager>> {
        if !path.is_file() {
            return Err(ConfigurationError::ConfigFileNotFound {
                path: path.to_path_buf(),
            });
        }

        let builder = Config::builder().add_source(File::from(path).required(true));
        let config = Self::build(builder, &path.display().to_string())?;

        Ok(Arc::new(ConfigManager {
            config,
            environment: Self::detect_environment(),
            config_directory: path
                .parent()
                .map(Path::to_path_buf)
                .unwrap_or_else(|| PathBuf::from(".")),
        }))
    }

    /// Wrap an already-built configuration
    pub fn from_config(config: AgJoinConfig) -> ConfigResult<Arc<ConfigManager>> {
        config.validate()?;
        Ok(Arc::new(ConfigManager {
            config,
            environment: Self::detect_environment(),
            config_directory: PathBuf::from("config"),
        }))
    }

    pub fn config(&self) -> &AgJoinConfig {
        &self.config
    }

    pub fn environment(&self) -> &str {
        &self.environment
    }

    pub fn config_directory(&self) -> &Path {
        &self.config_directory
    }

    /// Current environment from `AGJOIN_ENV`, defaulting to development
    pub fn detect_environment() -> String {
        env::var("AGJOIN_ENV").unwrap_or_else(|_| "development".to_string())
    }

    fn environment_source(overrides: Option<HashMap<String, String>>) -> Environment {
        Environment::with_prefix(ENV_PREFIX)
            .prefix_separator(ENV_SEPARATOR)
            .separator(ENV_SEPARATOR)
            .try_parsing(true)
            .source(overrides)
    }

    fn build(
        builder: config::ConfigBuilder<config::builder::DefaultState>,
        source_name: &str,
    ) -> ConfigResult<AgJoinConfig> {
        let config: AgJoinConfig = builder
            .build()
            .and_then(Config::try_deserialize)
            .map_err(|e| ConfigurationError::load_error(source_name, e))?;

        config.validate()?;
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn test_missing_directory_yields_defaults() {
        let dir = TempDir::new().unwrap();
        let manager = ConfigManager::load_with_overrides(
            Some(dir.path().to_path_buf()),
            "test",
            Some(HashMap::new()),
        )
        .unwrap();
        assert_eq!(manager.config(), &AgJoinConfig::default());
        assert_eq!(manager.environment(), "test");
    }

    #[test]
    fn test_environment_overlay_wins_over_base() {
        let dir = TempDir::new().unwrap();
        fs::write(
            dir.path().join("agjoin.yaml"),
            "wait:\n  poll_interval_ms: 500\n  existing_timeout_seconds: 30\n",
        )
        .unwrap();
        fs::write(
            dir.path().join("agjoin.production.yaml"),
            "wait:\n  poll_interval_ms: 1000\n",
        )
        .unwrap();

        let manager = ConfigManager::load_with_overrides(
            Some(dir.path().to_path_buf()),
            "production",
            Some(HashMap::new()),
        )
        .unwrap();

        let wait = &manager.config().wait;
        assert_eq!(wait.poll_interval_ms, 1000);
        assert_eq!(wait.existing_timeout_seconds, 30);
        assert_eq!(wait.sync_timeout_seconds, 86_400);
    }

    #[test]
    fn test_environment_variables_override_files() {
        let dir = TempDir::new().unwrap();
        fs::write(
            dir.path().join("agjoin.yaml"),
            "wait:\n  report_seeding_progress: true\n",
        )
        .unwrap();

        let overrides = HashMap::from([
            (
                "AGJOIN__WAIT__REPORT_SEEDING_PROGRESS".to_string(),
                "false".to_string(),
            ),
            (
                "AGJOIN__WAIT__SYNC_TIMEOUT_SECONDS".to_string(),
                "3600".to_string(),
            ),
        ]);

        let manager =
            ConfigManager::load_with_overrides(Some(dir.path().to_path_buf()), "test", Some(overrides))
                .unwrap();

        assert!(!manager.config().wait.report_seeding_progress);
        assert_eq!(manager.config().wait.sync_timeout_seconds, 3600);
    }

    #[test]
    fn test_invalid_values_fail_validation() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("agjoin.yaml"), "wait:\n  poll_interval_ms: 0\n").unwrap();

        let result = ConfigManager::load_with_overrides(
            Some(dir.path().to_path_buf()),
            "test",
            Some(HashMap::new()),
        );
        assert!(matches!(
            result,
            Err(ConfigurationError::InvalidValue { .. })
        ));
    }

    #[test]
    fn test_load_from_missing_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nope.yaml");
        assert!(matches!(
            ConfigManager::load_from_file(&path),
            Err(ConfigurationError::ConfigFileNotFound { .. })
        ));
    }
}
