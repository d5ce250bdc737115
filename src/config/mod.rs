//! # Configuration
//!
//! Explicit configuration for the join workflow. Values are read once at the
//! start of an invocation and passed into the workflow; nothing consults a
//! process-wide store mid-run.
//!
//! ## Usage
//!
//! ```rust,no_run
//! use agjoin_core::config::ConfigManager;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let manager = ConfigManager::load()?;
//! let wait = &manager.config().wait;
//! println!("polling every {:?}", wait.poll_interval());
//! # Ok(())
//! # }
//! ```

pub mod error;
pub mod loader;

use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::constants::{defaults, versions};

pub use error::{ConfigResult, ConfigurationError};
pub use loader::ConfigManager;

/// Root configuration
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct AgJoinConfig {
    /// Polling and timeout budgets for the wait loops
    pub wait: WaitConfig,

    /// Server version gates
    pub server: ServerConfig,

    /// Logging output settings
    pub logging: LoggingConfig,
}

/// Polling and timeout budgets
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct WaitConfig {
    /// Budget for an availability database object to reach `Existing`
    pub existing_timeout_seconds: u64,
    /// Budget for all secondaries to reach their target synchronization state
    pub sync_timeout_seconds: u64,
    /// Sleep between polls
    pub poll_interval_ms: u64,
    /// Surface automatic seeding progress while waiting
    pub report_seeding_progress: bool,
}

impl Default for WaitConfig {
    fn default() -> Self {
        Self {
            existing_timeout_seconds: defaults::EXISTING_TIMEOUT_SECONDS,
            sync_timeout_seconds: defaults::SYNC_TIMEOUT_SECONDS,
            poll_interval_ms: defaults::POLL_INTERVAL_MS,
            report_seeding_progress: true,
        }
    }
}

impl WaitConfig {
    pub fn existing_timeout(&self) -> Duration {
        Duration::from_secs(self.existing_timeout_seconds)
    }

    pub fn sync_timeout(&self) -> Duration {
        Duration::from_secs(self.sync_timeout_seconds)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }
}

/// Minimum server major versions for the features this crate drives
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Availability groups (SQL Server 2012)
    pub min_version_availability_groups: u32,
    /// Automatic seeding (SQL Server 2016)
    pub min_version_automatic_seeding: u32,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            min_version_availability_groups: versions::SQL_SERVER_2012,
            min_version_automatic_seeding: versions::SQL_SERVER_2016,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Filter directive used when `RUST_LOG` is unset
    pub level: Option<String>,
    /// Emit JSON lines instead of human-readable output
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: None,
            json: false,
        }
    }
}

impl AgJoinConfig {
    /// Validate cross-field constraints
    pub fn validate(&self) -> ConfigResult<()> {
        let wait = &self.wait;
        if wait.poll_interval_ms == 0 {
            return Err(ConfigurationError::invalid_value(
                "wait.poll_interval_ms",
                "0",
                "poll interval must be positive",
            ));
        }
        if wait.existing_timeout_seconds == 0 {
            return Err(ConfigurationError::invalid_value(
                "wait.existing_timeout_seconds",
                "0",
                "timeout must be positive",
            ));
        }
        if wait.sync_timeout_seconds == 0 {
            return Err(ConfigurationError::invalid_value(
                "wait.sync_timeout_seconds",
                "0",
                "timeout must be positive",
            ));
        }
        if wait.poll_interval() >= wait.existing_timeout() {
            return Err(ConfigurationError::ValidationError {
                error: format!(
                    "poll interval {}ms must be shorter than the existing-state timeout {}s",
                    wait.poll_interval_ms, wait.existing_timeout_seconds
                ),
            });
        }
        if self.server.min_version_automatic_seeding < self.server.min_version_availability_groups {
            return Err(ConfigurationError::ValidationError {
                error: "automatic seeding cannot require an older server than availability groups"
                    .to_string(),
            });
        }
        Ok(())
    }
}
