//! # Structured Logging Module
//!
//! Environment-aware structured logging for join invocations. Output goes to
//! stderr, either human-readable or as JSON lines.

use std::sync::OnceLock;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

use crate::config::LoggingConfig;

static LOGGER_INITIALIZED: OnceLock<()> = OnceLock::new();

/// Initialize structured logging with environment-specific defaults.
///
/// `RUST_LOG` wins over the configured level; the configured level wins over
/// the environment default. Safe to call more than once.
pub fn init_structured_logging(config: &LoggingConfig) {
    LOGGER_INITIALIZED.get_or_init(|| {
        let environment = get_environment();
        let default_level = config
            .level
            .clone()
            .unwrap_or_else(|| get_log_level(&environment).to_string());

        let filter =
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&default_level));

        let layer = if config.json {
            fmt::layer()
                .with_writer(std::io::stderr)
                .with_target(true)
                .with_level(true)
                .with_ansi(false)
                .json()
                .with_filter(filter)
                .boxed()
        } else {
            fmt::layer()
                .with_writer(std::io::stderr)
                .with_target(true)
                .with_level(true)
                .with_filter(filter)
                .boxed()
        };

        // Another subscriber may already be installed by the embedding application
        if tracing_subscriber::registry().with(layer).try_init().is_err() {
            tracing::debug!("Global tracing subscriber already initialized - continuing with existing subscriber");
        }

        tracing::info!(
            environment = %environment,
            level = %default_level,
            json = config.json,
            "Structured logging initialized"
        );
    });
}

/// Current environment from `AGJOIN_ENV`
fn get_environment() -> String {
    std::env::var("AGJOIN_ENV").unwrap_or_else(|_| "development".to_string())
}

/// Default log level for an environment
fn get_log_level(environment: &str) -> &'static str {
    match environment {
        "production" => "info",
        "test" => "warn",
        _ => "debug",
    }
}

/// Log the outcome of one phase for one database
pub fn log_database_operation(
    phase: &str,
    availability_group: &str,
    database: &str,
    status: &str,
    details: Option<&str>,
) {
    tracing::info!(
        phase = %phase,
        availability_group = %availability_group,
        database = %database,
        status = %status,
        details = details,
        "DATABASE_OPERATION"
    );
}

/// Log the outcome of one phase for one replica leg of a database
pub fn log_replica_operation(
    phase: &str,
    replica: &str,
    database: &str,
    status: &str,
    details: Option<&str>,
) {
    tracing::info!(
        phase = %phase,
        replica = %replica,
        database = %database,
        status = %status,
        details = details,
        "REPLICA_OPERATION"
    );
}
