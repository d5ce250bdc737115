//! Configuration files flowing into a join run

mod common;

use std::collections::HashMap;
use std::fs;
use std::time::Duration;
use tempfile::TempDir;
use tokio_util::sync::CancellationToken;

use agjoin_core::config::{ConfigManager, ConfigurationError};
use agjoin_core::error::{AgJoinError, ErrorKind};
use agjoin_core::orchestration::{JoinOptions, JoinPhase};
use agjoin_core::server::ServerInput;
use common::*;

#[test]
fn test_single_file_is_loaded_and_validated() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("agjoin.yaml");
    fs::write(
        &path,
        "wait:\n  poll_interval_ms: 250\n  sync_timeout_seconds: 600\nserver:\n  min_version_automatic_seeding: 14\n",
    )
    .unwrap();

    let manager = ConfigManager::load_from_file(&path).unwrap();
    let config = manager.config();
    assert_eq!(config.wait.poll_interval(), Duration::from_millis(250));
    assert_eq!(config.wait.sync_timeout(), Duration::from_secs(600));
    assert_eq!(config.server.min_version_automatic_seeding, 14);
    assert_eq!(config.server.min_version_availability_groups, 11);
    assert_eq!(manager.config_directory(), dir.path());
}

#[test]
fn test_poll_interval_longer_than_existing_timeout_is_rejected() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("agjoin.yaml");
    fs::write(
        &path,
        "wait:\n  poll_interval_ms: 10000\n  existing_timeout_seconds: 5\n",
    )
    .unwrap();

    let result = ConfigManager::load_from_file(&path);
    assert!(matches!(result, Err(ConfigurationError::ValidationError { .. })));
}

#[tokio::test(start_paused = true)]
async fn test_sync_timeout_from_configuration_bounds_the_wait() {
    let dir = TempDir::new().unwrap();
    fs::write(
        dir.path().join("agjoin.yaml"),
        "wait:\n  sync_timeout_seconds: 3600\n",
    )
    .unwrap();
    let overrides = HashMap::from([(
        "AGJOIN__WAIT__SYNC_TIMEOUT_SECONDS".to_string(),
        "45".to_string(),
    )]);
    let manager =
        ConfigManager::load_with_overrides(Some(dir.path().to_path_buf()), "test", Some(overrides))
            .unwrap();

    let (_primary, connector) = two_node_manual().build();
    connector.never_synchronize("SQL2");
    let started = tokio::time::Instant::now();

    let report = joiner_with_config(&connector, manager.config().clone())
        .run(
            &[ServerInput::instance("SQL1")],
            &names(&["DB1"]),
            &JoinOptions::new("AG1").with_shared_path("\\\\share"),
            &CancellationToken::new(),
        )
        .await
        .unwrap();

    let elapsed = started.elapsed();
    assert!(elapsed >= Duration::from_secs(45));
    assert!(elapsed < Duration::from_secs(60));
    let outcome = report.outcome("DB1").unwrap();
    assert_eq!(outcome.failed_phase(), Some(JoinPhase::Synchronization));
    match &outcome.errors[0] {
        AgJoinError::SyncTimeout { timeout, .. } => {
            assert_eq!(*timeout, Duration::from_secs(45));
        }
        other => panic!("expected SyncTimeout, got {other:?}"),
    }
    assert_eq!(outcome.errors[0].kind(), ErrorKind::SyncTimeout);
}
