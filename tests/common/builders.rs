//! Estate and joiner builders shared by the integration tests

use std::sync::Arc;

use agjoin_core::config::AgJoinConfig;
use agjoin_core::models::{AvailabilityMode, SeedingMode};
use agjoin_core::orchestration::AgDatabaseJoiner;
use agjoin_core::test_helpers::{SimulatedConnector, SimulatedInstance, SimulationBuilder};

/// AG1 on SQL1 with one asynchronous, manually seeded secondary SQL2 and a
/// never-backed-up DB1
pub fn two_node_manual() -> SimulationBuilder {
    SimulationBuilder::new("AG1", "SQL1")
        .secondary("SQL2", AvailabilityMode::AsynchronousCommit, SeedingMode::Manual)
        .database("DB1")
}

/// AG1 on SQL1 with three secondaries of the given seeding mode
pub fn three_secondaries(seeding_mode: SeedingMode) -> SimulationBuilder {
    SimulationBuilder::new("AG1", "SQL1")
        .secondary("SQL2", AvailabilityMode::AsynchronousCommit, seeding_mode)
        .secondary("SQL3", AvailabilityMode::SynchronousCommit, seeding_mode)
        .secondary("SQL4", AvailabilityMode::AsynchronousCommit, seeding_mode)
        .database("DB1")
}

pub fn joiner(connector: &SimulatedConnector) -> AgDatabaseJoiner {
    joiner_with_config(connector, AgJoinConfig::default())
}

pub fn joiner_with_config(connector: &SimulatedConnector, config: AgJoinConfig) -> AgDatabaseJoiner {
    AgDatabaseJoiner::new(
        config,
        Arc::new(connector.clone()),
        Arc::new(connector.backup_service()),
    )
}

/// Short budgets so timeout paths finish quickly under paused time
pub fn short_sync_config(sync_timeout_seconds: u64) -> AgJoinConfig {
    let mut config = AgJoinConfig::default();
    config.wait.sync_timeout_seconds = sync_timeout_seconds;
    config
}

pub fn names(values: &[&str]) -> Vec<String> {
    values.iter().map(|value| value.to_string()).collect()
}

pub fn secondary(connector: &SimulatedConnector, name: &str) -> SimulatedInstance {
    connector
        .instance(name)
        .unwrap_or_else(|| panic!("no simulated server named {name}"))
}
