//! Proptest strategies over the domain enums

use proptest::prelude::*;

use agjoin_core::models::{AvailabilityMode, DatabaseStatus, SeedingMode, SynchronizationState};

pub fn availability_mode_strategy() -> impl Strategy<Value = AvailabilityMode> {
    prop_oneof![
        Just(AvailabilityMode::AsynchronousCommit),
        Just(AvailabilityMode::SynchronousCommit),
        Just(AvailabilityMode::ConfigurationOnly),
        Just(AvailabilityMode::Unknown),
    ]
}

pub fn seeding_mode_strategy() -> impl Strategy<Value = SeedingMode> {
    prop_oneof![Just(SeedingMode::Automatic), Just(SeedingMode::Manual)]
}

pub fn database_status_strategy() -> impl Strategy<Value = DatabaseStatus> {
    prop_oneof![
        Just(DatabaseStatus::Normal),
        Just(DatabaseStatus::Restoring),
        Just(DatabaseStatus::Recovering),
        Just(DatabaseStatus::Offline),
        Just(DatabaseStatus::Suspect),
        "[A-Za-z]{3,12}".prop_map(DatabaseStatus::Other),
    ]
}

pub fn synchronization_state_strategy() -> impl Strategy<Value = SynchronizationState> {
    prop_oneof![
        Just(SynchronizationState::NotSynchronizing),
        Just(SynchronizationState::Synchronizing),
        Just(SynchronizationState::Synchronized),
        Just(SynchronizationState::Reverting),
        Just(SynchronizationState::Initializing),
    ]
}

/// A secondary as (availability mode, configured seeding mode, existing database status)
pub fn replica_strategy(
) -> impl Strategy<Value = (AvailabilityMode, SeedingMode, Option<DatabaseStatus>)> {
    (
        prop_oneof![
            Just(AvailabilityMode::AsynchronousCommit),
            Just(AvailabilityMode::SynchronousCommit),
        ],
        seeding_mode_strategy(),
        proptest::option::of(prop_oneof![
            Just(DatabaseStatus::Restoring),
            Just(DatabaseStatus::Normal),
        ]),
    )
}
