//! Property-based tests for synchronization targets, the sync state machine
//! and restore planning

mod common;

use proptest::prelude::*;
use std::collections::BTreeMap;

use agjoin_core::config::AgJoinConfig;
use agjoin_core::error::ErrorKind;
use agjoin_core::models::{
    join_request::restore_needed, AvailabilityMode, BackupType, DatabaseJoinRequest,
    DatabaseStatus, SeedingMode,
};
use agjoin_core::orchestration::{PrerequisiteChecker, PrerequisiteOutcome};
use agjoin_core::server::ReplicaConnections;
use agjoin_core::state_machine::{
    ReplicaSyncMachine, ReplicaSyncState, SyncEvent, TargetSynchronizationState,
};
use agjoin_core::test_helpers::SimulationBuilder;
use common::*;

proptest! {
    #[test]
    fn test_target_exists_only_for_commit_modes(mode in availability_mode_strategy()) {
        let target = TargetSynchronizationState::for_availability_mode("SQL2", mode);
        match mode {
            AvailabilityMode::AsynchronousCommit => {
                prop_assert_eq!(target.unwrap(), TargetSynchronizationState::Synchronizing);
            }
            AvailabilityMode::SynchronousCommit => {
                prop_assert_eq!(target.unwrap(), TargetSynchronizationState::Synchronized);
            }
            _ => {
                prop_assert_eq!(target.unwrap_err().kind(), ErrorKind::UnexpectedAvailabilityMode);
            }
        }
    }

    #[test]
    fn test_synced_requires_joined_and_exact_target(
        mode in prop_oneof![
            Just(AvailabilityMode::AsynchronousCommit),
            Just(AvailabilityMode::SynchronousCommit),
        ],
        observations in prop::collection::vec((any::<bool>(), synchronization_state_strategy()), 1..20),
    ) {
        let target = TargetSynchronizationState::for_availability_mode("SQL2", mode).unwrap();
        let mut machine = ReplicaSyncMachine::new("SQL2", target, SeedingMode::Manual);

        let mut expected = ReplicaSyncState::Waiting;
        for (is_joined, state) in observations {
            if expected == ReplicaSyncState::Waiting && is_joined && target.is_reached_by(state) {
                expected = ReplicaSyncState::Synced;
            }
            prop_assert_eq!(machine.apply(&SyncEvent::observed(is_joined, state)), expected);
        }
    }

    #[test]
    fn test_seeding_failure_is_absorbing(
        observations in prop::collection::vec((any::<bool>(), synchronization_state_strategy()), 0..10),
    ) {
        let mut machine = ReplicaSyncMachine::new(
            "SQL2",
            TargetSynchronizationState::Synchronized,
            SeedingMode::Automatic,
        );
        machine.apply(&SyncEvent::SeedingFailure("out of space".to_string()));
        for (is_joined, state) in observations {
            prop_assert_eq!(
                machine.apply(&SyncEvent::observed(is_joined, state)),
                ReplicaSyncState::SeedingFailed
            );
        }
        prop_assert_eq!(machine.failure_message(), Some("out of space"));
    }

    #[test]
    fn test_restore_needed_only_for_manual_and_not_restoring(
        mode in seeding_mode_strategy(),
        existing in proptest::option::of(database_status_strategy()),
    ) {
        let expected = mode == SeedingMode::Manual && existing != Some(DatabaseStatus::Restoring);
        prop_assert_eq!(restore_needed(mode, existing.as_ref()), expected);
    }
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn test_checker_plans_restores_consistently(
        replicas in prop::collection::vec(replica_strategy(), 1..4),
        requested in proptest::option::of(seeding_mode_strategy()),
    ) {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .unwrap();

        let mut builder = SimulationBuilder::new("AG1", "SQL1").database("DB1");
        let names: Vec<String> = (0..replicas.len()).map(|i| format!("SQL{}", i + 2)).collect();
        for (name, (availability_mode, seeding_mode, _)) in names.iter().zip(&replicas) {
            builder = builder.secondary(name.clone(), *availability_mode, *seeding_mode);
        }
        let (primary, connector) = builder.build();
        primary.record_backup("DB1", BackupType::Full);
        for (name, (_, _, existing)) in names.iter().zip(&replicas) {
            if let Some(status) = existing {
                secondary(&connector, name).put_database("DB1", status.clone());
            }
        }

        let mut request = DatabaseJoinRequest::new("AG1", "DB1").with_shared_path("\\\\share");
        request.seeding_mode = requested;
        let config = AgJoinConfig::default();
        let checker = PrerequisiteChecker::new(&config, &connector, None);

        let (first, second) = runtime.block_on(async {
            let first = checker.check(&primary, &mut ReplicaConnections::new(), &request).await;
            let second = checker.check(&primary, &mut ReplicaConnections::new(), &request).await;
            (first, second)
        });
        prop_assert_eq!(&first, &second);
        prop_assert!(connector.mutations().is_empty());

        let conflicts = replicas
            .iter()
            .filter(|(_, _, existing)| *existing == Some(DatabaseStatus::Normal))
            .count();
        match first {
            PrerequisiteOutcome::Ready { plan, diagnostics } => {
                prop_assert_eq!(conflicts, 0);
                prop_assert_eq!(diagnostics.len(), replicas.len());
                let expected: BTreeMap<String, bool> = names
                    .iter()
                    .zip(&replicas)
                    .map(|(name, (_, configured, existing))| {
                        let effective = requested.unwrap_or(*configured);
                        (name.clone(), restore_needed(effective, existing.as_ref()))
                    })
                    .collect();
                prop_assert_eq!(plan.restore_needed(), expected);
            }
            PrerequisiteOutcome::Rejected(report) => {
                prop_assert_eq!(report.failures.len(), conflicts);
                prop_assert!(report
                    .failures
                    .iter()
                    .all(|failure| failure.kind() == ErrorKind::ReplicaDatabaseConflict));
                prop_assert!(!report.halts_invocation);
            }
        }
    }
}
