//! # Seeding-Mode Reconciler
//!
//! Brings every replica's seeding mode in line with the requested mode before
//! any data moves. Modes are read fresh from the primary on every run, so a
//! replica that already has the requested mode is left alone and a second run
//! issues no alter at all. Changes are never reverted.

use tracing::{debug, info, warn};

use crate::constants::SEEDING_PERMISSION;
use crate::error::{AgJoinError, Result};
use crate::logging::log_replica_operation;
use crate::models::{JoinPlan, SeedingMode};
use crate::server::{ReplicaConnections, SqlInstance};

use super::types::PhaseReport;

#[derive(Debug, Default)]
pub struct SeedingReconciler;

impl SeedingReconciler {
    pub fn new() -> Self {
        Self
    }

    /// Alter every replica of the plan whose current mode differs from the
    /// requested one. Failures are collected per replica; `Err` is returned
    /// only when the primary cannot be read at all.
    pub async fn reconcile(
        &self,
        primary: &dyn SqlInstance,
        connections: &ReplicaConnections,
        plan: &JoinPlan,
    ) -> Result<PhaseReport> {
        let mut report = PhaseReport::default();
        let Some(desired) = plan.request.seeding_mode else {
            debug!(database = %plan.database.name, "No seeding mode requested; keeping configured modes");
            report.skipped = plan.replicas.iter().map(|r| r.name.clone()).collect();
            return Ok(report);
        };

        let ag_name = &plan.availability_group.name;
        let current = primary
            .availability_group(ag_name)
            .await?
            .ok_or_else(|| AgJoinError::AvailabilityGroupNotFound {
                instance: plan.primary.clone(),
                availability_group: ag_name.clone(),
            })?;

        for replica in &plan.replicas {
            let configured = current
                .replica(&replica.name)
                .map(|info| info.seeding_mode)
                .unwrap_or(replica.configured_seeding_mode);

            if configured == desired {
                debug!(replica = %replica.name, mode = %desired, "Seeding mode already set");
                report.skipped.push(replica.name.clone());
                continue;
            }

            match self
                .apply(primary, connections, ag_name, &replica.name, desired)
                .await
            {
                Ok(()) => {
                    info!(replica = %replica.name, from = %configured, to = %desired, "Seeding mode changed");
                    report.succeeded.push(replica.name.clone());
                }
                Err(error) => {
                    warn!(replica = %replica.name, error = %error, "Seeding mode change failed");
                    log_replica_operation(
                        crate::constants::phases::SEEDING_MODE,
                        &replica.name,
                        &plan.database.name,
                        "failed",
                        Some(&error.to_string()),
                    );
                    report.failures.push(error);
                }
            }
        }

        Ok(report)
    }

    async fn apply(
        &self,
        primary: &dyn SqlInstance,
        connections: &ReplicaConnections,
        availability_group: &str,
        replica: &str,
        mode: SeedingMode,
    ) -> Result<()> {
        let alter_failed = |reason: String| AgJoinError::ReplicaAlterFailed {
            replica: replica.to_string(),
            seeding_mode: mode.to_string(),
            reason,
        };

        primary
            .set_replica_seeding_mode(availability_group, replica, mode)
            .await
            .map_err(|error| alter_failed(error.to_string()))?;

        if mode == SeedingMode::Automatic {
            let secondary = connections
                .get(replica)
                .ok_or_else(|| alter_failed("no open connection to grant permissions".to_string()))?;
            secondary
                .grant_create_any_database(availability_group)
                .await
                .map_err(|error| {
                    alter_failed(format!("granting {SEEDING_PERMISSION} failed: {error}"))
                })?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AgJoinConfig;
    use crate::error::ErrorKind;
    use crate::models::{AvailabilityMode, BackupType, DatabaseJoinRequest};
    use crate::orchestration::prerequisite_checker::PrerequisiteChecker;
    use crate::test_helpers::{SimulatedCall, SimulationBuilder};

    #[tokio::test]
    async fn test_second_run_issues_no_alter() {
        let (primary, connector) = SimulationBuilder::new("AG1", "SQL1")
            .secondary("SQL2", AvailabilityMode::SynchronousCommit, SeedingMode::Manual)
            .secondary("SQL3", AvailabilityMode::AsynchronousCommit, SeedingMode::Automatic)
            .database("DB1")
            .build();
        primary.record_backup("DB1", BackupType::Full);

        let config = AgJoinConfig::default();
        let mut connections = ReplicaConnections::new();
        let request = DatabaseJoinRequest::new("AG1", "DB1").with_seeding_mode(SeedingMode::Automatic);
        let plan = PrerequisiteChecker::new(&config, &connector, None)
            .check(&primary, &mut connections, &request)
            .await
            .plan()
            .cloned()
            .expect("plan");

        let reconciler = SeedingReconciler::new();
        let first = reconciler.reconcile(&primary, &connections, &plan).await.unwrap();
        assert_eq!(first.succeeded, vec!["SQL2".to_string()]);
        assert_eq!(first.skipped, vec!["SQL3".to_string()]);
        assert_eq!(connector.seeding_mode("SQL2"), Some(SeedingMode::Automatic));
        assert!(connector.mutations().contains(&SimulatedCall::GrantCreateAnyDatabase {
            instance: "SQL2".to_string()
        }));

        connector.clear_calls();
        let second = reconciler.reconcile(&primary, &connections, &plan).await.unwrap();
        assert!(second.succeeded.is_empty());
        assert!(connector.mutations().is_empty());
    }

    #[tokio::test]
    async fn test_alter_failure_does_not_stop_other_replicas() {
        let (primary, connector) = SimulationBuilder::new("AG1", "SQL1")
            .secondary("SQL2", AvailabilityMode::SynchronousCommit, SeedingMode::Manual)
            .secondary("SQL3", AvailabilityMode::SynchronousCommit, SeedingMode::Manual)
            .database("DB1")
            .build();
        primary.record_backup("DB1", BackupType::Full);
        connector.fail_alter("SQL2");

        let config = AgJoinConfig::default();
        let mut connections = ReplicaConnections::new();
        let request = DatabaseJoinRequest::new("AG1", "DB1").with_seeding_mode(SeedingMode::Automatic);
        let plan = PrerequisiteChecker::new(&config, &connector, None)
            .check(&primary, &mut connections, &request)
            .await
            .plan()
            .cloned()
            .expect("plan");

        let report = SeedingReconciler::new()
            .reconcile(&primary, &connections, &plan)
            .await
            .unwrap();
        assert_eq!(report.failures.len(), 1);
        assert_eq!(report.failures[0].kind(), ErrorKind::ReplicaAlterFailed);
        assert_eq!(report.failures[0].replica(), Some("SQL2"));
        assert_eq!(report.succeeded, vec!["SQL3".to_string()]);
    }
}
