//! # Backup/Restore Coordinator
//!
//! Seeds manually-seeded secondaries: takes a full and a log backup of the
//! database on the primary (or reuses the chain chosen from backup history)
//! and restores it without recovery onto every replica that needs it.

use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::error::{AgJoinError, Result};
use crate::models::{BackupArtifact, BackupType, JoinPlan};
use crate::server::{BackupRestoreService, ReplicaConnections, SqlInstance};

use super::types::PhaseReport;

pub struct BackupRestoreCoordinator {
    service: Arc<dyn BackupRestoreService>,
}

impl BackupRestoreCoordinator {
    pub fn new(service: Arc<dyn BackupRestoreService>) -> Self {
        Self { service }
    }

    /// Restore the database onto every replica in the plan's RestoreNeeded
    /// set. A failed backup aborts with `Err`; failed restores are collected
    /// in the report after every replica has been attempted.
    pub async fn run(
        &self,
        primary: &dyn SqlInstance,
        connections: &ReplicaConnections,
        plan: &JoinPlan,
    ) -> Result<PhaseReport> {
        let mut report = PhaseReport::default();
        let targets: Vec<&str> = plan
            .replicas_needing_restore()
            .map(|replica| replica.name.as_str())
            .collect();
        report.skipped = plan
            .replicas
            .iter()
            .filter(|replica| !replica.restore_needed)
            .map(|replica| replica.name.clone())
            .collect();

        if targets.is_empty() {
            debug!(database = %plan.database.name, "No replica needs a restore");
            return Ok(report);
        }

        let artifacts = self.artifacts(primary, plan).await?;
        let database = &plan.database.name;

        for replica in targets {
            let result = match connections.get(replica) {
                Some(connection) => self
                    .service
                    .restore(connection, database, &artifacts, true)
                    .await
                    .map_err(|error| format!("{error:#}")),
                None => Err("no open connection".to_string()),
            };

            match result {
                Ok(()) => {
                    info!(replica = %replica, database = %database, artifacts = artifacts.len(), "Restored with no recovery");
                    report.succeeded.push(replica.to_string());
                }
                Err(reason) => {
                    warn!(replica = %replica, database = %database, reason = %reason, "Restore failed");
                    report.failures.push(AgJoinError::RestoreFailed {
                        replica: replica.to_string(),
                        database: database.clone(),
                        reason,
                    });
                }
            }
        }

        Ok(report)
    }

    async fn artifacts(&self, primary: &dyn SqlInstance, plan: &JoinPlan) -> Result<Vec<BackupArtifact>> {
        if plan.request.use_last_backup {
            debug!(database = %plan.database.name, artifacts = plan.last_backup_chain.len(), "Reusing last backup chain");
            return Ok(plan.last_backup_chain.clone());
        }

        // The checker guarantees a backup source; a missing path here is a caller bug
        let destination = plan.request.shared_path.as_deref().ok_or_else(|| {
            AgJoinError::MissingBackupSource {
                database: plan.database.name.clone(),
                replicas: plan
                    .replicas_needing_restore()
                    .map(|replica| replica.name.clone())
                    .collect(),
            }
        })?;

        let mut artifacts = Vec::with_capacity(2);
        for backup_type in [BackupType::Full, BackupType::Log] {
            let artifact = self
                .service
                .backup(primary, &plan.database.name, backup_type, destination)
                .await
                .map_err(|error| AgJoinError::BackupFailed {
                    instance: plan.primary.clone(),
                    database: plan.database.name.clone(),
                    backup_type: backup_type.to_string(),
                    reason: format!("{error:#}"),
                })?;
            info!(database = %plan.database.name, backup_type = %backup_type, paths = ?artifact.paths, "Backup taken");
            artifacts.push(artifact);
        }
        Ok(artifacts)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AgJoinConfig;
    use crate::error::ErrorKind;
    use crate::models::{AvailabilityMode, DatabaseJoinRequest, DatabaseStatus, SeedingMode};
    use crate::orchestration::prerequisite_checker::PrerequisiteChecker;
    use crate::test_helpers::{SimulatedCall, SimulatedConnector, SimulatedInstance, SimulationBuilder};

    async fn planned(
        primary: &SimulatedInstance,
        connector: &SimulatedConnector,
        connections: &mut ReplicaConnections,
        request: DatabaseJoinRequest,
    ) -> JoinPlan {
        let config = AgJoinConfig::default();
        PrerequisiteChecker::new(&config, connector, None)
            .check(primary, connections, &request)
            .await
            .plan()
            .cloned()
            .expect("plan")
    }

    fn three_manual_secondaries() -> (SimulatedInstance, SimulatedConnector) {
        SimulationBuilder::new("AG1", "SQL1")
            .secondary("SQL2", AvailabilityMode::AsynchronousCommit, SeedingMode::Manual)
            .secondary("SQL3", AvailabilityMode::AsynchronousCommit, SeedingMode::Manual)
            .secondary("SQL4", AvailabilityMode::AsynchronousCommit, SeedingMode::Manual)
            .database("DB1")
            .build()
    }

    #[tokio::test]
    async fn test_full_then_log_backup_then_restores() {
        let (primary, connector) = three_manual_secondaries();
        let mut connections = ReplicaConnections::new();
        let plan = planned(
            &primary,
            &connector,
            &mut connections,
            DatabaseJoinRequest::new("AG1", "DB1").with_shared_path("\\\\share\\ag"),
        )
        .await;

        let report = BackupRestoreCoordinator::new(Arc::new(connector.backup_service()))
            .run(&primary, &connections, &plan)
            .await
            .unwrap();
        assert!(report.is_success());
        assert_eq!(report.succeeded.len(), 3);

        let mutations = connector.mutations();
        assert!(matches!(
            &mutations[0],
            SimulatedCall::Backup { backup_type: BackupType::Full, .. }
        ));
        assert!(matches!(
            &mutations[1],
            SimulatedCall::Backup { backup_type: BackupType::Log, .. }
        ));
        assert!(mutations[2..].iter().all(|call| matches!(
            call,
            SimulatedCall::Restore { artifacts: 2, no_recovery: true, .. }
        )));
        assert_eq!(
            connector.instance("SQL3").unwrap().database_status("DB1"),
            Some(DatabaseStatus::Restoring)
        );
    }

    #[tokio::test]
    async fn test_one_failed_restore_does_not_stop_others() {
        let (primary, connector) = three_manual_secondaries();
        connector.fail_restore("SQL3");
        let mut connections = ReplicaConnections::new();
        let plan = planned(
            &primary,
            &connector,
            &mut connections,
            DatabaseJoinRequest::new("AG1", "DB1").with_shared_path("\\\\share\\ag"),
        )
        .await;

        let report = BackupRestoreCoordinator::new(Arc::new(connector.backup_service()))
            .run(&primary, &connections, &plan)
            .await
            .unwrap();
        assert_eq!(report.succeeded, vec!["SQL2".to_string(), "SQL4".to_string()]);
        assert_eq!(report.failures.len(), 1);
        assert_eq!(report.failures[0].kind(), ErrorKind::RestoreFailed);
        assert!(report.failures[0].to_string().contains("not enough space"));
    }

    #[tokio::test]
    async fn test_backup_failure_aborts() {
        let (primary, connector) = three_manual_secondaries();
        connector.fail_backups();
        let mut connections = ReplicaConnections::new();
        let plan = planned(
            &primary,
            &connector,
            &mut connections,
            DatabaseJoinRequest::new("AG1", "DB1").with_shared_path("\\\\share\\ag"),
        )
        .await;

        let error = BackupRestoreCoordinator::new(Arc::new(connector.backup_service()))
            .run(&primary, &connections, &plan)
            .await
            .unwrap_err();
        assert_eq!(error.kind(), ErrorKind::BackupFailed);
        assert!(!connector
            .calls()
            .iter()
            .any(|call| matches!(call, SimulatedCall::Restore { .. })));
    }
}
