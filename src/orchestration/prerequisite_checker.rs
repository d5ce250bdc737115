//! # Prerequisite Checker
//!
//! Decides whether one database can be added to an availability group and,
//! if so, produces the [`JoinPlan`] every later phase executes.
//!
//! Checks run in a fixed order. Failures on the primary side stop at the
//! first one found; findings on the secondaries aggregate, so a caller sees
//! every unusable replica in one pass instead of fixing them one run at a
//! time. The only side effect is opening secondary connections, which stay
//! in the shared [`ReplicaConnections`] for the later phases.

use tracing::{debug, info, instrument};

use crate::config::AgJoinConfig;
use crate::error::{AgJoinError, Result};
use crate::models::backup::{latest_backup, select_restore_chain};
use crate::models::join_request::restore_needed;
use crate::models::{
    AvailabilityGroupInfo, BackupArtifact, BackupType, DatabaseInfo, DatabaseJoinRequest,
    DatabaseStatus, JoinPlan, RecoveryModel, ReplicaInfo, ReplicaPlan, ReplicaRole, SeedingMode,
};
use crate::server::{Credential, InstanceConnector, ReplicaConnections, SqlInstance};

use super::types::{PrerequisiteOutcome, PrerequisiteReport, ReplicaDiagnostic};

/// Checks 1-3: the availability group exists, this instance is its primary
/// and every replica is connected. Any failure here affects every database
/// of the invocation.
pub async fn check_availability_group(
    primary: &dyn SqlInstance,
    availability_group: &str,
) -> std::result::Result<AvailabilityGroupInfo, Vec<AgJoinError>> {
    let instance = primary.identity().sql_instance.clone();

    let ag = match primary.availability_group(availability_group).await {
        Ok(Some(ag)) => ag,
        Ok(None) => {
            return Err(vec![AgJoinError::AvailabilityGroupNotFound {
                instance,
                availability_group: availability_group.to_string(),
            }])
        }
        Err(error) => return Err(vec![error]),
    };

    if ag.local_replica_role != ReplicaRole::Primary {
        return Err(vec![AgJoinError::WrongReplica {
            instance,
            availability_group: ag.name.clone(),
            expected: ReplicaRole::Primary.to_string(),
            actual: ag.local_replica_role.to_string(),
            primary: Some(ag.primary_replica.clone()),
        }]);
    }

    let unreachable: Vec<AgJoinError> = ag
        .disconnected_replicas()
        .map(|replica| AgJoinError::ReplicaUnreachable {
            replica: replica.name.clone(),
            availability_group: ag.name.clone(),
            reason: format!("connection state is {}", replica.connection_state),
        })
        .collect();
    if !unreachable.is_empty() {
        return Err(unreachable);
    }

    Ok(ag)
}

/// Evaluates [`DatabaseJoinRequest`]s against live server state
pub struct PrerequisiteChecker<'a> {
    config: &'a AgJoinConfig,
    connector: &'a dyn InstanceConnector,
    secondary_credential: Option<&'a Credential>,
}

impl<'a> PrerequisiteChecker<'a> {
    pub fn new(
        config: &'a AgJoinConfig,
        connector: &'a dyn InstanceConnector,
        secondary_credential: Option<&'a Credential>,
    ) -> Self {
        Self {
            config,
            connector,
            secondary_credential,
        }
    }

    /// Run every check for `request`. Secondary connections opened here are
    /// left in `connections`.
    #[instrument(skip_all, fields(availability_group = %request.availability_group, database = %request.database))]
    pub async fn check(
        &self,
        primary: &dyn SqlInstance,
        connections: &mut ReplicaConnections,
        request: &DatabaseJoinRequest,
    ) -> PrerequisiteOutcome {
        let mut diagnostics = Vec::new();
        match self
            .evaluate(primary, connections, request, &mut diagnostics)
            .await
        {
            Ok(plan) => {
                info!(
                    replicas = plan.replicas.len(),
                    restore_needed = plan.replicas_needing_restore().count(),
                    "Prerequisites satisfied"
                );
                PrerequisiteOutcome::Ready { plan, diagnostics }
            }
            Err(Rejection {
                failures,
                halts_invocation,
            }) => {
                info!(
                    failures = failures.len(),
                    halts_invocation, "Prerequisites not satisfied"
                );
                PrerequisiteOutcome::Rejected(PrerequisiteReport {
                    database: request.database.clone(),
                    failures,
                    halts_invocation,
                    diagnostics,
                })
            }
        }
    }

    async fn evaluate(
        &self,
        primary: &dyn SqlInstance,
        connections: &mut ReplicaConnections,
        request: &DatabaseJoinRequest,
        diagnostics: &mut Vec<ReplicaDiagnostic>,
    ) -> std::result::Result<JoinPlan, Rejection> {
        let primary_name = primary.identity().sql_instance.clone();

        // 1-3
        let ag = check_availability_group(primary, &request.availability_group)
            .await
            .map_err(Rejection::halting)?;

        // 4
        let required = self.config.server.min_version_automatic_seeding;
        if request.seeding_mode == Some(SeedingMode::Automatic)
            && primary.version_major() < required
        {
            return Err(Rejection::single(AgJoinError::UnsupportedFeature {
                instance: primary_name,
                feature: "Automatic seeding".to_string(),
                version: primary.version_major(),
                required,
            }));
        }

        // 5-7
        let database = self
            .check_database(primary, &request.database)
            .await
            .map_err(Rejection::single)?;

        // 8
        let last_backup_chain = if request.use_last_backup {
            self.check_last_backup(primary, &request.database)
                .await
                .map_err(Rejection::single)?
        } else {
            Vec::new()
        };

        // 9
        if ag.contains_database(&request.database) {
            return Err(Rejection::single(AgJoinError::AlreadyJoined {
                database: request.database.clone(),
                availability_group: ag.name.clone(),
            }));
        }

        // 10
        let mut failures = Vec::new();
        let mut replicas = Vec::new();
        for target in self.secondary_targets(&ag, request, &mut failures) {
            let mut diagnostic = ReplicaDiagnostic::new(&target.name);
            match self
                .check_secondary(connections, &ag, target, request, &mut diagnostic)
                .await
            {
                Ok(plan) => {
                    diagnostic.restore_needed = Some(plan.restore_needed);
                    replicas.push(plan);
                }
                Err(error) => {
                    diagnostic.note(format!("rejected: {error}"));
                    failures.push(error);
                }
            }
            diagnostics.push(diagnostic);
        }
        if !failures.is_empty() {
            return Err(Rejection::aggregate(failures));
        }

        // 11
        let needing: Vec<String> = replicas
            .iter()
            .filter(|replica| replica.restore_needed)
            .map(|replica| replica.name.clone())
            .collect();
        if !needing.is_empty() && !request.has_backup_source() {
            return Err(Rejection::single(AgJoinError::MissingBackupSource {
                database: request.database.clone(),
                replicas: needing,
            }));
        }

        // 12
        let seeds_automatically = replicas
            .iter()
            .any(|replica| replica.effective_seeding_mode == SeedingMode::Automatic);
        if needing.is_empty() && seeds_automatically && !database.has_been_backed_up() {
            return Err(Rejection::single(
                AgJoinError::NoBackupAvailableForSeeding {
                    database: request.database.clone(),
                },
            ));
        }

        Ok(JoinPlan {
            request: request.clone(),
            primary: primary_name,
            availability_group: ag,
            database,
            replicas,
            last_backup_chain,
        })
    }

    async fn check_database(&self, primary: &dyn SqlInstance, name: &str) -> Result<DatabaseInfo> {
        let instance = &primary.identity().sql_instance;
        let database =
            primary
                .database(name)
                .await?
                .ok_or_else(|| AgJoinError::DatabaseNotFound {
                    instance: instance.clone(),
                    database: name.to_string(),
                })?;

        if database.recovery_model != RecoveryModel::Full {
            return Err(AgJoinError::InvalidRecoveryModel {
                instance: instance.clone(),
                database: database.name.clone(),
                actual: database.recovery_model.to_string(),
            });
        }

        if database.status != DatabaseStatus::Normal {
            return Err(AgJoinError::InvalidDatabaseState {
                instance: instance.clone(),
                database: database.name.clone(),
                expected: DatabaseStatus::Normal.to_string(),
                actual: database.status.to_string(),
            });
        }

        Ok(database)
    }

    async fn check_last_backup(
        &self,
        primary: &dyn SqlInstance,
        database: &str,
    ) -> Result<Vec<BackupArtifact>> {
        let history = primary.backup_history(database).await?;

        match latest_backup(&history) {
            None => {
                return Err(AgJoinError::InvalidBackupChain {
                    database: database.to_string(),
                    actual: "no backup".to_string(),
                })
            }
            Some(latest) if latest.backup_type != BackupType::Log => {
                return Err(AgJoinError::InvalidBackupChain {
                    database: database.to_string(),
                    actual: format!("a {} backup", latest.backup_type),
                })
            }
            Some(_) => {}
        }

        let chain = select_restore_chain(&history);
        if chain.is_empty() {
            return Err(AgJoinError::InvalidBackupChain {
                database: database.to_string(),
                actual: "a log backup without a preceding full backup".to_string(),
            });
        }
        debug!(database = %database, artifacts = chain.len(), "Selected restore chain from backup history");
        Ok(chain)
    }

    /// Explicit secondaries resolved against the replica set, or every
    /// replica except the primary
    fn secondary_targets<'g>(
        &self,
        ag: &'g AvailabilityGroupInfo,
        request: &DatabaseJoinRequest,
        failures: &mut Vec<AgJoinError>,
    ) -> Vec<&'g ReplicaInfo> {
        if request.secondaries.is_empty() {
            return ag.secondary_replicas().collect();
        }

        let mut targets: Vec<&ReplicaInfo> = Vec::new();
        for name in &request.secondaries {
            match ag.replica(name) {
                Some(replica) if replica.name.eq_ignore_ascii_case(&ag.primary_replica) => {
                    failures.push(AgJoinError::ReplicaNotFound {
                        replica: name.clone(),
                        availability_group: ag.name.clone(),
                        reason: "it is the primary replica".to_string(),
                    });
                }
                Some(replica) => {
                    if !targets.iter().any(|t| t.name == replica.name) {
                        targets.push(replica);
                    }
                }
                None => failures.push(AgJoinError::ReplicaNotFound {
                    replica: name.clone(),
                    availability_group: ag.name.clone(),
                    reason: "not a member of the replica set".to_string(),
                }),
            }
        }
        targets
    }

    async fn check_secondary(
        &self,
        connections: &mut ReplicaConnections,
        ag: &AvailabilityGroupInfo,
        replica: &ReplicaInfo,
        request: &DatabaseJoinRequest,
        diagnostic: &mut ReplicaDiagnostic,
    ) -> Result<ReplicaPlan> {
        // Transport errors on a secondary are scoped to that replica
        let unreachable = |error: AgJoinError| AgJoinError::ReplicaUnreachable {
            replica: replica.name.clone(),
            availability_group: ag.name.clone(),
            reason: error.to_string(),
        };

        let connection = connections
            .get_or_connect(self.connector, &replica.name, self.secondary_credential)
            .await
            .map_err(unreachable)?;

        let required = self.config.server.min_version_availability_groups;
        if connection.version_major() < required {
            return Err(AgJoinError::UnsupportedFeature {
                instance: replica.name.clone(),
                feature: "Availability groups".to_string(),
                version: connection.version_major(),
                required,
            });
        }

        let remote_ag = connection
            .availability_group(&ag.name)
            .await
            .map_err(unreachable)?
            .ok_or_else(|| AgJoinError::ReplicaNotFound {
                replica: replica.name.clone(),
                availability_group: ag.name.clone(),
                reason: "the availability group is not visible from the replica".to_string(),
            })?;

        if remote_ag.local_replica_role != ReplicaRole::Secondary {
            return Err(AgJoinError::WrongReplica {
                instance: replica.name.clone(),
                availability_group: ag.name.clone(),
                expected: ReplicaRole::Secondary.to_string(),
                actual: remote_ag.local_replica_role.to_string(),
                primary: Some(ag.primary_replica.clone()),
            });
        }

        let existing = connection
            .database(&request.database)
            .await
            .map_err(unreachable)?
            .map(|database| database.status);
        if let Some(status) = &existing {
            if !status.is_restoring() {
                return Err(AgJoinError::ReplicaDatabaseConflict {
                    replica: replica.name.clone(),
                    database: request.database.clone(),
                    actual: status.to_string(),
                });
            }
            if request.use_last_backup {
                return Err(AgJoinError::ConflictingRestoreSource {
                    replica: replica.name.clone(),
                    database: request.database.clone(),
                });
            }
        }

        let effective = request.seeding_mode.unwrap_or(replica.seeding_mode);
        let needs_restore = restore_needed(effective, existing.as_ref());

        diagnostic.note(format!(
            "seeding mode {} (configured {}), database {}",
            effective,
            replica.seeding_mode,
            existing
                .as_ref()
                .map(|status| format!("exists as {status}"))
                .unwrap_or_else(|| "absent".to_string()),
        ));
        diagnostic.note(if needs_restore {
            "restore needed: manual seeding and no restoring copy".to_string()
        } else if effective == SeedingMode::Automatic {
            "no restore needed: automatic seeding creates the database".to_string()
        } else {
            "no restore needed: database already restoring".to_string()
        });

        Ok(ReplicaPlan {
            name: replica.name.clone(),
            availability_mode: replica.availability_mode,
            configured_seeding_mode: replica.seeding_mode,
            effective_seeding_mode: effective,
            existing_database: existing,
            restore_needed: needs_restore,
        })
    }
}

struct Rejection {
    failures: Vec<AgJoinError>,
    halts_invocation: bool,
}

impl Rejection {
    fn single(error: AgJoinError) -> Self {
        let halts_invocation = error.is_invocation_fatal();
        Self {
            failures: vec![error],
            halts_invocation,
        }
    }

    /// Per-replica failures end this database only
    fn aggregate(failures: Vec<AgJoinError>) -> Self {
        Self {
            failures,
            halts_invocation: false,
        }
    }

    /// AG-level failures seen from the primary stop the whole invocation
    fn halting(failures: Vec<AgJoinError>) -> Self {
        Self {
            failures,
            halts_invocation: true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use crate::models::{AvailabilityMode, ConnectionState};
    use crate::test_helpers::{SimulatedConnector, SimulatedInstance, SimulationBuilder};

    fn manual_async_pair() -> (SimulatedInstance, SimulatedConnector) {
        SimulationBuilder::new("AG1", "SQL1")
            .secondary("SQL2", AvailabilityMode::AsynchronousCommit, SeedingMode::Manual)
            .database("DB1")
            .build()
    }

    #[tokio::test]
    async fn test_missing_backup_source() {
        let (primary, connector) = manual_async_pair();
        let config = AgJoinConfig::default();
        let checker = PrerequisiteChecker::new(&config, &connector, None);
        let mut connections = ReplicaConnections::new();

        let outcome = checker
            .check(
                &primary,
                &mut connections,
                &DatabaseJoinRequest::new("AG1", "DB1"),
            )
            .await;

        let failures = outcome.failures();
        assert_eq!(failures.len(), 1);
        assert_eq!(failures[0].kind(), ErrorKind::MissingBackupSource);
        assert!(!outcome.is_ready());
        assert_eq!(outcome.diagnostics()[0].restore_needed, Some(true));
        assert!(connections.contains("SQL2"));
    }

    #[tokio::test]
    async fn test_wrong_replica_halts_invocation() {
        let (_primary, connector) = manual_async_pair();
        let secondary = connector.instance("SQL2").unwrap();
        let config = AgJoinConfig::default();
        let checker = PrerequisiteChecker::new(&config, &connector, None);
        let mut connections = ReplicaConnections::new();

        let outcome = checker
            .check(
                &secondary,
                &mut connections,
                &DatabaseJoinRequest::new("AG1", "DB1").with_shared_path("\\\\share"),
            )
            .await;

        match outcome {
            PrerequisiteOutcome::Rejected(report) => {
                assert!(report.halts_invocation);
                assert_eq!(report.failures[0].kind(), ErrorKind::WrongReplica);
                assert!(report.failures[0].to_string().contains("SQL1"));
            }
            other => panic!("expected rejection, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_disconnected_replica_halts_invocation() {
        let (primary, connector) = manual_async_pair();
        primary.set_connection_state("SQL2", ConnectionState::Disconnected);
        let config = AgJoinConfig::default();
        let checker = PrerequisiteChecker::new(&config, &connector, None);

        let outcome = checker
            .check(
                &primary,
                &mut ReplicaConnections::new(),
                &DatabaseJoinRequest::new("AG1", "DB1").with_shared_path("\\\\share"),
            )
            .await;

        match outcome {
            PrerequisiteOutcome::Rejected(report) => {
                assert!(report.halts_invocation);
                assert_eq!(report.failures[0].kind(), ErrorKind::ReplicaUnreachable);
            }
            other => panic!("expected rejection, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_automatic_seeding_needs_2016() {
        let (primary, connector) = manual_async_pair();
        primary.set_version_major(12);
        let config = AgJoinConfig::default();
        let checker = PrerequisiteChecker::new(&config, &connector, None);

        let outcome = checker
            .check(
                &primary,
                &mut ReplicaConnections::new(),
                &DatabaseJoinRequest::new("AG1", "DB1").with_seeding_mode(SeedingMode::Automatic),
            )
            .await;

        assert_eq!(outcome.failures()[0].kind(), ErrorKind::UnsupportedFeature);
    }

    #[tokio::test]
    async fn test_last_backup_must_end_with_log() {
        let (primary, connector) = manual_async_pair();
        primary.record_backup("DB1", BackupType::Full);
        let config = AgJoinConfig::default();
        let checker = PrerequisiteChecker::new(&config, &connector, None);

        let outcome = checker
            .check(
                &primary,
                &mut ReplicaConnections::new(),
                &DatabaseJoinRequest::new("AG1", "DB1").with_last_backup(),
            )
            .await;
        assert_eq!(outcome.failures()[0].kind(), ErrorKind::InvalidBackupChain);

        primary.record_backup("DB1", BackupType::Log);
        let outcome = checker
            .check(
                &primary,
                &mut ReplicaConnections::new(),
                &DatabaseJoinRequest::new("AG1", "DB1").with_last_backup(),
            )
            .await;
        let plan = outcome.plan().expect("plan");
        assert_eq!(plan.last_backup_chain.len(), 2);
        assert_eq!(plan.last_backup_chain[0].backup_type, BackupType::Full);
    }

    #[tokio::test]
    async fn test_automatic_seeding_requires_prior_backup() {
        let (primary, connector) = manual_async_pair();
        let config = AgJoinConfig::default();
        let checker = PrerequisiteChecker::new(&config, &connector, None);
        let request = DatabaseJoinRequest::new("AG1", "DB1").with_seeding_mode(SeedingMode::Automatic);

        let outcome = checker
            .check(&primary, &mut ReplicaConnections::new(), &request)
            .await;
        assert_eq!(
            outcome.failures()[0].kind(),
            ErrorKind::NoBackupAvailableForSeeding
        );

        primary.record_backup("DB1", BackupType::Full);
        let outcome = checker
            .check(&primary, &mut ReplicaConnections::new(), &request)
            .await;
        let plan = outcome.plan().expect("plan");
        assert!(plan.replicas_needing_restore().next().is_none());
        assert_eq!(plan.replicas[0].effective_seeding_mode, SeedingMode::Automatic);
        assert_eq!(plan.replicas[0].configured_seeding_mode, SeedingMode::Manual);
    }

    #[tokio::test]
    async fn test_explicit_secondary_must_be_in_replica_set() {
        let (primary, connector) = manual_async_pair();
        let config = AgJoinConfig::default();
        let checker = PrerequisiteChecker::new(&config, &connector, None);

        let outcome = checker
            .check(
                &primary,
                &mut ReplicaConnections::new(),
                &DatabaseJoinRequest::new("AG1", "DB1")
                    .with_shared_path("\\\\share")
                    .with_secondaries(["SQL9", "SQL1"]),
            )
            .await;

        let failures = outcome.failures();
        assert_eq!(failures.len(), 2);
        assert!(failures
            .iter()
            .all(|failure| failure.kind() == ErrorKind::ReplicaNotFound));
    }
}
