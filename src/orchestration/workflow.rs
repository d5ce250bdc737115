//! # Workflow Driver
//!
//! Adds a batch of databases to an availability group, one database after
//! another. For each database the phases run in a fixed order:
//!
//! 1. **Prerequisites** - [`PrerequisiteChecker`] produces a [`JoinPlan`]
//! 2. **Seeding mode** - [`SeedingReconciler`] aligns replica seeding modes
//! 3. **Backup/restore** - [`BackupRestoreCoordinator`] seeds manual replicas
//! 4. **Primary join** - [`PrimaryJoinOperator`] adds the database on the primary
//! 5. **Secondary join** - [`SecondaryJoinOperator`] joins each secondary
//! 6. **Synchronization** - [`SyncWaiter`] waits for every secondary
//!
//! A failed phase ends that database only; the batch moves on. Failures that
//! make the primary or the availability group unusable, and cancellation,
//! stop the batch and are reported in [`InvocationReport::aborted`].

use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, instrument, warn};
use uuid::Uuid;

use crate::config::AgJoinConfig;
use crate::constants::events;
use crate::error::{AgJoinError, ErrorKind, Result};
use crate::logging::log_database_operation;
use crate::models::{DatabaseJoinRequest, JoinPlan, SeedingMode};
use crate::server::{
    resolve_inputs, BackupRestoreService, Credential, InstanceConnector, ReplicaConnections,
    ServerInput, SqlInstance,
};
use crate::state_machine::TargetSynchronizationState;

use super::backup_restore::BackupRestoreCoordinator;
use super::polling::PollPolicy;
use super::prerequisite_checker::PrerequisiteChecker;
use super::primary_join::PrimaryJoinOperator;
use super::secondary_join::{SecondaryJoinOperator, SecondaryJoinResult};
use super::seeding_reconciler::SeedingReconciler;
use super::sync_waiter::SyncWaiter;
use super::types::{
    DatabaseJoinOutcome, InvocationReport, JoinPhase, JoinStatus, PhaseReport,
    PrerequisiteOutcome,
};

/// Caller options shared by every database of one invocation
#[derive(Debug, Clone, Default)]
pub struct JoinOptions {
    pub availability_group: String,
    /// Explicit secondaries; empty means every non-primary replica
    pub secondaries: Vec<String>,
    pub seeding_mode: Option<SeedingMode>,
    pub shared_path: Option<String>,
    pub use_last_backup: bool,
    /// Check prerequisites and report planned actions without changing anything
    pub dry_run: bool,
    pub credential: Option<Credential>,
    pub secondary_credential: Option<Credential>,
}

impl JoinOptions {
    pub fn new(availability_group: impl Into<String>) -> Self {
        Self {
            availability_group: availability_group.into(),
            ..Default::default()
        }
    }

    pub fn with_seeding_mode(mut self, mode: SeedingMode) -> Self {
        self.seeding_mode = Some(mode);
        self
    }

    pub fn with_shared_path(mut self, path: impl Into<String>) -> Self {
        self.shared_path = Some(path.into());
        self
    }

    pub fn with_last_backup(mut self) -> Self {
        self.use_last_backup = true;
        self
    }

    pub fn with_secondaries<I, S>(mut self, secondaries: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.secondaries = secondaries.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_dry_run(mut self) -> Self {
        self.dry_run = true;
        self
    }

    pub fn with_credential(mut self, credential: Credential) -> Self {
        self.credential = Some(credential);
        self
    }

    pub fn with_secondary_credential(mut self, credential: Credential) -> Self {
        self.secondary_credential = Some(credential);
        self
    }

    /// The unit of work for one database
    pub fn request_for(&self, database: &str) -> DatabaseJoinRequest {
        DatabaseJoinRequest {
            availability_group: self.availability_group.clone(),
            database: database.to_string(),
            seeding_mode: self.seeding_mode,
            shared_path: self.shared_path.clone(),
            use_last_backup: self.use_last_backup,
            secondaries: self.secondaries.clone(),
        }
    }
}

/// Outcome of one database plus whether it stops the batch
struct DatabaseRun {
    outcome: DatabaseJoinOutcome,
    halt: Option<AgJoinError>,
}

/// Adds databases to an availability group
pub struct AgDatabaseJoiner {
    config: AgJoinConfig,
    connector: Arc<dyn InstanceConnector>,
    backup_service: Arc<dyn BackupRestoreService>,
}

impl AgDatabaseJoiner {
    pub fn new(
        config: AgJoinConfig,
        connector: Arc<dyn InstanceConnector>,
        backup_service: Arc<dyn BackupRestoreService>,
    ) -> Self {
        Self {
            config,
            connector,
            backup_service,
        }
    }

    pub fn config(&self) -> &AgJoinConfig {
        &self.config
    }

    /// Add `databases` (plus any database handles in `inputs`) to the
    /// availability group on the primary named by `inputs`.
    ///
    /// `Err` means nothing was attempted: the inputs were unusable, the
    /// primary could not be reached, or its version predates availability
    /// groups. Everything after that is reported per database.
    pub async fn run(
        &self,
        inputs: &[ServerInput],
        databases: &[String],
        options: &JoinOptions,
        cancel: &CancellationToken,
    ) -> Result<InvocationReport> {
        let run_id = Uuid::new_v4();
        self.run_with_id(run_id, inputs, databases, options, cancel)
            .await
    }

    #[instrument(skip_all, fields(run_id = %run_id, availability_group = %options.availability_group, dry_run = options.dry_run))]
    async fn run_with_id(
        &self,
        run_id: Uuid,
        inputs: &[ServerInput],
        databases: &[String],
        options: &JoinOptions,
        cancel: &CancellationToken,
    ) -> Result<InvocationReport> {
        let targets = resolve_inputs(inputs, databases)?;
        info!(
            event = events::INVOCATION_STARTED,
            primary = %targets.primary,
            databases = targets.databases.len(),
            "Starting availability group join"
        );

        let primary = self
            .connector
            .connect(&targets.primary, options.credential.as_ref())
            .await?;

        let required = self.config.server.min_version_availability_groups;
        if primary.version_major() < required {
            let version = primary.version_major();
            close_quietly(primary.as_ref()).await;
            return Err(AgJoinError::UnsupportedFeature {
                instance: targets.primary,
                feature: "Availability groups".to_string(),
                version,
                required,
            });
        }

        let mut report = InvocationReport {
            run_id,
            primary: primary.identity().sql_instance.clone(),
            availability_group: options.availability_group.clone(),
            outcomes: Vec::with_capacity(targets.databases.len()),
            aborted: None,
        };
        let mut connections = ReplicaConnections::new();

        for database in &targets.databases {
            if cancel.is_cancelled() {
                report.aborted = Some(AgJoinError::cancelled(format!(
                    "starting database {database}"
                )));
                break;
            }

            let request = options.request_for(database);
            let run = self
                .join_database(primary.as_ref(), &mut connections, &request, options, cancel)
                .await;
            report.outcomes.push(run.outcome);

            if let Some(halt) = run.halt {
                error!(database = %database, error = %halt, "Stopping invocation");
                report.aborted = Some(halt);
                break;
            }
        }

        connections.close_all().await;
        close_quietly(primary.as_ref()).await;

        info!(
            event = events::INVOCATION_COMPLETED,
            joined = report.outcomes.iter().filter(|o| o.is_joined()).count(),
            attempted = report.outcomes.len(),
            requested = targets.databases.len(),
            aborted = report.aborted.is_some(),
            "Availability group join finished"
        );
        Ok(report)
    }

    #[instrument(skip_all, fields(database = %request.database))]
    async fn join_database(
        &self,
        primary: &dyn SqlInstance,
        connections: &mut ReplicaConnections,
        request: &DatabaseJoinRequest,
        options: &JoinOptions,
        cancel: &CancellationToken,
    ) -> DatabaseRun {
        let mut outcome = DatabaseJoinOutcome::new(&request.availability_group, &request.database);
        info!(event = events::DATABASE_STARTED, "Processing database");

        let checker = PrerequisiteChecker::new(
            &self.config,
            self.connector.as_ref(),
            options.secondary_credential.as_ref(),
        );
        let plan = match checker.check(primary, connections, request).await {
            PrerequisiteOutcome::Ready { plan, diagnostics } => {
                outcome.diagnostics = diagnostics;
                outcome.complete_phase(
                    JoinPhase::Prerequisites,
                    plan.replicas.iter().map(|replica| &replica.name),
                );
                plan
            }
            PrerequisiteOutcome::Rejected(report) => {
                outcome.diagnostics = report.diagnostics;
                let halt = report
                    .halts_invocation
                    .then(|| {
                        report
                            .failures
                            .iter()
                            .find(|failure| failure.is_invocation_fatal())
                            .or_else(|| report.failures.first())
                            .cloned()
                    })
                    .flatten();
                for failure in report.failures {
                    outcome.record_failure(JoinPhase::Prerequisites, failure);
                }
                outcome.fail(JoinPhase::Prerequisites);
                log_failure(&outcome, JoinPhase::Prerequisites);
                return DatabaseRun { outcome, halt };
            }
        };

        if options.dry_run {
            outcome.planned_actions = planned_actions(&plan);
            outcome.status = JoinStatus::Planned;
            info!(actions = outcome.planned_actions.len(), "Dry run: prerequisites satisfied, nothing changed");
            outcome.plan = Some(plan);
            return DatabaseRun {
                outcome,
                halt: None,
            };
        }

        let result = self
            .execute(primary, connections, &plan, cancel, &mut outcome)
            .await;
        outcome.plan = Some(plan);

        let halt = match result {
            Ok(()) => {
                outcome.status = JoinStatus::Joined;
                info!(
                    event = events::DATABASE_JOINED,
                    records = outcome.records.len(),
                    "Database joined and synchronized"
                );
                log_database_operation(
                    JoinPhase::Synchronization.as_str(),
                    &outcome.availability_group,
                    &outcome.database,
                    "joined",
                    None,
                );
                None
            }
            Err(phase) => {
                outcome.fail(phase);
                log_failure(&outcome, phase);
                outcome
                    .errors
                    .iter()
                    .find(|error| error.kind() == ErrorKind::Cancelled)
                    .cloned()
            }
        };

        DatabaseRun { outcome, halt }
    }

    /// Phases 2-6 for one planned database. Errors are recorded into
    /// `outcome`; `Err` carries the phase that stopped the database.
    async fn execute(
        &self,
        primary: &dyn SqlInstance,
        connections: &ReplicaConnections,
        plan: &JoinPlan,
        cancel: &CancellationToken,
        outcome: &mut DatabaseJoinOutcome,
    ) -> std::result::Result<(), JoinPhase> {
        let wait = &self.config.wait;
        let existing_policy = PollPolicy::new(wait.poll_interval(), wait.existing_timeout());
        let sync_policy = PollPolicy::new(wait.poll_interval(), wait.sync_timeout());

        let report = SeedingReconciler::new()
            .reconcile(primary, connections, plan)
            .await
            .map_err(|error| abort(outcome, JoinPhase::SeedingMode, error))?;
        settle(outcome, JoinPhase::SeedingMode, report)?;

        let report = BackupRestoreCoordinator::new(self.backup_service.clone())
            .run(primary, connections, plan)
            .await
            .map_err(|error| abort(outcome, JoinPhase::BackupRestore, error))?;
        settle(outcome, JoinPhase::BackupRestore, report)?;

        let record = PrimaryJoinOperator::new(existing_policy)
            .join(primary, plan, cancel)
            .await
            .map_err(|error| abort(outcome, JoinPhase::PrimaryJoin, error))?;
        outcome.complete_phase(JoinPhase::PrimaryJoin, [&plan.primary]);
        outcome.records.push(record);

        let SecondaryJoinResult {
            report,
            mut tracker,
        } = SecondaryJoinOperator::new(existing_policy)
            .join(connections, plan, cancel)
            .await
            .map_err(|error| abort(outcome, JoinPhase::SecondaryJoin, error))?;
        settle(outcome, JoinPhase::SecondaryJoin, report)?;

        let records = SyncWaiter::new(sync_policy, wait.report_seeding_progress)
            .wait(primary, connections, plan, &mut tracker, cancel)
            .await
            .map_err(|error| abort(outcome, JoinPhase::Synchronization, error))?;
        outcome.complete_phase(
            JoinPhase::Synchronization,
            plan.replicas.iter().map(|replica| &replica.name),
        );
        outcome.records.extend(records);
        Ok(())
    }
}

fn abort(outcome: &mut DatabaseJoinOutcome, phase: JoinPhase, error: AgJoinError) -> JoinPhase {
    outcome.record_failure(phase, error);
    phase
}

/// Fold a phase report into the outcome; any failure stops the database
fn settle(
    outcome: &mut DatabaseJoinOutcome,
    phase: JoinPhase,
    report: PhaseReport,
) -> std::result::Result<(), JoinPhase> {
    outcome.complete_phase(phase, report.succeeded.iter().chain(report.skipped.iter()));
    if report.failures.is_empty() {
        return Ok(());
    }
    for failure in report.failures {
        warn!(
            event = events::REPLICA_PHASE_FAILED,
            phase = %phase,
            replica = failure.replica(),
            error = %failure,
            "Replica failed phase"
        );
        outcome.record_failure(phase, failure);
    }
    Err(phase)
}

fn log_failure(outcome: &DatabaseJoinOutcome, phase: JoinPhase) {
    let details = outcome
        .errors
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ");
    warn!(
        event = events::DATABASE_FAILED,
        phase = %phase,
        errors = outcome.errors.len(),
        "Database not joined"
    );
    log_database_operation(
        phase.as_str(),
        &outcome.availability_group,
        &outcome.database,
        "failed",
        Some(&details),
    );
}

/// Mutations the workflow would issue for `plan`, in order
pub fn planned_actions(plan: &JoinPlan) -> Vec<String> {
    let database = &plan.database.name;
    let ag = &plan.availability_group.name;
    let mut actions = Vec::new();

    if let Some(desired) = plan.request.seeding_mode {
        for replica in &plan.replicas {
            if replica.configured_seeding_mode != desired {
                actions.push(format!(
                    "set seeding mode of {} to {desired} on primary {}",
                    replica.name, plan.primary
                ));
                if desired == SeedingMode::Automatic {
                    actions.push(format!(
                        "grant {} for {ag} on {}",
                        crate::constants::SEEDING_PERMISSION,
                        replica.name
                    ));
                }
            }
        }
    }

    let restores: Vec<&str> = plan
        .replicas_needing_restore()
        .map(|replica| replica.name.as_str())
        .collect();
    if !restores.is_empty() {
        if plan.request.use_last_backup {
            actions.push(format!(
                "reuse last backup chain of {database} ({} backups)",
                plan.last_backup_chain.len()
            ));
        } else if let Some(path) = &plan.request.shared_path {
            actions.push(format!("full backup of {database} on {} to {path}", plan.primary));
            actions.push(format!("log backup of {database} on {} to {path}", plan.primary));
        }
        for replica in &restores {
            actions.push(format!("restore {database} with no recovery on {replica}"));
        }
    }

    actions.push(format!("add {database} to {ag} on primary {}", plan.primary));
    for replica in &plan.replicas {
        actions.push(format!("create availability database {database} on {}", replica.name));
        if replica.effective_seeding_mode != SeedingMode::Automatic {
            actions.push(format!("join {database} to {ag} on {}", replica.name));
        }
        match TargetSynchronizationState::for_availability_mode(&replica.name, replica.availability_mode) {
            Ok(target) => actions.push(format!("wait for {} to reach {target}", replica.name)),
            Err(error) => actions.push(format!("cannot wait for {}: {error}", replica.name)),
        }
    }
    actions
}

pub(crate) async fn close_quietly(instance: &dyn SqlInstance) {
    if let Err(error) = instance.close().await {
        warn!(instance = %instance.identity().sql_instance, error = %error, "Failed to close connection");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::AvailabilityMode;
    use crate::test_helpers::{SimulatedCall, SimulationBuilder};

    #[test]
    fn test_request_for_copies_options() {
        let options = JoinOptions::new("AG1")
            .with_seeding_mode(SeedingMode::Manual)
            .with_shared_path("\\\\share")
            .with_secondaries(["SQL2"]);
        let request = options.request_for("DB7");
        assert_eq!(request.database, "DB7");
        assert_eq!(request.availability_group, "AG1");
        assert_eq!(request.seeding_mode, Some(SeedingMode::Manual));
        assert_eq!(request.secondaries, vec!["SQL2"]);
        assert!(!request.use_last_backup);
    }

    #[tokio::test(start_paused = true)]
    async fn test_connections_are_closed_at_the_end() {
        let (_primary, connector) = SimulationBuilder::new("AG1", "SQL1")
            .secondary("SQL2", AvailabilityMode::AsynchronousCommit, SeedingMode::Manual)
            .database("DB1")
            .build();
        let joiner = AgDatabaseJoiner::new(
            AgJoinConfig::default(),
            Arc::new(connector.clone()),
            Arc::new(connector.backup_service()),
        );

        let report = joiner
            .run(
                &[ServerInput::instance("SQL1")],
                &["DB1".to_string()],
                &JoinOptions::new("AG1").with_shared_path("\\\\share"),
                &CancellationToken::new(),
            )
            .await
            .unwrap();
        assert!(report.all_joined());

        let closed: Vec<String> = connector
            .calls()
            .into_iter()
            .filter_map(|call| match call {
                SimulatedCall::Close { instance } => Some(instance),
                _ => None,
            })
            .collect();
        assert_eq!(closed.len(), 2);
        assert!(closed.contains(&"SQL1".to_string()));
        assert!(closed.contains(&"SQL2".to_string()));
    }

    #[tokio::test]
    async fn test_old_primary_is_rejected() {
        let (_primary, connector) = SimulationBuilder::new("AG1", "SQL1")
            .database("DB1")
            .version(10)
            .build();
        let joiner = AgDatabaseJoiner::new(
            AgJoinConfig::default(),
            Arc::new(connector.clone()),
            Arc::new(connector.backup_service()),
        );

        let error = joiner
            .run(
                &[ServerInput::instance("SQL1")],
                &["DB1".to_string()],
                &JoinOptions::new("AG1"),
                &CancellationToken::new(),
            )
            .await
            .unwrap_err();
        assert_eq!(error.kind(), ErrorKind::UnsupportedFeature);
    }
}
