//! # Secondary Join Operator
//!
//! Brings each secondary's availability database into existence and joins
//! it. Secondaries are processed one at a time; a failure on one is recorded
//! and the next is still attempted.

use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::error::{AgJoinError, ErrorKind, Result};
use crate::models::{JoinPlan, ReplicaPlan, SeedingMode};
use crate::server::{ReplicaConnections, SqlInstance};
use crate::state_machine::{DatabaseSyncTracker, ReplicaSyncMachine, TargetSynchronizationState};

use super::polling::PollPolicy;
use super::primary_join::wait_for_existing;
use super::types::PhaseReport;

/// Secondaries that were joined, ready for the synchronization wait
#[derive(Debug, Clone)]
pub struct SecondaryJoinResult {
    pub report: PhaseReport,
    pub tracker: DatabaseSyncTracker,
}

#[derive(Debug, Clone, Copy)]
pub struct SecondaryJoinOperator {
    policy: PollPolicy,
}

impl SecondaryJoinOperator {
    pub fn new(policy: PollPolicy) -> Self {
        Self { policy }
    }

    /// Join every secondary in the plan. Per-replica failures land in the
    /// report; `Err` is returned only on cancellation.
    pub async fn join(
        &self,
        connections: &ReplicaConnections,
        plan: &JoinPlan,
        cancel: &CancellationToken,
    ) -> Result<SecondaryJoinResult> {
        let mut report = PhaseReport::default();
        let mut machines = Vec::with_capacity(plan.replicas.len());

        for replica in &plan.replicas {
            match self.join_replica(connections, plan, replica, cancel).await {
                Ok(machine) => {
                    report.succeeded.push(replica.name.clone());
                    machines.push(machine);
                }
                Err(error) if error.kind() == ErrorKind::Cancelled => return Err(error),
                Err(error) => {
                    warn!(replica = %replica.name, error = %error, "Secondary join failed");
                    report.failures.push(error);
                }
            }
        }

        Ok(SecondaryJoinResult {
            report,
            tracker: DatabaseSyncTracker::new(plan.database.name.clone(), machines),
        })
    }

    async fn join_replica(
        &self,
        connections: &ReplicaConnections,
        plan: &JoinPlan,
        replica: &ReplicaPlan,
        cancel: &CancellationToken,
    ) -> Result<ReplicaSyncMachine> {
        let ag_name = &plan.availability_group.name;
        let database = &plan.database.name;
        let connection: &dyn SqlInstance =
            connections
                .get(&replica.name)
                .ok_or_else(|| AgJoinError::ReplicaUnreachable {
                    replica: replica.name.clone(),
                    availability_group: ag_name.clone(),
                    reason: "no open connection".to_string(),
                })?;

        if connection
            .availability_database(ag_name, database)
            .await?
            .is_none()
        {
            debug!(replica = %replica.name, database = %database, "Creating availability database on secondary");
            connection
                .create_availability_database(ag_name, database)
                .await?;
        }

        wait_for_existing(connection, ag_name, database, self.policy, cancel)
            .await
            .map_err(|error| match error {
                AgJoinError::JoinTimeout {
                    database,
                    observed,
                    timeout,
                    ..
                } => AgJoinError::JoinTimeout {
                    replica: replica.name.clone(),
                    database,
                    observed,
                    timeout,
                },
                other => other,
            })?;

        let target =
            TargetSynchronizationState::for_availability_mode(&replica.name, replica.availability_mode)?;

        if replica.effective_seeding_mode != SeedingMode::Automatic {
            connection
                .join_availability_group(ag_name, database)
                .await?;
        }

        info!(
            replica = %replica.name,
            database = %database,
            seeding_mode = %replica.effective_seeding_mode,
            sync_target = %target,
            "Secondary joined"
        );
        Ok(ReplicaSyncMachine::new(
            replica.name.clone(),
            target,
            replica.effective_seeding_mode,
        ))
    }
}
