//! # Synchronization Waiter
//!
//! Drives every joined secondary's [`ReplicaSyncMachine`] to a terminal
//! state by polling. Replicas are refreshed in order on every poll interval
//! until all of them report `IsJoined` with their target synchronization
//! state, a seeding failure is reported for any automatic replica, the
//! overall budget runs out, or the caller cancels.

use chrono::Utc;
use std::collections::HashMap;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::constants::events;
use crate::error::{AgJoinError, Result};
use crate::models::{
    AgDatabaseRecord, AvailabilityDatabaseInfo, JoinPlan, ReplicaRole, SeedingMode, SeedingStats,
    SynchronizationState,
};
use crate::server::{ReplicaConnections, SqlInstance};
use crate::state_machine::{DatabaseSyncTracker, ReplicaSyncState, SyncEvent};

use super::polling::{PollPolicy, PollTimer};

#[derive(Debug, Clone, Copy)]
pub struct SyncWaiter {
    policy: PollPolicy,
    report_progress: bool,
}

impl SyncWaiter {
    pub fn new(policy: PollPolicy, report_progress: bool) -> Self {
        Self {
            policy,
            report_progress,
        }
    }

    /// Wait until every replica in `tracker` is synced and return one output
    /// record per secondary, in replica order
    pub async fn wait(
        &self,
        primary: &dyn SqlInstance,
        connections: &ReplicaConnections,
        plan: &JoinPlan,
        tracker: &mut DatabaseSyncTracker,
        cancel: &CancellationToken,
    ) -> Result<Vec<AgDatabaseRecord>> {
        let ag_name = &plan.availability_group.name;
        let database = plan.database.name.clone();
        let mut timer = PollTimer::start(
            self.policy,
            cancel,
            format!("waiting for {database} to synchronize"),
        );
        let mut latest: HashMap<String, AvailabilityDatabaseInfo> = HashMap::new();

        loop {
            timer.ensure_not_cancelled()?;

            for replica in tracker.waiting() {
                let connection =
                    connections
                        .get(&replica)
                        .ok_or_else(|| AgJoinError::ReplicaUnreachable {
                            replica: replica.clone(),
                            availability_group: ag_name.clone(),
                            reason: "no open connection".to_string(),
                        })?;

                let Some(machine) = tracker.replica_mut(&replica) else {
                    continue;
                };

                if machine.seeding_mode() == SeedingMode::Automatic {
                    let remote_machine = connection.identity().computer_name.clone();
                    if let Some(stats) = self
                        .seeding_stats(primary, &database, &replica, &remote_machine)
                        .await
                    {
                        if stats.has_failed() {
                            let message = stats.failure_message.clone().unwrap_or_default();
                            machine.apply(&SyncEvent::SeedingFailure(message));
                            break;
                        }
                        if self.report_progress {
                            log_seeding_progress(&replica, &stats);
                        }
                    }
                }

                let event = match connection.availability_database(ag_name, &database).await? {
                    Some(info) => {
                        let event = SyncEvent::observed(info.is_joined, info.synchronization_state);
                        latest.insert(replica.clone(), info);
                        event
                    }
                    None => SyncEvent::observed(false, SynchronizationState::NotSynchronizing),
                };
                if machine.apply(&event) == ReplicaSyncState::Synced {
                    info!(replica = %replica, database = %database, sync_target = %machine.target(), "Replica synchronized");
                }
            }

            if let Some(failed) = tracker.first_failure() {
                return Err(AgJoinError::SeedingFailed {
                    replica: failed.replica().to_string(),
                    database: tracker.database().to_string(),
                    message: failed.failure_message().unwrap_or_default().to_string(),
                });
            }

            if tracker.all_synced() {
                debug!(database = %database, polls = timer.polls(), elapsed_ms = timer.elapsed().as_millis() as u64, "All replicas synchronized");
                return Ok(tracker
                    .replicas()
                    .iter()
                    .filter_map(|machine| {
                        let info = latest.get(machine.replica())?;
                        let identity = connections.get(machine.replica())?.identity();
                        Some(AgDatabaseRecord::from_availability_database(
                            identity,
                            ReplicaRole::Secondary,
                            info,
                        ))
                    })
                    .collect());
            }

            if timer.expired() {
                return Err(AgJoinError::SyncTimeout {
                    database,
                    timeout: timer.timeout(),
                    pending: tracker.pending(),
                });
            }
            timer.tick().await?;
        }
    }

    /// Seeding statistics towards `remote_machine`. Query errors are logged
    /// and treated as no data.
    async fn seeding_stats(
        &self,
        primary: &dyn SqlInstance,
        database: &str,
        replica: &str,
        remote_machine: &str,
    ) -> Option<SeedingStats> {
        match primary.seeding_stats(database, remote_machine).await {
            Ok(stats) => stats,
            Err(error) => {
                warn!(replica = %replica, database = %database, error = %error, "Seeding statistics unavailable");
                None
            }
        }
    }
}

fn log_seeding_progress(replica: &str, stats: &SeedingStats) {
    let remaining = stats
        .estimated_remaining(Utc::now())
        .map(|eta| eta.num_seconds());
    info!(
        event = events::SEEDING_PROGRESS,
        replica = %replica,
        database = %stats.local_database_name,
        percent_complete = stats.percent_complete(),
        transferred_bytes = stats.transferred_size_bytes,
        database_bytes = stats.database_size_bytes,
        eta_seconds = remaining,
        "Seeding in progress"
    );
}
