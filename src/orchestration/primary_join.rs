//! # Primary Join Operator
//!
//! Adds the database to the availability group on the primary and waits for
//! the server to report the new availability database as `Existing`.

use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::error::{AgJoinError, Result};
use crate::models::{AgDatabaseRecord, AvailabilityDatabaseInfo, JoinPlan, ObjectState, ReplicaRole};
use crate::server::SqlInstance;

use super::polling::{PollPolicy, PollTimer};

/// Poll `instance` until its availability database for `database` is
/// `Existing`. A missing object counts as not yet existing.
pub(crate) async fn wait_for_existing(
    instance: &dyn SqlInstance,
    availability_group: &str,
    database: &str,
    policy: PollPolicy,
    cancel: &CancellationToken,
) -> Result<AvailabilityDatabaseInfo> {
    let replica = instance.identity().sql_instance.clone();
    let mut timer = PollTimer::start(
        policy,
        cancel,
        format!("waiting for {database} to exist on {replica}"),
    );
    let mut observed = "missing".to_string();

    loop {
        timer.ensure_not_cancelled()?;

        match instance.availability_database(availability_group, database).await? {
            Some(info) if info.state == ObjectState::Existing => {
                debug!(replica = %replica, database = %database, polls = timer.polls(), "Availability database exists");
                return Ok(info);
            }
            Some(info) => observed = info.state.to_string(),
            None => observed = "missing".to_string(),
        }

        if timer.expired() {
            return Err(AgJoinError::JoinTimeout {
                replica,
                database: database.to_string(),
                observed,
                timeout: timer.timeout(),
            });
        }
        timer.tick().await?;
    }
}

#[derive(Debug, Clone, Copy)]
pub struct PrimaryJoinOperator {
    policy: PollPolicy,
}

impl PrimaryJoinOperator {
    pub fn new(policy: PollPolicy) -> Self {
        Self { policy }
    }

    /// Create the availability database on the primary, wait for it, and
    /// return the primary's output record
    pub async fn join(
        &self,
        primary: &dyn SqlInstance,
        plan: &JoinPlan,
        cancel: &CancellationToken,
    ) -> Result<AgDatabaseRecord> {
        let ag_name = &plan.availability_group.name;
        let database = &plan.database.name;

        primary
            .create_availability_database(ag_name, database)
            .await?;
        info!(primary = %plan.primary, database = %database, "Availability database created on primary");

        let info = wait_for_existing(primary, ag_name, database, self.policy, cancel).await?;
        Ok(AgDatabaseRecord::from_availability_database(
            primary.identity(),
            ReplicaRole::Primary,
            &info,
        ))
    }
}
