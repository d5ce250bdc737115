//! # Availability Group Tester
//!
//! Standalone health check of an availability group from its primary, and a
//! prerequisite-only evaluation of a database without changing anything.

use std::sync::Arc;
use tracing::info;

use crate::config::AgJoinConfig;
use crate::error::{AgJoinError, Result};
use crate::models::{AgHealthRecord, DatabaseJoinRequest};
use crate::server::{Credential, InstanceConnector, ReplicaConnections};

use super::prerequisite_checker::{check_availability_group, PrerequisiteChecker};
use super::types::PrerequisiteOutcome;
use super::workflow::close_quietly;

pub struct AvailabilityGroupTester {
    config: AgJoinConfig,
    connector: Arc<dyn InstanceConnector>,
}

impl AvailabilityGroupTester {
    pub fn new(config: AgJoinConfig, connector: Arc<dyn InstanceConnector>) -> Self {
        Self { config, connector }
    }

    /// Check that `availability_group` exists on `instance`, that `instance`
    /// is its primary and that every replica is connected.
    ///
    /// Returns every failure found; an unhealthy group usually has several
    /// disconnected replicas at once.
    pub async fn test_health(
        &self,
        instance: &str,
        credential: Option<&Credential>,
        availability_group: &str,
    ) -> std::result::Result<AgHealthRecord, Vec<AgJoinError>> {
        let primary = self
            .connector
            .connect(instance, credential)
            .await
            .map_err(|error| vec![error])?;

        let result = check_availability_group(primary.as_ref(), availability_group)
            .await
            .map(|ag| AgHealthRecord::new(primary.identity(), &ag));
        close_quietly(primary.as_ref()).await;

        if let Ok(record) = &result {
            info!(
                instance = %record.sql_instance,
                availability_group = %record.availability_group,
                replicas = record.replicas.len(),
                "Availability group healthy"
            );
        }
        result
    }

    /// Run every prerequisite check for `request` against the primary at
    /// `instance` and report the outcome. Nothing is modified.
    pub async fn test_database(
        &self,
        instance: &str,
        credential: Option<&Credential>,
        secondary_credential: Option<&Credential>,
        request: &DatabaseJoinRequest,
    ) -> Result<PrerequisiteOutcome> {
        let primary = self.connector.connect(instance, credential).await?;
        let mut connections = ReplicaConnections::new();

        let outcome = PrerequisiteChecker::new(
            &self.config,
            self.connector.as_ref(),
            secondary_credential,
        )
        .check(primary.as_ref(), &mut connections, request)
        .await;

        connections.close_all().await;
        close_quietly(primary.as_ref()).await;
        Ok(outcome)
    }
}
