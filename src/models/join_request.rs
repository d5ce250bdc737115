use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use super::availability_group::{AvailabilityGroupInfo, AvailabilityMode, SeedingMode};
use super::backup::BackupArtifact;
use super::database::{DatabaseInfo, DatabaseStatus};

/// Unit of work: add one database to one availability group
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DatabaseJoinRequest {
    pub availability_group: String,
    pub database: String,
    /// Requested seeding mode; `None` keeps each replica's configured mode
    pub seeding_mode: Option<SeedingMode>,
    /// Directory reachable by every replica for full and log backups
    pub shared_path: Option<String>,
    /// Restore the database's existing backup chain instead of taking new backups
    pub use_last_backup: bool,
    /// Explicit secondaries; empty means every non-primary replica
    pub secondaries: Vec<String>,
}

impl DatabaseJoinRequest {
    pub fn new(availability_group: impl Into<String>, database: impl Into<String>) -> Self {
        Self {
            availability_group: availability_group.into(),
            database: database.into(),
            seeding_mode: None,
            shared_path: None,
            use_last_backup: false,
            secondaries: Vec::new(),
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

    pub fn has_backup_source(&self) -> bool {
        self.shared_path.is_some() || self.use_last_backup
    }
}

/// Per-secondary decisions made while checking prerequisites
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReplicaPlan {
    pub name: String,
    pub availability_mode: AvailabilityMode,
    /// Mode currently configured on the replica
    pub configured_seeding_mode: SeedingMode,
    /// Requested mode if any, otherwise the configured one
    pub effective_seeding_mode: SeedingMode,
    /// Status of the database if it already exists on the replica
    pub existing_database: Option<DatabaseStatus>,
    pub restore_needed: bool,
}

/// Everything the execution phases need, produced by a passing prerequisite check
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JoinPlan {
    pub request: DatabaseJoinRequest,
    pub primary: String,
    pub availability_group: AvailabilityGroupInfo,
    pub database: DatabaseInfo,
    pub replicas: Vec<ReplicaPlan>,
    /// Restore chain selected from history when the last backup is reused
    pub last_backup_chain: Vec<BackupArtifact>,
}

impl JoinPlan {
    /// The RestoreNeeded set, keyed by replica name
    pub fn restore_needed(&self) -> BTreeMap<String, bool> {
        self.replicas
            .iter()
            .map(|replica| (replica.name.clone(), replica.restore_needed))
            .collect()
    }

    pub fn replicas_needing_restore(&self) -> impl Iterator<Item = &ReplicaPlan> {
        self.replicas.iter().filter(|replica| replica.restore_needed)
    }

    pub fn replica(&self, name: &str) -> Option<&ReplicaPlan> {
        self.replicas
            .iter()
            .find(|replica| replica.name.eq_ignore_ascii_case(name))
    }
}

/// Whether a replica needs a backup restored before joining: its effective
/// seeding mode is manual and the database is not already restoring there.
pub fn restore_needed(effective_mode: SeedingMode, existing: Option<&DatabaseStatus>) -> bool {
    effective_mode == SeedingMode::Manual && !existing.is_some_and(DatabaseStatus::is_restoring)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_restore_needed_truth_table() {
        assert!(restore_needed(SeedingMode::Manual, None));
        assert!(!restore_needed(
            SeedingMode::Manual,
            Some(&DatabaseStatus::Restoring)
        ));
        assert!(!restore_needed(SeedingMode::Automatic, None));
        assert!(!restore_needed(
            SeedingMode::Automatic,
            Some(&DatabaseStatus::Restoring)
        ));
    }

    #[test]
    fn test_request_builder() {
        let request = DatabaseJoinRequest::new("AG1", "DB1")
            .with_seeding_mode(SeedingMode::Automatic)
            .with_secondaries(["SQL2", "SQL3"]);
        assert_eq!(request.seeding_mode, Some(SeedingMode::Automatic));
        assert_eq!(request.secondaries, vec!["SQL2", "SQL3"]);
        assert!(!request.has_backup_source());
        assert!(request.with_shared_path("\\\\share\\backups").has_backup_source());
    }
}
