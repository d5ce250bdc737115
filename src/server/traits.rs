//! # Server Traits
//!
//! Seams to the outside world. The workflow never talks to SQL Server
//! directly: it drives these traits, and a driver (or the simulated backend in
//! [`crate::test_helpers`]) implements them.
//!
//! Every method is one synchronous-in-spirit round trip; the workflow awaits
//! each call before issuing the next.

use async_trait::async_trait;

use crate::error::Result;
use crate::models::{
    AvailabilityDatabaseInfo, AvailabilityGroupInfo, BackupArtifact, BackupHistoryEntry,
    BackupType, DatabaseInfo, InstanceIdentity, SeedingMode, SeedingStats,
};

use super::credential::Credential;

/// One open administrative connection to a SQL Server instance
#[async_trait]
pub trait SqlInstance: Send + Sync {
    /// Identity reported by the server
    fn identity(&self) -> &InstanceIdentity;

    /// Server major version (11 = 2012, 13 = 2016, ...)
    fn version_major(&self) -> u32;

    /// Availability group as seen from this instance
    async fn availability_group(&self, name: &str) -> Result<Option<AvailabilityGroupInfo>>;

    async fn database(&self, name: &str) -> Result<Option<DatabaseInfo>>;

    async fn backup_history(&self, database: &str) -> Result<Vec<BackupHistoryEntry>>;

    /// Availability database object for `database` in `availability_group` on this instance
    async fn availability_database(
        &self,
        availability_group: &str,
        database: &str,
    ) -> Result<Option<AvailabilityDatabaseInfo>>;

    /// Issue the create; the object starts out pending and converges server side
    async fn create_availability_database(
        &self,
        availability_group: &str,
        database: &str,
    ) -> Result<()>;

    /// Explicit join of a restored database on a secondary (manual seeding)
    async fn join_availability_group(&self, availability_group: &str, database: &str)
        -> Result<()>;

    /// Alter the seeding mode of `replica` (issued on the primary)
    async fn set_replica_seeding_mode(
        &self,
        availability_group: &str,
        replica: &str,
        mode: SeedingMode,
    ) -> Result<()>;

    /// Allow automatic seeding to create databases on this instance
    async fn grant_create_any_database(&self, availability_group: &str) -> Result<()>;

    /// Physical seeding statistics for `database` towards `remote_machine`, if any
    async fn seeding_stats(
        &self,
        database: &str,
        remote_machine: &str,
    ) -> Result<Option<SeedingStats>>;

    /// Release the connection
    async fn close(&self) -> Result<()>;
}

/// Opens connections to named instances
#[async_trait]
pub trait InstanceConnector: Send + Sync {
    async fn connect(
        &self,
        instance: &str,
        credential: Option<&Credential>,
    ) -> Result<Box<dyn SqlInstance>>;
}

/// External backup and restore collaborator
#[async_trait]
pub trait BackupRestoreService: Send + Sync {
    /// Back up `database` on `instance` into `destination`
    async fn backup(
        &self,
        instance: &dyn SqlInstance,
        database: &str,
        backup_type: BackupType,
        destination: &str,
    ) -> anyhow::Result<BackupArtifact>;

    /// Restore `artifacts`, in order, onto `instance`
    async fn restore(
        &self,
        instance: &dyn SqlInstance,
        database: &str,
        artifacts: &[BackupArtifact],
        no_recovery: bool,
    ) -> anyhow::Result<()>;
}
