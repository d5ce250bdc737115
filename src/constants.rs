//! # System Constants
//!
//! Server version gates, documented defaults and log event names shared across
//! the join workflow.

/// SQL Server major versions
pub mod versions {
    /// First release with availability groups
    pub const SQL_SERVER_2012: u32 = 11;
    /// First release with automatic seeding
    pub const SQL_SERVER_2016: u32 = 13;
}

/// Documented defaults for the wait loops
pub mod defaults {
    pub const EXISTING_TIMEOUT_SECONDS: u64 = 60;
    /// One day
    pub const SYNC_TIMEOUT_SECONDS: u64 = 86_400;
    pub const POLL_INTERVAL_MS: u64 = 100;
}

/// Workflow phase names used in logs and outcomes
pub mod phases {
    pub const PREREQUISITES: &str = "prerequisites";
    pub const SEEDING_MODE: &str = "seeding_mode";
    pub const BACKUP_RESTORE: &str = "backup_restore";
    pub const PRIMARY_JOIN: &str = "primary_join";
    pub const SECONDARY_JOIN: &str = "secondary_join";
    pub const SYNCHRONIZATION: &str = "synchronization";
}

/// Log event names
pub mod events {
    pub const INVOCATION_STARTED: &str = "agjoin.invocation_started";
    pub const INVOCATION_COMPLETED: &str = "agjoin.invocation_completed";
    pub const DATABASE_STARTED: &str = "agjoin.database_started";
    pub const DATABASE_JOINED: &str = "agjoin.database_joined";
    pub const DATABASE_FAILED: &str = "agjoin.database_failed";
    pub const REPLICA_PHASE_FAILED: &str = "agjoin.replica_phase_failed";
    pub const SEEDING_PROGRESS: &str = "agjoin.seeding_progress";
}

/// Server permission required on a secondary for automatic seeding
pub const SEEDING_PERMISSION: &str = "CREATE ANY DATABASE";
