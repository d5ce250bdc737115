//! # Models
//!
//! Transient, in-memory snapshots of remote server state and the units of work
//! built from them. Nothing here is persisted; every value lives for one
//! invocation at most.

pub mod availability_database;
pub mod availability_group;
pub mod backup;
pub mod database;
pub mod join_request;
pub mod records;

pub use availability_database::{
    AvailabilityDatabaseInfo, ObjectState, SeedingStats, SynchronizationState,
};
pub use availability_group::{
    AvailabilityGroupInfo, AvailabilityMode, ConnectionState, ReplicaInfo, ReplicaRole,
    SeedingMode,
};
pub use backup::{BackupArtifact, BackupHistoryEntry, BackupType};
pub use database::{DatabaseInfo, DatabaseStatus, RecoveryModel};
pub use join_request::{DatabaseJoinRequest, JoinPlan, ReplicaPlan};
pub use records::{AgDatabaseRecord, AgHealthRecord, InstanceIdentity, ReplicaHealth};
