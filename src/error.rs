//! # Error Types
//!
//! Failure taxonomy for the availability group join workflow.
//!
//! Every variant carries the replica, database and observed-versus-expected
//! context needed to act on it without re-running the command. Errors are
//! scoped: most are recorded against a single database (or a single replica
//! leg of a database) and the batch moves on, while a small set returned by
//! [`AgJoinError::is_invocation_fatal`] means the primary connection or the
//! availability group itself is unusable and the whole invocation stops.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;
use thiserror::Error;

use crate::config::ConfigurationError;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum AgJoinError {
    #[error("Availability group {availability_group} not found on {instance}")]
    AvailabilityGroupNotFound {
        instance: String,
        availability_group: String,
    },

    #[error("Database {database} not found on {instance}")]
    DatabaseNotFound { instance: String, database: String },

    #[error("Replica {replica} not found in availability group {availability_group}: {reason}")]
    ReplicaNotFound {
        replica: String,
        availability_group: String,
        reason: String,
    },

    #[error("{instance} is {actual} for availability group {availability_group}, expected {expected}{}",
        .primary.as_ref().map(|p| format!("; connect to primary {p} instead")).unwrap_or_default())]
    WrongReplica {
        instance: String,
        availability_group: String,
        expected: String,
        actual: String,
        primary: Option<String>,
    },

    #[error("Replica {replica} of availability group {availability_group} is unreachable: {reason}")]
    ReplicaUnreachable {
        replica: String,
        availability_group: String,
        reason: String,
    },

    #[error("{feature} is not supported on {instance} (version {version}, requires {required})")]
    UnsupportedFeature {
        instance: String,
        feature: String,
        version: u32,
        required: u32,
    },

    #[error("Database {database} on {instance} uses recovery model {actual}, availability groups require Full")]
    InvalidRecoveryModel {
        instance: String,
        database: String,
        actual: String,
    },

    #[error("Database {database} on {instance} is in state {actual}, expected {expected}")]
    InvalidDatabaseState {
        instance: String,
        database: String,
        expected: String,
        actual: String,
    },

    #[error("Last backup of {database} is {actual}, a log backup is required to use the last backup")]
    InvalidBackupChain { database: String, actual: String },

    #[error("Database {database} is already joined to availability group {availability_group}")]
    AlreadyJoined {
        database: String,
        availability_group: String,
    },

    #[error("Database {database} already exists on replica {replica} in state {actual}, expected Restoring")]
    ReplicaDatabaseConflict {
        replica: String,
        database: String,
        actual: String,
    },

    #[error("Database {database} is already restoring on replica {replica}; cannot also restore the last backup")]
    ConflictingRestoreSource { replica: String, database: String },

    #[error("Replicas {replicas:?} need a restore of {database} but neither a shared path nor the last backup was supplied")]
    MissingBackupSource {
        database: String,
        replicas: Vec<String>,
    },

    #[error("Database {database} has never been backed up; automatic seeding requires an existing backup")]
    NoBackupAvailableForSeeding { database: String },

    #[error("Failed to change seeding mode of replica {replica} to {seeding_mode}: {reason}")]
    ReplicaAlterFailed {
        replica: String,
        seeding_mode: String,
        reason: String,
    },

    #[error("{backup_type} backup of {database} on {instance} failed: {reason}")]
    BackupFailed {
        instance: String,
        database: String,
        backup_type: String,
        reason: String,
    },

    #[error("Restore of {database} on replica {replica} failed: {reason}")]
    RestoreFailed {
        replica: String,
        database: String,
        reason: String,
    },

    #[error("Availability database {database} on {replica} did not reach Existing within {timeout:?} (last state {observed})")]
    JoinTimeout {
        replica: String,
        database: String,
        observed: String,
        timeout: Duration,
    },

    #[error("Automatic seeding of {database} to {replica} failed: {message}")]
    SeedingFailed {
        replica: String,
        database: String,
        message: String,
    },

    #[error("Database {database} did not synchronize within {timeout:?}; pending replicas: {pending:?}")]
    SyncTimeout {
        database: String,
        timeout: Duration,
        pending: Vec<PendingReplica>,
    },

    #[error("Replica {replica} has unexpected availability mode {mode}")]
    UnexpectedAvailabilityMode { replica: String, mode: String },

    #[error("Operation cancelled while {operation}")]
    Cancelled { operation: String },

    #[error("Unsupported input: {0}")]
    UnsupportedInput(String),

    #[error("Failed to connect to {instance}: {reason}")]
    Connection { instance: String, reason: String },

    #[error("{operation} failed on {instance}: {reason}")]
    Remote {
        instance: String,
        operation: String,
        reason: String,
    },

    #[error("Configuration error: {0}")]
    Configuration(String),
}

/// A replica that had not reached its target state when a wait gave up
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PendingReplica {
    pub replica: String,
    pub is_joined: bool,
    pub observed: String,
    pub target: String,
}

impl fmt::Display for PendingReplica {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} (joined={}, state={}, target={})",
            self.replica, self.is_joined, self.observed, self.target
        )
    }
}

/// Stable error codes, one per taxonomy entry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    NotFound,
    DatabaseNotFound,
    ReplicaNotFound,
    WrongReplica,
    ReplicaUnreachable,
    UnsupportedFeature,
    InvalidRecoveryModel,
    InvalidDatabaseState,
    InvalidBackupChain,
    AlreadyJoined,
    ReplicaDatabaseConflict,
    ConflictingRestoreSource,
    MissingBackupSource,
    NoBackupAvailableForSeeding,
    ReplicaAlterFailed,
    BackupFailed,
    RestoreFailed,
    JoinTimeout,
    SeedingFailed,
    SyncTimeout,
    UnexpectedAvailabilityMode,
    Cancelled,
    UnsupportedInput,
    Connection,
    Remote,
    Configuration,
}

impl AgJoinError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::AvailabilityGroupNotFound { .. } => ErrorKind::NotFound,
            Self::DatabaseNotFound { .. } => ErrorKind::DatabaseNotFound,
            Self::ReplicaNotFound { .. } => ErrorKind::ReplicaNotFound,
            Self::WrongReplica { .. } => ErrorKind::WrongReplica,
            Self::ReplicaUnreachable { .. } => ErrorKind::ReplicaUnreachable,
            Self::UnsupportedFeature { .. } => ErrorKind::UnsupportedFeature,
            Self::InvalidRecoveryModel { .. } => ErrorKind::InvalidRecoveryModel,
            Self::InvalidDatabaseState { .. } => ErrorKind::InvalidDatabaseState,
            Self::InvalidBackupChain { .. } => ErrorKind::InvalidBackupChain,
            Self::AlreadyJoined { .. } => ErrorKind::AlreadyJoined,
            Self::ReplicaDatabaseConflict { .. } => ErrorKind::ReplicaDatabaseConflict,
            Self::ConflictingRestoreSource { .. } => ErrorKind::ConflictingRestoreSource,
            Self::MissingBackupSource { .. } => ErrorKind::MissingBackupSource,
            Self::NoBackupAvailableForSeeding { .. } => ErrorKind::NoBackupAvailableForSeeding,
            Self::ReplicaAlterFailed { .. } => ErrorKind::ReplicaAlterFailed,
            Self::BackupFailed { .. } => ErrorKind::BackupFailed,
            Self::RestoreFailed { .. } => ErrorKind::RestoreFailed,
            Self::JoinTimeout { .. } => ErrorKind::JoinTimeout,
            Self::SeedingFailed { .. } => ErrorKind::SeedingFailed,
            Self::SyncTimeout { .. } => ErrorKind::SyncTimeout,
            Self::UnexpectedAvailabilityMode { .. } => ErrorKind::UnexpectedAvailabilityMode,
            Self::Cancelled { .. } => ErrorKind::Cancelled,
            Self::UnsupportedInput(_) => ErrorKind::UnsupportedInput,
            Self::Connection { .. } => ErrorKind::Connection,
            Self::Remote { .. } => ErrorKind::Remote,
            Self::Configuration(_) => ErrorKind::Configuration,
        }
    }

    /// Whether this error makes every remaining database in the invocation
    /// impossible to process.
    ///
    /// Primary-side role and AG health failures are also invocation-wide but
    /// are flagged by the prerequisite checker, which knows which side of the
    /// AG raised them.
    pub fn is_invocation_fatal(&self) -> bool {
        matches!(
            self,
            Self::AvailabilityGroupNotFound { .. }
                | Self::Connection { .. }
                | Self::Cancelled { .. }
                | Self::UnsupportedInput(_)
                | Self::Configuration(_)
        )
    }

    /// Replica (or instance) the error is scoped to, if any
    pub fn replica(&self) -> Option<&str> {
        match self {
            Self::ReplicaNotFound { replica, .. }
            | Self::ReplicaUnreachable { replica, .. }
            | Self::ReplicaDatabaseConflict { replica, .. }
            | Self::ConflictingRestoreSource { replica, .. }
            | Self::ReplicaAlterFailed { replica, .. }
            | Self::RestoreFailed { replica, .. }
            | Self::JoinTimeout { replica, .. }
            | Self::SeedingFailed { replica, .. }
            | Self::UnexpectedAvailabilityMode { replica, .. } => Some(replica),
            Self::WrongReplica { instance, .. }
            | Self::Connection { instance, .. }
            | Self::Remote { instance, .. } => Some(instance),
            _ => None,
        }
    }

    pub fn remote(
        instance: impl Into<String>,
        operation: impl Into<String>,
        reason: impl fmt::Display,
    ) -> Self {
        Self::Remote {
            instance: instance.into(),
            operation: operation.into(),
            reason: reason.to_string(),
        }
    }

    pub fn cancelled(operation: impl Into<String>) -> Self {
        Self::Cancelled {
            operation: operation.into(),
        }
    }
}

impl From<ConfigurationError> for AgJoinError {
    fn from(error: ConfigurationError) -> Self {
        AgJoinError::Configuration(error.to_string())
    }
}

pub type Result<T> = std::result::Result<T, AgJoinError>;
