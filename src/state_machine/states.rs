use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::{AgJoinError, Result};
use crate::models::{AvailabilityMode, SynchronizationState};

/// Synchronization state a secondary must report before its wait ends
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TargetSynchronizationState {
    /// Asynchronous-commit replicas never report Synchronized
    Synchronizing,
    Synchronized,
}

impl TargetSynchronizationState {
    /// Derive the target from a replica's availability mode.
    ///
    /// Only the two commit modes have a target; anything else is an error
    /// rather than a guessed default.
    pub fn for_availability_mode(replica: &str, mode: AvailabilityMode) -> Result<Self> {
        match mode {
            AvailabilityMode::AsynchronousCommit => Ok(Self::Synchronizing),
            AvailabilityMode::SynchronousCommit => Ok(Self::Synchronized),
            other => Err(AgJoinError::UnexpectedAvailabilityMode {
                replica: replica.to_string(),
                mode: other.to_string(),
            }),
        }
    }

    pub fn is_reached_by(&self, observed: SynchronizationState) -> bool {
        match self {
            Self::Synchronizing => observed == SynchronizationState::Synchronizing,
            Self::Synchronized => observed == SynchronizationState::Synchronized,
        }
    }
}

impl fmt::Display for TargetSynchronizationState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Synchronizing => write!(f, "Synchronizing"),
            Self::Synchronized => write!(f, "Synchronized"),
        }
    }
}

/// Per-replica state while waiting for synchronization
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReplicaSyncState {
    /// Not yet joined, or joined but not at the target state
    #[default]
    Waiting,
    /// Joined and at the target state
    Synced,
    /// Server reported a seeding failure for this replica
    SeedingFailed,
}

impl ReplicaSyncState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Synced | Self::SeedingFailed)
    }
}

impl fmt::Display for ReplicaSyncState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Waiting => write!(f, "waiting"),
            Self::Synced => write!(f, "synced"),
            Self::SeedingFailed => write!(f, "seeding_failed"),
        }
    }
}
