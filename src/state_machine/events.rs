use serde::{Deserialize, Serialize};

use crate::models::SynchronizationState;

/// Observations that drive a replica's synchronization state
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum SyncEvent {
    /// A refresh of the replica's availability database object
    Observed {
        is_joined: bool,
        synchronization_state: SynchronizationState,
    },
    /// Seeding statistics carried a failure message
    SeedingFailure(String),
}

impl SyncEvent {
    pub fn observed(is_joined: bool, synchronization_state: SynchronizationState) -> Self {
        Self::Observed {
            is_joined,
            synchronization_state,
        }
    }

    /// String representation of the event type for logging
    pub fn event_type(&self) -> &'static str {
        match self {
            Self::Observed { .. } => "observed",
            Self::SeedingFailure(_) => "seeding_failure",
        }
    }

    pub fn error_message(&self) -> Option<&str> {
        match self {
            Self::SeedingFailure(message) => Some(message),
            Self::Observed { .. } => None,
        }
    }
}
