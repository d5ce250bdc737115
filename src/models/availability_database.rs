use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Lifecycle of a server-side object after a create call
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ObjectState {
    /// Create issued, not yet confirmed by the server
    Pending,
    Creating,
    Existing,
    Dropped,
}

impl fmt::Display for ObjectState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Pending => write!(f, "Pending"),
            Self::Creating => write!(f, "Creating"),
            Self::Existing => write!(f, "Existing"),
            Self::Dropped => write!(f, "Dropped"),
        }
    }
}

/// Catch-up status of a database on a replica
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SynchronizationState {
    NotSynchronizing,
    Synchronizing,
    Synchronized,
    Reverting,
    Initializing,
}

impl fmt::Display for SynchronizationState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotSynchronizing => write!(f, "NotSynchronizing"),
            Self::Synchronizing => write!(f, "Synchronizing"),
            Self::Synchronized => write!(f, "Synchronized"),
            Self::Reverting => write!(f, "Reverting"),
            Self::Initializing => write!(f, "Initializing"),
        }
    }
}

/// Availability database object on one replica
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AvailabilityDatabaseInfo {
    pub availability_group: String,
    pub name: String,
    pub state: ObjectState,
    pub is_joined: bool,
    pub synchronization_state: SynchronizationState,
}

/// Row of the server's physical seeding statistics for one database and target
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SeedingStats {
    pub local_database_name: String,
    pub remote_machine_name: String,
    pub transferred_size_bytes: u64,
    pub database_size_bytes: u64,
    pub estimate_time_complete_utc: Option<DateTime<Utc>>,
    pub failure_message: Option<String>,
}

impl SeedingStats {
    /// Percentage transferred, clamped to 0..=100
    pub fn percent_complete(&self) -> f64 {
        if self.database_size_bytes == 0 {
            return 0.0;
        }
        let ratio = self.transferred_size_bytes as f64 / self.database_size_bytes as f64;
        (ratio * 100.0).clamp(0.0, 100.0)
    }

    /// Time left until the server's estimated completion, if one is known
    pub fn estimated_remaining(&self, now: DateTime<Utc>) -> Option<chrono::Duration> {
        self.estimate_time_complete_utc
            .map(|eta| (eta - now).max(chrono::Duration::zero()))
    }

    pub fn has_failed(&self) -> bool {
        self.failure_message
            .as_deref()
            .is_some_and(|message| !message.trim().is_empty())
    }
}
