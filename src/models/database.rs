use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RecoveryModel {
    Full,
    BulkLogged,
    Simple,
}

impl fmt::Display for RecoveryModel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Full => write!(f, "Full"),
            Self::BulkLogged => write!(f, "BulkLogged"),
            Self::Simple => write!(f, "Simple"),
        }
    }
}

/// Database status as reported by the server
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DatabaseStatus {
    Normal,
    Restoring,
    Recovering,
    Offline,
    Suspect,
    Other(String),
}

impl DatabaseStatus {
    pub fn is_restoring(&self) -> bool {
        matches!(self, Self::Restoring)
    }
}

impl fmt::Display for DatabaseStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Normal => write!(f, "Normal"),
            Self::Restoring => write!(f, "Restoring"),
            Self::Recovering => write!(f, "Recovering"),
            Self::Offline => write!(f, "Offline"),
            Self::Suspect => write!(f, "Suspect"),
            Self::Other(status) => write!(f, "{status}"),
        }
    }
}

/// Snapshot of a database on one instance
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DatabaseInfo {
    pub name: String,
    pub recovery_model: RecoveryModel,
    pub status: DatabaseStatus,
    /// `None` when the database has never been backed up
    pub last_backup_date: Option<DateTime<Utc>>,
    /// Availability group the database belongs to, if any
    pub availability_group: Option<String>,
}

impl DatabaseInfo {
    pub fn has_been_backed_up(&self) -> bool {
        self.last_backup_date.is_some()
    }
}
