use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BackupType {
    Full,
    Differential,
    Log,
}

impl fmt::Display for BackupType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Full => write!(f, "Full"),
            Self::Differential => write!(f, "Differential"),
            Self::Log => write!(f, "Log"),
        }
    }
}

/// One row of backup history for a database
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BackupHistoryEntry {
    pub database: String,
    pub backup_type: BackupType,
    pub finished_at: DateTime<Utc>,
    pub paths: Vec<String>,
}

/// A restorable backup produced by, or selected for, this workflow
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BackupArtifact {
    pub database: String,
    pub backup_type: BackupType,
    pub paths: Vec<String>,
}

impl From<&BackupHistoryEntry> for BackupArtifact {
    fn from(entry: &BackupHistoryEntry) -> Self {
        Self {
            database: entry.database.clone(),
            backup_type: entry.backup_type,
            paths: entry.paths.clone(),
        }
    }
}

/// Most recent backup, by finish time
pub fn latest_backup(history: &[BackupHistoryEntry]) -> Option<&BackupHistoryEntry> {
    history.iter().max_by_key(|entry| entry.finished_at)
}

/// Restore chain ending at the most recent backup: the latest full, the latest
/// differential taken after it, then every log backup after that, in order.
///
/// Returns an empty chain when no full backup exists.
pub fn select_restore_chain(history: &[BackupHistoryEntry]) -> Vec<BackupArtifact> {
    let mut ordered: Vec<&BackupHistoryEntry> = history.iter().collect();
    ordered.sort_by_key(|entry| entry.finished_at);

    let Some(full_index) = ordered
        .iter()
        .rposition(|entry| entry.backup_type == BackupType::Full)
    else {
        return Vec::new();
    };

    let mut chain = vec![BackupArtifact::from(ordered[full_index])];
    let after_full = &ordered[full_index + 1..];

    let diff_index = after_full
        .iter()
        .rposition(|entry| entry.backup_type == BackupType::Differential);
    let logs_from = match diff_index {
        Some(index) => {
            chain.push(BackupArtifact::from(after_full[index]));
            index + 1
        }
        None => 0,
    };

    chain.extend(
        after_full[logs_from..]
            .iter()
            .filter(|entry| entry.backup_type == BackupType::Log)
            .map(|entry| BackupArtifact::from(*entry)),
    );
    chain
}
