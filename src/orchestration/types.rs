//! # Orchestration Types
//!
//! Outcomes reported by the join workflow: per phase, per replica, per
//! database and per invocation.

use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

use crate::constants::phases;
use crate::error::AgJoinError;
use crate::models::{AgDatabaseRecord, JoinPlan};

/// Workflow phases, in execution order
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JoinPhase {
    Prerequisites,
    SeedingMode,
    BackupRestore,
    PrimaryJoin,
    SecondaryJoin,
    Synchronization,
}

impl JoinPhase {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Prerequisites => phases::PREREQUISITES,
            Self::SeedingMode => phases::SEEDING_MODE,
            Self::BackupRestore => phases::BACKUP_RESTORE,
            Self::PrimaryJoin => phases::PRIMARY_JOIN,
            Self::SecondaryJoin => phases::SECONDARY_JOIN,
            Self::Synchronization => phases::SYNCHRONIZATION,
        }
    }
}

impl fmt::Display for JoinPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Verbose reasoning recorded for one replica while checking prerequisites
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReplicaDiagnostic {
    pub replica: String,
    /// `None` when the replica could not be evaluated far enough to decide
    pub restore_needed: Option<bool>,
    pub notes: Vec<String>,
}

impl ReplicaDiagnostic {
    pub fn new(replica: impl Into<String>) -> Self {
        Self {
            replica: replica.into(),
            ..Default::default()
        }
    }

    pub fn note(&mut self, note: impl Into<String>) {
        let note = note.into();
        tracing::debug!(replica = %self.replica, "{note}");
        self.notes.push(note);
    }
}

/// Every reason a database cannot be added right now
#[derive(Debug, Clone, PartialEq)]
pub struct PrerequisiteReport {
    pub database: String,
    pub failures: Vec<AgJoinError>,
    /// The failure concerns the primary or the AG as a whole, so no other
    /// database in the invocation can succeed either
    pub halts_invocation: bool,
    pub diagnostics: Vec<ReplicaDiagnostic>,
}

/// Result of a prerequisite check: a plan or a list of reasons, never both
#[derive(Debug, Clone, PartialEq)]
pub enum PrerequisiteOutcome {
    Ready {
        plan: JoinPlan,
        diagnostics: Vec<ReplicaDiagnostic>,
    },
    Rejected(PrerequisiteReport),
}

impl PrerequisiteOutcome {
    pub fn is_ready(&self) -> bool {
        matches!(self, Self::Ready { .. })
    }

    pub fn plan(&self) -> Option<&JoinPlan> {
        match self {
            Self::Ready { plan, .. } => Some(plan),
            Self::Rejected(_) => None,
        }
    }

    pub fn failures(&self) -> &[AgJoinError] {
        match self {
            Self::Ready { .. } => &[],
            Self::Rejected(report) => &report.failures,
        }
    }

    pub fn diagnostics(&self) -> &[ReplicaDiagnostic] {
        match self {
            Self::Ready { diagnostics, .. } => diagnostics,
            Self::Rejected(report) => &report.diagnostics,
        }
    }
}

/// What one phase did across the replicas it touched
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PhaseReport {
    pub succeeded: Vec<String>,
    pub skipped: Vec<String>,
    pub failures: Vec<AgJoinError>,
}

impl PhaseReport {
    pub fn is_success(&self) -> bool {
        self.failures.is_empty()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JoinStatus {
    Joined,
    /// Dry run: prerequisites passed, nothing was changed
    Planned,
    Failed { phase: JoinPhase },
}

/// How far one replica leg of a database got
#[derive(Debug, Clone, PartialEq)]
pub struct ReplicaOutcome {
    pub replica: String,
    /// Last phase this replica completed
    pub completed: Option<JoinPhase>,
    pub failure: Option<(JoinPhase, AgJoinError)>,
}

impl ReplicaOutcome {
    pub fn new(replica: impl Into<String>) -> Self {
        Self {
            replica: replica.into(),
            completed: None,
            failure: None,
        }
    }
}

/// Result of processing one database
#[derive(Debug, Clone, PartialEq)]
pub struct DatabaseJoinOutcome {
    pub database: String,
    pub availability_group: String,
    pub status: JoinStatus,
    pub errors: Vec<AgJoinError>,
    pub replicas: Vec<ReplicaOutcome>,
    pub records: Vec<AgDatabaseRecord>,
    pub diagnostics: Vec<ReplicaDiagnostic>,
    pub plan: Option<JoinPlan>,
    /// Mutations a dry run would have issued
    pub planned_actions: Vec<String>,
}

impl DatabaseJoinOutcome {
    pub fn new(availability_group: impl Into<String>, database: impl Into<String>) -> Self {
        Self {
            database: database.into(),
            availability_group: availability_group.into(),
            status: JoinStatus::Failed {
                phase: JoinPhase::Prerequisites,
            },
            errors: Vec::new(),
            replicas: Vec::new(),
            records: Vec::new(),
            diagnostics: Vec::new(),
            plan: None,
            planned_actions: Vec::new(),
        }
    }

    pub fn is_joined(&self) -> bool {
        self.status == JoinStatus::Joined
    }

    pub fn failed_phase(&self) -> Option<JoinPhase> {
        match self.status {
            JoinStatus::Failed { phase } => Some(phase),
            _ => None,
        }
    }

    pub fn replica(&self, name: &str) -> Option<&ReplicaOutcome> {
        self.replicas
            .iter()
            .find(|outcome| outcome.replica.eq_ignore_ascii_case(name))
    }

    pub(crate) fn replica_mut(&mut self, name: &str) -> &mut ReplicaOutcome {
        let index = match self
            .replicas
            .iter()
            .position(|outcome| outcome.replica.eq_ignore_ascii_case(name))
        {
            Some(index) => index,
            None => {
                self.replicas.push(ReplicaOutcome::new(name));
                self.replicas.len() - 1
            }
        };
        &mut self.replicas[index]
    }

    /// Mark every listed replica as having completed `phase`
    pub(crate) fn complete_phase<'a>(
        &mut self,
        phase: JoinPhase,
        replicas: impl IntoIterator<Item = &'a String>,
    ) {
        for replica in replicas {
            self.replica_mut(replica).completed = Some(phase);
        }
    }

    /// Record a failure against its replica (when it has one) and the database
    pub(crate) fn record_failure(&mut self, phase: JoinPhase, error: AgJoinError) {
        if let Some(replica) = error.replica().map(str::to_string) {
            self.replica_mut(&replica).failure = Some((phase, error.clone()));
        }
        self.errors.push(error);
    }

    pub(crate) fn fail(&mut self, phase: JoinPhase) {
        self.status = JoinStatus::Failed { phase };
    }
}

/// Result of one invocation over a batch of databases
#[derive(Debug, Clone, PartialEq)]
pub struct InvocationReport {
    pub run_id: Uuid,
    pub primary: String,
    pub availability_group: String,
    pub outcomes: Vec<DatabaseJoinOutcome>,
    /// Set when a failure stopped the batch before every database was attempted
    pub aborted: Option<AgJoinError>,
}

impl InvocationReport {
    pub fn records(&self) -> impl Iterator<Item = &AgDatabaseRecord> {
        self.outcomes.iter().flat_map(|outcome| outcome.records.iter())
    }

    pub fn outcome(&self, database: &str) -> Option<&DatabaseJoinOutcome> {
        self.outcomes
            .iter()
            .find(|outcome| outcome.database.eq_ignore_ascii_case(database))
    }

    pub fn all_joined(&self) -> bool {
        self.aborted.is_none() && self.outcomes.iter().all(DatabaseJoinOutcome::is_joined)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_phase_order() {
        assert!(JoinPhase::Prerequisites < JoinPhase::SeedingMode);
        assert!(JoinPhase::SecondaryJoin < JoinPhase::Synchronization);
        assert_eq!(JoinPhase::BackupRestore.to_string(), "backup_restore");
    }

    #[test]
    fn test_record_failure_scopes_to_replica() {
        let mut outcome = DatabaseJoinOutcome::new("AG1", "DB1");
        outcome.complete_phase(
            JoinPhase::SecondaryJoin,
            &["SQL2".to_string(), "SQL3".to_string()],
        );
        outcome.record_failure(
            JoinPhase::Synchronization,
            AgJoinError::SeedingFailed {
                replica: "SQL3".to_string(),
                database: "DB1".to_string(),
                message: "boom".to_string(),
            },
        );
        outcome.fail(JoinPhase::Synchronization);

        assert_eq!(outcome.failed_phase(), Some(JoinPhase::Synchronization));
        assert!(outcome.replica("SQL2").unwrap().failure.is_none());
        let sql3 = outcome.replica("sql3").unwrap();
        assert_eq!(sql3.completed, Some(JoinPhase::SecondaryJoin));
        assert_eq!(sql3.failure.as_ref().unwrap().0, JoinPhase::Synchronization);
        assert_eq!(outcome.errors.len(), 1);
    }
}
