use tracing::debug;

use super::events::SyncEvent;
use super::states::{ReplicaSyncState, TargetSynchronizationState};
use crate::error::PendingReplica;
use crate::models::{SeedingMode, SynchronizationState};

/// Synchronization state machine for one secondary replica of one database
#[derive(Debug, Clone)]
pub struct ReplicaSyncMachine {
    replica: String,
    target: TargetSynchronizationState,
    seeding_mode: SeedingMode,
    state: ReplicaSyncState,
    last_joined: bool,
    last_observed: Option<SynchronizationState>,
    failure_message: Option<String>,
}

impl ReplicaSyncMachine {
    pub fn new(
        replica: impl Into<String>,
        target: TargetSynchronizationState,
        seeding_mode: SeedingMode,
    ) -> Self {
        Self {
            replica: replica.into(),
            target,
            seeding_mode,
            state: ReplicaSyncState::default(),
            last_joined: false,
            last_observed: None,
            failure_message: None,
        }
    }

    pub fn replica(&self) -> &str {
        &self.replica
    }

    pub fn target(&self) -> TargetSynchronizationState {
        self.target
    }

    pub fn seeding_mode(&self) -> SeedingMode {
        self.seeding_mode
    }

    pub fn state(&self) -> ReplicaSyncState {
        self.state
    }

    pub fn failure_message(&self) -> Option<&str> {
        self.failure_message.as_deref()
    }

    /// Apply an event and return the resulting state. Terminal states absorb
    /// every further event.
    pub fn apply(&mut self, event: &SyncEvent) -> ReplicaSyncState {
        if self.state.is_terminal() {
            return self.state;
        }

        let next = self.determine_next_state(event);
        if let SyncEvent::Observed {
            is_joined,
            synchronization_state,
        } = event
        {
            self.last_joined = *is_joined;
            self.last_observed = Some(*synchronization_state);
        }
        if let Some(message) = event.error_message() {
            self.failure_message = Some(message.to_string());
        }

        if next != self.state {
            debug!(
                replica = %self.replica,
                from = %self.state,
                to = %next,
                event = event.event_type(),
                "Replica synchronization state changed"
            );
        }
        self.state = next;
        next
    }

    /// Pure transition function, exposed for testing
    pub fn determine_next_state(&self, event: &SyncEvent) -> ReplicaSyncState {
        match (self.state, event) {
            (state, _) if state.is_terminal() => state,
            (
                ReplicaSyncState::Waiting,
                SyncEvent::Observed {
                    is_joined: true,
                    synchronization_state,
                },
            ) if self.target.is_reached_by(*synchronization_state) => ReplicaSyncState::Synced,
            (ReplicaSyncState::Waiting, SyncEvent::Observed { .. }) => ReplicaSyncState::Waiting,
            (ReplicaSyncState::Waiting, SyncEvent::SeedingFailure(_)) => {
                ReplicaSyncState::SeedingFailed
            }
            (state, _) => state,
        }
    }

    pub fn pending_snapshot(&self) -> PendingReplica {
        PendingReplica {
            replica: self.replica.clone(),
            is_joined: self.last_joined,
            observed: self
                .last_observed
                .map(|state| state.to_string())
                .unwrap_or_else(|| "not observed".to_string()),
            target: self.target.to_string(),
        }
    }
}

/// Synchronization state of every secondary for one database
#[derive(Debug, Clone)]
pub struct DatabaseSyncTracker {
    database: String,
    replicas: Vec<ReplicaSyncMachine>,
}

impl DatabaseSyncTracker {
    pub fn new(database: impl Into<String>, replicas: Vec<ReplicaSyncMachine>) -> Self {
        Self {
            database: database.into(),
            replicas,
        }
    }

    pub fn database(&self) -> &str {
        &self.database
    }

    pub fn replicas(&self) -> &[ReplicaSyncMachine] {
        &self.replicas
    }

    pub fn replica_mut(&mut self, name: &str) -> Option<&mut ReplicaSyncMachine> {
        self.replicas
            .iter_mut()
            .find(|machine| machine.replica.eq_ignore_ascii_case(name))
    }

    /// Names of replicas still waiting, in replica order
    pub fn waiting(&self) -> Vec<String> {
        self.replicas
            .iter()
            .filter(|machine| machine.state == ReplicaSyncState::Waiting)
            .map(|machine| machine.replica.clone())
            .collect()
    }

    pub fn all_synced(&self) -> bool {
        self.replicas
            .iter()
            .all(|machine| machine.state == ReplicaSyncState::Synced)
    }

    pub fn first_failure(&self) -> Option<&ReplicaSyncMachine> {
        self.replicas
            .iter()
            .find(|machine| machine.state == ReplicaSyncState::SeedingFailed)
    }

    pub fn pending(&self) -> Vec<PendingReplica> {
        self.replicas
            .iter()
            .filter(|machine| !machine.state.is_terminal())
            .map(ReplicaSyncMachine::pending_snapshot)
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn machine(target: TargetSynchronizationState) -> ReplicaSyncMachine {
        ReplicaSyncMachine::new("SQL2", target, SeedingMode::Manual)
    }

    #[test]
    fn test_waiting_until_joined_and_on_target() {
        let mut m = machine(TargetSynchronizationState::Synchronized);

        let state = m.apply(&SyncEvent::observed(
            false,
            SynchronizationState::Synchronized,
        ));
        assert_eq!(state, ReplicaSyncState::Waiting);

        let state = m.apply(&SyncEvent::observed(
            true,
            SynchronizationState::Synchronizing,
        ));
        assert_eq!(state, ReplicaSyncState::Waiting);

        let state = m.apply(&SyncEvent::observed(true, SynchronizationState::Synchronized));
        assert_eq!(state, ReplicaSyncState::Synced);
    }

    #[test]
    fn test_terminal_states_absorb_events() {
        let mut m = machine(TargetSynchronizationState::Synchronizing);
        m.apply(&SyncEvent::SeedingFailure("out of space".to_string()));
        assert_eq!(m.state(), ReplicaSyncState::SeedingFailed);
        assert_eq!(m.failure_message(), Some("out of space"));

        let state = m.apply(&SyncEvent::observed(
            true,
            SynchronizationState::Synchronizing,
        ));
        assert_eq!(state, ReplicaSyncState::SeedingFailed);
    }

    #[test]
    fn test_tracker_reports_pending_with_observations() {
        let mut tracker = DatabaseSyncTracker::new(
            "DB1",
            vec![
                ReplicaSyncMachine::new(
                    "SQL2",
                    TargetSynchronizationState::Synchronizing,
                    SeedingMode::Manual,
                ),
                ReplicaSyncMachine::new(
                    "SQL3",
                    TargetSynchronizationState::Synchronized,
                    SeedingMode::Automatic,
                ),
            ],
        );

        tracker
            .replica_mut("sql2")
            .unwrap()
            .apply(&SyncEvent::observed(true, SynchronizationState::Synchronizing));
        tracker
            .replica_mut("SQL3")
            .unwrap()
            .apply(&SyncEvent::observed(false, SynchronizationState::NotSynchronizing));

        assert!(!tracker.all_synced());
        assert_eq!(tracker.waiting(), vec!["SQL3".to_string()]);

        let pending = tracker.pending();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].replica, "SQL3");
        assert_eq!(pending[0].observed, "NotSynchronizing");
        assert_eq!(pending[0].target, "Synchronized");
        assert!(tracker.first_failure().is_none());
    }
}
