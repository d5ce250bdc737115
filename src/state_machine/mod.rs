// Synchronization state machine for secondaries joining an availability group.
//
// Each secondary of a database being added moves from Waiting to Synced once
// it reports IsJoined and the synchronization state its availability mode
// implies. A seeding failure is a terminal state of its own.

pub mod events;
pub mod states;
pub mod sync_state_machine;

pub use events::SyncEvent;
pub use states::{ReplicaSyncState, TargetSynchronizationState};
pub use sync_state_machine::{DatabaseSyncTracker, ReplicaSyncMachine};
