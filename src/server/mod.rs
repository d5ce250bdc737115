//! # Server Boundary
//!
//! Traits the workflow drives, caller input dispatch, and ownership of the
//! per-invocation replica connections.

pub mod connections;
pub mod credential;
pub mod input;
pub mod traits;

pub use connections::ReplicaConnections;
pub use credential::Credential;
pub use input::{resolve_inputs, ResolvedTargets, ServerInput};
pub use traits::{BackupRestoreService, InstanceConnector, SqlInstance};
