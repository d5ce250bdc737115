//! # Orchestration Engine
//!
//! Sequential workflow that adds databases to an availability group.
//!
//! ## Architecture
//!
//! Each phase is a small component that reads a [`JoinPlan`](crate::models::JoinPlan)
//! and talks to servers only through the traits in [`crate::server`]:
//!
//! - **PrerequisiteChecker**: checks the AG, the database and every secondary, then builds the plan
//! - **SeedingReconciler**: aligns replica seeding modes with the requested mode
//! - **BackupRestoreCoordinator**: full and log backup, restore with no recovery
//! - **PrimaryJoinOperator** / **SecondaryJoinOperator**: create, wait for `Existing`, join
//! - **SyncWaiter**: polls secondaries until each reaches its target synchronization state
//! - **AgDatabaseJoiner**: runs the phases for each database of a batch
//! - **AvailabilityGroupTester**: health and prerequisite checks with no changes
//!
//! Every wait is sleep-then-poll through [`polling::PollTimer`], which honors
//! the caller's cancellation token on every iteration.

pub mod ag_tester;
pub mod backup_restore;
pub mod polling;
pub mod prerequisite_checker;
pub mod primary_join;
pub mod secondary_join;
pub mod seeding_reconciler;
pub mod sync_waiter;
pub mod types;
pub mod workflow;

pub use ag_tester::AvailabilityGroupTester;
pub use backup_restore::BackupRestoreCoordinator;
pub use polling::{PollPolicy, PollTimer};
pub use prerequisite_checker::{check_availability_group, PrerequisiteChecker};
pub use primary_join::PrimaryJoinOperator;
pub use secondary_join::{SecondaryJoinOperator, SecondaryJoinResult};
pub use seeding_reconciler::SeedingReconciler;
pub use sync_waiter::SyncWaiter;
pub use types::{
    DatabaseJoinOutcome, InvocationReport, JoinPhase, JoinStatus, PhaseReport,
    PrerequisiteOutcome, PrerequisiteReport, ReplicaDiagnostic, ReplicaOutcome,
};
pub use workflow::{planned_actions, AgDatabaseJoiner, JoinOptions};
