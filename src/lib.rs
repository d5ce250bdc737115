#![allow(clippy::doc_markdown)] // Allow technical terms like SQL Server, AlwaysOn in docs
#![allow(clippy::missing_errors_doc)] // Allow public functions without # Errors sections
#![allow(clippy::must_use_candidate)] // Allow methods without must_use when context is clear

//! # AG Join Core
//!
//! Orchestrates adding user databases to a SQL Server Availability Group.
//!
//! ## Overview
//!
//! Adding a database to an availability group is a multi-step, multi-server
//! operation: the primary and every secondary must agree on the database's
//! state, manually seeded secondaries need a backup restored first, and the
//! operation is only done once each secondary reports the synchronization
//! state its availability mode implies. This crate runs that workflow
//! against abstract server connections and reports exactly how far each
//! database and each replica got.
//!
//! ## Module Organization
//!
//! - [`orchestration`] - Prerequisite checks, seeding, join and synchronization phases
//! - [`state_machine`] - Per-replica synchronization state machine
//! - [`models`] - Snapshots of server state and units of work
//! - [`server`] - Traits to SQL Server and the backup collaborator, input dispatch
//! - [`config`] - Timeouts, poll interval and version gates
//! - [`error`] - Structured error taxonomy
//! - [`logging`] - Structured logging setup
//! - [`test_helpers`] - Simulated server estate for tests
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use agjoin_core::config::ConfigManager;
//! use agjoin_core::orchestration::{AgDatabaseJoiner, JoinOptions};
//! use agjoin_core::server::{BackupRestoreService, InstanceConnector, ServerInput};
//! use tokio_util::sync::CancellationToken;
//!
//! # async fn example(
//! #     connector: Arc<dyn InstanceConnector>,
//! #     backups: Arc<dyn BackupRestoreService>,
//! # ) -> Result<(), Box<dyn std::error::Error>> {
//! let manager = ConfigManager::load()?;
//! agjoin_core::logging::init_structured_logging(&manager.config().logging);
//!
//! let joiner = AgDatabaseJoiner::new(manager.config().clone(), connector, backups);
//! let report = joiner
//!     .run(
//!         &[ServerInput::instance("SQL1")],
//!         &["DB1".to_string()],
//!         &JoinOptions::new("AG1").with_shared_path(r"\\fileserver\ag-seed"),
//!         &CancellationToken::new(),
//!     )
//!     .await?;
//!
//! for record in report.records() {
//!     println!("{}", serde_json::to_string(record)?);
//! }
//! # Ok(())
//! # }
//! ```
//!
//! ## Testing
//!
//! Everything runs against [`test_helpers::SimulationBuilder`]; no server is needed:
//!
//! ```bash
//! cargo test --lib    # Unit tests
//! cargo test          # Unit and integration tests
//! ```

pub mod config;
pub mod constants;
pub mod error;
pub mod logging;
pub mod models;
pub mod orchestration;
pub mod server;
pub mod state_machine;
pub mod test_helpers;

pub use config::{AgJoinConfig, ConfigManager, ConfigurationError};
pub use error::{AgJoinError, ErrorKind, PendingReplica, Result};
pub use models::{
    AgDatabaseRecord, AgHealthRecord, DatabaseJoinRequest, JoinPlan, SeedingMode,
};
pub use orchestration::{
    AgDatabaseJoiner, AvailabilityGroupTester, DatabaseJoinOutcome, InvocationReport, JoinOptions,
    JoinPhase, JoinStatus,
};
pub use server::{BackupRestoreService, Credential, InstanceConnector, ServerInput, SqlInstance};
