//! Simulated SQL Server estate
//!
//! An in-memory availability group shared by every [`SimulatedInstance`],
//! [`SimulatedConnector`] and [`SimulatedBackupService`] built from the same
//! [`SimulationBuilder`]. Server-side convergence is scripted in polls: an
//! availability database reaches `Existing` after a fixed number of reads,
//! and a secondary reaches its target synchronization state after another.
//! Every call is logged so tests can assert which mutations were issued.

use async_trait::async_trait;
use chrono::Utc;
use parking_lot::Mutex;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use crate::error::{AgJoinError, Result};
use crate::models::{
    AvailabilityDatabaseInfo, AvailabilityGroupInfo, AvailabilityMode, BackupArtifact,
    BackupHistoryEntry, BackupType, ConnectionState, DatabaseInfo, DatabaseStatus,
    InstanceIdentity, ObjectState, RecoveryModel, ReplicaInfo, ReplicaRole, SeedingMode,
    SeedingStats, SynchronizationState,
};
use crate::server::{BackupRestoreService, Credential, InstanceConnector, SqlInstance};

/// One call made against the simulated estate
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SimulatedCall {
    Connect {
        instance: String,
    },
    CreateAvailabilityDatabase {
        instance: String,
        database: String,
    },
    JoinAvailabilityGroup {
        instance: String,
        database: String,
    },
    SetSeedingMode {
        instance: String,
        replica: String,
        mode: SeedingMode,
    },
    GrantCreateAnyDatabase {
        instance: String,
    },
    Backup {
        instance: String,
        database: String,
        backup_type: BackupType,
        destination: String,
    },
    Restore {
        instance: String,
        database: String,
        artifacts: usize,
        no_recovery: bool,
    },
    Close {
        instance: String,
    },
}

impl SimulatedCall {
    /// Whether the call changes server state
    pub fn is_mutation(&self) -> bool {
        !matches!(self, Self::Connect { .. } | Self::Close { .. })
    }
}

#[derive(Debug, Clone)]
struct SimulatedAgDatabase {
    info: AvailabilityDatabaseInfo,
    reads_until_existing: u32,
    reads_until_synced: u32,
    /// Joined by automatic seeding rather than an explicit join
    seeded: bool,
}

#[derive(Debug, Clone)]
struct SimulatedServer {
    identity: InstanceIdentity,
    version_major: u32,
    databases: HashMap<String, DatabaseInfo>,
    backups: Vec<BackupHistoryEntry>,
    ag_databases: HashMap<String, SimulatedAgDatabase>,
    local_role: Option<ReplicaRole>,
    hides_availability_group: bool,
}

impl SimulatedServer {
    fn new(name: &str) -> Self {
        let identity = match name.split_once('\\') {
            Some((computer, instance)) => InstanceIdentity::new(computer, instance),
            None => InstanceIdentity::new(name, "MSSQLSERVER"),
        };
        Self {
            identity,
            version_major: 15,
            databases: HashMap::new(),
            backups: Vec::new(),
            ag_databases: HashMap::new(),
            local_role: None,
            hides_availability_group: false,
        }
    }
}

#[derive(Debug)]
struct World {
    availability_group: String,
    primary: String,
    replicas: Vec<ReplicaInfo>,
    ag_databases: Vec<String>,
    servers: HashMap<String, SimulatedServer>,
    calls: Vec<SimulatedCall>,
    reads_until_existing: u32,
    reads_until_synced: u32,
    backup_sequence: i64,
    unreachable: HashSet<String>,
    broken_connections: HashSet<String>,
    never_synchronize: HashSet<String>,
    seeding_failures: HashMap<String, String>,
    alter_failures: HashSet<String>,
    join_failures: HashSet<String>,
    restore_failures: HashSet<String>,
    failing_seeding_stats: bool,
    failing_backups: bool,
}

fn key(name: &str) -> String {
    name.to_ascii_lowercase()
}

impl World {
    fn server(&self, name: &str) -> Result<&SimulatedServer> {
        self.servers
            .get(&key(name))
            .ok_or_else(|| AgJoinError::remote(name, "lookup", "unknown simulated server"))
    }

    fn server_mut(&mut self, name: &str) -> Result<&mut SimulatedServer> {
        self.servers
            .get_mut(&key(name))
            .ok_or_else(|| AgJoinError::remote(name, "lookup", "unknown simulated server"))
    }

    /// Fails reads on an open connection whose transport was reset
    fn ensure_connected(&self, name: &str) -> Result<()> {
        if self.broken_connections.contains(&key(name)) {
            return Err(AgJoinError::Connection {
                instance: name.to_string(),
                reason: "transport reset".to_string(),
            });
        }
        Ok(())
    }

    fn replica_info(&self, name: &str) -> Option<&ReplicaInfo> {
        self.replicas
            .iter()
            .find(|replica| replica.name.eq_ignore_ascii_case(name))
    }

    fn is_primary(&self, name: &str) -> bool {
        self.primary.eq_ignore_ascii_case(name)
    }

    fn target_state(&self, replica: &str) -> SynchronizationState {
        match self.replica_info(replica).map(|r| r.availability_mode) {
            Some(AvailabilityMode::SynchronousCommit) => SynchronizationState::Synchronized,
            _ => SynchronizationState::Synchronizing,
        }
    }

    fn new_ag_database(&self, database: &str, existing: bool) -> SimulatedAgDatabase {
        SimulatedAgDatabase {
            info: AvailabilityDatabaseInfo {
                availability_group: self.availability_group.clone(),
                name: database.to_string(),
                state: if existing {
                    ObjectState::Existing
                } else {
                    ObjectState::Creating
                },
                is_joined: false,
                synchronization_state: SynchronizationState::NotSynchronizing,
            },
            reads_until_existing: if existing { 0 } else { self.reads_until_existing },
            reads_until_synced: self.reads_until_synced,
            seeded: false,
        }
    }

    /// Advance one read of an availability database and return what the read sees
    fn observe(&mut self, instance: &str, database: &str) -> Result<Option<AvailabilityDatabaseInfo>> {
        let stalled = self.never_synchronize.contains(&key(instance));
        let target = self.target_state(instance);
        let primary = self.is_primary(instance);
        let server = self.server_mut(instance)?;
        let Some(entry) = server.ag_databases.get_mut(&key(database)) else {
            return Ok(None);
        };

        if entry.info.state == ObjectState::Creating {
            if entry.reads_until_existing == 0 {
                entry.info.state = ObjectState::Existing;
                if primary {
                    entry.info.is_joined = true;
                    entry.info.synchronization_state = SynchronizationState::Synchronized;
                }
            } else {
                entry.reads_until_existing -= 1;
            }
        } else if !primary && (entry.info.is_joined || entry.seeded) && !stalled {
            if entry.reads_until_synced == 0 {
                entry.info.is_joined = true;
                entry.info.synchronization_state = target;
            } else {
                entry.reads_until_synced -= 1;
                if entry.info.is_joined {
                    entry.info.synchronization_state = SynchronizationState::Initializing;
                }
            }
        }

        Ok(Some(entry.info.clone()))
    }
}

/// Scripts an availability group and its servers
pub struct SimulationBuilder {
    world: World,
}

impl SimulationBuilder {
    /// An availability group whose primary is `primary`
    pub fn new(availability_group: impl Into<String>, primary: impl Into<String>) -> Self {
        let primary = primary.into();
        let mut servers = HashMap::new();
        servers.insert(key(&primary), SimulatedServer::new(&primary));

        Self {
            world: World {
                availability_group: availability_group.into(),
                replicas: vec![ReplicaInfo {
                    name: primary.clone(),
                    role: ReplicaRole::Primary,
                    connection_state: ConnectionState::Connected,
                    availability_mode: AvailabilityMode::SynchronousCommit,
                    seeding_mode: SeedingMode::Manual,
                }],
                primary,
                ag_databases: Vec::new(),
                servers,
                calls: Vec::new(),
                reads_until_existing: 1,
                reads_until_synced: 2,
                backup_sequence: 0,
                unreachable: HashSet::new(),
                broken_connections: HashSet::new(),
                never_synchronize: HashSet::new(),
                seeding_failures: HashMap::new(),
                alter_failures: HashSet::new(),
                join_failures: HashSet::new(),
                restore_failures: HashSet::new(),
                failing_seeding_stats: false,
                failing_backups: false,
            },
        }
    }

    pub fn secondary(
        mut self,
        name: impl Into<String>,
        availability_mode: AvailabilityMode,
        seeding_mode: SeedingMode,
    ) -> Self {
        let name = name.into();
        self.world
            .servers
            .insert(key(&name), SimulatedServer::new(&name));
        self.world.replicas.push(ReplicaInfo {
            name,
            role: ReplicaRole::Secondary,
            connection_state: ConnectionState::Connected,
            availability_mode,
            seeding_mode,
        });
        self
    }

    /// A user database on the primary: full recovery, online, never backed up
    pub fn database(self, name: impl Into<String>) -> Self {
        let name = name.into();
        self.database_info(DatabaseInfo {
            name,
            recovery_model: RecoveryModel::Full,
            status: DatabaseStatus::Normal,
            last_backup_date: None,
            availability_group: None,
        })
    }

    pub fn database_info(mut self, database: DatabaseInfo) -> Self {
        let primary = key(&self.world.primary);
        if let Some(server) = self.world.servers.get_mut(&primary) {
            server.databases.insert(key(&database.name), database);
        }
        self
    }

    /// A database that is already a member of the availability group
    pub fn joined_database(mut self, name: impl Into<String>) -> Self {
        let name = name.into();
        self.world.ag_databases.push(name.clone());
        self.database(name)
    }

    /// Reads of a freshly created availability database before it is `Existing`
    pub fn reads_until_existing(mut self, reads: u32) -> Self {
        self.world.reads_until_existing = reads;
        self
    }

    /// Reads of a joined secondary before it reports its target state
    pub fn reads_until_synced(mut self, reads: u32) -> Self {
        self.world.reads_until_synced = reads;
        self
    }

    pub fn version(mut self, version_major: u32) -> Self {
        for server in self.world.servers.values_mut() {
            server.version_major = version_major;
        }
        self
    }

    pub fn build(self) -> (SimulatedInstance, SimulatedConnector) {
        let primary = self.world.primary.clone();
        let world = Arc::new(Mutex::new(self.world));
        (
            SimulatedInstance::attach(world.clone(), &primary),
            SimulatedConnector { world },
        )
    }
}

/// A connection to one simulated server
#[derive(Clone)]
pub struct SimulatedInstance {
    world: Arc<Mutex<World>>,
    name: String,
    identity: InstanceIdentity,
}

impl std::fmt::Debug for SimulatedInstance {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SimulatedInstance")
            .field("name", &self.name)
            .finish()
    }
}

impl SimulatedInstance {
    fn attach(world: Arc<Mutex<World>>, name: &str) -> Self {
        let identity = world
            .lock()
            .server(name)
            .map(|server| server.identity.clone())
            .unwrap_or_else(|_| InstanceIdentity::new(name, "MSSQLSERVER"));
        Self {
            world,
            name: name.to_string(),
            identity,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn set_version_major(&self, version_major: u32) {
        if let Ok(server) = self.world.lock().server_mut(&self.name) {
            server.version_major = version_major;
        }
    }

    /// Connection state of `replica` as reported by this AG
    pub fn set_connection_state(&self, replica: &str, state: ConnectionState) {
        let mut world = self.world.lock();
        if let Some(info) = world
            .replicas
            .iter_mut()
            .find(|r| r.name.eq_ignore_ascii_case(replica))
        {
            info.connection_state = state;
        }
    }

    /// Override the role this server reports for itself
    pub fn set_local_role(&self, role: ReplicaRole) {
        if let Ok(server) = self.world.lock().server_mut(&self.name) {
            server.local_role = Some(role);
        }
    }

    /// Append a finished backup of `database` to this server's history
    pub fn record_backup(&self, database: &str, backup_type: BackupType) {
        let mut world = self.world.lock();
        world.backup_sequence += 1;
        let finished_at = Utc::now() + chrono::Duration::seconds(world.backup_sequence);
        if let Ok(server) = world.server_mut(&self.name) {
            server.backups.push(BackupHistoryEntry {
                database: database.to_string(),
                backup_type,
                finished_at,
                paths: vec![format!("\\\\history\\{database}_{backup_type}.bak")],
            });
            if let Some(info) = server.databases.get_mut(&key(database)) {
                info.last_backup_date = Some(finished_at);
            }
        }
    }

    /// Put a copy of `database` on this server in the given state
    pub fn put_database(&self, database: &str, status: DatabaseStatus) {
        if let Ok(server) = self.world.lock().server_mut(&self.name) {
            server.databases.insert(
                key(database),
                DatabaseInfo {
                    name: database.to_string(),
                    recovery_model: RecoveryModel::Full,
                    status,
                    last_backup_date: None,
                    availability_group: None,
                },
            );
        }
    }

    /// Current status of `database` on this server
    pub fn database_status(&self, database: &str) -> Option<DatabaseStatus> {
        let world = self.world.lock();
        world
            .server(&self.name)
            .ok()
            .and_then(|server| server.databases.get(&key(database)))
            .map(|info| info.status.clone())
    }

    /// Current availability database object, without advancing convergence
    pub fn peek_availability_database(&self, database: &str) -> Option<AvailabilityDatabaseInfo> {
        let world = self.world.lock();
        world
            .server(&self.name)
            .ok()
            .and_then(|server| server.ag_databases.get(&key(database)))
            .map(|entry| entry.info.clone())
    }

    fn log(&self, call: SimulatedCall) {
        self.world.lock().calls.push(call);
    }
}

#[async_trait]
impl SqlInstance for SimulatedInstance {
    fn identity(&self) -> &InstanceIdentity {
        &self.identity
    }

    fn version_major(&self) -> u32 {
        self.world
            .lock()
            .server(&self.name)
            .map(|server| server.version_major)
            .unwrap_or_default()
    }

    async fn availability_group(&self, name: &str) -> Result<Option<AvailabilityGroupInfo>> {
        let world = self.world.lock();
        let server = world.server(&self.name)?;
        if !world.availability_group.eq_ignore_ascii_case(name) || server.hides_availability_group
        {
            return Ok(None);
        }

        let local_replica_role = server.local_role.unwrap_or_else(|| {
            if world.is_primary(&self.name) {
                ReplicaRole::Primary
            } else if world.replica_info(&self.name).is_some() {
                ReplicaRole::Secondary
            } else {
                ReplicaRole::Unknown
            }
        });

        Ok(Some(AvailabilityGroupInfo {
            name: world.availability_group.clone(),
            local_replica_role,
            primary_replica: world.primary.clone(),
            replicas: world.replicas.clone(),
            databases: world.ag_databases.clone(),
        }))
    }

    async fn database(&self, name: &str) -> Result<Option<DatabaseInfo>> {
        let world = self.world.lock();
        world.ensure_connected(&self.name)?;
        Ok(world.server(&self.name)?.databases.get(&key(name)).cloned())
    }

    async fn backup_history(&self, database: &str) -> Result<Vec<BackupHistoryEntry>> {
        let world = self.world.lock();
        Ok(world
            .server(&self.name)?
            .backups
            .iter()
            .filter(|entry| entry.database.eq_ignore_ascii_case(database))
            .cloned()
            .collect())
    }

    async fn availability_database(
        &self,
        availability_group: &str,
        database: &str,
    ) -> Result<Option<AvailabilityDatabaseInfo>> {
        let mut world = self.world.lock();
        if !world.availability_group.eq_ignore_ascii_case(availability_group) {
            return Ok(None);
        }
        world.observe(&self.name, database)
    }

    async fn create_availability_database(
        &self,
        availability_group: &str,
        database: &str,
    ) -> Result<()> {
        self.log(SimulatedCall::CreateAvailabilityDatabase {
            instance: self.name.clone(),
            database: database.to_string(),
        });

        let mut world = self.world.lock();
        if !world.availability_group.eq_ignore_ascii_case(availability_group) {
            return Err(AgJoinError::remote(
                &self.name,
                "create availability database",
                format!("availability group {availability_group} does not exist"),
            ));
        }

        let entry = world.new_ag_database(database, false);
        world
            .server_mut(&self.name)?
            .ag_databases
            .insert(key(database), entry);

        if world.is_primary(&self.name) {
            if !world
                .ag_databases
                .iter()
                .any(|d| d.eq_ignore_ascii_case(database))
            {
                world.ag_databases.push(database.to_string());
            }

            // Automatic seeding creates the secondary copies on its own
            let seeded: Vec<String> = world
                .replicas
                .iter()
                .filter(|r| r.role == ReplicaRole::Secondary && r.seeding_mode == SeedingMode::Automatic)
                .map(|r| r.name.clone())
                .collect();
            for replica in seeded {
                let mut entry = world.new_ag_database(database, true);
                entry.seeded = true;
                world
                    .server_mut(&replica)?
                    .ag_databases
                    .insert(key(database), entry);
            }
        }
        Ok(())
    }

    async fn join_availability_group(&self, availability_group: &str, database: &str) -> Result<()> {
        self.log(SimulatedCall::JoinAvailabilityGroup {
            instance: self.name.clone(),
            database: database.to_string(),
        });

        let mut world = self.world.lock();
        if world.join_failures.contains(&key(&self.name)) {
            return Err(AgJoinError::remote(
                &self.name,
                "join availability group",
                "the database is not in a restoring state",
            ));
        }
        let server = world.server_mut(&self.name)?;
        match server.ag_databases.get_mut(&key(database)) {
            Some(entry) => {
                entry.info.is_joined = true;
                Ok(())
            }
            None => Err(AgJoinError::remote(
                &self.name,
                "join availability group",
                format!("{database} is not an availability database of {availability_group}"),
            )),
        }
    }

    async fn set_replica_seeding_mode(
        &self,
        _availability_group: &str,
        replica: &str,
        mode: SeedingMode,
    ) -> Result<()> {
        self.log(SimulatedCall::SetSeedingMode {
            instance: self.name.clone(),
            replica: replica.to_string(),
            mode,
        });

        let mut world = self.world.lock();
        if world.alter_failures.contains(&key(replica)) {
            return Err(AgJoinError::remote(
                &self.name,
                "alter availability replica",
                "lock request time out period exceeded",
            ));
        }
        match world
            .replicas
            .iter_mut()
            .find(|r| r.name.eq_ignore_ascii_case(replica))
        {
            Some(info) => {
                info.seeding_mode = mode;
                Ok(())
            }
            None => Err(AgJoinError::remote(
                &self.name,
                "alter availability replica",
                format!("{replica} is not a replica"),
            )),
        }
    }

    async fn grant_create_any_database(&self, _availability_group: &str) -> Result<()> {
        self.log(SimulatedCall::GrantCreateAnyDatabase {
            instance: self.name.clone(),
        });
        Ok(())
    }

    async fn seeding_stats(
        &self,
        database: &str,
        remote_machine: &str,
    ) -> Result<Option<SeedingStats>> {
        let world = self.world.lock();
        if world.failing_seeding_stats {
            return Err(AgJoinError::remote(
                &self.name,
                "query seeding statistics",
                "permission denied on sys.dm_hadr_physical_seeding_stats",
            ));
        }

        let failure = world.seeding_failures.get(&key(remote_machine)).cloned();
        let seeding = world
            .server(remote_machine)
            .ok()
            .and_then(|server| server.ag_databases.get(&key(database)))
            .filter(|entry| entry.seeded)
            .map(|entry| entry.reads_until_synced);

        Ok(match (failure, seeding) {
            (None, None) => None,
            (failure, remaining) => {
                let remaining = remaining.unwrap_or(0).min(10) as u64;
                Some(SeedingStats {
                    local_database_name: database.to_string(),
                    remote_machine_name: remote_machine.to_string(),
                    transferred_size_bytes: (10 - remaining) * 1024,
                    database_size_bytes: 10 * 1024,
                    estimate_time_complete_utc: Some(
                        Utc::now() + chrono::Duration::seconds(remaining as i64),
                    ),
                    failure_message: failure,
                })
            }
        })
    }

    async fn close(&self) -> Result<()> {
        self.log(SimulatedCall::Close {
            instance: self.name.clone(),
        });
        Ok(())
    }
}

/// Opens [`SimulatedInstance`]s and scripts estate-wide behavior
#[derive(Clone)]
pub struct SimulatedConnector {
    world: Arc<Mutex<World>>,
}

impl SimulatedConnector {
    /// A handle to `name` that bypasses the connection log
    pub fn instance(&self, name: &str) -> Option<SimulatedInstance> {
        let known = self.world.lock().servers.contains_key(&key(name));
        known.then(|| SimulatedInstance::attach(self.world.clone(), name))
    }

    pub fn backup_service(&self) -> SimulatedBackupService {
        SimulatedBackupService {
            world: self.world.clone(),
        }
    }

    pub fn calls(&self) -> Vec<SimulatedCall> {
        self.world.lock().calls.clone()
    }

    pub fn mutations(&self) -> Vec<SimulatedCall> {
        self.calls()
            .into_iter()
            .filter(SimulatedCall::is_mutation)
            .collect()
    }

    pub fn clear_calls(&self) {
        self.world.lock().calls.clear();
    }

    /// Current availability group membership
    pub fn ag_databases(&self) -> Vec<String> {
        self.world.lock().ag_databases.clone()
    }

    /// Current seeding mode of `replica`
    pub fn seeding_mode(&self, replica: &str) -> Option<SeedingMode> {
        self.world
            .lock()
            .replica_info(replica)
            .map(|info| info.seeding_mode)
    }

    pub fn set_unreachable(&self, instance: &str) {
        self.world.lock().unreachable.insert(key(instance));
    }

    /// Connections to `instance` still open, but database reads fail
    pub fn reset_connection(&self, instance: &str) {
        self.world.lock().broken_connections.insert(key(instance));
    }

    /// `replica` joins but never reaches its target state
    pub fn never_synchronize(&self, replica: &str) {
        self.world.lock().never_synchronize.insert(key(replica));
    }

    /// Seeding statistics towards `replica` report `message` as a failure
    pub fn fail_seeding(&self, replica: &str, message: impl Into<String>) {
        self.world
            .lock()
            .seeding_failures
            .insert(key(replica), message.into());
    }

    pub fn fail_seeding_stats_queries(&self) {
        self.world.lock().failing_seeding_stats = true;
    }

    pub fn fail_alter(&self, replica: &str) {
        self.world.lock().alter_failures.insert(key(replica));
    }

    pub fn fail_join(&self, replica: &str) {
        self.world.lock().join_failures.insert(key(replica));
    }

    pub fn fail_restore(&self, replica: &str) {
        self.world.lock().restore_failures.insert(key(replica));
    }

    pub fn fail_backups(&self) {
        self.world.lock().failing_backups = true;
    }

    /// Hide the availability group from `instance`'s point of view
    pub fn hide_availability_group(&self, instance: &str) {
        if let Ok(server) = self.world.lock().server_mut(instance) {
            server.hides_availability_group = true;
        }
    }
}

#[async_trait]
impl InstanceConnector for SimulatedConnector {
    async fn connect(
        &self,
        instance: &str,
        _credential: Option<&Credential>,
    ) -> Result<Box<dyn SqlInstance>> {
        {
            let mut world = self.world.lock();
            world.calls.push(SimulatedCall::Connect {
                instance: instance.to_string(),
            });
            if world.unreachable.contains(&key(instance)) || !world.servers.contains_key(&key(instance)) {
                return Err(AgJoinError::Connection {
                    instance: instance.to_string(),
                    reason: "a network-related or instance-specific error occurred".to_string(),
                });
            }
        }
        Ok(Box::new(SimulatedInstance::attach(
            self.world.clone(),
            instance,
        )))
    }
}

/// Backup and restore against the simulated estate
#[derive(Clone)]
pub struct SimulatedBackupService {
    world: Arc<Mutex<World>>,
}

#[async_trait]
impl BackupRestoreService for SimulatedBackupService {
    async fn backup(
        &self,
        instance: &dyn SqlInstance,
        database: &str,
        backup_type: BackupType,
        destination: &str,
    ) -> anyhow::Result<BackupArtifact> {
        let name = instance.identity().sql_instance.clone();
        let mut world = self.world.lock();
        world.calls.push(SimulatedCall::Backup {
            instance: name.clone(),
            database: database.to_string(),
            backup_type,
            destination: destination.to_string(),
        });
        if world.failing_backups {
            anyhow::bail!("cannot open backup device {destination}: access is denied");
        }

        world.backup_sequence += 1;
        let finished_at = Utc::now() + chrono::Duration::seconds(world.backup_sequence);
        let path = format!("{destination}\\{database}_{backup_type}.bak");
        let server = world
            .server_mut(&name)
            .map_err(|error| anyhow::anyhow!(error.to_string()))?;
        server.backups.push(BackupHistoryEntry {
            database: database.to_string(),
            backup_type,
            finished_at,
            paths: vec![path.clone()],
        });
        if let Some(info) = server.databases.get_mut(&key(database)) {
            info.last_backup_date = Some(finished_at);
        }

        Ok(BackupArtifact {
            database: database.to_string(),
            backup_type,
            paths: vec![path],
        })
    }

    async fn restore(
        &self,
        instance: &dyn SqlInstance,
        database: &str,
        artifacts: &[BackupArtifact],
        no_recovery: bool,
    ) -> anyhow::Result<()> {
        let name = instance.identity().sql_instance.clone();
        let mut world = self.world.lock();
        world.calls.push(SimulatedCall::Restore {
            instance: name.clone(),
            database: database.to_string(),
            artifacts: artifacts.len(),
            no_recovery,
        });
        if world.restore_failures.contains(&key(&name)) {
            anyhow::bail!("the operating system returned error 112: not enough space on the disk");
        }

        let server = world
            .server_mut(&name)
            .map_err(|error| anyhow::anyhow!(error.to_string()))?;
        server.databases.insert(
            key(database),
            DatabaseInfo {
                name: database.to_string(),
                recovery_model: RecoveryModel::Full,
                status: if no_recovery {
                    DatabaseStatus::Restoring
                } else {
                    DatabaseStatus::Normal
                },
                last_backup_date: None,
                availability_group: None,
            },
        );
        Ok(())
    }
}
