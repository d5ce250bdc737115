use serde::{Deserialize, Serialize};

use super::availability_database::{AvailabilityDatabaseInfo, ObjectState, SynchronizationState};
use super::availability_group::{AvailabilityGroupInfo, ConnectionState, ReplicaRole};

/// Identity of a connected instance, as reported by the server
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct InstanceIdentity {
    pub computer_name: String,
    pub instance_name: String,
    /// Name used to connect, `COMPUTER` or `COMPUTER\INSTANCE`
    pub sql_instance: String,
}

impl InstanceIdentity {
    pub fn new(computer_name: impl Into<String>, instance_name: impl Into<String>) -> Self {
        let computer_name = computer_name.into();
        let instance_name = instance_name.into();
        let sql_instance = if instance_name.eq_ignore_ascii_case("MSSQLSERVER") {
            computer_name.clone()
        } else {
            format!("{computer_name}\\{instance_name}")
        };
        Self {
            computer_name,
            instance_name,
            sql_instance,
        }
    }
}

/// Output row: one joined database on one replica
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct AgDatabaseRecord {
    pub computer_name: String,
    pub instance_name: String,
    pub sql_instance: String,
    pub availability_group: String,
    pub database_name: String,
    pub replica_role: ReplicaRole,
    pub state: ObjectState,
    pub synchronization_state: SynchronizationState,
    pub is_joined: bool,
}

impl AgDatabaseRecord {
    pub fn from_availability_database(
        identity: &InstanceIdentity,
        role: ReplicaRole,
        database: &AvailabilityDatabaseInfo,
    ) -> Self {
        Self {
            computer_name: identity.computer_name.clone(),
            instance_name: identity.instance_name.clone(),
            sql_instance: identity.sql_instance.clone(),
            availability_group: database.availability_group.clone(),
            database_name: database.name.clone(),
            replica_role: role,
            state: database.state,
            synchronization_state: database.synchronization_state,
            is_joined: database.is_joined,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct ReplicaHealth {
    pub name: String,
    pub role: ReplicaRole,
    pub connection_state: ConnectionState,
}

/// Output of a health-only availability group test
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct AgHealthRecord {
    pub computer_name: String,
    pub instance_name: String,
    pub sql_instance: String,
    pub availability_group: String,
    pub replicas: Vec<ReplicaHealth>,
}

impl AgHealthRecord {
    pub fn new(identity: &InstanceIdentity, ag: &AvailabilityGroupInfo) -> Self {
        Self {
            computer_name: identity.computer_name.clone(),
            instance_name: identity.instance_name.clone(),
            sql_instance: identity.sql_instance.clone(),
            availability_group: ag.name.clone(),
            replicas: ag
                .replicas
                .iter()
                .map(|replica| ReplicaHealth {
                    name: replica.name.clone(),
                    role: replica.role,
                    connection_state: replica.connection_state,
                })
                .collect(),
        }
    }
}
