use serde::{Deserialize, Serialize};
use std::fmt;

/// Commit mode of a replica
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AvailabilityMode {
    AsynchronousCommit,
    SynchronousCommit,
    /// Configuration-only replica (holds no user databases)
    ConfigurationOnly,
    Unknown,
}

/// How a secondary obtains its initial copy of a database
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SeedingMode {
    Automatic,
    Manual,
}

/// Role a replica currently plays in its availability group
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ReplicaRole {
    Primary,
    Secondary,
    Resolving,
    Unknown,
}

/// Connection state of a replica as seen from the primary
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ConnectionState {
    Connected,
    Disconnected,
    Unknown,
}

impl fmt::Display for AvailabilityMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::AsynchronousCommit => write!(f, "AsynchronousCommit"),
            Self::SynchronousCommit => write!(f, "SynchronousCommit"),
            Self::ConfigurationOnly => write!(f, "ConfigurationOnly"),
            Self::Unknown => write!(f, "Unknown"),
        }
    }
}

impl fmt::Display for SeedingMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Automatic => write!(f, "Automatic"),
            Self::Manual => write!(f, "Manual"),
        }
    }
}

impl std::str::FromStr for SeedingMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "automatic" => Ok(Self::Automatic),
            "manual" => Ok(Self::Manual),
            _ => Err(format!("Invalid seeding mode: {s}")),
        }
    }
}

impl fmt::Display for ReplicaRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Primary => write!(f, "Primary"),
            Self::Secondary => write!(f, "Secondary"),
            Self::Resolving => write!(f, "Resolving"),
            Self::Unknown => write!(f, "Unknown"),
        }
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Connected => write!(f, "Connected"),
            Self::Disconnected => write!(f, "Disconnected"),
            Self::Unknown => write!(f, "Unknown"),
        }
    }
}

/// One replica of an availability group
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReplicaInfo {
    pub name: String,
    pub role: ReplicaRole,
    pub connection_state: ConnectionState,
    pub availability_mode: AvailabilityMode,
    pub seeding_mode: SeedingMode,
}

/// Snapshot of an availability group as seen from one connected instance
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AvailabilityGroupInfo {
    pub name: String,
    /// Role of the instance this snapshot was read from
    pub local_replica_role: ReplicaRole,
    pub primary_replica: String,
    pub replicas: Vec<ReplicaInfo>,
    /// Names of databases that are members of the group
    pub databases: Vec<String>,
}

impl AvailabilityGroupInfo {
    pub fn replica(&self, name: &str) -> Option<&ReplicaInfo> {
        self.replicas
            .iter()
            .find(|r| r.name.eq_ignore_ascii_case(name))
    }

    pub fn contains_database(&self, database: &str) -> bool {
        self.databases
            .iter()
            .any(|d| d.eq_ignore_ascii_case(database))
    }

    /// Every replica other than the primary, in replica-set order
    pub fn secondary_replicas(&self) -> impl Iterator<Item = &ReplicaInfo> {
        self.replicas
            .iter()
            .filter(move |r| !r.name.eq_ignore_ascii_case(&self.primary_replica))
    }

    /// Replicas the primary does not currently see as connected
    pub fn disconnected_replicas(&self) -> impl Iterator<Item = &ReplicaInfo> {
        self.replicas
            .iter()
            .filter(|r| r.connection_state != ConnectionState::Connected)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn replica(name: &str, state: ConnectionState) -> ReplicaInfo {
        ReplicaInfo {
            name: name.to_string(),
            role: ReplicaRole::Secondary,
            connection_state: state,
            availability_mode: AvailabilityMode::SynchronousCommit,
            seeding_mode: SeedingMode::Manual,
        }
    }

    #[test]
    fn test_secondary_replicas_exclude_primary() {
        let ag = AvailabilityGroupInfo {
            name: "AG1".to_string(),
            local_replica_role: ReplicaRole::Primary,
            primary_replica: "SQL1".to_string(),
            replicas: vec![
                replica("sql1", ConnectionState::Connected),
                replica("SQL2", ConnectionState::Connected),
                replica("SQL3", ConnectionState::Disconnected),
            ],
            databases: vec!["Sales".to_string()],
        };

        let names: Vec<_> = ag.secondary_replicas().map(|r| r.name.as_str()).collect();
        assert_eq!(names, vec!["SQL2", "SQL3"]);

        let down: Vec<_> = ag.disconnected_replicas().map(|r| r.name.as_str()).collect();
        assert_eq!(down, vec!["SQL3"]);

        assert!(ag.contains_database("sales"));
        assert!(ag.replica("sql2").is_some());
    }

    #[test]
    fn test_seeding_mode_parse() {
        assert_eq!("automatic".parse::<SeedingMode>().unwrap(), SeedingMode::Automatic);
        assert_eq!("Manual".parse::<SeedingMode>().unwrap(), SeedingMode::Manual);
        assert!("direct".parse::<SeedingMode>().is_err());
    }
}
