//! Open replica connections for one invocation.
//!
//! The map owns every handle it holds. Handles are opened during prerequisite
//! checking, reused by every later phase, and closed together by
//! [`ReplicaConnections::close_all`] when the invocation ends.

use std::collections::HashMap;
use tracing::{debug, warn};

use crate::error::Result;

use super::credential::Credential;
use super::traits::{InstanceConnector, SqlInstance};

#[derive(Default)]
pub struct ReplicaConnections {
    connections: HashMap<String, Box<dyn SqlInstance>>,
}

impl ReplicaConnections {
    pub fn new() -> Self {
        Self::default()
    }

    fn key(name: &str) -> String {
        name.to_ascii_lowercase()
    }

    pub fn get(&self, replica: &str) -> Option<&dyn SqlInstance> {
        self.connections.get(&Self::key(replica)).map(|c| c.as_ref())
    }

    pub fn contains(&self, replica: &str) -> bool {
        self.connections.contains_key(&Self::key(replica))
    }

    pub fn insert(&mut self, replica: &str, connection: Box<dyn SqlInstance>) {
        if let Some(previous) = self.connections.insert(Self::key(replica), connection) {
            warn!(
                replica = %replica,
                previous = %previous.identity().sql_instance,
                "Replacing an open replica connection"
            );
        }
    }

    /// Reuse the open connection for `replica`, or open one
    pub async fn get_or_connect(
        &mut self,
        connector: &dyn InstanceConnector,
        replica: &str,
        credential: Option<&Credential>,
    ) -> Result<&dyn SqlInstance> {
        let key = Self::key(replica);
        if !self.connections.contains_key(&key) {
            debug!(replica = %replica, "Opening replica connection");
            let connection = connector.connect(replica, credential).await?;
            self.connections.insert(key.clone(), connection);
        }
        Ok(self.connections[&key].as_ref())
    }

    pub fn len(&self) -> usize {
        self.connections.len()
    }

    pub fn is_empty(&self) -> bool {
        self.connections.is_empty()
    }

    /// Close every handle. Close failures are logged; the handles are dropped regardless.
    pub async fn close_all(&mut self) {
        for (replica, connection) in self.connections.drain() {
            if let Err(error) = connection.close().await {
                warn!(replica = %replica, error = %error, "Failed to close replica connection");
            }
        }
    }
}

impl std::fmt::Debug for ReplicaConnections {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut names: Vec<_> = self.connections.keys().collect();
        names.sort();
        f.debug_struct("ReplicaConnections")
            .field("replicas", &names)
            .finish()
    }
}
