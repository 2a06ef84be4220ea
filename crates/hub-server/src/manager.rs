//! Registry of live server sessions.
//!
//! The manager is the one shared mutable structure on the server. Mutation
//! takes the write lock; iteration and fan-out work on a snapshot taken
//! under the read lock, so callbacks may add or remove sessions freely.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;
use thinghub_protocol::NotificationMessage;
use thinghub_transport::connection_key;
use tracing::{debug, info, warn};

use crate::ServerError;
use crate::connection::ServerConnection;

#[derive(Default)]
struct Registry {
    by_key: HashMap<String, Arc<ServerConnection>>,
    /// Connection IDs per client, in insertion order.
    by_client: HashMap<String, Vec<String>>,
}

/// Live sessions indexed by client and connection ID.
pub struct ConnectionManager {
    registry: RwLock<Registry>,
    max_connections: usize,
}

impl ConnectionManager {
    /// `max_connections` of 0 disables the limit.
    pub fn new(max_connections: usize) -> Self {
        Self {
            registry: RwLock::new(Registry::default()),
            max_connections,
        }
    }

    /// Registers a session.
    ///
    /// A `(clientID, connectionID)` pair that is already present closes both
    /// sessions and fails.
    pub fn add_connection(&self, conn: Arc<ServerConnection>) -> Result<(), ServerError> {
        let client_id = conn.client_id().to_string();
        if client_id.is_empty() {
            return Err(ServerError::Unauthenticated);
        }
        let cid = conn.connection_id().to_string();
        let key = connection_key(&client_id, &cid);

        let mut reg = self.registry.write();
        if self.max_connections > 0 && reg.by_key.len() >= self.max_connections {
            warn!(client = %client_id, limit = self.max_connections, "connection limit reached");
            return Err(ServerError::TooManyConnections);
        }
        if let Some(existing) = reg.by_key.remove(&key) {
            remove_cid(&mut reg.by_client, &client_id, &cid);
            drop(reg);
            warn!(client = %client_id, cid = %cid, "duplicate connection ID, closing both");
            existing.disconnect();
            conn.disconnect();
            return Err(ServerError::DuplicateConnection);
        }
        reg.by_key.insert(key, conn);
        reg.by_client.entry(client_id.clone()).or_default().push(cid.clone());
        debug!(client = %client_id, cid = %cid, total = reg.by_key.len(), "connection added");
        Ok(())
    }

    /// Unregisters a session. Unknown IDs are ignored.
    pub fn remove_connection(&self, client_id: &str, connection_id: &str) -> Option<Arc<ServerConnection>> {
        let mut reg = self.registry.write();
        let removed = reg.by_key.remove(&connection_key(client_id, connection_id))?;
        remove_cid(&mut reg.by_client, client_id, connection_id);
        debug!(client = %client_id, cid = %connection_id, "connection removed");
        Some(removed)
    }

    /// Removes `conn` only if it is the instance registered under its key.
    pub(crate) fn remove_instance(&self, conn: &Arc<ServerConnection>) {
        let key = connection_key(conn.client_id(), conn.connection_id());
        let mut reg = self.registry.write();
        if reg.by_key.get(&key).is_some_and(|c| Arc::ptr_eq(c, conn)) {
            reg.by_key.remove(&key);
            remove_cid(&mut reg.by_client, conn.client_id(), conn.connection_id());
        }
    }

    /// Returns the oldest live session of a client.
    pub fn get_connection_by_client_id(&self, client_id: &str) -> Option<Arc<ServerConnection>> {
        let reg = self.registry.read();
        let cid = reg.by_client.get(client_id)?.first()?;
        reg.by_key.get(&connection_key(client_id, cid)).cloned()
    }

    pub fn get_connection_by_connection_id(
        &self,
        client_id: &str,
        connection_id: &str,
    ) -> Option<Arc<ServerConnection>> {
        self.registry
            .read()
            .by_key
            .get(&connection_key(client_id, connection_id))
            .cloned()
    }

    /// Calls `f` for every session in a snapshot.
    pub fn for_each_connection<F>(&self, mut f: F)
    where
        F: FnMut(&Arc<ServerConnection>),
    {
        for conn in self.snapshot() {
            f(&conn);
        }
    }

    /// Disconnects and unregisters every session.
    pub fn close_all(&self) {
        let drained: Vec<_> = {
            let mut reg = self.registry.write();
            reg.by_client.clear();
            reg.by_key.drain().map(|(_, c)| c).collect()
        };
        info!(count = drained.len(), "closing all connections");
        for conn in drained {
            conn.disconnect();
        }
    }

    /// Disconnects every session of one client. Returns how many were closed.
    pub fn close_all_for_client(&self, client_id: &str) -> usize {
        let closed: Vec<_> = {
            let mut reg = self.registry.write();
            let cids = reg.by_client.remove(client_id).unwrap_or_default();
            cids.iter()
                .filter_map(|cid| reg.by_key.remove(&connection_key(client_id, cid)))
                .collect()
        };
        info!(client = %client_id, count = closed.len(), "closing all connections of client");
        for conn in &closed {
            conn.disconnect();
        }
        closed.len()
    }

    /// Returns (live connections, distinct clients).
    pub fn connection_count(&self) -> (usize, usize) {
        let reg = self.registry.read();
        (reg.by_key.len(), reg.by_client.len())
    }

    /// Delivers a notification to every interested session.
    ///
    /// Delivery is independent per session; returns how many accepted it.
    pub fn publish_notification(&self, notif: &NotificationMessage) -> usize {
        let delivered = self
            .snapshot()
            .iter()
            .filter(|conn| conn.send_if_interested(notif))
            .count();
        debug!(op = %notif.operation, thing = %notif.thing_id, name = %notif.name, delivered, "notification published");
        delivered
    }

    fn snapshot(&self) -> Vec<Arc<ServerConnection>> {
        self.registry.read().by_key.values().cloned().collect()
    }
}

fn remove_cid(by_client: &mut HashMap<String, Vec<String>>, client_id: &str, cid: &str) {
    if let Some(cids) = by_client.get_mut(client_id) {
        cids.retain(|c| c != cid);
        if cids.is_empty() {
            by_client.remove(client_id);
        }
    }
}
