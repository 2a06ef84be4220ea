//! Connection identity and lifecycle state.

use thinghub_protocol::ProtocolType;

/// Identity of one duplex session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionInfo {
    /// Stable identity of the remote party. Many connections may share it.
    pub client_id: String,
    /// Unique per session instance.
    pub connection_id: String,
    pub protocol: ProtocolType,
    /// Peer address, or the server URL on the client side.
    pub remote_addr: String,
}

impl ConnectionInfo {
    /// Key used by connection registries: `clientID:connectionID`.
    pub fn key(&self) -> String {
        connection_key(&self.client_id, &self.connection_id)
    }
}

/// Builds the registry key for a client/connection pair.
pub fn connection_key(client_id: &str, connection_id: &str) -> String {
    format!("{client_id}:{connection_id}")
}

/// Connection lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ConnectionState {
    #[default]
    Disconnected,
    /// Handshake in progress.
    Connecting,
    Connected,
}
