//! Server configuration.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use thinghub_protocol::constants::{
    DEFAULT_REQUEST_TIMEOUT, LOGIN_PATH, LOGOUT_PATH, PASSTHROUGH_WS_PATH, REFRESH_PATH,
    WOT_WS_PATH,
};

/// Hub server configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Listen address (`host:port`, port 0 = OS-assigned).
    #[serde(default = "default_address")]
    pub address: String,

    /// Upgrade path for the native passthrough encoding.
    #[serde(default = "default_passthrough_path")]
    pub passthrough_path: String,

    /// Upgrade path for the WoT WebSocket sub-protocol.
    #[serde(default = "default_wot_path")]
    pub wot_path: String,

    #[serde(default = "default_login_path")]
    pub login_path: String,

    #[serde(default = "default_refresh_path")]
    pub refresh_path: String,

    #[serde(default = "default_logout_path")]
    pub logout_path: String,

    /// Wait for a forwarded request's response, in seconds.
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,

    /// Bearer token lifetime, in seconds.
    #[serde(default = "default_session_lifetime_secs")]
    pub session_lifetime_secs: u64,

    /// Upper bound of live connections (0 = unlimited).
    #[serde(default = "default_max_connections")]
    pub max_connections: usize,
}

fn default_address() -> String {
    "127.0.0.1:8444".into()
}

fn default_passthrough_path() -> String {
    PASSTHROUGH_WS_PATH.into()
}

fn default_wot_path() -> String {
    WOT_WS_PATH.into()
}

fn default_login_path() -> String {
    LOGIN_PATH.into()
}

fn default_refresh_path() -> String {
    REFRESH_PATH.into()
}

fn default_logout_path() -> String {
    LOGOUT_PATH.into()
}

fn default_request_timeout_secs() -> u64 {
    DEFAULT_REQUEST_TIMEOUT.as_secs()
}

fn default_session_lifetime_secs() -> u64 {
    24 * 3600
}

fn default_max_connections() -> usize {
    1000
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            address: default_address(),
            passthrough_path: default_passthrough_path(),
            wot_path: default_wot_path(),
            login_path: default_login_path(),
            refresh_path: default_refresh_path(),
            logout_path: default_logout_path(),
            request_timeout_secs: default_request_timeout_secs(),
            session_lifetime_secs: default_session_lifetime_secs(),
            max_connections: default_max_connections(),
        }
    }
}

impl ServerConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn session_lifetime(&self) -> Duration {
        Duration::from_secs(self.session_lifetime_secs)
    }
}
