//! Client configuration.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use thinghub_protocol::ProtocolType;
use thinghub_protocol::constants::{DEFAULT_REQUEST_TIMEOUT, PASSTHROUGH_WS_PATH, WOT_WS_PATH};

/// Auto-reconnect settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReconnectConfig {
    /// Fixed pause before each attempt, in milliseconds.
    #[serde(default = "default_interval_ms")]
    pub interval_ms: u64,

    /// Attempts before giving up (0 = unbounded).
    #[serde(default)]
    pub max_attempts: u32,
}

fn default_interval_ms() -> u64 {
    1000
}

impl Default for ReconnectConfig {
    fn default() -> Self {
        Self {
            interval_ms: default_interval_ms(),
            max_attempts: 0,
        }
    }
}

impl ReconnectConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms)
    }
}

/// Connection settings of one client.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClientConfig {
    /// Base URL of the hub, e.g. `http://127.0.0.1:8444`.
    pub server_url: String,

    /// Account the client logs in as.
    pub client_id: String,

    #[serde(default)]
    pub protocol: ProtocolType,

    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,

    #[serde(default)]
    pub reconnect: ReconnectConfig,
}

fn default_request_timeout_secs() -> u64 {
    DEFAULT_REQUEST_TIMEOUT.as_secs()
}

impl ClientConfig {
    pub fn new(server_url: impl Into<String>, client_id: impl Into<String>) -> Self {
        Self {
            server_url: server_url.into(),
            client_id: client_id.into(),
            protocol: ProtocolType::default(),
            request_timeout_secs: default_request_timeout_secs(),
            reconnect: ReconnectConfig::default(),
        }
    }

    pub fn with_protocol(mut self, protocol: ProtocolType) -> Self {
        self.protocol = protocol;
        self
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    /// Absolute URL of an HTTP endpoint on the hub.
    pub fn http_url(&self, path: &str) -> String {
        format!("{}{path}", self.server_url.trim_end_matches('/'))
    }

    /// WebSocket URL for the configured encoding.
    pub fn ws_url(&self) -> String {
        let base = self.server_url.trim_end_matches('/');
        let base = if let Some(rest) = base.strip_prefix("https://") {
            format!("wss://{rest}")
        } else if let Some(rest) = base.strip_prefix("http://") {
            format!("ws://{rest}")
        } else {
            base.to_string()
        };
        let path = match self.protocol {
            ProtocolType::Passthrough => PASSTHROUGH_WS_PATH,
            ProtocolType::WotWebSocket => WOT_WS_PATH,
        };
        format!("{base}{path}")
    }
}
