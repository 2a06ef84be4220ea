//! ThingHub server.
//!
//! Accepts authenticated WebSocket sessions in either encoding, keeps
//! per-session subscriptions, fans notifications out to interested
//! sessions, and issues bearer tokens over a small HTTP login API.

pub mod config;
pub mod connection;
pub mod manager;
pub mod relay;
mod server;
pub mod sessions;
pub mod subscriptions;

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};

pub use config::ServerConfig;
pub use connection::ServerConnection;
pub use manager::ConnectionManager;
pub use relay::HubRelay;
pub use server::HubServer;
pub use sessions::SessionStore;
pub use subscriptions::{SubscriptionRegistry, Subscriptions};
pub use thinghub_transport::Handlers;

/// Errors produced by the hub server.
#[derive(Debug, thiserror::Error)]
pub enum ServerError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("not authenticated")]
    Unauthenticated,

    #[error("too many connections")]
    TooManyConnections,

    #[error("duplicate connection ID")]
    DuplicateConnection,

    #[error("invalid login or password")]
    InvalidCredentials,

    #[error("session expired")]
    SessionExpired,

    #[error("server already running")]
    AlreadyRunning,
}

impl IntoResponse for ServerError {
    fn into_response(self) -> Response {
        let status = match &self {
            Self::Unauthenticated | Self::InvalidCredentials | Self::SessionExpired => {
                StatusCode::UNAUTHORIZED
            }
            Self::TooManyConnections => StatusCode::SERVICE_UNAVAILABLE,
            Self::DuplicateConnection => StatusCode::CONFLICT,
            Self::Io(_) | Self::AlreadyRunning => StatusCode::INTERNAL_SERVER_ERROR,
        };
        (status, self.to_string()).into_response()
    }
}
