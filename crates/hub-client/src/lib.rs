//! ThingHub client.
//!
//! Logs in over HTTP, opens an authenticated WebSocket session in either
//! encoding, and reconnects with the last token after unexpected drops.

pub mod auth;
mod client;
pub mod config;
mod ops;
mod reconnection;

pub use auth::AuthClient;
pub use client::ClientConnection;
pub use config::{ClientConfig, ReconnectConfig};
pub use thinghub_transport::{ConnectionState, TransportError};

/// Errors produced by the client.
#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("login failed ({status}): {body}")]
    Login { status: u16, body: String },

    #[error("no valid token")]
    InvalidToken,

    /// A newer connect or disconnect replaced this attempt.
    #[error("connection attempt superseded")]
    Superseded,
}
