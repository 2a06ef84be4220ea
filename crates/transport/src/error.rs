use thinghub_protocol::ConvertError;
use tokio_tungstenite::tungstenite;

/// Errors surfaced by a connection.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("WebSocket error: {0}")]
    Ws(#[from] tungstenite::Error),

    #[error("conversion error: {0}")]
    Convert(#[from] ConvertError),

    #[error("request timed out")]
    Timeout,

    #[error("connection closed")]
    Closed,

    #[error("not connected")]
    NotConnected,

    #[error("send buffer full")]
    BufferFull,

    #[error("unauthorized: {0}")]
    Unauthorized(String),

    /// Application error carried in a response.
    #[error("remote error: {0}")]
    Remote(String),
}
