//! Duplex connection core for the ThingHub transport.
//!
//! Provides the pieces shared by hub servers and clients: a WebSocket
//! [`Connection`] with read/write pumps, request/response correlation,
//! and swappable application handlers.

pub mod connection;
pub mod correlation;
pub mod error;
pub mod handlers;
mod pumps;
pub mod types;

pub use connection::{Connection, ConnectionOptions, RequestInterceptor};
pub use correlation::{PendingCalls, ReplySlot};
pub use error::TransportError;
pub use handlers::{HandlerFuture, HandlerSlot, Handlers};
pub use types::{ConnectionInfo, ConnectionState, connection_key};
