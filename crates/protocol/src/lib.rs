//! Canonical message model and wire converters for the ThingHub transport.
//!
//! Every interaction between consumers, agents and the hub is a request,
//! a response or a notification. Two encodings exist on the wire: the
//! native passthrough envelope and the WoT WebSocket sub-protocol.

pub mod constants;
pub mod converter;
pub mod messages;
pub mod types;

// Re-export primary types for convenience.
pub use converter::{
    ConvertError, MessageConverter, PassthroughConverter, WotConverter, converter_for,
};
pub use messages::{Message, NotificationMessage, RequestMessage, ResponseMessage};
pub use types::{Operation, ProtocolType, Status};
