//! Stateless mappers between the canonical model and a wire encoding.

mod envelopes;
mod passthrough;
mod wot;

use std::sync::Arc;

pub use passthrough::PassthroughConverter;
pub use wot::WotConverter;

use crate::messages::{Message, NotificationMessage, RequestMessage, ResponseMessage};
use crate::types::{Operation, ProtocolType};

/// Errors raised while decoding or encoding a wire message.
#[derive(Debug, thiserror::Error)]
pub enum ConvertError {
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("unknown message type '{0}'")]
    UnknownMessageType(String),

    #[error("operation '{0}' has no envelope mapping")]
    UnsupportedOperation(Operation),
}

/// Bidirectional mapper for one wire encoding.
///
/// Implementations hold no per-connection state and are shared between
/// connections behind an `Arc`.
pub trait MessageConverter: Send + Sync {
    /// Encoding implemented by this converter.
    fn protocol_type(&self) -> ProtocolType;

    /// Decodes one wire frame into a canonical message.
    fn decode(&self, raw: &[u8]) -> Result<Message, ConvertError>;

    fn encode_request(&self, req: &RequestMessage) -> Result<String, ConvertError>;

    fn encode_response(&self, resp: &ResponseMessage) -> Result<String, ConvertError>;

    fn encode_notification(&self, notif: &NotificationMessage) -> Result<String, ConvertError>;

    /// Encodes any canonical message.
    fn encode(&self, msg: &Message) -> Result<String, ConvertError> {
        match msg {
            Message::Request(m) => self.encode_request(m),
            Message::Response(m) => self.encode_response(m),
            Message::Notification(m) => self.encode_notification(m),
        }
    }
}

/// Returns the shared converter for an encoding.
pub fn converter_for(protocol: ProtocolType) -> Arc<dyn MessageConverter> {
    match protocol {
        ProtocolType::Passthrough => Arc::new(PassthroughConverter::new()),
        ProtocolType::WotWebSocket => Arc::new(WotConverter::new()),
    }
}
