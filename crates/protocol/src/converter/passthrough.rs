//! Passthrough converter: canonical messages serialized directly.

use super::{ConvertError, MessageConverter};
use crate::messages::{Message, NotificationMessage, RequestMessage, ResponseMessage};
use crate::types::ProtocolType;

/// Converter for the native envelope. The `messageType` discriminator is
/// the only field inspected to pick the message kind.
#[derive(Debug, Default, Clone, Copy)]
pub struct PassthroughConverter;

impl PassthroughConverter {
    pub fn new() -> Self {
        Self
    }
}

impl MessageConverter for PassthroughConverter {
    fn protocol_type(&self) -> ProtocolType {
        ProtocolType::Passthrough
    }

    fn decode(&self, raw: &[u8]) -> Result<Message, ConvertError> {
        Ok(serde_json::from_slice(raw)?)
    }

    fn encode_request(&self, req: &RequestMessage) -> Result<String, ConvertError> {
        Ok(serde_json::to_string(&Message::Request(req.clone()))?)
    }

    fn encode_response(&self, resp: &ResponseMessage) -> Result<String, ConvertError> {
        Ok(serde_json::to_string(&Message::Response(resp.clone()))?)
    }

    fn encode_notification(&self, notif: &NotificationMessage) -> Result<String, ConvertError> {
        Ok(serde_json::to_string(&Message::Notification(notif.clone()))?)
    }
}
