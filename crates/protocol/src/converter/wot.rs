//! WoT WebSocket sub-protocol converter.
//!
//! Decoding is two-phase: the [`BaseMessage`] fields are read first to learn
//! the `messageType`, which selects the operation and with it the envelope
//! to fully decode. The kind of the resulting canonical message follows
//! from the message type:
//!
//! - `actionStatus` is a response to the operation named in its `operation`
//!   field (an action invocation when absent).
//! - `pong` is a successful response to `ping`.
//! - `error` is a failed response. It is never produced by [`WotConverter`].
//! - `event`, `propertyReading` and `propertyReadings` are notifications.
//! - Any other type is a request when it carries a `correlationID`, and a
//!   notification when it does not.

use serde::Serialize;
use serde_json::Value;

use super::envelopes::{
    ActionMessage, ActionStatusMessage, BaseMessage, ErrorMessage, EventMessage, Family, Fields,
    MSG_TYPE_ACTION_STATUS, MSG_TYPE_ERROR, MSG_TYPE_PONG, MSG_TYPE_TO_OP, OP_TO_MSG_TYPE,
    PropertyMessage, TdMessage, family,
};
use super::{ConvertError, MessageConverter};
use crate::messages::{
    Message, NotificationMessage, RequestMessage, ResponseMessage, new_message_id,
};
use crate::types::{Operation, ProtocolType, Status};

/// Stateless converter for the WoT WebSocket sub-protocol.
#[derive(Debug, Default, Clone, Copy)]
pub struct WotConverter;

impl WotConverter {
    pub fn new() -> Self {
        Self
    }

    fn decode_family(op: Operation, raw: &[u8]) -> Result<Fields, ConvertError> {
        let family = family(op).ok_or(ConvertError::UnsupportedOperation(op))?;
        let fields = match family {
            Family::Action => serde_json::from_slice::<ActionMessage>(raw)?.into_fields(),
            Family::Property => serde_json::from_slice::<PropertyMessage>(raw)?.into_fields(),
            Family::Event => serde_json::from_slice::<EventMessage>(raw)?.into_fields(),
            Family::Td => serde_json::from_slice::<TdMessage>(raw)?.into_fields(),
        };
        Ok(fields)
    }

    fn encode_family(op: Operation, fields: Fields) -> Result<String, ConvertError> {
        let msg_type = OP_TO_MSG_TYPE
            .get(&op)
            .copied()
            .ok_or(ConvertError::UnsupportedOperation(op))?;
        let family = family(op).ok_or(ConvertError::UnsupportedOperation(op))?;
        match family {
            Family::Action => to_json(&ActionMessage::from_fields(msg_type, fields)),
            Family::Property => to_json(&PropertyMessage::from_fields(msg_type, fields)),
            Family::Event => to_json(&EventMessage::from_fields(msg_type, fields)),
            Family::Td => to_json(&TdMessage::from_fields(msg_type, fields)),
        }
    }

    fn decode_action_status(raw: &[u8]) -> Result<Message, ConvertError> {
        let env: ActionStatusMessage = serde_json::from_slice(raw)?;
        let updated = if env.timestamp.is_empty() {
            env.time_ended
        } else {
            env.timestamp
        };
        Ok(Message::Response(ResponseMessage {
            operation: env.operation.unwrap_or(Operation::InvokeAction),
            thing_id: env.thing_id,
            name: env.name,
            output: env.output,
            error: env.error,
            status: env.status,
            correlation_id: env.correlation_id,
            sender_id: env.sender_id,
            message_id: env.message_id,
            updated,
        }))
    }

    fn decode_pong(raw: &[u8]) -> Result<Message, ConvertError> {
        let env: EventMessage = serde_json::from_slice(raw)?;
        Ok(Message::Response(ResponseMessage {
            operation: Operation::Ping,
            thing_id: env.thing_id,
            name: env.name,
            output: env.data,
            error: String::new(),
            status: Status::Completed,
            correlation_id: env.correlation_id,
            sender_id: env.sender_id,
            message_id: env.message_id,
            updated: env.timestamp,
        }))
    }

    fn decode_error(raw: &[u8]) -> Result<Message, ConvertError> {
        let env: ErrorMessage = serde_json::from_slice(raw)?;
        let output = if env.detail.is_empty() {
            Value::Null
        } else {
            Value::String(env.detail)
        };
        Ok(Message::Response(ResponseMessage {
            operation: Operation::PublishError,
            thing_id: env.thing_id,
            name: env.name,
            output,
            error: env.title,
            status: Status::Failed,
            correlation_id: env.correlation_id,
            sender_id: String::new(),
            message_id: env.message_id,
            updated: env.timestamp,
        }))
    }
}

impl MessageConverter for WotConverter {
    fn protocol_type(&self) -> ProtocolType {
        ProtocolType::WotWebSocket
    }

    fn decode(&self, raw: &[u8]) -> Result<Message, ConvertError> {
        let base: BaseMessage = serde_json::from_slice(raw)?;
        match base.message_type.as_str() {
            MSG_TYPE_ACTION_STATUS => return Self::decode_action_status(raw),
            MSG_TYPE_PONG => return Self::decode_pong(raw),
            MSG_TYPE_ERROR => return Self::decode_error(raw),
            _ => {}
        }

        let op = MSG_TYPE_TO_OP
            .get(base.message_type.as_str())
            .copied()
            .ok_or(ConvertError::UnknownMessageType(base.message_type))?;
        let f = Self::decode_family(op, raw)?;

        if op.is_notification_only() || f.correlation_id.is_empty() {
            return Ok(Message::Notification(NotificationMessage {
                operation: op,
                thing_id: f.thing_id,
                name: f.name,
                data: f.payload,
                sender_id: f.sender_id,
                message_id: f.message_id,
                updated: f.timestamp,
            }));
        }
        Ok(Message::Request(RequestMessage {
            operation: op,
            thing_id: f.thing_id,
            name: f.name,
            input: f.payload,
            correlation_id: f.correlation_id,
            sender_id: f.sender_id,
            message_id: f.message_id,
            created: f.timestamp,
        }))
    }

    fn encode_request(&self, req: &RequestMessage) -> Result<String, ConvertError> {
        if req.operation.is_notification_only() {
            return Err(ConvertError::UnsupportedOperation(req.operation));
        }
        // Without a correlation ID the peer would read this as a notification.
        let correlation_id = if req.correlation_id.is_empty() {
            new_message_id()
        } else {
            req.correlation_id.clone()
        };
        let fields = Fields {
            thing_id: req.thing_id.clone(),
            message_id: req.message_id.clone(),
            correlation_id,
            name: req.name.clone(),
            payload: req.input.clone(),
            timestamp: req.created.clone(),
            sender_id: req.sender_id.clone(),
        };
        Self::encode_family(req.operation, fields)
    }

    fn encode_response(&self, resp: &ResponseMessage) -> Result<String, ConvertError> {
        if resp.operation == Operation::Ping && resp.status == Status::Completed && !resp.is_error()
        {
            let pong = EventMessage {
                thing_id: resp.thing_id.clone(),
                message_type: MSG_TYPE_PONG.to_string(),
                message_id: resp.message_id.clone(),
                correlation_id: resp.correlation_id.clone(),
                name: resp.name.clone(),
                data: resp.output.clone(),
                last_event: String::new(),
                timestamp: resp.updated.clone(),
                sender_id: resp.sender_id.clone(),
            };
            return to_json(&pong);
        }

        let time_ended = if resp.status.is_final() {
            resp.updated.clone()
        } else {
            String::new()
        };
        let status = ActionStatusMessage {
            thing_id: resp.thing_id.clone(),
            message_type: MSG_TYPE_ACTION_STATUS.to_string(),
            message_id: resp.message_id.clone(),
            correlation_id: resp.correlation_id.clone(),
            name: resp.name.clone(),
            operation: Some(resp.operation),
            status: resp.status,
            error: resp.error.clone(),
            output: resp.output.clone(),
            time_requested: String::new(),
            time_ended,
            timestamp: resp.updated.clone(),
            sender_id: resp.sender_id.clone(),
        };
        to_json(&status)
    }

    fn encode_notification(&self, notif: &NotificationMessage) -> Result<String, ConvertError> {
        let fields = Fields {
            thing_id: notif.thing_id.clone(),
            message_id: notif.message_id.clone(),
            correlation_id: String::new(),
            name: notif.name.clone(),
            payload: notif.data.clone(),
            timestamp: notif.updated.clone(),
            sender_id: notif.sender_id.clone(),
        };
        Self::encode_family(notif.operation, fields)
    }
}

fn to_json<T: Serialize>(envelope: &T) -> Result<String, ConvertError> {
    Ok(serde_json::to_string(envelope)?)
}
