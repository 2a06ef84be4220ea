//! Canonical message model.
//!
//! Every interaction crossing a connection is one of three kinds: a
//! [`RequestMessage`] that expects a reply, a [`ResponseMessage`] answering
//! exactly one request, or an unsolicited [`NotificationMessage`]. Converters
//! map these to and from the wire.

use chrono::SecondsFormat;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::types::{Operation, Status};

/// Returns the current UTC time formatted with millisecond precision.
pub fn now_timestamp() -> String {
    chrono::Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true)
}

/// Generates a fresh message or correlation ID.
pub fn new_message_id() -> String {
    uuid::Uuid::new_v4().to_string()
}

/// An operation invocation expecting a reply.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RequestMessage {
    pub operation: Operation,
    #[serde(rename = "thingID", default, skip_serializing_if = "String::is_empty")]
    pub thing_id: String,
    /// Affordance name; empty for Thing-level operations.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub name: String,
    #[serde(default, skip_serializing_if = "Value::is_null")]
    pub input: Value,
    /// Caller-chosen; a request without one is fire-and-forget.
    #[serde(rename = "correlationID", default, skip_serializing_if = "String::is_empty")]
    pub correlation_id: String,
    #[serde(rename = "senderID", default, skip_serializing_if = "String::is_empty")]
    pub sender_id: String,
    #[serde(rename = "messageID", default, skip_serializing_if = "String::is_empty")]
    pub message_id: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub created: String,
}

impl RequestMessage {
    /// Creates a request stamped with a new message ID and creation time.
    pub fn new(
        operation: Operation,
        thing_id: impl Into<String>,
        name: impl Into<String>,
        input: Value,
    ) -> Self {
        Self {
            operation,
            thing_id: thing_id.into(),
            name: name.into(),
            input,
            correlation_id: String::new(),
            sender_id: String::new(),
            message_id: new_message_id(),
            created: now_timestamp(),
        }
    }

    /// Sets the correlation ID.
    pub fn with_correlation_id(mut self, correlation_id: impl Into<String>) -> Self {
        self.correlation_id = correlation_id.into();
        self
    }

    /// Builds the final response for this request.
    ///
    /// `Some(error)` yields a failed response, otherwise completed.
    pub fn create_response(&self, output: Value, error: Option<String>) -> ResponseMessage {
        let (status, error) = match error {
            Some(e) => (Status::Failed, e),
            None => (Status::Completed, String::new()),
        };
        ResponseMessage {
            operation: self.operation,
            thing_id: self.thing_id.clone(),
            name: self.name.clone(),
            output,
            error,
            status,
            correlation_id: self.correlation_id.clone(),
            sender_id: String::new(),
            message_id: new_message_id(),
            updated: now_timestamp(),
        }
    }

    /// Builds a response with an explicit non-final status.
    pub fn create_status_response(&self, status: Status) -> ResponseMessage {
        let mut resp = self.create_response(Value::Null, None);
        resp.status = status;
        resp
    }
}

/// A reply to one prior request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResponseMessage {
    pub operation: Operation,
    #[serde(rename = "thingID", default, skip_serializing_if = "String::is_empty")]
    pub thing_id: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub name: String,
    #[serde(default, skip_serializing_if = "Value::is_null")]
    pub output: Value,
    /// Empty on success.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub error: String,
    #[serde(default)]
    pub status: Status,
    #[serde(rename = "correlationID", default, skip_serializing_if = "String::is_empty")]
    pub correlation_id: String,
    #[serde(rename = "senderID", default, skip_serializing_if = "String::is_empty")]
    pub sender_id: String,
    #[serde(rename = "messageID", default, skip_serializing_if = "String::is_empty")]
    pub message_id: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub updated: String,
}

impl ResponseMessage {
    /// Returns `true` when the response carries an application error.
    pub fn is_error(&self) -> bool {
        !self.error.is_empty()
    }
}

/// An unsolicited push: property change, event or TD update.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NotificationMessage {
    pub operation: Operation,
    #[serde(rename = "thingID", default, skip_serializing_if = "String::is_empty")]
    pub thing_id: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub name: String,
    #[serde(default, skip_serializing_if = "Value::is_null")]
    pub data: Value,
    #[serde(rename = "senderID", default, skip_serializing_if = "String::is_empty")]
    pub sender_id: String,
    #[serde(rename = "messageID", default, skip_serializing_if = "String::is_empty")]
    pub message_id: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub updated: String,
}

impl NotificationMessage {
    pub fn new(
        operation: Operation,
        thing_id: impl Into<String>,
        name: impl Into<String>,
        data: Value,
    ) -> Self {
        Self {
            operation,
            thing_id: thing_id.into(),
            name: name.into(),
            data,
            sender_id: String::new(),
            message_id: new_message_id(),
            updated: now_timestamp(),
        }
    }
}

/// Any of the three canonical kinds.
///
/// Serializes with a `messageType` discriminator of `request`, `response` or
/// `notification`, which is exactly the passthrough wire format.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "messageType", rename_all = "lowercase")]
pub enum Message {
    Request(RequestMessage),
    Response(ResponseMessage),
    Notification(NotificationMessage),
}

impl Message {
    pub fn operation(&self) -> Operation {
        match self {
            Message::Request(m) => m.operation,
            Message::Response(m) => m.operation,
            Message::Notification(m) => m.operation,
        }
    }

    pub fn thing_id(&self) -> &str {
        match self {
            Message::Request(m) => &m.thing_id,
            Message::Response(m) => &m.thing_id,
            Message::Notification(m) => &m.thing_id,
        }
    }

    /// Correlation ID, empty for notifications.
    pub fn correlation_id(&self) -> &str {
        match self {
            Message::Request(m) => &m.correlation_id,
            Message::Response(m) => &m.correlation_id,
            Message::Notification(_) => "",
        }
    }

    /// Short kind label used in logs.
    pub fn kind(&self) -> &'static str {
        match self {
            Message::Request(_) => "request",
            Message::Response(_) => "response",
            Message::Notification(_) => "notification",
        }
    }
}
