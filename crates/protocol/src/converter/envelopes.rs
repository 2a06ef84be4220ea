//! WoT WebSocket sub-protocol envelopes and the message type table.
//!
//! JSON field names here are part of the wire contract and must not change.

use std::collections::HashMap;
use std::sync::LazyLock;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::types::{Operation, Status};

pub(crate) const MSG_TYPE_ACTION_STATUS: &str = "actionStatus";
pub(crate) const MSG_TYPE_PONG: &str = "pong";
pub(crate) const MSG_TYPE_ERROR: &str = "error";

/// Request and notification message types. `actionStatus`, `pong` and
/// `error` are response shapes and handled separately.
const MESSAGE_TYPES: &[(&str, Operation)] = &[
    ("invokeAction", Operation::InvokeAction),
    ("cancelAction", Operation::CancelAction),
    ("queryAction", Operation::QueryAction),
    ("queryAllActions", Operation::QueryAllActions),
    ("readProperty", Operation::ReadProperty),
    ("readAllProperties", Operation::ReadAllProperties),
    ("writeProperty", Operation::WriteProperty),
    ("observeProperty", Operation::ObserveProperty),
    ("observeAllProperties", Operation::ObserveAllProperties),
    ("unobserveProperty", Operation::UnobserveProperty),
    ("unobserveAllProperties", Operation::UnobserveAllProperties),
    ("propertyReading", Operation::UpdateProperty),
    ("propertyReadings", Operation::UpdateMultipleProperties),
    ("subscribeEvent", Operation::SubscribeEvent),
    ("subscribeAllEvents", Operation::SubscribeAllEvents),
    ("unsubscribeEvent", Operation::UnsubscribeEvent),
    ("unsubscribeAllEvents", Operation::UnsubscribeAllEvents),
    ("readEvent", Operation::ReadEvent),
    ("readAllEvents", Operation::ReadAllEvents),
    ("event", Operation::PublishEvent),
    ("readTD", Operation::ReadTD),
    ("readAllTDs", Operation::ReadAllTDs),
    ("updateTD", Operation::UpdateTD),
    ("ping", Operation::Ping),
];

pub(crate) static MSG_TYPE_TO_OP: LazyLock<HashMap<&'static str, Operation>> =
    LazyLock::new(|| MESSAGE_TYPES.iter().copied().collect());

pub(crate) static OP_TO_MSG_TYPE: LazyLock<HashMap<Operation, &'static str>> =
    LazyLock::new(|| MSG_TYPE_TO_OP.iter().map(|(t, op)| (*op, *t)).collect());

/// Envelope family an operation is carried in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Family {
    Action,
    Property,
    Event,
    Td,
}

pub(crate) fn family(op: Operation) -> Option<Family> {
    use Operation::*;
    match op {
        InvokeAction | CancelAction | QueryAction | QueryAllActions => Some(Family::Action),
        ReadProperty | ReadAllProperties | WriteProperty | ObserveProperty
        | ObserveAllProperties | UnobserveProperty | UnobserveAllProperties | UpdateProperty
        | UpdateMultipleProperties => Some(Family::Property),
        SubscribeEvent | SubscribeAllEvents | UnsubscribeEvent | UnsubscribeAllEvents
        | ReadEvent | ReadAllEvents | PublishEvent | Ping => Some(Family::Event),
        ReadTD | ReadAllTDs | UpdateTD => Some(Family::Td),
        ReadMultipleProperties | WriteMultipleProperties | PublishError => None,
    }
}

/// Common fields read in the first decoding pass.
#[derive(Debug, Deserialize)]
pub(crate) struct BaseMessage {
    #[serde(rename = "thingId", default)]
    pub thing_id: String,
    #[serde(rename = "messageType")]
    pub message_type: String,
    #[serde(rename = "messageId", default)]
    pub message_id: String,
    #[serde(rename = "correlationID", default)]
    pub correlation_id: String,
}

/// Envelope-independent view of a request or notification.
#[derive(Debug, Default, Clone, PartialEq)]
pub(crate) struct Fields {
    pub thing_id: String,
    pub message_id: String,
    pub correlation_id: String,
    pub name: String,
    pub payload: Value,
    pub timestamp: String,
    pub sender_id: String,
}

#[derive(Debug, Default, Serialize, Deserialize)]
pub(crate) struct ActionMessage {
    #[serde(rename = "thingId", default)]
    pub thing_id: String,
    #[serde(rename = "messageType")]
    pub message_type: String,
    #[serde(rename = "messageId", default, skip_serializing_if = "String::is_empty")]
    pub message_id: String,
    #[serde(rename = "correlationID", default, skip_serializing_if = "String::is_empty")]
    pub correlation_id: String,
    #[serde(rename = "action", default)]
    pub name: String,
    #[serde(default, skip_serializing_if = "Value::is_null")]
    pub input: Value,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub timestamp: String,
    #[serde(rename = "senderID", default, skip_serializing_if = "String::is_empty")]
    pub sender_id: String,
}

#[derive(Debug, Default, Serialize, Deserialize)]
pub(crate) struct ActionStatusMessage {
    #[serde(rename = "thingId", default)]
    pub thing_id: String,
    #[serde(rename = "messageType")]
    pub message_type: String,
    #[serde(rename = "messageId", default, skip_serializing_if = "String::is_empty")]
    pub message_id: String,
    #[serde(rename = "correlationID", default, skip_serializing_if = "String::is_empty")]
    pub correlation_id: String,
    #[serde(rename = "action", default)]
    pub name: String,
    /// Operation being answered. Absent from foreign senders, in which case
    /// the status is taken to answer an action invocation.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub operation: Option<Operation>,
    #[serde(default)]
    pub status: Status,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub error: String,
    #[serde(default, skip_serializing_if = "Value::is_null")]
    pub output: Value,
    #[serde(rename = "timeRequested", default)]
    pub time_requested: String,
    #[serde(rename = "timeEnded", default, skip_serializing_if = "String::is_empty")]
    pub time_ended: String,
    #[serde(default)]
    pub timestamp: String,
    #[serde(rename = "senderID", default, skip_serializing_if = "String::is_empty")]
    pub sender_id: String,
}

#[derive(Debug, Default, Serialize, Deserialize)]
pub(crate) struct PropertyMessage {
    #[serde(rename = "thingId", default)]
    pub thing_id: String,
    #[serde(rename = "messageType")]
    pub message_type: String,
    #[serde(rename = "messageId", default, skip_serializing_if = "String::is_empty")]
    pub message_id: String,
    #[serde(rename = "correlationID", default, skip_serializing_if = "String::is_empty")]
    pub correlation_id: String,
    #[serde(rename = "property", default, skip_serializing_if = "String::is_empty")]
    pub name: String,
    #[serde(default, skip_serializing_if = "Value::is_null")]
    pub data: Value,
    #[serde(rename = "lastPropertyReading", default, skip_serializing_if = "String::is_empty")]
    pub last_property_reading: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub timestamp: String,
    #[serde(rename = "senderID", default, skip_serializing_if = "String::is_empty")]
    pub sender_id: String,
}

#[derive(Debug, Default, Serialize, Deserialize)]
pub(crate) struct EventMessage {
    #[serde(rename = "thingId", default)]
    pub thing_id: String,
    #[serde(rename = "messageType")]
    pub message_type: String,
    #[serde(rename = "messageId", default, skip_serializing_if = "String::is_empty")]
    pub message_id: String,
    #[serde(rename = "correlationID", default, skip_serializing_if = "String::is_empty")]
    pub correlation_id: String,
    #[serde(rename = "event", default, skip_serializing_if = "String::is_empty")]
    pub name: String,
    #[serde(default, skip_serializing_if = "Value::is_null")]
    pub data: Value,
    #[serde(rename = "lastEvent", default, skip_serializing_if = "String::is_empty")]
    pub last_event: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub timestamp: String,
    #[serde(rename = "senderID", default, skip_serializing_if = "String::is_empty")]
    pub sender_id: String,
}

#[derive(Debug, Default, Serialize, Deserialize)]
pub(crate) struct TdMessage {
    #[serde(rename = "thingId", default)]
    pub thing_id: String,
    #[serde(rename = "messageType")]
    pub message_type: String,
    #[serde(rename = "messageId", default, skip_serializing_if = "String::is_empty")]
    pub message_id: String,
    #[serde(rename = "correlationID", default, skip_serializing_if = "String::is_empty")]
    pub correlation_id: String,
    /// Carries the request name. The wire field is called `event` for
    /// compatibility with existing peers.
    #[serde(rename = "event", default, skip_serializing_if = "String::is_empty")]
    pub name: String,
    /// TD document, or a list of them.
    #[serde(default, skip_serializing_if = "Value::is_null")]
    pub data: Value,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub timestamp: String,
    #[serde(rename = "senderID", default, skip_serializing_if = "String::is_empty")]
    pub sender_id: String,
}

#[derive(Debug, Default, Serialize, Deserialize)]
pub(crate) struct ErrorMessage {
    #[serde(rename = "thingId", default)]
    pub thing_id: String,
    #[serde(rename = "messageType")]
    pub message_type: String,
    #[serde(rename = "messageId", default, skip_serializing_if = "String::is_empty")]
    pub message_id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub title: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub detail: String,
    #[serde(default)]
    pub status: String,
    #[serde(rename = "correlationID", default, skip_serializing_if = "String::is_empty")]
    pub correlation_id: String,
    #[serde(default)]
    pub timestamp: String,
}

macro_rules! family_envelope {
    ($ty:ident, $payload:ident $(, $extra:ident)*) => {
        impl $ty {
            pub(crate) fn from_fields(message_type: &str, f: Fields) -> Self {
                Self {
                    thing_id: f.thing_id,
                    message_type: message_type.to_string(),
                    message_id: f.message_id,
                    correlation_id: f.correlation_id,
                    name: f.name,
                    $payload: f.payload,
                    timestamp: f.timestamp,
                    sender_id: f.sender_id,
                    $($extra: String::new(),)*
                }
            }

            pub(crate) fn into_fields(self) -> Fields {
                Fields {
                    thing_id: self.thing_id,
                    message_id: self.message_id,
                    correlation_id: self.correlation_id,
                    name: self.name,
                    payload: self.$payload,
                    timestamp: self.timestamp,
                    sender_id: self.sender_id,
                }
            }
        }
    };
}

family_envelope!(ActionMessage, input);
family_envelope!(PropertyMessage, data, last_property_reading);
family_envelope!(EventMessage, data, last_event);
family_envelope!(TdMessage, data);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tables_are_symmetric() {
        assert_eq!(MSG_TYPE_TO_OP.len(), MESSAGE_TYPES.len(), "duplicate message type");
        assert_eq!(OP_TO_MSG_TYPE.len(), MESSAGE_TYPES.len(), "duplicate operation");
        for (msg_type, op) in MESSAGE_TYPES {
            assert_eq!(OP_TO_MSG_TYPE[op], *msg_type);
            assert_eq!(MSG_TYPE_TO_OP[msg_type], *op);
        }
    }

    #[test]
    fn every_mapped_operation_has_a_family() {
        for op in OP_TO_MSG_TYPE.keys() {
            assert!(family(*op).is_some(), "{op} has no envelope");
        }
    }

    #[test]
    fn response_types_are_not_in_the_table() {
        for t in [MSG_TYPE_ACTION_STATUS, MSG_TYPE_PONG, MSG_TYPE_ERROR] {
            assert!(!MSG_TYPE_TO_OP.contains_key(t));
        }
    }

    #[test]
    fn td_message_name_uses_event_field() {
        let msg = TdMessage::from_fields(
            "readTD",
            Fields {
                thing_id: "t1".into(),
                name: "td-name".into(),
                ..Default::default()
            },
        );
        let v = serde_json::to_value(&msg).unwrap();
        assert_eq!(v["event"], "td-name");
        assert_eq!(v["thingId"], "t1");
        assert!(v.get("name").is_none());
    }
}
