//! Operation vocabulary, response status and protocol identifiers.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Operation carried by a request, response or notification.
///
/// Serialized names are the hub's native vocabulary and are used as-is by
/// the passthrough encoding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Operation {
    // Actions
    #[serde(rename = "invokeaction")]
    InvokeAction,
    #[serde(rename = "cancelaction")]
    CancelAction,
    #[serde(rename = "queryaction")]
    QueryAction,
    #[serde(rename = "queryallactions")]
    QueryAllActions,

    // Properties
    #[serde(rename = "readproperty")]
    ReadProperty,
    #[serde(rename = "readallproperties")]
    ReadAllProperties,
    #[serde(rename = "readmultipleproperties")]
    ReadMultipleProperties,
    #[serde(rename = "writeproperty")]
    WriteProperty,
    #[serde(rename = "writemultipleproperties")]
    WriteMultipleProperties,
    #[serde(rename = "observeproperty")]
    ObserveProperty,
    #[serde(rename = "observeallproperties")]
    ObserveAllProperties,
    #[serde(rename = "unobserveproperty")]
    UnobserveProperty,
    #[serde(rename = "unobserveallproperties")]
    UnobserveAllProperties,
    #[serde(rename = "updateproperty")]
    UpdateProperty,
    #[serde(rename = "updateproperties")]
    UpdateMultipleProperties,

    // Events
    #[serde(rename = "subscribeevent")]
    SubscribeEvent,
    #[serde(rename = "subscribeallevents")]
    SubscribeAllEvents,
    #[serde(rename = "unsubscribeevent")]
    UnsubscribeEvent,
    #[serde(rename = "unsubscribeallevents")]
    UnsubscribeAllEvents,
    #[serde(rename = "readevent")]
    ReadEvent,
    #[serde(rename = "readallevents")]
    ReadAllEvents,
    #[serde(rename = "event")]
    PublishEvent,

    // Thing descriptions
    #[serde(rename = "readtd")]
    ReadTD,
    #[serde(rename = "readalltds")]
    ReadAllTDs,
    #[serde(rename = "updatetd")]
    UpdateTD,

    // Session
    #[serde(rename = "ping")]
    Ping,
    #[serde(rename = "error")]
    PublishError,
}

impl Operation {
    /// Every operation, in declaration order.
    pub const ALL: [Operation; 27] = [
        Operation::InvokeAction,
        Operation::CancelAction,
        Operation::QueryAction,
        Operation::QueryAllActions,
        Operation::ReadProperty,
        Operation::ReadAllProperties,
        Operation::ReadMultipleProperties,
        Operation::WriteProperty,
        Operation::WriteMultipleProperties,
        Operation::ObserveProperty,
        Operation::ObserveAllProperties,
        Operation::UnobserveProperty,
        Operation::UnobserveAllProperties,
        Operation::UpdateProperty,
        Operation::UpdateMultipleProperties,
        Operation::SubscribeEvent,
        Operation::SubscribeAllEvents,
        Operation::UnsubscribeEvent,
        Operation::UnsubscribeAllEvents,
        Operation::ReadEvent,
        Operation::ReadAllEvents,
        Operation::PublishEvent,
        Operation::ReadTD,
        Operation::ReadAllTDs,
        Operation::UpdateTD,
        Operation::Ping,
        Operation::PublishError,
    ];

    /// Returns the native wire name (`invokeaction`, `event`, ...).
    pub fn as_str(&self) -> &'static str {
        match self {
            Operation::InvokeAction => "invokeaction",
            Operation::CancelAction => "cancelaction",
            Operation::QueryAction => "queryaction",
            Operation::QueryAllActions => "queryallactions",
            Operation::ReadProperty => "readproperty",
            Operation::ReadAllProperties => "readallproperties",
            Operation::ReadMultipleProperties => "readmultipleproperties",
            Operation::WriteProperty => "writeproperty",
            Operation::WriteMultipleProperties => "writemultipleproperties",
            Operation::ObserveProperty => "observeproperty",
            Operation::ObserveAllProperties => "observeallproperties",
            Operation::UnobserveProperty => "unobserveproperty",
            Operation::UnobserveAllProperties => "unobserveallproperties",
            Operation::UpdateProperty => "updateproperty",
            Operation::UpdateMultipleProperties => "updateproperties",
            Operation::SubscribeEvent => "subscribeevent",
            Operation::SubscribeAllEvents => "subscribeallevents",
            Operation::UnsubscribeEvent => "unsubscribeevent",
            Operation::UnsubscribeAllEvents => "unsubscribeallevents",
            Operation::ReadEvent => "readevent",
            Operation::ReadAllEvents => "readallevents",
            Operation::PublishEvent => "event",
            Operation::ReadTD => "readtd",
            Operation::ReadAllTDs => "readalltds",
            Operation::UpdateTD => "updatetd",
            Operation::Ping => "ping",
            Operation::PublishError => "error",
        }
    }

    /// Operations that only ever travel as notifications.
    pub fn is_notification_only(&self) -> bool {
        matches!(
            self,
            Operation::PublishEvent | Operation::UpdateProperty | Operation::UpdateMultipleProperties
        )
    }

    /// Subscription management operations handled by the server connection
    /// itself rather than by the application.
    pub fn is_subscription(&self) -> bool {
        matches!(
            self,
            Operation::SubscribeEvent
                | Operation::SubscribeAllEvents
                | Operation::UnsubscribeEvent
                | Operation::UnsubscribeAllEvents
                | Operation::ObserveProperty
                | Operation::ObserveAllProperties
                | Operation::UnobserveProperty
                | Operation::UnobserveAllProperties
        )
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Progress of a request as reported in a response.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Status {
    /// Accepted but not yet processed; more responses may follow.
    #[default]
    Pending,
    /// Being processed by the agent.
    Running,
    /// Finished successfully.
    Completed,
    /// Finished with an error.
    Failed,
}

impl Status {
    /// Returns `true` for completed and failed.
    pub fn is_final(&self) -> bool {
        matches!(self, Status::Completed | Status::Failed)
    }
}

/// Wire encoding spoken on a connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ProtocolType {
    /// Canonical messages serialized directly.
    #[default]
    Passthrough,
    /// WoT WebSocket sub-protocol with one envelope per operation family.
    WotWebSocket,
}

impl fmt::Display for ProtocolType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProtocolType::Passthrough => f.write_str("passthrough"),
            ProtocolType::WotWebSocket => f.write_str("wot-websocket"),
        }
    }
}
