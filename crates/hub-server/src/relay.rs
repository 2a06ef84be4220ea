//! Minimal hub routing between consumers and agents.
//!
//! Agents announce their Things with `updatetd` notifications. Consumer
//! requests for a known Thing are forwarded to the agent's session and the
//! agent's answer is returned to the consumer. Agent events and property
//! updates are fanned out to subscribers.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;
use serde_json::Value;
use thinghub_protocol::{NotificationMessage, Operation, RequestMessage, ResponseMessage};
use thinghub_transport::{ConnectionInfo, Handlers};
use tracing::{debug, info, warn};

use crate::manager::ConnectionManager;

#[derive(Debug, Clone)]
struct ThingRecord {
    agent_id: String,
    td: Value,
}

/// Thing directory and request forwarder.
pub struct HubRelay {
    manager: Arc<ConnectionManager>,
    things: RwLock<HashMap<String, ThingRecord>>,
}

impl HubRelay {
    pub fn new(manager: Arc<ConnectionManager>) -> Arc<Self> {
        Arc::new(Self {
            manager,
            things: RwLock::new(HashMap::new()),
        })
    }

    /// Routes the request and notification handlers of `handlers` here.
    pub fn install(self: &Arc<Self>, handlers: &Handlers) {
        let relay = Arc::clone(self);
        handlers.set_request_handler(move |req: RequestMessage, info: ConnectionInfo| {
            let relay = relay.clone();
            async move { relay.handle_request(req, &info).await }
        });
        let relay = Arc::clone(self);
        handlers.set_notification_handler(move |notif: NotificationMessage, info: ConnectionInfo| {
            let relay = relay.clone();
            async move { relay.handle_notification(notif, &info) }
        });
    }

    /// IDs of all known Things.
    pub fn thing_ids(&self) -> Vec<String> {
        let mut ids: Vec<_> = self.things.read().keys().cloned().collect();
        ids.sort();
        ids
    }

    /// The stored TD of a Thing.
    pub fn read_td(&self, thing_id: &str) -> Option<Value> {
        self.things.read().get(thing_id).map(|r| r.td.clone())
    }

    /// The agent that owns a Thing.
    pub fn agent_of(&self, thing_id: &str) -> Option<String> {
        self.things.read().get(thing_id).map(|r| r.agent_id.clone())
    }

    pub async fn handle_request(&self, req: RequestMessage, info: &ConnectionInfo) -> ResponseMessage {
        match req.operation {
            Operation::ReadTD => match self.read_td(&req.thing_id) {
                Some(td) => req.create_response(td, None),
                None => unknown_thing(&req),
            },
            Operation::ReadAllTDs => {
                let tds: Vec<Value> = self.things.read().values().map(|r| r.td.clone()).collect();
                req.create_response(Value::Array(tds), None)
            }
            _ => self.forward(req, info).await,
        }
    }

    async fn forward(&self, req: RequestMessage, info: &ConnectionInfo) -> ResponseMessage {
        let Some(agent_id) = self.agent_of(&req.thing_id) else {
            return unknown_thing(&req);
        };
        let Some(agent) = self.manager.get_connection_by_client_id(&agent_id) else {
            debug!(thing = %req.thing_id, agent = %agent_id, "agent offline");
            return req.create_response(Value::Null, Some(format!("agent '{agent_id}' is not connected")));
        };

        // The agent sees a fresh correlation ID; the consumer's is restored
        // by its own connection when the response is sent back.
        let mut forwarded = req.clone();
        forwarded.correlation_id.clear();
        debug!(
            op = %req.operation,
            thing = %req.thing_id,
            consumer = %info.client_id,
            agent = %agent_id,
            "forwarding request"
        );
        match agent.send_request(forwarded).await {
            Ok(mut resp) => {
                resp.correlation_id = req.correlation_id.clone();
                resp
            }
            Err(e) => {
                warn!(thing = %req.thing_id, agent = %agent_id, "forward failed: {e}");
                req.create_response(Value::Null, Some(e.to_string()))
            }
        }
    }

    pub fn handle_notification(&self, notif: NotificationMessage, info: &ConnectionInfo) {
        match notif.operation {
            Operation::UpdateTD => {
                let thing_id = if notif.thing_id.is_empty() {
                    notif
                        .data
                        .get("id")
                        .and_then(Value::as_str)
                        .unwrap_or_default()
                        .to_string()
                } else {
                    notif.thing_id.clone()
                };
                if thing_id.is_empty() {
                    warn!(agent = %info.client_id, "TD update without thing ID, ignoring");
                    return;
                }
                let previous = self.things.write().insert(
                    thing_id.clone(),
                    ThingRecord {
                        agent_id: info.client_id.clone(),
                        td: notif.data.clone(),
                    },
                );
                if previous.is_none() {
                    info!(thing = %thing_id, agent = %info.client_id, "thing registered");
                }
                let mut notif = notif;
                notif.thing_id = thing_id;
                self.manager.publish_notification(&notif);
            }
            Operation::PublishEvent | Operation::UpdateProperty | Operation::UpdateMultipleProperties => {
                if self
                    .agent_of(&notif.thing_id)
                    .is_some_and(|owner| owner != info.client_id)
                {
                    warn!(thing = %notif.thing_id, sender = %info.client_id, "notification from non-owner dropped");
                    return;
                }
                self.manager.publish_notification(&notif);
            }
            other => debug!(op = %other, "ignoring notification"),
        }
    }
}

fn unknown_thing(req: &RequestMessage) -> ResponseMessage {
    req.create_response(Value::Null, Some(format!("unknown thing '{}'", req.thing_id)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use thinghub_protocol::{ProtocolType, Status};

    fn info(client_id: &str) -> ConnectionInfo {
        ConnectionInfo {
            client_id: client_id.into(),
            connection_id: "1".into(),
            protocol: ProtocolType::Passthrough,
            remote_addr: String::new(),
        }
    }

    fn relay() -> Arc<HubRelay> {
        HubRelay::new(Arc::new(ConnectionManager::new(0)))
    }

    #[tokio::test]
    async fn td_updates_populate_the_directory() {
        let relay = relay();
        let td = json!({"id": "therm-1", "title": "Thermostat"});
        relay.handle_notification(
            NotificationMessage::new(Operation::UpdateTD, "", "", td.clone()),
            &info("agent-1"),
        );

        assert_eq!(relay.thing_ids(), vec!["therm-1".to_string()]);
        assert_eq!(relay.agent_of("therm-1").as_deref(), Some("agent-1"));

        let req = RequestMessage::new(Operation::ReadTD, "therm-1", "", Value::Null);
        let resp = relay.handle_request(req, &info("consumer")).await;
        assert_eq!(resp.output, td);

        let req = RequestMessage::new(Operation::ReadAllTDs, "", "", Value::Null);
        let resp = relay.handle_request(req, &info("consumer")).await;
        assert_eq!(resp.output, json!([td]));
    }

    #[tokio::test]
    async fn unknown_thing_fails() {
        let relay = relay();
        for op in [Operation::ReadTD, Operation::InvokeAction] {
            let req = RequestMessage::new(op, "ghost", "x", Value::Null);
            let resp = relay.handle_request(req, &info("consumer")).await;
            assert_eq!(resp.status, Status::Failed);
            assert_eq!(resp.error, "unknown thing 'ghost'");
        }
    }

    #[tokio::test]
    async fn offline_agent_fails() {
        let relay = relay();
        relay.handle_notification(
            NotificationMessage::new(Operation::UpdateTD, "therm-1", "", json!({})),
            &info("agent-1"),
        );
        let req = RequestMessage::new(Operation::ReadProperty, "therm-1", "temperature", Value::Null);
        let resp = relay.handle_request(req, &info("consumer")).await;
        assert!(resp.is_error());
        assert!(resp.error.contains("agent-1"));
    }
}
