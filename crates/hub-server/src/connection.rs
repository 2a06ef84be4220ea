//! Server side of a session: a [`Connection`] plus its subscriptions.

use std::sync::Arc;
use std::time::Duration;

use futures_util::{Sink, Stream};
use serde_json::Value;
use thinghub_protocol::{NotificationMessage, Operation, RequestMessage, ResponseMessage, converter_for};
use thinghub_transport::{
    Connection, ConnectionInfo, ConnectionOptions, Handlers, RequestInterceptor, TransportError,
};
use tokio_tungstenite::tungstenite::{self, Message as WsMessage};
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::subscriptions::SubscriptionRegistry;

/// An accepted, authenticated session.
///
/// Keepalive and subscription requests are answered here and never reach
/// the application request handler.
pub struct ServerConnection {
    conn: Connection,
    subscriptions: Arc<SubscriptionRegistry>,
}

impl ServerConnection {
    pub fn spawn<S>(
        ws: S,
        info: ConnectionInfo,
        handlers: Arc<Handlers>,
        request_timeout: Duration,
        parent: &CancellationToken,
    ) -> Arc<Self>
    where
        S: Stream<Item = Result<WsMessage, tungstenite::Error>>
            + Sink<WsMessage, Error = tungstenite::Error>
            + Send
            + 'static,
    {
        let subscriptions = Arc::new(SubscriptionRegistry::new());
        let subs = subscriptions.clone();
        let interceptor: Arc<RequestInterceptor> =
            Arc::new(move |req: &RequestMessage, _info: &ConnectionInfo| builtin_request(&subs, req));

        let converter = converter_for(info.protocol);
        let options = ConnectionOptions {
            request_timeout,
            stamp_sender: true,
            interceptor: Some(interceptor),
        };
        let conn = Connection::spawn(ws, info, converter, handlers, options, parent);
        Arc::new(Self {
            conn,
            subscriptions,
        })
    }

    pub fn connection(&self) -> &Connection {
        &self.conn
    }

    pub fn info(&self) -> &ConnectionInfo {
        self.conn.info()
    }

    pub fn client_id(&self) -> &str {
        self.conn.client_id()
    }

    pub fn connection_id(&self) -> &str {
        self.conn.connection_id()
    }

    pub fn is_connected(&self) -> bool {
        self.conn.is_connected()
    }

    pub fn subscriptions(&self) -> &SubscriptionRegistry {
        &self.subscriptions
    }

    pub fn disconnect(&self) {
        self.conn.disconnect();
    }

    pub async fn closed(&self) {
        self.conn.closed().await;
    }

    pub async fn send_request(&self, req: RequestMessage) -> Result<ResponseMessage, TransportError> {
        self.conn.send_request(req).await
    }

    /// Returns `true` if this session asked for the notification.
    ///
    /// TD updates go to anyone subscribed to any event of the Thing.
    pub fn is_interested(&self, notif: &NotificationMessage) -> bool {
        match notif.operation {
            Operation::PublishEvent => self
                .subscriptions
                .matches_event(&notif.thing_id, &notif.name),
            Operation::UpdateProperty | Operation::UpdateMultipleProperties => self
                .subscriptions
                .matches_property(&notif.thing_id, &notif.name),
            Operation::UpdateTD => self.subscriptions.events.has_thing(&notif.thing_id),
            _ => false,
        }
    }

    /// Queues the notification if this session subscribed to it.
    ///
    /// Returns `true` when it was queued.
    pub fn send_if_interested(&self, notif: &NotificationMessage) -> bool {
        if !self.is_interested(notif) {
            return false;
        }
        match self.conn.try_send_notification(notif) {
            Ok(()) => true,
            Err(e) => {
                debug!(cid = %self.connection_id(), "notification not delivered: {e}");
                false
            }
        }
    }
}

/// Requests handled by the server connection itself.
fn builtin_request(subs: &SubscriptionRegistry, req: &RequestMessage) -> Option<ResponseMessage> {
    let (thing, name) = (req.thing_id.as_str(), req.name.as_str());
    match req.operation {
        Operation::Ping => return Some(req.create_response(Value::String("pong".into()), None)),
        Operation::SubscribeEvent => subs.subscribe_event(thing, name),
        Operation::SubscribeAllEvents => subs.events.subscribe_all(thing),
        Operation::UnsubscribeEvent => subs.unsubscribe_event(thing, name),
        Operation::UnsubscribeAllEvents => subs.events.unsubscribe_all(thing),
        Operation::ObserveProperty => subs.observe_property(thing, name),
        Operation::ObserveAllProperties => subs.properties.subscribe_all(thing),
        Operation::UnobserveProperty => subs.unobserve_property(thing, name),
        Operation::UnobserveAllProperties => subs.properties.unsubscribe_all(thing),
        _ => return None,
    }
    debug!(op = %req.operation, thing = %thing, name = %name, "subscription updated");
    Some(req.create_response(Value::Null, None))
}
