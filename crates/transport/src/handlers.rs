//! Swappable application callbacks.
//!
//! Each handler lives in a [`HandlerSlot`]. Dispatch clones the current
//! `Arc` out of the slot and releases the lock before calling it, so a
//! replacement racing with delivery is observed either fully or not at all.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use parking_lot::RwLock;
use thinghub_protocol::{NotificationMessage, RequestMessage, ResponseMessage};

use crate::TransportError;
use crate::types::ConnectionInfo;

/// A boxed future returned by async handlers.
pub type HandlerFuture<T> = Pin<Box<dyn Future<Output = T> + Send>>;

/// Answers an inbound request.
pub type RequestHandler =
    dyn Fn(RequestMessage, ConnectionInfo) -> HandlerFuture<ResponseMessage> + Send + Sync;

/// Receives responses that matched no pending call.
pub type ResponseHandler = dyn Fn(ResponseMessage, ConnectionInfo) -> HandlerFuture<()> + Send + Sync;

/// Receives notifications.
pub type NotificationHandler =
    dyn Fn(NotificationMessage, ConnectionInfo) -> HandlerFuture<()> + Send + Sync;

/// Called on every connected/disconnected edge with the triggering error.
pub type ConnectHandler = dyn Fn(bool, Option<&TransportError>, &ConnectionInfo) + Send + Sync;

/// Atomically replaceable optional handler.
pub struct HandlerSlot<T: ?Sized> {
    current: RwLock<Option<Arc<T>>>,
}

impl<T: ?Sized> HandlerSlot<T> {
    pub fn new() -> Self {
        Self {
            current: RwLock::new(None),
        }
    }

    /// Replaces the handler. `None` removes it.
    pub fn set(&self, handler: Option<Arc<T>>) {
        *self.current.write() = handler;
    }

    /// Returns the handler to use for one dispatch.
    pub fn get(&self) -> Option<Arc<T>> {
        self.current.read().clone()
    }
}

impl<T: ?Sized> Default for HandlerSlot<T> {
    fn default() -> Self {
        Self::new()
    }
}

/// The four handler slots of a connection.
///
/// Shared by `Arc` so a client can keep its handlers across reconnects.
#[derive(Default)]
pub struct Handlers {
    pub(crate) request: HandlerSlot<RequestHandler>,
    pub(crate) response: HandlerSlot<ResponseHandler>,
    pub(crate) notification: HandlerSlot<NotificationHandler>,
    pub(crate) connect: HandlerSlot<ConnectHandler>,
}

impl Handlers {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn set_request_handler<F, Fut>(&self, f: F)
    where
        F: Fn(RequestMessage, ConnectionInfo) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ResponseMessage> + Send + 'static,
    {
        let handler: Arc<RequestHandler> =
            Arc::new(move |req, info| -> HandlerFuture<ResponseMessage> { Box::pin(f(req, info)) });
        self.request.set(Some(handler));
    }

    pub fn set_response_handler<F, Fut>(&self, f: F)
    where
        F: Fn(ResponseMessage, ConnectionInfo) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let handler: Arc<ResponseHandler> =
            Arc::new(move |resp, info| -> HandlerFuture<()> { Box::pin(f(resp, info)) });
        self.response.set(Some(handler));
    }

    pub fn set_notification_handler<F, Fut>(&self, f: F)
    where
        F: Fn(NotificationMessage, ConnectionInfo) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let handler: Arc<NotificationHandler> =
            Arc::new(move |notif, info| -> HandlerFuture<()> { Box::pin(f(notif, info)) });
        self.notification.set(Some(handler));
    }

    pub fn set_connect_handler<F>(&self, f: F)
    where
        F: Fn(bool, Option<&TransportError>, &ConnectionInfo) + Send + Sync + 'static,
    {
        let handler: Arc<ConnectHandler> = Arc::new(f);
        self.connect.set(Some(handler));
    }

    /// Removes all handlers.
    pub fn clear(&self) {
        self.request.set(None);
        self.response.set(None);
        self.notification.set(None);
        self.connect.set(None);
    }

    pub(crate) fn fire_connect(
        &self,
        connected: bool,
        err: Option<&TransportError>,
        info: &ConnectionInfo,
    ) {
        if let Some(cb) = self.connect.get() {
            cb(connected, err, info);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use thinghub_protocol::{Operation, ProtocolType};

    fn info() -> ConnectionInfo {
        ConnectionInfo {
            client_id: "c".into(),
            connection_id: "1".into(),
            protocol: ProtocolType::Passthrough,
            remote_addr: String::new(),
        }
    }

    #[test]
    fn slot_starts_empty_and_replaces() {
        let slot: HandlerSlot<dyn Fn() -> u8 + Send + Sync> = HandlerSlot::new();
        assert!(slot.get().is_none());

        slot.set(Some(Arc::new(|| 1)));
        let old = slot.get().unwrap();
        slot.set(Some(Arc::new(|| 2)));

        // A handler already taken keeps working after replacement.
        assert_eq!(old(), 1);
        assert_eq!(slot.get().unwrap()(), 2);

        slot.set(None);
        assert!(slot.get().is_none());
    }

    #[tokio::test]
    async fn request_handler_is_called_with_info() {
        let handlers = Handlers::new();
        handlers.set_request_handler(|req: RequestMessage, info: ConnectionInfo| async move {
            req.create_response(serde_json::json!(info.client_id), None)
        });

        let h = handlers.request.get().unwrap();
        let req = RequestMessage::new(Operation::ReadTD, "t", "", serde_json::Value::Null);
        let resp = h(req, info()).await;
        assert_eq!(resp.output, "c");
    }

    #[test]
    fn connect_handler_fires_with_state() {
        let handlers = Handlers::new();
        let calls = Arc::new(AtomicUsize::new(0));
        let c = calls.clone();
        handlers.set_connect_handler(move |connected, err, _info| {
            assert!(!connected);
            assert!(matches!(err, Some(TransportError::Closed)));
            c.fetch_add(1, Ordering::SeqCst);
        });

        handlers.fire_connect(false, Some(&TransportError::Closed), &info());
        assert_eq!(calls.load(Ordering::SeqCst), 1);

        handlers.clear();
        handlers.fire_connect(false, None, &info());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
