//! One duplex WebSocket session shared by client and server sides.
//!
//! A [`Connection`] owns a read task and a write task. The read task decodes
//! frames with the session's converter and dispatches each message on its
//! own task; the write task is the only writer of the socket. Outbound
//! requests are correlated with their responses through [`PendingCalls`].

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use futures_util::{Sink, Stream, StreamExt};
use parking_lot::Mutex;
use serde_json::Value;
use thinghub_protocol::constants::{DEFAULT_REQUEST_TIMEOUT, SEND_BUFFER_SIZE};
use thinghub_protocol::messages::new_message_id;
use thinghub_protocol::{
    Message, MessageConverter, NotificationMessage, RequestMessage, ResponseMessage,
};
use tokio::sync::mpsc;
use tokio::time::Instant;
use tokio_tungstenite::tungstenite::{self, Message as WsMessage};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::correlation::PendingCalls;
use crate::handlers::Handlers;
use crate::pumps::{read_pump, write_pump};
use crate::types::ConnectionInfo;
use crate::TransportError;

/// Answers a request inline, before the application handler sees it.
///
/// Returning `None` passes the request on.
pub type RequestInterceptor =
    dyn Fn(&RequestMessage, &ConnectionInfo) -> Option<ResponseMessage> + Send + Sync;

/// Per-connection behaviour.
#[derive(Clone)]
pub struct ConnectionOptions {
    /// Default wait for [`Connection::send_request`].
    pub request_timeout: Duration,
    /// Overwrite `sender_id` of inbound messages with the authenticated
    /// client ID. Servers enable this.
    pub stamp_sender: bool,
    pub interceptor: Option<Arc<RequestInterceptor>>,
}

impl Default for ConnectionOptions {
    fn default() -> Self {
        Self {
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
            stamp_sender: false,
            interceptor: None,
        }
    }
}

impl fmt::Debug for ConnectionOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionOptions")
            .field("request_timeout", &self.request_timeout)
            .field("stamp_sender", &self.stamp_sender)
            .field("interceptor", &self.interceptor.is_some())
            .finish()
    }
}

struct Inner {
    info: ConnectionInfo,
    converter: Arc<dyn MessageConverter>,
    write_tx: mpsc::Sender<WsMessage>,
    pending: PendingCalls,
    handlers: Arc<Handlers>,
    options: ConnectionOptions,
    connected: AtomicBool,
    last_error: Mutex<Option<String>>,
    /// Stops both pumps.
    cancel: CancellationToken,
    /// Fired once the read task has finished cleaning up.
    closed: CancellationToken,
}

/// Handle to a running session. Cheap to clone.
#[derive(Clone)]
pub struct Connection {
    inner: Arc<Inner>,
}

impl Connection {
    /// Starts the pumps for an established WebSocket.
    ///
    /// The connect handler fires with `true` before any message is
    /// dispatched. Cancelling `parent` closes the connection.
    pub fn spawn<S>(
        ws: S,
        info: ConnectionInfo,
        converter: Arc<dyn MessageConverter>,
        handlers: Arc<Handlers>,
        options: ConnectionOptions,
        parent: &CancellationToken,
    ) -> Self
    where
        S: Stream<Item = Result<WsMessage, tungstenite::Error>>
            + Sink<WsMessage, Error = tungstenite::Error>
            + Send
            + 'static,
    {
        let (write_tx, write_rx) = mpsc::channel(SEND_BUFFER_SIZE);
        let cancel = parent.child_token();

        let conn = Self {
            inner: Arc::new(Inner {
                info,
                converter,
                write_tx,
                pending: PendingCalls::new(),
                handlers,
                options,
                connected: AtomicBool::new(true),
                last_error: Mutex::new(None),
                cancel: cancel.clone(),
                closed: CancellationToken::new(),
            }),
        };

        info!(
            client = %conn.inner.info.client_id,
            cid = %conn.inner.info.connection_id,
            protocol = %conn.inner.info.protocol,
            "connection established"
        );
        conn.inner
            .handlers
            .fire_connect(true, None, &conn.inner.info);

        let (sink, stream) = ws.split();
        tokio::spawn(write_pump(sink, write_rx, cancel.clone()));

        let reader = conn.clone();
        tokio::spawn(async move {
            let dispatcher = reader.clone();
            let err = read_pump(
                stream,
                reader.inner.converter.as_ref(),
                reader.inner.write_tx.clone(),
                cancel,
                move |msg| dispatcher.dispatch(msg),
            )
            .await;
            reader.finish(err);
        });

        conn
    }

    pub fn info(&self) -> &ConnectionInfo {
        &self.inner.info
    }

    pub fn client_id(&self) -> &str {
        &self.inner.info.client_id
    }

    pub fn connection_id(&self) -> &str {
        &self.inner.info.connection_id
    }

    pub fn handlers(&self) -> &Arc<Handlers> {
        &self.inner.handlers
    }

    pub fn is_connected(&self) -> bool {
        self.inner.connected.load(Ordering::SeqCst)
    }

    /// The error that ended the session, if it ended with one.
    pub fn last_error(&self) -> Option<String> {
        self.inner.last_error.lock().clone()
    }

    /// True when both handles refer to the same session.
    pub fn same_session(&self, other: &Connection) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    /// Number of requests awaiting a response.
    pub fn pending_requests(&self) -> usize {
        self.inner.pending.len()
    }

    /// Resolves once the read task has exited and all cleanup ran.
    pub async fn closed(&self) {
        self.inner.closed.cancelled().await;
    }

    /// Closes the session. Idempotent.
    ///
    /// Pending requests fail with [`TransportError::Closed`] and the
    /// connect handler fires once with `(false, None)`.
    pub fn disconnect(&self) {
        let was_connected = self.inner.connected.swap(false, Ordering::SeqCst);
        self.inner.cancel.cancel();
        let failed = self.inner.pending.close_all();
        if was_connected {
            debug!(cid = %self.inner.info.connection_id, failed, "disconnecting");
            self.inner
                .handlers
                .fire_connect(false, None, &self.inner.info);
        }
    }

    /// Sends a request and waits for its response with the default timeout.
    ///
    /// A correlation ID is assigned when the request has none.
    pub async fn send_request(&self, req: RequestMessage) -> Result<ResponseMessage, TransportError> {
        self.send_request_timeout(req, self.inner.options.request_timeout)
            .await
    }

    /// Like [`send_request`](Self::send_request). `timeout` bounds both
    /// queueing the frame and waiting for the reply.
    pub async fn send_request_timeout(
        &self,
        mut req: RequestMessage,
        timeout: Duration,
    ) -> Result<ResponseMessage, TransportError> {
        let deadline = Instant::now() + timeout;
        if req.correlation_id.is_empty() {
            req.correlation_id = new_message_id();
        }
        let slot = self.inner.pending.open(&req.correlation_id);
        let text = self.inner.converter.encode_request(&req)?;
        tokio::time::timeout_at(deadline, self.send_text(text))
            .await
            .map_err(|_| {
                warn!(cid = %self.inner.info.connection_id, correlation = %req.correlation_id, "send buffer stalled, request timed out");
                TransportError::Timeout
            })??;
        debug!(op = %req.operation, thing = %req.thing_id, correlation = %req.correlation_id, "request sent");
        slot.wait_until(deadline).await
    }

    pub async fn send_response(&self, resp: &ResponseMessage) -> Result<(), TransportError> {
        let text = self.inner.converter.encode_response(resp)?;
        self.send_text(text).await
    }

    pub async fn send_notification(&self, notif: &NotificationMessage) -> Result<(), TransportError> {
        let text = self.inner.converter.encode_notification(notif)?;
        self.send_text(text).await
    }

    /// Queues a notification without waiting for buffer space.
    pub fn try_send_notification(&self, notif: &NotificationMessage) -> Result<(), TransportError> {
        if !self.is_connected() {
            return Err(TransportError::NotConnected);
        }
        let text = self.inner.converter.encode_notification(notif)?;
        self.inner
            .write_tx
            .try_send(WsMessage::Text(text.into()))
            .map_err(|e| match e {
                mpsc::error::TrySendError::Full(_) => {
                    warn!(cid = %self.inner.info.connection_id, "send buffer full, dropping notification");
                    TransportError::BufferFull
                }
                mpsc::error::TrySendError::Closed(_) => TransportError::Closed,
            })
    }

    async fn send_text(&self, text: String) -> Result<(), TransportError> {
        if !self.is_connected() {
            return Err(TransportError::NotConnected);
        }
        self.inner
            .write_tx
            .send(WsMessage::Text(text.into()))
            .await
            .map_err(|_| TransportError::Closed)
    }

    fn finish(&self, err: Option<TransportError>) {
        if let Some(e) = &err {
            *self.inner.last_error.lock() = Some(e.to_string());
        }
        let was_connected = self.inner.connected.swap(false, Ordering::SeqCst);
        self.inner.cancel.cancel();
        self.inner.pending.close_all();
        if was_connected {
            match &err {
                Some(e) => info!(cid = %self.inner.info.connection_id, "connection lost: {e}"),
                None => info!(cid = %self.inner.info.connection_id, "connection closed"),
            }
            self.inner
                .handlers
                .fire_connect(false, err.as_ref(), &self.inner.info);
        }
        self.inner.closed.cancel();
    }

    fn dispatch(&self, msg: Message) {
        let conn = self.clone();
        tokio::spawn(async move {
            match msg {
                Message::Request(req) => conn.handle_request(req).await,
                Message::Response(resp) => conn.handle_response(resp).await,
                Message::Notification(notif) => conn.handle_notification(notif).await,
            }
        });
    }

    async fn handle_request(&self, mut req: RequestMessage) {
        let info = &self.inner.info;
        if self.inner.options.stamp_sender {
            req.sender_id = info.client_id.clone();
        }
        let correlation_id = req.correlation_id.clone();

        let intercepted = self
            .inner
            .options
            .interceptor
            .as_ref()
            .and_then(|intercept| intercept(&req, info));
        let mut resp = match intercepted {
            Some(resp) => resp,
            None => match self.inner.handlers.request.get() {
                Some(handler) => handler(req, info.clone()).await,
                None => {
                    warn!(op = %req.operation, "no request handler");
                    req.create_response(Value::Null, Some("no request handler".into()))
                }
            },
        };

        // Uncorrelated requests are fire-and-forget.
        if correlation_id.is_empty() {
            return;
        }
        resp.correlation_id = correlation_id;
        if let Err(e) = self.send_response(&resp).await {
            debug!(cid = %info.connection_id, "response not sent: {e}");
        }
    }

    async fn handle_response(&self, mut resp: ResponseMessage) {
        if self.inner.options.stamp_sender {
            resp.sender_id = self.inner.info.client_id.clone();
        }
        let Err(resp) = self.inner.pending.try_deliver(resp) else {
            return;
        };
        match self.inner.handlers.response.get() {
            Some(handler) => handler(resp, self.inner.info.clone()).await,
            None => debug!(correlation = %resp.correlation_id, "dropping unmatched response"),
        }
    }

    async fn handle_notification(&self, mut notif: NotificationMessage) {
        if self.inner.options.stamp_sender {
            notif.sender_id = self.inner.info.client_id.clone();
        }
        match self.inner.handlers.notification.get() {
            Some(handler) => handler(notif, self.inner.info.clone()).await,
            None => debug!(op = %notif.operation, "dropping notification, no handler"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures_util::SinkExt;
    use std::sync::atomic::AtomicUsize;
    use thinghub_protocol::{Operation, PassthroughConverter, ProtocolType, Status, WotConverter};
    use tokio::io::DuplexStream;
    use tokio_tungstenite::WebSocketStream;
    use tokio_tungstenite::tungstenite::protocol::Role;

    async fn ws_pair() -> (WebSocketStream<DuplexStream>, WebSocketStream<DuplexStream>) {
        let (a, b) = tokio::io::duplex(64 * 1024);
        let server = WebSocketStream::from_raw_socket(a, Role::Server, None).await;
        let client = WebSocketStream::from_raw_socket(b, Role::Client, None).await;
        (server, client)
    }

    fn info(client_id: &str, protocol: ProtocolType) -> ConnectionInfo {
        ConnectionInfo {
            client_id: client_id.into(),
            connection_id: "c1".into(),
            protocol,
            remote_addr: "memory".into(),
        }
    }

    struct Pair {
        server: Connection,
        client: Connection,
        server_handlers: Arc<Handlers>,
        client_handlers: Arc<Handlers>,
    }

    async fn pair_with(protocol: ProtocolType, client_options: ConnectionOptions) -> Pair {
        let (server_ws, client_ws) = ws_pair().await;
        let converter: Arc<dyn MessageConverter> = match protocol {
            ProtocolType::Passthrough => Arc::new(PassthroughConverter::new()),
            ProtocolType::WotWebSocket => Arc::new(WotConverter::new()),
        };
        let server_handlers = Handlers::new();
        let client_handlers = Handlers::new();
        let root = CancellationToken::new();
        let server = Connection::spawn(
            server_ws,
            info("consumer-1", protocol),
            converter.clone(),
            server_handlers.clone(),
            ConnectionOptions {
                stamp_sender: true,
                ..Default::default()
            },
            &root,
        );
        let client = Connection::spawn(
            client_ws,
            info("hub", protocol),
            converter,
            client_handlers.clone(),
            client_options,
            &root,
        );
        Pair {
            server,
            client,
            server_handlers,
            client_handlers,
        }
    }

    async fn pair() -> Pair {
        pair_with(ProtocolType::Passthrough, ConnectionOptions::default()).await
    }

    fn read_temp() -> RequestMessage {
        RequestMessage::new(Operation::ReadProperty, "therm-1", "temperature", Value::Null)
    }

    #[tokio::test]
    async fn request_response_with_sender_stamping() {
        let p = pair().await;
        p.server_handlers.set_request_handler(|req: RequestMessage, _info| async move {
            req.create_response(Value::String(req.sender_id.clone()), None)
        });

        let mut req = read_temp();
        req.sender_id = "forged".into();
        let resp = p.client.send_request(req).await.unwrap();

        assert_eq!(resp.output, "consumer-1");
        assert_eq!(resp.status, Status::Completed);
        assert_eq!(p.client.pending_requests(), 0);
    }

    #[tokio::test]
    async fn wot_encoding_carries_requests_and_responses() {
        let p = pair_with(ProtocolType::WotWebSocket, ConnectionOptions::default()).await;
        p.server_handlers.set_request_handler(|req: RequestMessage, _info| async move {
            assert_eq!(req.operation, Operation::InvokeAction);
            req.create_response(serde_json::json!({"switched": req.input}), None)
        });

        let req = RequestMessage::new(Operation::InvokeAction, "light-1", "switch", true.into());
        let resp = p.client.send_request(req).await.unwrap();
        assert_eq!(resp.output, serde_json::json!({"switched": true}));
        assert_eq!(resp.operation, Operation::InvokeAction);
    }

    #[tokio::test]
    async fn missing_handler_yields_failed_response() {
        let p = pair().await;
        let resp = p.client.send_request(read_temp()).await.unwrap();
        assert_eq!(resp.status, Status::Failed);
        assert_eq!(resp.error, "no request handler");
    }

    #[tokio::test]
    async fn interceptor_answers_before_handler() {
        let (server_ws, client_ws) = ws_pair().await;
        let root = CancellationToken::new();
        let converter: Arc<dyn MessageConverter> = Arc::new(PassthroughConverter::new());
        let interceptor: Arc<RequestInterceptor> = Arc::new(|req: &RequestMessage, _info: &ConnectionInfo| {
            (req.operation == Operation::Ping).then(|| req.create_response("pong".into(), None))
        });
        let handlers = Handlers::new();
        handlers.set_request_handler(|req: RequestMessage, _info| async move {
            req.create_response("handler".into(), None)
        });
        let _server = Connection::spawn(
            server_ws,
            info("consumer-1", ProtocolType::Passthrough),
            converter.clone(),
            handlers,
            ConnectionOptions {
                interceptor: Some(interceptor),
                ..Default::default()
            },
            &root,
        );
        let client = Connection::spawn(
            client_ws,
            info("hub", ProtocolType::Passthrough),
            converter,
            Handlers::new(),
            ConnectionOptions::default(),
            &root,
        );

        let ping = RequestMessage::new(Operation::Ping, "", "", Value::Null);
        assert_eq!(client.send_request(ping).await.unwrap().output, "pong");
        assert_eq!(client.send_request(read_temp()).await.unwrap().output, "handler");
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn handler_swap_during_concurrent_dispatch() {
        let p = pair().await;
        let v1_calls = Arc::new(AtomicUsize::new(0));
        let v2_calls = Arc::new(AtomicUsize::new(0));
        let release = Arc::new(tokio::sync::Notify::new());

        let (count, gate) = (v1_calls.clone(), release.clone());
        p.server_handlers.set_request_handler(move |req: RequestMessage, _info| {
            let (count, gate) = (count.clone(), gate.clone());
            async move {
                let notified = gate.notified();
                count.fetch_add(1, Ordering::SeqCst);
                notified.await;
                req.create_response("v1".into(), None)
            }
        });

        let spawn_calls = |n: usize| -> Vec<_> {
            (0..n)
                .map(|_| {
                    let client = p.client.clone();
                    tokio::spawn(async move { client.send_request(read_temp()).await })
                })
                .collect()
        };

        let mut calls = spawn_calls(50);
        tokio::time::timeout(Duration::from_secs(2), async {
            while v1_calls.load(Ordering::SeqCst) < 50 {
                tokio::task::yield_now().await;
            }
        })
        .await
        .expect("first batch reaches the v1 handler");

        // v1 calls are still in flight while the handler is replaced.
        let count = v2_calls.clone();
        p.server_handlers.set_request_handler(move |req: RequestMessage, _info| {
            let count = count.clone();
            async move {
                count.fetch_add(1, Ordering::SeqCst);
                req.create_response("v2".into(), None)
            }
        });
        calls.extend(spawn_calls(50));
        release.notify_waiters();

        let mut outputs = (0, 0);
        for call in calls {
            let resp = call.await.unwrap().unwrap();
            match resp.output.as_str() {
                Some("v1") => outputs.0 += 1,
                Some("v2") => outputs.1 += 1,
                _ => panic!("got {:?}", resp.output),
            }
        }

        let (v1, v2) = (v1_calls.load(Ordering::SeqCst), v2_calls.load(Ordering::SeqCst));
        assert_eq!(v1 + v2, 100);
        assert!(v1 > 0 && v2 > 0, "v1={v1} v2={v2}");
        assert_eq!(outputs, (v1, v2));
    }

    #[tokio::test]
    async fn disconnect_fails_pending_and_is_idempotent() {
        let p = pair().await;
        p.server_handlers
            .set_request_handler(|_req: RequestMessage, _info| std::future::pending());

        let events = Arc::new(Mutex::new(Vec::new()));
        let ev = events.clone();
        p.client_handlers.set_connect_handler(move |connected, err, _info| {
            ev.lock().push((connected, err.map(|e| e.to_string())));
        });

        let calls: Vec<_> = (0..3)
            .map(|_| {
                let client = p.client.clone();
                tokio::spawn(async move { client.send_request(read_temp()).await })
            })
            .collect();
        while p.client.pending_requests() < 3 {
            tokio::task::yield_now().await;
        }

        p.client.disconnect();
        p.client.disconnect();

        for call in calls {
            let result = tokio::time::timeout(Duration::from_secs(1), call)
                .await
                .expect("pending call must fail promptly")
                .unwrap();
            assert!(matches!(result, Err(TransportError::Closed)));
        }
        tokio::time::timeout(Duration::from_secs(1), p.client.closed())
            .await
            .unwrap();

        assert!(!p.client.is_connected());
        assert_eq!(*events.lock(), vec![(false, None)]);
        assert!(matches!(
            p.client.send_request(read_temp()).await,
            Err(TransportError::NotConnected)
        ));
    }

    #[tokio::test]
    async fn peer_close_reports_error_once() {
        let p = pair().await;
        let events = Arc::new(Mutex::new(Vec::new()));
        let ev = events.clone();
        p.client_handlers.set_connect_handler(move |connected, err, _info| {
            ev.lock().push((connected, err.map(|e| e.to_string())));
        });

        p.server.disconnect();
        tokio::time::timeout(Duration::from_secs(2), p.client.closed())
            .await
            .expect("client notices the peer close");

        assert_eq!(
            *events.lock(),
            vec![(false, Some("connection closed".to_string()))]
        );
        assert_eq!(p.client.last_error().as_deref(), Some("connection closed"));
    }

    #[tokio::test]
    async fn notifications_reach_the_handler() {
        let p = pair().await;
        let (tx, mut rx) = mpsc::channel(4);
        p.server_handlers
            .set_notification_handler(move |notif: NotificationMessage, _info| {
                let tx = tx.clone();
                async move {
                    let _ = tx.send(notif).await;
                }
            });

        let notif = NotificationMessage::new(Operation::PublishEvent, "therm-1", "alarm", true.into());
        p.client.send_notification(&notif).await.unwrap();
        p.client.try_send_notification(&notif).unwrap();

        for _ in 0..2 {
            let got = rx.recv().await.unwrap();
            assert_eq!(got.name, "alarm");
            assert_eq!(got.sender_id, "consumer-1");
        }
    }

    #[tokio::test]
    async fn unmatched_response_goes_to_response_handler() {
        let p = pair().await;
        let (tx, mut rx) = mpsc::channel(1);
        p.client_handlers
            .set_response_handler(move |resp: ResponseMessage, _info| {
                let tx = tx.clone();
                async move {
                    let _ = tx.send(resp).await;
                }
            });

        let stray = read_temp()
            .with_correlation_id("nobody-waits")
            .create_response(1.into(), None);
        p.server.send_response(&stray).await.unwrap();

        let got = rx.recv().await.unwrap();
        assert_eq!(got.correlation_id, "nobody-waits");
    }

    #[tokio::test]
    async fn garbage_frame_is_dropped_and_connection_survives() {
        let (server_ws, mut raw) = ws_pair().await;
        let handlers = Handlers::new();
        handlers.set_request_handler(|req: RequestMessage, _info| async move {
            req.create_response(21.into(), None)
        });
        let converter = PassthroughConverter::new();
        let server = Connection::spawn(
            server_ws,
            info("consumer-1", ProtocolType::Passthrough),
            Arc::new(converter),
            handlers,
            ConnectionOptions::default(),
            &CancellationToken::new(),
        );

        raw.send(WsMessage::Text("garbage".into())).await.unwrap();
        let req = read_temp().with_correlation_id("r1");
        raw.send(WsMessage::Text(converter.encode_request(&req).unwrap().into()))
            .await
            .unwrap();

        loop {
            match raw.next().await.unwrap().unwrap() {
                WsMessage::Text(text) => {
                    let Message::Response(resp) = converter.decode(text.as_bytes()).unwrap() else {
                        panic!("expected a response");
                    };
                    assert_eq!(resp.correlation_id, "r1");
                    assert_eq!(resp.output, 21);
                    break;
                }
                WsMessage::Ping(_) | WsMessage::Pong(_) => continue,
                other => panic!("unexpected frame {other:?}"),
            }
        }
        assert!(server.is_connected());
    }

    #[tokio::test]
    async fn request_times_out_without_response() {
        let p = pair_with(
            ProtocolType::Passthrough,
            ConnectionOptions {
                request_timeout: Duration::from_millis(100),
                ..Default::default()
            },
        )
        .await;
        p.server_handlers
            .set_request_handler(|_req: RequestMessage, _info| std::future::pending());

        let result = p.client.send_request(read_temp()).await;
        assert!(matches!(result, Err(TransportError::Timeout)));
        assert_eq!(p.client.pending_requests(), 0);
        assert!(p.client.is_connected());
    }

    #[tokio::test]
    async fn request_times_out_when_peer_never_reads() {
        // The peer end is kept open but never polled, so the socket backs up.
        let (_stalled_peer, client_ws) = ws_pair().await;
        let conn = Connection::spawn(
            client_ws,
            info("hub", ProtocolType::Passthrough),
            Arc::new(PassthroughConverter::new()),
            Handlers::new(),
            ConnectionOptions::default(),
            &CancellationToken::new(),
        );

        let bulk = NotificationMessage::new(
            Operation::PublishEvent,
            "therm-1",
            "dump",
            Value::String("x".repeat(256 * 1024)),
        );
        conn.try_send_notification(&bulk).unwrap();
        let small = NotificationMessage::new(Operation::PublishEvent, "therm-1", "tick", 1.into());
        loop {
            match conn.try_send_notification(&small) {
                Ok(()) => {}
                Err(TransportError::BufferFull) => break,
                Err(e) => panic!("unexpected error {e}"),
            }
        }

        let result = tokio::time::timeout(
            Duration::from_secs(2),
            conn.send_request_timeout(read_temp(), Duration::from_millis(100)),
        )
        .await
        .expect("deadline covers queueing the request");
        assert!(matches!(result, Err(TransportError::Timeout)));
        assert_eq!(conn.pending_requests(), 0);
    }

    #[tokio::test]
    async fn parent_cancel_closes_connection() {
        let (server_ws, _client_ws) = ws_pair().await;
        let root = CancellationToken::new();
        let calls = Arc::new(AtomicUsize::new(0));
        let handlers = Handlers::new();
        let c = calls.clone();
        handlers.set_connect_handler(move |_connected, _err, _info| {
            c.fetch_add(1, Ordering::SeqCst);
        });
        let conn = Connection::spawn(
            server_ws,
            info("consumer-1", ProtocolType::Passthrough),
            Arc::new(PassthroughConverter::new()),
            handlers,
            ConnectionOptions::default(),
            &root,
        );

        root.cancel();
        tokio::time::timeout(Duration::from_secs(1), conn.closed())
            .await
            .unwrap();
        assert!(!conn.is_connected());
        assert_eq!(calls.load(Ordering::SeqCst), 2, "connected then disconnected");
        assert!(conn.last_error().is_none());
    }
}
