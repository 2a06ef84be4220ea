//! Client side of a hub session.
//!
//! A [`ClientConnection`] outlives individual WebSocket sessions: handlers,
//! the connection ID and the last token are kept across reconnects while
//! each successful handshake spawns a fresh transport [`Connection`].

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use parking_lot::Mutex;
use thinghub_protocol::constants::{CONNECTION_ID_HEADER, WS_MAX_MESSAGE_SIZE};
use thinghub_protocol::{
    NotificationMessage, ProtocolType, RequestMessage, ResponseMessage, converter_for,
};
use thinghub_transport::{
    Connection, ConnectionInfo, ConnectionOptions, ConnectionState, Handlers, TransportError,
};
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::HeaderValue;
use tokio_tungstenite::tungstenite::http::header::AUTHORIZATION;
use tokio_tungstenite::tungstenite::protocol::WebSocketConfig;
use tokio_tungstenite::tungstenite::{self, http::StatusCode};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::ClientError;
use crate::auth::AuthClient;
use crate::config::ClientConfig;
use crate::reconnection::reconnect_loop;

struct Inner {
    config: ClientConfig,
    connection_id: String,
    auth: AuthClient,
    handlers: Arc<Handlers>,
    conn: Mutex<Option<Connection>>,
    state: Mutex<ConnectionState>,
    token: Mutex<Option<String>>,
    /// Set after a successful connect, cleared by [`ClientConnection::disconnect`].
    retry_on_disconnect: AtomicBool,
    /// Bumped on every new session so stale close watchers are ignored.
    generation: AtomicU64,
    reconnect_cancel: Mutex<CancellationToken>,
}

/// Authenticated connection to a hub. Cheap to clone.
#[derive(Clone)]
pub struct ClientConnection {
    inner: Arc<Inner>,
}

impl ClientConnection {
    pub fn new(config: ClientConfig) -> Self {
        let auth = AuthClient::new(&config);
        Self {
            inner: Arc::new(Inner {
                config,
                connection_id: uuid::Uuid::new_v4().to_string(),
                auth,
                handlers: Handlers::new(),
                conn: Mutex::new(None),
                state: Mutex::new(ConnectionState::Disconnected),
                token: Mutex::new(None),
                retry_on_disconnect: AtomicBool::new(false),
                generation: AtomicU64::new(0),
                reconnect_cancel: Mutex::new(CancellationToken::new()),
            }),
        }
    }

    pub fn config(&self) -> &ClientConfig {
        &self.inner.config
    }

    pub fn client_id(&self) -> &str {
        &self.inner.config.client_id
    }

    /// Sent in the upgrade request; stable for the lifetime of this client.
    pub fn connection_id(&self) -> &str {
        &self.inner.connection_id
    }

    pub fn protocol_type(&self) -> ProtocolType {
        self.inner.config.protocol
    }

    pub fn server_url(&self) -> &str {
        &self.inner.config.server_url
    }

    pub fn state(&self) -> ConnectionState {
        *self.inner.state.lock()
    }

    pub fn is_connected(&self) -> bool {
        self.inner
            .conn
            .lock()
            .as_ref()
            .is_some_and(Connection::is_connected)
    }

    /// The most recently used bearer token.
    pub fn token(&self) -> Option<String> {
        self.inner.token.lock().clone()
    }

    /// The error that ended the last session, if any.
    pub fn last_error(&self) -> Option<String> {
        self.inner.conn.lock().as_ref().and_then(Connection::last_error)
    }

    pub fn handlers(&self) -> &Arc<Handlers> {
        &self.inner.handlers
    }

    /// Logs in with a password and connects. Returns the issued token.
    pub async fn connect_with_password(&self, password: &str) -> Result<String, ClientError> {
        let token = self.inner.auth.login(self.client_id(), password).await?;
        self.connect_with_token(&token).await?;
        Ok(token)
    }

    /// Opens a session with an existing token, replacing any current one.
    pub async fn connect_with_token(&self, token: &str) -> Result<(), ClientError> {
        self.cancel_reconnect();
        self.drop_connection();
        self.establish(token).await?;
        self.inner.retry_on_disconnect.store(true, Ordering::SeqCst);
        Ok(())
    }

    /// Closes the session and disables auto-reconnect. Idempotent.
    pub fn disconnect(&self) {
        self.inner.retry_on_disconnect.store(false, Ordering::SeqCst);
        self.cancel_reconnect();
        self.drop_connection();
    }

    /// Exchanges the current token for a new one. The session stays open.
    pub async fn refresh_token(&self) -> Result<String, ClientError> {
        let old = self.token().ok_or(ClientError::InvalidToken)?;
        let new = self.inner.auth.refresh(&old).await?;
        *self.inner.token.lock() = Some(new.clone());
        Ok(new)
    }

    /// Revokes the token on the hub and disconnects.
    pub async fn logout(&self) -> Result<(), ClientError> {
        self.disconnect();
        let token = self.inner.token.lock().take();
        match token {
            Some(token) => self.inner.auth.logout(&token).await,
            None => Ok(()),
        }
    }

    pub fn set_request_handler<F, Fut>(&self, f: F)
    where
        F: Fn(RequestMessage, ConnectionInfo) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ResponseMessage> + Send + 'static,
    {
        self.inner.handlers.set_request_handler(f);
    }

    pub fn set_response_handler<F, Fut>(&self, f: F)
    where
        F: Fn(ResponseMessage, ConnectionInfo) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        self.inner.handlers.set_response_handler(f);
    }

    pub fn set_notification_handler<F, Fut>(&self, f: F)
    where
        F: Fn(NotificationMessage, ConnectionInfo) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        self.inner.handlers.set_notification_handler(f);
    }

    pub fn set_connect_handler<F>(&self, f: F)
    where
        F: Fn(bool, Option<&TransportError>, &ConnectionInfo) + Send + Sync + 'static,
    {
        self.inner.handlers.set_connect_handler(f);
    }

    pub async fn send_request(&self, req: RequestMessage) -> Result<ResponseMessage, TransportError> {
        self.current()?.send_request(req).await
    }

    pub async fn send_response(&self, resp: &ResponseMessage) -> Result<(), TransportError> {
        self.current()?.send_response(resp).await
    }

    pub async fn send_notification(&self, notif: &NotificationMessage) -> Result<(), TransportError> {
        self.current()?.send_notification(notif).await
    }

    fn current(&self) -> Result<Connection, TransportError> {
        self.inner
            .conn
            .lock()
            .clone()
            .ok_or(TransportError::NotConnected)
    }

    pub(crate) fn retry_enabled(&self) -> bool {
        self.inner.retry_on_disconnect.load(Ordering::SeqCst)
    }

    fn cancel_reconnect(&self) {
        let mut cancel = self.inner.reconnect_cancel.lock();
        cancel.cancel();
        *cancel = CancellationToken::new();
    }

    pub(crate) fn drop_connection(&self) {
        let previous = {
            let mut current = self.inner.conn.lock();
            self.inner.generation.fetch_add(1, Ordering::SeqCst);
            current.take()
        };
        if let Some(conn) = previous {
            conn.disconnect();
        }
        *self.inner.state.lock() = ConnectionState::Disconnected;
    }

    /// Closes `conn`. The client forgets it only if it is still the current session.
    pub(crate) fn drop_session(&self, conn: &Connection) {
        let was_current = {
            let mut current = self.inner.conn.lock();
            let was_current = current.as_ref().is_some_and(|c| c.same_session(conn));
            if was_current {
                self.inner.generation.fetch_add(1, Ordering::SeqCst);
                current.take();
            }
            was_current
        };
        conn.disconnect();
        if was_current {
            *self.inner.state.lock() = ConnectionState::Disconnected;
        }
    }

    /// Dials the hub and starts a new session. Leaves the retry flag alone.
    ///
    /// Fails with [`ClientError::Superseded`] if another connect or a
    /// disconnect happened while the handshake was in flight; the session
    /// installed by that call is left untouched.
    pub(crate) async fn establish(&self, token: &str) -> Result<Connection, ClientError> {
        let expected = self.inner.generation.load(Ordering::SeqCst);
        {
            let mut state = self.inner.state.lock();
            if *state != ConnectionState::Connected {
                *state = ConnectionState::Connecting;
            }
        }
        let result = self.dial(token, expected).await;
        if result.is_err() && !self.is_connected() {
            *self.inner.state.lock() = ConnectionState::Disconnected;
        }
        result
    }

    async fn dial(&self, token: &str, expected: u64) -> Result<Connection, ClientError> {
        let cfg = &self.inner.config;
        let url = cfg.ws_url();
        let mut request = url.as_str().into_client_request().map_err(TransportError::from)?;
        let headers = request.headers_mut();
        headers.insert(
            AUTHORIZATION,
            HeaderValue::from_str(&format!("Bearer {token}"))
                .map_err(|_| ClientError::InvalidToken)?,
        );
        if let Ok(cid) = HeaderValue::from_str(&self.inner.connection_id) {
            headers.insert(CONNECTION_ID_HEADER, cid);
        }

        let mut ws_config = WebSocketConfig::default();
        ws_config.max_message_size = Some(WS_MAX_MESSAGE_SIZE);
        ws_config.max_frame_size = Some(WS_MAX_MESSAGE_SIZE);

        debug!(url = %url, client = %cfg.client_id, "connecting");
        let ws = match tokio_tungstenite::connect_async_with_config(request, Some(ws_config), false)
            .await
        {
            Ok((ws, _)) => ws,
            Err(tungstenite::Error::Http(resp)) if resp.status() == StatusCode::UNAUTHORIZED => {
                let reason = format!("hub rejected token for {}", cfg.client_id);
                return Err(TransportError::Unauthorized(reason).into());
            }
            Err(e) => return Err(TransportError::from(e).into()),
        };

        let info = ConnectionInfo {
            client_id: cfg.client_id.clone(),
            connection_id: self.inner.connection_id.clone(),
            protocol: cfg.protocol,
            remote_addr: cfg.server_url.clone(),
        };
        let options = ConnectionOptions {
            request_timeout: cfg.request_timeout(),
            ..Default::default()
        };

        let generation = self
            .inner
            .generation
            .compare_exchange(expected, expected + 1, Ordering::SeqCst, Ordering::SeqCst)
            .map_err(|_| ClientError::Superseded)?
            + 1;
        let conn = Connection::spawn(
            ws,
            info,
            converter_for(cfg.protocol),
            self.inner.handlers.clone(),
            options,
            &CancellationToken::new(),
        );
        if !self.install(generation, &conn) {
            debug!(client = %cfg.client_id, "discarding superseded session");
            conn.disconnect();
            return Err(ClientError::Superseded);
        }
        *self.inner.token.lock() = Some(token.to_string());
        *self.inner.state.lock() = ConnectionState::Connected;
        info!(client = %cfg.client_id, cid = %self.inner.connection_id, protocol = %cfg.protocol, "connected to hub");

        let client = self.clone();
        let watched = conn.clone();
        tokio::spawn(async move {
            watched.closed().await;
            client.on_closed(generation, watched.last_error());
        });
        Ok(conn)
    }

    /// Stores `conn` as the current session unless `generation` is stale.
    /// A session it replaces is closed.
    fn install(&self, generation: u64, conn: &Connection) -> bool {
        let previous = {
            let mut current = self.inner.conn.lock();
            if self.inner.generation.load(Ordering::SeqCst) != generation {
                return false;
            }
            current.replace(conn.clone())
        };
        if let Some(previous) = previous {
            previous.disconnect();
        }
        true
    }

    fn on_closed(&self, generation: u64, error: Option<String>) {
        if self.inner.generation.load(Ordering::SeqCst) != generation {
            return;
        }
        *self.inner.state.lock() = ConnectionState::Disconnected;
        match error {
            Some(e) if self.retry_enabled() => {
                info!(client = %self.client_id(), "connection lost ({e}), reconnecting");
                let cancel = self.inner.reconnect_cancel.lock().clone();
                tokio::spawn(reconnect_loop(self.clone(), cancel));
            }
            _ => debug!(client = %self.client_id(), "session ended"),
        }
    }
}
