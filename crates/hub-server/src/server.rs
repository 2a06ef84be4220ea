//! HTTP front of the hub.
//!
//! Serves the login API and the two WebSocket upgrade paths on one port.
//! Upgrades are authorized with a bearer token before the handshake
//! completes; rejected requests never become sessions.

use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use axum::{Json, Router};
use axum::body::Body;
use axum::extract::{ConnectInfo, Request, State};
use axum::http::{HeaderMap, HeaderValue, StatusCode, header};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use hyper_util::rt::TokioIo;
use parking_lot::Mutex;
use serde::Deserialize;
use thinghub_protocol::ProtocolType;
use thinghub_protocol::constants::{CONNECTION_ID_HEADER, WS_MAX_MESSAGE_SIZE};
use thinghub_transport::{ConnectionInfo, Handlers};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpListener;
use tokio_tungstenite::WebSocketStream;
use tokio_tungstenite::tungstenite::handshake::derive_accept_key;
use tokio_tungstenite::tungstenite::protocol::{Role, WebSocketConfig};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::ServerError;
use crate::config::ServerConfig;
use crate::connection::ServerConnection;
use crate::manager::ConnectionManager;
use crate::sessions::SessionStore;

/// Login request body.
#[derive(Debug, Deserialize)]
struct LoginRequest {
    login: String,
    password: String,
}

/// The hub server.
pub struct HubServer {
    config: ServerConfig,
    manager: Arc<ConnectionManager>,
    sessions: Arc<SessionStore>,
    handlers: Arc<Handlers>,
    cancel: CancellationToken,
    local_addr: Mutex<Option<SocketAddr>>,
    running: AtomicBool,
}

impl HubServer {
    /// Creates a server. `handlers` are shared by every accepted session.
    pub fn new(config: ServerConfig, handlers: Arc<Handlers>) -> Arc<Self> {
        let manager = Arc::new(ConnectionManager::new(config.max_connections));
        let sessions = Arc::new(SessionStore::new(config.session_lifetime()));
        Arc::new(Self {
            config,
            manager,
            sessions,
            handlers,
            cancel: CancellationToken::new(),
            local_addr: Mutex::new(None),
            running: AtomicBool::new(false),
        })
    }

    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    pub fn manager(&self) -> &Arc<ConnectionManager> {
        &self.manager
    }

    pub fn sessions(&self) -> &Arc<SessionStore> {
        &self.sessions
    }

    pub fn handlers(&self) -> &Arc<Handlers> {
        &self.handlers
    }

    /// The bound address, once serving.
    pub fn local_addr(&self) -> Option<SocketAddr> {
        *self.local_addr.lock()
    }

    /// Stops serving and closes every session.
    pub fn shutdown(&self) {
        self.cancel.cancel();
    }

    /// Binds the configured address and serves until [`shutdown`](Self::shutdown).
    pub async fn run(self: &Arc<Self>) -> Result<(), ServerError> {
        let listener = TcpListener::bind(&self.config.address).await?;
        self.serve_on(listener).await
    }

    /// Serves on an already bound listener.
    pub async fn serve_on(self: &Arc<Self>, listener: TcpListener) -> Result<(), ServerError> {
        if self.running.swap(true, Ordering::SeqCst) {
            return Err(ServerError::AlreadyRunning);
        }
        let local_addr = listener.local_addr()?;
        *self.local_addr.lock() = Some(local_addr);
        info!("hub server listening on {local_addr}");

        let cancel = self.cancel.clone();
        let result = axum::serve(
            listener,
            self.router()
                .into_make_service_with_connect_info::<SocketAddr>(),
        )
        .with_graceful_shutdown(async move { cancel.cancelled().await })
        .await;

        info!("hub server shutting down");
        self.manager.close_all();
        self.running.store(false, Ordering::SeqCst);
        result.map_err(ServerError::from)
    }

    fn router(self: &Arc<Self>) -> Router {
        let cfg = &self.config;
        Router::new()
            .route(&cfg.login_path, post(login))
            .route(&cfg.refresh_path, post(refresh))
            .route(&cfg.logout_path, post(logout))
            .route(&cfg.passthrough_path, get(upgrade_passthrough))
            .route(&cfg.wot_path, get(upgrade_wot))
            .with_state(Arc::clone(self))
    }

    /// Runs one upgraded session until it closes.
    async fn run_session<T>(self: Arc<Self>, io: T, info: ConnectionInfo)
    where
        T: AsyncRead + AsyncWrite + Unpin + Send + 'static,
    {
        let ws = WebSocketStream::from_raw_socket(io, Role::Server, Some(ws_config())).await;
        let conn = ServerConnection::spawn(
            ws,
            info,
            self.handlers.clone(),
            self.config.request_timeout(),
            &self.cancel,
        );
        if let Err(e) = self.manager.add_connection(conn.clone()) {
            warn!(client = %conn.client_id(), cid = %conn.connection_id(), "session rejected: {e}");
            conn.disconnect();
            return;
        }
        conn.closed().await;
        self.manager.remove_instance(&conn);
        debug!(client = %conn.client_id(), cid = %conn.connection_id(), "session ended");
    }
}

fn ws_config() -> WebSocketConfig {
    let mut cfg = WebSocketConfig::default();
    cfg.max_message_size = Some(WS_MAX_MESSAGE_SIZE);
    cfg.max_frame_size = Some(WS_MAX_MESSAGE_SIZE);
    cfg
}

fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(header::AUTHORIZATION)?
        .to_str()
        .ok()?
        .strip_prefix("Bearer ")
        .map(str::trim)
        .filter(|t| !t.is_empty())
}

async fn login(
    State(server): State<Arc<HubServer>>,
    Json(body): Json<LoginRequest>,
) -> Result<Json<String>, ServerError> {
    let token = server.sessions.login(&body.login, &body.password)?;
    Ok(Json(token))
}

async fn refresh(
    State(server): State<Arc<HubServer>>,
    headers: HeaderMap,
) -> Result<Json<String>, ServerError> {
    let token = bearer_token(&headers).ok_or(ServerError::Unauthenticated)?;
    Ok(Json(server.sessions.refresh(token)?))
}

async fn logout(
    State(server): State<Arc<HubServer>>,
    headers: HeaderMap,
) -> Result<StatusCode, ServerError> {
    let token = bearer_token(&headers).ok_or(ServerError::Unauthenticated)?;
    let client_id = server.sessions.logout(token)?;
    server.manager.close_all_for_client(&client_id);
    Ok(StatusCode::OK)
}

async fn upgrade_passthrough(
    state: State<Arc<HubServer>>,
    peer: ConnectInfo<SocketAddr>,
    req: Request,
) -> Response {
    upgrade(state, peer, req, ProtocolType::Passthrough)
}

async fn upgrade_wot(
    state: State<Arc<HubServer>>,
    peer: ConnectInfo<SocketAddr>,
    req: Request,
) -> Response {
    upgrade(state, peer, req, ProtocolType::WotWebSocket)
}

/// Authorizes and accepts a WebSocket upgrade.
///
/// The session itself starts once hyper hands over the upgraded stream.
fn upgrade(
    State(server): State<Arc<HubServer>>,
    ConnectInfo(peer): ConnectInfo<SocketAddr>,
    mut req: Request,
    protocol: ProtocolType,
) -> Response {
    let headers = req.headers();
    let client_id = match bearer_token(headers).map(|t| server.sessions.validate(t)) {
        Some(Ok(client_id)) => client_id,
        Some(Err(e)) => {
            debug!(%peer, "upgrade rejected: {e}");
            return e.into_response();
        }
        None => {
            debug!(%peer, "upgrade rejected: no bearer token");
            return ServerError::Unauthenticated.into_response();
        }
    };

    let is_websocket = headers
        .get(header::UPGRADE)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|v| v.eq_ignore_ascii_case("websocket"));
    let Some(key) = headers.get(header::SEC_WEBSOCKET_KEY).filter(|_| is_websocket) else {
        return (StatusCode::BAD_REQUEST, "expected a WebSocket upgrade").into_response();
    };
    let accept = derive_accept_key(key.as_bytes());

    let (conns, _) = server.manager.connection_count();
    if server.config.max_connections > 0 && conns >= server.config.max_connections {
        return ServerError::TooManyConnections.into_response();
    }

    let connection_id = headers
        .get(CONNECTION_ID_HEADER)
        .and_then(|v| v.to_str().ok())
        .filter(|v| !v.is_empty())
        .map(str::to_string)
        .unwrap_or_else(|| uuid::Uuid::new_v4().to_string());
    let info = ConnectionInfo {
        client_id,
        connection_id,
        protocol,
        remote_addr: peer.to_string(),
    };
    info!(client = %info.client_id, cid = %info.connection_id, %protocol, %peer, "accepting session");

    let on_upgrade = hyper::upgrade::on(&mut req);
    tokio::spawn(async move {
        match on_upgrade.await {
            Ok(upgraded) => server.run_session(TokioIo::new(upgraded), info).await,
            Err(e) => warn!(%peer, "upgrade failed: {e}"),
        }
    });

    let mut resp = Response::new(Body::empty());
    *resp.status_mut() = StatusCode::SWITCHING_PROTOCOLS;
    let h = resp.headers_mut();
    h.insert(header::CONNECTION, HeaderValue::from_static("upgrade"));
    h.insert(header::UPGRADE, HeaderValue::from_static("websocket"));
    match HeaderValue::from_str(&accept) {
        Ok(v) => {
            h.insert(header::SEC_WEBSOCKET_ACCEPT, v);
        }
        Err(_) => return StatusCode::INTERNAL_SERVER_ERROR.into_response(),
    }
    resp
}
