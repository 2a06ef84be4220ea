use std::time::Duration;

/// Time to wait for a pong response (or any incoming message).
///
/// Acts as a read deadline: if nothing arrives within this window the
/// connection is considered dead and its read task exits.
pub const WS_PONG_WAIT: Duration = Duration::from_secs(60);

/// How often to send WebSocket ping frames (must be < [`WS_PONG_WAIT`]).
pub const WS_PING_PERIOD: Duration = Duration::from_secs(20);

/// Maximum message size in bytes (10 MB).
pub const WS_MAX_MESSAGE_SIZE: usize = 10 * 1024 * 1024;

/// Default time a caller waits for a correlated response.
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Outbound frame buffer per connection.
pub const SEND_BUFFER_SIZE: usize = 1024;

/// Upgrade path for the passthrough (native envelope) encoding.
pub const PASSTHROUGH_WS_PATH: &str = "/hiveot/wss";

/// Upgrade path for the WoT WebSocket sub-protocol encoding.
pub const WOT_WS_PATH: &str = "/wot/wss";

/// HTTP path that exchanges a password for a bearer token.
pub const LOGIN_PATH: &str = "/authn/login";

/// HTTP path that exchanges a valid token for a fresh one.
pub const REFRESH_PATH: &str = "/authn/refresh";

/// HTTP path that revokes all sessions of the caller.
pub const LOGOUT_PATH: &str = "/authn/logout";

/// Upgrade request header carrying the client-chosen connection ID.
pub const CONNECTION_ID_HEADER: &str = "cid";
