//! Auto-reconnect after an unexpected session loss.

use std::pin::Pin;

use thinghub_transport::TransportError;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::ClientError;
use crate::client::ClientConnection;

/// Redials the hub with the last token at a fixed interval.
///
/// Stops on cancellation, when auto-reconnect was disabled, after
/// `max_attempts` failures, when the hub rejects the token, or once a
/// session is back up. Boxed because a successful attempt installs a close
/// watcher that spawns this function again.
pub(crate) fn reconnect_loop(
    client: ClientConnection,
    cancel: CancellationToken,
) -> Pin<Box<dyn Future<Output = ()> + Send>> {
    Box::pin(async move {
        let interval = client.config().reconnect.interval();
        let max_attempts = client.config().reconnect.max_attempts;
        let mut attempt: u32 = 0;

        loop {
            attempt = attempt.saturating_add(1);
            if max_attempts > 0 && attempt > max_attempts {
                warn!(client = %client.client_id(), max_attempts, "giving up reconnect");
                return;
            }

            tokio::select! {
                _ = cancel.cancelled() => {
                    debug!(client = %client.client_id(), "reconnect cancelled");
                    return;
                }
                _ = tokio::time::sleep(interval) => {}
            }
            if cancel.is_cancelled() || !client.retry_enabled() {
                return;
            }

            let Some(token) = client.token() else {
                warn!(client = %client.client_id(), "no token to reconnect with");
                return;
            };

            info!(client = %client.client_id(), attempt, "reconnecting");
            match client.establish(&token).await {
                Ok(conn) => {
                    if cancel.is_cancelled() || !client.retry_enabled() {
                        // Disconnected while the handshake was in flight.
                        client.drop_session(&conn);
                        return;
                    }
                    info!(client = %client.client_id(), attempt, "reconnected");
                    return;
                }
                Err(ClientError::Superseded) => {
                    debug!(client = %client.client_id(), attempt, "reconnect superseded by a newer session");
                    return;
                }
                Err(ClientError::Transport(TransportError::Unauthorized(e))) => {
                    warn!(client = %client.client_id(), "token rejected, stopping reconnect: {e}");
                    return;
                }
                Err(e) => debug!(client = %client.client_id(), attempt, "reconnect failed: {e}"),
            }
        }
    })
}
