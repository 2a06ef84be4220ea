//! WebSocket read pump: decodes frames and hands messages to a dispatcher.

use futures_util::StreamExt;
use thinghub_protocol::constants::{WS_MAX_MESSAGE_SIZE, WS_PONG_WAIT};
use thinghub_protocol::{Message, MessageConverter};
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::{self, Message as WsMessage};
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace, warn};

use crate::TransportError;

/// Reads frames until the stream ends, fails, or `cancel` fires.
///
/// Any inbound frame resets the read deadline; if nothing arrives within
/// [`WS_PONG_WAIT`] the connection is considered dead. Returns the error
/// that ended the loop, or `None` when it was cancelled.
pub(crate) async fn read_pump<S, D>(
    mut read: S,
    converter: &dyn MessageConverter,
    write_tx: mpsc::Sender<WsMessage>,
    cancel: CancellationToken,
    mut dispatch: D,
) -> Option<TransportError>
where
    S: StreamExt<Item = Result<WsMessage, tungstenite::Error>> + Unpin,
    D: FnMut(Message),
{
    let deadline = tokio::time::sleep(WS_PONG_WAIT);
    tokio::pin!(deadline);

    loop {
        tokio::select! {
            _ = cancel.cancelled() => return None,

            () = &mut deadline => {
                warn!("read deadline expired, closing connection");
                return Some(TransportError::Timeout);
            }

            frame = read.next() => {
                let msg = match frame {
                    Some(Ok(msg)) => msg,
                    Some(Err(e)) => {
                        warn!("WebSocket read error: {e}");
                        return Some(TransportError::Ws(e));
                    }
                    None => {
                        debug!("WebSocket stream ended");
                        return Some(TransportError::Closed);
                    }
                };
                deadline.as_mut().reset(tokio::time::Instant::now() + WS_PONG_WAIT);

                match msg {
                    WsMessage::Text(text) => {
                        handle_frame(text.as_bytes(), converter, &mut dispatch);
                    }
                    WsMessage::Binary(data) => {
                        handle_frame(&data, converter, &mut dispatch);
                    }
                    WsMessage::Ping(data) => {
                        trace!("received ping, sending pong");
                        let _ = write_tx.try_send(WsMessage::Pong(data));
                    }
                    WsMessage::Pong(_) => trace!("received pong"),
                    WsMessage::Close(frame) => {
                        debug!(?frame, "received close frame");
                        return Some(TransportError::Closed);
                    }
                    WsMessage::Frame(_) => {}
                }
            }
        }
    }
}

/// Decodes one frame. Undecodable frames are logged and dropped.
fn handle_frame<D: FnMut(Message)>(raw: &[u8], converter: &dyn MessageConverter, dispatch: &mut D) {
    if raw.len() > WS_MAX_MESSAGE_SIZE {
        warn!("message too large ({} bytes), dropping", raw.len());
        return;
    }
    match converter.decode(raw) {
        Ok(msg) => {
            trace!(kind = msg.kind(), op = %msg.operation(), thing = %msg.thing_id(), "received message");
            dispatch(msg);
        }
        Err(e) => warn!(protocol = %converter.protocol_type(), "dropping message: {e}"),
    }
}
