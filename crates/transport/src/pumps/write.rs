//! WebSocket write pump: the only task that touches the sink.

use futures_util::SinkExt;
use thinghub_protocol::constants::WS_PING_PERIOD;
use tokio::sync::mpsc;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_tungstenite::tungstenite::{self, Message as WsMessage};
use tokio_util::sync::CancellationToken;
use tracing::{error, trace};

/// Drains the send channel into the sink and pings the peer periodically.
///
/// Every outbound frame goes through here, so frames are never interleaved.
pub(crate) async fn write_pump<S>(
    mut write: S,
    mut write_rx: mpsc::Receiver<WsMessage>,
    cancel: CancellationToken,
) where
    S: SinkExt<WsMessage, Error = tungstenite::Error> + Unpin,
{
    let mut ping = tokio::time::interval_at(Instant::now() + WS_PING_PERIOD, WS_PING_PERIOD);
    ping.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,

            msg = write_rx.recv() => {
                match msg {
                    Some(m) => {
                        if let Err(e) = write.send(m).await {
                            error!("WebSocket write error: {e}");
                            cancel.cancel();
                            break;
                        }
                    }
                    None => break,
                }
            }

            _ = ping.tick() => {
                trace!("sending ping");
                if let Err(e) = write.send(WsMessage::Ping(Vec::new().into())).await {
                    error!("WebSocket ping error: {e}");
                    cancel.cancel();
                    break;
                }
            }
        }
    }

    let _ = write.send(WsMessage::Close(None)).await;
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures_util::sink;
    use std::time::Duration;

    fn channel_sink(
        tx: mpsc::Sender<WsMessage>,
    ) -> impl SinkExt<WsMessage, Error = tungstenite::Error> + Unpin {
        Box::pin(sink::unfold(tx, |tx, msg: WsMessage| async move {
            let _ = tx.send(msg).await;
            Ok::<_, tungstenite::Error>(tx)
        }))
    }

    #[tokio::test]
    async fn writes_in_order_then_closes_on_cancel() {
        let (sink_tx, mut sink_rx) = mpsc::channel(16);
        let (write_tx, write_rx) = mpsc::channel(16);
        let cancel = CancellationToken::new();

        let handle = tokio::spawn(write_pump(channel_sink(sink_tx), write_rx, cancel.clone()));

        for i in 0..3 {
            write_tx.send(WsMessage::Text(format!("m{i}").into())).await.unwrap();
        }
        for i in 0..3 {
            match sink_rx.recv().await {
                Some(WsMessage::Text(t)) => assert_eq!(t.as_str(), format!("m{i}")),
                other => panic!("unexpected frame {other:?}"),
            }
        }

        cancel.cancel();
        tokio::time::timeout(Duration::from_secs(2), handle)
            .await
            .expect("should stop")
            .expect("no panic");
        assert!(matches!(sink_rx.recv().await, Some(WsMessage::Close(_))));
    }

    #[tokio::test]
    async fn pings_after_each_period() {
        tokio::time::pause();
        let (sink_tx, mut sink_rx) = mpsc::channel(16);
        let (_write_tx, write_rx) = mpsc::channel(16);
        let cancel = CancellationToken::new();
        tokio::spawn(write_pump(channel_sink(sink_tx), write_rx, cancel.clone()));

        let start = Instant::now();
        assert!(matches!(sink_rx.recv().await, Some(WsMessage::Ping(_))));
        assert!(start.elapsed() >= WS_PING_PERIOD);
        assert!(matches!(sink_rx.recv().await, Some(WsMessage::Ping(_))));
        assert!(start.elapsed() >= WS_PING_PERIOD * 2);
        cancel.cancel();
    }

    #[tokio::test]
    async fn stops_when_senders_are_gone() {
        let (sink_tx, mut sink_rx) = mpsc::channel(16);
        let (write_tx, write_rx) = mpsc::channel::<WsMessage>(16);
        drop(write_tx);
        write_pump(channel_sink(sink_tx), write_rx, CancellationToken::new()).await;
        assert!(matches!(sink_rx.recv().await, Some(WsMessage::Close(_))));
    }
}
