//! Correlation of asynchronous responses with their pending requests.
//!
//! A pending call is a single-use delivery slot keyed by correlation ID.
//! The read task fulfils it with [`PendingCalls::handle_response`] while the
//! caller waits on the [`ReplySlot`] with a deadline. Each slot is consumed
//! at most once: by the first matching response, by timeout, or by
//! [`PendingCalls::close_all`].

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use thinghub_protocol::ResponseMessage;
use tokio::sync::oneshot;
use tokio::time::Instant;
use tracing::{trace, warn};

use crate::TransportError;

type Slots = Arc<Mutex<HashMap<String, oneshot::Sender<ResponseMessage>>>>;

/// Outstanding requests of one connection.
#[derive(Clone, Default)]
pub struct PendingCalls {
    slots: Slots,
}

impl PendingCalls {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a pending call and returns the slot to wait on.
    ///
    /// Reusing a correlation ID that is still in flight fails the earlier
    /// waiter with [`TransportError::Closed`].
    pub fn open(&self, correlation_id: &str) -> ReplySlot {
        let (tx, rx) = oneshot::channel();
        if self
            .slots
            .lock()
            .insert(correlation_id.to_string(), tx)
            .is_some()
        {
            warn!(correlation = %correlation_id, "correlation ID reused while in flight");
        }
        ReplySlot {
            correlation_id: correlation_id.to_string(),
            rx,
            slots: self.slots.clone(),
        }
    }

    /// Delivers a response to its pending call.
    ///
    /// Returns `false` without side effects when the correlation ID is
    /// unknown, already consumed, or its waiter has given up.
    pub fn handle_response(&self, resp: ResponseMessage) -> bool {
        self.try_deliver(resp).is_ok()
    }

    /// Like [`handle_response`](Self::handle_response) but hands the response
    /// back when nobody was waiting for it.
    pub fn try_deliver(&self, resp: ResponseMessage) -> Result<(), ResponseMessage> {
        if resp.correlation_id.is_empty() {
            return Err(resp);
        }
        let tx = self.slots.lock().remove(&resp.correlation_id);
        match tx {
            Some(tx) => {
                trace!(correlation = %resp.correlation_id, "response delivered");
                tx.send(resp)
            }
            None => Err(resp),
        }
    }

    /// Fails every pending call immediately. Returns how many were failed.
    pub fn close_all(&self) -> usize {
        let drained: Vec<_> = self.slots.lock().drain().collect();
        // Dropping the senders wakes every waiter with `Closed`.
        drained.len()
    }

    /// Number of calls still waiting.
    pub fn len(&self) -> usize {
        self.slots.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Waitable end of a pending call.
///
/// Dropping the slot abandons the call; a response arriving afterwards is
/// treated as unknown.
pub struct ReplySlot {
    correlation_id: String,
    rx: oneshot::Receiver<ResponseMessage>,
    slots: Slots,
}

impl ReplySlot {
    pub fn correlation_id(&self) -> &str {
        &self.correlation_id
    }

    /// Waits for the response for at most `timeout`.
    pub async fn wait(self, timeout: Duration) -> Result<ResponseMessage, TransportError> {
        self.wait_until(Instant::now() + timeout).await
    }

    /// Waits for the response until `deadline`.
    pub async fn wait_until(mut self, deadline: Instant) -> Result<ResponseMessage, TransportError> {
        match tokio::time::timeout_at(deadline, &mut self.rx).await {
            Ok(Ok(resp)) => Ok(resp),
            Ok(Err(_)) => Err(TransportError::Closed),
            Err(_) => Err(TransportError::Timeout),
        }
    }
}

impl Drop for ReplySlot {
    fn drop(&mut self) {
        self.rx.close();
        let mut slots = self.slots.lock();
        // Only remove our own sender; a reused ID may belong to a newer call.
        if slots
            .get(&self.correlation_id)
            .is_some_and(|tx| tx.is_closed())
        {
            slots.remove(&self.correlation_id);
        }
    }
}
