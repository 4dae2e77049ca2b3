// Inbound fan-out for relay pushes
// Every listener sees every message; conversation filtering is downstream.

use log::{debug, warn};
use tokio::sync::broadcast;
use tokio_stream::wrappers::errors::BroadcastStreamRecvError;
use tokio_stream::wrappers::BroadcastStream;
use tokio_stream::StreamExt;

use crate::models::Message;

const FANOUT_CAPACITY: usize = 256;

/// Single fan-out point for every message pushed on any subscribed topic.
/// Decouples who is subscribed at the transport from who is listening in
/// the UI right now.
#[derive(Clone)]
pub struct MessageDispatcher {
    tx: broadcast::Sender<Message>,
}

impl MessageDispatcher {
    pub fn new() -> MessageDispatcher {
        let (tx, _) = broadcast::channel(FANOUT_CAPACITY);
        MessageDispatcher { tx }
    }

    /// Deserialize a MESSAGE frame body and broadcast it. Undecodable
    /// payloads are logged and dropped rather than taking the read loop
    /// down with them.
    pub fn publish(&self, body: &str) {
        let message: Message = match serde_json::from_str(body) {
            Ok(message) => message,
            Err(e) => {
                warn!("Dropping undecodable relay payload: {}", e);
                return;
            }
        };
        debug!(
            "Dispatching message from {} to {}",
            message.sender_id, message.recipient_id
        );
        if self.tx.send(message).is_err() {
            debug!("No listeners attached; inbound message discarded");
        }
    }

    /// Attach a listener. The handle detaches when dropped.
    pub fn subscribe(&self) -> MessageStream {
        MessageStream {
            inner: BroadcastStream::new(self.tx.subscribe()),
        }
    }
}

impl Default for MessageDispatcher {
    fn default() -> Self {
        MessageDispatcher::new()
    }
}

/// A detachable handle onto the fan-out stream, in transport delivery
/// order. Dropping it is how a listener unsubscribes.
pub struct MessageStream {
    inner: BroadcastStream<Message>,
}

impl MessageStream {
    /// Next broadcast message, or `None` once the dispatcher is gone. A
    /// listener that falls behind the channel capacity skips the overwritten
    /// messages and keeps going.
    pub async fn next(&mut self) -> Option<Message> {
        while let Some(item) = self.inner.next().await {
            match item {
                Ok(message) => return Some(message),
                Err(BroadcastStreamRecvError::Lagged(skipped)) => {
                    warn!("Message listener lagged; {} message(s) skipped", skipped);
                }
            }
        }
        None
    }
}
