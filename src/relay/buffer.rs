// Pending-work store for the relay client
// Holds subscriptions and messages issued while the link is down.

use crate::models::Message;

/// FIFO queues for work that could not be handed to the transport yet.
/// Appends never drop; the connection task drains a snapshot on every
/// successful connect, subscriptions before messages. This type does no
/// deduplication; idempotency is the caller's job.
#[derive(Debug, Default)]
pub struct OutboundBuffer {
    pending_subscriptions: Vec<String>,
    pending_messages: Vec<Message>,
}

impl OutboundBuffer {
    pub fn new() -> OutboundBuffer {
        OutboundBuffer::default()
    }

    pub fn queue_subscription(&mut self, topic_key: String) {
        self.pending_subscriptions.push(topic_key);
    }

    pub fn queue_message(&mut self, message: Message) {
        self.pending_messages.push(message);
    }

    /// Move both pending lists out, leaving the buffer empty. The caller
    /// drains the snapshot to completion; work queued after this call waits
    /// for the next drain.
    pub fn take_pending(&mut self) -> (Vec<String>, Vec<Message>) {
        (
            std::mem::take(&mut self.pending_subscriptions),
            std::mem::take(&mut self.pending_messages),
        )
    }

    /// Put unsent snapshot items back at the front of the queues, ahead of
    /// anything queued since the snapshot, so FIFO order survives a link
    /// that dies mid-drain.
    pub fn restore(&mut self, subscriptions: Vec<String>, messages: Vec<Message>) {
        if !subscriptions.is_empty() {
            let mut merged = subscriptions;
            merged.append(&mut self.pending_subscriptions);
            self.pending_subscriptions = merged;
        }
        if !messages.is_empty() {
            let mut merged = messages;
            merged.append(&mut self.pending_messages);
            self.pending_messages = merged;
        }
    }

    pub fn counts(&self) -> (usize, usize) {
        (
            self.pending_subscriptions.len(),
            self.pending_messages.len(),
        )
    }

    pub fn is_empty(&self) -> bool {
        self.pending_subscriptions.is_empty() && self.pending_messages.is_empty()
    }
}
