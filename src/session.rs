// Conversation session state
// One open chat: history plus live messages, optimistic sends, and the
// two-phase attachment flow.

use anyhow::Result;
use log::{debug, error, info};

use crate::models::{Contact, CurrentUser, HistoryRecord, Message, MessageKind};
use crate::relay::{MessageStream, RelayClient};
use crate::rest::RestClient;

/// Display name used for the current user's own rows when resolving
/// history records.
const SELF_NAME: &str = "You";

/// One open conversation. Owns the active contact, the ordered message
/// list, and at most one armed attachment. Exclusively owned by whoever
/// opened it; the relay client underneath is shared.
///
/// Messages append in the order they are observed locally: history first,
/// then optimistic sends and pushed arrivals as they happen. The session
/// never re-sorts by timestamp, and it does not reconcile an optimistic
/// send with the relay's echo of the same message.
pub struct ChatSession {
    me: CurrentUser,
    relay: RelayClient,
    rest: RestClient,
    contact: Contact,
    messages: Vec<Message>,
    armed_attachment: Option<Message>,
    stream: MessageStream,
}

impl ChatSession {
    /// Open a conversation: load its history once, make sure the current
    /// user's inbox topic is subscribed (idempotent), and attach to the
    /// fan-out stream.
    pub async fn open(
        me: CurrentUser,
        relay: &RelayClient,
        rest: RestClient,
        contact: Contact,
    ) -> ChatSession {
        relay.subscribe_to_messages(&me.user_id).await;
        let mut session = ChatSession {
            stream: relay.messages(),
            relay: relay.clone(),
            me,
            rest,
            contact,
            messages: Vec::new(),
            armed_attachment: None,
        };
        session.load_history().await;
        session
    }

    /// Switch this session to another conversation. Resets the message
    /// list, reloads history, and discards any armed attachment; staged
    /// uploads never carry over between conversations.
    pub async fn select_contact(&mut self, contact: Contact) {
        if self.armed_attachment.take().is_some() {
            info!("Discarding armed attachment on conversation switch");
        }
        self.contact = contact;
        self.messages.clear();
        self.load_history().await;
    }

    async fn load_history(&mut self) {
        match self
            .rest
            .fetch_history(&self.me.user_id, &self.contact.user_id)
            .await
        {
            Ok(records) => {
                info!(
                    "Loaded {} message(s) with {}",
                    records.len(),
                    self.contact.user_id
                );
                let resolved = records
                    .into_iter()
                    .map(|record| self.resolve_record(record))
                    .collect();
                self.messages = resolved;
            }
            Err(e) => {
                error!("Failed to load chat history: {}", e);
                self.messages.clear();
            }
        }
    }

    /// Fill in the display fields history rows do not carry.
    fn resolve_record(&self, record: HistoryRecord) -> Message {
        let sender_name = if record.sender_id == self.me.user_id {
            SELF_NAME.to_string()
        } else {
            self.contact.name.clone()
        };
        Message {
            sender_id: record.sender_id,
            sender_name,
            recipient_id: record.recipient_id,
            content: record.content,
            timestamp: record.timestamp,
            kind: record.kind.unwrap_or(MessageKind::Text),
        }
    }

    /// Send a text message: append the optimistic local copy, then hand it
    /// to the relay (which queues it if the link is down). Blank input is
    /// ignored.
    pub async fn send_text(&mut self, content: &str) {
        let content = content.trim();
        if content.is_empty() {
            return;
        }
        let message = Message::outbound_text(
            &self.me.user_id,
            &self.me.display_name,
            &self.contact.user_id,
            content,
        );
        self.messages.push(message.clone());
        self.relay.send_message(message).await;
    }

    /// First half of a file send: upload the bytes, and on success stage
    /// the resulting URL as an armed message awaiting [`send_armed`]. An
    /// upload failure surfaces to the caller and stages nothing.
    ///
    /// [`send_armed`]: ChatSession::send_armed
    pub async fn arm_attachment(&mut self, filename: &str, bytes: Vec<u8>) -> Result<()> {
        let url = self.rest.upload_attachment(filename, bytes).await?;
        let kind = MessageKind::for_filename(filename);
        info!("Attachment {} uploaded, armed as {:?}", filename, kind);
        self.armed_attachment = Some(Message::outbound_attachment(
            &self.me.user_id,
            &self.me.display_name,
            &self.contact.user_id,
            &url,
            kind,
        ));
        Ok(())
    }

    pub fn armed_attachment(&self) -> Option<&Message> {
        self.armed_attachment.as_ref()
    }

    /// Second half of a file send: transmit the armed attachment. Returns
    /// false when nothing is armed.
    pub async fn send_armed(&mut self) -> bool {
        match self.armed_attachment.take() {
            Some(message) => {
                self.messages.push(message.clone());
                self.relay.send_message(message).await;
                true
            }
            None => false,
        }
    }

    /// Apply the conversation filter to one broadcast message: append it
    /// iff the active contact is its sender or recipient. Returns whether
    /// the message was kept.
    pub fn handle_incoming(&mut self, message: Message) -> bool {
        if message.involves(&self.contact.user_id) {
            self.messages.push(message);
            true
        } else {
            debug!(
                "Ignoring message between {} and {} for this conversation",
                message.sender_id, message.recipient_id
            );
            false
        }
    }

    /// Await the next pushed message that belongs to this conversation.
    /// Messages for other conversations are dropped from this session.
    /// Returns `None` once the fan-out stream closes.
    pub async fn next_incoming(&mut self) -> Option<Message> {
        while let Some(message) = self.stream.next().await {
            if self.handle_incoming(message.clone()) {
                return Some(message);
            }
        }
        None
    }

    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    pub fn contact(&self) -> &Contact {
        &self.contact
    }

    /// Stop listening. The transport-level topic subscription stays up;
    /// only this session's view goes away.
    pub fn close(self) {
        info!("Closed conversation with {}", self.contact.user_id);
    }
}
