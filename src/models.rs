// Data types shared between the relay transport, the REST layer, and
// conversation sessions. Field names follow the platform's JSON contract.

use chrono::{SecondsFormat, Utc};
use serde::{Deserialize, Serialize};

/// The payload kind carried by a chat message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageKind {
    Text,
    Image,
    File,
}

impl MessageKind {
    /// Classify an attachment by its filename extension.
    pub fn for_filename(filename: &str) -> MessageKind {
        let extension = filename
            .rsplit_once('.')
            .map(|(_, ext)| ext.to_ascii_lowercase())
            .unwrap_or_default();
        match extension.as_str() {
            "png" | "jpg" | "jpeg" | "gif" | "webp" | "bmp" => MessageKind::Image,
            _ => MessageKind::File,
        }
    }
}

/// A single chat message, inbound or outbound. Immutable once built.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Message {
    pub sender_id: String,
    pub sender_name: String,
    pub recipient_id: String,
    pub content: String,
    /// ISO-8601, as produced by the backend and by [`now_timestamp`].
    pub timestamp: String,
    #[serde(rename = "type")]
    pub kind: MessageKind,
}

impl Message {
    pub fn outbound_text(
        sender_id: &str,
        sender_name: &str,
        recipient_id: &str,
        content: &str,
    ) -> Message {
        Message {
            sender_id: sender_id.to_string(),
            sender_name: sender_name.to_string(),
            recipient_id: recipient_id.to_string(),
            content: content.to_string(),
            timestamp: now_timestamp(),
            kind: MessageKind::Text,
        }
    }

    /// Build the outbound message for an already-uploaded attachment. The
    /// content is the URL the upload endpoint returned.
    pub fn outbound_attachment(
        sender_id: &str,
        sender_name: &str,
        recipient_id: &str,
        url: &str,
        kind: MessageKind,
    ) -> Message {
        Message {
            sender_id: sender_id.to_string(),
            sender_name: sender_name.to_string(),
            recipient_id: recipient_id.to_string(),
            content: url.to_string(),
            timestamp: now_timestamp(),
            kind,
        }
    }

    /// Whether this message belongs to the conversation with `user_id`,
    /// as sender or as recipient.
    pub fn involves(&self, user_id: &str) -> bool {
        self.sender_id == user_id || self.recipient_id == user_id
    }
}

/// Current wall-clock time in the wire's ISO-8601 shape.
pub fn now_timestamp() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true)
}

/// A persisted message as returned by the history endpoint. Older rows may
/// lack a kind; sessions resolve the sender name and kind when loading.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HistoryRecord {
    pub sender_id: String,
    pub recipient_id: String,
    pub content: String,
    pub timestamp: String,
    #[serde(default, rename = "type")]
    pub kind: Option<MessageKind>,
}

/// A prior conversation partner, the unit of conversation identity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Contact {
    pub user_id: String,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_message: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_timestamp: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub profile_picture_url: Option<String>,
}

impl Contact {
    /// Synthetic contact for a conversation opened by user id alone, e.g.
    /// through a deep link, when the directory has no record for it.
    pub fn placeholder(user_id: &str) -> Contact {
        Contact {
            user_id: user_id.to_string(),
            name: "Employer".to_string(),
            last_message: None,
            last_timestamp: None,
            profile_picture_url: None,
        }
    }
}

/// The logged-in user as supplied by the identity provider. Read-only to
/// this crate.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CurrentUser {
    pub user_id: String,
    pub display_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub profile_picture_url: Option<String>,
}
