//! Message Types

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::id::{ChatId, MessageId, UserId};

/// Sender uid recorded on synthetic messages the system itself appends,
/// such as the creation announcement at the head of a group chat.
pub const SYSTEM_SENDER: &str = "system";

/// A file or image attached to a message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Attachment {
    pub name: String,
    pub url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mime_type: Option<String>,
}

/// One entry in a chat's append-only message log, stored at
/// `chats/{chat_id}/messages/{id}`.
///
/// Immutable once written. Ordered solely by `server_timestamp`, which
/// the store assigns at commit time; client clocks never participate.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub id: MessageId,
    pub chat_id: ChatId,
    pub sender_uid: UserId,
    /// Sender's display name at send time, denormalized for rendering.
    pub sender_display_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub avatar_ref: Option<String>,
    pub content: String,
    /// Store-assigned commit time, epoch milliseconds.
    pub server_timestamp: i64,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub attachments: Vec<Attachment>,
}

impl Message {
    /// Whether this is a synthetic system message.
    #[must_use]
    pub fn is_system(&self) -> bool {
        self.sender_uid.as_str() == SYSTEM_SENDER
    }

    /// The server timestamp as a wall-clock time.
    #[must_use]
    pub fn timestamp(&self) -> DateTime<Utc> {
        DateTime::<Utc>::from_timestamp_millis(self.server_timestamp).unwrap_or_default()
    }
}
