//! Notification Types

use serde::{Deserialize, Serialize};

/// What a notification is about.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationKind {
    FriendRequest,
    System,
    Message,
}

/// A derived, session-local notification.
///
/// Never persisted: the aggregator rebuilds the full list from live graph
/// state plus a local acknowledged-id set, so a notification cannot
/// outlive the session that derived it, and one whose underlying record
/// disappears drops out of the list on the next projection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Notification {
    /// Stable id within a projection; for friend requests this is the
    /// requesting uid.
    pub id: String,
    pub kind: NotificationKind,
    pub title: String,
    pub description: String,
    /// Timestamp of the underlying record, epoch milliseconds.
    pub timestamp: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub link: Option<String>,
    /// Whether the session has acknowledged this entry.
    pub read: bool,
}
