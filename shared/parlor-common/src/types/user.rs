//! User Types

use serde::{Deserialize, Serialize};

use crate::id::UserId;

/// User profile (public information).
///
/// Created at registration, mutated only by its owner, never deleted.
/// Lives at `users/{uid}`; the `usernames/{lowercased}` reverse index is
/// written atomically alongside it to keep usernames unique.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserProfile {
    /// User ID.
    pub uid: UserId,
    /// Username (unique, case-insensitive).
    pub username: String,
    /// Display name.
    pub display_name: String,
    /// Avatar image reference.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub avatar_ref: Option<String>,
    /// Short self-description.
    #[serde(default)]
    pub bio: String,
    /// Decorative title shown next to the name.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    /// Preferred name color.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name_color: Option<String>,
    /// Number of accepted friendships. Maintained by the graph, not the
    /// owner; incremented and decremented inside the same atomic batch
    /// that writes or removes the edge pair.
    #[serde(default)]
    pub friends_count: i64,
}

/// Pending friend request status.
///
/// Requests only ever persist while pending: acceptance promotes them to
/// an edge pair and removes the record, decline and cancel remove it
/// outright.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RequestStatus {
    #[default]
    Pending,
}

/// A directed friend request, keyed `friend_requests/{to}/{from}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FriendRequest {
    /// Requesting user.
    pub from_uid: UserId,
    /// Addressed user.
    pub to_uid: UserId,
    /// Requester's username at send time, denormalized for display.
    pub sender_username: String,
    /// Store-assigned send time, epoch milliseconds.
    pub timestamp: i64,
    #[serde(default)]
    pub status: RequestStatus,
}
