//! Chat Types

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::id::{ChatId, UserId};

/// Chat kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChatKind {
    /// The well-known singleton everyone can read and write.
    Global,
    /// A named group chat.
    Party,
    /// A two-party direct chat with a deterministic id.
    Dm,
    /// A team chat; same shape as a party, id assigned by the store.
    Team,
}

/// A conversation context with a membership set, stored at
/// `chats/{chat_id}`. Messages live under a child subtree and are not
/// part of this record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Chat {
    pub chat_id: ChatId,
    pub kind: ChatKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_by: Option<UserId>,
    /// Store-assigned creation time, epoch milliseconds.
    pub created_at: i64,
    /// Membership markers, one keyed entry per member so a future removal
    /// is a single-path delete. Always contains the creator.
    #[serde(default)]
    pub members: BTreeMap<UserId, bool>,
}

impl Chat {
    /// Whether `uid` is a member of this chat.
    #[must_use]
    pub fn has_member(&self, uid: &UserId) -> bool {
        self.members.get(uid).copied().unwrap_or(false)
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn test_kind_encodes_lowercase() {
        assert_eq!(
            serde_json::to_value(ChatKind::Party).expect("encode"),
            json!("party")
        );
        assert_eq!(
            serde_json::to_value(ChatKind::Dm).expect("encode"),
            json!("dm")
        );
    }

    #[test]
    fn test_membership_defaults_empty() {
        let chat: Chat = serde_json::from_value(json!({
            "chat_id": "global",
            "kind": "global",
            "created_at": 1,
        }))
        .expect("record without members should decode");
        assert!(chat.members.is_empty());
        assert!(!chat.has_member(&UserId::from("u1")));
    }
}
