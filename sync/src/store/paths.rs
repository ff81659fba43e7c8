//! Logical layout of the store tree.
//!
//! Every component addresses the tree through these builders so the
//! layout lives in exactly one place.

use parlor_common::{ChatId, MessageId, UserId};

use super::StorePath;

pub fn user(uid: &UserId) -> StorePath {
    StorePath::new(format!("users/{uid}"))
}

/// Reverse index from lowercase username to uid.
pub fn username(lowercase: &str) -> StorePath {
    StorePath::new(format!("usernames/{lowercase}"))
}

pub fn friends(uid: &UserId) -> StorePath {
    StorePath::new(format!("friends/{uid}"))
}

pub fn friend_edge(uid: &UserId, other: &UserId) -> StorePath {
    StorePath::new(format!("friends/{uid}/{other}"))
}

/// Inbox of pending requests, keyed by recipient.
pub fn friend_requests(to: &UserId) -> StorePath {
    StorePath::new(format!("friend_requests/{to}"))
}

pub fn friend_request(to: &UserId, from: &UserId) -> StorePath {
    StorePath::new(format!("friend_requests/{to}/{from}"))
}

pub fn blocked_users(blocker: &UserId) -> StorePath {
    StorePath::new(format!("blocked_users/{blocker}"))
}

pub fn blocked_user(blocker: &UserId, blocked: &UserId) -> StorePath {
    StorePath::new(format!("blocked_users/{blocker}/{blocked}"))
}

/// Mirror of [`blocked_user`], keyed by the blocked side.
pub fn blocked_by(blocked: &UserId, blocker: &UserId) -> StorePath {
    StorePath::new(format!("users_blocked_by/{blocked}/{blocker}"))
}

pub fn chat(chat_id: &ChatId) -> StorePath {
    StorePath::new(format!("chats/{chat_id}"))
}

pub fn chat_member(chat_id: &ChatId, uid: &UserId) -> StorePath {
    StorePath::new(format!("chats/{chat_id}/members/{uid}"))
}

pub fn messages(chat_id: &ChatId) -> StorePath {
    StorePath::new(format!("chats/{chat_id}/messages"))
}

pub fn message(chat_id: &ChatId, message_id: &MessageId) -> StorePath {
    StorePath::new(format!("chats/{chat_id}/messages/{message_id}"))
}
