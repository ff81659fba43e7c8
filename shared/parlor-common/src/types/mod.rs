//! Entity Types
//!
//! The persisted and derived records of the sync layer, shaped exactly
//! like the subtrees they occupy in the shared store.

mod chat;
mod message;
mod notify;
mod user;

pub use chat::{Chat, ChatKind};
pub use message::{Attachment, Message, SYSTEM_SENDER};
pub use notify::{Notification, NotificationKind};
pub use user::{FriendRequest, RequestStatus, UserProfile};
