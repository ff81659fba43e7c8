//! Chat
//!
//! The chat registry (directory of conversation contexts) and the
//! append-only message streams hanging off each chat. Chat records live
//! at `chats/{id}`; their messages live in a child subtree keyed by
//! message id and ordered by store-assigned timestamp.

mod messages;
mod registry;

pub use messages::{MessageStream, Messages};
pub use registry::{ChatRegistry, NewGroupChat, GLOBAL_CHAT_ID};
