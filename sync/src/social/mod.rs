//! Social Graph
//!
//! Profiles, friend edges, friend requests, and blocks over the shared
//! store. Relationships are mirrored under both users so either side
//! can be read with a single lookup, and every mutation that touches
//! more than one location commits as one atomic batch so the mirrors
//! cannot drift.

mod blocks;
mod friends;
mod types;

pub use types::{ProfileUpdate, RegisterProfile};

use crate::SyncContext;

/// Store-backed social graph operations for one client.
///
/// Mutations act as the signed-in user; reads may target any uid.
#[derive(Clone)]
pub struct SocialGraph {
    ctx: SyncContext,
}

impl SocialGraph {
    pub(crate) fn new(ctx: SyncContext) -> Self {
        Self { ctx }
    }
}
