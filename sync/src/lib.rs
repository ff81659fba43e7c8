//! Parlor Sync Core
//!
//! Realtime relationship and messaging layer for Parlor. Everything is
//! built over one logical store tree: social graph writes land as
//! atomic multi-path batches, chat history is an append-only stream
//! with store-assigned timestamps, and live views are fed by
//! snapshot-then-incremental subscriptions that survive transient
//! store failures.

pub mod chat;
mod client;
pub mod config;
pub mod live;
pub mod notify;
pub mod session;
pub mod social;
pub mod store;

use std::sync::Arc;

pub use client::SyncClient;
pub use config::Config;

use session::Session;
use store::Store;

/// Shared handles every component works through.
#[derive(Clone)]
pub struct SyncContext {
    pub store: Arc<dyn Store>,
    pub session: Session,
    pub subs: Arc<live::SubscriptionManager>,
    pub config: Arc<Config>,
}
