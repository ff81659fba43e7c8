//! Client Facade
//!
//! Wires the store, session, and subscription manager into one handle
//! and owns the identity watcher that tears down live listeners when
//! the signed-in user changes.

use std::sync::Arc;

use tokio::task::JoinHandle;
use tracing::{debug, info};

use crate::chat::{ChatRegistry, Messages};
use crate::config::Config;
use crate::live::SubscriptionManager;
use crate::notify::Notifications;
use crate::session::Session;
use crate::social::SocialGraph;
use crate::store::Store;
use crate::SyncContext;

/// Entry point for the sync layer.
///
/// Holds one component per concern; all of them share the same store,
/// session, and subscription registry. Dropping the client aborts the
/// identity watcher and detaches every live listener.
pub struct SyncClient {
    ctx: SyncContext,
    social: SocialGraph,
    chats: ChatRegistry,
    messages: Messages,
    notifications: Notifications,
    identity_task: JoinHandle<()>,
}

impl SyncClient {
    pub fn new(store: Arc<dyn Store>, config: Config) -> Self {
        let session = Session::default();
        let subs = Arc::new(SubscriptionManager::new(store.clone(), config.clone()));
        let ctx = SyncContext {
            store,
            session,
            subs,
            config: Arc::new(config),
        };

        let identity_task = tokio::spawn(watch_identity(ctx.clone()));

        info!("sync client started");
        Self {
            social: SocialGraph::new(ctx.clone()),
            chats: ChatRegistry::new(ctx.clone()),
            messages: Messages::new(ctx.clone()),
            notifications: Notifications::new(ctx.clone()),
            ctx,
            identity_task,
        }
    }

    #[must_use]
    pub fn session(&self) -> &Session {
        &self.ctx.session
    }

    #[must_use]
    pub fn social(&self) -> &SocialGraph {
        &self.social
    }

    #[must_use]
    pub fn chats(&self) -> &ChatRegistry {
        &self.chats
    }

    #[must_use]
    pub fn messages(&self) -> &Messages {
        &self.messages
    }

    #[must_use]
    pub fn notifications(&self) -> &Notifications {
        &self.notifications
    }

    /// Aborts the identity watcher and detaches all live listeners.
    /// Callable more than once.
    pub fn shutdown(&self) {
        self.identity_task.abort();
        self.ctx.subs.detach_all();
        debug!("sync client shut down");
    }
}

impl Drop for SyncClient {
    fn drop(&mut self) {
        self.shutdown();
    }
}

/// Detaches every live listener when the signed-in user signs out or
/// switches. Listeners opened for the old identity must never keep
/// streaming another user's data. The first sign-in detaches nothing:
/// user-scoped listeners need the session uid, so none can predate it.
async fn watch_identity(ctx: SyncContext) {
    let mut identity = ctx.session.watch();
    let mut previous = identity.borrow().clone();
    while identity.changed().await.is_ok() {
        if previous.is_some() {
            debug!("identity changed, detaching live listeners");
            ctx.subs.detach_all();
        }
        previous = identity.borrow().clone();
    }
}
