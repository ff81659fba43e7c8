//! Live Subscriptions
//!
//! Registry of the active store subscriptions held by one client. Each
//! registration pumps events from a store feed into its consumer
//! callback on a background task, re-subscribing with capped
//! exponential backoff when the store reports a transient failure. A
//! re-subscribe replays the snapshot, so consumers see a fresh baseline
//! rather than a gap.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::config::Config;
use crate::store::{Store, StoreEvent, StorePath};

/// Registry of live listeners, at most one per subscribed path.
pub struct SubscriptionManager {
    store: Arc<dyn Store>,
    config: Config,
    active: Arc<DashMap<StorePath, ActiveSub>>,
}

struct ActiveSub {
    detached: Arc<AtomicBool>,
    task: JoinHandle<()>,
}

impl ActiveSub {
    fn detach(&self) {
        self.detached.store(true, Ordering::SeqCst);
        self.task.abort();
    }
}

impl SubscriptionManager {
    #[must_use]
    pub fn new(store: Arc<dyn Store>, config: Config) -> Self {
        Self {
            store,
            config,
            active: Arc::new(DashMap::new()),
        }
    }

    /// Registers a live listener over the subtree at `path`, replacing
    /// any existing listener on the same path.
    ///
    /// `on_event` runs on a background task; its first delivery is the
    /// registration snapshot. Events committed after the returned guard
    /// is cancelled are never delivered.
    pub fn subscribe<F>(&self, path: StorePath, on_event: F) -> SubscriptionGuard
    where
        F: FnMut(StoreEvent) + Send + 'static,
    {
        let detached = Arc::new(AtomicBool::new(false));
        let task = tokio::spawn(pump(
            self.store.clone(),
            self.config.clone(),
            path.clone(),
            detached.clone(),
            self.active.clone(),
            on_event,
        ));

        let replaced = self.active.insert(
            path.clone(),
            ActiveSub {
                detached: detached.clone(),
                task,
            },
        );
        if let Some(previous) = replaced {
            debug!(%path, "replacing existing live listener");
            previous.detach();
        }

        SubscriptionGuard {
            path,
            detached,
            registry: self.active.clone(),
        }
    }

    /// Cancels every active listener. Used on identity changes, where
    /// all queries tied to the previous user become invalid at once.
    pub fn detach_all(&self) {
        let count = self.active.len();
        self.active.retain(|_, sub| {
            sub.detach();
            false
        });
        if count > 0 {
            debug!(count, "detached all live listeners");
        }
    }

    /// Number of live listeners.
    #[must_use]
    pub fn active_count(&self) -> usize {
        self.active.len()
    }
}

/// Detaches its listener when cancelled or dropped.
pub struct SubscriptionGuard {
    path: StorePath,
    detached: Arc<AtomicBool>,
    registry: Arc<DashMap<StorePath, ActiveSub>>,
}

impl SubscriptionGuard {
    /// Stops delivery. Idempotent; events committed after this returns
    /// are never delivered.
    pub fn cancel(&self) {
        self.detached.store(true, Ordering::SeqCst);
        let removed = self
            .registry
            .remove_if(&self.path, |_, sub| {
                Arc::ptr_eq(&sub.detached, &self.detached)
            });
        if let Some((_, sub)) = removed {
            sub.task.abort();
        }
    }

    /// Whether delivery has stopped.
    #[must_use]
    pub fn is_detached(&self) -> bool {
        self.detached.load(Ordering::SeqCst)
    }
}

impl Drop for SubscriptionGuard {
    fn drop(&mut self) {
        self.cancel();
    }
}

async fn pump<F>(
    store: Arc<dyn Store>,
    config: Config,
    path: StorePath,
    detached: Arc<AtomicBool>,
    registry: Arc<DashMap<StorePath, ActiveSub>>,
    mut on_event: F,
) where
    F: FnMut(StoreEvent) + Send + 'static,
{
    let mut attempts: u32 = 0;
    'outer: while !detached.load(Ordering::SeqCst) {
        let mut feed = match store.subscribe(&path).await {
            Ok(feed) => feed,
            Err(e) if e.is_transient() => {
                attempts += 1;
                let delay = backoff_delay(&config, attempts);
                warn!(%path, attempt = attempts, "store subscription failed, retrying in {delay:?}: {e}");
                tokio::time::sleep(delay).await;
                continue;
            }
            Err(e) => {
                warn!(%path, "store subscription failed: {e}");
                break;
            }
        };
        attempts = 0;

        loop {
            match feed.recv().await {
                Ok(event) => {
                    if detached.load(Ordering::SeqCst) {
                        break 'outer;
                    }
                    on_event(event);
                }
                Err(e) if e.is_transient() => {
                    attempts += 1;
                    let delay = backoff_delay(&config, attempts);
                    warn!(%path, attempt = attempts, "store feed dropped, re-subscribing in {delay:?}: {e}");
                    tokio::time::sleep(delay).await;
                    continue 'outer;
                }
                Err(e) => {
                    warn!(%path, "store feed failed: {e}");
                    break 'outer;
                }
            }
        }
    }
    registry.remove_if(&path, |_, sub| Arc::ptr_eq(&sub.detached, &detached));
}

/// Capped exponential backoff: base doubled per attempt, up to the
/// configured ceiling.
fn backoff_delay(config: &Config, attempts: u32) -> Duration {
    let factor = 1u32 << attempts.min(6);
    (config.retry_base * factor).min(config.retry_max)
}
