//! Shared Store
//!
//! Narrow interface over the synchronized tree that every Parlor client
//! reads and writes. The sync core assumes exactly three capabilities
//! from the engine behind it: atomic multi-path commits, store-assigned
//! timestamps, and push subscriptions that replay a snapshot before any
//! incremental change. [`MemoryStore`] provides them in-process.

mod memory;
pub mod paths;

mod tests;

pub use memory::MemoryStore;

use std::collections::VecDeque;
use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::{json, Value};
use tokio::sync::broadcast;

use parlor_common::{Error, Result};

// =============================================================================
// Paths
// =============================================================================

/// Slash-separated location in the store tree.
///
/// Segments never contain `/`; the empty path addresses the tree root.
/// Builders for the well-known layout live in [`paths`].
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct StorePath(String);

impl StorePath {
    #[must_use]
    pub fn new(path: impl Into<String>) -> Self {
        Self(path.into())
    }

    /// The tree root.
    #[must_use]
    pub fn root() -> Self {
        Self(String::new())
    }

    #[must_use]
    pub fn join(&self, segment: &str) -> Self {
        if self.0.is_empty() {
            Self(segment.to_owned())
        } else {
            Self(format!("{}/{segment}", self.0))
        }
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    #[must_use]
    pub fn is_root(&self) -> bool {
        self.0.is_empty()
    }

    /// Path segments, outermost first.
    pub fn segments(&self) -> impl Iterator<Item = &str> {
        self.0.split('/').filter(|s| !s.is_empty())
    }

    /// Rewrites `self` relative to `base`, if `base` is a prefix of it.
    /// A path is a prefix of itself; the result is then the root path.
    #[must_use]
    pub fn strip_prefix(&self, base: &Self) -> Option<Self> {
        let mut remaining = self.segments();
        for expected in base.segments() {
            if remaining.next() != Some(expected) {
                return None;
            }
        }
        Some(Self(remaining.collect::<Vec<_>>().join("/")))
    }
}

impl fmt::Display for StorePath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.0.is_empty() {
            f.write_str("/")
        } else {
            f.write_str(&self.0)
        }
    }
}

/// Walks `value` down the given path.
pub(crate) fn descend<'a>(value: &'a Value, path: &StorePath) -> Option<&'a Value> {
    let mut node = value;
    for segment in path.segments() {
        node = node.as_object()?.get(segment)?;
    }
    Some(node)
}

// =============================================================================
// Write batches
// =============================================================================

/// Sentinel the engine replaces with its commit timestamp.
///
/// May be embedded anywhere inside a written value; every occurrence in
/// one batch resolves to the same instant, in epoch milliseconds.
#[must_use]
pub fn server_timestamp() -> Value {
    json!({ ".sv": "timestamp" })
}

/// One mutation inside a [`WriteBatch`].
#[derive(Debug, Clone)]
pub enum WriteOp {
    /// Replace the subtree at `path`. A `null` value deletes it.
    Set { path: StorePath, value: Value },
    /// Remove the subtree at `path`. Missing paths are a no-op.
    Delete { path: StorePath },
    /// Add `delta` to the integer at `path`, treating anything else as
    /// zero.
    Increment { path: StorePath, delta: i64 },
}

/// Ordered set of writes applied as one atomic commit.
///
/// Either every op lands or none do, and subscribers observe the whole
/// batch at once.
#[derive(Debug, Clone, Default)]
pub struct WriteBatch {
    ops: Vec<WriteOp>,
}

impl WriteBatch {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&mut self, path: StorePath, value: Value) -> &mut Self {
        self.ops.push(WriteOp::Set { path, value });
        self
    }

    pub fn delete(&mut self, path: StorePath) -> &mut Self {
        self.ops.push(WriteOp::Delete { path });
        self
    }

    pub fn increment(&mut self, path: StorePath, delta: i64) -> &mut Self {
        self.ops.push(WriteOp::Increment { path, delta });
        self
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.ops.len()
    }

    pub(crate) fn into_ops(self) -> Vec<WriteOp> {
        self.ops
    }
}

// =============================================================================
// Subscriptions
// =============================================================================

/// One delivery on a [`StoreSubscription`].
#[derive(Debug, Clone)]
pub enum StoreEvent {
    /// Value of the subscribed subtree at registration time. Always the
    /// first delivery; `None` means the subtree does not exist yet.
    Snapshot(Option<Value>),
    /// A committed change touching the subscribed subtree. `path` is
    /// relative to the subscription root; `None` means deleted.
    Changed { path: StorePath, value: Option<Value> },
}

/// Committed batch fanned out to subscriptions, with ops resolved to
/// their final values (`None` for deletions).
#[derive(Debug)]
pub(crate) struct Commit {
    pub(crate) ops: Vec<(StorePath, Option<Value>)>,
}

/// Live feed over one subtree.
///
/// The first [`recv`](Self::recv) yields the snapshot taken at
/// registration; later calls yield committed changes in commit order.
pub struct StoreSubscription {
    root: StorePath,
    initial: Option<Option<Value>>,
    queued: VecDeque<StoreEvent>,
    commits: broadcast::Receiver<Arc<Commit>>,
}

impl StoreSubscription {
    pub(crate) fn new(
        root: StorePath,
        snapshot: Option<Value>,
        commits: broadcast::Receiver<Arc<Commit>>,
    ) -> Self {
        Self {
            root,
            initial: Some(snapshot),
            queued: VecDeque::new(),
            commits,
        }
    }

    /// Next event, waiting on the commit stream when none is queued.
    ///
    /// Fails with [`Error::StoreUnavailable`] when the feed lagged
    /// behind the commit stream or the store shut down. Re-subscribing
    /// recovers with a fresh snapshot.
    pub async fn recv(&mut self) -> Result<StoreEvent> {
        if let Some(snapshot) = self.initial.take() {
            return Ok(StoreEvent::Snapshot(snapshot));
        }
        loop {
            if let Some(event) = self.queued.pop_front() {
                return Ok(event);
            }
            let commit = match self.commits.recv().await {
                Ok(commit) => commit,
                Err(broadcast::error::RecvError::Lagged(n)) => {
                    return Err(Error::StoreUnavailable(format!(
                        "subscription lagged behind {n} commits"
                    )));
                }
                Err(broadcast::error::RecvError::Closed) => {
                    return Err(Error::StoreUnavailable("store closed".to_owned()));
                }
            };
            for (path, value) in &commit.ops {
                if let Some(relative) = path.strip_prefix(&self.root) {
                    self.queued.push_back(StoreEvent::Changed {
                        path: relative,
                        value: value.clone(),
                    });
                } else if let Some(below) = self.root.strip_prefix(path) {
                    // A write above the root replaces the whole subtree.
                    let at_root = value.as_ref().and_then(|v| descend(v, &below)).cloned();
                    self.queued.push_back(StoreEvent::Changed {
                        path: StorePath::root(),
                        value: at_root,
                    });
                }
            }
        }
    }
}

// =============================================================================
// Engine contract
// =============================================================================

/// Storage engine the sync core is written against.
///
/// Implementations must apply a [`WriteBatch`] atomically and deliver a
/// consistent snapshot before any incremental event on a fresh
/// subscription.
#[async_trait]
pub trait Store: Send + Sync + 'static {
    /// Reads the subtree at `path`, `None` if absent.
    async fn get(&self, path: &StorePath) -> Result<Option<Value>>;

    /// Applies `batch` as one atomic commit.
    async fn commit(&self, batch: WriteBatch) -> Result<()>;

    /// Opens a live feed over the subtree at `path`.
    async fn subscribe(&self, path: &StorePath) -> Result<StoreSubscription>;

    /// Mints a unique, time-ordered identifier.
    fn generate_id(&self) -> String;
}

/// Decodes a stored subtree into a typed record.
pub(crate) fn decode<T: DeserializeOwned>(path: &StorePath, value: Value) -> Result<T> {
    serde_json::from_value(value)
        .map_err(|e| Error::StoreUnavailable(format!("corrupt record at {path}: {e}")))
}

/// Encodes a typed record for storage.
pub(crate) fn encode<T: Serialize>(record: &T) -> Result<Value> {
    serde_json::to_value(record)
        .map_err(|e| Error::StoreUnavailable(format!("record not representable: {e}")))
}
