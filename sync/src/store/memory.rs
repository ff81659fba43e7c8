//! In-process store engine.
//!
//! One JSON tree behind a lock, a strictly monotonic millisecond clock
//! for server timestamps, and a broadcast bus fanning committed batches
//! out to subscriptions. Commits publish while still holding the write
//! lock, so a fresh subscription can never observe the same commit in
//! both its snapshot and its event stream.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use serde_json::{Map, Value};
use tokio::sync::{broadcast, RwLock};
use tracing::debug;
use uuid::Uuid;

use parlor_common::Result;

use super::{descend, Commit, Store, StorePath, StoreSubscription, WriteBatch, WriteOp};

/// Commits buffered per subscription before it is considered lagged.
const COMMIT_BUFFER: usize = 256;

const TIMESTAMP_SENTINEL_KEY: &str = ".sv";

pub struct MemoryStore {
    state: RwLock<TreeState>,
    commits: broadcast::Sender<Arc<Commit>>,
}

struct TreeState {
    root: Value,
    /// Timestamp of the previous commit, so ties advance instead of
    /// repeating.
    last_commit_ms: i64,
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryStore {
    #[must_use]
    pub fn new() -> Self {
        let (commits, _) = broadcast::channel(COMMIT_BUFFER);
        Self {
            state: RwLock::new(TreeState {
                root: Value::Object(Map::new()),
                last_commit_ms: 0,
            }),
            commits,
        }
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn get(&self, path: &StorePath) -> Result<Option<Value>> {
        let state = self.state.read().await;
        Ok(descend(&state.root, path).cloned())
    }

    async fn commit(&self, batch: WriteBatch) -> Result<()> {
        if batch.is_empty() {
            return Ok(());
        }
        let mut state = self.state.write().await;
        let now_ms = Utc::now()
            .timestamp_millis()
            .max(state.last_commit_ms + 1);
        state.last_commit_ms = now_ms;

        let mut resolved = Vec::with_capacity(batch.len());
        for op in batch.into_ops() {
            match op {
                WriteOp::Set { path, mut value } => {
                    resolve_timestamps(&mut value, now_ms);
                    if value.is_null() {
                        remove_at(&mut state.root, &path);
                        resolved.push((path, None));
                    } else {
                        write_at(&mut state.root, &path, value.clone());
                        resolved.push((path, Some(value)));
                    }
                }
                WriteOp::Delete { path } => {
                    remove_at(&mut state.root, &path);
                    resolved.push((path, None));
                }
                WriteOp::Increment { path, delta } => {
                    let current = descend(&state.root, &path)
                        .and_then(Value::as_i64)
                        .unwrap_or(0);
                    let next = current.saturating_add(delta);
                    write_at(&mut state.root, &path, Value::from(next));
                    resolved.push((path, Some(Value::from(next))));
                }
            }
        }
        if state.root.is_null() {
            state.root = Value::Object(Map::new());
        }
        debug!(ops = resolved.len(), commit_ms = now_ms, "committed batch");

        // Published before releasing the write lock; see module docs.
        let _ = self.commits.send(Arc::new(Commit { ops: resolved }));
        Ok(())
    }

    async fn subscribe(&self, path: &StorePath) -> Result<StoreSubscription> {
        let state = self.state.read().await;
        let receiver = self.commits.subscribe();
        let snapshot = descend(&state.root, path).cloned();
        Ok(StoreSubscription::new(path.clone(), snapshot, receiver))
    }

    fn generate_id(&self) -> String {
        Uuid::now_v7().to_string()
    }
}

/// Writes `value` at `path`, materializing intermediate objects.
fn write_at(root: &mut Value, path: &StorePath, value: Value) {
    let segments: Vec<&str> = path.segments().collect();
    write_segments(root, &segments, value);
}

fn write_segments(node: &mut Value, segments: &[&str], value: Value) {
    match segments {
        [] => *node = value,
        [head, rest @ ..] => {
            if !node.is_object() {
                *node = Value::Object(Map::new());
            }
            if let Value::Object(map) = node {
                let child = map.entry((*head).to_owned()).or_insert(Value::Null);
                write_segments(child, rest, value);
            }
        }
    }
}

/// Removes the subtree at `path`, pruning objects emptied on the way
/// back up. Missing paths are left untouched.
fn remove_at(root: &mut Value, path: &StorePath) {
    let segments: Vec<&str> = path.segments().collect();
    remove_segments(root, &segments);
}

/// Returns whether `node` should itself be pruned by its parent.
fn remove_segments(node: &mut Value, segments: &[&str]) -> bool {
    match segments {
        [] => {
            *node = Value::Null;
            true
        }
        [head, rest @ ..] => {
            if let Value::Object(map) = node {
                let prune = map
                    .get_mut(*head)
                    .is_some_and(|child| remove_segments(child, rest));
                if prune {
                    map.remove(*head);
                }
                map.is_empty()
            } else {
                false
            }
        }
    }
}

/// Replaces every `{".sv": "timestamp"}` marker with the commit clock.
fn resolve_timestamps(value: &mut Value, now_ms: i64) {
    if is_timestamp_sentinel(value) {
        *value = Value::from(now_ms);
        return;
    }
    match value {
        Value::Object(map) => {
            for child in map.values_mut() {
                resolve_timestamps(child, now_ms);
            }
        }
        Value::Array(items) => {
            for child in items.iter_mut() {
                resolve_timestamps(child, now_ms);
            }
        }
        _ => {}
    }
}

fn is_timestamp_sentinel(value: &Value) -> bool {
    value.as_object().is_some_and(|map| {
        map.len() == 1
            && map.get(TIMESTAMP_SENTINEL_KEY).and_then(Value::as_str) == Some("timestamp")
    })
}
