//! Notification Aggregator
//!
//! Derived projection of upstream state into a renderable notification
//! list. Nothing here is persisted: the list is rebuilt from the
//! signed-in user's pending friend requests on every upstream change,
//! and read-state lives only in this session. A request that
//! disappears upstream leaves the list on its own, read or not.

use std::collections::HashSet;
use std::sync::{Arc, Mutex};

use serde_json::Value;
use tokio::sync::watch;
use tracing::warn;

use parlor_common::{FriendRequest, Notification, NotificationKind, Result};

use crate::live::SubscriptionGuard;
use crate::store::{paths, StoreEvent};
use crate::SyncContext;

/// Builds live notification feeds for the signed-in user.
#[derive(Clone)]
pub struct Notifications {
    ctx: SyncContext,
}

impl Notifications {
    pub(crate) fn new(ctx: SyncContext) -> Self {
        Self { ctx }
    }

    /// Open a live feed over the signed-in user's notifications.
    ///
    /// The feed starts empty and fills once the request snapshot
    /// arrives; it then tracks every upstream add and removal until
    /// detached.
    pub fn subscribe(&self) -> Result<NotificationFeed> {
        let uid = self.ctx.session.require_uid()?;

        let state = Arc::new(Mutex::new(FeedState::default()));
        let (sender, receiver) = watch::channel(Vec::new());
        let sender = Arc::new(sender);

        let pump_state = state.clone();
        let pump_sender = sender.clone();
        let guard = self
            .ctx
            .subs
            .subscribe(paths::friend_requests(&uid), move |event| {
                if let Ok(mut state) = pump_state.lock() {
                    state.apply(event);
                    let _ = pump_sender.send(state.project());
                }
            });

        Ok(NotificationFeed {
            guard,
            state,
            sender,
            receiver,
        })
    }
}

/// Live, session-local notification list.
///
/// Read-state is held here and nowhere else: marking a notification
/// read changes what this feed reports, not what the store holds.
pub struct NotificationFeed {
    guard: SubscriptionGuard,
    state: Arc<Mutex<FeedState>>,
    sender: Arc<watch::Sender<Vec<Notification>>>,
    receiver: watch::Receiver<Vec<Notification>>,
}

impl NotificationFeed {
    /// Current list, newest first.
    #[must_use]
    pub fn current(&self) -> Vec<Notification> {
        self.receiver.borrow().clone()
    }

    /// How many entries are unread.
    #[must_use]
    pub fn unread_count(&self) -> usize {
        self.receiver.borrow().iter().filter(|n| !n.read).count()
    }

    /// A receiver for awaiting projection changes.
    #[must_use]
    pub fn watch(&self) -> watch::Receiver<Vec<Notification>> {
        self.receiver.clone()
    }

    /// Mark one notification read. It stays in the list but leaves the
    /// unread count. Unknown ids are ignored.
    pub fn mark_read(&self, id: &str) {
        if let Ok(mut state) = self.state.lock() {
            if state.requests.iter().any(|r| r.from_uid.as_str() == id)
                && state.acked.insert(id.to_owned())
            {
                let _ = self.sender.send(state.project());
            }
        }
    }

    /// Mark everything currently listed as read.
    pub fn mark_all_read(&self) {
        if let Ok(mut state) = self.state.lock() {
            let mut changed = false;
            let ids: Vec<String> = state
                .requests
                .iter()
                .map(|r| r.from_uid.as_str().to_owned())
                .collect();
            for id in ids {
                changed |= state.acked.insert(id);
            }
            if changed {
                let _ = self.sender.send(state.project());
            }
        }
    }

    /// Stops updates; the last published list stays readable.
    pub fn detach(&self) {
        self.guard.cancel();
    }
}

#[derive(Default)]
struct FeedState {
    requests: Vec<FriendRequest>,
    acked: HashSet<String>,
}

impl FeedState {
    fn apply(&mut self, event: StoreEvent) {
        match event {
            StoreEvent::Snapshot(value) => {
                self.requests = collect_requests(value.as_ref());
            }
            StoreEvent::Changed { path, value } if path.is_root() => {
                self.requests = collect_requests(value.as_ref());
            }
            StoreEvent::Changed { path, value } => {
                let mut segments = path.segments();
                let (Some(from), None) = (segments.next(), segments.next()) else {
                    return;
                };
                self.requests.retain(|r| r.from_uid.as_str() != from);
                if let Some(value) = value {
                    match serde_json::from_value::<FriendRequest>(value) {
                        Ok(request) => self.requests.push(request),
                        Err(e) => warn!(%from, "skipping unreadable friend request: {e}"),
                    }
                }
            }
        }
        // Read-state follows the upstream list: a request that is
        // withdrawn and later re-sent counts as unread again.
        let requests = &self.requests;
        self.acked
            .retain(|id| requests.iter().any(|r| r.from_uid.as_str() == id));
    }

    fn project(&self) -> Vec<Notification> {
        project(&self.requests, &self.acked)
    }
}

fn collect_requests(value: Option<&Value>) -> Vec<FriendRequest> {
    let Some(entries) = value.and_then(Value::as_object) else {
        return Vec::new();
    };
    let mut requests = Vec::with_capacity(entries.len());
    for (from, entry) in entries {
        match serde_json::from_value::<FriendRequest>(entry.clone()) {
            Ok(request) => requests.push(request),
            Err(e) => warn!(%from, "skipping unreadable friend request: {e}"),
        }
    }
    requests
}

/// Pure projection: one notification per pending request, newest first,
/// ties broken by id so the order is stable.
fn project(requests: &[FriendRequest], acked: &HashSet<String>) -> Vec<Notification> {
    let mut notifications: Vec<Notification> = requests
        .iter()
        .map(|request| Notification {
            id: request.from_uid.as_str().to_owned(),
            kind: NotificationKind::FriendRequest,
            title: "Friend request".to_owned(),
            description: format!("{} sent you a friend request", request.sender_username),
            timestamp: request.timestamp,
            link: Some(format!("/users/{}", request.from_uid)),
            read: acked.contains(request.from_uid.as_str()),
        })
        .collect();
    notifications.sort_by(|a, b| b.timestamp.cmp(&a.timestamp).then_with(|| a.id.cmp(&b.id)));
    notifications
}

#[cfg(test)]
mod tests {
    use super::*;
    use parlor_common::{RequestStatus, UserId};

    fn request(from: &str, timestamp: i64) -> FriendRequest {
        FriendRequest {
            from_uid: UserId::from(from),
            to_uid: UserId::from("me"),
            sender_username: from.to_owned(),
            timestamp,
            status: RequestStatus::Pending,
        }
    }

    #[test]
    fn test_projection_orders_newest_first_with_stable_ties() {
        let requests = vec![request("u1", 100), request("u3", 200), request("u2", 200)];
        let projected = project(&requests, &HashSet::new());
        let ids: Vec<&str> = projected.iter().map(|n| n.id.as_str()).collect();
        assert_eq!(ids, vec!["u2", "u3", "u1"]);
        assert!(projected.iter().all(|n| !n.read));
    }

    #[test]
    fn test_projection_keeps_read_entries_listed() {
        let requests = vec![request("u1", 100), request("u2", 200)];
        let acked: HashSet<String> = ["u1".to_owned()].into_iter().collect();
        let projected = project(&requests, &acked);
        assert_eq!(projected.len(), 2);
        let read: Vec<bool> = projected.iter().map(|n| n.read).collect();
        assert_eq!(read, vec![false, true]);
    }

    #[test]
    fn test_apply_prunes_read_state_of_withdrawn_requests() {
        let mut state = FeedState::default();
        state.apply(StoreEvent::Snapshot(Some(serde_json::json!({
            "u1": serde_json::to_value(request("u1", 100)).expect("encode"),
        }))));
        state.acked.insert("u1".to_owned());

        // Withdrawal removes the entry and forgets its read marker.
        state.apply(StoreEvent::Changed {
            path: crate::store::StorePath::new("u1"),
            value: None,
        });
        assert!(state.requests.is_empty());
        assert!(state.acked.is_empty());

        // A re-sent request projects unread.
        state.apply(StoreEvent::Changed {
            path: crate::store::StorePath::new("u1"),
            value: Some(serde_json::to_value(request("u1", 300)).expect("encode")),
        });
        let projected = state.project();
        assert_eq!(projected.len(), 1);
        assert!(!projected[0].read);
    }
}
