use std::collections::BTreeSet;
use std::sync::LazyLock;

use serde_json::Value;
use tokio::sync::watch;
use tracing::{info, warn};
use validator::Validate;

use parlor_common::{Error, FriendRequest, RequestStatus, Result, UserId, UserProfile};

use super::types::{ProfileUpdate, RegisterProfile};
use super::SocialGraph;
use crate::live::SubscriptionGuard;
use crate::store::{self, paths, server_timestamp, Store, StoreEvent, WriteBatch};

/// Username validation pattern, applied after lowercasing.
static USERNAME_REGEX: LazyLock<regex::Regex> =
    LazyLock::new(|| regex::Regex::new(r"^[a-z0-9_]{3,32}$").expect("valid regex"));

/// Name color pattern (`#rrggbb`).
static HEX_COLOR_REGEX: LazyLock<regex::Regex> =
    LazyLock::new(|| regex::Regex::new(r"^#[0-9a-fA-F]{6}$").expect("valid regex"));

impl SocialGraph {
    pub(super) fn store(&self) -> &dyn Store {
        self.ctx.store.as_ref()
    }

    // ========================================================================
    // Profiles
    // ========================================================================

    /// Create the signed-in user's profile.
    ///
    /// The profile and the `usernames` reverse index entry are written
    /// in one batch, so a username can never point at a missing profile.
    #[tracing::instrument(skip(self, profile))]
    pub async fn register_user(&self, profile: RegisterProfile) -> Result<UserProfile> {
        let uid = self.ctx.session.require_uid()?;
        profile
            .validate()
            .map_err(|e| Error::invalid(e.to_string()))?;

        let username = profile.username.trim().to_lowercase();
        if !USERNAME_REGEX.is_match(&username) {
            return Err(Error::invalid(
                "username must be 3-32 characters of a-z, 0-9 or _",
            ));
        }

        if self.store().get(&paths::user(&uid)).await?.is_some() {
            return Err(Error::conflict("profile already registered"));
        }
        if let Some(owner) = self.store().get(&paths::username(&username)).await? {
            if owner.as_str() != Some(uid.as_str()) {
                return Err(Error::conflict("username already taken"));
            }
        }

        let record = UserProfile {
            uid: uid.clone(),
            username: username.clone(),
            display_name: profile.display_name.trim().to_owned(),
            avatar_ref: profile.avatar_ref,
            bio: profile.bio.unwrap_or_default(),
            title: None,
            name_color: None,
            friends_count: 0,
        };

        let mut batch = WriteBatch::new();
        batch
            .set(paths::user(&uid), store::encode(&record)?)
            .set(paths::username(&username), Value::from(uid.as_str()));
        self.store().commit(batch).await?;

        info!(%uid, username, "user registered");
        Ok(record)
    }

    /// Update fields of the signed-in user's profile.
    ///
    /// Writes each changed field at its own path, so concurrent editors
    /// interleave per field instead of clobbering whole records.
    #[tracing::instrument(skip(self, update))]
    pub async fn update_profile(&self, update: ProfileUpdate) -> Result<UserProfile> {
        let uid = self.ctx.session.require_uid()?;
        update
            .validate()
            .map_err(|e| Error::invalid(e.to_string()))?;
        if update.is_empty() {
            return Err(Error::invalid("update carries no fields"));
        }
        if let Some(color) = &update.name_color {
            if !HEX_COLOR_REGEX.is_match(color) {
                return Err(Error::invalid("name_color must look like #a1b2c3"));
            }
        }

        let user_path = paths::user(&uid);
        if self.store().get(&user_path).await?.is_none() {
            return Err(Error::NotFound("user"));
        }

        let mut batch = WriteBatch::new();
        if let Some(display_name) = &update.display_name {
            batch.set(
                user_path.join("display_name"),
                Value::from(display_name.trim()),
            );
        }
        if let Some(bio) = &update.bio {
            batch.set(user_path.join("bio"), Value::from(bio.as_str()));
        }
        if let Some(avatar_ref) = &update.avatar_ref {
            batch.set(user_path.join("avatar_ref"), Value::from(avatar_ref.as_str()));
        }
        if let Some(title) = &update.title {
            batch.set(user_path.join("title"), Value::from(title.as_str()));
        }
        if let Some(color) = &update.name_color {
            batch.set(user_path.join("name_color"), Value::from(color.as_str()));
        }
        self.store().commit(batch).await?;
        info!(%uid, "profile updated");

        self.profile(&uid).await
    }

    /// Fetch a user's profile.
    pub async fn profile(&self, uid: &UserId) -> Result<UserProfile> {
        let value = self
            .store()
            .get(&paths::user(uid))
            .await?
            .ok_or(Error::NotFound("user"))?;
        store::decode(&paths::user(uid), value)
    }

    /// Resolve a username (case-insensitive) to its profile.
    pub async fn find_by_username(&self, username: &str) -> Result<UserProfile> {
        let key = username.trim().to_lowercase();
        let owner = self
            .store()
            .get(&paths::username(&key))
            .await?
            .ok_or(Error::NotFound("user"))?;
        let uid = owner
            .as_str()
            .map(UserId::from)
            .ok_or_else(|| Error::StoreUnavailable("corrupt username index".to_owned()))?;
        self.profile(&uid).await
    }

    // ========================================================================
    // Friend Requests
    // ========================================================================

    /// Send a friend request from the signed-in user.
    #[tracing::instrument(skip(self))]
    pub async fn send_friend_request(&self, to: &UserId) -> Result<FriendRequest> {
        let from = self.ctx.session.require_uid()?;

        // Cannot friend yourself
        if &from == to {
            return Err(Error::invalid("cannot send a friend request to yourself"));
        }

        // Target must exist
        if self.store().get(&paths::user(to)).await?.is_none() {
            return Err(Error::NotFound("user"));
        }

        // Check block in either direction
        if self.is_blocked_either(&from, to).await? {
            return Err(Error::Blocked);
        }

        // Already friends?
        if self.are_friends(&from, to).await? {
            return Err(Error::conflict("already friends"));
        }

        // Already pending from this sender?
        let request_path = paths::friend_request(to, &from);
        if self.store().get(&request_path).await?.is_some() {
            return Err(Error::conflict("friend request already pending"));
        }

        let sender = self.profile(&from).await?;
        let request = FriendRequest {
            from_uid: from.clone(),
            to_uid: to.clone(),
            sender_username: sender.username,
            timestamp: 0,
            status: RequestStatus::Pending,
        };
        let mut value = store::encode(&request)?;
        value["timestamp"] = server_timestamp();

        let mut batch = WriteBatch::new();
        batch.set(request_path.clone(), value);
        self.store().commit(batch).await?;

        info!(%from, %to, "friend request sent");

        let written = self
            .store()
            .get(&request_path)
            .await?
            .ok_or(Error::NotFound("friend request"))?;
        store::decode(&request_path, written)
    }

    /// Withdraw a request the signed-in user sent earlier.
    #[tracing::instrument(skip(self))]
    pub async fn cancel_friend_request(&self, to: &UserId) -> Result<()> {
        let from = self.ctx.session.require_uid()?;
        let request_path = paths::friend_request(to, &from);
        if self.store().get(&request_path).await?.is_none() {
            return Err(Error::NotFound("friend request"));
        }

        let mut batch = WriteBatch::new();
        batch.delete(request_path);
        self.store().commit(batch).await?;

        info!(%from, %to, "friend request cancelled");
        Ok(())
    }

    /// Accept or decline a request addressed to the signed-in user.
    ///
    /// Acceptance promotes the request to a mirrored edge pair, bumps
    /// both friend counters and removes the request, all in one batch.
    /// Decline just removes the request.
    #[tracing::instrument(skip(self))]
    pub async fn respond_to_request(&self, from: &UserId, accept: bool) -> Result<()> {
        let to = self.ctx.session.require_uid()?;
        let request_path = paths::friend_request(&to, from);
        if self.store().get(&request_path).await?.is_none() {
            return Err(Error::NotFound("friend request"));
        }

        let mut batch = WriteBatch::new();
        if accept {
            batch
                .set(paths::friend_edge(&to, from), Value::from(true))
                .set(paths::friend_edge(from, &to), Value::from(true))
                .increment(paths::user(&to).join("friends_count"), 1)
                .increment(paths::user(from).join("friends_count"), 1);
        }
        batch.delete(request_path);
        self.store().commit(batch).await?;

        if accept {
            info!(%from, %to, "friend request accepted");
        } else {
            info!(%from, %to, "friend request declined");
        }
        Ok(())
    }

    /// Requests currently pending for `uid`, newest first.
    pub async fn pending_requests(&self, uid: &UserId) -> Result<Vec<FriendRequest>> {
        let inbox_path = paths::friend_requests(uid);
        let Some(inbox) = self.store().get(&inbox_path).await? else {
            return Ok(Vec::new());
        };
        let Some(entries) = inbox.as_object() else {
            return Err(Error::StoreUnavailable(format!(
                "corrupt record at {inbox_path}"
            )));
        };

        let mut requests: Vec<FriendRequest> = Vec::with_capacity(entries.len());
        for (from, entry) in entries {
            match store::decode(&inbox_path.join(from), entry.clone()) {
                Ok(request) => requests.push(request),
                Err(e) => warn!(%uid, %from, "skipping unreadable friend request: {e}"),
            }
        }
        requests.sort_by(|a, b| {
            b.timestamp
                .cmp(&a.timestamp)
                .then_with(|| a.from_uid.cmp(&b.from_uid))
        });
        Ok(requests)
    }

    // ========================================================================
    // Friend Edges
    // ========================================================================

    /// Whether `a` and `b` are friends. The edge pair is mirrored, so
    /// one side answers for both.
    pub async fn are_friends(&self, a: &UserId, b: &UserId) -> Result<bool> {
        Ok(self
            .store()
            .get(&paths::friend_edge(a, b))
            .await?
            .and_then(|v| v.as_bool())
            .unwrap_or(false))
    }

    /// Uids of everyone `uid` is friends with, in stable order.
    pub async fn friends_of(&self, uid: &UserId) -> Result<Vec<UserId>> {
        let Some(edges) = self.store().get(&paths::friends(uid)).await? else {
            return Ok(Vec::new());
        };
        let Some(entries) = edges.as_object() else {
            return Err(Error::StoreUnavailable(format!(
                "corrupt record at {}",
                paths::friends(uid)
            )));
        };
        Ok(entries
            .iter()
            .filter(|(_, marker)| marker.as_bool().unwrap_or(false))
            .map(|(other, _)| UserId::from(other.as_str()))
            .collect())
    }

    /// Full profiles of `uid`'s friends, ordered by username.
    ///
    /// Friends whose profile cannot be read are skipped rather than
    /// failing the whole listing.
    pub async fn friend_profiles(&self, uid: &UserId) -> Result<Vec<UserProfile>> {
        let mut profiles = Vec::new();
        for other in self.friends_of(uid).await? {
            match self.profile(&other).await {
                Ok(profile) => profiles.push(profile),
                Err(Error::NotFound(_)) => {
                    warn!(%uid, friend = %other, "friend has no profile, skipping");
                }
                Err(e) => return Err(e),
            }
        }
        profiles.sort_by(|a, b| a.username.cmp(&b.username));
        Ok(profiles)
    }

    /// Dissolve an accepted friendship between the signed-in user and
    /// `other`. Both edges and both counters change in one batch.
    #[tracing::instrument(skip(self))]
    pub async fn remove_friend(&self, other: &UserId) -> Result<()> {
        let me = self.ctx.session.require_uid()?;
        if !self.are_friends(&me, other).await? {
            return Err(Error::NotFound("friendship"));
        }

        let mut batch = WriteBatch::new();
        batch
            .delete(paths::friend_edge(&me, other))
            .delete(paths::friend_edge(other, &me))
            .increment(paths::user(&me).join("friends_count"), -1)
            .increment(paths::user(other).join("friends_count"), -1);
        self.store().commit(batch).await?;

        info!(%me, %other, "friendship removed");
        Ok(())
    }

    /// Live view of the signed-in user's friend list.
    ///
    /// The receiver starts from the current list and tracks edge adds
    /// and removals; cancelling the guard freezes it.
    pub fn watch_friends(
        &self,
    ) -> Result<(SubscriptionGuard, watch::Receiver<Vec<UserId>>)> {
        let me = self.ctx.session.require_uid()?;
        let (tx, rx) = watch::channel(Vec::new());
        let mut friends: BTreeSet<UserId> = BTreeSet::new();

        let guard = self
            .ctx
            .subs
            .subscribe(paths::friends(&me), move |event| {
                match event {
                    StoreEvent::Snapshot(value) => {
                        friends = collect_edges(value.as_ref());
                    }
                    StoreEvent::Changed { path, value } if path.is_root() => {
                        friends = collect_edges(value.as_ref());
                    }
                    StoreEvent::Changed { path, value } => {
                        let Some(other) = path.segments().next().map(UserId::from) else {
                            return;
                        };
                        match value.as_ref().and_then(Value::as_bool) {
                            Some(true) => {
                                friends.insert(other);
                            }
                            _ => {
                                friends.remove(&other);
                            }
                        }
                    }
                }
                let _ = tx.send(friends.iter().cloned().collect());
            });

        Ok((guard, rx))
    }
}

/// Extracts the friend uids out of a `friends/{uid}` subtree.
fn collect_edges(value: Option<&Value>) -> BTreeSet<UserId> {
    value
        .and_then(Value::as_object)
        .map(|entries| {
            entries
                .iter()
                .filter(|(_, marker)| marker.as_bool().unwrap_or(false))
                .map(|(other, _)| UserId::from(other.as_str()))
                .collect()
        })
        .unwrap_or_default()
}
