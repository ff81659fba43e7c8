//! Chat Registry
//!
//! Creation and lookup of conversation contexts. Direct chats derive a
//! deterministic id from the participant pair, so both sides address
//! the same record without coordination; group and team chats get
//! generated ids at creation time.

use std::collections::BTreeMap;

use chrono::Utc;
use serde_json::Value;
use tracing::info;
use validator::Validate;

use parlor_common::{Chat, ChatId, ChatKind, Error, Result, UserId, UserProfile};

use super::messages;
use crate::store::{self, paths, Store, WriteBatch};
use crate::SyncContext;

/// Id of the well-known chat every user can read and write.
pub const GLOBAL_CHAT_ID: &str = "global";

/// Prefix of derived direct chat ids.
///
/// Participant uids are assumed not to contain `_` or `/`, which holds
/// for ids handed out by the identity provider.
const DM_PREFIX: &str = "dm";

/// Parameters for creating a party or team chat.
#[derive(Debug, Clone, Validate)]
pub struct NewGroupChat {
    #[validate(length(min = 1, max = 100))]
    pub name: String,
    /// Members beside the creator, who is always included.
    pub members: Vec<UserId>,
}

/// Store-backed chat directory for one client.
#[derive(Clone)]
pub struct ChatRegistry {
    ctx: SyncContext,
}

impl ChatRegistry {
    pub(crate) fn new(ctx: SyncContext) -> Self {
        Self { ctx }
    }

    fn store(&self) -> &dyn Store {
        self.ctx.store.as_ref()
    }

    // ========================================================================
    // Direct Chats
    // ========================================================================

    /// Deterministic id of the direct chat between `a` and `b`.
    ///
    /// Symmetric: both participants derive the same id with no lookup
    /// or coordination.
    #[must_use]
    pub fn direct_chat_id(a: &UserId, b: &UserId) -> ChatId {
        let (lo, hi) = if a.as_str() <= b.as_str() {
            (a, b)
        } else {
            (b, a)
        };
        ChatId::new(format!("{DM_PREFIX}_{lo}_{hi}"))
    }

    /// Id of the direct chat between the signed-in user and `other`.
    ///
    /// Nothing is written; the chat record materializes with the first
    /// message sent into it.
    pub fn direct_chat_with(&self, other: &UserId) -> Result<ChatId> {
        let me = self.ctx.session.require_uid()?;
        Ok(Self::direct_chat_id(&me, other))
    }

    /// Splits a derived direct chat id back into its participant pair.
    pub(crate) fn parse_direct_chat_id(chat_id: &ChatId) -> Option<(UserId, UserId)> {
        let rest = chat_id
            .as_str()
            .strip_prefix(DM_PREFIX)?
            .strip_prefix('_')?;
        let mut parts = rest.split('_');
        match (parts.next(), parts.next(), parts.next()) {
            (Some(a), Some(b), None) if !a.is_empty() && !b.is_empty() => {
                Some((UserId::from(a), UserId::from(b)))
            }
            _ => None,
        }
    }

    // ========================================================================
    // Group / Team Chats
    // ========================================================================

    /// Create a named group chat owned by the signed-in user.
    ///
    /// The chat record and a synthetic announcement message land in one
    /// batch, so no subscriber ever sees the chat without its first
    /// entry.
    #[tracing::instrument(skip(self, params), fields(name = %params.name))]
    pub async fn create_group_chat(&self, params: NewGroupChat) -> Result<Chat> {
        let name = validated_name(&params)?;
        let chat_id = ChatId::new(format!(
            "{}-{}",
            slugify(&name),
            Utc::now().timestamp_millis()
        ));
        self.create_chat(chat_id, ChatKind::Party, &name, &params.members)
            .await
    }

    /// Create a team chat with a store-assigned id.
    #[tracing::instrument(skip(self, params), fields(name = %params.name))]
    pub async fn create_team_chat(&self, params: NewGroupChat) -> Result<Chat> {
        let name = validated_name(&params)?;
        let chat_id = ChatId::new(self.store().generate_id());
        self.create_chat(chat_id, ChatKind::Team, &name, &params.members)
            .await
    }

    async fn create_chat(
        &self,
        chat_id: ChatId,
        kind: ChatKind,
        name: &str,
        members: &[UserId],
    ) -> Result<Chat> {
        let me = self.ctx.session.require_uid()?;
        let creator_path = paths::user(&me);
        let creator: UserProfile = {
            let value = self
                .store()
                .get(&creator_path)
                .await?
                .ok_or(Error::NotFound("user"))?;
            store::decode(&creator_path, value)?
        };

        let mut membership: BTreeMap<UserId, bool> = BTreeMap::new();
        membership.insert(me.clone(), true);
        for member in members {
            membership.insert(member.clone(), true);
        }

        let chat = Chat {
            chat_id: chat_id.clone(),
            kind,
            display_name: Some(name.to_owned()),
            created_by: Some(me.clone()),
            created_at: 0,
            members: membership,
        };
        let mut chat_value = store::encode(&chat)?;
        chat_value["created_at"] = store::server_timestamp();

        let chat_path = paths::chat(&chat_id);
        let mut batch = WriteBatch::new();
        batch.set(chat_path.clone(), chat_value);
        messages::stage_system_message(
            self.store(),
            &mut batch,
            &chat_id,
            format!("{name} created by {}", creator.display_name),
        )?;
        self.store().commit(batch).await?;

        info!(%chat_id, ?kind, members = chat.members.len(), "chat created");

        let written = self
            .store()
            .get(&chat_path)
            .await?
            .ok_or(Error::NotFound("chat"))?;
        store::decode(&chat_path, written)
    }

    // ========================================================================
    // Global Chat
    // ========================================================================

    /// Fetch the global chat, creating it on first use.
    pub async fn ensure_global_chat(&self) -> Result<Chat> {
        let chat_id = ChatId::from(GLOBAL_CHAT_ID);
        let chat_path = paths::chat(&chat_id);
        if let Some(value) = self.store().get(&chat_path).await? {
            return store::decode(&chat_path, value);
        }

        // The global chat has no membership list; everyone may read and
        // write it.
        let chat = Chat {
            chat_id: chat_id.clone(),
            kind: ChatKind::Global,
            display_name: Some("Global".to_owned()),
            created_by: None,
            created_at: 0,
            members: BTreeMap::new(),
        };
        let mut chat_value = store::encode(&chat)?;
        chat_value["created_at"] = store::server_timestamp();

        let mut batch = WriteBatch::new();
        batch.set(chat_path.clone(), chat_value);
        messages::stage_system_message(
            self.store(),
            &mut batch,
            &chat_id,
            "Welcome to Parlor".to_owned(),
        )?;
        self.store().commit(batch).await?;

        info!("global chat created");

        let written = self
            .store()
            .get(&chat_path)
            .await?
            .ok_or(Error::NotFound("chat"))?;
        store::decode(&chat_path, written)
    }

    // ========================================================================
    // Lookup / Membership
    // ========================================================================

    /// Fetch a chat record.
    pub async fn chat(&self, chat_id: &ChatId) -> Result<Chat> {
        let chat_path = paths::chat(chat_id);
        let value = self
            .store()
            .get(&chat_path)
            .await?
            .ok_or(Error::NotFound("chat"))?;
        store::decode(&chat_path, value)
    }

    /// Add `uid` to a party or team chat. Membership only ever grows;
    /// adding an existing member is a no-op.
    #[tracing::instrument(skip(self))]
    pub async fn add_member(&self, chat_id: &ChatId, uid: &UserId) -> Result<()> {
        self.ctx.session.require_uid()?;
        let chat = self.chat(chat_id).await?;
        match chat.kind {
            ChatKind::Party | ChatKind::Team => {}
            ChatKind::Global => {
                return Err(Error::invalid("the global chat has no membership list"));
            }
            ChatKind::Dm => {
                return Err(Error::invalid(
                    "direct chats have a fixed participant pair",
                ));
            }
        }

        let mut batch = WriteBatch::new();
        batch.set(paths::chat_member(chat_id, uid), Value::from(true));
        self.store().commit(batch).await?;

        info!(%chat_id, %uid, "member added");
        Ok(())
    }
}

fn validated_name(params: &NewGroupChat) -> Result<String> {
    params
        .validate()
        .map_err(|e| Error::invalid(e.to_string()))?;
    let name = params.name.trim();
    if name.is_empty() {
        return Err(Error::invalid("chat name must not be empty"));
    }
    Ok(name.to_owned())
}

/// Lowercases and reduces a display name to `[a-z0-9-]` for use as an
/// id stem.
fn slugify(name: &str) -> String {
    let mut slug = String::with_capacity(name.len());
    let mut last_dash = true;
    for c in name.to_lowercase().chars() {
        if c.is_ascii_alphanumeric() {
            slug.push(c);
            last_dash = false;
        } else if !last_dash {
            slug.push('-');
            last_dash = true;
        }
    }
    while slug.ends_with('-') {
        slug.pop();
    }
    if slug.is_empty() {
        slug.push_str("chat");
    }
    slug
}
