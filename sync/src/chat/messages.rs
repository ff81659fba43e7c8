//! Message Streams
//!
//! Append-only message logs under each chat. Ordering comes solely
//! from store-assigned timestamps; client clocks never participate.
//! Messages are immutable once written.

use std::collections::HashSet;

use serde_json::Value;
use tokio::sync::mpsc;
use tracing::{debug, warn};

use parlor_common::{
    Attachment, Chat, ChatId, ChatKind, Error, Message, MessageId, Result, UserId, UserProfile,
    SYSTEM_SENDER,
};

use super::registry::ChatRegistry;
use crate::live::SubscriptionGuard;
use crate::store::{self, paths, server_timestamp, Store, StoreEvent, WriteBatch};
use crate::SyncContext;

/// Store-backed messaging operations for one client.
#[derive(Clone)]
pub struct Messages {
    ctx: SyncContext,
}

impl Messages {
    pub(crate) fn new(ctx: SyncContext) -> Self {
        Self { ctx }
    }

    fn store(&self) -> &dyn Store {
        self.ctx.store.as_ref()
    }

    /// Append a message to a chat as the signed-in user.
    ///
    /// The returned message carries the timestamp the store assigned at
    /// commit. Sending into a direct chat that has no record yet
    /// materializes the record in the same batch as the message; only
    /// the two participants may send into a direct chat.
    #[tracing::instrument(skip(self, content, attachments), fields(chat = %chat_id))]
    pub async fn send(
        &self,
        chat_id: &ChatId,
        content: &str,
        attachments: Vec<Attachment>,
    ) -> Result<Message> {
        let me = self.ctx.session.require_uid()?;

        let text = content.trim();
        if text.is_empty() && attachments.is_empty() {
            return Err(Error::invalid("message has no content"));
        }
        let max = self.ctx.config.max_message_len;
        if text.chars().count() > max {
            return Err(Error::invalid(format!("message exceeds {max} characters")));
        }
        for attachment in &attachments {
            if attachment.name.trim().is_empty() || attachment.url.trim().is_empty() {
                return Err(Error::invalid("attachment needs a name and a url"));
            }
        }

        let sender_path = paths::user(&me);
        let sender: UserProfile = {
            let value = self
                .store()
                .get(&sender_path)
                .await?
                .ok_or(Error::NotFound("user"))?;
            store::decode(&sender_path, value)?
        };

        let mut batch = WriteBatch::new();
        let chat_path = paths::chat(chat_id);
        match self.store().get(&chat_path).await? {
            Some(value) => {
                let chat: Chat = store::decode(&chat_path, value)?;
                if chat.kind == ChatKind::Dm && !chat.has_member(&me) {
                    return Err(Error::invalid("not a participant of this direct chat"));
                }
            }
            None => self.stage_direct_chat_record(&mut batch, chat_id, &me)?,
        }

        let message_id = MessageId::new(self.store().generate_id());
        let message = Message {
            id: message_id.clone(),
            chat_id: chat_id.clone(),
            sender_uid: me,
            sender_display_name: sender.display_name,
            avatar_ref: sender.avatar_ref,
            content: text.to_owned(),
            server_timestamp: 0,
            attachments,
        };
        let mut value = store::encode(&message)?;
        value["server_timestamp"] = server_timestamp();

        let message_path = paths::message(chat_id, &message_id);
        batch.set(message_path.clone(), value);
        self.store().commit(batch).await?;

        debug!(%message_id, "message appended");

        let written = self
            .store()
            .get(&message_path)
            .await?
            .ok_or(Error::NotFound("message"))?;
        store::decode(&message_path, written)
    }

    /// Stages the lazily created record of a direct chat.
    ///
    /// The record fields are written one path each rather than as a
    /// whole node, so two participants racing their first message both
    /// keep their messages.
    fn stage_direct_chat_record(
        &self,
        batch: &mut WriteBatch,
        chat_id: &ChatId,
        me: &UserId,
    ) -> Result<()> {
        let Some((a, b)) = ChatRegistry::parse_direct_chat_id(chat_id) else {
            return Err(Error::NotFound("chat"));
        };
        if &a != me && &b != me {
            return Err(Error::invalid("not a participant of this direct chat"));
        }

        let chat = Chat {
            chat_id: chat_id.clone(),
            kind: ChatKind::Dm,
            display_name: None,
            created_by: None,
            created_at: 0,
            members: [(a, true), (b, true)].into_iter().collect(),
        };
        let mut chat_value = store::encode(&chat)?;
        chat_value["created_at"] = server_timestamp();

        let chat_path = paths::chat(chat_id);
        if let Some(fields) = chat_value.as_object() {
            for (field, value) in fields {
                batch.set(chat_path.join(field), value.clone());
            }
        }
        Ok(())
    }

    /// Open a live feed over a chat's messages.
    ///
    /// Every existing message is delivered once, oldest first, then new
    /// appends as they commit. Deliveries are deduplicated by message
    /// id, so the replay after a transient store failure adds nothing.
    #[must_use]
    pub fn subscribe(&self, chat_id: &ChatId) -> MessageStream {
        let (tx, incoming) = mpsc::unbounded_channel();
        let mut seen: HashSet<MessageId> = HashSet::new();

        let guard = self
            .ctx
            .subs
            .subscribe(paths::messages(chat_id), move |event| {
                let arrivals = match event {
                    StoreEvent::Snapshot(value) => collect_sorted(value.as_ref()),
                    StoreEvent::Changed { path, value } if path.is_root() => {
                        collect_sorted(value.as_ref())
                    }
                    StoreEvent::Changed { path, value } => {
                        // One entry changed. Only whole-record appends
                        // matter; messages are never edited or removed.
                        let mut segments = path.segments();
                        let (Some(_), None) = (segments.next(), segments.next()) else {
                            return;
                        };
                        let Some(value) = value else { return };
                        match serde_json::from_value::<Message>(value) {
                            Ok(message) => vec![message],
                            Err(e) => {
                                warn!(%path, "skipping unreadable message: {e}");
                                return;
                            }
                        }
                    }
                };
                for message in arrivals {
                    if seen.insert(message.id.clone()) && tx.send(message).is_err() {
                        return;
                    }
                }
            });

        MessageStream { guard, incoming }
    }

    /// A page of history, oldest first.
    ///
    /// With `before` set, only messages strictly older are returned;
    /// the page holds the newest `limit` of what remains, clamped to
    /// the configured maximum.
    pub async fn history(
        &self,
        chat_id: &ChatId,
        before: Option<i64>,
        limit: usize,
    ) -> Result<Vec<Message>> {
        let limit = limit.clamp(1, self.ctx.config.history_page_max);
        let subtree = self.store().get(&paths::messages(chat_id)).await?;
        let mut messages = collect_sorted(subtree.as_ref());
        if let Some(cutoff) = before {
            messages.retain(|m| m.server_timestamp < cutoff);
        }
        if messages.len() > limit {
            messages.drain(..messages.len() - limit);
        }
        Ok(messages)
    }
}

/// Stages a synthetic system message into `batch`.
pub(crate) fn stage_system_message(
    store: &dyn Store,
    batch: &mut WriteBatch,
    chat_id: &ChatId,
    content: String,
) -> Result<()> {
    let message_id = MessageId::new(store.generate_id());
    let message = Message {
        id: message_id.clone(),
        chat_id: chat_id.clone(),
        sender_uid: UserId::from(SYSTEM_SENDER),
        sender_display_name: "System".to_owned(),
        avatar_ref: None,
        content,
        server_timestamp: 0,
        attachments: Vec::new(),
    };
    let mut value = store::encode(&message)?;
    value["server_timestamp"] = server_timestamp();
    batch.set(paths::message(chat_id, &message_id), value);
    Ok(())
}

/// Decodes a message subtree into timestamp order, skipping entries
/// that fail to parse.
fn collect_sorted(value: Option<&Value>) -> Vec<Message> {
    let Some(entries) = value.and_then(Value::as_object) else {
        return Vec::new();
    };
    let mut messages = Vec::with_capacity(entries.len());
    for (id, entry) in entries {
        match serde_json::from_value::<Message>(entry.clone()) {
            Ok(message) => messages.push(message),
            Err(e) => warn!(%id, "skipping unreadable message: {e}"),
        }
    }
    messages.sort_by(|a, b| {
        a.server_timestamp
            .cmp(&b.server_timestamp)
            .then_with(|| a.id.cmp(&b.id))
    });
    messages
}

/// Live message feed for one chat.
pub struct MessageStream {
    guard: SubscriptionGuard,
    incoming: mpsc::UnboundedReceiver<Message>,
}

impl MessageStream {
    /// Next message, or `None` once the stream has detached and
    /// drained.
    pub async fn next(&mut self) -> Option<Message> {
        self.incoming.recv().await
    }

    /// Stops delivery. Messages committed after this returns never
    /// appear; anything already queued still drains.
    pub fn detach(&self) {
        self.guard.cancel();
    }
}

impl futures::Stream for MessageStream {
    type Item = Message;

    fn poll_next(
        mut self: std::pin::Pin<&mut Self>,
        cx: &mut std::task::Context<'_>,
    ) -> std::task::Poll<Option<Message>> {
        self.incoming.poll_recv(cx)
    }
}
