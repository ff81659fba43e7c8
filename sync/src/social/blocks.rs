use serde_json::Value;
use tracing::info;

use parlor_common::{Error, Result, UserId};

use super::SocialGraph;
use crate::store::{paths, WriteBatch};

impl SocialGraph {
    /// Block a user.
    ///
    /// Writes the block under both mirror indexes and tears down any
    /// existing relationship with the target, friendship and pending
    /// requests in either direction, all in one batch.
    #[tracing::instrument(skip(self))]
    pub async fn block_user(&self, blocked: &UserId) -> Result<()> {
        let me = self.ctx.session.require_uid()?;

        // Cannot block yourself
        if &me == blocked {
            return Err(Error::invalid("cannot block yourself"));
        }

        // Check if user exists
        if self.store().get(&paths::user(blocked)).await?.is_none() {
            return Err(Error::NotFound("user"));
        }

        let were_friends = self.are_friends(&me, blocked).await?;

        let mut batch = WriteBatch::new();
        batch
            .set(paths::blocked_user(&me, blocked), Value::from(true))
            .set(paths::blocked_by(blocked, &me), Value::from(true))
            .delete(paths::friend_edge(&me, blocked))
            .delete(paths::friend_edge(blocked, &me))
            .delete(paths::friend_request(&me, blocked))
            .delete(paths::friend_request(blocked, &me));
        if were_friends {
            batch
                .increment(paths::user(&me).join("friends_count"), -1)
                .increment(paths::user(blocked).join("friends_count"), -1);
        }
        self.store().commit(batch).await?;

        info!(%me, %blocked, "user blocked");
        Ok(())
    }

    /// Unblock a user.
    ///
    /// Removes both mirror entries. Idempotent: unblocking someone who
    /// is not blocked is a no-op, and the dissolved friendship does not
    /// come back.
    #[tracing::instrument(skip(self))]
    pub async fn unblock_user(&self, blocked: &UserId) -> Result<()> {
        let me = self.ctx.session.require_uid()?;

        let mut batch = WriteBatch::new();
        batch
            .delete(paths::blocked_user(&me, blocked))
            .delete(paths::blocked_by(blocked, &me));
        self.store().commit(batch).await?;

        info!(%me, %blocked, "user unblocked");
        Ok(())
    }

    /// Whether a block exists between `a` and `b` in either direction.
    pub async fn is_blocked_either(&self, a: &UserId, b: &UserId) -> Result<bool> {
        if self
            .store()
            .get(&paths::blocked_user(a, b))
            .await?
            .is_some()
        {
            return Ok(true);
        }
        Ok(self
            .store()
            .get(&paths::blocked_user(b, a))
            .await?
            .is_some())
    }

    /// Uids the signed-in user has blocked, in stable order.
    pub async fn blocked_users(&self) -> Result<Vec<UserId>> {
        let me = self.ctx.session.require_uid()?;
        let index_path = paths::blocked_users(&me);
        let Some(index) = self.store().get(&index_path).await? else {
            return Ok(Vec::new());
        };
        let Some(entries) = index.as_object() else {
            return Err(Error::StoreUnavailable(format!(
                "corrupt record at {index_path}"
            )));
        };
        Ok(entries.keys().map(|uid| UserId::from(uid.as_str())).collect())
    }
}
