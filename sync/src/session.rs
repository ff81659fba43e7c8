//! Session Identity
//!
//! Tracks which user this client is acting as. Authentication itself
//! happens elsewhere; the sync core only consumes the resulting uid.
//! Identity changes are observable so live subscriptions can be torn
//! down and re-established against the new user.

use std::sync::Arc;

use tokio::sync::watch;
use tracing::info;

use parlor_common::{Error, Result, UserId};

/// Handle to the signed-in identity of one client.
///
/// Cloning shares the underlying state; every clone observes the same
/// sign-ins and sign-outs.
#[derive(Debug, Clone)]
pub struct Session {
    current: Arc<watch::Sender<Option<UserId>>>,
}

impl Default for Session {
    fn default() -> Self {
        Self::new()
    }
}

impl Session {
    /// A session with nobody signed in.
    #[must_use]
    pub fn new() -> Self {
        let (tx, _) = watch::channel(None);
        Self {
            current: Arc::new(tx),
        }
    }

    pub fn sign_in(&self, uid: UserId) {
        info!(%uid, "session signed in");
        self.current.send_replace(Some(uid));
    }

    pub fn sign_out(&self) {
        if let Some(uid) = self.current.send_replace(None) {
            info!(%uid, "session signed out");
        }
    }

    /// The signed-in uid, if any.
    #[must_use]
    pub fn current_uid(&self) -> Option<UserId> {
        self.current.borrow().clone()
    }

    /// The signed-in uid, or [`Error::Unauthenticated`].
    pub fn require_uid(&self) -> Result<UserId> {
        self.current_uid().ok_or(Error::Unauthenticated)
    }

    /// Watches identity changes. The receiver holds the current value
    /// immediately.
    #[must_use]
    pub fn watch(&self) -> watch::Receiver<Option<UserId>> {
        self.current.subscribe()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_sign_in_and_out() {
        let session = Session::new();
        assert!(session.current_uid().is_none());
        assert_eq!(session.require_uid(), Err(Error::Unauthenticated));

        session.sign_in(UserId::from("u1"));
        assert_eq!(session.require_uid().expect("signed in").as_str(), "u1");

        session.sign_out();
        assert!(session.current_uid().is_none());
    }

    #[tokio::test]
    async fn test_clones_share_identity() {
        let session = Session::new();
        let other = session.clone();
        session.sign_in(UserId::from("u1"));
        assert_eq!(other.current_uid(), Some(UserId::from("u1")));
    }

    #[tokio::test]
    async fn test_watch_observes_changes() {
        let session = Session::new();
        let mut rx = session.watch();
        assert!(rx.borrow().is_none());

        session.sign_in(UserId::from("u1"));
        rx.changed().await.expect("sender alive");
        assert_eq!(rx.borrow().clone(), Some(UserId::from("u1")));
    }
}
