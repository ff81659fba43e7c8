//! Shared helpers for sync integration tests.
//!
//! Every test runs over a fresh in-memory store; building two clients
//! on the same store models two signed-in devices.
#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::time::timeout;

use parlor_common::{Attachment, Message, UserId};
use parlor_sync::chat::MessageStream;
use parlor_sync::social::RegisterProfile;
use parlor_sync::store::MemoryStore;
use parlor_sync::{Config, SyncClient};

/// Upper bound on waiting for async propagation in tests.
pub const EVENT_TIMEOUT: Duration = Duration::from_secs(2);

/// Install a test subscriber so `RUST_LOG` controls test output.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// A client over a fresh in-memory store.
pub fn fresh_client() -> (Arc<MemoryStore>, SyncClient) {
    init_tracing();
    let store = Arc::new(MemoryStore::new());
    let client = SyncClient::new(store.clone(), Config::default_for_test());
    (store, client)
}

/// Another client sharing `store`, as a second signed-in device.
pub fn client_on(store: &Arc<MemoryStore>) -> SyncClient {
    SyncClient::new(store.clone(), Config::default_for_test())
}

/// Sign in as `uid` and register a profile under `username`.
pub async fn register(client: &SyncClient, uid: &str, username: &str) -> UserId {
    let uid = UserId::from(uid);
    client.session().sign_in(uid.clone());
    client
        .social()
        .register_user(RegisterProfile {
            username: username.to_owned(),
            display_name: display_name_of(username),
            bio: None,
            avatar_ref: None,
        })
        .await
        .expect("Failed to register test profile");
    uid
}

/// "alice" becomes "Alice".
fn display_name_of(username: &str) -> String {
    let mut chars = username.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().collect::<String>() + chars.as_str(),
        None => String::new(),
    }
}

/// Wait until the watched value satisfies `check`, then return it.
pub async fn wait_until<T, F>(rx: &mut watch::Receiver<T>, mut check: F) -> T
where
    T: Clone,
    F: FnMut(&T) -> bool,
{
    timeout(EVENT_TIMEOUT, async {
        loop {
            if check(&rx.borrow()) {
                break;
            }
            rx.changed().await.expect("Watched channel closed");
        }
    })
    .await
    .expect("Timed out waiting for watched value");
    rx.borrow().clone()
}

/// Receive the next streamed message or panic after the event timeout.
pub async fn next_message(stream: &mut MessageStream) -> Message {
    timeout(EVENT_TIMEOUT, stream.next())
        .await
        .expect("Timed out waiting for a streamed message")
        .expect("Message stream ended unexpectedly")
}

/// An attachment with a valid name and url.
pub fn attachment(name: &str) -> Attachment {
    Attachment {
        name: name.to_owned(),
        url: format!("https://files.example/{name}"),
        mime_type: None,
    }
}
