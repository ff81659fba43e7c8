//! Store Engine Tests
//!
//! Exercises the in-process engine: atomic batches, the timestamp
//! sentinel, pruning deletes, and subscription delivery.

#[cfg(test)]
mod engine_tests {
    use serde_json::json;

    use super::super::*;

    fn path(p: &str) -> StorePath {
        StorePath::new(p)
    }

    // ========================================================================
    // Path Tests
    // ========================================================================

    #[test]
    fn test_strip_prefix() {
        let full = path("chats/global/messages/m1");
        let rel = full
            .strip_prefix(&path("chats/global"))
            .expect("prefix should match");
        assert_eq!(rel.as_str(), "messages/m1");

        assert_eq!(
            full.strip_prefix(&full).expect("self prefix"),
            StorePath::root()
        );
        assert!(full.strip_prefix(&path("chats/other")).is_none());
        assert_eq!(
            full.strip_prefix(&StorePath::root()).expect("root prefix"),
            full
        );
    }

    #[test]
    fn test_join_and_segments() {
        let p = path("users").join("u1").join("friends_count");
        assert_eq!(p.as_str(), "users/u1/friends_count");
        let segments: Vec<&str> = p.segments().collect();
        assert_eq!(segments, vec!["users", "u1", "friends_count"]);
        assert!(StorePath::root().is_root());
    }

    // ========================================================================
    // Read / Write Tests
    // ========================================================================

    #[tokio::test]
    async fn test_set_and_get_roundtrip() {
        let store = MemoryStore::new();
        assert!(store
            .get(&path("users/u1"))
            .await
            .expect("get should not fail")
            .is_none());

        let mut batch = WriteBatch::new();
        batch.set(path("users/u1"), json!({ "username": "alice" }));
        store.commit(batch).await.expect("commit should not fail");

        let value = store
            .get(&path("users/u1"))
            .await
            .expect("get should not fail")
            .expect("record should exist");
        assert_eq!(value["username"], "alice");

        // Reading a nested field works too.
        let field = store
            .get(&path("users/u1/username"))
            .await
            .expect("get should not fail")
            .expect("field should exist");
        assert_eq!(field, json!("alice"));
    }

    #[tokio::test]
    async fn test_batch_is_applied_atomically() {
        let store = MemoryStore::new();
        let mut batch = WriteBatch::new();
        batch
            .set(path("friends/u1/u2"), json!(true))
            .set(path("friends/u2/u1"), json!(true))
            .increment(path("users/u1/friends_count"), 1)
            .increment(path("users/u2/friends_count"), 1);
        assert_eq!(batch.len(), 4);
        store.commit(batch).await.expect("commit should not fail");

        for p in ["friends/u1/u2", "friends/u2/u1"] {
            assert_eq!(
                store.get(&path(p)).await.expect("get"),
                Some(json!(true)),
                "edge {p} should exist"
            );
        }
        assert_eq!(
            store.get(&path("users/u1/friends_count")).await.expect("get"),
            Some(json!(1))
        );
    }

    #[tokio::test]
    async fn test_set_null_deletes() {
        let store = MemoryStore::new();
        let mut batch = WriteBatch::new();
        batch.set(path("users/u1"), json!({ "bio": "hi" }));
        store.commit(batch).await.expect("commit");

        let mut batch = WriteBatch::new();
        batch.set(path("users/u1"), serde_json::Value::Null);
        store.commit(batch).await.expect("commit");

        assert!(store.get(&path("users/u1")).await.expect("get").is_none());
    }

    #[tokio::test]
    async fn test_delete_prunes_empty_parents() {
        let store = MemoryStore::new();
        let mut batch = WriteBatch::new();
        batch.set(path("friends/u1/u2"), json!(true));
        store.commit(batch).await.expect("commit");

        let mut batch = WriteBatch::new();
        batch.delete(path("friends/u1/u2"));
        store.commit(batch).await.expect("commit");

        // The emptied index nodes disappear instead of lingering as {}.
        assert!(store.get(&path("friends/u1")).await.expect("get").is_none());
        assert!(store.get(&path("friends")).await.expect("get").is_none());
    }

    #[tokio::test]
    async fn test_delete_missing_path_is_noop() {
        let store = MemoryStore::new();
        let mut batch = WriteBatch::new();
        batch.set(path("users/u1"), json!({ "username": "alice" }));
        store.commit(batch).await.expect("commit");

        let mut batch = WriteBatch::new();
        batch.delete(path("users/u2/whatever"));
        store.commit(batch).await.expect("delete of missing path");

        assert!(store.get(&path("users/u1")).await.expect("get").is_some());
    }

    #[tokio::test]
    async fn test_increment_from_missing_and_existing() {
        let store = MemoryStore::new();
        let counter = path("users/u1/friends_count");

        let mut batch = WriteBatch::new();
        batch.increment(counter.clone(), 2);
        store.commit(batch).await.expect("commit");
        assert_eq!(store.get(&counter).await.expect("get"), Some(json!(2)));

        let mut batch = WriteBatch::new();
        batch.increment(counter.clone(), -3);
        store.commit(batch).await.expect("commit");
        assert_eq!(store.get(&counter).await.expect("get"), Some(json!(-1)));
    }

    #[tokio::test]
    async fn test_empty_batch_is_noop() {
        let store = MemoryStore::new();
        store
            .commit(WriteBatch::new())
            .await
            .expect("empty commit should succeed");
    }

    // ========================================================================
    // Timestamp Sentinel Tests
    // ========================================================================

    #[tokio::test]
    async fn test_server_timestamp_resolves_per_commit() {
        let store = MemoryStore::new();
        let mut batch = WriteBatch::new();
        batch
            .set(path("a"), json!({ "ts": server_timestamp() }))
            .set(path("b"), json!({ "ts": server_timestamp() }));
        store.commit(batch).await.expect("commit");

        let a = store.get(&path("a/ts")).await.expect("get").expect("a.ts");
        let b = store.get(&path("b/ts")).await.expect("get").expect("b.ts");
        assert_eq!(a, b, "sentinels in one batch resolve to one instant");
        assert!(a.as_i64().expect("millis") > 0);

        let mut batch = WriteBatch::new();
        batch.set(path("c"), json!({ "ts": server_timestamp() }));
        store.commit(batch).await.expect("commit");
        let c = store.get(&path("c/ts")).await.expect("get").expect("c.ts");
        assert!(
            c.as_i64() > a.as_i64(),
            "later commits get strictly larger timestamps"
        );
    }

    #[tokio::test]
    async fn test_sentinel_resolves_when_nested() {
        let store = MemoryStore::new();
        let mut batch = WriteBatch::new();
        batch.set(
            path("chats/g1"),
            json!({
                "created_at": server_timestamp(),
                "messages": { "m1": { "server_timestamp": server_timestamp() } }
            }),
        );
        store.commit(batch).await.expect("commit");

        let created = store
            .get(&path("chats/g1/created_at"))
            .await
            .expect("get")
            .expect("created_at");
        let msg = store
            .get(&path("chats/g1/messages/m1/server_timestamp"))
            .await
            .expect("get")
            .expect("message timestamp");
        assert_eq!(created, msg);
    }

    // ========================================================================
    // Subscription Tests
    // ========================================================================

    #[tokio::test]
    async fn test_subscription_snapshot_then_changes() {
        let store = MemoryStore::new();
        let mut batch = WriteBatch::new();
        batch.set(path("friend_requests/u1/u2"), json!({ "from_uid": "u2" }));
        store.commit(batch).await.expect("commit");

        let mut sub = store
            .subscribe(&path("friend_requests/u1"))
            .await
            .expect("subscribe");

        match sub.recv().await.expect("first event") {
            StoreEvent::Snapshot(Some(value)) => {
                assert!(value.get("u2").is_some(), "snapshot holds existing data");
            }
            other => panic!("expected snapshot, got {other:?}"),
        }

        let mut batch = WriteBatch::new();
        batch.set(path("friend_requests/u1/u3"), json!({ "from_uid": "u3" }));
        store.commit(batch).await.expect("commit");

        match sub.recv().await.expect("second event") {
            StoreEvent::Changed { path: rel, value } => {
                assert_eq!(rel.as_str(), "u3");
                assert!(value.is_some());
            }
            other => panic!("expected change, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_subscription_on_missing_subtree_snapshots_none() {
        let store = MemoryStore::new();
        let mut sub = store.subscribe(&path("friends/u9")).await.expect("subscribe");
        match sub.recv().await.expect("first event") {
            StoreEvent::Snapshot(None) => {}
            other => panic!("expected empty snapshot, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_subscription_sees_deletes() {
        let store = MemoryStore::new();
        let mut batch = WriteBatch::new();
        batch.set(path("friends/u1/u2"), json!(true));
        store.commit(batch).await.expect("commit");

        let mut sub = store.subscribe(&path("friends/u1")).await.expect("subscribe");
        sub.recv().await.expect("snapshot");

        let mut batch = WriteBatch::new();
        batch.delete(path("friends/u1/u2"));
        store.commit(batch).await.expect("commit");

        match sub.recv().await.expect("delete event") {
            StoreEvent::Changed { path: rel, value } => {
                assert_eq!(rel.as_str(), "u2");
                assert!(value.is_none());
            }
            other => panic!("expected delete, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_subscription_sees_ancestor_writes() {
        let store = MemoryStore::new();
        let mut sub = store
            .subscribe(&path("chats/g1/messages"))
            .await
            .expect("subscribe");
        sub.recv().await.expect("snapshot");

        // Writing the whole chat record replaces the subscribed subtree.
        let mut batch = WriteBatch::new();
        batch.set(
            path("chats/g1"),
            json!({ "kind": "party", "messages": { "m1": { "content": "hello" } } }),
        );
        store.commit(batch).await.expect("commit");

        match sub.recv().await.expect("ancestor write") {
            StoreEvent::Changed { path: rel, value } => {
                assert!(rel.is_root());
                let value = value.expect("messages subtree present");
                assert_eq!(value["m1"]["content"], "hello");
            }
            other => panic!("expected change at root, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_subscription_ignores_unrelated_commits() {
        let store = MemoryStore::new();
        let mut sub = store.subscribe(&path("friends/u1")).await.expect("subscribe");
        sub.recv().await.expect("snapshot");

        let mut batch = WriteBatch::new();
        batch.set(path("friends/u2/u3"), json!(true));
        store.commit(batch).await.expect("commit");
        let mut batch = WriteBatch::new();
        batch.set(path("friends/u1/u4"), json!(true));
        store.commit(batch).await.expect("commit");

        // The first delivery after the snapshot is the relevant commit.
        match sub.recv().await.expect("event") {
            StoreEvent::Changed { path: rel, .. } => assert_eq!(rel.as_str(), "u4"),
            other => panic!("expected change, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_events_arrive_in_commit_order() {
        let store = MemoryStore::new();
        let mut sub = store.subscribe(&path("log")).await.expect("subscribe");
        sub.recv().await.expect("snapshot");

        for i in 0..5 {
            let mut batch = WriteBatch::new();
            batch.set(path(&format!("log/e{i}")), json!(i));
            store.commit(batch).await.expect("commit");
        }

        for i in 0..5 {
            match sub.recv().await.expect("event") {
                StoreEvent::Changed { path: rel, value } => {
                    assert_eq!(rel.as_str(), format!("e{i}"));
                    assert_eq!(value, Some(json!(i)));
                }
                other => panic!("expected change, got {other:?}"),
            }
        }
    }

    // ========================================================================
    // Id Generation Tests
    // ========================================================================

    #[test]
    fn test_generated_ids_are_unique() {
        let store = MemoryStore::new();
        let mut seen = std::collections::HashSet::new();
        for _ in 0..256 {
            assert!(seen.insert(store.generate_id()), "ids must not repeat");
        }
    }
}
