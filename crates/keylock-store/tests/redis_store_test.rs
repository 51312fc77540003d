//! Redis Store Integration Tests
//!
//! Exercises the Lua-backed primitives against a live server at
//! `KEYLOCK_TEST_REDIS_URL` (default `redis://localhost:6379`).

use std::time::Duration;

use keylock_store::{RedisStore, SharedStore};

async fn connect() -> RedisStore {
    let url = std::env::var("KEYLOCK_TEST_REDIS_URL")
        .unwrap_or_else(|_| "redis://localhost:6379".to_string());
    RedisStore::connect(&url, Duration::from_secs(2), Duration::from_secs(1))
        .await
        .expect("Failed to connect to redis")
}

fn unique_key(prefix: &str) -> String {
    format!("keylock-test:{}:{}", prefix, uuid::Uuid::new_v4())
}

#[tokio::test]
#[ignore = "requires running redis"]
async fn test_set_if_absent_and_compare_and_delete() {
    let store = connect().await;
    let key = unique_key("lock");

    assert!(store.set_if_absent_ttl(&key, "a", Duration::from_secs(5)).await.unwrap());
    assert!(!store.set_if_absent_ttl(&key, "b", Duration::from_secs(5)).await.unwrap());

    assert!(!store.compare_and_delete(&key, "b").await.unwrap());
    assert_eq!(store.get_value(&key).await.unwrap(), Some("a".to_string()));

    assert!(store.compare_and_delete(&key, "a").await.unwrap());
    assert_eq!(store.get_value(&key).await.unwrap(), None);
}

#[tokio::test]
#[ignore = "requires running redis"]
async fn test_ttl_expiry_and_extension() {
    let store = connect().await;
    let key = unique_key("lease");

    store
        .set_if_absent_ttl(&key, "a", Duration::from_millis(200))
        .await
        .unwrap();
    assert!(!store
        .compare_and_extend_ttl(&key, "b", Duration::from_secs(5))
        .await
        .unwrap());
    assert!(store
        .compare_and_extend_ttl(&key, "a", Duration::from_secs(5))
        .await
        .unwrap());

    let remaining = store.remaining_ttl(&key).await.unwrap().unwrap();
    assert!(remaining > Duration::from_secs(4));

    store.compare_and_delete(&key, "a").await.unwrap();
    assert_eq!(store.remaining_ttl(&key).await.unwrap(), None);
}

#[tokio::test]
#[ignore = "requires running redis"]
async fn test_lease_expires_server_side() {
    let store = connect().await;
    let key = unique_key("expiry");

    store
        .set_if_absent_ttl(&key, "a", Duration::from_millis(50))
        .await
        .unwrap();
    tokio::time::sleep(Duration::from_millis(150)).await;

    assert_eq!(store.get_value(&key).await.unwrap(), None);
    assert!(store.set_if_absent_ttl(&key, "b", Duration::from_millis(50)).await.unwrap());
}

#[tokio::test]
#[ignore = "requires running redis"]
async fn test_counter() {
    let store = connect().await;
    let key = unique_key("counter");

    assert_eq!(store.get(&key).await.unwrap(), 0);
    assert_eq!(store.increment_and_get(&key).await.unwrap(), 1);
    assert_eq!(store.increment_and_get(&key).await.unwrap(), 2);
    assert_eq!(store.get(&key).await.unwrap(), 2);
}
