//! Shared store contract
//!
//! Every method is a single atomic operation against the store. The lock
//! protocol relies on that: ownership checks and the mutation they guard are
//! never split across two calls.

use std::time::Duration;

use async_trait::async_trait;

use crate::error::StoreResult;

#[async_trait]
pub trait SharedStore: Send + Sync {
    /// Create `key` with `value` and a TTL. True iff this call created the key.
    async fn set_if_absent_ttl(&self, key: &str, value: &str, ttl: Duration) -> StoreResult<bool>;

    /// Delete `key` only if it currently holds `expected`. True iff deleted.
    async fn compare_and_delete(&self, key: &str, expected: &str) -> StoreResult<bool>;

    /// Reset the TTL of `key` only if it currently holds `expected`.
    async fn compare_and_extend_ttl(
        &self,
        key: &str,
        expected: &str,
        ttl: Duration,
    ) -> StoreResult<bool>;

    /// Increment the counter at `key` (absent counts as 0) and return the new value.
    async fn increment_and_get(&self, key: &str) -> StoreResult<i64>;

    /// Current counter value, 0 if absent.
    async fn get(&self, key: &str) -> StoreResult<i64>;

    /// Raw value of `key`, if present.
    async fn get_value(&self, key: &str) -> StoreResult<Option<String>>;

    /// Time left before `key` expires. `None` if absent or without expiry.
    async fn remaining_ttl(&self, key: &str) -> StoreResult<Option<Duration>>;

    /// Round trip to the store.
    async fn ping(&self) -> StoreResult<()>;
}
