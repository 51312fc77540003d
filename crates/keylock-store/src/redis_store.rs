//! Redis-backed shared store
//!
//! Lock records are plain string keys with a `PX` expiry, counters are
//! `INCR` integers. The compare-and-mutate primitives run as Lua scripts so
//! the ownership check and the mutation execute as one atomic step on the
//! server.

use std::future::Future;
use std::time::Duration;

use async_trait::async_trait;
use redis::aio::ConnectionManager;
use redis::{RedisResult, Script};
use tracing::{debug, info};

use crate::error::{StoreError, StoreResult};
use crate::store::SharedStore;

const COMPARE_AND_DELETE: &str = r#"
if redis.call('get', KEYS[1]) == ARGV[1] then
    return redis.call('del', KEYS[1])
else
    return 0
end
"#;

const COMPARE_AND_EXTEND: &str = r#"
if redis.call('get', KEYS[1]) == ARGV[1] then
    return redis.call('pexpire', KEYS[1], ARGV[2])
else
    return 0
end
"#;

pub struct RedisStore {
    url: String,
    conn: ConnectionManager,
    op_timeout: Duration,
    delete_script: Script,
    extend_script: Script,
}

impl std::fmt::Debug for RedisStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RedisStore")
            .field("url", &self.url)
            .field("op_timeout", &self.op_timeout)
            .finish()
    }
}

impl RedisStore {
    /// Connect to `url` and verify the server answers `PING`.
    ///
    /// Both the connection and every later command are bounded: the connect
    /// step by `connect_timeout`, each command by `op_timeout`.
    pub async fn connect(
        url: &str,
        connect_timeout: Duration,
        op_timeout: Duration,
    ) -> StoreResult<Self> {
        let client = redis::Client::open(url)?;

        let conn = match tokio::time::timeout(connect_timeout, client.get_connection_manager())
            .await
        {
            Ok(conn) => conn?,
            Err(_) => {
                return Err(StoreError::Unavailable(format!(
                    "timed out connecting to {} after {}ms",
                    url,
                    connect_timeout.as_millis()
                )));
            }
        };

        let store = Self {
            url: url.to_string(),
            conn,
            op_timeout,
            delete_script: Script::new(COMPARE_AND_DELETE),
            extend_script: Script::new(COMPARE_AND_EXTEND),
        };
        store.ping().await?;

        info!(url = %store.url, "Connected to redis store");
        Ok(store)
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    async fn run<T, F>(&self, op: &'static str, fut: F) -> StoreResult<T>
    where
        F: Future<Output = RedisResult<T>>,
    {
        match tokio::time::timeout(self.op_timeout, fut).await {
            Ok(result) => result.map_err(|e| {
                debug!(op, error = %e, "Redis command failed");
                StoreError::from(e)
            }),
            Err(_) => Err(StoreError::Timeout {
                op,
                timeout_ms: self.op_timeout.as_millis() as u64,
            }),
        }
    }
}

/// Redis rejects a zero `PX`; round sub-millisecond leases up.
fn ttl_millis(ttl: Duration) -> u64 {
    u64::try_from(ttl.as_millis()).unwrap_or(u64::MAX).max(1)
}

#[async_trait]
impl SharedStore for RedisStore {
    async fn set_if_absent_ttl(&self, key: &str, value: &str, ttl: Duration) -> StoreResult<bool> {
        let mut conn = self.conn.clone();
        let reply: Option<String> = self
            .run(
                "set_if_absent_ttl",
                redis::cmd("SET")
                    .arg(key)
                    .arg(value)
                    .arg("NX")
                    .arg("PX")
                    .arg(ttl_millis(ttl))
                    .query_async(&mut conn),
            )
            .await?;
        Ok(reply.is_some())
    }

    async fn compare_and_delete(&self, key: &str, expected: &str) -> StoreResult<bool> {
        let mut conn = self.conn.clone();
        let deleted: i64 = self
            .run(
                "compare_and_delete",
                self.delete_script
                    .key(key)
                    .arg(expected)
                    .invoke_async(&mut conn),
            )
            .await?;
        Ok(deleted == 1)
    }

    async fn compare_and_extend_ttl(
        &self,
        key: &str,
        expected: &str,
        ttl: Duration,
    ) -> StoreResult<bool> {
        let mut conn = self.conn.clone();
        let extended: i64 = self
            .run(
                "compare_and_extend_ttl",
                self.extend_script
                    .key(key)
                    .arg(expected)
                    .arg(ttl_millis(ttl))
                    .invoke_async(&mut conn),
            )
            .await?;
        Ok(extended == 1)
    }

    async fn increment_and_get(&self, key: &str) -> StoreResult<i64> {
        let mut conn = self.conn.clone();
        self.run(
            "increment_and_get",
            redis::cmd("INCR").arg(key).query_async(&mut conn),
        )
        .await
    }

    async fn get(&self, key: &str) -> StoreResult<i64> {
        let mut conn = self.conn.clone();
        let raw: Option<String> = self
            .run("get", redis::cmd("GET").arg(key).query_async(&mut conn))
            .await?;
        match raw {
            Some(raw) => raw
                .parse::<i64>()
                .map_err(|_| StoreError::NotAnInteger(key.to_string())),
            None => Ok(0),
        }
    }

    async fn get_value(&self, key: &str) -> StoreResult<Option<String>> {
        let mut conn = self.conn.clone();
        self.run("get_value", redis::cmd("GET").arg(key).query_async(&mut conn))
            .await
    }

    async fn remaining_ttl(&self, key: &str) -> StoreResult<Option<Duration>> {
        let mut conn = self.conn.clone();
        let pttl: i64 = self
            .run(
                "remaining_ttl",
                redis::cmd("PTTL").arg(key).query_async(&mut conn),
            )
            .await?;
        // -2: no such key, -1: no expiry
        Ok((pttl >= 0).then(|| Duration::from_millis(pttl as u64)))
    }

    async fn ping(&self) -> StoreResult<()> {
        let mut conn = self.conn.clone();
        let _: String = self
            .run("ping", redis::cmd("PING").query_async(&mut conn))
            .await?;
        Ok(())
    }
}
