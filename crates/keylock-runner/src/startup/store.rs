use std::sync::Arc;
use std::time::Duration;

use keylock_common::error::startup_failure;
use keylock_store::{MemoryStore, RedisStore, SharedStore};
use tracing::{info, warn};

/// Address selecting the process-local store
pub const MEMORY_STORE_URL: &str = "memory://";

const MEMORY_CLEANUP_INTERVAL: Duration = Duration::from_secs(1);

/// Connect to the shared store at `url`.
///
/// An unreachable store is a startup failure.
pub async fn connect_store(
    url: &str,
    connect_timeout: Duration,
    op_timeout: Duration,
) -> anyhow::Result<Arc<dyn SharedStore>> {
    if url.starts_with(MEMORY_STORE_URL) {
        warn!("Using process-local memory store; the lock only excludes workers of this process");
        return Ok(Arc::new(
            MemoryStore::new().with_cleanup(MEMORY_CLEANUP_INTERVAL),
        ));
    }

    let store = RedisStore::connect(url, connect_timeout, op_timeout)
        .await
        .map_err(|e| startup_failure(format!("store unreachable at {}: {}", url, e)))?;
    info!(url = %store.url(), "Shared store ready");
    Ok(Arc::new(store))
}

#[cfg(test)]
mod tests {
    use super::*;
    use keylock_common::KeylockError;

    #[tokio::test]
    async fn test_memory_store_url() {
        let store = connect_store(
            "memory://",
            Duration::from_millis(100),
            Duration::from_millis(100),
        )
        .await
        .unwrap();
        assert_eq!(store.increment_and_get("key").await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_unreachable_store_is_startup_failure() {
        let err = connect_store(
            "redis://127.0.0.1:1",
            Duration::from_millis(500),
            Duration::from_millis(500),
        )
        .await
        .err()
        .unwrap();
        assert!(matches!(
            err.downcast_ref::<KeylockError>(),
            Some(KeylockError::StartupFailure(_))
        ));
    }
}
