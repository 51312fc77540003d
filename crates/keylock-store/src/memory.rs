// In-memory shared store
// Keys expire lazily on access, with an optional background sweeper

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use dashmap::DashMap;
use dashmap::mapref::entry::Entry as MapEntry;
use tokio::time::{Instant, interval};
use tracing::{debug, info};

use crate::error::{StoreError, StoreResult};
use crate::store::SharedStore;

/// A stored value with its optional deadline
#[derive(Debug, Clone)]
struct Entry {
    value: String,
    expires_at: Option<Instant>,
}

impl Entry {
    fn new(value: impl Into<String>, ttl: Option<Duration>) -> Self {
        Self {
            value: value.into(),
            expires_at: ttl.map(|ttl| Instant::now() + ttl),
        }
    }

    fn is_expired(&self, now: Instant) -> bool {
        self.expires_at.is_some_and(|at| now >= at)
    }

    fn as_integer(&self, key: &str) -> StoreResult<i64> {
        self.value
            .parse::<i64>()
            .map_err(|_| StoreError::NotAnInteger(key.to_string()))
    }
}

/// Process-local store using DashMap.
///
/// Each primitive runs under the shard lock of its key, which makes it atomic
/// with respect to every other primitive on the same key.
pub struct MemoryStore {
    entries: Arc<DashMap<String, Entry>>,
    _cleanup_handle: Option<tokio::task::JoinHandle<()>>,
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for MemoryStore {
    fn drop(&mut self) {
        if let Some(handle) = self._cleanup_handle.take() {
            handle.abort();
        }
    }
}

impl MemoryStore {
    pub fn new() -> Self {
        Self {
            entries: Arc::new(DashMap::new()),
            _cleanup_handle: None,
        }
    }

    /// Start a background task that drops expired keys every `every`.
    ///
    /// Must be called from within a Tokio runtime. Periods below 1ms are
    /// raised to 1ms.
    pub fn with_cleanup(mut self, every: Duration) -> Self {
        let every = every.max(Duration::from_millis(1));
        let entries = self.entries.clone();
        let handle = tokio::spawn(async move {
            let mut ticker = interval(every);
            loop {
                ticker.tick().await;
                let purged = Self::purge(&entries);
                if purged > 0 {
                    debug!(count = purged, "Cleaned up expired store entries");
                }
            }
        });
        info!(interval_ms = every.as_millis() as u64, "MemoryStore cleanup task started");
        self._cleanup_handle = Some(handle);
        self
    }

    /// Drop every expired key now. Returns how many were removed.
    pub fn purge_expired(&self) -> usize {
        Self::purge(&self.entries)
    }

    /// Number of live (unexpired) keys.
    pub fn len(&self) -> usize {
        let now = Instant::now();
        self.entries
            .iter()
            .filter(|entry| !entry.value().is_expired(now))
            .count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn purge(entries: &DashMap<String, Entry>) -> usize {
        let now = Instant::now();
        let before = entries.len();
        entries.retain(|_, entry| !entry.is_expired(now));
        before.saturating_sub(entries.len())
    }
}

#[async_trait]
impl SharedStore for MemoryStore {
    async fn set_if_absent_ttl(&self, key: &str, value: &str, ttl: Duration) -> StoreResult<bool> {
        let now = Instant::now();
        match self.entries.entry(key.to_string()) {
            MapEntry::Occupied(mut occupied) => {
                if occupied.get().is_expired(now) {
                    occupied.insert(Entry::new(value, Some(ttl)));
                    Ok(true)
                } else {
                    Ok(false)
                }
            }
            MapEntry::Vacant(vacant) => {
                vacant.insert(Entry::new(value, Some(ttl)));
                Ok(true)
            }
        }
    }

    async fn compare_and_delete(&self, key: &str, expected: &str) -> StoreResult<bool> {
        let now = Instant::now();
        let removed = self
            .entries
            .remove_if(key, |_, entry| !entry.is_expired(now) && entry.value == expected);
        Ok(removed.is_some())
    }

    async fn compare_and_extend_ttl(
        &self,
        key: &str,
        expected: &str,
        ttl: Duration,
    ) -> StoreResult<bool> {
        let now = Instant::now();
        match self.entries.get_mut(key) {
            Some(mut entry) if !entry.is_expired(now) && entry.value == expected => {
                entry.expires_at = Some(now + ttl);
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn increment_and_get(&self, key: &str) -> StoreResult<i64> {
        let now = Instant::now();
        match self.entries.entry(key.to_string()) {
            MapEntry::Occupied(mut occupied) => {
                if occupied.get().is_expired(now) {
                    occupied.insert(Entry::new("1", None));
                    return Ok(1);
                }
                let current = occupied.get().as_integer(key)?;
                let next = current.checked_add(1).ok_or_else(|| {
                    StoreError::Backend(format!("increment of '{}' would overflow", key))
                })?;
                occupied.get_mut().value = next.to_string();
                Ok(next)
            }
            MapEntry::Vacant(vacant) => {
                vacant.insert(Entry::new("1", None));
                Ok(1)
            }
        }
    }

    async fn get(&self, key: &str) -> StoreResult<i64> {
        let now = Instant::now();
        match self.entries.get(key) {
            Some(entry) if !entry.is_expired(now) => entry.as_integer(key),
            _ => Ok(0),
        }
    }

    async fn get_value(&self, key: &str) -> StoreResult<Option<String>> {
        let now = Instant::now();
        Ok(self
            .entries
            .get(key)
            .filter(|entry| !entry.is_expired(now))
            .map(|entry| entry.value.clone()))
    }

    async fn remaining_ttl(&self, key: &str) -> StoreResult<Option<Duration>> {
        let now = Instant::now();
        Ok(self
            .entries
            .get(key)
            .filter(|entry| !entry.is_expired(now))
            .and_then(|entry| entry.expires_at)
            .map(|at| at.saturating_duration_since(now)))
    }

    async fn ping(&self) -> StoreResult<()> {
        Ok(())
    }
}
