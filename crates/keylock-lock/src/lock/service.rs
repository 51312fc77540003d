//! Distributed Lock Implementation
//!
//! Lock records live in the shared store as `name -> token` with a TTL:
//! - acquire: SET-IF-ABSENT-WITH-TTL, polled with backoff until the wait timeout
//! - release: compare-and-delete against the holder's token
//! - renew: compare-and-extend against the holder's token
//! - expiry: left entirely to the store's TTL
//!
//! Exclusivity holds only while the lease outlives the critical section. A
//! holder stalled past its lease may find another holder in its place; its
//! release and renewal then become no-ops instead of touching the new lock.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use keylock_common::{FENCE_KEY_SUFFIX, KeylockError, validate_key};
use keylock_store::{SharedStore, StoreError, StoreResult};
use tokio::time::Instant;
use tracing::{debug, trace, warn};
use uuid::Uuid;

use super::guard::LockGuard;
use super::model::*;
use super::renewal::Watchdog;
use crate::metrics::{
    LOCK_ACQUIRE_TIMEOUT_TOTAL, LOCK_ACQUIRED_TOTAL, LOCK_HOLD_SECONDS, LOCK_RELEASED_TOTAL,
    LOCK_STALE_RELEASE_TOTAL, LOCK_STORE_ERRORS_TOTAL,
};

/// A named-lock client bound to one actor.
///
/// Every instance carries its own client id, which prefixes the holder
/// tokens it generates. Clones share the id, the store and the statistics.
#[derive(Clone)]
pub struct DistributedLock {
    store: Arc<dyn SharedStore>,
    config: LockConfig,
    client_id: String,
    stats: Arc<LockStatsCollector>,
}

impl std::fmt::Debug for DistributedLock {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DistributedLock")
            .field("client_id", &self.client_id)
            .field("config", &self.config)
            .finish()
    }
}

impl DistributedLock {
    pub fn new(store: Arc<dyn SharedStore>, config: LockConfig) -> Self {
        Self {
            store,
            config,
            client_id: Uuid::new_v4().to_string(),
            stats: Arc::new(LockStatsCollector::default()),
        }
    }

    pub fn with_defaults(store: Arc<dyn SharedStore>) -> Self {
        Self::new(store, LockConfig::default())
    }

    pub fn client_id(&self) -> &str {
        &self.client_id
    }

    pub fn config(&self) -> &LockConfig {
        &self.config
    }

    pub fn store(&self) -> &Arc<dyn SharedStore> {
        &self.store
    }

    pub fn stats(&self) -> LockStats {
        self.stats.snapshot()
    }

    fn new_token(&self) -> String {
        format!("{}:{}", self.client_id, Uuid::new_v4().simple())
    }

    /// Try to take `name`, waiting at most `wait_timeout`.
    ///
    /// Busy locks and store failures are both retried until the deadline and
    /// both end in `None`.
    pub async fn try_acquire(
        &self,
        name: &str,
        wait_timeout: Duration,
        lease: impl Into<Lease>,
    ) -> Option<LockHandle> {
        match self.acquire(name, wait_timeout, lease).await {
            Ok(handle) => Some(handle),
            Err(e) => {
                debug!(lock = %name, error = %e, "Lock not acquired");
                None
            }
        }
    }

    /// Same protocol as `try_acquire`, reporting why the lock was not taken.
    ///
    /// Returns `StoreUnavailable` when the last attempt failed on the store,
    /// `AcquisitionTimeout` when the lock was simply busy. Every store call is
    /// cut off at the deadline, so a stalled store cannot stretch the wait.
    pub async fn acquire(
        &self,
        name: &str,
        wait_timeout: Duration,
        lease: impl Into<Lease>,
    ) -> Result<LockHandle, KeylockError> {
        validate_key(name)?;
        let lease = lease.into();
        let ttl = match lease {
            Lease::Fixed(duration) => duration,
            Lease::Watchdog => self.config.watchdog_timeout,
        };
        if ttl.is_zero() {
            return Err(KeylockError::InvalidArgument(format!(
                "lease for lock '{}' must be greater than zero",
                name
            )));
        }

        let token = self.new_token();
        let started = Instant::now();
        let deadline = started + wait_timeout;
        let mut attempt: u32 = 0;
        // An attempt failed on the store, so our write may have landed anyway.
        // Cleared only once the record is seen holding something else.
        let mut maybe_written = false;
        let mut last_error: Option<StoreError> = None;

        loop {
            let attempt_result = within(
                deadline,
                "set_if_absent_ttl",
                self.store.set_if_absent_ttl(name, &token, ttl),
            )
            .await;

            match attempt_result {
                Ok(true) => return self.on_acquired(name, token, lease, ttl, attempt).await,
                Ok(false) if maybe_written => {
                    match within(deadline, "get_value", self.store.get_value(name)).await {
                        Ok(Some(ref holder)) if *holder == token => {
                            debug!(lock = %name, "Recovered acquisition from an unacknowledged write");
                            return self.on_acquired(name, token, lease, ttl, attempt).await;
                        }
                        Ok(_) => {
                            maybe_written = false;
                            last_error = None;
                            trace!(lock = %name, attempt, "Lock busy");
                        }
                        Err(e) => {
                            self.record_store_error(name, attempt, &e);
                            last_error = Some(e);
                        }
                    }
                }
                Ok(false) => {
                    last_error = None;
                    trace!(lock = %name, attempt, "Lock busy");
                }
                Err(e) => {
                    self.record_store_error(name, attempt, &e);
                    maybe_written = true;
                    last_error = Some(e);
                }
            }

            let now = Instant::now();
            if now >= deadline {
                break;
            }
            let delay = self.config.backoff.delay(attempt, deadline - now);
            tokio::time::sleep(delay).await;
            attempt = attempt.saturating_add(1);
        }

        LockStatsCollector::incr(&self.stats.timed_out_acquisitions);
        metrics::counter!(LOCK_ACQUIRE_TIMEOUT_TOTAL, "lock" => name.to_string()).increment(1);

        if maybe_written {
            // Off the caller's clock: the wait timeout has already been spent.
            let store = self.store.clone();
            let name = name.to_string();
            tokio::spawn(async move {
                match store.compare_and_delete(&name, &token).await {
                    Ok(true) => debug!(lock = %name, "Removed unacknowledged write after failed acquisition"),
                    Ok(false) => {}
                    Err(e) => {
                        debug!(lock = %name, error = %e, "Cleanup after failed acquisition did not reach store; lease TTL will reclaim it")
                    }
                }
            });
        }

        match last_error {
            Some(e) => Err(e.into()),
            None => Err(KeylockError::AcquisitionTimeout {
                name: name.to_string(),
                waited_ms: started.elapsed().as_millis() as u64,
            }),
        }
    }

    fn record_store_error(&self, name: &str, attempt: u32, error: &StoreError) {
        LockStatsCollector::incr(&self.stats.acquire_store_errors);
        metrics::counter!(LOCK_STORE_ERRORS_TOTAL, "lock" => name.to_string()).increment(1);
        warn!(lock = %name, attempt, error = %error, "Store error while acquiring lock");
    }

    async fn on_acquired(
        &self,
        name: &str,
        token: String,
        lease: Lease,
        ttl: Duration,
        attempts: u32,
    ) -> Result<LockHandle, KeylockError> {
        let fence_token = if self.config.fencing {
            let fence_key = format!("{}{}", name, FENCE_KEY_SUFFIX);
            match self.store.increment_and_get(&fence_key).await {
                Ok(fence) => Some(fence),
                Err(e) => {
                    warn!(lock = %name, error = %e, "Failed to take fence token, giving the lock back");
                    if let Err(release_err) = self.store.compare_and_delete(name, &token).await {
                        warn!(lock = %name, error = %release_err, "Failed to give back lock; lease TTL will reclaim it");
                    }
                    return Err(e.into());
                }
            }
        } else {
            None
        };

        let watchdog = match lease {
            Lease::Watchdog => Some(Watchdog::start(
                self.store.clone(),
                self.stats.clone(),
                name.to_string(),
                token.clone(),
                ttl,
            )),
            Lease::Fixed(_) => None,
        };

        LockStatsCollector::incr(&self.stats.acquisitions);
        metrics::counter!(LOCK_ACQUIRED_TOTAL, "lock" => name.to_string()).increment(1);
        debug!(
            lock = %name,
            lease_ms = ttl.as_millis() as u64,
            retries = attempts,
            fence_token = ?fence_token,
            "Lock acquired"
        );

        Ok(LockHandle {
            name: name.to_string(),
            token,
            lease: ttl,
            acquired_at: Instant::now(),
            fence_token,
            watchdog,
        })
    }

    /// Release a lock if it is still ours.
    ///
    /// Never deletes a record holding another token. Store failures are
    /// logged and reported as `Failed`; the lease TTL reclaims the lock.
    pub async fn release(&self, mut handle: LockHandle) -> ReleaseOutcome {
        if let Some(watchdog) = handle.watchdog.take() {
            watchdog.stop();
        }

        let held_for = handle.held_for();
        match self
            .store
            .compare_and_delete(&handle.name, &handle.token)
            .await
        {
            Ok(true) => {
                self.stats.record_release(held_for);
                metrics::counter!(LOCK_RELEASED_TOTAL, "lock" => handle.name.clone()).increment(1);
                metrics::histogram!(LOCK_HOLD_SECONDS).record(held_for.as_secs_f64());
                debug!(lock = %handle.name, held_ms = held_for.as_millis() as u64, "Lock released");
                ReleaseOutcome::Released
            }
            Ok(false) => {
                LockStatsCollector::incr(&self.stats.stale_releases);
                metrics::counter!(LOCK_STALE_RELEASE_TOTAL, "lock" => handle.name.clone())
                    .increment(1);
                warn!(
                    lock = %handle.name,
                    held_ms = held_for.as_millis() as u64,
                    lease_ms = handle.lease.as_millis() as u64,
                    "Lease expired before release; lock left untouched"
                );
                ReleaseOutcome::NotHeld
            }
            Err(e) => {
                LockStatsCollector::incr(&self.stats.failed_releases);
                metrics::counter!(LOCK_STORE_ERRORS_TOTAL, "lock" => handle.name.clone())
                    .increment(1);
                warn!(lock = %handle.name, error = %e, "Failed to release lock; lease TTL will reclaim it");
                ReleaseOutcome::Failed
            }
        }
    }

    /// Reset the lease of a held lock to `new_lease` (or its current lease).
    ///
    /// `Ok(false)` means the lease was already lost.
    pub async fn renew(
        &self,
        handle: &mut LockHandle,
        new_lease: Option<Duration>,
    ) -> Result<bool, KeylockError> {
        let ttl = new_lease.unwrap_or(handle.lease);
        if ttl.is_zero() {
            return Err(KeylockError::InvalidArgument(
                "renewed lease must be greater than zero".to_string(),
            ));
        }

        match self
            .store
            .compare_and_extend_ttl(&handle.name, &handle.token, ttl)
            .await
        {
            Ok(true) => {
                handle.lease = ttl;
                LockStatsCollector::incr(&self.stats.renewals);
                metrics::counter!(crate::metrics::LOCK_RENEWED_TOTAL, "lock" => handle.name.clone())
                    .increment(1);
                Ok(true)
            }
            Ok(false) => {
                LockStatsCollector::incr(&self.stats.failed_renewals);
                debug!(lock = %handle.name, "Renewal found lease lost");
                Ok(false)
            }
            Err(e) => {
                LockStatsCollector::incr(&self.stats.failed_renewals);
                Err(e.into())
            }
        }
    }

    /// Whether any holder currently owns `name`.
    pub async fn is_locked(&self, name: &str) -> Result<bool, KeylockError> {
        Ok(self.store.get_value(name).await?.is_some())
    }

    /// Whether `handle` still owns its lock.
    pub async fn is_held(&self, handle: &LockHandle) -> Result<bool, KeylockError> {
        Ok(self.store.get_value(&handle.name).await?.as_deref() == Some(handle.token.as_str()))
    }

    /// Time left on `handle`'s lease, `None` once it is no longer held.
    pub async fn remaining_lease(
        &self,
        handle: &LockHandle,
    ) -> Result<Option<Duration>, KeylockError> {
        if !self.is_held(handle).await? {
            return Ok(None);
        }
        Ok(self.store.remaining_ttl(&handle.name).await?)
    }

    /// Delete `name` whoever holds it (admin operation).
    ///
    /// Only the token observed just before is deleted, so a lock taken in
    /// between survives.
    pub async fn force_unlock(&self, name: &str) -> Result<bool, KeylockError> {
        let Some(current) = self.store.get_value(name).await? else {
            return Ok(false);
        };
        let deleted = self.store.compare_and_delete(name, &current).await?;
        if deleted {
            warn!(lock = %name, "Lock force-released");
        }
        Ok(deleted)
    }

    /// Scoped acquisition: the returned guard releases on every exit path.
    pub async fn lock(
        &self,
        name: &str,
        wait_timeout: Duration,
        lease: impl Into<Lease>,
    ) -> Option<LockGuard> {
        self.try_acquire(name, wait_timeout, lease)
            .await
            .map(|handle| LockGuard::new(self.clone(), handle))
    }

    /// Run `body` while holding `name`. `None` if the lock was not acquired.
    pub async fn with_lock<F, Fut, T>(
        &self,
        name: &str,
        wait_timeout: Duration,
        lease: impl Into<Lease>,
        body: F,
    ) -> Option<T>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = T>,
    {
        let guard = self.lock(name, wait_timeout, lease).await?;
        let output = body().await;
        guard.release().await;
        Some(output)
    }
}

/// Smallest budget given to a store call, so an attempt made at the
/// deadline (or with a zero wait) still gets one round trip.
const MIN_STORE_CALL_BUDGET: Duration = Duration::from_millis(10);

/// Run one store call within the time left before `deadline`.
async fn within<T>(
    deadline: Instant,
    op: &'static str,
    call: impl Future<Output = StoreResult<T>>,
) -> StoreResult<T> {
    let budget = deadline
        .saturating_duration_since(Instant::now())
        .max(MIN_STORE_CALL_BUDGET);
    match tokio::time::timeout(budget, call).await {
        Ok(result) => result,
        Err(_) => Err(StoreError::Timeout {
            op,
            timeout_ms: budget.as_millis() as u64,
        }),
    }
}
