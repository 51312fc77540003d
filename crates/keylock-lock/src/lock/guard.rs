//! Scoped lock acquisition

use std::time::Duration;

use keylock_common::KeylockError;
use tracing::warn;

use super::model::{LockHandle, ReleaseOutcome};
use super::service::DistributedLock;

/// Holds a lock until released.
///
/// Prefer `release().await`. A guard dropped while still holding (early
/// return, panic, cancelled future) hands its release to the current Tokio
/// runtime; outside a runtime the lease TTL reclaims the lock.
#[must_use = "dropping the guard releases the lock"]
pub struct LockGuard {
    lock: DistributedLock,
    handle: Option<LockHandle>,
}

impl LockGuard {
    pub(crate) fn new(lock: DistributedLock, handle: LockHandle) -> Self {
        Self {
            lock,
            handle: Some(handle),
        }
    }

    pub fn handle(&self) -> &LockHandle {
        match &self.handle {
            Some(handle) => handle,
            None => unreachable!("lock guard handle is only taken on release or drop"),
        }
    }

    pub fn name(&self) -> &str {
        self.handle().name()
    }

    pub fn fence_token(&self) -> Option<i64> {
        self.handle().fence_token()
    }

    /// Extend the lease; `Ok(false)` if it was already lost.
    pub async fn renew(&mut self, new_lease: Option<Duration>) -> Result<bool, KeylockError> {
        match self.handle.as_mut() {
            Some(handle) => self.lock.renew(handle, new_lease).await,
            None => Ok(false),
        }
    }

    /// Whether the lease is still ours.
    pub async fn is_held(&self) -> Result<bool, KeylockError> {
        self.lock.is_held(self.handle()).await
    }

    /// `LeaseLost` unless the lease is still ours. Check before side effects
    /// that must not run under an expired lease.
    pub async fn ensure_held(&self) -> Result<(), KeylockError> {
        if self.is_held().await? {
            Ok(())
        } else {
            Err(KeylockError::LeaseLost {
                name: self.name().to_string(),
            })
        }
    }

    pub async fn release(mut self) -> ReleaseOutcome {
        match self.handle.take() {
            Some(handle) => self.lock.release(handle).await,
            None => ReleaseOutcome::NotHeld,
        }
    }
}

impl std::fmt::Debug for LockGuard {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LockGuard")
            .field("handle", &self.handle)
            .finish()
    }
}

impl Drop for LockGuard {
    fn drop(&mut self) {
        let Some(handle) = self.handle.take() else {
            return;
        };

        match tokio::runtime::Handle::try_current() {
            Ok(runtime) => {
                let lock = self.lock.clone();
                runtime.spawn(async move {
                    lock.release(handle).await;
                });
            }
            Err(_) => {
                warn!(
                    lock = %handle.name(),
                    "Lock guard dropped outside a runtime; lease TTL will reclaim the lock"
                );
            }
        }
    }
}
