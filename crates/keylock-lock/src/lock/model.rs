//! Distributed Lock Data Model

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use tokio::time::Instant;

use super::renewal::Watchdog;
use crate::backoff::BackoffPolicy;

/// Default lease used by `Lease::Watchdog` between renewals
pub const DEFAULT_WATCHDOG_TIMEOUT: Duration = Duration::from_secs(30);

/// How long an acquired lock stays valid without action from its holder.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Lease {
    /// Lock expires after this duration unless renewed explicitly
    Fixed(Duration),
    /// Lock is taken with the watchdog timeout and renewed in the background
    /// at a third of it until released
    Watchdog,
}

impl From<Duration> for Lease {
    fn from(duration: Duration) -> Self {
        Lease::Fixed(duration)
    }
}

/// Lock-wide settings shared by every acquisition made through one
/// `DistributedLock`.
#[derive(Debug, Clone)]
pub struct LockConfig {
    /// Poll backoff while the lock is busy
    pub backoff: BackoffPolicy,
    /// Lease used with `Lease::Watchdog`
    pub watchdog_timeout: Duration,
    /// Take a fence token from `<name>:fence` on every acquisition
    pub fencing: bool,
}

impl Default for LockConfig {
    fn default() -> Self {
        Self {
            backoff: BackoffPolicy::default(),
            watchdog_timeout: DEFAULT_WATCHDOG_TIMEOUT,
            fencing: false,
        }
    }
}

/// Proof of a successful acquisition.
///
/// Owned by exactly one holder; consumed by `DistributedLock::release`.
#[derive(Debug)]
pub struct LockHandle {
    pub(crate) name: String,
    pub(crate) token: String,
    pub(crate) lease: Duration,
    pub(crate) acquired_at: Instant,
    pub(crate) fence_token: Option<i64>,
    pub(crate) watchdog: Option<Watchdog>,
}

impl LockHandle {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn token(&self) -> &str {
        &self.token
    }

    /// Current lease length (the watchdog timeout for watchdog leases).
    pub fn lease(&self) -> Duration {
        self.lease
    }

    pub fn acquired_at(&self) -> Instant {
        self.acquired_at
    }

    pub fn held_for(&self) -> Duration {
        self.acquired_at.elapsed()
    }

    /// Fence token taken at acquisition, when fencing is enabled.
    pub fn fence_token(&self) -> Option<i64> {
        self.fence_token
    }

    /// Whether a background watchdog is keeping this lease alive.
    pub fn is_watched(&self) -> bool {
        self.watchdog.as_ref().is_some_and(|w| w.is_running())
    }
}

/// Result of a release call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReleaseOutcome {
    /// The lock record was ours and has been deleted
    Released,
    /// The lock record was gone or belonged to another holder; nothing changed
    NotHeld,
    /// The store could not be reached; the lease TTL will reclaim the lock
    Failed,
}

/// Lock statistics
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LockStats {
    /// Successful acquisitions
    pub acquisitions: u64,
    /// Acquisitions that gave up after the wait timeout
    pub timed_out_acquisitions: u64,
    /// Store errors seen while acquiring
    pub acquire_store_errors: u64,
    /// Releases that deleted our lock record
    pub releases: u64,
    /// Releases that found the lease already gone (no-op)
    pub stale_releases: u64,
    /// Releases that failed on the store
    pub failed_releases: u64,
    /// Successful lease renewals
    pub renewals: u64,
    /// Renewals that found the lease lost or failed on the store
    pub failed_renewals: u64,
    /// Average time between acquisition and release in milliseconds
    pub avg_hold_time_ms: u64,
}

#[derive(Default)]
pub(crate) struct LockStatsCollector {
    pub(crate) acquisitions: AtomicU64,
    pub(crate) timed_out_acquisitions: AtomicU64,
    pub(crate) acquire_store_errors: AtomicU64,
    pub(crate) releases: AtomicU64,
    pub(crate) stale_releases: AtomicU64,
    pub(crate) failed_releases: AtomicU64,
    pub(crate) renewals: AtomicU64,
    pub(crate) failed_renewals: AtomicU64,
    total_hold_time_ms: AtomicU64,
}

impl LockStatsCollector {
    pub(crate) fn incr(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_release(&self, held_for: Duration) {
        self.releases.fetch_add(1, Ordering::Relaxed);
        self.total_hold_time_ms
            .fetch_add(held_for.as_millis() as u64, Ordering::Relaxed);
    }

    pub(crate) fn snapshot(&self) -> LockStats {
        let releases = self.releases.load(Ordering::Relaxed);
        let total_hold = self.total_hold_time_ms.load(Ordering::Relaxed);
        let avg_hold_time_ms = if releases > 0 {
            total_hold / releases
        } else {
            0
        };

        LockStats {
            acquisitions: self.acquisitions.load(Ordering::Relaxed),
            timed_out_acquisitions: self.timed_out_acquisitions.load(Ordering::Relaxed),
            acquire_store_errors: self.acquire_store_errors.load(Ordering::Relaxed),
            releases,
            stale_releases: self.stale_releases.load(Ordering::Relaxed),
            failed_releases: self.failed_releases.load(Ordering::Relaxed),
            renewals: self.renewals.load(Ordering::Relaxed),
            failed_renewals: self.failed_renewals.load(Ordering::Relaxed),
            avg_hold_time_ms,
        }
    }
}
