//! Keylock Lock - TTL-leased mutual exclusion over a shared store
//!
//! This crate provides:
//! - `DistributedLock`: bounded-wait acquisition, token-checked release, lease renewal
//! - `LockGuard`: scoped acquisition that releases on every exit path
//! - Watchdog lease renewal for holders without a fixed lease
//! - Lock statistics and `metrics` counters

pub mod backoff;
pub mod lock;
pub mod metrics;

pub use backoff::BackoffPolicy;
pub use lock::{
    DistributedLock, Lease, LockConfig, LockGuard, LockHandle, LockStats, ReleaseOutcome,
};
