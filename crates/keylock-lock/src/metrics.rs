//! Metric names emitted by the lock.
//!
//! Only the `metrics` facade is used here; nothing is recorded unless the
//! embedding application installs a recorder.

use metrics::{describe_counter, describe_histogram, Unit};

pub const LOCK_ACQUIRED_TOTAL: &str = "keylock_lock_acquired_total";
pub const LOCK_ACQUIRE_TIMEOUT_TOTAL: &str = "keylock_lock_acquire_timeout_total";
pub const LOCK_STORE_ERRORS_TOTAL: &str = "keylock_lock_store_errors_total";
pub const LOCK_RELEASED_TOTAL: &str = "keylock_lock_released_total";
pub const LOCK_STALE_RELEASE_TOTAL: &str = "keylock_lock_stale_release_total";
pub const LOCK_RENEWED_TOTAL: &str = "keylock_lock_renewed_total";
pub const LOCK_HOLD_SECONDS: &str = "keylock_lock_hold_seconds";

/// Register metric descriptions with the installed recorder.
pub fn describe_metrics() {
    describe_counter!(LOCK_ACQUIRED_TOTAL, "Total number of successful lock acquisitions");
    describe_counter!(
        LOCK_ACQUIRE_TIMEOUT_TOTAL,
        "Total number of acquisitions that gave up after the wait timeout"
    );
    describe_counter!(
        LOCK_STORE_ERRORS_TOTAL,
        "Total number of store errors seen by lock operations"
    );
    describe_counter!(LOCK_RELEASED_TOTAL, "Total number of successful lock releases");
    describe_counter!(
        LOCK_STALE_RELEASE_TOTAL,
        "Total number of releases that found the lease already gone"
    );
    describe_counter!(LOCK_RENEWED_TOTAL, "Total number of lease renewals");
    describe_histogram!(
        LOCK_HOLD_SECONDS,
        Unit::Seconds,
        "Time between acquisition and release"
    );
}
