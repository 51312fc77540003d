//! Error types for keylock
//!
//! `KeylockError` is the caller-facing taxonomy. Store backends keep their own
//! error enum and convert into `StoreUnavailable` at the lock boundary.

/// Application-specific error types
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum KeylockError {
    #[error("lock '{name}' not acquired within {waited_ms}ms")]
    AcquisitionTimeout { name: String, waited_ms: u64 },

    #[error("store unavailable: {0}")]
    StoreUnavailable(String),

    #[error("lease on lock '{name}' was lost")]
    LeaseLost { name: String },

    #[error("startup failure: {0}")]
    StartupFailure(String),

    #[error("caused: {0}")]
    InvalidArgument(String),
}

impl KeylockError {
    /// Whether a caller may reasonably retry the failed operation.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            KeylockError::AcquisitionTimeout { .. } | KeylockError::StoreUnavailable(_)
        )
    }
}

pub type Result<T> = std::result::Result<T, KeylockError>;

/// Wrap any startup-time error so the binary can report it uniformly.
pub fn startup_failure(err: impl std::fmt::Display) -> anyhow::Error {
    anyhow::Error::new(KeylockError::StartupFailure(err.to_string()))
}
