use keylock_common::KeylockError;

/// Failure of a single store primitive
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    #[error("store unavailable: {0}")]
    Unavailable(String),

    #[error("store operation '{op}' timed out after {timeout_ms}ms")]
    Timeout { op: &'static str, timeout_ms: u64 },

    #[error("value at '{0}' is not an integer")]
    NotAnInteger(String),

    #[error("store backend error: {0}")]
    Backend(String),
}

impl StoreError {
    /// Network-level failures that may clear up on their own.
    pub fn is_transient(&self) -> bool {
        matches!(self, StoreError::Unavailable(_) | StoreError::Timeout { .. })
    }
}

impl From<StoreError> for KeylockError {
    fn from(err: StoreError) -> Self {
        KeylockError::StoreUnavailable(err.to_string())
    }
}

impl From<redis::RedisError> for StoreError {
    fn from(err: redis::RedisError) -> Self {
        if err.is_io_error()
            || err.is_connection_refusal()
            || err.is_connection_dropped()
            || err.is_timeout()
        {
            StoreError::Unavailable(err.to_string())
        } else {
            StoreError::Backend(err.to_string())
        }
    }
}

pub type StoreResult<T> = std::result::Result<T, StoreError>;
