use crate::error::KeylockError;

/// Reject key names the store cannot address unambiguously.
///
/// Keys must be non-empty and free of whitespace and control characters.
pub fn validate_key(key: &str) -> Result<(), KeylockError> {
    if key.is_empty() {
        return Err(KeylockError::InvalidArgument(
            "key name must not be empty".to_string(),
        ));
    }
    if key.chars().any(|c| c.is_whitespace() || c.is_control()) {
        return Err(KeylockError::InvalidArgument(format!(
            "key name '{}' contains whitespace or control characters",
            key.escape_debug()
        )));
    }
    Ok(())
}
