//! Keylock Common - Shared types and utilities
//!
//! This crate provides the foundational types used across all keylock components:
//! - Error taxonomy for lock and store failures
//! - Key validation

pub mod error;
pub mod utils;

// Re-exports for convenience
pub use error::{KeylockError, Result};
pub use utils::validate_key;

/// Default address of the shared store
pub const DEFAULT_STORE_URL: &str = "redis://localhost:6379";

/// Suffix of the counter backing fence tokens for a lock
pub const FENCE_KEY_SUFFIX: &str = ":fence";
