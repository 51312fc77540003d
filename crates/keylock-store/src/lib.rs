//! Keylock Store - the shared-state contract behind the distributed lock
//!
//! This crate provides:
//! - `SharedStore`: the atomic primitives the lock protocol is built on
//! - `MemoryStore`: a process-local backend with store-driven TTL expiry
//! - `RedisStore`: the production backend

pub mod error;
pub mod memory;
pub mod redis_store;
pub mod store;

pub use error::{StoreError, StoreResult};
pub use memory::MemoryStore;
pub use redis_store::RedisStore;
pub use store::SharedStore;
