//! Distributed Lock Implementation
//!
//! This module provides:
//! - Lock data model and statistics
//! - Acquire/release/renew protocol over `SharedStore`
//! - Scoped acquisition via `LockGuard`
//! - Watchdog lease renewal

mod guard;
mod model;
mod renewal;
mod service;

pub use guard::*;
pub use model::*;
pub use service::*;
