//! Process startup: logging and store connection

mod logging;
mod store;

pub use logging::{LogRotation, LoggingConfig, LoggingGuard, init_logging};
pub use store::{MEMORY_STORE_URL, connect_store};
