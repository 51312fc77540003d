//! Keylock Runner - lock-guarded shared counter workload
//!
//! This crate provides:
//! - `CriticalSection`: the increment loop that exercises the distributed lock
//! - Layered configuration (file, environment, command line)
//! - Logging and store bootstrap for the `keylock` binary

pub mod driver;
pub mod model;
pub mod startup;

pub use driver::{CriticalSection, DriverReport, DriverSettings, SharedOutput, WorkerReport};
pub use model::{Cli, Configuration};
