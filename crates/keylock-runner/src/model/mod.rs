pub mod config;
pub mod constants;

pub use self::config::{Cli, Configuration};
