//! Configuration management for the keylock runner
//!
//! Sources, lowest precedence first: built-in defaults, the YAML config file
//! (`conf/application.yml` unless `--config` is given), `KEYLOCK_*`
//! environment variables (`KEYLOCK_DRIVER__ITERATIONS=5`), command line flags.

use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use clap::Parser;
use config::{Config, ConfigError, Environment, File};
use keylock_common::{DEFAULT_STORE_URL, KeylockError, validate_key};
use keylock_lock::{BackoffPolicy, LockConfig};
use tracing::Level;

use super::constants::*;
use crate::driver::DriverSettings;
use crate::startup::{LogRotation, LoggingConfig};

/// Command line arguments for the runner
#[derive(Debug, Default, Parser)]
#[command(
    name = "keylock",
    version,
    about = "Increment a shared counter under a distributed lock"
)]
pub struct Cli {
    /// Config file (default: conf/application.yml, optional)
    #[arg(short = 'c', long = "config")]
    pub config: Option<PathBuf>,
    /// Shared store address, e.g. redis://localhost:6379 or memory://
    #[arg(long = "store-url", env = "KEYLOCK_STORE_URL")]
    pub store_url: Option<String>,
    /// Iterations per worker
    #[arg(short = 'n', long = "iterations")]
    pub iterations: Option<u64>,
    /// Concurrent actors contending for the lock
    #[arg(short = 'w', long = "workers")]
    pub workers: Option<u32>,
    #[arg(long = "lock-name")]
    pub lock_name: Option<String>,
    #[arg(long = "counter-key")]
    pub counter_key: Option<String>,
    #[arg(long = "wait-timeout-ms")]
    pub wait_timeout_ms: Option<u64>,
    #[arg(long = "lease-ms")]
    pub lease_ms: Option<u64>,
    /// Do not print every post-increment value
    #[arg(short = 'q', long = "quiet")]
    pub quiet: bool,
}

/// Application configuration loaded from config files, environment and flags
#[derive(Clone, Debug, Default)]
pub struct Configuration {
    pub config: Config,
}

impl Configuration {
    /// Build from the process arguments.
    pub fn new() -> Result<Self, ConfigError> {
        Self::from_cli(Cli::parse())
    }

    /// Build from an explicit argument list (first item is the program name).
    pub fn from_args<I, T>(args: I) -> Result<Self, ConfigError>
    where
        I: IntoIterator<Item = T>,
        T: Into<std::ffi::OsString> + Clone,
    {
        let cli = Cli::try_parse_from(args).map_err(|e| ConfigError::Message(e.to_string()))?;
        Self::from_cli(cli)
    }

    pub fn from_cli(args: Cli) -> Result<Self, ConfigError> {
        let file = match &args.config {
            Some(path) => File::from(path.as_path()).required(true),
            None => File::with_name(DEFAULT_CONFIG_FILE).required(false),
        };

        let mut config_builder = Config::builder().add_source(file).add_source(
            Environment::with_prefix(ENV_PREFIX)
                .prefix_separator("_")
                .separator("__")
                .try_parsing(true),
        );

        if let Some(v) = args.store_url {
            config_builder = config_builder.set_override(STORE_URL, v)?;
        }
        if let Some(v) = args.iterations {
            config_builder = config_builder.set_override(DRIVER_ITERATIONS, v as i64)?;
        }
        if let Some(v) = args.workers {
            config_builder = config_builder.set_override(DRIVER_WORKERS, v as i64)?;
        }
        if let Some(v) = args.lock_name {
            config_builder = config_builder.set_override(DRIVER_LOCK_NAME, v)?;
        }
        if let Some(v) = args.counter_key {
            config_builder = config_builder.set_override(DRIVER_COUNTER_KEY, v)?;
        }
        if let Some(v) = args.wait_timeout_ms {
            config_builder = config_builder.set_override(DRIVER_WAIT_TIMEOUT_MS, v as i64)?;
        }
        if let Some(v) = args.lease_ms {
            config_builder = config_builder.set_override(DRIVER_LEASE_MS, v as i64)?;
        }
        if args.quiet {
            config_builder = config_builder.set_override(DRIVER_PRINT_VALUES, false)?;
        }

        Ok(Configuration {
            config: config_builder.build()?,
        })
    }

    /// Read `key` with `read`, falling back to `default` only when the key is
    /// unset. A value that is present but does not convert is rejected.
    fn get_or<T>(
        &self,
        key: &str,
        default: T,
        read: impl FnOnce(&Config, &str) -> Result<T, ConfigError>,
    ) -> Result<T, KeylockError> {
        match read(&self.config, key) {
            Ok(value) => Ok(value),
            Err(ConfigError::NotFound(_)) => Ok(default),
            Err(e) => Err(invalid_value(key, e)),
        }
    }

    fn get_u64(&self, key: &str, default: u64) -> Result<u64, KeylockError> {
        let Some(value) = self.get_or(key, None, |c, k| c.get_int(k).map(Some))? else {
            return Ok(default);
        };
        u64::try_from(value).map_err(|_| invalid_value(key, format!("{} is negative", value)))
    }

    fn get_millis(&self, key: &str, default_ms: u64) -> Result<Duration, KeylockError> {
        self.get_u64(key, default_ms).map(Duration::from_millis)
    }

    fn get_string(&self, key: &str, default: &str) -> Result<String, KeylockError> {
        self.get_or(key, default.to_string(), Config::get_string)
    }

    fn get_bool(&self, key: &str, default: bool) -> Result<bool, KeylockError> {
        self.get_or(key, default, Config::get_bool)
    }

    fn get_parsed<T>(&self, key: &str, default: T) -> Result<T, KeylockError>
    where
        T: FromStr,
        T::Err: std::fmt::Display,
    {
        match self.get_or(key, None, |c, k| c.get_string(k).map(Some))? {
            Some(raw) => raw.parse::<T>().map_err(|e| invalid_value(key, e)),
            None => Ok(default),
        }
    }

    // ========================================================================
    // Store Configuration
    // ========================================================================

    pub fn store_url(&self) -> Result<String, KeylockError> {
        self.get_string(STORE_URL, DEFAULT_STORE_URL)
    }

    pub fn store_connect_timeout(&self) -> Result<Duration, KeylockError> {
        self.get_millis(STORE_CONNECT_TIMEOUT_MS, DEFAULT_CONNECT_TIMEOUT_MS)
    }

    pub fn store_op_timeout(&self) -> Result<Duration, KeylockError> {
        self.get_millis(STORE_OP_TIMEOUT_MS, DEFAULT_OP_TIMEOUT_MS)
    }

    // ========================================================================
    // Driver Configuration
    // ========================================================================

    pub fn iterations(&self) -> Result<u64, KeylockError> {
        self.get_u64(DRIVER_ITERATIONS, DEFAULT_ITERATIONS)
    }

    pub fn workers(&self) -> Result<u32, KeylockError> {
        let workers = self.get_u64(DRIVER_WORKERS, u64::from(DEFAULT_WORKERS))?;
        u32::try_from(workers)
            .map_err(|_| invalid_value(DRIVER_WORKERS, format!("{} is too large", workers)))
    }

    pub fn lock_name(&self) -> Result<String, KeylockError> {
        self.get_string(DRIVER_LOCK_NAME, DEFAULT_LOCK_NAME)
    }

    pub fn counter_key(&self) -> Result<String, KeylockError> {
        self.get_string(DRIVER_COUNTER_KEY, DEFAULT_COUNTER_KEY)
    }

    pub fn wait_timeout(&self) -> Result<Duration, KeylockError> {
        self.get_millis(DRIVER_WAIT_TIMEOUT_MS, DEFAULT_WAIT_TIMEOUT_MS)
    }

    pub fn lease(&self) -> Result<Duration, KeylockError> {
        self.get_millis(DRIVER_LEASE_MS, DEFAULT_LEASE_MS)
    }

    pub fn print_values(&self) -> Result<bool, KeylockError> {
        self.get_bool(DRIVER_PRINT_VALUES, true)
    }

    /// Driver settings, rejecting values the workload cannot run with.
    pub fn driver_settings(&self) -> Result<DriverSettings, KeylockError> {
        let settings = DriverSettings {
            lock_name: self.lock_name()?,
            counter_key: self.counter_key()?,
            iterations: self.iterations()?,
            workers: self.workers()?,
            wait_timeout: self.wait_timeout()?,
            lease: self.lease()?,
            print_values: self.print_values()?,
        };

        validate_key(&settings.lock_name)?;
        validate_key(&settings.counter_key)?;
        if settings.lock_name == settings.counter_key {
            return Err(KeylockError::InvalidArgument(format!(
                "lock name and counter key must differ (both '{}')",
                settings.lock_name
            )));
        }
        if settings.iterations == 0 {
            return Err(KeylockError::InvalidArgument(
                "iterations must be greater than zero".to_string(),
            ));
        }
        if settings.workers == 0 {
            return Err(KeylockError::InvalidArgument(
                "workers must be greater than zero".to_string(),
            ));
        }
        if settings.lease.is_zero() {
            return Err(KeylockError::InvalidArgument(
                "lease must be greater than zero".to_string(),
            ));
        }

        Ok(settings)
    }

    // ========================================================================
    // Lock Configuration
    // ========================================================================

    pub fn lock_config(&self) -> Result<LockConfig, KeylockError> {
        Ok(LockConfig {
            backoff: BackoffPolicy::new(
                self.get_millis(LOCK_POLL_INITIAL_MS, DEFAULT_POLL_INITIAL_MS)?,
                self.get_millis(LOCK_POLL_MAX_MS, DEFAULT_POLL_MAX_MS)?,
            ),
            watchdog_timeout: self
                .get_millis(LOCK_WATCHDOG_TIMEOUT_MS, DEFAULT_WATCHDOG_TIMEOUT_MS)?,
            fencing: self.get_bool(LOCK_FENCING, false)?,
        })
    }

    // ========================================================================
    // Logging Configuration
    // ========================================================================

    pub fn logging_config(&self) -> Result<LoggingConfig, KeylockError> {
        let defaults = LoggingConfig::default();
        let level = self.get_parsed::<Level>(LOG_LEVEL, defaults.console_level)?;

        Ok(LoggingConfig {
            log_dir: self
                .get_or(LOG_DIR, None, |c, k| c.get_string(k).map(Some))?
                .map(PathBuf::from)
                .unwrap_or(defaults.log_dir),
            console_output: self.get_bool(LOG_CONSOLE, defaults.console_output)?,
            console_level: level,
            file_logging: self.get_bool(LOG_FILE, defaults.file_logging)?,
            file_level: level,
            rotation: self.get_parsed(LOG_ROTATION, defaults.rotation)?,
        })
    }
}

fn invalid_value(key: &str, reason: impl std::fmt::Display) -> KeylockError {
    KeylockError::InvalidArgument(format!("invalid value for '{}': {}", key, reason))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn from_args(args: &[&str]) -> Configuration {
        let mut full = vec!["keylock"];
        full.extend_from_slice(args);
        Configuration::from_args(full).unwrap()
    }

    #[test]
    fn test_defaults_match_workload() {
        let config = Configuration {
            config: Config::default(),
        };
        let settings = config.driver_settings().unwrap();

        assert_eq!(settings.lock_name, "myLock");
        assert_eq!(settings.counter_key, "key");
        assert_eq!(settings.iterations, 10_000);
        assert_eq!(settings.workers, 1);
        assert_eq!(settings.wait_timeout, Duration::from_millis(1000));
        assert_eq!(settings.lease, Duration::from_millis(1000));
        assert!(settings.print_values);
        assert_eq!(config.store_url().unwrap(), "redis://localhost:6379");
        assert_eq!(
            config.lock_config().unwrap().backoff.max,
            Duration::from_millis(100)
        );
    }

    #[test]
    fn test_cli_overrides() {
        let config = from_args(&[
            "--store-url",
            "memory://",
            "-n",
            "25",
            "--workers",
            "3",
            "--lock-name",
            "orders",
            "--counter-key",
            "orders-count",
            "--wait-timeout-ms",
            "250",
            "--lease-ms",
            "500",
            "--quiet",
        ]);
        let settings = config.driver_settings().unwrap();

        assert_eq!(config.store_url().unwrap(), "memory://");
        assert_eq!(settings.iterations, 25);
        assert_eq!(settings.workers, 3);
        assert_eq!(settings.lock_name, "orders");
        assert_eq!(settings.counter_key, "orders-count");
        assert_eq!(settings.wait_timeout, Duration::from_millis(250));
        assert_eq!(settings.lease, Duration::from_millis(500));
        assert!(!settings.print_values);
    }

    #[test]
    fn test_config_file_source() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("application.yml");
        std::fs::write(
            &path,
            "driver:\n  iterations: 7\n  lock_name: fileLock\nlock:\n  fencing: true\nlog:\n  level: debug\n  rotation: hourly\n",
        )
        .unwrap();

        let config = from_args(&["--config", path.to_str().unwrap(), "-n", "9"]);
        let settings = config.driver_settings().unwrap();

        // Flags win over the file
        assert_eq!(settings.iterations, 9);
        assert_eq!(settings.lock_name, "fileLock");
        assert!(config.lock_config().unwrap().fencing);

        let logging = config.logging_config().unwrap();
        assert_eq!(logging.console_level, Level::DEBUG);
        assert!(matches!(logging.rotation, LogRotation::Hourly));
    }

    #[test]
    fn test_missing_explicit_config_file_is_an_error() {
        let result = Configuration::from_args(["keylock", "--config", "/nonexistent/keylock.yml"]);
        assert!(result.is_err());
    }

    #[test]
    fn test_invalid_settings_rejected() {
        for args in [
            &["-n", "0"][..],
            &["--workers", "0"][..],
            &["--lease-ms", "0"][..],
            &["--lock-name", "key"][..],
            &["--lock-name", "my lock"][..],
        ] {
            let config = from_args(args);
            assert!(
                matches!(
                    config.driver_settings(),
                    Err(KeylockError::InvalidArgument(_))
                ),
                "accepted {args:?}"
            );
        }
    }

    fn with_values(values: &[(&str, &str)]) -> Configuration {
        let mut builder = Config::builder();
        for (key, value) in values {
            builder = builder.set_override(*key, *value).unwrap();
        }
        Configuration {
            config: builder.build().unwrap(),
        }
    }

    fn assert_invalid<T: std::fmt::Debug>(result: Result<T, KeylockError>, key: &str) {
        match result {
            Err(KeylockError::InvalidArgument(message)) => {
                assert!(message.contains(key), "{message} does not name {key}")
            }
            other => panic!("expected InvalidArgument for {key}, got {other:?}"),
        }
    }

    #[test]
    fn test_present_but_invalid_values_rejected() {
        assert_invalid(
            with_values(&[(DRIVER_ITERATIONS, "-5")]).driver_settings(),
            DRIVER_ITERATIONS,
        );
        assert_invalid(
            with_values(&[(DRIVER_LEASE_MS, "abc")]).driver_settings(),
            DRIVER_LEASE_MS,
        );
        assert_invalid(
            with_values(&[(DRIVER_WORKERS, "5000000000")]).driver_settings(),
            DRIVER_WORKERS,
        );
        assert_invalid(
            with_values(&[(DRIVER_PRINT_VALUES, "sometimes")]).driver_settings(),
            DRIVER_PRINT_VALUES,
        );
        assert_invalid(
            with_values(&[(LOCK_POLL_MAX_MS, "fast")]).lock_config(),
            LOCK_POLL_MAX_MS,
        );
        assert_invalid(
            with_values(&[(STORE_OP_TIMEOUT_MS, "-1")]).store_op_timeout(),
            STORE_OP_TIMEOUT_MS,
        );
        assert_invalid(
            with_values(&[(LOG_LEVEL, "verbose")]).logging_config(),
            LOG_LEVEL,
        );
        assert_invalid(
            with_values(&[(LOG_ROTATION, "weekly")]).logging_config(),
            LOG_ROTATION,
        );
    }

    #[test]
    fn test_valid_string_values_are_parsed() {
        let config = with_values(&[
            (DRIVER_ITERATIONS, "12"),
            (DRIVER_PRINT_VALUES, "false"),
            (LOG_LEVEL, "warn"),
        ]);
        let settings = config.driver_settings().unwrap();

        assert_eq!(settings.iterations, 12);
        assert!(!settings.print_values);
        assert_eq!(config.logging_config().unwrap().console_level, Level::WARN);
    }
}
