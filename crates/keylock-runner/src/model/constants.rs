// Configuration keys and their defaults

pub const DEFAULT_CONFIG_FILE: &str = "conf/application.yml";
pub const ENV_PREFIX: &str = "KEYLOCK";

pub const STORE_URL: &str = "store.url";
pub const STORE_CONNECT_TIMEOUT_MS: &str = "store.connect_timeout_ms";
pub const STORE_OP_TIMEOUT_MS: &str = "store.op_timeout_ms";

pub const DRIVER_ITERATIONS: &str = "driver.iterations";
pub const DRIVER_WORKERS: &str = "driver.workers";
pub const DRIVER_LOCK_NAME: &str = "driver.lock_name";
pub const DRIVER_COUNTER_KEY: &str = "driver.counter_key";
pub const DRIVER_WAIT_TIMEOUT_MS: &str = "driver.wait_timeout_ms";
pub const DRIVER_LEASE_MS: &str = "driver.lease_ms";
pub const DRIVER_PRINT_VALUES: &str = "driver.print_values";

pub const LOCK_FENCING: &str = "lock.fencing";
pub const LOCK_WATCHDOG_TIMEOUT_MS: &str = "lock.watchdog_timeout_ms";
pub const LOCK_POLL_INITIAL_MS: &str = "lock.poll_initial_ms";
pub const LOCK_POLL_MAX_MS: &str = "lock.poll_max_ms";

pub const LOG_LEVEL: &str = "log.level";
pub const LOG_CONSOLE: &str = "log.console";
pub const LOG_FILE: &str = "log.file";
pub const LOG_DIR: &str = "log.dir";
pub const LOG_ROTATION: &str = "log.rotation";

pub const DEFAULT_CONNECT_TIMEOUT_MS: u64 = 3000;
pub const DEFAULT_OP_TIMEOUT_MS: u64 = 1000;
pub const DEFAULT_ITERATIONS: u64 = 10_000;
pub const DEFAULT_WORKERS: u32 = 1;
pub const DEFAULT_LOCK_NAME: &str = "myLock";
pub const DEFAULT_COUNTER_KEY: &str = "key";
pub const DEFAULT_WAIT_TIMEOUT_MS: u64 = 1000;
pub const DEFAULT_LEASE_MS: u64 = 1000;
pub const DEFAULT_WATCHDOG_TIMEOUT_MS: u64 = 30_000;
pub const DEFAULT_POLL_INITIAL_MS: u64 = 5;
pub const DEFAULT_POLL_MAX_MS: u64 = 100;
