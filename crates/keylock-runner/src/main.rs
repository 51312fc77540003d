use std::io::Write;

use keylock_common::error::startup_failure;
use keylock_runner::driver::{CriticalSection, stdout_output};
use keylock_runner::model::Configuration;
use keylock_runner::startup::{connect_store, init_logging};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let configuration = Configuration::new().map_err(startup_failure)?;

    let logging = configuration.logging_config().map_err(startup_failure)?;
    let _logging_guard = init_logging(&logging).map_err(startup_failure)?;

    keylock_lock::metrics::describe_metrics();

    let settings = configuration.driver_settings().map_err(startup_failure)?;

    let lock_config = configuration.lock_config().map_err(startup_failure)?;

    let store = connect_store(
        &configuration.store_url().map_err(startup_failure)?,
        configuration.store_connect_timeout().map_err(startup_failure)?,
        configuration.store_op_timeout().map_err(startup_failure)?,
    )
    .await?;

    let driver = CriticalSection::new(store, lock_config, settings);
    let output = stdout_output();
    let report = driver.run(output.clone()).await?;

    let mut out = output.lock();
    report.write_summary(&mut *out)?;
    out.flush()?;

    Ok(())
}
