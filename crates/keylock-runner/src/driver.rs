//! Critical-section workload
//!
//! Each worker repeatedly takes the lock, increments the shared counter once,
//! emits the new value and releases. An iteration whose acquisition times out
//! is skipped, not retried, so contention or store outages show up as a final
//! counter below `workers * iterations`.

use std::io::Write;
use std::sync::Arc;
use std::time::{Duration, Instant};

use keylock_common::KeylockError;
use keylock_lock::{DistributedLock, LockConfig, LockStats, ReleaseOutcome};
use keylock_store::SharedStore;
use parking_lot::Mutex;
use tokio::task::JoinSet;
use tracing::{debug, error, info, warn};

/// Sink for post-increment values, shared by all workers.
pub type SharedOutput = Arc<Mutex<Box<dyn Write + Send>>>;

pub fn stdout_output() -> SharedOutput {
    let writer: Box<dyn Write + Send> = Box::new(std::io::stdout());
    Arc::new(Mutex::new(writer))
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DriverSettings {
    pub lock_name: String,
    pub counter_key: String,
    /// Iterations per worker
    pub iterations: u64,
    pub workers: u32,
    pub wait_timeout: Duration,
    pub lease: Duration,
    pub print_values: bool,
}

impl Default for DriverSettings {
    fn default() -> Self {
        Self {
            lock_name: "myLock".to_string(),
            counter_key: "key".to_string(),
            iterations: 10_000,
            workers: 1,
            wait_timeout: Duration::from_millis(1000),
            lease: Duration::from_millis(1000),
            print_values: true,
        }
    }
}

/// Outcome of one worker's loop
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WorkerReport {
    pub worker: u32,
    /// Iterations that held the lock and incremented the counter
    pub incremented: u64,
    /// Iterations dropped because the lock was not acquired in time
    pub skipped: u64,
    /// Iterations that held the lock but failed to increment
    pub failed_increments: u64,
    /// Releases that found the lease already expired
    pub stale_releases: u64,
    pub lock_stats: LockStats,
}

#[derive(Debug, Clone)]
pub struct DriverReport {
    pub workers: Vec<WorkerReport>,
    pub final_value: i64,
    pub elapsed: Duration,
}

impl DriverReport {
    pub fn incremented(&self) -> u64 {
        self.workers.iter().map(|w| w.incremented).sum()
    }

    pub fn skipped(&self) -> u64 {
        self.workers.iter().map(|w| w.skipped).sum()
    }

    pub fn failed_increments(&self) -> u64 {
        self.workers.iter().map(|w| w.failed_increments).sum()
    }

    /// Final counter and elapsed wall-clock time, one line each.
    pub fn write_summary(&self, out: &mut dyn Write) -> std::io::Result<()> {
        writeln!(out, "result : {}", self.final_value)?;
        writeln!(out, "elapsed time : {}ms", self.elapsed.as_millis())
    }
}

/// Drives the lock-guarded increment loop against one store.
pub struct CriticalSection {
    store: Arc<dyn SharedStore>,
    lock_config: LockConfig,
    settings: Arc<DriverSettings>,
}

impl CriticalSection {
    pub fn new(
        store: Arc<dyn SharedStore>,
        lock_config: LockConfig,
        settings: DriverSettings,
    ) -> Self {
        Self {
            store,
            lock_config,
            settings: Arc::new(settings),
        }
    }

    pub fn settings(&self) -> &DriverSettings {
        &self.settings
    }

    /// Run every worker to completion and read the final counter.
    ///
    /// Only the final read can fail; per-iteration failures are counted in
    /// the worker reports.
    pub async fn run(&self, out: SharedOutput) -> Result<DriverReport, KeylockError> {
        let started = Instant::now();
        info!(
            lock = %self.settings.lock_name,
            counter = %self.settings.counter_key,
            iterations = self.settings.iterations,
            workers = self.settings.workers,
            "Starting critical section workload"
        );

        let mut tasks = JoinSet::new();
        for worker in 0..self.settings.workers {
            // One lock client per worker: each is an independent actor.
            let lock = DistributedLock::new(self.store.clone(), self.lock_config.clone());
            tasks.spawn(run_worker(
                worker,
                lock,
                self.store.clone(),
                self.settings.clone(),
                out.clone(),
            ));
        }

        let mut workers = Vec::with_capacity(self.settings.workers as usize);
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok(report) => workers.push(report),
                Err(e) => error!(error = %e, "Worker task failed"),
            }
        }
        workers.sort_by_key(|w| w.worker);

        let final_value = self.store.get(&self.settings.counter_key).await?;
        let report = DriverReport {
            workers,
            final_value,
            elapsed: started.elapsed(),
        };

        info!(
            incremented = report.incremented(),
            skipped = report.skipped(),
            failed_increments = report.failed_increments(),
            final_value = report.final_value,
            elapsed_ms = report.elapsed.as_millis() as u64,
            "Workload finished"
        );
        Ok(report)
    }
}

async fn run_worker(
    worker: u32,
    lock: DistributedLock,
    store: Arc<dyn SharedStore>,
    settings: Arc<DriverSettings>,
    out: SharedOutput,
) -> WorkerReport {
    let mut report = WorkerReport {
        worker,
        ..Default::default()
    };

    for iteration in 0..settings.iterations {
        let Some(guard) = lock
            .lock(&settings.lock_name, settings.wait_timeout, settings.lease)
            .await
        else {
            report.skipped += 1;
            debug!(worker, iteration, "Lock not acquired, skipping iteration");
            continue;
        };

        match store.increment_and_get(&settings.counter_key).await {
            Ok(value) => {
                report.incremented += 1;
                if settings.print_values {
                    emit(&out, value);
                }
            }
            Err(e) => {
                report.failed_increments += 1;
                warn!(worker, iteration, error = %e, "Increment failed while holding lock");
            }
        }

        if guard.release().await == ReleaseOutcome::NotHeld {
            report.stale_releases += 1;
        }
    }

    report.lock_stats = lock.stats();
    debug!(worker, ?report, "Worker finished");
    report
}

fn emit(out: &SharedOutput, value: i64) {
    let mut out = out.lock();
    if let Err(e) = writeln!(out, "{}", value) {
        warn!(error = %e, "Failed to write counter value");
    }
}
