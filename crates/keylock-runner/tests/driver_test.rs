//! Critical-section workload tests against the in-process store

use std::io::Write;
use std::sync::Arc;
use std::time::Duration;

use keylock_lock::{DistributedLock, LockConfig};
use keylock_runner::driver::{CriticalSection, DriverSettings, SharedOutput};
use keylock_store::{MemoryStore, SharedStore};
use parking_lot::Mutex;

/// Writer that collects everything written into a shared buffer.
#[derive(Clone, Default)]
struct Capture(Arc<Mutex<Vec<u8>>>);

impl Write for Capture {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.0.lock().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}

impl Capture {
    fn output(&self) -> SharedOutput {
        let writer: Box<dyn Write + Send> = Box::new(self.clone());
        Arc::new(Mutex::new(writer))
    }

    fn values(&self) -> Vec<i64> {
        String::from_utf8(self.0.lock().clone())
            .unwrap()
            .lines()
            .map(|line| line.parse().unwrap())
            .collect()
    }
}

fn settings(iterations: u64, workers: u32) -> DriverSettings {
    DriverSettings {
        iterations,
        workers,
        ..Default::default()
    }
}

#[tokio::test]
async fn test_single_worker_counts_every_iteration() {
    let store = Arc::new(MemoryStore::new());
    let driver = CriticalSection::new(store.clone(), LockConfig::default(), DriverSettings::default());
    let capture = Capture::default();

    let report = driver.run(capture.output()).await.unwrap();

    assert_eq!(report.final_value, 10_000);
    assert_eq!(report.incremented(), 10_000);
    assert_eq!(report.skipped(), 0);
    assert_eq!(capture.values(), (1..=10_000).collect::<Vec<i64>>());
    // Lock is free once the run is over
    assert_eq!(store.get_value("myLock").await.unwrap(), None);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_workers_never_lose_increments() {
    let store = Arc::new(MemoryStore::new());
    let settings = DriverSettings {
        wait_timeout: Duration::from_secs(5),
        ..settings(200, 4)
    };
    let driver = CriticalSection::new(store.clone(), LockConfig::default(), settings);
    let capture = Capture::default();

    let report = driver.run(capture.output()).await.unwrap();

    assert_eq!(report.workers.len(), 4);
    assert_eq!(report.incremented() + report.skipped(), 800);
    assert_eq!(report.final_value as u64, report.incremented());

    // Values are emitted while holding the lock, so they arrive in order
    let values = capture.values();
    assert_eq!(values.len() as u64, report.incremented());
    assert!(values.windows(2).all(|pair| pair[1] == pair[0] + 1));
}

#[tokio::test(start_paused = true)]
async fn test_iterations_skipped_while_lock_held_elsewhere() {
    let store = Arc::new(MemoryStore::new());
    let other = DistributedLock::with_defaults(store.clone());
    let _held = other
        .try_acquire("myLock", Duration::ZERO, Duration::from_secs(60))
        .await
        .unwrap();

    let driver = CriticalSection::new(store.clone(), LockConfig::default(), settings(3, 1));
    let capture = Capture::default();
    let report = driver.run(capture.output()).await.unwrap();

    assert_eq!(report.skipped(), 3);
    assert_eq!(report.incremented(), 0);
    assert_eq!(report.final_value, 0);
    assert!(capture.values().is_empty());
    assert_eq!(report.workers[0].lock_stats.timed_out_acquisitions, 3);
}

#[tokio::test]
async fn test_failed_increment_still_releases_lock() {
    let store = Arc::new(MemoryStore::new());
    store
        .set_if_absent_ttl("key", "not-a-number", Duration::from_secs(60))
        .await
        .unwrap();

    let driver = CriticalSection::new(store.clone(), LockConfig::default(), settings(2, 1));
    let capture = Capture::default();

    // The final read of a non-integer counter fails the run
    assert!(driver.run(capture.output()).await.is_err());
    assert!(capture.values().is_empty());
    assert_eq!(store.get_value("myLock").await.unwrap(), None);
}

#[tokio::test]
async fn test_print_values_disabled() {
    let store = Arc::new(MemoryStore::new());
    let settings = DriverSettings {
        print_values: false,
        ..settings(5, 1)
    };
    let driver = CriticalSection::new(store, LockConfig::default(), settings);
    let capture = Capture::default();

    let report = driver.run(capture.output()).await.unwrap();

    assert_eq!(report.final_value, 5);
    assert!(capture.values().is_empty());
}

#[tokio::test]
async fn test_summary_format() {
    let store = Arc::new(MemoryStore::new());
    let driver = CriticalSection::new(store, LockConfig::default(), settings(3, 1));
    let report = driver.run(Capture::default().output()).await.unwrap();

    let mut summary = Vec::new();
    report.write_summary(&mut summary).unwrap();
    let summary = String::from_utf8(summary).unwrap();
    let mut lines = summary.lines();

    assert_eq!(lines.next(), Some("result : 3"));
    let elapsed = lines.next().unwrap();
    assert!(elapsed.starts_with("elapsed time : "));
    assert!(elapsed.ends_with("ms"));
}
