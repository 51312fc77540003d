//! Background lease renewal for `Lease::Watchdog` holders

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use keylock_store::SharedStore;
use tokio::sync::mpsc;
use tokio::time::{Instant, interval_at};

use super::model::LockStatsCollector;
use crate::metrics::LOCK_RENEWED_TOTAL;

/// Renews a lease every third of its length until stopped or until the
/// lease turns out to be lost.
#[derive(Debug)]
pub(crate) struct Watchdog {
    stop_tx: mpsc::Sender<()>,
    running: Arc<AtomicBool>,
    handle: tokio::task::JoinHandle<()>,
}

impl Watchdog {
    pub(crate) fn start(
        store: Arc<dyn SharedStore>,
        stats: Arc<LockStatsCollector>,
        name: String,
        token: String,
        lease: Duration,
    ) -> Self {
        let (stop_tx, mut stop_rx) = mpsc::channel::<()>(1);
        let running = Arc::new(AtomicBool::new(true));
        let period = (lease / 3).max(Duration::from_millis(1));

        let flag = running.clone();
        let handle = tokio::spawn(async move {
            let mut ticker = interval_at(Instant::now() + period, period);

            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        match store.compare_and_extend_ttl(&name, &token, lease).await {
                            Ok(true) => {
                                LockStatsCollector::incr(&stats.renewals);
                                metrics::counter!(LOCK_RENEWED_TOTAL, "lock" => name.clone())
                                    .increment(1);
                                tracing::trace!(lock = %name, "Watchdog renewed lease");
                            }
                            Ok(false) => {
                                LockStatsCollector::incr(&stats.failed_renewals);
                                tracing::warn!(lock = %name, "Watchdog found lease lost, stopping");
                                break;
                            }
                            Err(e) if e.is_transient() => {
                                // The lease may still be alive; try again next tick.
                                LockStatsCollector::incr(&stats.failed_renewals);
                                tracing::warn!(lock = %name, error = %e, "Watchdog renewal failed");
                            }
                            Err(e) => {
                                LockStatsCollector::incr(&stats.failed_renewals);
                                tracing::error!(lock = %name, error = %e, "Watchdog renewal error, stopping");
                                break;
                            }
                        }
                    }
                    _ = stop_rx.recv() => {
                        break;
                    }
                }
            }

            flag.store(false, Ordering::Release);
        });

        Self {
            stop_tx,
            running,
            handle,
        }
    }

    pub(crate) fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    pub(crate) fn stop(&self) {
        let _ = self.stop_tx.try_send(());
    }
}

impl Drop for Watchdog {
    fn drop(&mut self) {
        self.handle.abort();
    }
}
