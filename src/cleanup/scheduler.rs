//! Periodic trigger for the stale game scanner

use super::scanner::StaleGameScanner;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{error, info};

pub struct CleanupScheduler {
    scanner: Arc<StaleGameScanner>,
    interval: Duration,
}

impl CleanupScheduler {
    pub fn new(scanner: Arc<StaleGameScanner>, interval: Duration) -> Self {
        Self { scanner, interval }
    }

    /// Run until `shutdown` flips to `true` or its sender is dropped.
    ///
    /// The first scan starts immediately. Ticks missed while a scan is still
    /// running are skipped rather than queued.
    pub fn spawn(self, shutdown: watch::Receiver<bool>) -> JoinHandle<()> {
        tokio::spawn(self.run(shutdown))
    }

    async fn run(self, mut shutdown: watch::Receiver<bool>) {
        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        info!(interval_secs = self.interval.as_secs(), "cleanup scheduler started");

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    if let Err(e) = self.scanner.run_once().await {
                        error!(error = %e, "cleanup run failed, retrying next tick");
                    }
                }
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
            }
        }
        info!("cleanup scheduler stopped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cleanup::notifier::TracingNotifier;
    use crate::cleanup::scanner::ScannerConfig;
    use crate::clock::SystemClock;
    use crate::store::MemoryStore;

    #[tokio::test]
    async fn stops_on_shutdown_signal() {
        let scanner = Arc::new(StaleGameScanner::new(
            Arc::new(MemoryStore::new()),
            Arc::new(SystemClock),
            Arc::new(TracingNotifier),
            ScannerConfig::default(),
        ));
        let (tx, rx) = watch::channel(false);
        let handle = CleanupScheduler::new(scanner, Duration::from_millis(10)).spawn(rx);

        tokio::time::sleep(Duration::from_millis(30)).await;
        tx.send(true).unwrap();
        tokio::time::timeout(Duration::from_secs(1), handle)
            .await
            .expect("scheduler did not stop")
            .unwrap();
    }
}
