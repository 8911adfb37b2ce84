//! Recurring refresh pass over every tracked pair

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, info};

use crate::cache::SnapshotCache;
use crate::manager::ConnectorManager;

/// Cancel handle of a running scheduler
pub struct RefreshHandle {
    cancel: Option<oneshot::Sender<()>>,
    task: JoinHandle<()>,
}

impl RefreshHandle {
    /// Stop future ticks; a pass already running is allowed to finish
    pub fn cancel(&mut self) {
        if let Some(cancel) = self.cancel.take() {
            let _ = cancel.send(());
        }
    }

    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }
}

pub struct RefreshScheduler;

impl RefreshScheduler {
    /// Run a refresh pass now and then every `period`
    pub fn spawn(
        manager: Arc<ConnectorManager>,
        cache: SnapshotCache,
        period: Duration,
    ) -> RefreshHandle {
        let (cancel, mut cancelled) = oneshot::channel();

        let task = tokio::spawn(async move {
            let mut ticker = interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            info!(period_ms = period.as_millis() as u64, "Refresh scheduler started");

            loop {
                tokio::select! {
                    _ = &mut cancelled => break,
                    _ = ticker.tick() => {
                        let pairs = cache.tracked_pairs().await;
                        if pairs.is_empty() {
                            debug!("No tracked pairs, refresh skipped");
                            continue;
                        }
                        debug!(pairs = ?pairs, "Refreshing tracked pairs");
                        manager.ensure_all(&pairs).await;
                    }
                }
            }

            info!("Refresh scheduler stopped");
        });

        RefreshHandle {
            cancel: Some(cancel),
            task,
        }
    }
}

impl Drop for RefreshHandle {
    fn drop(&mut self) {
        self.cancel();
    }
}
