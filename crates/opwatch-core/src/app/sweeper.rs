//! Background expiry of info alerts.
//!
//! Reads already prune lazily; the sweeper makes expiry visible to observers
//! even when nobody is reading.

use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::debug;

use super::tracker::Tracker;

const MIN_INTERVAL: Duration = Duration::from_millis(1);

/// Sweeper handle.
/// - `request_shutdown()` stops the loop at its next wake-up
/// - `shutdown_and_join()` also waits for it to finish
pub struct AlertSweeper {
    shutdown_tx: watch::Sender<bool>,
    join: JoinHandle<()>,
}

impl AlertSweeper {
    /// Spawn on the current tokio runtime, sweeping every `interval`
    /// (at least 1ms).
    pub fn spawn(tracker: Tracker, interval: Duration) -> Self {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let interval = interval.max(MIN_INTERVAL);
        let join = tokio::spawn(sweep_loop(tracker, interval, shutdown_rx));
        Self { shutdown_tx, join }
    }

    /// Spawn with the tracker's configured interval.
    pub fn spawn_default(tracker: Tracker) -> Self {
        let interval = tracker.config().sweep_interval();
        Self::spawn(tracker, interval)
    }

    pub fn request_shutdown(&self) {
        // receiver may already be gone
        let _ = self.shutdown_tx.send(true);
    }

    pub async fn shutdown_and_join(self) {
        self.request_shutdown();
        let _ = self.join.await;
    }
}

async fn sweep_loop(tracker: Tracker, interval: Duration, mut shutdown_rx: watch::Receiver<bool>) {
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        if *shutdown_rx.borrow() {
            break;
        }
        tokio::select! {
            changed = shutdown_rx.changed() => {
                // sender dropped counts as shutdown
                if changed.is_err() {
                    break;
                }
            }
            _ = ticker.tick() => {
                let removed = tracker.purge_expired_alerts();
                if removed > 0 {
                    debug!(removed, "sweeper expired info alerts");
                }
            }
        }
    }
    debug!("alert sweeper stopped");
}
