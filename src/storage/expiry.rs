//! Background Expiry Reaper
//!
//! Lazy expiry only removes a key when someone reads it. A key that expires
//! and is never touched again would stay in memory forever, so a background
//! task sweeps the keyspace on a fixed interval and evicts every dead entry.
//!
//! ## Design
//!
//! The reaper runs as a Tokio task and:
//! 1. Waits for the next tick (default: every 3 seconds)
//! 2. Calls [`Store::remove_expired`], which takes each shard's write lock
//! 3. Logs how many entries it removed
//!
//! Stopping is signalled through a `watch` channel. The loop selects on the
//! channel and the timer, so it exits within one tick of [`ExpiryReaper::stop`].

use crate::storage::Store;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tracing::{debug, info, trace};

/// Configuration for the expiry reaper.
#[derive(Debug, Clone)]
pub struct ExpiryConfig {
    /// Time between sweeps (default: 3s)
    pub interval: Duration,
}

impl Default for ExpiryConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(3),
        }
    }
}

/// A handle to the running reaper.
///
/// Dropping the handle stops the reaper.
#[derive(Debug)]
pub struct ExpiryReaper {
    shutdown_tx: watch::Sender<bool>,
    task: Option<JoinHandle<()>>,
}

impl ExpiryReaper {
    /// Spawns the reaper on the current Tokio runtime.
    ///
    /// # Example
    ///
    /// ```ignore
    /// use rivulet::storage::{ExpiryConfig, ExpiryReaper, Store};
    /// use std::sync::Arc;
    ///
    /// let store = Arc::new(Store::new());
    /// let reaper = ExpiryReaper::start(Arc::clone(&store), ExpiryConfig::default());
    ///
    /// // ... serve clients ...
    ///
    /// reaper.shutdown().await;
    /// ```
    pub fn start(store: Arc<Store>, config: ExpiryConfig) -> Self {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        info!(
            interval_ms = config.interval.as_millis() as u64,
            "Background expiry reaper started"
        );
        let task = tokio::spawn(reaper_loop(store, config, shutdown_rx));

        Self {
            shutdown_tx,
            task: Some(task),
        }
    }

    /// Signals the reaper to stop. Safe to call more than once.
    pub fn stop(&self) {
        let changed = self.shutdown_tx.send_if_modified(|stopped| {
            let first = !*stopped;
            *stopped = true;
            first
        });

        if changed {
            info!("Background expiry reaper stopped");
        }
    }

    /// Stops the reaper and waits for its task to finish.
    pub async fn shutdown(mut self) {
        self.stop();
        if let Some(task) = self.task.take() {
            if let Err(e) = task.await {
                debug!(error = %e, "Expiry reaper task ended abnormally");
            }
        }
    }

    pub fn is_stopped(&self) -> bool {
        *self.shutdown_tx.borrow()
    }
}

impl Drop for ExpiryReaper {
    fn drop(&mut self) {
        self.stop();
    }
}

async fn reaper_loop(store: Arc<Store>, config: ExpiryConfig, mut shutdown_rx: watch::Receiver<bool>) {
    let mut ticker = interval_at(Instant::now() + config.interval, config.interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = ticker.tick() => {}
            result = shutdown_rx.changed() => {
                if result.is_err() || *shutdown_rx.borrow() {
                    debug!("Expiry reaper received shutdown signal");
                    return;
                }
                continue;
            }
        }

        let removed = store.remove_expired();
        if removed > 0 {
            debug!(
                removed = removed,
                keys_remaining = store.keyspace().len(),
                "Expired keys reaped"
            );
        } else {
            trace!("Reaper sweep found nothing to remove");
        }
    }
}
