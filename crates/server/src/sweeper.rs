//! Liveness sweeper
//!
//! Periodic task that demotes directory records whose last authenticated
//! interaction is older than the liveness timeout. Records are only ever
//! flipped to disconnected here, never evicted; any authenticated request
//! flips them back through the gate's touch path.

use meshdir_common::{now_epoch_secs, Result};
use std::time::Duration;
use tokio::sync::watch;
use tracing::{error, info};

use crate::directory::DirectoryStore;

pub struct LivenessSweeper {
    store: DirectoryStore,
    interval: Duration,
    timeout_secs: i64,
}

impl LivenessSweeper {
    pub fn new(store: DirectoryStore, interval: Duration, timeout_secs: i64) -> Self {
        Self {
            store,
            interval,
            timeout_secs,
        }
    }

    /// Run the sweep loop until the shutdown signal fires.
    pub async fn run(self, mut shutdown: watch::Receiver<bool>) {
        info!(
            interval_secs = self.interval.as_secs(),
            timeout_secs = self.timeout_secs,
            "Liveness sweeper started"
        );

        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    match self.sweep_once(now_epoch_secs()) {
                        Ok(0) => {}
                        Ok(flipped) => info!(flipped, "Marked stale devices disconnected"),
                        Err(e) => error!("Liveness sweep failed: {}", e),
                    }
                }
                _ = shutdown.changed() => break,
            }
        }

        info!("Liveness sweeper stopped");
    }

    /// One sweep pass against the given clock.
    pub fn sweep_once(&self, now: i64) -> Result<usize> {
        self.store.mark_stale_disconnected(now, self.timeout_secs)
    }
}
