//! Directory sync loop
//!
//! Periodically pulls the peer directory, replaces the in-memory list and
//! seals a fresh snapshot into the cache. Network failures are logged and
//! retried next tick; the loop only exits on the shutdown signal.

use meshdir_common::{now_epoch_secs, DirectorySnapshot};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing::{debug, info, warn};

use crate::cache::PeerCache;
use crate::client::ControlClient;
use crate::peers::PeerList;

pub struct SyncLoop {
    client: Arc<ControlClient>,
    peers: PeerList,
    cache: Arc<PeerCache>,
    interval: Duration,
}

impl SyncLoop {
    pub fn new(
        client: Arc<ControlClient>,
        peers: PeerList,
        cache: Arc<PeerCache>,
        interval: Duration,
    ) -> Self {
        Self {
            client,
            peers,
            cache,
            interval,
        }
    }

    pub async fn run(self, mut shutdown: watch::Receiver<bool>) {
        info!(interval_secs = self.interval.as_secs(), "Sync loop started");

        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    if let Err(e) = self.sync_once().await {
                        warn!("Directory sync failed, will retry: {:#}", e);
                    }
                }
                _ = shutdown.changed() => break,
            }
        }

        info!("Sync loop stopped");
    }

    async fn sync_once(&self) -> anyhow::Result<()> {
        let peers = self.client.fetch_peers().await?;
        let snapshot = DirectorySnapshot::new(now_epoch_secs(), peers);

        self.peers.replace(snapshot.peers.clone()).await;

        // A failed seal costs the warm start, not the running process.
        if let Err(e) = self.cache.save(&snapshot).await {
            warn!("Failed to seal peer cache: {}", e);
        }

        debug!(peers = snapshot.peers.len(), "Directory synced");
        Ok(())
    }
}
