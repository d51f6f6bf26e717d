//! Peer health checker
//!
//! Probes every cached peer's `/ping` endpoint on an interval and logs
//! reachability transitions. Local observation only: liveness in the
//! directory is the server's call, this never mutates it.

use anyhow::Result;
use std::collections::HashMap;
use std::time::Duration;
use tokio::sync::watch;
use tracing::{debug, info, warn};

use crate::peers::PeerList;

pub struct HealthChecker {
    http: reqwest::Client,
    peers: PeerList,
    own_key: String,
    interval: Duration,
}

impl HealthChecker {
    pub fn new(peers: PeerList, own_key: String, interval: Duration) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(2))
            .build()?;
        Ok(Self {
            http,
            peers,
            own_key,
            interval,
        })
    }

    pub async fn run(self, mut shutdown: watch::Receiver<bool>) {
        info!(
            interval_secs = self.interval.as_secs(),
            "Health checker started"
        );

        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        let mut reachable: HashMap<String, bool> = HashMap::new();

        loop {
            tokio::select! {
                _ = ticker.tick() => self.check_once(&mut reachable).await,
                _ = shutdown.changed() => break,
            }
        }

        info!("Health checker stopped");
    }

    async fn check_once(&self, reachable: &mut HashMap<String, bool>) {
        for peer in self.peers.all().await {
            if peer.public_key == self.own_key {
                continue;
            }

            let url = format!("http://{}/ping", peer.endpoint);
            let up = matches!(self.http.get(&url).send().await, Ok(r) if r.status().is_success());

            match reachable.insert(peer.public_key.clone(), up) {
                Some(was_up) if was_up == up => {}
                Some(true) => warn!(peer = %peer.name, endpoint = %peer.endpoint, "Peer became unreachable"),
                Some(false) => info!(peer = %peer.name, endpoint = %peer.endpoint, "Peer became reachable"),
                None if up => debug!(peer = %peer.name, "Peer reachable"),
                None => debug!(peer = %peer.name, endpoint = %peer.endpoint, "Peer unreachable"),
            }
        }
    }
}
