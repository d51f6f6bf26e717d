//! Shared in-memory peer list
//!
//! Replaced wholesale by the sync loop, read by the health checker and any
//! local consumer. Never partially merged.

use meshdir_common::PeerInfo;
use std::sync::Arc;
use tokio::sync::RwLock;

#[derive(Clone, Default)]
pub struct PeerList {
    inner: Arc<RwLock<Vec<PeerInfo>>>,
}

impl PeerList {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn replace(&self, peers: Vec<PeerInfo>) {
        *self.inner.write().await = peers;
    }

    pub async fn all(&self) -> Vec<PeerInfo> {
        self.inner.read().await.clone()
    }

    pub async fn len(&self) -> usize {
        self.inner.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.inner.read().await.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn peer(name: &str) -> PeerInfo {
        PeerInfo {
            name: name.to_string(),
            public_key: format!("{}-key", name),
            endpoint: "10.0.0.1:7946".to_string(),
            address: "203.0.113.5:50000".to_string(),
            last_seen: 0,
            connected: true,
        }
    }

    #[tokio::test]
    async fn replace_is_wholesale() {
        let list = PeerList::new();
        assert!(list.is_empty().await);

        list.replace(vec![peer("alpha"), peer("beta")]).await;
        assert_eq!(list.len().await, 2);
        assert!(!list.is_empty().await);

        list.replace(vec![peer("gamma")]).await;
        let all = list.all().await;
        assert_eq!(all.len(), 1);
        assert_eq!(all[0].name, "gamma");
    }
}
