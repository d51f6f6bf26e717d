//! Wire and record types shared between the directory server and agents.

use serde::{Deserialize, Serialize};

/// Authoritative directory record, one per registered identity.
///
/// `public_key` is the sole identity anchor; everything else is mutable
/// metadata a device may change on re-registration (roaming).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeviceRecord {
    pub id: String,
    pub name: String,
    /// Base64-encoded ed25519 public key; unique across the directory.
    pub public_key: String,
    /// host:port the device claims to be reachable on for direct peering.
    pub endpoint: String,
    /// Network address the server observed for the latest registration.
    pub source_address: String,
    /// Epoch seconds of the most recent authenticated interaction.
    /// Never regresses for a given record.
    pub last_seen: i64,
    pub connected: bool,
    pub registered_at: i64,
}

impl DeviceRecord {
    /// Derived liveness: a record is live while its last authenticated
    /// interaction is within `timeout_secs` of `now`.
    pub fn is_live(&self, now: i64, timeout_secs: i64) -> bool {
        now - self.last_seen <= timeout_secs
    }

    /// Client-facing projection with liveness recomputed against `now`.
    pub fn to_peer(&self, now: i64, timeout_secs: i64) -> PeerInfo {
        PeerInfo {
            name: self.name.clone(),
            public_key: self.public_key.clone(),
            endpoint: self.endpoint.clone(),
            address: self.source_address.clone(),
            last_seen: self.last_seen,
            connected: self.is_live(now, timeout_secs),
        }
    }
}

/// Directory entry as served to clients. No private fields.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PeerInfo {
    pub name: String,
    pub public_key: String,
    pub endpoint: String,
    pub address: String,
    pub last_seen: i64,
    pub connected: bool,
}

/// Registration request: name + endpoint plus a signed-timestamp proof of
/// key ownership. `signature` is over the decimal rendering of `timestamp`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegisterRequest {
    pub name: String,
    pub public_key: String,
    pub endpoint: String,
    pub timestamp: i64,
    pub signature: String,
}

/// Successful registration returns the server's transport identity and the
/// current directory, so a fresh device is immediately mesh-aware.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegisterResponse {
    pub server_public_key: String,
    pub peers: Vec<PeerInfo>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PeersResponse {
    pub peers: Vec<PeerInfo>,
}

/// Point-in-time copy of the directory as mirrored by a client. Replaced
/// wholesale on every successful sync, never partially merged.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DirectorySnapshot {
    pub fetched_at: i64,
    pub peers: Vec<PeerInfo>,
}

impl DirectorySnapshot {
    pub fn new(fetched_at: i64, peers: Vec<PeerInfo>) -> Self {
        Self { fetched_at, peers }
    }
}
