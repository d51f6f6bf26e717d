//! meshdir Device Agent
//!
//! Client side of the mesh control plane: registers the device identity
//! with the directory server, keeps an encrypted local mirror of the peer
//! directory, probes peer reachability and answers probes from others.

pub mod cache;
pub mod client;
pub mod health;
pub mod peers;
pub mod probe;
pub mod secrets;
pub mod sync;

pub use cache::PeerCache;
pub use client::ControlClient;
pub use peers::PeerList;
pub use secrets::{provision_key, FileSecretStore, SecretStore};
pub use sync::SyncLoop;
