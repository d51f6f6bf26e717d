//! meshdir Directory Server
//!
//! Authoritative directory for a peer-to-peer mesh: devices register with a
//! signed-timestamp proof of key ownership, the store keeps one record per
//! identity key, and a background sweeper demotes entries that have gone
//! quiet. Exposed as a small axum API.

pub mod config;
pub mod directory;
pub mod gate;
pub mod routes;
pub mod sweeper;
pub mod transport;

pub use config::ServerConfig;
pub use directory::{DirectoryStore, RecordCandidate};
pub use routes::{router, AppState};
pub use sweeper::LivenessSweeper;
pub use transport::TransportKeyPair;
