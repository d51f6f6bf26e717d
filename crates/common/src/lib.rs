//! meshdir Common Library
//!
//! Shared types, identity crypto and storage plumbing for the meshdir
//! control plane.

pub mod db;
pub mod error;
pub mod identity;
pub mod types;

// Re-export commonly used types
pub use db::Database;
pub use error::{Error, Result};
pub use identity::{AuthProof, DeviceKeyPair};
pub use types::*;

/// meshdir version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Current time as integer epoch seconds, the timestamp unit used on the
/// wire and in the directory.
pub fn now_epoch_secs() -> i64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs() as i64
}

/// Default state directory for a device agent
pub fn default_state_dir() -> std::path::PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| std::path::PathBuf::from("."))
        .join(".meshdir")
}

/// Restrict a file to owner read/write. Secret material (private keys,
/// sealed caches) must not be group or world readable.
pub fn restrict_to_owner(path: &std::path::Path) -> std::io::Result<()> {
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o600))?;
    }
    #[cfg(not(unix))]
    {
        let _ = path;
    }
    Ok(())
}

/// Home directory helper
mod dirs {
    pub fn home_dir() -> Option<std::path::PathBuf> {
        std::env::var_os("HOME").map(std::path::PathBuf::from)
    }
}
