//! Server configuration

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Directory server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// HTTP listen address
    pub listen: String,

    /// State directory (database, transport keys)
    pub state_dir: PathBuf,

    /// Liveness sweep interval in seconds
    pub sweep_interval_secs: u64,

    /// A record with no authenticated interaction for this long is
    /// considered disconnected
    pub liveness_timeout_secs: i64,

    /// Maximum tolerated age of a signed proof timestamp
    pub freshness_window_secs: i64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen: "127.0.0.1:8080".to_string(),
            state_dir: meshdir_common::default_state_dir().join("server"),
            sweep_interval_secs: 10,
            liveness_timeout_secs: 30,
            freshness_window_secs: 30,
        }
    }
}

impl ServerConfig {
    /// Load configuration from file, falling back to defaults when absent
    pub fn load(path: &std::path::Path) -> anyhow::Result<Self> {
        if path.exists() {
            let content = std::fs::read_to_string(path)?;
            let config: Self = toml::from_str(&content)?;
            Ok(config)
        } else {
            Ok(Self::default())
        }
    }

    /// Save configuration to file
    pub fn save(&self, path: &std::path::Path) -> anyhow::Result<()> {
        let content = toml::to_string_pretty(self)?;
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Get the directory database path
    pub fn db_path(&self) -> PathBuf {
        self.state_dir.join("directory.db")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn load_missing_file_yields_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = ServerConfig::load(&dir.path().join("absent.toml")).unwrap();
        assert_eq!(config.sweep_interval_secs, 10);
        assert_eq!(config.liveness_timeout_secs, 30);
    }

    #[test]
    fn save_load_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("server.toml");

        let mut config = ServerConfig::default();
        config.listen = "0.0.0.0:9999".to_string();
        config.save(&path).unwrap();

        let loaded = ServerConfig::load(&path).unwrap();
        assert_eq!(loaded.listen, "0.0.0.0:9999");
    }
}
