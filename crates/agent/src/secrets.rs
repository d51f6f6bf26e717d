//! Cache key provisioning
//!
//! The sealed peer cache needs a stable symmetric key across restarts.
//! Provisioning layers, first success wins: the secret store, then an
//! operator-supplied environment value, then a freshly generated key that
//! is persisted back to the store. Only when persisting also fails is the
//! key printed once for the operator to capture externally.

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use meshdir_common::{restrict_to_owner, Result};
use rand::RngCore;
use std::path::PathBuf;
use tracing::{info, warn};

/// AES-256 key length.
pub const CACHE_KEY_LEN: usize = 32;

const SERVICE: &str = "meshdir";
const KEY_USER: &str = "peers-key";

/// Environment fallback for the cache key (base64, 32 bytes decoded).
pub const KEY_ENV_VAR: &str = "MESHDIR_PEERS_KEY";

/// Durable secret storage. The file-backed implementation below stands in
/// for an OS keychain; the agent only depends on this seam.
pub trait SecretStore: Send + Sync {
    fn get(&self, service: &str, user: &str) -> Result<Option<String>>;
    fn set(&self, service: &str, user: &str, value: &str) -> Result<()>;
}

/// Secret store keeping one owner-only file per (service, user) pair.
pub struct FileSecretStore {
    root: PathBuf,
}

impl FileSecretStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn entry_path(&self, service: &str, user: &str) -> PathBuf {
        self.root.join(service).join(user)
    }
}

impl SecretStore for FileSecretStore {
    fn get(&self, service: &str, user: &str) -> Result<Option<String>> {
        let path = self.entry_path(service, user);
        match std::fs::read_to_string(&path) {
            Ok(value) => Ok(Some(value.trim().to_string())),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn set(&self, service: &str, user: &str, value: &str) -> Result<()> {
        let path = self.entry_path(service, user);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(&path, value)?;
        restrict_to_owner(&path)?;
        Ok(())
    }
}

/// Resolve the cache key through the provisioning layers.
pub fn provision_key(store: &dyn SecretStore) -> Result<[u8; CACHE_KEY_LEN]> {
    provision_key_from(store, std::env::var(KEY_ENV_VAR).ok())
}

fn provision_key_from(
    store: &dyn SecretStore,
    env_value: Option<String>,
) -> Result<[u8; CACHE_KEY_LEN]> {
    if let Some(stored) = store.get(SERVICE, KEY_USER)? {
        match decode_key(&stored) {
            Some(key) => return Ok(key),
            None => warn!("stored cache key has wrong length, regenerating"),
        }
    }

    if let Some(value) = env_value {
        match decode_key(&value) {
            Some(key) => return Ok(key),
            None => warn!("{} has wrong length, ignoring", KEY_ENV_VAR),
        }
    }

    let mut key = [0u8; CACHE_KEY_LEN];
    rand::rngs::OsRng.fill_bytes(&mut key);
    let encoded = BASE64.encode(key);

    match store.set(SERVICE, KEY_USER, &encoded) {
        Ok(()) => info!("generated and stored new peer cache key"),
        Err(e) => {
            warn!("could not persist peer cache key: {}", e);
            // Last resort: surface the key once so the operator can set it
            // via the environment next start.
            eprintln!("{}={}", KEY_ENV_VAR, encoded);
        }
    }

    Ok(key)
}

fn decode_key(value: &str) -> Option<[u8; CACHE_KEY_LEN]> {
    let bytes = BASE64.decode(value.trim()).ok()?;
    bytes.try_into().ok()
}
