//! Sealed peer cache
//!
//! The latest directory snapshot is kept on disk under AES-256-GCM as
//! `nonce || ciphertext`, replaced wholesale on every save. A load that
//! fails tag verification is a hard error: unauthenticated or truncated
//! bytes are never surfaced as a snapshot.

use aes_gcm::aead::Aead;
use aes_gcm::{Aes256Gcm, KeyInit, Nonce};
use meshdir_common::{restrict_to_owner, DirectorySnapshot, Error, Result};
use rand::RngCore;
use std::path::{Path, PathBuf};
use tokio::fs;

/// AES-GCM nonce length.
pub const NONCE_LEN: usize = 12;

const CACHE_FILE: &str = "peers.json.enc";

pub struct PeerCache {
    path: PathBuf,
    cipher: Aes256Gcm,
}

impl PeerCache {
    pub fn new(dir: impl AsRef<Path>, key: &[u8; 32]) -> Self {
        Self {
            path: dir.as_ref().join(CACHE_FILE),
            cipher: Aes256Gcm::new(key.into()),
        }
    }

    /// Seal `snapshot` to disk, fully replacing any prior cache file.
    pub async fn save(&self, snapshot: &DirectorySnapshot) -> Result<()> {
        let plaintext = serde_json::to_vec(snapshot)?;

        let mut nonce = [0u8; NONCE_LEN];
        rand::rngs::OsRng.fill_bytes(&mut nonce);

        let ciphertext = self
            .cipher
            .encrypt(Nonce::from_slice(&nonce), plaintext.as_slice())
            .map_err(|_| Error::Internal("cache encryption failed".to_string()))?;

        let mut blob = Vec::with_capacity(NONCE_LEN + ciphertext.len());
        blob.extend_from_slice(&nonce);
        blob.extend_from_slice(&ciphertext);

        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent).await?;
        }
        fs::write(&self.path, &blob).await?;
        restrict_to_owner(&self.path)?;
        Ok(())
    }

    /// Open and decrypt the cached snapshot.
    pub async fn load(&self) -> Result<DirectorySnapshot> {
        let blob = fs::read(&self.path).await?;
        if blob.len() < NONCE_LEN {
            return Err(Error::DecryptionFailure(
                "cache file shorter than nonce".to_string(),
            ));
        }

        let (nonce, ciphertext) = blob.split_at(NONCE_LEN);
        let plaintext = self
            .cipher
            .decrypt(Nonce::from_slice(nonce), ciphertext)
            .map_err(|_| Error::DecryptionFailure("authentication tag mismatch".to_string()))?;

        Ok(serde_json::from_slice(&plaintext)?)
    }
}
