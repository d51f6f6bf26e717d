//! Server transport identity
//!
//! An x25519 keypair whose public half is advertised in every registration
//! response, letting clients authenticate the server at the network layer.
//! Orthogonal to device identity: devices sign with ed25519, this key never
//! signs anything.

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use meshdir_common::{Error, Result};
use rand::RngCore;
use std::path::Path;
use tracing::info;
use x25519_dalek::{PublicKey, StaticSecret};

const PRIVATE_KEY_FILE: &str = "transport.key";
const PUBLIC_KEY_FILE: &str = "transport.pub";

/// x25519 transport keypair for the directory server.
pub struct TransportKeyPair {
    secret: StaticSecret,
}

impl TransportKeyPair {
    /// Generate a fresh keypair with the standard curve25519 clamping.
    pub fn generate() -> Self {
        let mut bytes = [0u8; 32];
        rand::rngs::OsRng.fill_bytes(&mut bytes);

        bytes[0] &= 248;
        bytes[31] &= 127;
        bytes[31] |= 64;

        Self {
            secret: StaticSecret::from(bytes),
        }
    }

    /// Load the keypair stored under `dir`, generating and persisting a
    /// fresh one when no private key file exists yet.
    pub fn load_or_generate(dir: impl AsRef<Path>) -> Result<Self> {
        let dir = dir.as_ref();
        let private_path = dir.join(PRIVATE_KEY_FILE);

        if private_path.exists() {
            let encoded = std::fs::read_to_string(&private_path)?;
            let data = BASE64
                .decode(encoded.trim())
                .map_err(|e| Error::Encoding(e.to_string()))?;
            let bytes: [u8; 32] = data
                .try_into()
                .map_err(|_| Error::Encoding("transport key is not 32 bytes".to_string()))?;
            return Ok(Self {
                secret: StaticSecret::from(bytes),
            });
        }

        let keys = Self::generate();
        std::fs::create_dir_all(dir)?;
        std::fs::write(&private_path, BASE64.encode(keys.secret.to_bytes()))?;
        meshdir_common::restrict_to_owner(&private_path)?;
        std::fs::write(dir.join(PUBLIC_KEY_FILE), keys.public_key_base64())?;

        info!(public_key = %keys.public_key_base64(), "generated server transport identity");
        Ok(keys)
    }

    /// Public half as base64, the wire encoding.
    pub fn public_key_base64(&self) -> String {
        BASE64.encode(PublicKey::from(&self.secret).as_bytes())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generated_secret_is_clamped() {
        let keys = TransportKeyPair::generate();
        let bytes = keys.secret.to_bytes();
        assert_eq!(bytes[0] & 7, 0);
        assert_eq!(bytes[31] & 128, 0);
        assert_eq!(bytes[31] & 64, 64);
    }

    #[test]
    fn load_or_generate_is_stable() {
        let dir = tempfile::tempdir().unwrap();
        let first = TransportKeyPair::load_or_generate(dir.path()).unwrap();
        let second = TransportKeyPair::load_or_generate(dir.path()).unwrap();
        assert_eq!(first.public_key_base64(), second.public_key_base64());
    }

    #[cfg(unix)]
    #[test]
    fn private_key_file_is_owner_only() {
        use std::os::unix::fs::PermissionsExt;
        let dir = tempfile::tempdir().unwrap();
        TransportKeyPair::load_or_generate(dir.path()).unwrap();
        let mode = std::fs::metadata(dir.path().join("transport.key"))
            .unwrap()
            .permissions()
            .mode();
        assert_eq!(mode & 0o777, 0o600);
    }
}
