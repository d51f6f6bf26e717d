//! Device identity: ed25519 keypairs and signed-timestamp ownership proofs.
//!
//! A device proves it holds the private half of its identity key by signing
//! the UTF-8 decimal rendering of a current epoch timestamp. Verification
//! enforces a freshness window so an observed proof cannot be replayed later.

use crate::{Error, Result};
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use ed25519_dalek::{
    Signature, Signer as DalekSigner, SigningKey, Verifier as DalekVerifier, VerifyingKey,
};
use rand::rngs::OsRng;
use std::path::Path;
use tokio::fs;
use tracing::info;

/// ed25519 public key length in bytes.
pub const PUBLIC_KEY_LEN: usize = 32;
/// ed25519 signature length in bytes.
pub const SIGNATURE_LEN: usize = 64;

/// Maximum tolerated skew between a signed proof timestamp and the
/// verifier's clock. Bounds how long an observed proof stays replayable.
pub const DEFAULT_FRESHNESS_WINDOW_SECS: i64 = 30;

/// Header carrying the proof timestamp on protected requests.
pub const TIMESTAMP_HEADER: &str = "x-meshdir-timestamp";
/// Header carrying the proof signature on protected requests.
pub const SIGNATURE_HEADER: &str = "x-meshdir-signature";

const PUBLIC_KEY_FILE: &str = "pubkey.txt";
const PRIVATE_KEY_FILE: &str = "privkey.txt";

/// Decode a base64 wire field.
pub fn decode_base64(value: &str) -> Result<Vec<u8>> {
    Ok(BASE64.decode(value.trim())?)
}

/// Ephemeral proof of key ownership, as carried on the wire.
#[derive(Debug, Clone)]
pub struct AuthProof {
    /// Base64 ed25519 public key.
    pub public_key: String,
    /// Epoch seconds the proof was signed at.
    pub timestamp: i64,
    /// Base64 signature over the decimal rendering of `timestamp`.
    pub signature: String,
}

impl AuthProof {
    /// Decode the wire fields and verify the proof against `now`.
    pub fn verify(&self, now: i64, freshness_window_secs: i64) -> Result<()> {
        let key = decode_base64(&self.public_key)?;
        let sig = decode_base64(&self.signature)?;
        verify_proof(&key, self.timestamp, &sig, now, freshness_window_secs)
    }
}

/// Verify a signed-timestamp ownership proof.
///
/// Checks run cheapest-first: field lengths, then freshness, then the
/// signature itself. A 32-byte blob that is not a valid curve point fails
/// as `SignatureInvalid`; the malformed variants are length violations.
pub fn verify_proof(
    public_key: &[u8],
    timestamp: i64,
    signature: &[u8],
    now: i64,
    freshness_window_secs: i64,
) -> Result<()> {
    if public_key.len() != PUBLIC_KEY_LEN {
        return Err(Error::MalformedKey {
            expected: PUBLIC_KEY_LEN,
            actual: public_key.len(),
        });
    }
    if signature.len() != SIGNATURE_LEN {
        return Err(Error::MalformedSignature {
            expected: SIGNATURE_LEN,
            actual: signature.len(),
        });
    }

    // Widened so a hostile extreme timestamp cannot overflow the
    // subtraction; the skew is clamped only for reporting.
    let skew = (now as i128 - timestamp as i128).unsigned_abs();
    if skew > freshness_window_secs.max(0) as u128 {
        return Err(Error::StaleProof {
            skew: skew.min(i64::MAX as u128) as i64,
            window: freshness_window_secs,
        });
    }

    let key_bytes: [u8; PUBLIC_KEY_LEN] = public_key.try_into().map_err(|_| Error::MalformedKey {
        expected: PUBLIC_KEY_LEN,
        actual: public_key.len(),
    })?;
    let verifying_key = VerifyingKey::from_bytes(&key_bytes)?;

    let sig_bytes: [u8; SIGNATURE_LEN] =
        signature.try_into().map_err(|_| Error::MalformedSignature {
            expected: SIGNATURE_LEN,
            actual: signature.len(),
        })?;
    let sig = Signature::from_bytes(&sig_bytes);

    DalekVerifier::verify(&verifying_key, timestamp.to_string().as_bytes(), &sig)?;
    Ok(())
}

/// ed25519 identity keypair for a device
#[derive(Clone)]
pub struct DeviceKeyPair {
    signing_key: SigningKey,
}

impl DeviceKeyPair {
    /// Generate a new random keypair
    pub fn generate() -> Self {
        let signing_key = SigningKey::generate(&mut OsRng);
        Self { signing_key }
    }

    /// Load the keypair from base64 key files under `dir`
    pub async fn load(dir: impl AsRef<Path>) -> Result<Self> {
        let encoded = fs::read_to_string(dir.as_ref().join(PRIVATE_KEY_FILE)).await?;
        let data = decode_base64(&encoded)?;
        let bytes: [u8; 32] = data
            .try_into()
            .map_err(|_| Error::Encoding("private key is not 32 bytes".to_string()))?;
        Ok(Self {
            signing_key: SigningKey::from_bytes(&bytes),
        })
    }

    /// Persist the keypair as base64 key files under `dir`.
    /// The private key file is readable by the owner only.
    pub async fn save(&self, dir: impl AsRef<Path>) -> Result<()> {
        let dir = dir.as_ref();
        fs::create_dir_all(dir).await?;

        let private_path = dir.join(PRIVATE_KEY_FILE);
        fs::write(&private_path, BASE64.encode(self.signing_key.to_bytes())).await?;
        crate::restrict_to_owner(&private_path)?;

        fs::write(dir.join(PUBLIC_KEY_FILE), self.public_key_base64()).await?;
        Ok(())
    }

    /// Load the keypair stored under `dir`, generating and persisting a
    /// fresh one when no private key file exists yet.
    pub async fn load_or_generate(dir: impl AsRef<Path>) -> Result<Self> {
        let dir = dir.as_ref();
        if dir.join(PRIVATE_KEY_FILE).exists() {
            return Self::load(dir).await;
        }
        let keys = Self::generate();
        keys.save(dir).await?;
        info!(public_key = %keys.public_key_base64(), "generated new device identity");
        Ok(keys)
    }

    /// Get the public key bytes
    pub fn public_key_bytes(&self) -> [u8; PUBLIC_KEY_LEN] {
        self.signing_key.verifying_key().to_bytes()
    }

    /// Get the public key as base64, the wire encoding
    pub fn public_key_base64(&self) -> String {
        BASE64.encode(self.public_key_bytes())
    }

    /// Sign the decimal rendering of `timestamp`, returning base64
    pub fn sign_timestamp(&self, timestamp: i64) -> String {
        let sig = self.signing_key.sign(timestamp.to_string().as_bytes());
        BASE64.encode(sig.to_bytes())
    }

    /// Build a fresh ownership proof for `now`
    pub fn proof(&self, now: i64) -> AuthProof {
        AuthProof {
            public_key: self.public_key_base64(),
            timestamp: now,
            signature: self.sign_timestamp(now),
        }
    }
}

impl std::fmt::Debug for DeviceKeyPair {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DeviceKeyPair")
            .field("public_key", &self.public_key_base64())
            .finish()
    }
}
