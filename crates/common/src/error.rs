//! Error types for meshdir

use thiserror::Error;

/// Result type alias using meshdir Error
pub type Result<T> = std::result::Result<T, Error>;

/// meshdir error types
#[derive(Error, Debug)]
pub enum Error {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Malformed public key: expected {expected} bytes, got {actual}")]
    MalformedKey { expected: usize, actual: usize },

    #[error("Malformed signature: expected {expected} bytes, got {actual}")]
    MalformedSignature { expected: usize, actual: usize },

    #[error("Signature verification failed")]
    SignatureInvalid,

    #[error("Proof timestamp is {skew}s from server time, exceeds {window}s window")]
    StaleProof { skew: i64, window: i64 },

    #[error("Missing or malformed credentials")]
    Unauthenticated,

    #[error("Unknown identity")]
    UnknownIdentity,

    #[error("Registration would roll back newer record: stored last_seen {stored}, candidate {candidate}")]
    RollbackRejected { stored: i64, candidate: i64 },

    #[error("Invalid encoding: {0}")]
    Encoding(String),

    #[error("Cache integrity violation: {0}")]
    DecryptionFailure(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl From<ed25519_dalek::SignatureError> for Error {
    fn from(_: ed25519_dalek::SignatureError) -> Self {
        Error::SignatureInvalid
    }
}

impl From<base64::DecodeError> for Error {
    fn from(e: base64::DecodeError) -> Self {
        Error::Encoding(e.to_string())
    }
}
