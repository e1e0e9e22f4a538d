//! Errors raised by the key/signature engine.

use thiserror::Error;

/// Failure to import an interchange (JWK) key document.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ImportError {
    #[error("invalid JWK document: {0}")]
    InvalidDocument(String),

    #[error("JWK key type {0:?} is not acceptable")]
    UnsupportedKeyType(String),

    #[error("JWK curve {0:?} is not acceptable")]
    UnsupportedCurve(String),

    #[error("JWK member {field} is not valid base64url: {reason}")]
    InvalidEncoding { field: &'static str, reason: String },

    #[error("JWK member {0} does not fit in a P-256 field element")]
    ValueTooLarge(&'static str),

    #[error("JWK member d is not a valid P-256 private scalar")]
    InvalidScalar,
}

/// Failure while producing a signature.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SigningError {
    #[error("randomness source failed: {0}")]
    Entropy(String),

    #[error("ECDSA signing failed: {0}")]
    Ecdsa(String),
}

/// Any key/signature engine error.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Error {
    #[error("import error: {0}")]
    Import(#[from] ImportError),

    #[error("signing error: {0}")]
    Signing(#[from] SigningError),

    #[error("key generation failed: {0}")]
    KeyGeneration(String),
}

pub type Result<T> = std::result::Result<T, Error>;
