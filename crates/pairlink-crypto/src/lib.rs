//! Cryptographic primitives for Pairlink.
//!
//! This crate provides:
//! - P-256 ECDSA keys imported from and exported to JWK documents
//! - Fixed-width (`r || s`, 64 byte) signatures over SHA-256 digests
//! - Session nonces for binding signed messages to one pairing session
//! - `PairingSession`, the sign/verify capability two paired peers share
//!
//! # Design
//!
//! The wire formats match what browsers produce through WebCrypto
//! (`ECDSA` with `P-256`/`SHA-256`, JWK export), so a native peer and a web
//! peer can check each other's messages without conversion.
//!
//! Randomness is pluggable through [`keys::KeyOperations::with_rng`] so
//! tests can drive key generation from a fixed source.

#![forbid(unsafe_code)]

pub mod error;
pub mod jwk;
pub mod keys;
pub mod nonce;
pub mod pairing;

pub use error::{Error, ImportError, Result, SigningError};
pub use keys::{EntropySource, KeyOperations, KeyPair, PrivateKey, PublicKey, Signer, Verifier};
pub use nonce::{generate_nonce, generate_nonce_with_rng};
pub use pairing::{PairingData, PairingSession};
