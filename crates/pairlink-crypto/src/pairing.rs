//! Authenticated messaging scoped to one pairing.
//!
//! Peers sign their application messages with the local key and check the
//! counterpart's messages against the public key exchanged at pairing time.
//! The relay carries these messages opaquely and cannot forge them.

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use pairlink_common::Role;

use crate::error::SigningError;
use crate::keys::{KeyPair, PublicKey, Signer, Verifier};

/// Everything established when two devices paired.
#[derive(Debug)]
pub struct PairingData {
    pub pairing_id: String,
    pub role: Role,
    /// Assigned by the pairing backend; presented to the relay as the auth token.
    pub server_token: String,
    pub remote_public_key: PublicKey,
    pub local_key_pair: KeyPair,
}

/// Sign/verify capability bound to a single pairing.
#[derive(Debug)]
pub struct PairingSession {
    data: PairingData,
}

impl PairingSession {
    pub fn new(data: PairingData) -> Self {
        Self { data }
    }

    pub fn pairing_id(&self) -> &str {
        &self.data.pairing_id
    }

    pub fn role(&self) -> Role {
        self.data.role
    }

    /// Token presented to the relay in the `auth` message.
    pub fn token(&self) -> &str {
        &self.data.server_token
    }

    pub fn remote_public_key(&self) -> &PublicKey {
        &self.data.remote_public_key
    }

    /// JWK of the local public key, for handing to the counterpart.
    pub fn local_public_jwk(&self) -> String {
        self.data.local_key_pair.public_key().export_jwk()
    }

    /// Sign a message, returning the 64-byte signature as standard base64.
    pub fn sign_message(&self, message: &str) -> Result<String, SigningError> {
        let signature = self
            .data
            .local_key_pair
            .private_key()
            .sign(message.as_bytes())?;
        Ok(STANDARD.encode(signature))
    }

    /// Check a base64 signature from the counterpart.
    pub fn verify_message(&self, signature: &str, message: &str) -> bool {
        match STANDARD.decode(signature) {
            Ok(bytes) => self
                .data
                .remote_public_key
                .verify(&bytes, message.as_bytes()),
            Err(_) => false,
        }
    }
}
