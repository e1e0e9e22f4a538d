//! Session nonces exchanged between paired peers.

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use rand::rngs::OsRng;
use rand::RngCore;

/// Number of random bytes in a nonce (24 base64 characters, no padding needed).
pub const NONCE_BYTES: usize = 18;

/// Generate a fresh nonce from the OS CSPRNG.
pub fn generate_nonce() -> String {
    generate_nonce_with_rng(&mut OsRng)
}

/// Generate a nonce from the given source, standard base64 encoded.
pub fn generate_nonce_with_rng(rng: &mut impl RngCore) -> String {
    let mut bytes = [0u8; NONCE_BYTES];
    rng.fill_bytes(&mut bytes);
    STANDARD.encode(bytes)
}
