//! P-256 ECDSA keys with JWK interchange and fixed-width signatures.
//!
//! Signatures are SHA-256/ECDSA over the raw message bytes, encoded as
//! `r || s` with each half left-zero-padded to 32 bytes (IEEE P1363, the
//! layout WebCrypto produces). Anything that is not exactly 64 bytes never
//! verifies.
//!
//! # Example
//!
//! ```
//! use pairlink_crypto::keys::{KeyOperations, Signer, Verifier};
//!
//! let ops = KeyOperations::new();
//! let pair = ops.generate_key_pair().unwrap();
//!
//! let signature = pair.private_key().sign(b"offer").unwrap();
//! assert!(pair.public_key().verify(&signature, b"offer"));
//! assert!(!pair.public_key().verify(&signature, b"answer"));
//!
//! let exported = pair.public_key().export_jwk();
//! let imported = ops.import_public_key(&exported).unwrap();
//! assert_eq!(&imported, pair.public_key());
//! ```

use std::fmt;
use std::sync::{Arc, Mutex};

use p256::ecdsa::signature::{RandomizedSigner, Verifier as _};
use p256::ecdsa::{Signature, SigningKey, VerifyingKey};
use p256::{EncodedPoint, FieldBytes};
use rand::rngs::OsRng;
use rand::{CryptoRng, RngCore};
use zeroize::Zeroize;

use crate::error::{Error, ImportError, SigningError};
use crate::jwk::{decode_uint, encode_uint, JwkDocument, JwkExport, FIELD_LEN};

/// Length of an encoded signature: two 32-byte big-endian integers.
pub const SIGNATURE_LEN: usize = 2 * FIELD_LEN;

/// A cryptographically secure randomness source a key can own.
pub trait EntropySource: RngCore + CryptoRng + Send {}

impl<T: RngCore + CryptoRng + Send> EntropySource for T {}

/// Produces signatures over raw message bytes.
pub trait Signer {
    fn sign(&self, message: &[u8]) -> Result<[u8; SIGNATURE_LEN], SigningError>;
}

/// Checks signatures over raw message bytes.
pub trait Verifier {
    fn verify(&self, signature: &[u8], message: &[u8]) -> bool;
}

type RngFactory = Arc<dyn Fn() -> Box<dyn EntropySource> + Send + Sync>;

/// Entry point for importing and generating keys.
///
/// Every key produced here owns its own randomness source, drawn from the
/// factory this value was built with.
#[derive(Clone)]
pub struct KeyOperations {
    rng: RngFactory,
}

impl KeyOperations {
    /// Key operations backed by the OS CSPRNG.
    pub fn new() -> Self {
        Self::with_rng(OsRng)
    }

    /// Key operations backed by a caller-supplied source. Each key gets a clone.
    pub fn with_rng<R>(rng: R) -> Self
    where
        R: EntropySource + Clone + Sync + 'static,
    {
        Self {
            rng: Arc::new(move || Box::new(rng.clone()) as Box<dyn EntropySource>),
        }
    }

    /// Import a public key from a JWK document.
    pub fn import_public_key(&self, jwk: &str) -> Result<PublicKey, ImportError> {
        let doc = JwkDocument::parse(jwk)?;
        let x = decode_uint("x", &doc.x)?;
        let y = decode_uint("y", &doc.y)?;
        Ok(PublicKey::from_coordinates(x, y))
    }

    /// Import a private key from a JWK document carrying `d`.
    pub fn import_private_key(&self, jwk: &str) -> Result<PrivateKey, ImportError> {
        let doc = JwkDocument::parse(jwk)?;
        let x = decode_uint("x", &doc.x)?;
        let y = decode_uint("y", &doc.y)?;
        let encoded_d = doc.d.as_deref().ok_or_else(|| {
            ImportError::InvalidDocument("missing field `d`".to_string())
        })?;
        let mut d = decode_uint("d", encoded_d)?;

        let signing_key = SigningKey::from_bytes(FieldBytes::from_slice(&d));
        d.zeroize();
        let signing_key = signing_key.map_err(|_| ImportError::InvalidScalar)?;

        Ok(PrivateKey {
            signing_key,
            public_key: PublicKey::from_coordinates(x, y),
            rng: Mutex::new((self.rng)()),
        })
    }

    /// Generate a fresh key pair.
    pub fn generate_key_pair(&self) -> Result<KeyPair, Error> {
        let mut rng = (self.rng)();
        let mut source = FallibleRng::new(&mut *rng);
        let signing_key = SigningKey::random(&mut source);
        if let Some(err) = source.take_error() {
            return Err(Error::KeyGeneration(err.to_string()));
        }

        let public_key = PublicKey::from_verifying_key(signing_key.verifying_key().clone());
        let private_key = PrivateKey {
            signing_key,
            public_key: public_key.clone(),
            rng: Mutex::new(rng),
        };

        Ok(KeyPair {
            public_key,
            private_key,
        })
    }
}

impl Default for KeyOperations {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for KeyOperations {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KeyOperations").finish_non_exhaustive()
    }
}

/// A public/private key pair produced together.
#[derive(Debug)]
pub struct KeyPair {
    public_key: PublicKey,
    private_key: PrivateKey,
}

impl KeyPair {
    pub fn public_key(&self) -> &PublicKey {
        &self.public_key
    }

    pub fn private_key(&self) -> &PrivateKey {
        &self.private_key
    }

    pub fn into_parts(self) -> (PublicKey, PrivateKey) {
        (self.public_key, self.private_key)
    }
}

/// A P-256 public key.
///
/// Imported coordinates are kept as given. If they do not describe a point on
/// the curve the key is still constructed, but it verifies nothing.
#[derive(Clone)]
pub struct PublicKey {
    x: [u8; FIELD_LEN],
    y: [u8; FIELD_LEN],
    verifying_key: Option<VerifyingKey>,
}

impl PublicKey {
    fn from_coordinates(x: [u8; FIELD_LEN], y: [u8; FIELD_LEN]) -> Self {
        let point = EncodedPoint::from_affine_coordinates(
            FieldBytes::from_slice(&x),
            FieldBytes::from_slice(&y),
            false,
        );
        let verifying_key = VerifyingKey::from_encoded_point(&point).ok();
        Self {
            x,
            y,
            verifying_key,
        }
    }

    fn from_verifying_key(verifying_key: VerifyingKey) -> Self {
        let point = verifying_key.to_encoded_point(false);
        let mut x = [0u8; FIELD_LEN];
        let mut y = [0u8; FIELD_LEN];
        // An uncompressed non-identity point always carries both coordinates.
        if let (Some(px), Some(py)) = (point.x(), point.y()) {
            x.copy_from_slice(px);
            y.copy_from_slice(py);
        }
        Self {
            x,
            y,
            verifying_key: Some(verifying_key),
        }
    }

    /// Affine X coordinate, big-endian, 32 bytes.
    pub fn x(&self) -> &[u8; FIELD_LEN] {
        &self.x
    }

    /// Affine Y coordinate, big-endian, 32 bytes.
    pub fn y(&self) -> &[u8; FIELD_LEN] {
        &self.y
    }

    /// Whether the coordinates form a valid curve point.
    pub fn is_on_curve(&self) -> bool {
        self.verifying_key.is_some()
    }

    pub fn export_jwk(&self) -> String {
        JwkExport::new(&self.x, &self.y).to_string()
    }
}

impl Verifier for PublicKey {
    fn verify(&self, signature: &[u8], message: &[u8]) -> bool {
        // Each of r, s must be padded to 32 bytes. Any other total length is
        // a malformed encoding, even if the integers would verify once padded.
        if signature.len() != SIGNATURE_LEN {
            return false;
        }
        let Some(verifying_key) = &self.verifying_key else {
            return false;
        };
        let Ok(signature) = Signature::from_slice(signature) else {
            return false;
        };
        verifying_key.verify(message, &signature).is_ok()
    }
}

impl PartialEq for PublicKey {
    fn eq(&self, other: &Self) -> bool {
        self.x == other.x && self.y == other.y
    }
}

impl Eq for PublicKey {}

impl fmt::Debug for PublicKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PublicKey({})", self.export_jwk())
    }
}

/// A P-256 private key together with its public point and randomness source.
pub struct PrivateKey {
    signing_key: SigningKey,
    public_key: PublicKey,
    rng: Mutex<Box<dyn EntropySource>>,
}

impl PrivateKey {
    pub fn public_key(&self) -> &PublicKey {
        &self.public_key
    }

    pub fn export_jwk(&self) -> String {
        let mut d = self.signing_key.to_bytes();
        let mut doc = JwkExport::new(&self.public_key.x, &self.public_key.y);
        doc.d = Some(encode_uint(&d));
        d.as_mut_slice().zeroize();
        doc.to_string()
    }
}

impl Signer for PrivateKey {
    fn sign(&self, message: &[u8]) -> Result<[u8; SIGNATURE_LEN], SigningError> {
        let mut rng = self
            .rng
            .lock()
            .map_err(|_| SigningError::Entropy("randomness source lock poisoned".into()))?;
        let mut source = FallibleRng::new(&mut **rng);

        let signature: Signature = self
            .signing_key
            .try_sign_with_rng(&mut source, message)
            .map_err(|e| SigningError::Ecdsa(e.to_string()))?;
        if let Some(err) = source.take_error() {
            return Err(SigningError::Entropy(err.to_string()));
        }

        let mut out = [0u8; SIGNATURE_LEN];
        out.copy_from_slice(&signature.to_bytes());
        Ok(out)
    }
}

impl PartialEq for PrivateKey {
    fn eq(&self, other: &Self) -> bool {
        self.public_key == other.public_key && self.signing_key == other.signing_key
    }
}

impl fmt::Debug for PrivateKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PrivateKey")
            .field("public_key", &self.public_key)
            .finish_non_exhaustive()
    }
}

/// Adapts a fallible source to the infallible `fill_bytes` the ECDSA code calls,
/// remembering the first failure so the caller can surface it.
struct FallibleRng<'a> {
    inner: &'a mut dyn EntropySource,
    error: Option<rand::Error>,
}

impl<'a> FallibleRng<'a> {
    fn new(inner: &'a mut dyn EntropySource) -> Self {
        Self { inner, error: None }
    }

    fn take_error(&mut self) -> Option<rand::Error> {
        self.error.take()
    }
}

impl RngCore for FallibleRng<'_> {
    fn next_u32(&mut self) -> u32 {
        let mut buf = [0u8; 4];
        self.fill_bytes(&mut buf);
        u32::from_le_bytes(buf)
    }

    fn next_u64(&mut self) -> u64 {
        let mut buf = [0u8; 8];
        self.fill_bytes(&mut buf);
        u64::from_le_bytes(buf)
    }

    fn fill_bytes(&mut self, dest: &mut [u8]) {
        if let Err(err) = self.inner.try_fill_bytes(dest) {
            // Non-zero filler keeps scalar rejection sampling terminating;
            // the output is discarded once the error is seen.
            dest.fill(0x01);
            self.error.get_or_insert(err);
        }
    }

    fn try_fill_bytes(&mut self, dest: &mut [u8]) -> Result<(), rand::Error> {
        self.fill_bytes(dest);
        Ok(())
    }
}

impl CryptoRng for FallibleRng<'_> {}
