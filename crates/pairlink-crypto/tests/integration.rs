//! Integration tests for JWK interchange and fixed-width ECDSA signatures.

use pairlink_crypto::keys::SIGNATURE_LEN;
use pairlink_crypto::{ImportError, KeyOperations, Signer, Verifier};
use rand::{CryptoRng, RngCore};
use serde_json::Value;

// Example values from RFC 7517, appendix A.
const RFC_X: &str = "MKBCTNIcKUSDii11ySs3526iDZ8AiTo7Tu6KPAqv7D4";
const RFC_Y: &str = "4Etl6SRW2YiLUrN5vfvVHuhp7x8PxltmWWlbbM4IFyM";
const RFC_D: &str = "870MB6gfuTJ4HtUnUvYMyJpr5eUZNP4Bk43bVdj3eAE";

/// Source that yields the same byte forever.
#[derive(Clone)]
struct ConstRng(u8);

impl RngCore for ConstRng {
    fn next_u32(&mut self) -> u32 {
        u32::from_le_bytes([self.0; 4])
    }

    fn next_u64(&mut self) -> u64 {
        u64::from_le_bytes([self.0; 8])
    }

    fn fill_bytes(&mut self, dest: &mut [u8]) {
        dest.fill(self.0);
    }

    fn try_fill_bytes(&mut self, dest: &mut [u8]) -> Result<(), rand::Error> {
        self.fill_bytes(dest);
        Ok(())
    }
}

impl CryptoRng for ConstRng {}

fn ones() -> KeyOperations {
    KeyOperations::with_rng(ConstRng(1))
}

fn parse(json: &str) -> Value {
    serde_json::from_str(json).unwrap()
}

fn public_doc(kty: &str, crv: &str, x: &str, y: &str) -> String {
    format!(r#"{{"kty":"{kty}","crv":"{crv}","x":"{x}","y":"{y}"}}"#)
}

#[test]
fn test_public_key_round_trip() {
    let key = ones()
        .import_public_key(&public_doc("EC", "P-256", RFC_X, RFC_Y))
        .unwrap();

    let exported = parse(&key.export_jwk());
    assert_eq!(exported["kty"], "EC");
    assert_eq!(exported["crv"], "P-256");
    assert_eq!(exported["x"], RFC_X);
    assert_eq!(exported["y"], RFC_Y);
    assert!(exported.get("d").is_none());
}

#[test]
fn test_public_key_import_extra_values() {
    let doc = format!(
        r#"{{"kty":"EC","crv":"P-256","x":"{RFC_X}","y":"{RFC_Y}","kid":"1","use":"sig"}}"#
    );
    assert!(ones().import_public_key(&doc).is_ok());
}

#[test]
fn test_public_key_import_invalid_json() {
    let err = ones().import_public_key("blah").unwrap_err();
    assert!(matches!(err, ImportError::InvalidDocument(_)));
}

#[test]
fn test_public_key_import_invalid_algorithm() {
    let err = ones()
        .import_public_key(&public_doc("RSA", "P-256", "0", "0"))
        .unwrap_err();
    assert_eq!(err, ImportError::UnsupportedKeyType("RSA".into()));
}

#[test]
fn test_public_key_import_invalid_curve() {
    let err = ones()
        .import_public_key(&public_doc("EC", "P-384", "0", "0"))
        .unwrap_err();
    assert_eq!(err, ImportError::UnsupportedCurve("P-384".into()));
}

#[test]
fn test_public_key_import_invalid_parameters() {
    let err = ones()
        .import_public_key(&public_doc("EC", "P-256", "0", "0"))
        .unwrap_err();
    assert!(matches!(err, ImportError::InvalidEncoding { field: "x", .. }));

    let err = ones()
        .import_public_key(&public_doc("EC", "P-256", RFC_X, "4Etl6SRW2YiLUrN5vfvVHuhp7x8Pxltm+Wlb"))
        .unwrap_err();
    assert!(matches!(err, ImportError::InvalidEncoding { field: "y", .. }));
}

#[test]
fn test_public_key_import_lenient_inputs() {
    // Non-zero trailing bits decode; the resulting point is off the curve.
    let key = ones()
        .import_public_key(&public_doc("EC", "P-256", "AB", RFC_Y))
        .unwrap();
    assert_eq!(key.x(), &[0u8; 32]);
    assert!(!key.is_on_curve());

    // A missing coordinate reads as zero.
    let key = ones()
        .import_public_key(&format!(r#"{{"kty":"EC","crv":"P-256","x":"{RFC_X}"}}"#))
        .unwrap();
    assert_eq!(key.y(), &[0u8; 32]);
    assert!(!key.is_on_curve());

    let pair = KeyOperations::new().generate_key_pair().unwrap();
    let signature = pair.private_key().sign(b"hello").unwrap();
    assert!(!key.verify(&signature, b"hello"));
}

#[test]
fn test_private_key_round_trip() {
    let doc = format!(
        r#"{{"kty":"EC","crv":"P-256","x":"{RFC_X}","y":"{RFC_Y}","d":"{RFC_D}"}}"#
    );
    let key = ones().import_private_key(&doc).unwrap();

    let exported = parse(&key.export_jwk());
    assert_eq!(exported["kty"], "EC");
    assert_eq!(exported["crv"], "P-256");
    assert_eq!(exported["x"], RFC_X);
    assert_eq!(exported["y"], RFC_Y);
    assert_eq!(exported["d"], RFC_D);
}

#[test]
fn test_generate_export_from_fixed_source() {
    let pair = ones().generate_key_pair().unwrap();

    let public = parse(&pair.public_key().export_jwk());
    assert_eq!(public["kty"], "EC");
    assert_eq!(public["crv"], "P-256");
    assert_eq!(public["x"], "b_A7lJJBzh2t1DUZ5pYOCoW0GmmgXDKBA6orzhWUyhY");
    assert_eq!(public["y"], "PE91OlW_AdxT9sCwx-7ni0DG_30lqW4igrmJzvccFEo");

    let private = parse(&pair.private_key().export_jwk());
    assert_eq!(private["x"], public["x"]);
    assert_eq!(private["y"], public["y"]);
    assert_eq!(private["d"], "AQEBAQEBAQEBAQEBAQEBAQEBAQEBAQEBAQEBAQEBAQE");
}

#[test]
fn test_generate_full_round_trip() {
    let ops = KeyOperations::new();
    let pair = ops.generate_key_pair().unwrap();

    let public = ops
        .import_public_key(&pair.public_key().export_jwk())
        .unwrap();
    let private = ops
        .import_private_key(&pair.private_key().export_jwk())
        .unwrap();

    assert_eq!(&public, pair.public_key());
    assert_eq!(&private, pair.private_key());

    let signature = private.sign(b"hello").unwrap();
    assert!(public.verify(&signature, b"hello"));
    assert!(pair.public_key().verify(&signature, b"hello"));
    assert!(!public.verify(&signature, b"hellO"));
}

#[test]
fn test_signature_from_other_key_fails() {
    let ops = KeyOperations::new();
    let alice = ops.generate_key_pair().unwrap();
    let bob = ops.generate_key_pair().unwrap();

    let signature = alice.private_key().sign(b"offer").unwrap();
    assert!(!bob.public_key().verify(&signature, b"offer"));
}

/// Finds a signature whose r or s needed left padding and checks it is still
/// emitted at full width and verifies.
#[test]
fn test_signature_encoding_padded() {
    let pair = KeyOperations::new().generate_key_pair().unwrap();

    let mut found = false;
    for i in 0..4096 {
        let message = format!("hello {i}");
        let signature = pair.private_key().sign(message.as_bytes()).unwrap();
        assert_eq!(signature.len(), SIGNATURE_LEN);

        if signature[0] == 0 || signature[32] == 0 {
            assert!(pair.public_key().verify(&signature, message.as_bytes()));
            found = true;
            break;
        }
    }
    assert!(found, "no padded signature in 4096 attempts");
}

/// A genuine signature with its zero padding stripped must not verify.
#[test]
fn test_verify_unpadded_signature() {
    let pair = KeyOperations::new().generate_key_pair().unwrap();

    for i in 0..4096 {
        let message = format!("iNWPwVjsWF {i}");
        let signature = pair.private_key().sign(message.as_bytes()).unwrap();

        let unpadded: Vec<u8> = if signature[0] == 0 {
            signature[1..].to_vec()
        } else if signature[32] == 0 {
            let mut bytes = signature[..32].to_vec();
            bytes.extend_from_slice(&signature[33..]);
            bytes
        } else {
            continue;
        };

        assert_eq!(unpadded.len(), SIGNATURE_LEN - 1);
        assert!(pair.public_key().verify(&signature, message.as_bytes()));
        assert!(!pair.public_key().verify(&unpadded, message.as_bytes()));
        return;
    }
    panic!("no padded signature in 4096 attempts");
}

#[test]
fn test_signing_is_randomized() {
    let pair = KeyOperations::new().generate_key_pair().unwrap();
    let a = pair.private_key().sign(b"hello").unwrap();
    let b = pair.private_key().sign(b"hello").unwrap();
    assert_ne!(a, b);
    assert!(pair.public_key().verify(&a, b"hello"));
    assert!(pair.public_key().verify(&b, b"hello"));
}
