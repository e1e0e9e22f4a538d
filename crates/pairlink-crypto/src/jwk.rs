//! Interchange key documents (JWK subset for EC keys).
//!
//! Every numeric member is the unsigned big-endian encoding of its value,
//! base64url without padding. A dangling single symbol or padding is an
//! error. Unused low bits in the final symbol are ignored, and a missing
//! coordinate reads as zero.

use std::fmt;

use base64::alphabet;
use base64::engine::general_purpose::{GeneralPurpose, GeneralPurposeConfig, URL_SAFE_NO_PAD};
use base64::engine::DecodePaddingMode;
use base64::Engine;
use serde::{Deserialize, Serialize};

use crate::error::ImportError;

pub const KEY_TYPE: &str = "EC";
pub const CURVE_NAME: &str = "P-256";

/// Width in bytes of a P-256 field element or scalar.
pub const FIELD_LEN: usize = 32;

/// base64url without padding, tolerating non-zero trailing bits on decode.
const URL_SAFE_LENIENT: GeneralPurpose = GeneralPurpose::new(
    &alphabet::URL_SAFE,
    GeneralPurposeConfig::new()
        .with_encode_padding(false)
        .with_decode_padding_mode(DecodePaddingMode::RequireNone)
        .with_decode_allow_trailing_bits(true),
);

/// A parsed key document. Unknown members are ignored.
#[derive(Debug, Clone, Deserialize)]
pub(crate) struct JwkDocument {
    pub kty: String,
    pub crv: String,
    #[serde(default)]
    pub x: String,
    #[serde(default)]
    pub y: String,
    #[serde(default)]
    pub d: Option<String>,
}

impl JwkDocument {
    /// Parse and check the fixed `kty`/`crv` members.
    pub fn parse(doc: &str) -> Result<Self, ImportError> {
        let parsed: JwkDocument =
            serde_json::from_str(doc).map_err(|e| ImportError::InvalidDocument(e.to_string()))?;

        if parsed.kty != KEY_TYPE {
            return Err(ImportError::UnsupportedKeyType(parsed.kty));
        }
        if parsed.crv != CURVE_NAME {
            return Err(ImportError::UnsupportedCurve(parsed.crv));
        }
        Ok(parsed)
    }
}

/// Outgoing key document, members in `kty, crv, x, y, d` order.
#[derive(Serialize)]
pub(crate) struct JwkExport<'a> {
    pub kty: &'a str,
    pub crv: &'a str,
    pub x: String,
    pub y: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub d: Option<String>,
}

impl<'a> JwkExport<'a> {
    pub fn new(x: &[u8; FIELD_LEN], y: &[u8; FIELD_LEN]) -> Self {
        Self {
            kty: KEY_TYPE,
            crv: CURVE_NAME,
            x: encode_uint(x),
            y: encode_uint(y),
            d: None,
        }
    }
}

impl fmt::Display for JwkExport<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let json = serde_json::to_string(self).map_err(|_| fmt::Error)?;
        f.write_str(&json)
    }
}

/// Decode a base64url member into a left-zero-padded 32-byte big-endian value.
pub(crate) fn decode_uint(
    field: &'static str,
    value: &str,
) -> Result<[u8; FIELD_LEN], ImportError> {
    let bytes = URL_SAFE_LENIENT
        .decode(value)
        .map_err(|e| ImportError::InvalidEncoding {
            field,
            reason: e.to_string(),
        })?;

    let significant = strip_leading_zeros(&bytes);
    if significant.len() > FIELD_LEN {
        return Err(ImportError::ValueTooLarge(field));
    }

    let mut out = [0u8; FIELD_LEN];
    out[FIELD_LEN - significant.len()..].copy_from_slice(significant);
    Ok(out)
}

/// Minimal big-endian encoding (no leading zero bytes), base64url without padding.
pub(crate) fn encode_uint(value: &[u8]) -> String {
    URL_SAFE_NO_PAD.encode(strip_leading_zeros(value))
}

fn strip_leading_zeros(bytes: &[u8]) -> &[u8] {
    let start = bytes.iter().position(|b| *b != 0).unwrap_or(bytes.len());
    &bytes[start..]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_pads_short_values() {
        let decoded = decode_uint("x", "AQ").unwrap();
        assert_eq!(decoded[..31], [0u8; 31]);
        assert_eq!(decoded[31], 1);
    }

    #[test]
    fn test_decode_rejects_single_symbol() {
        let err = decode_uint("x", "0").unwrap_err();
        assert!(matches!(err, ImportError::InvalidEncoding { field: "x", .. }));
    }

    #[test]
    fn test_decode_ignores_trailing_bits() {
        assert_eq!(decode_uint("x", "AB").unwrap(), [0u8; FIELD_LEN]);
        assert_eq!(decode_uint("x", "AR").unwrap()[31], 0x01);
    }

    #[test]
    fn test_decode_empty_is_zero() {
        assert_eq!(decode_uint("y", "").unwrap(), [0u8; FIELD_LEN]);
    }

    #[test]
    fn test_missing_coordinate_parses_as_empty() {
        let doc = JwkDocument::parse(r#"{"kty":"EC","crv":"P-256","x":"AQ"}"#).unwrap();
        assert_eq!(doc.y, "");
        assert!(doc.d.is_none());
    }

    #[test]
    fn test_decode_rejects_padding() {
        assert!(decode_uint("y", "AQ==").is_err());
    }

    #[test]
    fn test_decode_rejects_oversized_value() {
        let encoded = URL_SAFE_NO_PAD.encode([0xffu8; 33]);
        assert_eq!(
            decode_uint("d", &encoded).unwrap_err(),
            ImportError::ValueTooLarge("d")
        );
    }

    #[test]
    fn test_decode_accepts_leading_zero_overflow() {
        let mut bytes = vec![0u8; 33];
        bytes[32] = 7;
        let decoded = decode_uint("x", &URL_SAFE_NO_PAD.encode(bytes)).unwrap();
        assert_eq!(decoded[31], 7);
    }

    #[test]
    fn test_encode_strips_leading_zeros() {
        let mut value = [0u8; FIELD_LEN];
        value[31] = 1;
        assert_eq!(encode_uint(&value), "AQ");
        assert_eq!(encode_uint(&[0u8; FIELD_LEN]), "");
    }

    #[test]
    fn test_parse_ignores_extra_members() {
        let doc = JwkDocument::parse(
            r#"{"kty":"EC","crv":"P-256","x":"AQ","y":"AQ","kid":"1","use":"sig"}"#,
        )
        .unwrap();
        assert_eq!(doc.x, "AQ");
        assert!(doc.d.is_none());
    }
}
