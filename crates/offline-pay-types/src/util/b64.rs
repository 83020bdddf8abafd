//! Base64 encode/decode helpers for fixed-size binary fields carried over the
//! text (JSON) transport form described in spec §6.

use base64::Engine;
use base64::engine::general_purpose::STANDARD as b64;
use serde::de::Error as _;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// Serializes a fixed-size byte array as a base64 string; deserializes back,
/// rejecting any input that doesn't decode to exactly `N` bytes.
pub fn serialize<S: Serializer, const N: usize>(bytes: &[u8; N], s: S) -> Result<S::Ok, S::Error> {
    s.serialize_str(&b64.encode(bytes))
}

pub fn deserialize<'de, D: Deserializer<'de>, const N: usize>(d: D) -> Result<[u8; N], D::Error> {
    let s = String::deserialize(d)?;
    let bytes = b64
        .decode(s.as_bytes())
        .map_err(|e| D::Error::custom(format!("invalid base64: {e}")))?;
    bytes
        .try_into()
        .map_err(|v: Vec<u8>| D::Error::custom(format!("expected {N} bytes, got {}", v.len())))
}

/// Serializes a `Vec<u8>` (variable-length binary, e.g. attestation reports
/// or DER certificates) as base64.
pub mod vec {
    use super::*;

    pub fn serialize<S: Serializer>(bytes: &Vec<u8>, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_str(&b64.encode(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Vec<u8>, D::Error> {
        let s = String::deserialize(d)?;
        b64.decode(s.as_bytes())
            .map_err(|e| D::Error::custom(format!("invalid base64: {e}")))
    }
}

/// Serializes a `Vec<Vec<u8>>` (e.g. a DER certificate chain) as a list of
/// base64 strings.
pub mod vec_of_vec {
    use super::*;

    pub fn serialize<S: Serializer>(items: &[Vec<u8>], s: S) -> Result<S::Ok, S::Error> {
        let encoded: Vec<String> = items.iter().map(|v| b64.encode(v)).collect();
        encoded.serialize(s)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Vec<Vec<u8>>, D::Error> {
        let strings = Vec::<String>::deserialize(d)?;
        strings
            .into_iter()
            .map(|s| {
                b64.decode(s.as_bytes())
                    .map_err(|e| D::Error::custom(format!("invalid base64: {e}")))
            })
            .collect()
    }
}
