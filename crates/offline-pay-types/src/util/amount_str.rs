//! Serializes `u64` amounts as decimal strings in JSON, per spec §6
//! ("amounts encoded as decimal strings of the u64 when JSON is used").
//!
//! Mirrors the stringified-integer convention the teacher protocol uses for
//! its Unix timestamps, applied here to token amounts so large values never
//! lose precision in a JSON number.

use serde::de::Error as _;
use serde::{Deserialize, Deserializer, Serializer};

pub fn serialize<S: Serializer>(amount: &u64, s: S) -> Result<S::Ok, S::Error> {
    s.serialize_str(&amount.to_string())
}

pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<u64, D::Error> {
    let s = String::deserialize(d)?;
    s.parse::<u64>()
        .map_err(|e| D::Error::custom(format!("invalid amount: {e}")))
}
