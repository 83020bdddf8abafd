//! Signed epoch-millisecond timestamps, used for bundle creation time and
//! attestation freshness checks (spec §3, §4.2, §4.3).

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt::{Display, Formatter};
use std::time::{SystemTime, SystemTimeError, UNIX_EPOCH};

/// Milliseconds since the Unix epoch, signed so that clock-skew arithmetic
/// (e.g. `timestamp - MAX_AGE`) never wraps.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct EpochMillis(pub i64);

impl EpochMillis {
    pub fn try_now() -> Result<Self, SystemTimeError> {
        let since_epoch = SystemTime::now().duration_since(UNIX_EPOCH)?;
        Ok(EpochMillis(since_epoch.as_millis() as i64))
    }

    pub fn to_le_bytes(self) -> [u8; 8] {
        self.0.to_le_bytes()
    }

    /// `true` if `self` is within `max_age_ms` of `reference`, in either
    /// direction is not allowed: only past timestamps within the window pass.
    pub fn within_age_of(self, reference: EpochMillis, max_age_ms: i64) -> bool {
        let age = reference.0 - self.0;
        age >= 0 && age <= max_age_ms
    }
}

impl Serialize for EpochMillis {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_i64(self.0)
    }
}

impl<'de> Deserialize<'de> for EpochMillis {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let value = i64::deserialize(deserializer)?;
        Ok(EpochMillis(value))
    }
}

impl Display for EpochMillis {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn within_age_accepts_boundary_and_rejects_over() {
        let now = EpochMillis(1_000_000);
        let just_in = EpochMillis(now.0 - 1000);
        let just_out = EpochMillis(now.0 - 1001);
        assert!(just_in.within_age_of(now, 1000));
        assert!(!just_out.within_age_of(now, 1000));
    }

    #[test]
    fn future_timestamp_is_not_within_age() {
        let now = EpochMillis(1_000_000);
        let future = EpochMillis(now.0 + 1);
        assert!(!future.within_age_of(now, 1_000_000));
    }
}
