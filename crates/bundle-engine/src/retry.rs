//! Exponential backoff for settlement retries: starts at one second, caps at
//! five minutes, and resets whenever a bundle settles successfully. The
//! retry budget bounds how many attempts a single bundle gets before the
//! worker gives up and forces it to `Failed` for good.

use std::time::Duration;

pub const INITIAL_BACKOFF: Duration = Duration::from_secs(1);
pub const MAX_BACKOFF: Duration = Duration::from_secs(5 * 60);
pub const DEFAULT_RETRY_BUDGET: u32 = 32;

/// Backoff for the `attempt`-th retry (0-indexed): `min(INITIAL * 2^attempt, MAX)`.
pub fn backoff_for_attempt(attempt: u32) -> Duration {
    let shift = attempt.min(16); // avoid overflow in the shift itself
    INITIAL_BACKOFF
        .checked_mul(1u32 << shift)
        .unwrap_or(MAX_BACKOFF)
        .min(MAX_BACKOFF)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backoff_doubles_each_attempt_until_the_cap() {
        assert_eq!(backoff_for_attempt(0), Duration::from_secs(1));
        assert_eq!(backoff_for_attempt(1), Duration::from_secs(2));
        assert_eq!(backoff_for_attempt(2), Duration::from_secs(4));
    }

    #[test]
    fn backoff_never_exceeds_the_cap() {
        assert_eq!(backoff_for_attempt(100), MAX_BACKOFF);
    }
}
