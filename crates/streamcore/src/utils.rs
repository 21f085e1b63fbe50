//! General utilities shared across the application.

use std::time::{SystemTime, UNIX_EPOCH};

/// Returns the current Unix timestamp in whole seconds.
///
/// Returns 0 if the system clock is before the Unix epoch (shouldn't happen
/// in practice). Run-state timestamps, metric samples, and backoff math all
/// use seconds rather than milliseconds.
#[must_use]
pub fn now_secs() -> u64 {
    SystemTime::now().duration_since(UNIX_EPOCH).map(|d| d.as_secs()).unwrap_or(0)
}

/// Returns the current Unix timestamp in milliseconds, for callers that need
/// sub-second resolution (e.g. metrics sample jitter diagnostics).
#[must_use]
pub fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn now_secs_is_nonzero_after_epoch() {
        assert!(now_secs() > 0);
    }

    #[test]
    fn now_millis_is_roughly_1000x_now_secs() {
        let secs = now_secs();
        let millis = now_millis();
        assert!(millis / 1000 >= secs.saturating_sub(1));
    }
}
