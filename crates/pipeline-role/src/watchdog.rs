//! No-progress watchdog.
//!
//! Tracks how long it has been since the graph last reported forward
//! progress and exposes whether that silence has crossed the window for the
//! current settling phase. The window starts wide (`WATCHDOG_INITIAL_TIMEOUT_SECS`)
//! to give first-frame latency room, then tightens to
//! `WATCHDOG_STEADY_STATE_TIMEOUT_SECS` once `WATCHDOG_SETTLING_DELAY_SECS`
//! has elapsed since construction.

use std::time::{Duration, Instant};

use streamcore::protocol_constants::{WATCHDOG_INITIAL_TIMEOUT_SECS, WATCHDOG_SETTLING_DELAY_SECS, WATCHDOG_STEADY_STATE_TIMEOUT_SECS};

pub struct Watchdog {
    constructed_at: Instant,
    last_progress: Instant,
}

impl Watchdog {
    #[must_use]
    pub fn start() -> Self {
        let now = Instant::now();
        Self { constructed_at: now, last_progress: now }
    }

    pub fn record_progress(&mut self) {
        self.last_progress = Instant::now();
    }

    fn current_timeout(&self) -> Duration {
        if self.constructed_at.elapsed() < Duration::from_secs(WATCHDOG_SETTLING_DELAY_SECS) {
            Duration::from_secs(WATCHDOG_INITIAL_TIMEOUT_SECS)
        } else {
            Duration::from_secs(WATCHDOG_STEADY_STATE_TIMEOUT_SECS)
        }
    }

    #[must_use]
    pub fn has_stalled(&self) -> bool {
        self.last_progress.elapsed() >= self.current_timeout()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fresh_watchdog_has_not_stalled() {
        let wd = Watchdog::start();
        assert!(!wd.has_stalled());
    }

    #[test]
    fn record_progress_resets_the_clock() {
        let mut wd = Watchdog::start();
        wd.last_progress = Instant::now() - Duration::from_secs(WATCHDOG_INITIAL_TIMEOUT_SECS + 5);
        assert!(wd.has_stalled());

        wd.record_progress();
        assert!(!wd.has_stalled());
    }
}
