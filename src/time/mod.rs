//! Time source for the update loop.
//!
//! [`system_time`] reads the wall clock as fractional seconds; [`Clock`]
//! turns successive reads into the application time and the delta between
//! two updates.

use std::time::{SystemTime, UNIX_EPOCH};

/// Current wall-clock time in seconds since the Unix epoch.
pub fn system_time() -> f64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|since| since.as_secs_f64())
        .unwrap_or(0.0)
}

/// Timing fields advanced once per update.
#[derive(Clone, Copy, Debug, Default)]
pub(crate) struct Clock {
    /// Last observed wall-clock time.
    pub(crate) time_system: f64,
    /// Time accumulated since init.
    pub(crate) time_app: f64,
    /// Delta between the two most recent updates.
    pub(crate) dt: f64,
}

impl Clock {
    pub(crate) fn starting_at(now: f64) -> Self {
        Self {
            time_system: now,
            time_app: 0.0,
            dt: 0.0,
        }
    }

    /// Advances to `now`. A wall clock stepped backwards yields a zero delta.
    pub(crate) fn advance(&mut self, now: f64) {
        self.dt = (now - self.time_system).max(0.0);
        self.time_app += self.dt;
        self.time_system = now;
    }
}
