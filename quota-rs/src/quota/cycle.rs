//! 30-day quota cycle arithmetic
//!
//! A cycle is the half-open window `[start, start + 30 days)`. When the stored
//! start is stale the current window is computed directly from the elapsed
//! time, so a user returning after several months lands in the window that
//! contains "now" in one step.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

/// Length of one quota cycle in days
pub const CYCLE_DAYS: i64 = 30;

pub fn cycle_length() -> Duration {
    Duration::days(CYCLE_DAYS)
}

/// End of the cycle starting at `start`
pub fn cycle_end(start: DateTime<Utc>) -> DateTime<Utc> {
    start + cycle_length()
}

/// Boundaries of a quota cycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CycleWindow {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl CycleWindow {
    pub fn starting_at(start: DateTime<Utc>) -> Self {
        Self {
            start,
            end: cycle_end(start),
        }
    }

    pub fn contains(&self, t: DateTime<Utc>) -> bool {
        t >= self.start && t < self.end
    }
}

/// Window containing `now` for a user whose stored cycle began at `stored_start`.
///
/// A `now` earlier than `stored_start` (clock skew) keeps the stored window.
pub fn current_cycle(stored_start: DateTime<Utc>, now: DateTime<Utc>) -> CycleWindow {
    if now < stored_start {
        return CycleWindow::starting_at(stored_start);
    }

    let elapsed = (now - stored_start).num_seconds();
    let periods = elapsed / cycle_length().num_seconds();

    CycleWindow::starting_at(stored_start + Duration::days(periods * CYCLE_DAYS))
}

/// Whether the stored cycle has expired and must be rolled forward
pub fn needs_roll(stored_start: DateTime<Utc>, now: DateTime<Utc>) -> bool {
    current_cycle(stored_start, now).start != stored_start
}
