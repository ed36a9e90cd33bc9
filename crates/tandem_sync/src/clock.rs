//! Change marker clock.

use parking_lot::Mutex;
use std::time::{SystemTime, UNIX_EPOCH};

/// A change marker value: milliseconds since the Unix epoch.
pub type Stamp = u64;

/// Issues strictly increasing change marker stamps.
///
/// Stamps follow the wall clock but never repeat or go backwards: if
/// the wall clock has not advanced past the last issued stamp, the next
/// stamp is last + 1. Two rows stamped by the same process therefore
/// always order deterministically, even within one clock tick.
#[derive(Debug)]
pub struct MarkerClock {
    last: Mutex<Stamp>,
}

impl MarkerClock {
    /// Creates a clock that starts at the current wall time.
    pub fn new() -> Self {
        Self {
            last: Mutex::new(0),
        }
    }

    /// Creates a clock whose first stamp is at least `floor + 1`.
    ///
    /// Useful in tests that need stamps above seeded marker values.
    pub fn starting_at(floor: Stamp) -> Self {
        Self {
            last: Mutex::new(floor),
        }
    }

    /// Issues the next stamp.
    pub fn next_stamp(&self) -> Stamp {
        let wall = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_millis() as Stamp;
        let mut last = self.last.lock();
        let stamp = wall.max(*last + 1);
        *last = stamp;
        stamp
    }
}

impl Default for MarkerClock {
    fn default() -> Self {
        Self::new()
    }
}
