//! Merge Windows
//!
//! Sensors report each measurement type separately, so one logical sample
//! ("what we knew about the device around 10:05") arrives as several readings
//! a few seconds apart. The merger folds them back together.
//!
//! ## Grouping Rule
//!
//! Walking readings in ascending time order, a reading joins the open group
//! when both hold:
//!
//! 1. `reading.time - group.time <= window` where `group.time` is the time of
//!    the group's **first** member, not of its latest addition;
//! 2. the group has no value of that type yet.
//!
//! Otherwise the group is closed and the reading seeds a new one. Because the
//! window is anchored, no group ever spans more than one window; and a repeat
//! of a type already in the group means the sensor has moved on to its next
//! sample, so it starts a new group even inside the window.
//!
//! ```text
//! window = 300 s
//! 10:00:00 temperature ─┐
//! 10:00:02 humidity    ─┤ group @10:00:00 {temperature, humidity}
//! 10:04:00 temperature ─┐ repeat type → new group
//! 10:09:30 humidity    ─┐ 5m30s after 10:04:00 → new group
//! ```

use chrono::TimeDelta;

use crate::constants::MERGE_WINDOW_SECS;
use crate::reading::{MergedPoint, Reading};

/// Groups readings of one device into merged points
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Merger {
    window: TimeDelta,
}

impl Default for Merger {
    fn default() -> Self {
        Self {
            window: TimeDelta::seconds(MERGE_WINDOW_SECS),
        }
    }
}

impl Merger {
    /// Merger with a custom window
    pub fn with_window(window: TimeDelta) -> Self {
        Self { window }
    }

    /// Merge window
    pub fn window(&self) -> TimeDelta {
        self.window
    }

    /// Merge readings of a single device
    ///
    /// Input is expected in ascending time order. Out-of-order input is
    /// sorted (stably) before grouping.
    pub fn merge(&self, readings: &[Reading]) -> Vec<MergedPoint> {
        if readings.windows(2).all(|w| w[0].time <= w[1].time) {
            self.merge_sorted(readings.iter())
        } else {
            let mut sorted: Vec<&Reading> = readings.iter().collect();
            sorted.sort_by_key(|r| r.time);
            self.merge_sorted(sorted.into_iter())
        }
    }

    fn merge_sorted<'a>(&self, mut readings: impl Iterator<Item = &'a Reading>) -> Vec<MergedPoint> {
        let Some(first) = readings.next() else {
            return Vec::new();
        };

        let mut merged = Vec::new();
        let mut current = MergedPoint::seed(first);

        for reading in readings {
            let within_window = reading.time - current.time <= self.window;
            if within_window && !current.contains(reading.measurement) {
                current.values.insert(reading.measurement, reading.value);
            } else {
                merged.push(std::mem::replace(&mut current, MergedPoint::seed(reading)));
            }
        }

        merged.push(current);
        merged
    }
}
