//! Clocks and Aligned Scheduling
//!
//! Two concerns live here:
//!
//! - [`Clock`]: where "now" comes from. The system clock in production, a
//!   settable [`FixedClock`] in tests.
//! - [`TimeAligner`]: how long to wait until the next wall-clock boundary whose
//!   minute-of-hour is a multiple of the polling period.
//!
//! ## Boundary Rules
//!
//! With a 5 minute period:
//!
//! ```text
//! now        next boundary   delay
//! 10:02:00   10:05:00        180 s
//! 10:04:59.5 10:05:00        0.5 s
//! 10:05:00   10:10:00        300 s   (exactly on a boundary: skip to the next)
//! 10:57:30   11:00:00        150 s   (minute wraps into the next hour)
//! ```
//!
//! A computed boundary that is not strictly after `now` is a logic defect and
//! is reported as [`SchedulingError::NonPositiveDelay`]. Callers must treat it
//! as fatal.

use std::sync::Mutex;
use std::time::Duration;

use chrono::{DateTime, FixedOffset, Local, TimeDelta, TimeZone, Timelike, Utc};

use crate::constants::{
    DEFAULT_PERIOD_MINUTES, MAX_PERIOD_MINUTES, MINUTES_PER_HOUR, SECONDS_PER_MINUTE,
};
use crate::errors::SchedulingError;

/// Source of the current time
pub trait Clock: Send + Sync {
    /// Current instant
    fn now(&self) -> DateTime<Utc>;

    /// Current instant in the local wall-clock zone used for alignment
    fn local_now(&self) -> DateTime<FixedOffset> {
        self.now().with_timezone(&Local).fixed_offset()
    }
}

/// System wall clock
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Settable clock for tests
///
/// Holds a fixed instant in a fixed zone. `local_now` reports that zone, so
/// alignment tests do not depend on the machine's timezone.
#[derive(Debug)]
pub struct FixedClock {
    at: Mutex<DateTime<FixedOffset>>,
}

impl FixedClock {
    /// Clock frozen at `at`
    pub fn new<Tz: TimeZone>(at: DateTime<Tz>) -> Self {
        Self {
            at: Mutex::new(at.fixed_offset()),
        }
    }

    /// Move to an absolute instant
    pub fn set<Tz: TimeZone>(&self, at: DateTime<Tz>) {
        *self.lock() = at.fixed_offset();
    }

    /// Move forward
    pub fn advance(&self, by: TimeDelta) {
        let mut at = self.lock();
        *at += by;
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, DateTime<FixedOffset>> {
        self.at.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl Clock for FixedClock {
    fn now(&self) -> DateTime<Utc> {
        self.lock().with_timezone(&Utc)
    }

    fn local_now(&self) -> DateTime<FixedOffset> {
        *self.lock()
    }
}

/// Computes delays to period-aligned wall-clock boundaries
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimeAligner {
    period_minutes: u32,
}

impl Default for TimeAligner {
    fn default() -> Self {
        Self {
            period_minutes: DEFAULT_PERIOD_MINUTES,
        }
    }
}

impl TimeAligner {
    /// Aligner for a period in minutes (1..=60)
    pub fn new(period_minutes: u32) -> Result<Self, SchedulingError> {
        if period_minutes == 0 || period_minutes > MAX_PERIOD_MINUTES {
            return Err(SchedulingError::InvalidPeriod(period_minutes));
        }
        Ok(Self { period_minutes })
    }

    /// Period in minutes
    pub fn period_minutes(&self) -> u32 {
        self.period_minutes
    }

    /// Period as a duration, the steady tick interval after the first fire
    pub fn period(&self) -> Duration {
        Duration::from_secs(u64::from(self.period_minutes * SECONDS_PER_MINUTE))
    }

    /// Next boundary strictly after `now`
    pub fn next_boundary<Tz: TimeZone>(&self, now: &DateTime<Tz>) -> DateTime<Tz> {
        // Work from the top of the hour by subtracting fields rather than
        // replacing them, which stays defined across DST transitions.
        let hour_start = now.clone()
            - TimeDelta::minutes(i64::from(now.minute()))
            - TimeDelta::seconds(i64::from(now.second()))
            - TimeDelta::nanoseconds(i64::from(now.nanosecond()));

        let next_minute = (now.minute() / self.period_minutes + 1) * self.period_minutes;
        if next_minute >= MINUTES_PER_HOUR {
            hour_start + TimeDelta::hours(1)
        } else {
            hour_start + TimeDelta::minutes(i64::from(next_minute))
        }
    }

    /// Delay from `now` until the next boundary
    pub fn next_delay<Tz: TimeZone>(&self, now: &DateTime<Tz>) -> Result<Duration, SchedulingError> {
        next_delay(now, self.period_minutes)
    }
}

/// Delay from `now` until the next time whose minute is a multiple of
/// `period_minutes` and whose seconds are zero
///
/// The result is always strictly positive. An exact boundary yields a full
/// period rather than zero.
pub fn next_delay<Tz: TimeZone>(
    now: &DateTime<Tz>,
    period_minutes: u32,
) -> Result<Duration, SchedulingError> {
    let aligner = TimeAligner::new(period_minutes)?;
    let target = aligner.next_boundary(now);

    let delta = target.clone().signed_duration_since(now.clone());
    if delta <= TimeDelta::zero() {
        return Err(SchedulingError::NonPositiveDelay {
            now: now.fixed_offset(),
            target: target.fixed_offset(),
        });
    }

    delta.to_std().map_err(|_| SchedulingError::NonPositiveDelay {
        now: now.fixed_offset(),
        target: target.fixed_offset(),
    })
}
