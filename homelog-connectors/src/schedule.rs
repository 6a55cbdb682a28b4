//! Aligned Ticker
//!
//! First wake-up lands on the next aligned wall-clock boundary; after that a
//! plain fixed-period interval takes over. Missed ticks are skipped, never
//! bunched, so a slow cycle does not cause a burst of catch-up polls.

use std::sync::Arc;
use std::time::Duration;

use homelog_core::{Clock, SchedulingError, TimeAligner};
use log::debug;
use tokio::time::{interval_at, Instant, Interval, MissedTickBehavior};

/// Periodic timer aligned to the wall clock
pub struct AlignedTicker {
    aligner: TimeAligner,
    clock: Arc<dyn Clock>,
    interval: Option<Interval>,
}

impl AlignedTicker {
    /// Ticker for `aligner`, reading wall time from `clock`
    pub fn new(aligner: TimeAligner, clock: Arc<dyn Clock>) -> Self {
        Self {
            aligner,
            clock,
            interval: None,
        }
    }

    /// Delay until the first aligned boundary from the current clock reading
    pub fn first_delay(&self) -> Result<Duration, SchedulingError> {
        self.aligner.next_delay(&self.clock.local_now())
    }

    /// Wait for the next tick
    ///
    /// Cancel-safe: a wait dropped part way resumes on the same deadline.
    pub async fn tick(&mut self) -> Result<(), SchedulingError> {
        if self.interval.is_none() {
            let delay = self.first_delay()?;
            debug!("first aligned tick in {:?}", delay);

            let mut interval = interval_at(Instant::now() + delay, self.aligner.period());
            interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
            self.interval = Some(interval);
        }

        if let Some(interval) = self.interval.as_mut() {
            interval.tick().await;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{FixedOffset, TimeZone};
    use homelog_core::FixedClock;

    fn clock_at(h: u32, m: u32, s: u32) -> Arc<FixedClock> {
        let zone = FixedOffset::east_opt(2 * 3600).unwrap();
        Arc::new(FixedClock::new(zone.with_ymd_and_hms(2024, 6, 1, h, m, s).unwrap()))
    }

    #[tokio::test(start_paused = true)]
    async fn first_tick_waits_for_boundary_then_period() {
        let mut ticker = AlignedTicker::new(TimeAligner::default(), clock_at(10, 2, 0));
        let start = Instant::now();

        ticker.tick().await.unwrap();
        assert_eq!(start.elapsed(), Duration::from_secs(180));

        ticker.tick().await.unwrap();
        assert_eq!(start.elapsed(), Duration::from_secs(480));
    }

    #[tokio::test(start_paused = true)]
    async fn exact_boundary_waits_full_period() {
        let mut ticker = AlignedTicker::new(TimeAligner::default(), clock_at(10, 5, 0));
        let start = Instant::now();
        ticker.tick().await.unwrap();
        assert_eq!(start.elapsed(), Duration::from_secs(300));
    }

    #[tokio::test(start_paused = true)]
    async fn abandoned_wait_keeps_deadline() {
        let mut ticker = AlignedTicker::new(TimeAligner::default(), clock_at(10, 2, 0));
        let start = Instant::now();

        let early = tokio::time::timeout(Duration::from_secs(60), ticker.tick()).await;
        assert!(early.is_err());

        ticker.tick().await.unwrap();
        assert_eq!(start.elapsed(), Duration::from_secs(180));
    }

    #[test]
    fn first_delay_uses_local_wall_clock() {
        let ticker = AlignedTicker::new(TimeAligner::new(15).unwrap(), clock_at(23, 50, 0));
        assert_eq!(ticker.first_delay(), Ok(Duration::from_secs(600)));
    }
}
