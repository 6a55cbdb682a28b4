//! Adaptive Downsampling
//!
//! Thins an ascending series to at most `max_points` entries so a chart of
//! one day and a chart of one year cost the same to draw.
//!
//! ## Algorithm
//!
//! ```text
//! window = (now - first.time) / max_points
//!
//! emit first point unchanged
//! pending = []
//! for p in rest:
//!     pending += p
//!     if p.time - last_emitted.time >= window:
//!         emit (p.time, round2(mean(pending)))
//!         pending = []
//! drop whatever is still pending
//! ```
//!
//! The window scales with the span being viewed, so the output size stays
//! bounded without knowing the sampling rate. Values pending after the last
//! trigger are dropped: the tail of a series is lossy. This is intentional and
//! kept for compatibility with charts drawn by earlier releases.
//!
//! Inputs of at most `max_points` entries are returned unchanged, and the
//! output is never allowed to exceed `max_points` even when `now` sits exactly
//! on a window multiple or behind the newest sample.
//!
//! Single pass, O(n), no allocation beyond the output.

use std::collections::BTreeMap;

use chrono::{DateTime, TimeDelta, Utc};

use crate::constants::{AVERAGE_DECIMAL_PLACES, DEFAULT_MAX_DATA_POINTS};
use crate::reading::{MergedPoint, SeriesPoint};

/// A sample the downsampler can thin
pub trait TimedSample: Clone {
    /// Sample time
    fn time(&self) -> DateTime<Utc>;

    /// Collapse a run of consecutive samples into one stamped at `at`
    fn average(run: &[Self], at: DateTime<Utc>) -> Self;
}

impl TimedSample for SeriesPoint {
    fn time(&self) -> DateTime<Utc> {
        self.time
    }

    fn average(run: &[Self], at: DateTime<Utc>) -> Self {
        SeriesPoint::new(at, mean(run.iter().map(|p| p.value)).unwrap_or(f64::NAN))
    }
}

impl TimedSample for MergedPoint {
    fn time(&self) -> DateTime<Utc> {
        self.time
    }

    /// Averages each type over the points that carry it
    fn average(run: &[Self], at: DateTime<Utc>) -> Self {
        let mut sums: BTreeMap<_, (f64, usize)> = BTreeMap::new();
        for point in run {
            for (&measurement, &value) in &point.values {
                let entry = sums.entry(measurement).or_insert((0.0, 0));
                entry.0 += value;
                entry.1 += 1;
            }
        }

        MergedPoint {
            time: at,
            values: sums
                .into_iter()
                .map(|(t, (sum, n))| (t, round_to_places(sum / n as f64, AVERAGE_DECIMAL_PLACES)))
                .collect(),
        }
    }
}

/// Arithmetic mean rounded to two decimal places
pub fn mean(values: impl IntoIterator<Item = f64>) -> Option<f64> {
    let (sum, count) = values
        .into_iter()
        .fold((0.0, 0usize), |(sum, count), v| (sum + v, count + 1));
    (count > 0).then(|| round_to_places(sum / count as f64, AVERAGE_DECIMAL_PLACES))
}

fn round_to_places(value: f64, places: i32) -> f64 {
    let scale = 10f64.powi(places);
    (value * scale).round() / scale
}

/// Bounds series length with adaptive-window averaging
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Downsampler {
    max_points: usize,
}

impl Default for Downsampler {
    fn default() -> Self {
        Self {
            max_points: DEFAULT_MAX_DATA_POINTS,
        }
    }
}

impl Downsampler {
    /// Downsampler with a custom cap
    pub fn new(max_points: usize) -> Self {
        Self { max_points }
    }

    /// Output cap
    pub fn max_points(&self) -> usize {
        self.max_points
    }

    /// Bucket width for a series starting at `earliest` viewed at `now`
    pub fn adaptive_window(&self, earliest: DateTime<Utc>, now: DateTime<Utc>) -> TimeDelta {
        let span = now - earliest;
        match i64::try_from(self.max_points) {
            Ok(m) if m > 0 => span.num_nanoseconds().map_or_else(
                || TimeDelta::milliseconds(span.num_milliseconds() / m),
                |ns| TimeDelta::nanoseconds(ns / m),
            ),
            _ => span,
        }
    }

    /// Thin `input` to at most `max_points` samples, ascending by time
    pub fn downsample<T: TimedSample>(&self, input: &[T], now: DateTime<Utc>) -> Vec<T> {
        if self.max_points == 0 {
            return Vec::new();
        }

        if input.windows(2).all(|w| w[0].time() <= w[1].time()) {
            self.downsample_sorted(input, now)
        } else {
            let mut sorted = input.to_vec();
            sorted.sort_by_key(|s| s.time());
            self.downsample_sorted(&sorted, now)
        }
    }

    fn downsample_sorted<T: TimedSample>(&self, input: &[T], now: DateTime<Utc>) -> Vec<T> {
        if input.len() <= self.max_points {
            return input.to_vec();
        }

        let first = &input[0];
        let window = self.adaptive_window(first.time(), now);

        let mut output = Vec::with_capacity(self.max_points);
        output.push(first.clone());

        let mut last_emitted = first.time();
        let mut pending_start = 1;

        for (i, sample) in input.iter().enumerate().skip(1) {
            if output.len() >= self.max_points {
                break;
            }
            if sample.time() - last_emitted >= window {
                output.push(T::average(&input[pending_start..=i], sample.time()));
                last_emitted = sample.time();
                pending_start = i + 1;
            }
        }

        output
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::MeasurementType::{Humidity, Temperature};
    use chrono::TimeZone;

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap()
    }

    fn minutes(n: i64) -> DateTime<Utc> {
        t0() + TimeDelta::minutes(n)
    }

    fn series(values: &[(i64, f64)]) -> Vec<SeriesPoint> {
        values.iter().map(|&(m, v)| SeriesPoint::new(minutes(m), v)).collect()
    }

    #[test]
    fn empty_input_unchanged() {
        let out: Vec<SeriesPoint> = Downsampler::new(10).downsample(&[], minutes(0));
        assert!(out.is_empty());
    }

    #[test]
    fn small_input_is_identity() {
        let input = series(&[(0, 1.234), (1, 2.0), (2, 3.0)]);
        assert_eq!(Downsampler::new(3).downsample(&input, minutes(100)), input);
    }

    #[test]
    fn small_unsorted_input_comes_back_ascending() {
        let input = series(&[(5, 2.0), (0, 1.0)]);
        let out = Downsampler::new(10).downsample(&input, minutes(10));
        assert_eq!(out, series(&[(0, 1.0), (5, 2.0)]));
    }

    #[test]
    fn skipped_values_are_averaged() {
        // window = 30 min / 3 = 10 min
        // 10, 20 pending; 30 at +10 min triggers, mean(10, 20, 30) = 20
        let input = series(&[(0, 0.0), (4, 10.0), (7, 20.0), (10, 30.0), (12, 99.0)]);
        let out = Downsampler::new(3).downsample(&input, minutes(30));

        assert_eq!(out[0], SeriesPoint::new(minutes(0), 0.0));
        assert_eq!(out[1], SeriesPoint::new(minutes(10), 20.0));
    }

    #[test]
    fn trailing_pending_values_are_dropped() {
        // Intentional lossy tail: 99.0 at +12 min never triggers.
        let input = series(&[(0, 0.0), (4, 10.0), (7, 20.0), (10, 30.0), (12, 99.0)]);
        let out = Downsampler::new(3).downsample(&input, minutes(30));

        assert_eq!(out.len(), 2);
        assert!(out.iter().all(|p| p.value != 99.0));
    }

    #[test]
    fn averages_round_to_two_places() {
        let input = series(&[(0, 0.0), (1, 1.0), (2, 1.0), (3, 2.0), (4, 0.0)]);
        // window = 4 min / 2 = 2 min; trigger at +2 with mean(1, 1) = 1
        let out = Downsampler::new(2).downsample(&input, minutes(4));
        assert_eq!(out.len(), 2);
        assert_eq!(out[1].value, 1.0);

        assert_eq!(mean([1.0, 2.0, 2.0]), Some(1.67));
        assert_eq!(mean(std::iter::empty::<f64>()), None);
    }

    #[test]
    fn never_exceeds_cap_when_now_is_last_sample() {
        // Samples exactly one window apart up to and including `now`
        let input: Vec<_> = (0..=10).map(|m| SeriesPoint::new(minutes(m), m as f64)).collect();
        let out = Downsampler::new(10).downsample(&input, minutes(10));
        assert_eq!(out.len(), 10);
    }

    #[test]
    fn future_samples_do_not_break_cap() {
        // `now` before the earliest sample yields a negative window
        let input: Vec<_> = (0..50).map(|m| SeriesPoint::new(minutes(m), 1.0)).collect();
        let out = Downsampler::new(5).downsample(&input, minutes(-10));
        assert_eq!(out.len(), 5);
    }

    #[test]
    fn zero_cap_yields_nothing() {
        let input = series(&[(0, 1.0), (1, 2.0)]);
        assert!(Downsampler::new(0).downsample(&input, minutes(5)).is_empty());
    }

    #[test]
    fn merged_points_average_per_type() {
        let point = |m: i64, temp: Option<f64>, hum: Option<f64>| {
            let mut values = BTreeMap::new();
            if let Some(v) = temp {
                values.insert(Temperature, v);
            }
            if let Some(v) = hum {
                values.insert(Humidity, v);
            }
            MergedPoint { time: minutes(m), values }
        };

        let input = vec![
            point(0, Some(20.0), Some(40.0)),
            point(1, Some(21.0), None),
            point(2, Some(22.0), Some(50.0)),
            point(3, None, None),
        ];

        // window = 4 min / 2 = 2 min
        let out = Downsampler::new(2).downsample(&input, minutes(4));
        assert_eq!(out.len(), 2);
        assert_eq!(out[1].time, minutes(2));
        assert_eq!(out[1].get(Temperature), Some(21.5));
        assert_eq!(out[1].get(Humidity), Some(50.0));
    }

    #[test]
    fn adaptive_window_scales_with_span() {
        let ds = Downsampler::new(500);
        assert_eq!(ds.adaptive_window(minutes(0), minutes(1000)), TimeDelta::minutes(2));
        assert_eq!(
            ds.adaptive_window(minutes(0), minutes(60 * 24 * 365)),
            TimeDelta::seconds(60 * 24 * 365 * 60 / 500)
        );
    }
}
