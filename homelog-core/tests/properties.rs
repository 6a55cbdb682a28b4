//! Property-based tests for aligner, merger and downsampler

use chrono::{DateTime, TimeDelta, TimeZone, Timelike, Utc};
use homelog_core::{next_delay, Downsampler, MeasurementType, Merger, Reading, SeriesPoint};
use proptest::prelude::*;

fn base() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 5, 17, 0, 0, 0).unwrap()
}

fn measurement_strategy() -> impl Strategy<Value = MeasurementType> {
    prop::sample::select(MeasurementType::ALL.to_vec())
}

/// Ascending readings for one device, value = index so groups can be traced back
fn readings_strategy() -> impl Strategy<Value = Vec<Reading>> {
    prop::collection::vec((0i64..900, measurement_strategy()), 0..200).prop_map(|steps| {
        let mut t = base();
        steps
            .into_iter()
            .enumerate()
            .map(|(i, (gap, measurement))| {
                t += TimeDelta::seconds(gap);
                Reading::new(t, "dev", measurement, i as f64)
            })
            .collect()
    })
}

fn series_strategy() -> impl Strategy<Value = Vec<SeriesPoint>> {
    prop::collection::vec((1i64..7200, -50.0f64..150.0), 0..400).prop_map(|steps| {
        let mut t = base();
        steps
            .into_iter()
            .map(|(gap, value)| {
                t += TimeDelta::seconds(gap);
                SeriesPoint::new(t, value)
            })
            .collect()
    })
}

proptest! {
    #[test]
    fn next_delay_hits_aligned_boundary(
        hour in 0u32..24,
        minute in 0u32..60,
        second in 0u32..60,
        micros in 0u32..1_000_000,
        period in 1u32..=60,
    ) {
        let now = Utc.with_ymd_and_hms(2024, 5, 17, hour, minute, second).unwrap()
            + TimeDelta::microseconds(i64::from(micros));

        let delay = next_delay(&now, period).unwrap();
        prop_assert!(delay > std::time::Duration::ZERO);
        prop_assert!(delay <= std::time::Duration::from_secs(u64::from(period) * 60));

        let target = now + TimeDelta::from_std(delay).unwrap();
        prop_assert_eq!(target.second(), 0);
        prop_assert_eq!(target.nanosecond(), 0);
        prop_assert_eq!(target.minute() % period, 0);
    }

    #[test]
    fn merge_groups_are_distinct_and_windowed(readings in readings_strategy()) {
        let merger = Merger::default();
        let merged = merger.merge(&readings);

        let total: usize = merged.iter().map(|p| p.values.len()).sum();
        prop_assert_eq!(total, readings.len());

        for pair in merged.windows(2) {
            prop_assert!(pair[0].time <= pair[1].time);
        }

        for point in &merged {
            for (&measurement, &value) in &point.values {
                let source = &readings[value as usize];
                prop_assert_eq!(source.measurement, measurement);
                let offset = source.time - point.time;
                prop_assert!(offset >= TimeDelta::zero());
                prop_assert!(offset <= merger.window());
            }
        }
    }

    #[test]
    fn downsample_never_exceeds_cap(
        series in series_strategy(),
        max_points in 1usize..600,
        lag_secs in -3600i64..86_400,
    ) {
        let now = series.last().map_or(base(), |p| p.time) + TimeDelta::seconds(lag_secs);
        let out = Downsampler::new(max_points).downsample(&series, now);

        prop_assert!(out.len() <= max_points);
        if series.len() <= max_points {
            prop_assert_eq!(out, series);
        } else {
            prop_assert_eq!(out[0], series[0]);
        }
    }
}
