//! Query Path
//!
//! Read-only access used by the presentation layer:
//!
//! ```text
//! store.query_range ──► Merger ──► Downsampler ──► Dataset
//!                   └──────────────► Downsampler ──► Series   (single type)
//! ```
//!
//! Queries share nothing with ingestion except the store, and need no locking
//! beyond what the store already provides.
//!
//! ## Time Windows
//!
//! | Preset | Span |
//! |--------|------|
//! | `Day` | 24 h |
//! | `Week` | 168 h |
//! | `Month` | 672 h |
//! | `Year` | 8760 h |
//!
//! `Hours(n)` covers anything else.

use std::collections::BTreeSet;
use std::sync::Arc;

use chrono::{DateTime, TimeDelta, Utc};
use serde::Serialize;

use crate::catalog::{Catalog, MeasurementType};
use crate::config::QuerySettings;
use crate::constants::HOURS_PER_DAY;
use crate::downsample::Downsampler;
use crate::errors::StoreResult;
use crate::merge::Merger;
use crate::reading::{Dataset, Series};
use crate::store::ReadingStore;
use crate::time::{Clock, SystemClock};

/// Inclusive time interval
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct TimeRange {
    /// Earliest time, inclusive
    pub from: DateTime<Utc>,
    /// Latest time, inclusive
    pub to: DateTime<Utc>,
}

impl TimeRange {
    /// Range between two instants
    pub fn new(from: DateTime<Utc>, to: DateTime<Utc>) -> Self {
        Self { from, to }
    }

    /// Range covering `window` up to `now`
    pub fn last(window: TimeWindow, now: DateTime<Utc>) -> Self {
        Self {
            from: now - window.span(),
            to: now,
        }
    }
}

/// Named look-back spans offered to chart viewers
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimeWindow {
    /// Last 24 hours
    Day,
    /// Last 7 days
    Week,
    /// Last 28 days
    Month,
    /// Last 365 days
    Year,
    /// Arbitrary number of hours
    Hours(u32),
}

impl TimeWindow {
    /// Length of the window
    pub fn span(&self) -> TimeDelta {
        TimeDelta::hours(i64::from(self.hours()))
    }

    /// Length in hours
    pub fn hours(&self) -> u32 {
        match self {
            TimeWindow::Day => HOURS_PER_DAY,
            TimeWindow::Week => 7 * HOURS_PER_DAY,
            TimeWindow::Month => 28 * HOURS_PER_DAY,
            TimeWindow::Year => 365 * HOURS_PER_DAY,
            TimeWindow::Hours(h) => *h,
        }
    }

    /// Parse a preset name (`day`, `week`, `month`, `year`) or an hour count
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "day" | "small" => Some(TimeWindow::Day),
            "week" | "medium" => Some(TimeWindow::Week),
            "month" | "large" => Some(TimeWindow::Month),
            "year" => Some(TimeWindow::Year),
            other => other.parse().ok().map(TimeWindow::Hours),
        }
    }
}

/// Read-side facade over a reading store
pub struct QueryService {
    store: Arc<dyn ReadingStore>,
    clock: Arc<dyn Clock>,
    merger: Merger,
    downsampler: Downsampler,
}

impl QueryService {
    /// Service with default merge window and point cap
    pub fn new(store: Arc<dyn ReadingStore>) -> Self {
        Self {
            store,
            clock: Arc::new(SystemClock),
            merger: Merger::default(),
            downsampler: Downsampler::default(),
        }
    }

    /// Service with the point cap from `settings`
    pub fn from_settings(store: Arc<dyn ReadingStore>, settings: &QuerySettings) -> Self {
        Self::new(store).with_max_points(settings.max_data_points)
    }

    /// Override the output point cap
    pub fn with_max_points(mut self, max_points: usize) -> Self {
        self.downsampler = Downsampler::new(max_points);
        self
    }

    /// Override the merger
    pub fn with_merger(mut self, merger: Merger) -> Self {
        self.merger = merger;
        self
    }

    /// Override the clock used as "now" for adaptive windows
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Current time according to the service clock
    pub fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }

    /// Downsampled series of one type for one device
    pub fn fetch(
        &self,
        range: TimeRange,
        measurement: MeasurementType,
        device: &str,
    ) -> StoreResult<Series> {
        let readings = self
            .store
            .query_range(device, Some(measurement), range.from, range.to)?;
        let mut series = Series::from_readings(device, measurement, &readings);
        series.points = self.downsampler.downsample(&series.points, self.clock.now());
        Ok(series)
    }

    /// Merged, downsampled dataset with one column per catalog type
    pub fn fetch_dataset(&self, range: TimeRange, device: &str) -> StoreResult<Dataset> {
        let readings = self.store.query_range(device, None, range.from, range.to)?;
        let merged = self.merger.merge(&readings);
        let thinned = self.downsampler.downsample(&merged, self.clock.now());
        let catalog = self.store.list_types()?;
        Ok(Dataset::from_merged(device, catalog.types(), &thinned))
    }

    /// Every catalog type downsampled independently, without merging
    pub fn fetch_per_type(&self, range: TimeRange, device: &str) -> StoreResult<Vec<Series>> {
        let readings = self.store.query_range(device, None, range.from, range.to)?;
        let now = self.clock.now();
        let catalog = self.store.list_types()?;

        Ok(catalog
            .types()
            .map(|measurement| {
                let mut series = Series::from_readings(device, measurement, &readings);
                series.points = self.downsampler.downsample(&series.points, now);
                series
            })
            .collect())
    }

    /// Devices with recorded data
    pub fn list_devices(&self) -> StoreResult<BTreeSet<String>> {
        self.store.list_devices()
    }

    /// Catalog of measurement types
    pub fn list_types(&self) -> StoreResult<Catalog> {
        self.store.list_types()
    }
}
