//! Data Model
//!
//! - [`Reading`]: one raw measurement, immutable once written.
//! - [`MergedPoint`]: readings of different types folded into one instant.
//! - [`SeriesPoint`] / [`Series`]: `(time, value)` pairs for one device and type.
//! - [`Dataset`]: merged points laid out on a shared time axis, one column per type.
//!
//! Readings are the only persisted shape. Everything else is rebuilt per query.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::catalog::MeasurementType;

/// One raw measurement of one type from one device at one instant
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Reading {
    /// When the value was recorded
    pub time: DateTime<Utc>,
    /// Device identifier
    pub device: String,
    /// Measurement type
    #[serde(rename = "type")]
    pub measurement: MeasurementType,
    /// Recorded value in the catalog unit
    pub value: f64,
}

impl Reading {
    /// Create a reading
    pub fn new(
        time: DateTime<Utc>,
        device: impl Into<String>,
        measurement: MeasurementType,
        value: f64,
    ) -> Self {
        Self {
            time,
            device: device.into(),
            measurement,
            value,
        }
    }
}

/// Readings of distinct types that fell within one merge window
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MergedPoint {
    /// Time of the group's first reading
    pub time: DateTime<Utc>,
    /// One value per type present in the group
    pub values: BTreeMap<MeasurementType, f64>,
}

impl MergedPoint {
    /// Seed a point from its first reading
    pub fn seed(reading: &Reading) -> Self {
        let mut values = BTreeMap::new();
        values.insert(reading.measurement, reading.value);
        Self {
            time: reading.time,
            values,
        }
    }

    /// Value for a type, if present
    pub fn get(&self, measurement: MeasurementType) -> Option<f64> {
        self.values.get(&measurement).copied()
    }

    /// Whether a value of this type is already held
    pub fn contains(&self, measurement: MeasurementType) -> bool {
        self.values.contains_key(&measurement)
    }
}

/// A single `(time, value)` pair
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SeriesPoint {
    /// Sample time
    pub time: DateTime<Utc>,
    /// Sample value
    pub value: f64,
}

impl SeriesPoint {
    /// Create a point
    pub fn new(time: DateTime<Utc>, value: f64) -> Self {
        Self { time, value }
    }
}

impl From<&Reading> for SeriesPoint {
    fn from(reading: &Reading) -> Self {
        Self::new(reading.time, reading.value)
    }
}

/// Ordered points for one device and measurement type
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Series {
    /// Device the points belong to
    pub device: String,
    /// Measurement type of every point
    pub measurement: MeasurementType,
    /// Points in ascending time order
    pub points: Vec<SeriesPoint>,
}

impl Series {
    /// Build a series from readings of a single device and type
    pub fn from_readings(
        device: impl Into<String>,
        measurement: MeasurementType,
        readings: &[Reading],
    ) -> Self {
        Self {
            device: device.into(),
            measurement,
            points: readings
                .iter()
                .filter(|r| r.measurement == measurement)
                .map(SeriesPoint::from)
                .collect(),
        }
    }

    /// Number of points
    pub fn len(&self) -> usize {
        self.points.len()
    }

    /// Whether the series has no points
    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }
}

/// Columns of optional values sharing one time axis
///
/// This is the shape handed to the presentation layer: `labels[i]` is the
/// time of row `i`, and `columns[type][i]` is that type's value at row `i`
/// or `None` when the merged point had no reading of that type.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Dataset {
    /// Device the rows belong to
    pub device: String,
    /// Row timestamps, ascending
    pub labels: Vec<DateTime<Utc>>,
    /// One column per requested type, each as long as `labels`
    pub columns: BTreeMap<MeasurementType, Vec<Option<f64>>>,
}

impl Dataset {
    /// Lay merged points out as columns for the given types
    pub fn from_merged(
        device: impl Into<String>,
        types: impl IntoIterator<Item = MeasurementType>,
        points: &[MergedPoint],
    ) -> Self {
        let columns = types
            .into_iter()
            .map(|t| (t, points.iter().map(|p| p.get(t)).collect()))
            .collect();

        Self {
            device: device.into(),
            labels: points.iter().map(|p| p.time).collect(),
            columns,
        }
    }

    /// Number of rows
    pub fn len(&self) -> usize {
        self.labels.len()
    }

    /// Whether the dataset has no rows
    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }

    /// Column for a type
    pub fn column(&self, measurement: MeasurementType) -> Option<&[Option<f64>]> {
        self.columns.get(&measurement).map(Vec::as_slice)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at(minute: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 1, 12, minute, 0).unwrap()
    }

    #[test]
    fn reading_row_format() {
        let reading = Reading::new(at(5), "kitchen", MeasurementType::Temperature, 21.5);
        let json = serde_json::to_string(&reading).unwrap();
        assert_eq!(
            json,
            r#"{"time":"2024-03-01T12:05:00Z","device":"kitchen","type":"temperature","value":21.5}"#
        );

        let back: Reading = serde_json::from_str(&json).unwrap();
        assert_eq!(back, reading);
    }

    #[test]
    fn series_keeps_only_its_type() {
        let readings = vec![
            Reading::new(at(0), "x", MeasurementType::Temperature, 20.0),
            Reading::new(at(0), "x", MeasurementType::Humidity, 50.0),
            Reading::new(at(5), "x", MeasurementType::Temperature, 21.0),
        ];
        let series = Series::from_readings("x", MeasurementType::Temperature, &readings);
        assert_eq!(series.len(), 2);
        assert_eq!(series.points[1], SeriesPoint::new(at(5), 21.0));
    }

    #[test]
    fn dataset_fills_missing_values_with_none() {
        let mut first = MergedPoint::seed(&Reading::new(at(0), "x", MeasurementType::Temperature, 20.0));
        first.values.insert(MeasurementType::Humidity, 50.0);
        let second = MergedPoint::seed(&Reading::new(at(5), "x", MeasurementType::Temperature, 21.0));

        let dataset = Dataset::from_merged(
            "x",
            [MeasurementType::Temperature, MeasurementType::Humidity],
            &[first, second],
        );

        assert_eq!(dataset.len(), 2);
        assert_eq!(dataset.column(MeasurementType::Temperature), Some(&[Some(20.0), Some(21.0)][..]));
        assert_eq!(dataset.column(MeasurementType::Humidity), Some(&[Some(50.0), None][..]));
        assert_eq!(dataset.column(MeasurementType::Pressure), None);
    }
}
