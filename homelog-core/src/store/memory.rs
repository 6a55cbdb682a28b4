//! In-memory store for tests and replay

use std::collections::BTreeSet;
use std::sync::RwLock;

use chrono::{DateTime, Utc};

use super::{matches, ReadingStore};
use crate::catalog::{Catalog, MeasurementType};
use crate::errors::{StorageError, StoreResult};
use crate::reading::Reading;

/// Vector-backed store
///
/// Same contract as the file store, minus durability.
///
/// ```rust
/// use homelog_core::store::{MemoryStore, ReadingStore};
/// use homelog_core::{MeasurementType, Reading};
/// use chrono::Utc;
///
/// let store = MemoryStore::default();
/// store.append(&Reading::new(Utc::now(), "porch", MeasurementType::Humidity, 71.0)).unwrap();
/// assert!(store.list_devices().unwrap().contains("porch"));
/// ```
#[derive(Debug, Default)]
pub struct MemoryStore {
    catalog: Catalog,
    rows: RwLock<Vec<Reading>>,
}

impl MemoryStore {
    /// Empty store with a custom catalog
    pub fn with_catalog(catalog: Catalog) -> Self {
        Self {
            catalog,
            rows: RwLock::new(Vec::new()),
        }
    }

    /// Store pre-filled with readings
    pub fn from_readings(readings: impl IntoIterator<Item = Reading>) -> Self {
        Self {
            catalog: Catalog::default(),
            rows: RwLock::new(readings.into_iter().collect()),
        }
    }

    /// Number of stored rows
    pub fn len(&self) -> usize {
        self.read().len()
    }

    /// Whether nothing has been stored
    pub fn is_empty(&self) -> bool {
        self.read().is_empty()
    }

    /// Copy of every row in insertion order
    pub fn rows(&self) -> Vec<Reading> {
        self.read().clone()
    }

    fn read(&self) -> std::sync::RwLockReadGuard<'_, Vec<Reading>> {
        self.rows.read().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl ReadingStore for MemoryStore {
    fn append(&self, reading: &Reading) -> StoreResult<()> {
        self.append_all(std::slice::from_ref(reading))
    }

    fn append_all(&self, readings: &[Reading]) -> StoreResult<()> {
        if let Some(unknown) = readings.iter().find(|r| !self.catalog.contains(r.measurement)) {
            return Err(StorageError::UnknownType(unknown.measurement.name().to_string()));
        }
        self.rows
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .extend_from_slice(readings);
        Ok(())
    }

    fn query_range(
        &self,
        device: &str,
        measurement: Option<MeasurementType>,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> StoreResult<Vec<Reading>> {
        let mut rows: Vec<Reading> = self
            .read()
            .iter()
            .filter(|r| matches(r, device, measurement, from, to))
            .cloned()
            .collect();
        rows.sort_by_key(|r| r.time);
        Ok(rows)
    }

    fn list_devices(&self) -> StoreResult<BTreeSet<String>> {
        Ok(self.read().iter().map(|r| r.device.clone()).collect())
    }

    fn list_types(&self) -> StoreResult<Catalog> {
        Ok(self.catalog.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at(m: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 1, 12, m, 0).unwrap()
    }

    #[test]
    fn range_query_filters_and_sorts() {
        let store = MemoryStore::from_readings([
            Reading::new(at(10), "a", MeasurementType::Temperature, 2.0),
            Reading::new(at(5), "a", MeasurementType::Temperature, 1.0),
            Reading::new(at(6), "a", MeasurementType::Humidity, 50.0),
            Reading::new(at(7), "b", MeasurementType::Temperature, 9.0),
            Reading::new(at(30), "a", MeasurementType::Temperature, 3.0),
        ]);

        let rows = store
            .query_range("a", Some(MeasurementType::Temperature), at(0), at(10))
            .unwrap();
        let values: Vec<f64> = rows.iter().map(|r| r.value).collect();
        assert_eq!(values, vec![1.0, 2.0]);
    }

    #[test]
    fn empty_range_is_not_an_error() {
        let store = MemoryStore::default();
        assert!(store.query_range("a", None, at(0), at(59)).unwrap().is_empty());
    }

    #[test]
    fn duplicates_are_kept() {
        let store = MemoryStore::default();
        let reading = Reading::new(at(0), "a", MeasurementType::Pressure, 1000.0);
        store.append(&reading).unwrap();
        store.append(&reading).unwrap();
        assert_eq!(store.len(), 2);
    }

    #[test]
    fn batch_with_unknown_type_is_rejected_whole() {
        let store = MemoryStore::with_catalog(Catalog::from_entries([
            crate::catalog::CatalogEntry::from(MeasurementType::Temperature),
        ]));
        let batch = [
            Reading::new(at(0), "a", MeasurementType::Temperature, 20.0),
            Reading::new(at(0), "a", MeasurementType::Pressure, 1000.0),
        ];
        assert!(matches!(store.append_all(&batch), Err(StorageError::UnknownType(_))));
        assert!(store.is_empty());
    }

    #[test]
    fn devices_are_distinct() {
        let store = MemoryStore::from_readings([
            Reading::new(at(0), "b", MeasurementType::Temperature, 1.0),
            Reading::new(at(1), "a", MeasurementType::Temperature, 1.0),
            Reading::new(at(2), "b", MeasurementType::Humidity, 1.0),
        ]);
        let devices: Vec<_> = store.list_devices().unwrap().into_iter().collect();
        assert_eq!(devices, vec!["a".to_string(), "b".to_string()]);
    }
}
