//! Reading Store
//!
//! Append-only persistence of readings plus the measurement type catalog.
//!
//! ## Contract
//!
//! - `append` inserts one row. Identical rows are not deduplicated.
//! - `append_all` inserts a batch all or nothing: a rejected batch leaves no
//!   row behind.
//! - `query_range` returns matching rows in ascending time order; an empty
//!   result is valid.
//! - `list_devices` returns every device seen at least once.
//! - `list_types` returns the catalog the store was created with.
//!
//! Rows are never updated or deleted.
//!
//! ## Implementations
//!
//! - [`JsonLinesStore`]: directory of JSON Lines files, used by the logger.
//! - [`MemoryStore`]: in-process vector, used by tests and replay.

use std::collections::BTreeSet;

use chrono::{DateTime, Utc};

use crate::catalog::{Catalog, MeasurementType};
use crate::errors::StoreResult;
use crate::reading::Reading;

pub mod jsonl;
pub mod memory;

pub use jsonl::JsonLinesStore;
pub use memory::MemoryStore;

/// Persistence for readings
///
/// Implementations must be safe to share between the ingestion context
/// (single writer) and any number of concurrent query readers.
pub trait ReadingStore: Send + Sync {
    /// Insert one reading
    fn append(&self, reading: &Reading) -> StoreResult<()>;

    /// Readings of `device` with `from <= time <= to`, ascending by time
    ///
    /// `measurement = None` returns every type.
    fn query_range(
        &self,
        device: &str,
        measurement: Option<MeasurementType>,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> StoreResult<Vec<Reading>>;

    /// Every device with at least one reading
    fn list_devices(&self) -> StoreResult<BTreeSet<String>>;

    /// The store's catalog
    fn list_types(&self) -> StoreResult<Catalog>;

    /// Insert readings in order, either all of them or none
    fn append_all(&self, readings: &[Reading]) -> StoreResult<()>;
}

/// Whether a reading matches a range query
pub(crate) fn matches(
    reading: &Reading,
    device: &str,
    measurement: Option<MeasurementType>,
    from: DateTime<Utc>,
    to: DateTime<Utc>,
) -> bool {
    reading.device == device
        && measurement.map_or(true, |m| reading.measurement == m)
        && reading.time >= from
        && reading.time <= to
}
