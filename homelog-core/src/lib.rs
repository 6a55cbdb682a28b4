//! Core engine for homelog
//!
//! Stores sensor readings and turns them back into chart-sized series.
//!
//! Key pieces:
//! - Aligned scheduling: polls fire on wall-clock minutes divisible by the period
//! - Append-only reading store with a fixed measurement catalog
//! - Merge window folding different types into one timestamped row
//! - Adaptive downsampling bounding every query to a fixed point budget
//!
//! ```no_run
//! use std::sync::Arc;
//! use chrono::Utc;
//! use homelog_core::query::{QueryService, TimeRange, TimeWindow};
//! use homelog_core::store::JsonLinesStore;
//!
//! let store = JsonLinesStore::open("/var/lib/homelog").unwrap();
//! let service = QueryService::new(Arc::new(store));
//!
//! let week = TimeRange::last(TimeWindow::Week, Utc::now());
//! let dataset = service.fetch_dataset(week, "kitchen").unwrap();
//! println!("{} points", dataset.len());
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod catalog;
pub mod config;
pub mod constants;
pub mod downsample;
pub mod errors;
pub mod merge;
pub mod query;
pub mod reading;
pub mod store;
pub mod time;

// Public API
pub use catalog::{Catalog, CatalogEntry, MeasurementType};
pub use downsample::{Downsampler, TimedSample};
pub use errors::{ConfigError, ParseError, SchedulingError, StorageError, StoreResult};
pub use merge::Merger;
pub use query::{QueryService, TimeRange, TimeWindow};
pub use reading::{Dataset, MergedPoint, Reading, Series, SeriesPoint};
pub use store::{JsonLinesStore, MemoryStore, ReadingStore};
pub use time::{next_delay, Clock, FixedClock, SystemClock, TimeAligner};

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn version_exists() {
        assert!(!VERSION.is_empty());
    }
}
