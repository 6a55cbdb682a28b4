//! Shared Constants
//!
//! Defaults and fixed parameters used across the ingestion and query paths.
//! Values that can be overridden at startup are marked `DEFAULT_*`; the rest
//! are part of the storage and merge contract and must not change between
//! releases without migrating existing stores.

// ===== TIME UNIT CONVERSIONS =====

/// Seconds per minute.
pub const SECONDS_PER_MINUTE: u32 = 60;

/// Minutes per hour.
pub const MINUTES_PER_HOUR: u32 = 60;

/// Hours per day.
pub const HOURS_PER_DAY: u32 = 24;

// ===== SCHEDULING =====

/// Default polling period in minutes.
///
/// Polls fire when the minute-of-hour is a multiple of this value,
/// so 5 gives :00, :05, :10, ... :55.
pub const DEFAULT_PERIOD_MINUTES: u32 = 5;

/// Largest accepted polling period in minutes.
pub const MAX_PERIOD_MINUTES: u32 = MINUTES_PER_HOUR;

/// Default timeout for a single sensor request (seconds).
pub const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 5;

// ===== MERGE / DOWNSAMPLE =====

/// Merge window in seconds.
///
/// Readings of different types whose timestamps fall within this span of a
/// group's first member are folded into one merged point.
pub const MERGE_WINDOW_SECS: i64 = 300;

/// Default cap on the number of points returned by a query.
pub const DEFAULT_MAX_DATA_POINTS: usize = 500;

/// Decimal places kept on averaged values.
pub const AVERAGE_DECIMAL_PLACES: i32 = 2;

// ===== TRANSPORT =====

/// Default MQTT broker port.
pub const DEFAULT_MQTT_PORT: u16 = 1883;

/// MQTT keep-alive interval (seconds).
pub const MQTT_KEEP_ALIVE_SECS: u64 = 60;

// ===== STORAGE =====

/// File holding the measurement type catalog inside the store directory.
pub const CATALOG_FILE: &str = "RecordingType.jsonl";

/// File holding the appended readings inside the store directory.
pub const RESPONSES_FILE: &str = "Responses.jsonl";
