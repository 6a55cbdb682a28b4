//! Error Types for the Telemetry Core
//!
//! ## Error Classes
//!
//! Every failure the core can produce falls into one class, and the class
//! alone decides how the process reacts:
//!
//! | Class | Type | Reaction |
//! |-------|------|----------|
//! | Configuration | [`ConfigError`] | fatal at startup |
//! | Payload | [`ParseError`] | unit of work discarded, logged |
//! | Storage | [`StorageError`] | cycle data dropped, logged; fatal only from bootstrap |
//! | Scheduling | [`SchedulingError`] | fatal, never retried |
//!
//! Transport failures live in the connectors crate because only the
//! connectors know about sockets and brokers.
//!
//! ## Handling Strategy
//!
//! ```rust
//! use homelog_core::errors::StorageError;
//!
//! fn on_write_failure(err: &StorageError) {
//!     if err.is_bootstrap() {
//!         // The store could not be created: nothing else can work.
//!         std::process::exit(1);
//!     }
//!     // Any other write failure loses this cycle's data only.
//!     log::error!("dropping cycle data: {err}");
//! }
//! ```

use std::path::PathBuf;

use chrono::{DateTime, FixedOffset};
use thiserror::Error;

/// Result type for store operations
pub type StoreResult<T> = Result<T, StorageError>;

/// Missing or invalid startup configuration
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ConfigError {
    /// A setting required by the selected mode is absent or empty
    #[error("{0} is not set")]
    Missing(&'static str),

    /// A setting is present but cannot be used
    #[error("{key}={value:?} is invalid: {reason}")]
    Invalid {
        /// Setting name
        key: &'static str,
        /// Raw value as found in the environment
        value: String,
        /// What is wrong with it
        reason: &'static str,
    },
}

/// A payload that could not be turned into readings
#[derive(Debug, Error, Clone, PartialEq)]
pub enum ParseError {
    /// Body is not well-formed structured data
    #[error("malformed payload: {0}")]
    Malformed(String),

    /// Body parsed, but the top level is not a mapping
    #[error("payload is not an object")]
    NotAnObject,

    /// A value that should be numeric is not
    #[error("value for {field} is not a number: {raw:?}")]
    NotANumber {
        /// Field name or topic the value came from
        field: String,
        /// Offending raw text
        raw: String,
    },

    /// Measurement name that is not in the catalog
    #[error("unknown measurement type {0:?}")]
    UnknownMeasurement(String),

    /// Topic outside the subscribed channels
    #[error("unexpected topic {0:?}")]
    UnexpectedTopic(String),
}

/// Failures of the reading store
#[derive(Debug, Error)]
pub enum StorageError {
    /// Underlying file operation failed
    #[error("store I/O failed: {0}")]
    Io(#[from] std::io::Error),

    /// A row could not be encoded or a catalog row decoded
    #[error("store encoding failed: {0}")]
    Serialize(#[from] serde_json::Error),

    /// Write references a measurement type missing from the store catalog
    #[error("measurement type {0:?} is not in the store catalog")]
    UnknownType(String),

    /// One-time creation of the store failed
    #[error("unable to initialise store at {path}: {source}")]
    Bootstrap {
        /// Store location
        path: PathBuf,
        /// Root cause
        #[source]
        source: Box<StorageError>,
    },
}

impl StorageError {
    /// Whether this error came from the one-time bootstrap path
    pub fn is_bootstrap(&self) -> bool {
        matches!(self, StorageError::Bootstrap { .. })
    }
}

/// Scheduling logic defects
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SchedulingError {
    /// Period outside 1..=60 minutes
    #[error("polling period of {0} minutes is not in 1..=60")]
    InvalidPeriod(u32),

    /// Computed boundary is not strictly after now
    #[error("computed wake-up {target} is not after {now}")]
    NonPositiveDelay {
        /// Clock reading used for the computation
        now: DateTime<FixedOffset>,
        /// Boundary that was computed
        target: DateTime<FixedOffset>,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_error_messages() {
        assert_eq!(
            ConfigError::Missing("DATABASE_LOCATION").to_string(),
            "DATABASE_LOCATION is not set"
        );

        let err = ConfigError::Invalid {
            key: "MAX_DATA_POINTS",
            value: "lots".into(),
            reason: "expected a positive integer",
        };
        assert_eq!(
            err.to_string(),
            "MAX_DATA_POINTS=\"lots\" is invalid: expected a positive integer"
        );
    }

    #[test]
    fn bootstrap_is_distinguishable() {
        let io = std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied");
        let err = StorageError::Bootstrap {
            path: PathBuf::from("/data"),
            source: Box::new(StorageError::Io(io)),
        };
        assert!(err.is_bootstrap());

        let io = std::io::Error::new(std::io::ErrorKind::Other, "disk full");
        assert!(!StorageError::Io(io).is_bootstrap());
    }
}
