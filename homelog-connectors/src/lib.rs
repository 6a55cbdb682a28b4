//! Sensor Ingestion for homelog
//!
//! ## Overview
//!
//! Readings reach the logger in one of two ways, and each has its own
//! [`Ingestor`]:
//!
//! ### Poll (HTTP)
//!
//! **When to use:**
//! - Sensor exposes its current values over HTTP
//! - Sensor does not push on its own
//!
//! **Behavior:**
//! - Wakes on wall-clock minutes divisible by the period (:00, :05, ...)
//! - One GET per wake-up, bounded by a timeout
//! - Every catalog field present in the JSON body becomes one reading
//!
//! ### Subscribe (MQTT)
//!
//! **When to use:**
//! - Sensor publishes each measurement on its own topic
//! - Several sensors share one broker
//!
//! **Behavior:**
//! - Topics are `<channel>/<Type>`, one channel per device
//! - Values accumulate per device until every expected type is present
//! - The complete sample is written at once and the accumulator resets
//!
//! ## Error Handling
//!
//! | Error | Reaction |
//! |-------|----------|
//! | [`TransportError`] | cycle skipped, logged, next cycle proceeds |
//! | [`ParseError`] | unit of work discarded, logged |
//! | [`SchedulingError`] | fatal, loop stops |
//! | channel closed | fatal, loop stops |
//!
//! Storage failures are handled by [`ingest::run`], which owns the store.
//!
//! ## Example Usage
//!
//! ```no_run
//! use std::sync::Arc;
//! use homelog_connectors::{http::{PollIngestor, UreqFetch}, ingest};
//! use homelog_core::{store::JsonLinesStore, SystemClock, TimeAligner};
//! use tokio_util::sync::CancellationToken;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let store = JsonLinesStore::open("/var/lib/homelog")?;
//! let fetch = UreqFetch::new("http://192.168.1.40/", std::time::Duration::from_secs(5));
//! let ingestor = PollIngestor::new(fetch, "kitchen", TimeAligner::default(), Arc::new(SystemClock));
//!
//! let stats = ingest::run(ingestor, &store, CancellationToken::new()).await?;
//! println!("{} readings written", stats.readings_written);
//! # Ok(())
//! # }
//! ```

#![deny(unsafe_code)]

pub mod http;
pub mod ingest;
pub mod mqtt;
pub mod schedule;

pub use homelog_core::errors::{ParseError, SchedulingError};
use homelog_core::Reading;
use thiserror::Error;

pub use ingest::{run, IngestStats};
pub use schedule::AlignedTicker;

/// Failures talking to a polled sensor
#[derive(Debug, Error)]
pub enum TransportError {
    /// Request did not complete in time
    #[error("request timed out after {0:?}")]
    Timeout(std::time::Duration),

    /// Connection could not be established or broke mid-request
    #[error("connection failed: {0}")]
    Connection(String),

    /// Server answered with a non-success status
    #[error("sensor returned status {status}")]
    Status {
        /// HTTP status code
        status: u16,
    },

    /// Response body could not be read
    #[error("unable to read response body: {0}")]
    Body(String),
}

/// Anything that can go wrong in one ingestion cycle
#[derive(Debug, Error)]
pub enum IngestError {
    /// Sensor unreachable
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// Payload rejected
    #[error(transparent)]
    Parse(#[from] ParseError),

    /// Aligner produced a non-positive delay or an invalid period
    #[error(transparent)]
    Scheduling(#[from] SchedulingError),

    /// The transport task went away
    #[error("message channel closed")]
    ChannelClosed,
}

impl IngestError {
    /// Whether the ingestion loop must stop
    pub fn is_fatal(&self) -> bool {
        matches!(self, IngestError::Scheduling(_) | IngestError::ChannelClosed)
    }
}

/// Source of readings, one unit of work per call
///
/// A unit of work is one poll cycle, or one MQTT message in subscribe mode.
/// The loop first waits on [`ready`](Ingestor::ready), which may be abandoned
/// at shutdown, then runs [`next_cycle`](Ingestor::next_cycle) to completion.
/// An empty vector means the unit completed without producing rows (for
/// example a partial sample still accumulating).
#[async_trait::async_trait]
pub trait Ingestor: Send {
    /// Wait until the next unit of work is due
    ///
    /// Must be cancel-safe: dropping the future before it resolves loses
    /// nothing, and the next call resumes the same wait.
    async fn ready(&mut self) -> Result<(), IngestError> {
        Ok(())
    }

    /// Process the unit of work that [`ready`](Ingestor::ready) announced
    async fn next_cycle(&mut self) -> Result<Vec<Reading>, IngestError>;

    /// Short name for log lines, the device when there is only one
    fn name(&self) -> &str;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_scheduling_and_channel_errors_are_fatal() {
        assert!(IngestError::from(SchedulingError::InvalidPeriod(0)).is_fatal());
        assert!(IngestError::ChannelClosed.is_fatal());
        assert!(!IngestError::from(TransportError::Status { status: 503 }).is_fatal());
        assert!(!IngestError::from(ParseError::NotAnObject).is_fatal());
    }
}
