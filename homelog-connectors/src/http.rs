//! HTTP Poll Ingestion
//!
//! ## Overview
//!
//! The sensor answers a plain GET on `http://<address>/` with its current
//! values as a flat JSON object:
//!
//! ```json
//! {"temperature": 21.5, "humidity": 48.0}
//! ```
//!
//! Each wake-up of the aligned ticker issues one request. Every catalog field
//! present in the body becomes one reading stamped with the cycle time; fields
//! that are absent or `null` produce nothing, and keys outside the catalog are
//! ignored. A field that is present but not numeric rejects the whole body.
//!
//! ## Failure Modes
//!
//! | Condition | Result |
//! |-----------|--------|
//! | connection refused, DNS failure | [`TransportError::Connection`] |
//! | no answer within the timeout | [`TransportError::Timeout`] |
//! | non-2xx status | [`TransportError::Status`] |
//! | body not JSON | [`ParseError::Malformed`] |
//! | body not an object | [`ParseError::NotAnObject`] |
//! | catalog field not a number | [`ParseError::NotANumber`] |
//!
//! None of these stop the loop; the next aligned tick polls again.

use std::sync::Arc;
#[cfg(feature = "http")]
use std::time::Duration;

use chrono::{DateTime, Utc};
use homelog_core::{Catalog, Clock, ParseError, Reading, TimeAligner};
use log::debug;
use serde_json::Value;

use crate::schedule::AlignedTicker;
use crate::{IngestError, Ingestor, TransportError};

/// One request to the sensor, returning the response body
#[async_trait::async_trait]
pub trait SensorFetch: Send + Sync {
    /// Fetch the current body
    async fn fetch(&self) -> Result<String, TransportError>;
}

/// Blocking `ureq` client moved off the runtime threads
#[cfg(feature = "http")]
pub struct UreqFetch {
    url: String,
    timeout: Duration,
    agent: ureq::Agent,
}

#[cfg(feature = "http")]
impl UreqFetch {
    /// Client for `url` with a per-request timeout
    pub fn new(url: impl Into<String>, timeout: Duration) -> Self {
        let agent = ureq::AgentBuilder::new()
            .timeout(timeout)
            .user_agent(&format!("homelog/{}", env!("CARGO_PKG_VERSION")))
            .build();

        Self {
            url: url.into(),
            timeout,
            agent,
        }
    }

    /// Target URL
    pub fn url(&self) -> &str {
        &self.url
    }
}

#[cfg(feature = "http")]
#[async_trait::async_trait]
impl SensorFetch for UreqFetch {
    async fn fetch(&self) -> Result<String, TransportError> {
        let request = self.agent.get(&self.url).set("Accept", "application/json");
        let timeout = self.timeout;

        let call = tokio::task::spawn_blocking(move || match request.call() {
            Ok(response) => response.into_string().map_err(|e| {
                if is_timeout(&e) {
                    TransportError::Timeout(timeout)
                } else {
                    TransportError::Body(e.to_string())
                }
            }),
            Err(ureq::Error::Status(status, _)) => Err(TransportError::Status { status }),
            Err(ureq::Error::Transport(e)) if transport_timed_out(&e) => {
                Err(TransportError::Timeout(timeout))
            }
            Err(ureq::Error::Transport(e)) => Err(TransportError::Connection(e.to_string())),
        });

        // The agent timeout bounds the call; the outer one guards a stuck pool thread.
        match tokio::time::timeout(timeout + Duration::from_secs(1), call).await {
            Ok(Ok(result)) => result,
            Ok(Err(join)) => Err(TransportError::Connection(join.to_string())),
            Err(_) => Err(TransportError::Timeout(timeout)),
        }
    }
}

#[cfg(feature = "http")]
fn is_timeout(e: &std::io::Error) -> bool {
    matches!(
        e.kind(),
        std::io::ErrorKind::TimedOut | std::io::ErrorKind::WouldBlock
    )
}

#[cfg(feature = "http")]
fn transport_timed_out(e: &ureq::Transport) -> bool {
    matches!(e.kind(), ureq::ErrorKind::Io)
        && std::error::Error::source(e)
            .and_then(|source| source.downcast_ref::<std::io::Error>())
            .map_or(false, is_timeout)
}

/// Turn a poll response body into readings
///
/// Readings come out in catalog order, all stamped `at`.
pub fn parse_poll_response(
    body: &str,
    device: &str,
    catalog: &Catalog,
    at: DateTime<Utc>,
) -> Result<Vec<Reading>, ParseError> {
    let value: Value =
        serde_json::from_str(body).map_err(|e| ParseError::Malformed(e.to_string()))?;
    let Value::Object(fields) = value else {
        return Err(ParseError::NotAnObject);
    };

    let mut readings = Vec::new();
    for measurement in catalog.types() {
        let field = fields
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(measurement.name()))
            .map(|(_, v)| v);

        match field {
            None | Some(Value::Null) => {}
            Some(Value::Number(n)) => {
                let value = n.as_f64().ok_or_else(|| ParseError::NotANumber {
                    field: measurement.name().to_string(),
                    raw: n.to_string(),
                })?;
                readings.push(Reading::new(at, device, measurement, value));
            }
            Some(other) => {
                return Err(ParseError::NotANumber {
                    field: measurement.name().to_string(),
                    raw: other.to_string(),
                })
            }
        }
    }

    Ok(readings)
}

/// Polls one sensor on aligned wall-clock boundaries
pub struct PollIngestor<F> {
    fetch: F,
    device: String,
    catalog: Catalog,
    clock: Arc<dyn Clock>,
    ticker: AlignedTicker,
}

impl<F: SensorFetch> PollIngestor<F> {
    /// Ingestor writing readings under `device`
    pub fn new(fetch: F, device: impl Into<String>, aligner: TimeAligner, clock: Arc<dyn Clock>) -> Self {
        Self {
            fetch,
            device: device.into(),
            catalog: Catalog::default(),
            ticker: AlignedTicker::new(aligner, Arc::clone(&clock)),
            clock,
        }
    }

    /// Restrict accepted fields to `catalog`
    pub fn with_catalog(mut self, catalog: Catalog) -> Self {
        self.catalog = catalog;
        self
    }

    /// Device name stamped on readings
    pub fn device(&self) -> &str {
        &self.device
    }

    /// Run one cycle immediately, without waiting for the ticker
    pub async fn poll_once(&self) -> Result<Vec<Reading>, IngestError> {
        let at = self.clock.now();
        let body = self.fetch.fetch().await?;
        let readings = parse_poll_response(&body, &self.device, &self.catalog, at)?;
        debug!("polled {} readings from {}", readings.len(), self.device);
        Ok(readings)
    }
}

#[async_trait::async_trait]
impl<F: SensorFetch> Ingestor for PollIngestor<F> {
    async fn ready(&mut self) -> Result<(), IngestError> {
        Ok(self.ticker.tick().await?)
    }

    async fn next_cycle(&mut self) -> Result<Vec<Reading>, IngestError> {
        self.poll_once().await
    }

    fn name(&self) -> &str {
        &self.device
    }
}
