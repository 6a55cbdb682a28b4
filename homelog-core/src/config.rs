//! Startup Configuration
//!
//! Settings come from environment-style key/value pairs. Every loader takes a
//! lookup function so tests can feed a map instead of touching the process
//! environment:
//!
//! ```rust
//! use std::collections::HashMap;
//! use homelog_core::config::{IngestSettings, LoggerSettings};
//!
//! let env: HashMap<&str, &str> = [
//!     ("DATABASE_LOCATION", "/var/lib/homelog"),
//!     ("PROTOCOL_TYPE", "HTTP"),
//!     ("SENSOR_ADDRESS", "192.168.1.40"),
//! ]
//! .into_iter()
//! .collect();
//!
//! let settings = LoggerSettings::from_lookup(|k| env.get(k).map(|v| v.to_string())).unwrap();
//! assert!(matches!(settings.ingest, IngestSettings::Poll(_)));
//! ```
//!
//! Empty values count as missing. Anything required that is missing or
//! unusable is a [`ConfigError`], and the logger refuses to start.

use std::path::PathBuf;
use std::time::Duration;

use crate::catalog::MeasurementType;
use crate::constants::{
    DEFAULT_MAX_DATA_POINTS, DEFAULT_MQTT_PORT, DEFAULT_PERIOD_MINUTES,
    DEFAULT_REQUEST_TIMEOUT_SECS,
};
use crate::errors::ConfigError;
use crate::time::TimeAligner;

/// Store directory
pub const DATABASE_LOCATION: &str = "DATABASE_LOCATION";
/// Ingestion mode selector
pub const PROTOCOL_TYPE: &str = "PROTOCOL_TYPE";
/// Polled sensor host[:port]
pub const SENSOR_ADDRESS: &str = "SENSOR_ADDRESS";
/// Device identifier for polled readings
pub const DEVICE_NAME: &str = "DEVICE_NAME";
/// Poll period in minutes
pub const POLL_PERIOD_MINUTES: &str = "POLL_PERIOD_MINUTES";
/// Poll request timeout in seconds
pub const REQUEST_TIMEOUT_SECS: &str = "REQUEST_TIMEOUT_SECS";
/// Broker host
pub const DEVICE_ADDRESS: &str = "DEVICE_ADDRESS";
/// Broker port
pub const MQTT_PORT: &str = "MQTT_PORT";
/// Comma-separated topic prefixes
pub const SENSOR_CHANNEL: &str = "SENSOR_CHANNEL";
/// Comma-separated measurement types that complete a sample
pub const SENSOR_TYPES: &str = "SENSOR_TYPES";
/// Downsampler output cap
pub const MAX_DATA_POINTS: &str = "MAX_DATA_POINTS";

/// How readings reach the logger
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Protocol {
    /// Periodic HTTP request to a sensor
    Poll,
    /// Pushed MQTT messages
    Subscribe,
}

impl Protocol {
    fn parse(raw: &str) -> Result<Self, ConfigError> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "poll" | "http" => Ok(Protocol::Poll),
            "subscribe" | "mqtt" => Ok(Protocol::Subscribe),
            _ => Err(ConfigError::Invalid {
                key: PROTOCOL_TYPE,
                value: raw.to_string(),
                reason: "expected HTTP or MQTT",
            }),
        }
    }
}

/// Poll mode settings
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PollSettings {
    /// Sensor host[:port]
    pub sensor_address: String,
    /// Device identifier written with every reading
    pub device_name: String,
    /// Aligned polling period
    pub aligner: TimeAligner,
    /// Upper bound on one request
    pub request_timeout: Duration,
}

impl PollSettings {
    /// URL the sensor answers on
    pub fn sensor_url(&self) -> String {
        format!("http://{}/", self.sensor_address)
    }
}

/// Subscribe mode settings
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubscribeSettings {
    /// Broker host
    pub broker_host: String,
    /// Broker port
    pub broker_port: u16,
    /// Topic prefixes, one per device
    pub channels: Vec<String>,
    /// Types that complete a partial sample
    pub expected: Vec<MeasurementType>,
}

/// Mode-specific ingestion settings
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IngestSettings {
    /// HTTP polling
    Poll(PollSettings),
    /// MQTT subscription
    Subscribe(SubscribeSettings),
}

impl IngestSettings {
    /// Selected protocol
    pub fn protocol(&self) -> Protocol {
        match self {
            IngestSettings::Poll(_) => Protocol::Poll,
            IngestSettings::Subscribe(_) => Protocol::Subscribe,
        }
    }
}

/// Everything the logger process needs
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoggerSettings {
    /// Store directory
    pub database_location: PathBuf,
    /// Mode-specific part
    pub ingest: IngestSettings,
}

impl LoggerSettings {
    /// Load from the process environment
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load through an arbitrary key lookup
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let env = Lookup(lookup);
        let database_location = PathBuf::from(env.required(DATABASE_LOCATION)?);

        let ingest = match Protocol::parse(&env.required(PROTOCOL_TYPE)?)? {
            Protocol::Poll => IngestSettings::Poll(poll_settings(&env)?),
            Protocol::Subscribe => IngestSettings::Subscribe(subscribe_settings(&env)?),
        };

        Ok(Self {
            database_location,
            ingest,
        })
    }
}

/// Settings for the read side
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QuerySettings {
    /// Store directory
    pub database_location: PathBuf,
    /// Downsampler cap
    pub max_data_points: usize,
}

impl QuerySettings {
    /// Load from the process environment
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load through an arbitrary key lookup
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let env = Lookup(lookup);
        let max_data_points: usize = env.parsed(MAX_DATA_POINTS, DEFAULT_MAX_DATA_POINTS)?;
        if max_data_points == 0 {
            return Err(ConfigError::Invalid {
                key: MAX_DATA_POINTS,
                value: "0".to_string(),
                reason: "must be at least 1",
            });
        }

        Ok(Self {
            database_location: PathBuf::from(env.required(DATABASE_LOCATION)?),
            max_data_points,
        })
    }
}

fn poll_settings<F: Fn(&str) -> Option<String>>(
    env: &Lookup<F>,
) -> Result<PollSettings, ConfigError> {
    let sensor_address = env
        .get(SENSOR_ADDRESS)
        .or_else(|| env.get(DEVICE_ADDRESS))
        .ok_or(ConfigError::Missing(SENSOR_ADDRESS))?;
    let device_name = env.get(DEVICE_NAME).unwrap_or_else(|| sensor_address.clone());

    let period: u32 = env.parsed(POLL_PERIOD_MINUTES, DEFAULT_PERIOD_MINUTES)?;
    let aligner = TimeAligner::new(period).map_err(|_| ConfigError::Invalid {
        key: POLL_PERIOD_MINUTES,
        value: period.to_string(),
        reason: "must be between 1 and 60",
    })?;

    let timeout_secs: u64 = env.parsed(REQUEST_TIMEOUT_SECS, DEFAULT_REQUEST_TIMEOUT_SECS)?;
    if timeout_secs == 0 {
        return Err(ConfigError::Invalid {
            key: REQUEST_TIMEOUT_SECS,
            value: "0".to_string(),
            reason: "must be at least 1",
        });
    }

    Ok(PollSettings {
        sensor_address,
        device_name,
        aligner,
        request_timeout: Duration::from_secs(timeout_secs),
    })
}

fn subscribe_settings<F: Fn(&str) -> Option<String>>(
    env: &Lookup<F>,
) -> Result<SubscribeSettings, ConfigError> {
    let broker_host = env
        .get(DEVICE_ADDRESS)
        .or_else(|| env.get(SENSOR_ADDRESS))
        .ok_or(ConfigError::Missing(DEVICE_ADDRESS))?;
    let broker_port = env.parsed(MQTT_PORT, DEFAULT_MQTT_PORT)?;

    let raw_channels = env.required(SENSOR_CHANNEL)?;
    let channels: Vec<String> = split_list(&raw_channels)
        .map(|c| c.trim_end_matches('/').to_string())
        .filter(|c| !c.is_empty())
        .collect();
    if channels.is_empty() {
        return Err(ConfigError::Invalid {
            key: SENSOR_CHANNEL,
            value: raw_channels,
            reason: "no channel names",
        });
    }

    let expected = match env.get(SENSOR_TYPES) {
        None => vec![MeasurementType::Temperature, MeasurementType::Humidity],
        Some(raw) => parse_types(&raw)?,
    };

    Ok(SubscribeSettings {
        broker_host,
        broker_port,
        channels,
        expected,
    })
}

fn parse_types(raw: &str) -> Result<Vec<MeasurementType>, ConfigError> {
    let mut types = Vec::new();
    for name in split_list(raw) {
        let measurement = name.parse::<MeasurementType>().map_err(|_| ConfigError::Invalid {
            key: SENSOR_TYPES,
            value: raw.to_string(),
            reason: "contains an unknown measurement type",
        })?;
        if !types.contains(&measurement) {
            types.push(measurement);
        }
    }

    if types.is_empty() {
        return Err(ConfigError::Invalid {
            key: SENSOR_TYPES,
            value: raw.to_string(),
            reason: "no measurement types",
        });
    }
    Ok(types)
}

fn split_list(raw: &str) -> impl Iterator<Item = &str> {
    raw.split(',').map(str::trim).filter(|s| !s.is_empty())
}

struct Lookup<F>(F);

impl<F: Fn(&str) -> Option<String>> Lookup<F> {
    fn get(&self, key: &str) -> Option<String> {
        (self.0)(key)
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty())
    }

    fn required(&self, key: &'static str) -> Result<String, ConfigError> {
        self.get(key).ok_or(ConfigError::Missing(key))
    }

    fn parsed<T: std::str::FromStr>(&self, key: &'static str, default: T) -> Result<T, ConfigError> {
        match self.get(key) {
            None => Ok(default),
            Some(raw) => raw.parse().map_err(|_| ConfigError::Invalid {
                key,
                value: raw,
                reason: "not a valid number",
            }),
        }
    }
}
