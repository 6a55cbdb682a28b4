//! MQTT Subscribe Ingestion
//!
//! ## Topic Layout
//!
//! ```text
//! <channel>/<Type>        payload: ASCII number
//! home/kitchen/Temperature   "21.5"
//! home/kitchen/Humidity      "48"
//! ```
//!
//! Each configured channel is one device. The topic is split at its last `/`:
//! the prefix names the device, the suffix the measurement type. Only the
//! expected types are accepted; any other suffix is rejected as unexpected.
//!
//! ## Partial Samples
//!
//! A sensor publishes each type separately, so values are held per device
//! until every expected type has arrived. At that point one reading per type
//! is emitted, all stamped with the completion time, and that device's
//! accumulator is cleared. A repeated type before completion overwrites the
//! held value.
//!
//! ```text
//! kitchen/Temperature 20  → {temperature: 20}
//! attic/Temperature   17  → {temperature: 20} {temperature: 17}
//! kitchen/Humidity    50  → flush kitchen {20, 50}; kitchen = {}
//! ```
//!
//! ## Message Flow
//!
//! The broker connection runs in its own task ([`MqttTransport`]) and hands
//! every publish to the ingestor over a channel. Only the ingestor touches
//! the accumulators, so no locking is needed.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use homelog_core::{Catalog, Clock, MeasurementType, ParseError, Reading};
use log::{debug, info};
use tokio::sync::mpsc;

use crate::{IngestError, Ingestor};

/// One publish received from the broker
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TopicMessage {
    /// Full topic
    pub topic: String,
    /// Raw payload
    pub payload: Vec<u8>,
}

impl TopicMessage {
    /// Message from topic and payload
    pub fn new(topic: impl Into<String>, payload: impl Into<Vec<u8>>) -> Self {
        Self {
            topic: topic.into(),
            payload: payload.into(),
        }
    }
}

/// Values of one device waiting for the rest of their sample
#[derive(Debug, Default, Clone, PartialEq)]
pub struct PartialSample {
    values: BTreeMap<MeasurementType, f64>,
}

impl PartialSample {
    /// Hold a value, replacing any earlier one of the same type
    pub fn set(&mut self, measurement: MeasurementType, value: f64) {
        self.values.insert(measurement, value);
    }

    /// Whether every expected type is held
    pub fn is_complete(&self, expected: &[MeasurementType]) -> bool {
        expected.iter().all(|m| self.values.contains_key(m))
    }

    /// Held value of a type
    pub fn get(&self, measurement: MeasurementType) -> Option<f64> {
        self.values.get(&measurement).copied()
    }

    /// Whether nothing is held
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

/// Turns topic messages into complete samples
pub struct SubscribeIngestor {
    messages: mpsc::Receiver<TopicMessage>,
    channels: Vec<String>,
    expected: Vec<MeasurementType>,
    catalog: Catalog,
    clock: Arc<dyn Clock>,
    pending: HashMap<String, PartialSample>,
    inbox: Option<TopicMessage>,
}

impl SubscribeIngestor {
    /// Ingestor for `channels`, completing samples once `expected` are all held
    pub fn new(
        messages: mpsc::Receiver<TopicMessage>,
        channels: Vec<String>,
        expected: Vec<MeasurementType>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            messages,
            channels,
            expected,
            catalog: Catalog::default(),
            clock,
            pending: HashMap::new(),
            inbox: None,
        }
    }

    /// Resolve topic suffixes against `catalog`
    pub fn with_catalog(mut self, catalog: Catalog) -> Self {
        self.catalog = catalog;
        self
    }

    /// Held partial sample of a device
    pub fn pending(&self, device: &str) -> Option<&PartialSample> {
        self.pending.get(device)
    }

    /// Apply one message, returning the flushed sample if it completed one
    pub fn handle(&mut self, message: &TopicMessage) -> Result<Vec<Reading>, ParseError> {
        let (device, suffix) = message
            .topic
            .rsplit_once('/')
            .filter(|(device, _)| self.channels.iter().any(|c| c == device))
            .ok_or_else(|| ParseError::UnexpectedTopic(message.topic.clone()))?;

        let measurement = self.catalog.resolve(suffix)?;
        if !self.expected.contains(&measurement) {
            return Err(ParseError::UnexpectedTopic(message.topic.clone()));
        }
        let value = parse_payload(&message.payload, &message.topic)?;
        debug!("{} {} = {}", device, measurement, value);

        let sample = self.pending.entry(device.to_string()).or_default();
        sample.set(measurement, value);
        if !sample.is_complete(&self.expected) {
            return Ok(Vec::new());
        }

        let sample = std::mem::take(sample);
        let at = self.clock.now();
        info!("complete sample from {}", device);
        Ok(sample
            .values
            .into_iter()
            .map(|(measurement, value)| Reading::new(at, device, measurement, value))
            .collect())
    }
}

fn parse_payload(payload: &[u8], topic: &str) -> Result<f64, ParseError> {
    let not_a_number = || ParseError::NotANumber {
        field: topic.to_string(),
        raw: String::from_utf8_lossy(payload).into_owned(),
    };

    let text = std::str::from_utf8(payload).map_err(|_| not_a_number())?;
    text.trim()
        .parse::<f64>()
        .ok()
        .filter(|v| v.is_finite())
        .ok_or_else(not_a_number)
}

#[async_trait::async_trait]
impl Ingestor for SubscribeIngestor {
    async fn ready(&mut self) -> Result<(), IngestError> {
        if self.inbox.is_none() {
            let message = self.messages.recv().await.ok_or(IngestError::ChannelClosed)?;
            self.inbox = Some(message);
        }
        Ok(())
    }

    async fn next_cycle(&mut self) -> Result<Vec<Reading>, IngestError> {
        let message = match self.inbox.take() {
            Some(message) => message,
            None => self.messages.recv().await.ok_or(IngestError::ChannelClosed)?,
        };
        Ok(self.handle(&message)?)
    }

    fn name(&self) -> &str {
        "subscribe"
    }
}

#[cfg(feature = "mqtt")]
pub use transport::MqttTransport;

#[cfg(feature = "mqtt")]
mod transport {
    use std::time::Duration;

    use homelog_core::constants::MQTT_KEEP_ALIVE_SECS;
    use homelog_core::MeasurementType;
    use log::{info, warn};
    use rumqttc::{AsyncClient, Event, EventLoop, MqttOptions, Packet, QoS};
    use tokio::sync::mpsc;
    use tokio::task::JoinHandle;
    use tokio_util::sync::CancellationToken;

    use super::TopicMessage;

    const RECONNECT_DELAY: Duration = Duration::from_secs(5);
    const REQUEST_CAPACITY: usize = 16;

    /// Broker connection forwarding publishes to a channel
    pub struct MqttTransport {
        client: AsyncClient,
        eventloop: EventLoop,
        topics: Vec<String>,
    }

    impl MqttTransport {
        /// Connection to `host:port` subscribing `<channel>/<Type>` for every pair
        pub fn new(
            client_id: &str,
            host: &str,
            port: u16,
            channels: &[String],
            types: &[MeasurementType],
        ) -> Self {
            let mut options = MqttOptions::new(client_id, host, port);
            options.set_keep_alive(Duration::from_secs(MQTT_KEEP_ALIVE_SECS));
            let (client, eventloop) = AsyncClient::new(options, REQUEST_CAPACITY);

            let topics = channels
                .iter()
                .flat_map(|channel| {
                    types
                        .iter()
                        .map(move |t| format!("{}/{}", channel, t.topic_name()))
                })
                .collect();

            Self {
                client,
                eventloop,
                topics,
            }
        }

        /// Topics subscribed on every (re)connect
        pub fn topics(&self) -> &[String] {
            &self.topics
        }

        /// Drive the connection until cancelled or the receiver is dropped
        pub fn spawn(
            mut self,
            tx: mpsc::Sender<TopicMessage>,
            cancel: CancellationToken,
        ) -> JoinHandle<()> {
            tokio::spawn(async move {
                loop {
                    let event = tokio::select! {
                        _ = cancel.cancelled() => break,
                        event = self.eventloop.poll() => event,
                    };

                    match event {
                        Ok(Event::Incoming(Packet::ConnAck(_))) => self.subscribe_all(),
                        Ok(Event::Incoming(Packet::Publish(publish))) => {
                            let message = TopicMessage::new(publish.topic, publish.payload.to_vec());
                            if tx.send(message).await.is_err() {
                                break;
                            }
                        }
                        Ok(_) => {}
                        Err(e) => {
                            warn!("broker connection error: {}; retrying in {:?}", e, RECONNECT_DELAY);
                            tokio::select! {
                                _ = cancel.cancelled() => break,
                                _ = tokio::time::sleep(RECONNECT_DELAY) => {}
                            }
                        }
                    }
                }

                if let Err(e) = self.client.try_disconnect() {
                    warn!("disconnect failed: {}", e);
                }
                info!("broker connection closed");
            })
        }

        fn subscribe_all(&self) {
            for topic in &self.topics {
                match self.client.try_subscribe(topic.as_str(), QoS::AtLeastOnce) {
                    Ok(()) => info!("subscribed to {}", topic),
                    Err(e) => warn!("subscribe to {} failed: {}", topic, e),
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use homelog_core::FixedClock;

    fn ingestor(channels: &[&str]) -> (mpsc::Sender<TopicMessage>, SubscribeIngestor) {
        let (tx, rx) = mpsc::channel(8);
        let clock = FixedClock::new(Utc.with_ymd_and_hms(2024, 3, 1, 8, 0, 0).unwrap());
        let ingestor = SubscribeIngestor::new(
            rx,
            channels.iter().map(|c| c.to_string()).collect(),
            vec![MeasurementType::Temperature, MeasurementType::Humidity],
            Arc::new(clock),
        );
        (tx, ingestor)
    }

    #[test]
    fn partial_sample_waits_for_expected_types() {
        let (_tx, mut ing) = ingestor(&["home/x"]);

        let out = ing.handle(&TopicMessage::new("home/x/Temperature", "20")).unwrap();
        assert!(out.is_empty());
        assert_eq!(ing.pending("home/x").unwrap().get(MeasurementType::Temperature), Some(20.0));

        let out = ing.handle(&TopicMessage::new("home/x/Humidity", "50")).unwrap();
        assert_eq!(out.len(), 2);
        assert!(ing.pending("home/x").unwrap().is_empty());
    }

    #[test]
    fn repeated_type_overwrites() {
        let (_tx, mut ing) = ingestor(&["x"]);
        ing.handle(&TopicMessage::new("x/Temperature", "20")).unwrap();
        ing.handle(&TopicMessage::new("x/Temperature", "21")).unwrap();
        let out = ing.handle(&TopicMessage::new("x/Humidity", "50")).unwrap();
        assert_eq!(out[0].value, 21.0);
    }

    #[test]
    fn devices_accumulate_independently() {
        let (_tx, mut ing) = ingestor(&["kitchen", "attic"]);
        ing.handle(&TopicMessage::new("kitchen/Temperature", "20")).unwrap();
        let out = ing.handle(&TopicMessage::new("attic/Humidity", "60")).unwrap();
        assert!(out.is_empty());

        let out = ing.handle(&TopicMessage::new("kitchen/Humidity", "50")).unwrap();
        assert!(out.iter().all(|r| r.device == "kitchen"));
        assert_eq!(ing.pending("attic").unwrap().get(MeasurementType::Humidity), Some(60.0));
    }

    #[test]
    fn non_numeric_payload_is_discarded() {
        let (_tx, mut ing) = ingestor(&["x"]);
        let err = ing.handle(&TopicMessage::new("x/Temperature", "warm")).unwrap_err();
        assert!(matches!(err, ParseError::NotANumber { .. }));
        assert!(ing.pending("x").is_none());

        let err = ing.handle(&TopicMessage::new("x/Humidity", vec![0xff, 0xfe])).unwrap_err();
        assert!(matches!(err, ParseError::NotANumber { .. }));
    }

    #[test]
    fn unknown_topics_rejected() {
        let (_tx, mut ing) = ingestor(&["x"]);
        assert_eq!(
            ing.handle(&TopicMessage::new("y/Temperature", "1")),
            Err(ParseError::UnexpectedTopic("y/Temperature".into()))
        );
        assert!(matches!(
            ing.handle(&TopicMessage::new("x/Radiation", "1")),
            Err(ParseError::UnknownMeasurement(_))
        ));
    }

    #[test]
    fn types_outside_expected_are_not_held() {
        let (_tx, mut ing) = ingestor(&["x"]);
        assert_eq!(
            ing.handle(&TopicMessage::new("x/Pressure", "1002")),
            Err(ParseError::UnexpectedTopic("x/Pressure".into()))
        );
        assert!(ing.pending("x").is_none());

        ing.handle(&TopicMessage::new("x/Temperature", "20")).unwrap();
        let out = ing.handle(&TopicMessage::new("x/Humidity", "50")).unwrap();
        let types: Vec<_> = out.iter().map(|r| r.measurement).collect();
        assert_eq!(types, vec![MeasurementType::Temperature, MeasurementType::Humidity]);
    }

    #[tokio::test]
    async fn closed_channel_is_fatal() {
        let (tx, mut ing) = ingestor(&["x"]);
        drop(tx);
        let err = ing.next_cycle().await.unwrap_err();
        assert!(err.is_fatal());
    }

    #[cfg(feature = "mqtt")]
    #[test]
    fn transport_topics_cover_channels_and_types() {
        let transport = MqttTransport::new(
            "homelog-test",
            "localhost",
            1883,
            &["home/a".to_string(), "home/b".to_string()],
            &[MeasurementType::Temperature, MeasurementType::Humidity],
        );
        assert_eq!(
            transport.topics(),
            &[
                "home/a/Temperature",
                "home/a/Humidity",
                "home/b/Temperature",
                "home/b/Humidity"
            ]
        );
    }
}
