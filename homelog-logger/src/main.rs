//! homelog logger process
//!
//! Reads its settings from the environment (and a `.env` file when present),
//! opens the store, and ingests readings until interrupted.
//!
//! ```text
//! DATABASE_LOCATION=/var/lib/homelog PROTOCOL_TYPE=HTTP SENSOR_ADDRESS=192.168.1.40 homelog-logger
//! ```
//!
//! Exits non-zero on configuration errors, when the store cannot be created,
//! or when scheduling breaks. Sensor and broker outages are logged and ridden
//! out.

use std::process::ExitCode;
use std::sync::Arc;

use anyhow::Context;
use homelog_connectors::http::{PollIngestor, UreqFetch};
use homelog_connectors::mqtt::{MqttTransport, SubscribeIngestor};
use homelog_connectors::{ingest, IngestStats};
use homelog_core::config::{IngestSettings, LoggerSettings, PollSettings, SubscribeSettings};
use homelog_core::{Clock, JsonLinesStore, ReadingStore, SystemClock};
use log::{error, info, warn};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

const CLIENT_ID: &str = "homelog-logger";
const MESSAGE_BUFFER: usize = 64;

#[tokio::main]
async fn main() -> ExitCode {
    dotenvy::dotenv().ok();
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    match run().await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{:#}", e);
            ExitCode::FAILURE
        }
    }
}

async fn run() -> anyhow::Result<()> {
    let settings = LoggerSettings::from_env().context("invalid configuration")?;
    info!(
        "starting homelog-logger {} ({:?} mode)",
        env!("CARGO_PKG_VERSION"),
        settings.ingest.protocol()
    );

    let store = JsonLinesStore::open(&settings.database_location)
        .context("reading store unavailable")?;
    info!("recording to {}", store.root().display());

    let cancel = CancellationToken::new();
    tokio::spawn(shutdown_on_ctrl_c(cancel.clone()));

    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    let stats = match settings.ingest {
        IngestSettings::Poll(poll) => run_poll(poll, &store, clock, cancel).await?,
        IngestSettings::Subscribe(sub) => run_subscribe(sub, &store, clock, cancel).await?,
    };

    info!(
        "shutdown complete: {} readings written, {} recovered errors",
        stats.readings_written,
        stats.errors()
    );
    Ok(())
}

async fn run_poll(
    settings: PollSettings,
    store: &JsonLinesStore,
    clock: Arc<dyn Clock>,
    cancel: CancellationToken,
) -> anyhow::Result<IngestStats> {
    let url = settings.sensor_url();
    info!(
        "polling {} every {} minutes as {}",
        url,
        settings.aligner.period_minutes(),
        settings.device_name
    );

    let catalog = store.list_types().context("unable to read measurement catalog")?;
    let fetch = UreqFetch::new(url, settings.request_timeout);
    let ingestor = PollIngestor::new(fetch, settings.device_name, settings.aligner, clock)
        .with_catalog(catalog);
    ingest::run(ingestor, store, cancel)
        .await
        .context("poll ingestion failed")
}

async fn run_subscribe(
    settings: SubscribeSettings,
    store: &JsonLinesStore,
    clock: Arc<dyn Clock>,
    cancel: CancellationToken,
) -> anyhow::Result<IngestStats> {
    info!(
        "subscribing to {} channel(s) on {}:{}",
        settings.channels.len(),
        settings.broker_host,
        settings.broker_port
    );

    let catalog = store.list_types().context("unable to read measurement catalog")?;
    if let Some(missing) = settings.expected.iter().find(|m| !catalog.contains(**m)) {
        warn!("{} is expected but not in the store catalog; samples will not complete", missing);
    }

    let (tx, rx) = mpsc::channel(MESSAGE_BUFFER);
    let transport = MqttTransport::new(
        CLIENT_ID,
        &settings.broker_host,
        settings.broker_port,
        &settings.channels,
        &settings.expected,
    )
    .spawn(tx, cancel.clone());

    let ingestor = SubscribeIngestor::new(rx, settings.channels, settings.expected, clock)
        .with_catalog(catalog);
    let result = ingest::run(ingestor, store, cancel.clone()).await;

    cancel.cancel();
    if let Err(e) = transport.await {
        error!("broker task failed: {}", e);
    }
    result.context("subscribe ingestion failed")
}

async fn shutdown_on_ctrl_c(cancel: CancellationToken) {
    match tokio::signal::ctrl_c().await {
        Ok(()) => {
            info!("interrupt received, shutting down");
            cancel.cancel();
        }
        Err(e) => error!("unable to listen for interrupt: {}", e),
    }
}
