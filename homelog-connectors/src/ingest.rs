//! Ingestion Loop
//!
//! Drives one [`Ingestor`] against one store until cancelled:
//!
//! ```text
//! loop
//!   select cancel        → stop
//!          ready()       → due
//!   next_cycle()         → readings
//!   append_all(readings)
//! ```
//!
//! Cancellation is only observed while waiting for the next unit of work; a
//! cycle that has started always runs through its write.
//!
//! Recovered errors are logged with their device and counted in
//! [`IngestStats`]; fatal ones end the loop and are returned to the caller.
//! A storage failure drops the whole cycle, never part of it.

use homelog_core::ReadingStore;
use log::{error, info, warn};
use tokio_util::sync::CancellationToken;

use crate::{IngestError, Ingestor};

/// Counters for one run of the ingestion loop
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct IngestStats {
    /// Units of work completed, successful or not
    pub cycles: u64,
    /// Rows appended to the store
    pub readings_written: u64,
    /// Cycles lost to unreachable sensors or brokers
    pub transport_errors: u64,
    /// Payloads rejected
    pub parse_errors: u64,
    /// Cycles dropped by the store
    pub storage_errors: u64,
}

impl IngestStats {
    /// Recovered errors of any class
    pub fn errors(&self) -> u64 {
        self.transport_errors + self.parse_errors + self.storage_errors
    }
}

/// Run `ingestor` into `store` until `cancel` fires or a fatal error occurs
pub async fn run<I, S>(
    mut ingestor: I,
    store: &S,
    cancel: CancellationToken,
) -> Result<IngestStats, IngestError>
where
    I: Ingestor,
    S: ReadingStore + ?Sized,
{
    let mut stats = IngestStats::default();
    info!("{} ingestion started", ingestor.name());

    loop {
        let due = tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            due = ingestor.ready() => due,
        };
        let cycle = match due {
            Ok(()) => ingestor.next_cycle().await,
            Err(e) => Err(e),
        };
        stats.cycles += 1;

        let readings = match cycle {
            Ok(readings) => readings,
            Err(e) if e.is_fatal() => {
                error!("{} ingestion stopped: {}", ingestor.name(), e);
                return Err(e);
            }
            Err(IngestError::Transport(e)) => {
                stats.transport_errors += 1;
                warn!("{} cycle skipped: {}", ingestor.name(), e);
                continue;
            }
            Err(e) => {
                stats.parse_errors += 1;
                warn!("{} payload discarded: {}", ingestor.name(), e);
                continue;
            }
        };

        match store.append_all(&readings) {
            Ok(()) => stats.readings_written += readings.len() as u64,
            Err(e) => {
                stats.storage_errors += 1;
                error!(
                    "{} cycle dropped, {} readings not stored: {}",
                    ingestor.name(),
                    readings.len(),
                    e
                );
            }
        }
    }

    info!(
        "{} ingestion stopped after {} cycles: {} readings written, {} errors",
        ingestor.name(),
        stats.cycles,
        stats.readings_written,
        stats.errors()
    );
    Ok(stats)
}
