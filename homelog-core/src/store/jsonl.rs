//! JSON Lines reading store
//!
//! Layout of a store directory:
//!
//! ```text
//! <DATABASE_LOCATION>/
//! ├── RecordingType.jsonl   {"name":"temperature","unit":"celsius"}
//! └── Responses.jsonl       {"time":"2024-03-01T12:05:00Z","device":"kitchen","type":"temperature","value":21.5}
//! ```
//!
//! ## Visibility
//!
//! Appends are serialised through one mutex. All rows of one call are
//! encoded up front and handed to a single write followed by a flush, so a
//! batch rejected during encoding leaves the file untouched. Readers open the
//! file independently and only trust newline-terminated lines, so a reader
//! racing a writer sees every completed row and never a torn one.
//!
//! A tail left unterminated by a crash or a failed write is closed with a
//! newline before the next append. The fragment then reads as one malformed
//! line and the new rows start on a line of their own.
//!
//! ## Bootstrap
//!
//! If the directory or its catalog file is missing, [`JsonLinesStore::open`]
//! creates both files with the catalog pre-populated. Any failure while
//! opening is reported as [`StorageError::Bootstrap`]; callers treat it as
//! fatal.

use std::collections::BTreeSet;
use std::fs::{self, File, OpenOptions};
use std::io::{self, BufRead, BufReader, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use chrono::{DateTime, Utc};
use log::{debug, info, warn};

use super::{matches, ReadingStore};
use crate::catalog::{Catalog, CatalogEntry, MeasurementType};
use crate::constants::{CATALOG_FILE, RESPONSES_FILE};
use crate::errors::{StorageError, StoreResult};
use crate::reading::Reading;

/// Counters from the most recent full scan
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct ScanStats {
    /// Rows decoded
    pub rows_read: usize,
    /// Complete lines that failed to decode
    pub malformed_lines: usize,
    /// Trailing line without a newline (write in progress)
    pub partial_tail: bool,
}

/// File-backed append-only store
pub struct JsonLinesStore {
    root: PathBuf,
    catalog: Catalog,
    writer: Mutex<Tail>,
}

/// Write end of the responses file
struct Tail {
    file: File,
    /// Last byte on disk is not a newline
    torn: bool,
}

impl JsonLinesStore {
    /// Open the store at `root`, creating it on first use
    pub fn open(root: impl AsRef<Path>) -> StoreResult<Self> {
        let root = root.as_ref().to_path_buf();
        Self::open_inner(&root).map_err(|source| StorageError::Bootstrap {
            path: root.clone(),
            source: Box::new(source),
        })
    }

    fn open_inner(root: &Path) -> StoreResult<Self> {
        let catalog_path = root.join(CATALOG_FILE);
        if !catalog_path.is_file() {
            info!("creating store at {}", root.display());
            Self::create(root, &Catalog::default())?;
        }

        let catalog = Self::read_catalog(&catalog_path)?;
        let responses = root.join(RESPONSES_FILE);
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&responses)?;
        let torn = ends_unterminated(&responses)?;
        if torn {
            warn!("{} ends in an unterminated row", responses.display());
        }

        debug!(
            "opened store at {} with {} measurement types",
            root.display(),
            catalog.len()
        );

        Ok(Self {
            root: root.to_path_buf(),
            catalog,
            writer: Mutex::new(Tail { file, torn }),
        })
    }

    fn create(root: &Path, catalog: &Catalog) -> StoreResult<()> {
        fs::create_dir_all(root)?;

        let mut rows = String::new();
        for entry in catalog.entries() {
            rows.push_str(&serde_json::to_string(entry)?);
            rows.push('\n');
        }

        // Catalog goes in last so a half-created store is retried next open.
        OpenOptions::new()
            .create(true)
            .append(true)
            .open(root.join(RESPONSES_FILE))?;
        let mut file = File::create(root.join(CATALOG_FILE))?;
        file.write_all(rows.as_bytes())?;
        file.sync_all()?;
        Ok(())
    }

    fn read_catalog(path: &Path) -> StoreResult<Catalog> {
        let reader = BufReader::new(File::open(path)?);
        let mut entries = Vec::new();
        for line in reader.lines() {
            let line = line?;
            if line.trim().is_empty() {
                continue;
            }
            entries.push(serde_json::from_str::<CatalogEntry>(&line)?);
        }
        Ok(Catalog::from_entries(entries))
    }

    fn check_type(&self, reading: &Reading) -> StoreResult<()> {
        if self.catalog.contains(reading.measurement) {
            Ok(())
        } else {
            Err(StorageError::UnknownType(reading.measurement.name().to_string()))
        }
    }

    fn write_rows(&self, rows: &str) -> StoreResult<()> {
        let mut tail = self
            .writer
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());

        if tail.torn {
            write_flushed(&mut tail.file, b"\n")?;
            tail.torn = false;
        }

        let written = write_flushed(&mut tail.file, rows.as_bytes());
        if written.is_err() {
            tail.torn = true;
        }
        written.map_err(StorageError::from)
    }

    /// Store directory
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Visit every decodable row in file order
    pub fn scan(&self, mut visit: impl FnMut(Reading)) -> StoreResult<ScanStats> {
        let mut stats = ScanStats::default();
        let mut reader = BufReader::new(File::open(self.root.join(RESPONSES_FILE))?);
        let mut line = String::new();
        let mut line_no = 0usize;

        loop {
            line.clear();
            if reader.read_line(&mut line)? == 0 {
                break;
            }
            line_no += 1;

            if !line.ends_with('\n') {
                stats.partial_tail = true;
                break;
            }
            let row = line.trim();
            if row.is_empty() {
                continue;
            }

            match serde_json::from_str::<Reading>(row) {
                Ok(reading) => {
                    stats.rows_read += 1;
                    visit(reading);
                }
                Err(e) => {
                    stats.malformed_lines += 1;
                    warn!("skipping malformed row {} in {}: {}", line_no, RESPONSES_FILE, e);
                }
            }
        }

        Ok(stats)
    }
}

impl ReadingStore for JsonLinesStore {
    fn append(&self, reading: &Reading) -> StoreResult<()> {
        self.append_all(std::slice::from_ref(reading))
    }

    fn append_all(&self, readings: &[Reading]) -> StoreResult<()> {
        let mut rows = String::new();
        for reading in readings {
            self.check_type(reading)?;
            rows.push_str(&serde_json::to_string(reading)?);
            rows.push('\n');
        }

        if rows.is_empty() {
            return Ok(());
        }
        self.write_rows(&rows)
    }

    fn query_range(
        &self,
        device: &str,
        measurement: Option<MeasurementType>,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> StoreResult<Vec<Reading>> {
        let mut rows = Vec::new();
        self.scan(|reading| {
            if matches(&reading, device, measurement, from, to) {
                rows.push(reading);
            }
        })?;
        rows.sort_by_key(|r| r.time);
        Ok(rows)
    }

    fn list_devices(&self) -> StoreResult<BTreeSet<String>> {
        let mut devices = BTreeSet::new();
        self.scan(|reading| {
            devices.insert(reading.device);
        })?;
        Ok(devices)
    }

    fn list_types(&self) -> StoreResult<Catalog> {
        Ok(self.catalog.clone())
    }
}

fn write_flushed(file: &mut File, bytes: &[u8]) -> io::Result<()> {
    file.write_all(bytes)?;
    file.flush()
}

fn ends_unterminated(path: &Path) -> io::Result<bool> {
    let mut file = File::open(path)?;
    if file.metadata()?.len() == 0 {
        return Ok(false);
    }

    let mut last = [0u8; 1];
    file.seek(SeekFrom::End(-1))?;
    file.read_exact(&mut last)?;
    Ok(last[0] != b'\n')
}
