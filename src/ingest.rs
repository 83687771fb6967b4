//! Ingestion of authoritative JSON-lines dumps
//!
//! Each input line is one JSON object describing a network and its location.
//! Files are decoded on worker threads and handed over in batches through
//! bounded channels; the calling thread is the only one that touches the trie.
//! Batches are consumed file by file in input order, so later files override
//! earlier ones exactly as a sequential run would.

use crate::data_section::DataValue;
use crate::error::{IngestError, InsertError};
use crate::file_reader;
use crate::network::Network;
use crossbeam_channel::{bounded, unbounded, Sender};
use serde::{Deserialize, Deserializer};
use std::collections::BTreeMap;
use std::io::{self, BufRead};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;

/// Records per batch sent to the writer
const BATCH_SIZE: usize = 4096;

/// Batches buffered per file before a worker blocks
const BATCH_QUEUE_DEPTH: usize = 16;

/// Records between progress log lines
const PROGRESS_INTERVAL: u64 = 1_000_000;

/// What to do with lines that cannot be used
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MalformedPolicy {
    /// Stop the whole build at the first bad line
    #[default]
    Abort,
    /// Log a warning and continue
    Skip,
}

/// Per-file counters
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IngestStats {
    /// Input file
    pub path: PathBuf,
    /// Lines read
    pub lines_total: u64,
    /// Empty lines ignored
    pub skipped_empty: u64,
    /// Lines that failed to decode (skip policy only)
    pub skipped_malformed: u64,
    /// Records the trie refused (skip policy only)
    pub skipped_rejected: u64,
    /// Lines decoded as JSON records
    pub unmarshalled: u64,
    /// Records inserted
    pub written: u64,
}

impl IngestStats {
    fn new(path: &Path) -> Self {
        Self {
            path: path.to_path_buf(),
            ..Self::default()
        }
    }

    fn log_summary(&self) {
        log::info!("Finished {}", self.path.display());
        log::info!("JSON lines in file: {}", self.lines_total);
        log::info!("JSON lines skipped because empty: {}", self.skipped_empty);
        if self.skipped_malformed > 0 {
            log::info!("JSON lines skipped because malformed: {}", self.skipped_malformed);
        }
        if self.skipped_rejected > 0 {
            log::info!("Networks rejected by the tree: {}", self.skipped_rejected);
        }
        log::info!("JSON lines unmarshalled: {}", self.unmarshalled);
        log::info!("Records written: {}", self.written);
    }
}

fn nullable<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Option::<T>::deserialize(deserializer).map(Option::unwrap_or_default)
}

/// One line of the authoritative dataset
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct AuthoritativeRecord {
    /// Address family of `network` (4 or 6)
    #[serde(deserialize_with = "nullable")]
    pub protocol: u8,
    /// Network in CIDR notation
    #[serde(deserialize_with = "nullable")]
    pub network: String,
    /// Where the network is
    #[serde(deserialize_with = "nullable")]
    pub location: Location,
}

/// Location block of a record
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct Location {
    /// Continent
    #[serde(deserialize_with = "nullable")]
    pub continent: Continent,
    /// Country
    #[serde(deserialize_with = "nullable")]
    pub country: Country,
    /// First-level subdivision, if known
    #[serde(deserialize_with = "nullable")]
    pub subdivision: Subdivision,
    /// Latitude in degrees
    #[serde(deserialize_with = "nullable")]
    pub latitude: Estimate,
    /// Longitude in degrees
    #[serde(deserialize_with = "nullable")]
    pub longitude: Estimate,
    /// Accuracy radius in kilometers
    #[serde(deserialize_with = "nullable")]
    pub accuracy_radius: Estimate,
    /// IANA time zone name
    #[serde(deserialize_with = "nullable")]
    pub time_zone: String,
}

/// Continent code and name
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
#[allow(missing_docs)]
pub struct Continent {
    #[serde(deserialize_with = "nullable")]
    pub code: String,
    #[serde(deserialize_with = "nullable")]
    pub name: String,
}

/// Country code and name
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct Country {
    /// ISO 3166-1 alpha-2 code
    #[serde(rename = "alpha_2", deserialize_with = "nullable")]
    pub iso_code: String,
    /// English name
    #[serde(deserialize_with = "nullable")]
    pub name: String,
}

/// Subdivision code, name and kind
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct Subdivision {
    /// ISO 3166-2 code
    #[serde(deserialize_with = "nullable")]
    pub code: String,
    /// English name
    #[serde(deserialize_with = "nullable")]
    pub name: String,
    /// Kind of subdivision (state, province, ...)
    #[serde(deserialize_with = "nullable")]
    pub category: String,
}

/// Averaged measurement
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct Estimate {
    /// Mean value
    #[serde(deserialize_with = "nullable")]
    pub average: f32,
    /// Standard deviation
    #[serde(rename = "stddev", deserialize_with = "nullable")]
    pub std_dev: f32,
}

impl AuthoritativeRecord {
    /// Parse the `network` field
    pub fn network(&self) -> Result<Network, InsertError> {
        self.network.parse()
    }

    /// Build the database record
    ///
    /// ```text
    /// {continent: {code, name}, country: {iso_code, name},
    ///  location: {latitude, longitude, accuracy_radius, time_zone},
    ///  subdivisions: [{iso_code, name, category}]}
    /// ```
    ///
    /// `subdivisions` is present only when the input names one.
    pub fn to_data_value(&self) -> DataValue {
        let location = &self.location;
        let mut record = BTreeMap::new();

        record.insert(
            "continent".to_string(),
            DataValue::from_iter([
                ("code", location.continent.code.as_str()),
                ("name", location.continent.name.as_str()),
            ]),
        );
        record.insert(
            "country".to_string(),
            DataValue::from_iter([
                ("iso_code", location.country.iso_code.as_str()),
                ("name", location.country.name.as_str()),
            ]),
        );
        record.insert(
            "location".to_string(),
            DataValue::from_iter([
                ("latitude", DataValue::Float(location.latitude.average)),
                ("longitude", DataValue::Float(location.longitude.average)),
                (
                    "accuracy_radius",
                    DataValue::Float(location.accuracy_radius.average),
                ),
                ("time_zone", DataValue::from(location.time_zone.as_str())),
            ]),
        );
        if !location.subdivision.code.is_empty() {
            let subdivision = DataValue::from_iter([
                ("iso_code", location.subdivision.code.as_str()),
                ("name", location.subdivision.name.as_str()),
                ("category", location.subdivision.category.as_str()),
            ]);
            record.insert(
                "subdivisions".to_string(),
                DataValue::Array(vec![subdivision]),
            );
        }

        DataValue::Map(record)
    }
}

fn is_blank(line: &[u8]) -> bool {
    line.iter().all(u8::is_ascii_whitespace)
}

fn decode_record(line: &[u8], line_no: u64) -> Result<AuthoritativeRecord, IngestError> {
    serde_json::from_slice(line).map_err(|e| IngestError::Json {
        line: line_no,
        message: e.to_string(),
    })
}

/// Parse one input line
///
/// Blank lines yield `Ok(None)`. `line_no` is only used in errors.
pub fn parse_line(line: &[u8], line_no: u64) -> Result<Option<(Network, DataValue)>, IngestError> {
    if is_blank(line) {
        return Ok(None);
    }
    let record = decode_record(line, line_no)?;
    let network = record.network().map_err(|source| IngestError::Network {
        line: line_no,
        source,
    })?;
    Ok(Some((network, record.to_data_value())))
}

/// Expand directories to the `*.gz` files they contain, in name order
///
/// Other paths are passed through unchanged.
pub fn expand_inputs<P: AsRef<Path>>(inputs: &[P]) -> io::Result<Vec<PathBuf>> {
    let mut expanded = Vec::new();
    for input in inputs {
        let input = input.as_ref();
        if input.is_dir() {
            let mut files: Vec<PathBuf> = std::fs::read_dir(input)?
                .filter_map(|entry| entry.ok().map(|e| e.path()))
                .filter(|path| {
                    path.is_file()
                        && path
                            .extension()
                            .and_then(|ext| ext.to_str())
                            .is_some_and(|ext| ext.eq_ignore_ascii_case("gz"))
                })
                .collect();
            files.sort();
            expanded.extend(files);
        } else {
            expanded.push(input.to_path_buf());
        }
    }
    Ok(expanded)
}

struct ParsedLine {
    line: u64,
    network: Network,
    record: DataValue,
}

enum Message {
    Batch(Vec<ParsedLine>),
    Failed(IngestError),
    Done(IngestStats),
}

/// Decode `paths` on up to `workers` threads and feed every record to `sink`
///
/// `sink` runs on the calling thread, in input order. Returns the counters
/// of each file, in input order.
pub fn ingest_files<P, F>(
    paths: &[P],
    workers: usize,
    policy: MalformedPolicy,
    mut sink: F,
) -> Result<Vec<IngestStats>, IngestError>
where
    P: AsRef<Path> + Sync,
    F: FnMut(Network, DataValue) -> Result<(), InsertError>,
{
    let workers = workers.clamp(1, paths.len().max(1));
    let cancelled = AtomicBool::new(false);

    let (job_tx, job_rx) = unbounded::<(usize, Sender<Message>)>();
    let mut receivers = Vec::with_capacity(paths.len());
    for index in 0..paths.len() {
        let (tx, rx) = bounded(BATCH_QUEUE_DEPTH);
        if job_tx.send((index, tx)).is_err() {
            break;
        }
        receivers.push(rx);
    }
    drop(job_tx);

    thread::scope(|scope| {
        for _ in 0..workers {
            let job_rx = job_rx.clone();
            let cancelled = &cancelled;
            scope.spawn(move || {
                for (index, tx) in job_rx.iter() {
                    if cancelled.load(Ordering::Relaxed) {
                        break;
                    }
                    read_file(paths[index].as_ref(), policy, &tx, cancelled);
                }
            });
        }

        let mut all_stats = Vec::with_capacity(paths.len());
        let mut written_total = 0u64;

        for (index, rx) in receivers.into_iter().enumerate() {
            let path = paths[index].as_ref();
            log::info!("On file {}", path.display());
            let mut stats = IngestStats::new(path);
            let mut written = 0u64;
            let mut rejected = 0u64;

            for message in rx.iter() {
                match message {
                    Message::Batch(lines) => {
                        for parsed in lines {
                            match sink(parsed.network, parsed.record) {
                                Ok(()) => {
                                    written += 1;
                                    written_total += 1;
                                    if written_total % PROGRESS_INTERVAL == 0 {
                                        log::info!("Currently processed {} records", written_total);
                                    }
                                }
                                Err(source) if policy == MalformedPolicy::Skip => {
                                    log::warn!(
                                        "{}:{}: skipping {}: {}",
                                        path.display(),
                                        parsed.line,
                                        parsed.network,
                                        source
                                    );
                                    rejected += 1;
                                }
                                Err(source) => {
                                    cancelled.store(true, Ordering::Relaxed);
                                    return Err(IngestError::Input {
                                        path: path.to_path_buf(),
                                        source: Box::new(IngestError::Network {
                                            line: parsed.line,
                                            source,
                                        }),
                                    });
                                }
                            }
                        }
                    }
                    Message::Failed(err) => {
                        cancelled.store(true, Ordering::Relaxed);
                        return Err(IngestError::Input {
                            path: path.to_path_buf(),
                            source: Box::new(err),
                        });
                    }
                    Message::Done(file_stats) => stats = file_stats,
                }
            }

            stats.written = written;
            stats.skipped_rejected = rejected;
            stats.log_summary();
            all_stats.push(stats);
        }

        Ok(all_stats)
    })
}

/// Worker side: decode one file into batches
fn read_file(path: &Path, policy: MalformedPolicy, tx: &Sender<Message>, cancelled: &AtomicBool) {
    let mut stats = IngestStats::new(path);
    let outcome = decode_file(path, policy, tx, cancelled, &mut stats);
    let last = match outcome {
        Ok(()) => Message::Done(stats),
        Err(err) => Message::Failed(err),
    };
    // The writer may already have stopped listening
    let _ = tx.send(last);
}

fn decode_file(
    path: &Path,
    policy: MalformedPolicy,
    tx: &Sender<Message>,
    cancelled: &AtomicBool,
    stats: &mut IngestStats,
) -> Result<(), IngestError> {
    let mut reader = file_reader::open(path)?;
    let mut buf = Vec::new();
    let mut batch = Vec::with_capacity(BATCH_SIZE);

    loop {
        buf.clear();
        if reader.read_until(b'\n', &mut buf)? == 0 {
            break;
        }
        stats.lines_total += 1;
        let line_no = stats.lines_total;

        let line = buf.strip_suffix(b"\n").unwrap_or(&buf[..]);
        let line = line.strip_suffix(b"\r").unwrap_or(line);
        if is_blank(line) {
            log::warn!("Skipping empty line {} in {}", line_no, path.display());
            stats.skipped_empty += 1;
            continue;
        }

        let decoded = decode_record(line, line_no).and_then(|record| {
            stats.unmarshalled += 1;
            record
                .network()
                .map(|network| (network, record.to_data_value()))
                .map_err(|source| IngestError::Network {
                    line: line_no,
                    source,
                })
        });

        match decoded {
            Ok((network, record)) => batch.push(ParsedLine {
                line: line_no,
                network,
                record,
            }),
            Err(err) if policy == MalformedPolicy::Skip => {
                log::warn!("{}: {}", path.display(), err);
                stats.skipped_malformed += 1;
            }
            Err(err) => return Err(err),
        }

        if batch.len() >= BATCH_SIZE {
            if cancelled.load(Ordering::Relaxed) {
                return Ok(());
            }
            let full = std::mem::replace(&mut batch, Vec::with_capacity(BATCH_SIZE));
            if tx.send(Message::Batch(full)).is_err() {
                return Ok(());
            }
        }
    }

    if !batch.is_empty() {
        let _ = tx.send(Message::Batch(batch));
    }
    Ok(())
}
