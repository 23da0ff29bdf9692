//! Parallel carving driver.
//!
//! Matchers are compiled once per run. Each file is mapped read-only and
//! every (table, scenario) pair makes one pass over it; within a pass the
//! buffer is split into start-offset chunks that worker threads claim from a
//! shared counter. Workers decode independently and hand record batches to a
//! bounded channel drained by a single writer.

use crate::cancel::CancellationToken;
use crate::db_header::{DatabaseHeader, TextEncoding};
use crate::error::{CarveError, Result};
use crate::filter::accept;
use crate::header::decode;
use crate::pattern::{CompiledMatcher, PatternBuilder};
use crate::payload::decode_payload;
use crate::record::RecoveredRecord;
use crate::scanner::{scan_range, CandidateMatch};
use crate::scenario::Scenario;
use memmap2::Mmap;
use serde::Serialize;
use sqlcarve_schema::TableSpec;
use std::fs::File;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::mpsc::{self, SyncSender};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, debug_span, info, trace, warn};

/// Start offsets claimed by a worker at a time.
pub const CHUNK_SIZE: usize = 256 * 1024;

/// Record batches in flight between workers and the writer.
pub const CHANNEL_DEPTH: usize = 16;

/// A recovered record with the table it was carved for.
#[derive(Debug, Clone)]
pub struct CarvedRecord {
    pub table: Arc<TableSpec>,
    pub record: RecoveredRecord,
}

pub type RecordBatch = Vec<CarvedRecord>;

/// Carving options.
#[derive(Debug, Clone)]
pub struct CarveOptions {
    /// Worker threads per pass (0 = available parallelism).
    pub threads: usize,
    pub scenarios: Vec<Scenario>,
    /// Restrict intact-cell matching to payloads containing this text.
    pub keyword: Option<String>,
}

impl Default for CarveOptions {
    fn default() -> Self {
        Self {
            threads: 0,
            scenarios: Scenario::ALL.to_vec(),
            keyword: None,
        }
    }
}

/// Counters for one or more carving passes.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CarveStats {
    pub bytes: u64,
    pub passes: u64,
    pub candidates: u64,
    pub accepted: u64,
    pub truncated: u64,
    pub reserved_type: u64,
    pub inconsistent: u64,
    pub column_count_mismatch: u64,
    /// Accepted records per scenario index.
    pub per_scenario: [u64; 6],
    pub cancelled: bool,
}

impl CarveStats {
    pub fn merge(&mut self, other: &CarveStats) {
        self.bytes += other.bytes;
        self.passes += other.passes;
        self.candidates += other.candidates;
        self.accepted += other.accepted;
        self.truncated += other.truncated;
        self.reserved_type += other.reserved_type;
        self.inconsistent += other.inconsistent;
        self.column_count_mismatch += other.column_count_mismatch;
        for (mine, theirs) in self.per_scenario.iter_mut().zip(other.per_scenario) {
            *mine += theirs;
        }
        self.cancelled |= other.cancelled;
    }

    /// Candidates that did not produce a record.
    pub fn rejected(&self) -> u64 {
        self.candidates - self.accepted
    }

    fn record_rejection(&mut self, err: &CarveError) {
        match err {
            CarveError::TruncatedInput | CarveError::TruncatedHeader { .. } => self.truncated += 1,
            CarveError::ReservedSerialType(_) => self.reserved_type += 1,
            CarveError::ColumnCountMismatch { .. } => self.column_count_mismatch += 1,
            CarveError::InconsistentHeader(_) | CarveError::Io { .. } => self.inconsistent += 1,
        }
    }
}

/// Outcome of carving one input file.
#[derive(Debug, Clone, Serialize)]
pub struct FileReport {
    pub path: PathBuf,
    pub size: u64,
    /// Hex BLAKE3 digest of the file contents as carved.
    pub blake3: String,
    pub header: Option<DatabaseHeader>,
    pub stats: CarveStats,
}

/// Compiled matchers plus run options.
pub struct Carver {
    matchers: Vec<CompiledMatcher>,
    threads: usize,
    cancel: CancellationToken,
}

impl Carver {
    /// Compile matchers for every table and requested scenario.
    pub fn new(tables: Vec<TableSpec>, options: &CarveOptions) -> Self {
        let tables: Vec<Arc<TableSpec>> = tables.into_iter().map(Arc::new).collect();
        let mut builder = PatternBuilder::new();
        if let Some(keyword) = &options.keyword {
            builder = builder.with_keyword(keyword);
        }
        let matchers = builder.build_all(&tables, &options.scenarios);
        let threads = match options.threads {
            0 => std::thread::available_parallelism()
                .map(|n| n.get())
                .unwrap_or(1),
            n => n,
        };
        debug!(
            tables = tables.len(),
            matchers = matchers.len(),
            threads,
            "Compiled matchers"
        );
        Self {
            matchers,
            threads,
            cancel: CancellationToken::new(),
        }
    }

    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn matchers(&self) -> &[CompiledMatcher] {
        &self.matchers
    }

    pub fn threads(&self) -> usize {
        self.threads
    }

    /// Map and carve one file, sending record batches to `tx`.
    pub fn carve_file(&self, path: &Path, tx: &SyncSender<RecordBatch>) -> Result<FileReport> {
        let io_err = |source| CarveError::Io {
            path: path.to_path_buf(),
            source,
        };
        let file = File::open(path).map_err(io_err)?;
        let size = file.metadata().map_err(io_err)?.len();
        let source: Arc<str> = Arc::from(path.display().to_string());

        if size == 0 {
            debug!(path = %path.display(), "Skipping empty file");
            return Ok(FileReport {
                path: path.to_path_buf(),
                size,
                blake3: blake3::hash(&[]).to_hex().to_string(),
                header: None,
                stats: CarveStats::default(),
            });
        }

        // SAFETY: the map is read-only; inputs are evidence copies nobody should be writing to.
        let map = unsafe { Mmap::map(&file).map_err(io_err)? };
        let digest = blake3::hash(&map).to_hex().to_string();
        let header = DatabaseHeader::parse(&map);
        if let Some(h) = &header {
            if h.text_encoding != TextEncoding::Utf8 {
                warn!(
                    path = %path.display(),
                    encoding = %h.text_encoding,
                    "Database is not UTF-8; text columns will decode poorly"
                );
            }
        }
        info!(path = %path.display(), size, blake3 = %digest, "Carving file");

        let stats = self.carve_buffer(&map, source, tx);
        Ok(FileReport {
            path: path.to_path_buf(),
            size,
            blake3: digest,
            header,
            stats,
        })
    }

    /// Carve an in-memory buffer, sending record batches to `tx`.
    pub fn carve_buffer(
        &self,
        buf: &[u8],
        source_file: Arc<str>,
        tx: &SyncSender<RecordBatch>,
    ) -> CarveStats {
        let start = Instant::now();
        let mut stats = CarveStats {
            bytes: buf.len() as u64,
            ..CarveStats::default()
        };

        for matcher in &self.matchers {
            if self.cancel.is_cancelled() {
                stats.cancelled = true;
                break;
            }
            let span = debug_span!(
                "scenario",
                table = %matcher.table_name(),
                scenario = matcher.scenario().index()
            );
            let _enter = span.enter();
            let pass = self.run_pass(matcher, buf, &source_file, tx);
            debug!(
                candidates = pass.candidates,
                accepted = pass.accepted,
                "Pass complete"
            );
            stats.merge(&pass);
            if pass.cancelled {
                break;
            }
        }

        info!(
            source = %source_file,
            candidates = stats.candidates,
            accepted = stats.accepted,
            rejected = stats.rejected(),
            cancelled = stats.cancelled,
            duration_ms = start.elapsed().as_millis() as u64,
            "Carve complete"
        );
        stats
    }

    /// Carve a buffer and collect every record, for callers without a writer.
    pub fn carve_to_vec(&self, buf: &[u8], source_file: &str) -> (Vec<CarvedRecord>, CarveStats) {
        let (tx, rx) = mpsc::sync_channel::<RecordBatch>(CHANNEL_DEPTH);
        std::thread::scope(|scope| {
            let collector = scope.spawn(move || rx.into_iter().flatten().collect::<Vec<_>>());
            let stats = self.carve_buffer(buf, Arc::from(source_file), &tx);
            drop(tx);
            let records = collector.join().unwrap_or_default();
            (records, stats)
        })
    }

    fn run_pass(
        &self,
        matcher: &CompiledMatcher,
        buf: &[u8],
        source_file: &Arc<str>,
        tx: &SyncSender<RecordBatch>,
    ) -> CarveStats {
        let chunks = buf.len().div_ceil(CHUNK_SIZE);
        let workers = self.threads.min(chunks).max(1);
        let next_chunk = AtomicUsize::new(0);

        let mut pass = CarveStats {
            passes: 1,
            ..CarveStats::default()
        };

        std::thread::scope(|scope| {
            let handles: Vec<_> = (0..workers)
                .map(|_| {
                    let tx = tx.clone();
                    let next_chunk = &next_chunk;
                    scope.spawn(move || {
                        let mut local = CarveStats::default();
                        loop {
                            if self.cancel.is_cancelled() {
                                local.cancelled = true;
                                break;
                            }
                            let chunk = next_chunk.fetch_add(1, Ordering::Relaxed);
                            if chunk >= chunks {
                                break;
                            }
                            let starts = chunk * CHUNK_SIZE..((chunk + 1) * CHUNK_SIZE).min(buf.len());
                            let batch = carve_range(matcher, buf, starts, source_file, &mut local);
                            if !batch.is_empty() && tx.send(batch).is_err() {
                                // Writer is gone; nothing left to deliver to.
                                local.cancelled = true;
                                break;
                            }
                        }
                        local
                    })
                })
                .collect();

            for handle in handles {
                match handle.join() {
                    Ok(local) => pass.merge(&local),
                    Err(_) => warn!(table = %matcher.table_name(), "Carving worker panicked"),
                }
            }
        });

        pass
    }
}

/// Scan and decode every candidate starting inside `starts`.
fn carve_range(
    matcher: &CompiledMatcher,
    buf: &[u8],
    starts: std::ops::Range<usize>,
    source_file: &Arc<str>,
    stats: &mut CarveStats,
) -> RecordBatch {
    let mut batch = Vec::new();
    for candidate in scan_range(matcher, buf, starts, Arc::clone(source_file)) {
        stats.candidates += 1;
        match carve_candidate(matcher, buf, &candidate) {
            Ok(record) => {
                stats.accepted += 1;
                stats.per_scenario[usize::from(candidate.scenario.index())] += 1;
                batch.push(CarvedRecord {
                    table: Arc::clone(matcher.table()),
                    record,
                });
            }
            Err(e) => {
                trace!(offset = candidate.start, error = %e, "Rejected candidate");
                stats.record_rejection(&e);
            }
        }
    }
    batch
}

/// Decode, check and materialize one candidate.
pub fn carve_candidate(
    matcher: &CompiledMatcher,
    buf: &[u8],
    candidate: &CandidateMatch,
) -> Result<RecoveredRecord> {
    let header = decode(buf, candidate.start, candidate.span(), candidate.scenario)?;
    let accepted = accept(header, matcher.table())?;
    Ok(decode_payload(buf, &accepted, matcher.table(), candidate))
}
