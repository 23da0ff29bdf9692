//! Output stores for recovered records.
//!
//! A [`RecordWriter`] owns one sink and drives it through
//! init, write, prepare and commit, rolling back when a commit fails.
//! Each recovered table becomes one output table (or CSV file) holding the
//! declared columns followed by [`PROVENANCE_COLUMNS`]. Carved input files
//! are listed in [`SOURCES_TABLE`].

use anyhow::Result;
use serde::Serialize;
use sqlcarve_engine::{CarvedRecord, FileReport};
use sqlcarve_schema::TableSpec;
use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, info, warn};

mod delimited;
mod sqlite;

pub use delimited::CsvSink;
pub use sqlite::SqliteSink;

/// Columns appended after the declared columns of every output table:
/// scenario label, match offset and source file.
pub const PROVENANCE_COLUMNS: [&str; 3] = ["_carve_scenario", "_carve_offset", "_carve_source"];

/// Output table (or CSV file stem) listing every carved input file.
pub const SOURCES_TABLE: &str = "_carve_sources";

/// Column names of [`SOURCES_TABLE`].
pub const SOURCES_COLUMNS: [&str; 4] = ["source_file", "blake3", "size", "records"];

/// Errors returned by output sinks.
#[derive(Debug, Error)]
pub enum SinkError {
    #[error("{message}")]
    Message { message: String },
    /// A single record could not be stored. The run continues.
    #[error("record for '{table}' rejected: {reason}")]
    Rejected { table: String, reason: String },
    #[error("{message}")]
    Source {
        message: String,
        #[source]
        source: anyhow::Error,
    },
}

pub type SinkResult<T> = std::result::Result<T, SinkError>;

impl SinkError {
    fn message(message: impl Into<String>) -> Self {
        SinkError::Message {
            message: message.into(),
        }
    }

    pub(crate) fn rejected(table: impl Into<String>, reason: impl Into<String>) -> Self {
        SinkError::Rejected {
            table: table.into(),
            reason: reason.into(),
        }
    }

    /// Returns true if only one record was lost.
    pub fn is_rejection(&self) -> bool {
        matches!(self, SinkError::Rejected { .. })
    }
}

impl From<anyhow::Error> for SinkError {
    fn from(err: anyhow::Error) -> Self {
        SinkError::Source {
            message: err.to_string(),
            source: err,
        }
    }
}

/// Where recovered records go.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OutputTarget {
    /// SQLite database file, created if missing. Existing tables are appended to.
    Sqlite(PathBuf),
    /// Directory receiving one CSV file per table.
    Csv(PathBuf),
}

impl OutputTarget {
    /// Parse `sqlite://<path>`, `csv://<dir>` or a bare path.
    ///
    /// A bare path naming an existing directory, or ending in a path
    /// separator, is a CSV directory. Anything else is a SQLite file.
    pub fn parse(uri: &str) -> SinkResult<Self> {
        let uri = uri.trim();
        if uri.is_empty() {
            return Err(SinkError::message("Output target is empty"));
        }
        if let Some(rest) = uri.strip_prefix("sqlite://") {
            return Ok(OutputTarget::Sqlite(PathBuf::from(rest)));
        }
        if let Some(rest) = uri.strip_prefix("csv://") {
            return Ok(OutputTarget::Csv(PathBuf::from(rest)));
        }
        if let Some((scheme, _)) = uri.split_once("://") {
            return Err(SinkError::message(format!(
                "Unsupported output scheme: '{}'",
                scheme
            )));
        }

        let path = PathBuf::from(uri);
        if uri.ends_with('/') || uri.ends_with(std::path::MAIN_SEPARATOR) || path.is_dir() {
            Ok(OutputTarget::Csv(path))
        } else {
            Ok(OutputTarget::Sqlite(path))
        }
    }

    pub fn path(&self) -> &Path {
        match self {
            OutputTarget::Sqlite(path) | OutputTarget::Csv(path) => path,
        }
    }
}

impl fmt::Display for OutputTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OutputTarget::Sqlite(path) => write!(f, "sqlite://{}", path.display()),
            OutputTarget::Csv(path) => write!(f, "csv://{}", path.display()),
        }
    }
}

/// Declared column names followed by the provenance columns.
pub(crate) fn output_columns(table: &TableSpec) -> Vec<String> {
    table
        .columns
        .iter()
        .map(|c| c.name.clone())
        .chain(PROVENANCE_COLUMNS.iter().map(|c| c.to_string()))
        .collect()
}

enum Sink {
    Sqlite(SqliteSink),
    Csv(Box<CsvSink>),
}

impl Sink {
    fn open(target: &OutputTarget) -> Result<Self> {
        match target {
            OutputTarget::Sqlite(path) => Ok(Sink::Sqlite(SqliteSink::new(path.clone())?)),
            OutputTarget::Csv(dir) => Ok(Sink::Csv(Box::new(CsvSink::new(dir.clone())?))),
        }
    }

    fn init(&mut self, tables: &[TableSpec]) -> Result<()> {
        match self {
            Sink::Sqlite(sink) => sink.init(tables),
            Sink::Csv(sink) => sink.init(tables),
        }
    }

    fn write_record(&mut self, record: &CarvedRecord) -> SinkResult<()> {
        match self {
            Sink::Sqlite(sink) => sink.write_record(record),
            Sink::Csv(sink) => sink.write_record(record),
        }
    }

    fn write_source(&mut self, report: &FileReport) -> Result<()> {
        match self {
            Sink::Sqlite(sink) => sink.write_source(report),
            Sink::Csv(sink) => sink.write_source(report),
        }
    }

    fn prepare(&mut self) -> Result<()> {
        match self {
            Sink::Sqlite(sink) => sink.prepare(),
            Sink::Csv(sink) => sink.prepare(),
        }
    }

    fn commit(&mut self) -> Result<()> {
        match self {
            Sink::Sqlite(sink) => sink.commit(),
            Sink::Csv(sink) => sink.commit(),
        }
    }

    fn rollback(&mut self) -> Result<()> {
        match self {
            Sink::Sqlite(sink) => sink.rollback(),
            Sink::Csv(sink) => sink.rollback(),
        }
    }
}

/// Counters for one output run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct WriteSummary {
    pub written: u64,
    pub rejected: u64,
    /// Records dropped because no value contained the keyword.
    pub filtered: u64,
    pub sources: u64,
    pub per_table: BTreeMap<String, u64>,
    /// Rejected records per table.
    pub rejected_per_table: BTreeMap<String, u64>,
}

/// Single writer for a carving run.
pub struct RecordWriter {
    target: OutputTarget,
    sink: Sink,
    keyword: Option<String>,
    summary: WriteSummary,
}

impl RecordWriter {
    /// Open the target and create one output table per recovered table.
    pub fn open(target: OutputTarget, tables: &[TableSpec]) -> SinkResult<Self> {
        info!("Opening output {} for {} tables", target, tables.len());
        let mut sink = Sink::open(&target)?;
        sink.init(tables)?;
        Ok(Self {
            target,
            sink,
            keyword: None,
            summary: WriteSummary::default(),
        })
    }

    /// Only store records with a rendered value containing `keyword`.
    pub fn with_keyword(mut self, keyword: Option<String>) -> Self {
        self.keyword = keyword.filter(|k| !k.is_empty());
        self
    }

    pub fn target(&self) -> &OutputTarget {
        &self.target
    }

    pub fn summary(&self) -> &WriteSummary {
        &self.summary
    }

    /// Store a batch. Rejected records are logged and skipped; any other
    /// failure aborts the batch.
    pub fn write_batch(&mut self, batch: &[CarvedRecord]) -> SinkResult<u64> {
        let mut written = 0u64;
        for carved in batch {
            if let Some(keyword) = &self.keyword {
                if !carved.record.contains_keyword(keyword) {
                    self.summary.filtered += 1;
                    continue;
                }
            }
            match self.sink.write_record(carved) {
                Ok(()) => {
                    written += 1;
                    *self
                        .summary
                        .per_table
                        .entry(carved.table.name.clone())
                        .or_default() += 1;
                }
                Err(err) if err.is_rejection() => {
                    let count = self
                        .summary
                        .rejected_per_table
                        .entry(carved.table.name.clone())
                        .or_default();
                    *count += 1;
                    if *count == 1 {
                        warn!(
                            offset = carved.record.source_offset,
                            scenario = %carved.record.scenario,
                            "{}",
                            err
                        );
                    } else {
                        debug!(offset = carved.record.source_offset, "{}", err);
                    }
                    self.summary.rejected += 1;
                }
                Err(err) => return Err(err),
            }
        }
        self.summary.written += written;
        debug!(
            "Wrote {} records (total: {})",
            written, self.summary.written
        );
        Ok(written)
    }

    /// Record a carved input file in [`SOURCES_TABLE`].
    pub fn record_source(&mut self, report: &FileReport) -> SinkResult<()> {
        self.sink.write_source(report)?;
        self.summary.sources += 1;
        Ok(())
    }

    /// Prepare and commit, rolling back on failure.
    pub fn finish(self) -> SinkResult<WriteSummary> {
        self.finish_with_guard(None)
    }

    /// Finish with an optional commit guard. If the guard returns false the
    /// output is rolled back.
    pub fn finish_with_guard(
        mut self,
        should_commit: Option<&dyn Fn() -> bool>,
    ) -> SinkResult<WriteSummary> {
        debug!("Preparing output: {}", self.target);
        self.sink.prepare()?;

        if let Some(guard) = should_commit {
            if !guard() {
                warn!("Output commit aborted by guard; rolling back");
                let _ = self.sink.rollback();
                return Err(SinkError::message("Output commit aborted"));
            }
        }

        if let Err(err) = self.sink.commit() {
            warn!("Output commit failed, rolling back: {}", err);
            let _ = self.sink.rollback();
            return Err(err.into());
        }

        info!(
            written = self.summary.written,
            rejected = self.summary.rejected,
            filtered = self.summary.filtered,
            "Committed output {}",
            self.target
        );
        Ok(self.summary)
    }

    /// Discard everything written so far.
    pub fn abort(mut self) -> SinkResult<()> {
        self.sink.rollback()?;
        Ok(())
    }
}
