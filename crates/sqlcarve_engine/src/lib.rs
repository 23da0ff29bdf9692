//! Byte-level record carving for SQLite database images.
//!
//! Recovers live and deleted records from database files, rollback journals
//! and WAL files by pattern-matching record headers against known table
//! layouts, without relying on the b-tree structure.
//!
//! Pipeline per input buffer:
//!
//! 1. [`pattern::PatternBuilder`] compiles one [`pattern::CompiledMatcher`]
//!    per (table, [`Scenario`]).
//! 2. [`scanner::scan`] tries every start offset.
//! 3. [`header::decode`] reads the matched span.
//! 4. [`filter::accept`] checks the layout's identities and the column count.
//! 5. [`payload::decode_payload`] materializes a [`RecoveredRecord`].
//!
//! [`Carver`] drives the pipeline over files with a worker pool.

pub mod cancel;
pub mod db_header;
pub mod dispatcher;
pub mod error;
pub mod filter;
pub mod header;
pub mod pattern;
pub mod payload;
pub mod record;
pub mod scanner;
pub mod scenario;
pub mod serial_type;
pub mod varint;

pub use cancel::CancellationToken;
pub use db_header::DatabaseHeader;
pub use dispatcher::{CarveOptions, CarveStats, CarvedRecord, Carver, FileReport, RecordBatch};
pub use error::{CarveError, Inconsistency, Result};
pub use record::{RecoveredRecord, Value, ERROR_MARKER, ROWID_NOT_RECOVERED};
pub use scenario::Scenario;
