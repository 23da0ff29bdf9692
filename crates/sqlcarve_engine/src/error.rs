//! Error types for the carving engine.
//!
//! Almost everything here is a per-candidate rejection: the input is
//! untrusted and partially corrupt by construction, so a failed decode just
//! means "no record at this offset". Only [`CarveError::Io`] is fatal.

use std::path::PathBuf;
use thiserror::Error;

/// Engine operation result type.
pub type Result<T> = std::result::Result<T, CarveError>;

/// Carving errors.
#[derive(Error, Debug)]
pub enum CarveError {
    /// Buffer ended inside a varint
    #[error("Input ended inside a varint")]
    TruncatedInput,

    /// Buffer ended before the matched header span
    #[error("Header at offset {offset} needs {needed} bytes, only {available} available")]
    TruncatedHeader {
        offset: usize,
        needed: usize,
        available: usize,
    },

    /// Serial type 10 or 11
    #[error("Reserved serial type code {0}")]
    ReservedSerialType(u64),

    /// Header failed a consistency invariant
    #[error("Inconsistent header: {0}")]
    InconsistentHeader(#[from] Inconsistency),

    /// Header did not resolve to the table's column count
    #[error("Header resolved {actual} columns, table has {expected}")]
    ColumnCountMismatch { expected: usize, actual: usize },

    /// Input file could not be opened or mapped
    #[error("Failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl CarveError {
    /// Returns true for errors that only reject one candidate offset.
    pub fn is_rejection(&self) -> bool {
        !matches!(self, CarveError::Io { .. })
    }
}

/// Which header invariant a candidate failed.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum Inconsistency {
    #[error("payload length {declared} != header length + column lengths {computed}")]
    PayloadLength { declared: u64, computed: u64 },

    #[error("array length {declared} != {consumed} header bytes consumed")]
    ArrayLength { declared: u64, consumed: u64 },

    #[error("freeblock length {declared} != {computed} implied by the header")]
    FreeblockLength { declared: u64, computed: u64 },

    #[error("every column has zero length")]
    EmptyRecord,

    #[error("no column type codes present")]
    NoColumns,

    #[error("array length tail byte {0:#04x} has its continuation bit set")]
    ContinuedArrayTail(u8),

    #[error("no interpretation of the overwritten first type fits residual {residual}")]
    NoRepair { residual: i64 },

    #[error("header decoding overran the matched span")]
    SpanOverrun,

    #[error("prefix kind does not belong to this scenario")]
    WrongPrefix,
}
