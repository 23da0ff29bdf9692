//! Serial type codes: on-disk length of each column value and which codes a
//! storage class may carry.

use crate::error::{CarveError, Result};
use serde::Serialize;
use sqlcarve_schema::StorageClass;

/// Interpretation family of a serial type code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SerialKind {
    Null,
    /// Big-endian two's complement integer (codes 1-6).
    Integer,
    /// IEEE 754 big-endian double (code 7).
    Float,
    /// Constant 0 (code 8).
    Zero,
    /// Constant 1 (code 9).
    One,
    Blob,
    Text,
}

/// A resolved serial type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct SerialType {
    pub code: u64,
    pub kind: SerialKind,
    /// Bytes the value occupies in the payload.
    pub length: u64,
}

impl SerialType {
    /// Returns true unless the length depends on the code (text/blob).
    pub fn is_fixed(&self) -> bool {
        !matches!(self.kind, SerialKind::Blob | SerialKind::Text)
    }
}

/// Resolve a serial type code. Codes 10 and 11 are reserved.
pub fn resolve(code: u64) -> Result<SerialType> {
    let (kind, length) = match code {
        0 => (SerialKind::Null, 0),
        1..=4 => (SerialKind::Integer, code),
        5 => (SerialKind::Integer, 6),
        6 => (SerialKind::Integer, 8),
        7 => (SerialKind::Float, 8),
        8 => (SerialKind::Zero, 0),
        9 => (SerialKind::One, 0),
        10 | 11 => return Err(CarveError::ReservedSerialType(code)),
        n if n % 2 == 0 => (SerialKind::Blob, (n - 12) / 2),
        n => (SerialKind::Text, (n - 13) / 2),
    };
    Ok(SerialType { code, kind, length })
}

/// Payload length of a code, `None` for reserved codes.
pub fn payload_length(code: u64) -> Option<u64> {
    resolve(code).ok().map(|t| t.length)
}

/// Integer serial type code for a given payload width, if one exists.
pub fn integer_code_for_length(length: u64) -> Option<u64> {
    match length {
        1..=4 => Some(length),
        6 => Some(5),
        8 => Some(6),
        _ => None,
    }
}

/// Returns true if a column of `class` may carry `code` on disk.
pub fn admits(class: StorageClass, code: u64) -> bool {
    match class {
        StorageClass::RowidAlias => code == 0,
        StorageClass::Integer => matches!(code, 0..=6 | 8 | 9),
        StorageClass::IntegerNotNull => matches!(code, 1..=6 | 8 | 9),
        StorageClass::Boolean => matches!(code, 0 | 8 | 9),
        StorageClass::BooleanNotNull => matches!(code, 8 | 9),
        StorageClass::Real => matches!(code, 0 | 7),
        StorageClass::RealNotNull => code == 7,
        StorageClass::Text => code == 0 || code >= 13,
        StorageClass::TextNotNull => code >= 13,
        StorageClass::Blob => code == 0 || code >= 12,
        StorageClass::BlobNotNull => code >= 12,
        StorageClass::Numeric | StorageClass::DateLike => matches!(code, 0..=9) || code >= 12,
        StorageClass::NumericNotNull | StorageClass::DateLikeNotNull => {
            matches!(code, 1..=9) || code >= 12
        }
    }
}

/// Width limits of a storage class, used to bound matcher ranges.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ClassBounds {
    /// Smallest payload length any admissible code yields.
    pub min_payload: u64,
    /// Largest payload length, `None` when unbounded.
    pub max_payload: Option<u64>,
    /// Most bytes the code's varint can occupy.
    pub max_code_bytes: u64,
}

/// Width limits for `class`.
pub fn class_bounds(class: StorageClass) -> ClassBounds {
    let (min_payload, max_payload) = match class {
        StorageClass::RowidAlias | StorageClass::Boolean | StorageClass::BooleanNotNull => {
            (0, Some(0))
        }
        StorageClass::Integer | StorageClass::IntegerNotNull | StorageClass::Real => (0, Some(8)),
        StorageClass::RealNotNull => (8, Some(8)),
        _ => (0, None),
    };
    ClassBounds {
        min_payload,
        max_payload,
        max_code_bytes: if class.is_fixed_width() { 1 } else { 9 },
    }
}
