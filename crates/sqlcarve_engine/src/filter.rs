//! Consistency filter.
//!
//! Checks the arithmetic identities each layout must satisfy, repairs the
//! overwritten first type code in [`Scenario::FirstTypeOverwritten`], and
//! gates on the table's column count. Anything that survives is handed to
//! the payload decoder.

use crate::error::{CarveError, Inconsistency, Result};
use crate::header::{DecodedHeader, HeaderPrefix};
use crate::pattern::FREEBLOCK_HEADER_LEN;
use crate::scenario::Scenario;
use crate::serial_type::integer_code_for_length;
use sqlcarve_schema::{StorageClass, TableSpec};

/// Largest residual an integer column can absorb (a 9-byte varint-sized gap).
const MAX_INTEGER_RESIDUAL: u64 = 9;

/// Inferred type of the overwritten first column.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RepairedType {
    /// Serial type code, when the length alone determines one.
    pub code: Option<u64>,
    pub length: u64,
}

/// A header that passed every check for its table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AcceptedHeader {
    pub header: DecodedHeader,
    pub repaired: Option<RepairedType>,
    /// One payload length per table column.
    pub lengths: Vec<u64>,
    /// Cell rowid, only known for intact cells.
    pub rowid: Option<u64>,
}

impl AcceptedHeader {
    /// Serial type code for table column `column`.
    ///
    /// When the first code was repaired the buffer's codes are shifted by
    /// one relative to the table's columns.
    pub fn raw_code(&self, column: usize) -> Option<u64> {
        match (&self.repaired, column) {
            (Some(repaired), 0) => repaired.code,
            (Some(_), n) => self.header.raw_codes.get(n - 1).copied(),
            (None, n) => self.header.raw_codes.get(n).copied(),
        }
    }

    pub fn scenario(&self) -> Scenario {
        self.header.scenario
    }

    pub fn span(&self) -> usize {
        self.header.span
    }
}

/// Residual range a first column of `class` accepts.
pub fn residual_range(class: StorageClass) -> (u64, Option<u64>) {
    match class {
        StorageClass::RowidAlias | StorageClass::Boolean | StorageClass::BooleanNotNull => {
            (0, Some(0))
        }
        StorageClass::Integer | StorageClass::IntegerNotNull => (0, Some(MAX_INTEGER_RESIDUAL)),
        StorageClass::Real => (0, Some(8)),
        StorageClass::RealNotNull => (8, Some(8)),
        _ => (0, None),
    }
}

/// Infer the first column's type from the bytes left unaccounted for.
pub fn repair_first_type(class: StorageClass, residual: u64) -> Option<RepairedType> {
    let (min, max) = residual_range(class);
    if residual < min || max.is_some_and(|max| residual > max) {
        return None;
    }
    let zero = |not_null_code: Option<u64>| {
        if class.is_not_null() {
            not_null_code
        } else {
            Some(0)
        }
    };
    let code = match class.nullable() {
        StorageClass::RowidAlias => Some(0),
        StorageClass::Integer | StorageClass::Boolean if residual == 0 => zero(Some(8)),
        StorageClass::Integer => integer_code_for_length(residual),
        StorageClass::Real => match residual {
            0 => Some(0),
            8 => Some(7),
            _ => return None,
        },
        // The residual is a byte length, so code parity cannot be read from
        // it; the declared class picks the odd (text) or even (blob) code.
        StorageClass::Text => Some(2 * residual + 13),
        StorageClass::Blob => Some(2 * residual + 12),
        _ if residual == 0 => zero(None),
        _ => integer_code_for_length(residual),
    };
    Some(RepairedType {
        code,
        length: residual,
    })
}

/// Sum of lengths, skipping rowid-alias columns.
fn content_sum(lengths: &[u64], table: &TableSpec) -> u64 {
    lengths
        .iter()
        .enumerate()
        .filter(|(i, _)| {
            table
                .columns
                .get(*i)
                .map_or(true, |c| c.storage_class != StorageClass::RowidAlias)
        })
        .fold(0u64, |acc, (_, len)| acc.saturating_add(*len))
}

fn expect_eq(declared: u64, computed: u64, err: fn(u64, u64) -> Inconsistency) -> Result<()> {
    if declared == computed {
        Ok(())
    } else {
        Err(err(declared, computed).into())
    }
}

fn array_length(declared: u64, consumed: u64) -> Inconsistency {
    Inconsistency::ArrayLength { declared, consumed }
}

fn freeblock_length(declared: u64, computed: u64) -> Inconsistency {
    Inconsistency::FreeblockLength { declared, computed }
}

/// Run the scenario's checks and the column-count gate.
pub fn accept(header: DecodedHeader, table: &TableSpec) -> Result<AcceptedHeader> {
    if header.raw_codes.is_empty() {
        return Err(Inconsistency::NoColumns.into());
    }
    let span = header.span as u64;
    let header_len = span - header.header_start as u64;
    let visible = header.content_len();

    let mut repaired = None;
    let mut rowid = None;

    match (header.scenario, header.prefix) {
        (
            Scenario::Intact,
            HeaderPrefix::Cell {
                payload_len,
                rowid: cell_rowid,
                array_len,
            },
        ) => {
            expect_eq(array_len, header_len, array_length)?;
            expect_eq(payload_len, array_len.saturating_add(visible), |declared, computed| {
                Inconsistency::PayloadLength { declared, computed }
            })?;
            rowid = Some(cell_rowid);
        }
        (Scenario::FirstTypeOverwritten, HeaderPrefix::Freeblock { length, .. }) => {
            let residual = i128::from(length) - i128::from(visible) - i128::from(span);
            let class = table.first_class().ok_or(Inconsistency::NoColumns)?;
            let fixed = u64::try_from(residual)
                .ok()
                .and_then(|r| repair_first_type(class, r))
                .ok_or(Inconsistency::NoRepair {
                    residual: i64::try_from(residual).unwrap_or(i64::MIN),
                })?;
            repaired = Some(fixed);
        }
        (Scenario::PrefixOverwritten, HeaderPrefix::Freeblock { length, .. }) => {
            expect_eq(u64::from(length), visible.saturating_add(span), freeblock_length)?;
        }
        (
            Scenario::LengthAndRowidOverwritten,
            HeaderPrefix::FreeblockArrayLen {
                length, array_len, ..
            },
        ) => {
            expect_eq(array_len, header_len, array_length)?;
            expect_eq(
                u64::from(length),
                array_len
                    .saturating_add(visible)
                    .saturating_add(FREEBLOCK_HEADER_LEN),
                freeblock_length,
            )?;
        }
        (Scenario::ArrayLengthSplit, HeaderPrefix::FreeblockArrayTail { length, tail, .. }) => {
            if tail & 0x80 != 0 {
                return Err(Inconsistency::ContinuedArrayTail(tail).into());
            }
            let array_len = 128 + u64::from(tail);
            expect_eq(array_len, header_len, array_length)?;
            expect_eq(
                u64::from(length),
                array_len
                    .saturating_add(visible)
                    .saturating_add(FREEBLOCK_HEADER_LEN - 1),
                freeblock_length,
            )?;
        }
        (
            Scenario::RowidSplit,
            HeaderPrefix::FreeblockRowidTail {
                length,
                rowid_tail_len,
                array_len,
                ..
            },
        ) => {
            expect_eq(array_len, header_len, array_length)?;
            expect_eq(
                u64::from(length),
                array_len
                    .saturating_add(visible)
                    .saturating_add(FREEBLOCK_HEADER_LEN + rowid_tail_len as u64),
                freeblock_length,
            )?;
        }
        _ => return Err(Inconsistency::WrongPrefix.into()),
    }

    let lengths: Vec<u64> = match &repaired {
        Some(fixed) => std::iter::once(fixed.length)
            .chain(header.lengths.iter().copied())
            .collect(),
        None => header.lengths.clone(),
    };

    if content_sum(&lengths, table) == 0 {
        return Err(Inconsistency::EmptyRecord.into());
    }
    if lengths.len() != table.column_count() {
        return Err(CarveError::ColumnCountMismatch {
            expected: table.column_count(),
            actual: lengths.len(),
        });
    }

    Ok(AcceptedHeader {
        header,
        repaired,
        lengths,
        rowid,
    })
}
