//! Payload decoding.
//!
//! Column values follow the header span back to back. Decoding never fails
//! as a whole: a column whose bytes are missing or do not fit its class is
//! recorded as [`Value::Error`] and the remaining columns are still decoded.

use crate::filter::AcceptedHeader;
use crate::record::{RecoveredRecord, Value};
use crate::scanner::CandidateMatch;
use byteorder::{BigEndian, ByteOrder};
use sqlcarve_schema::{StorageClass, TableSpec};
use std::sync::Arc;

/// Sequences removed from decoded text before it reaches a SQL sink.
const STRIPPED: [&str; 4] = ["'", "--", "/*", "*/"];

/// Decode the payload following `candidate` into a record.
pub fn decode_payload(
    buf: &[u8],
    accepted: &AcceptedHeader,
    table: &TableSpec,
    candidate: &CandidateMatch,
) -> RecoveredRecord {
    RecoveredRecord {
        table: Arc::clone(&candidate.table),
        scenario: candidate.scenario,
        source_offset: candidate.start as u64,
        source_file: Arc::clone(&candidate.source_file),
        values: decode_values(buf, candidate.end, accepted, table),
    }
}

/// Decode one value per column starting at `payload_start`.
pub fn decode_values(
    buf: &[u8],
    payload_start: usize,
    accepted: &AcceptedHeader,
    table: &TableSpec,
) -> Vec<Value> {
    let mut pos = Some(payload_start);
    table
        .columns
        .iter()
        .zip(&accepted.lengths)
        .enumerate()
        .map(|(i, (column, &length))| {
            let bytes = pos.zip(usize::try_from(length).ok()).and_then(|(start, len)| {
                let end = start.checked_add(len)?;
                pos = Some(end);
                buf.get(start..end)
            });
            if bytes.is_none() {
                pos = None;
            }
            decode_column(
                column.storage_class,
                accepted.raw_code(i),
                bytes,
                accepted.rowid,
            )
        })
        .collect()
}

/// Decode a single column.
pub fn decode_column(
    class: StorageClass,
    raw_code: Option<u64>,
    bytes: Option<&[u8]>,
    rowid: Option<u64>,
) -> Value {
    if class == StorageClass::RowidAlias {
        return match rowid {
            Some(id) => Value::Integer(id as i64),
            None => Value::RowidNotRecovered,
        };
    }
    let Some(bytes) = bytes else {
        return Value::Error;
    };
    if raw_code == Some(0) {
        return Value::Null;
    }

    match class.nullable() {
        StorageClass::Integer | StorageClass::Boolean | StorageClass::Real => match raw_code {
            Some(8) => Value::Integer(0),
            Some(9) => Value::Integer(1),
            Some(7) if bytes.len() == 8 => Value::Real(BigEndian::read_f64(bytes)),
            Some(7) => Value::Error,
            _ => match bytes.len() {
                1..=8 => Value::Integer(BigEndian::read_int(bytes, bytes.len())),
                _ => Value::Error,
            },
        },
        StorageClass::DateLike if raw_code == Some(4) && bytes.len() == 4 => {
            Value::Integer(i64::from(BigEndian::read_u32(bytes)))
        }
        _ => Value::Text(sanitize(&utf8_dropping_invalid(bytes))),
    }
}

/// Decode UTF-8, dropping invalid sequences.
pub fn utf8_dropping_invalid(mut bytes: &[u8]) -> String {
    let mut out = String::with_capacity(bytes.len());
    loop {
        match std::str::from_utf8(bytes) {
            Ok(valid) => {
                out.push_str(valid);
                return out;
            }
            Err(e) => {
                let (valid, rest) = bytes.split_at(e.valid_up_to());
                out.push_str(std::str::from_utf8(valid).unwrap_or_default());
                let skip = e.error_len().unwrap_or(rest.len());
                bytes = &rest[skip..];
            }
        }
    }
}

/// Remove quote and comment sequences from recovered text.
pub fn sanitize(text: &str) -> String {
    let mut out = text.to_string();
    for seq in STRIPPED {
        if out.contains(seq) {
            out = out.replace(seq, "");
        }
    }
    out
}
