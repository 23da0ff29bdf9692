//! Synthetic cell builder shared by the integration tests.
#![allow(dead_code)]

use sqlcarve_engine::varint::{encode_varint, varint_len};
use sqlcarve_schema::{ColumnSpec, StorageClass, TableSpec};

/// `people(id INTEGER PRIMARY KEY, name TEXT, age INTEGER)`
pub fn people() -> TableSpec {
    TableSpec::new(
        "people",
        vec![
            ColumnSpec::new("id", StorageClass::RowidAlias),
            ColumnSpec::new("name", StorageClass::Text),
            ColumnSpec::new("age", StorageClass::Integer),
        ],
    )
}

/// Builds table b-tree leaf cells column by column.
#[derive(Debug, Clone)]
pub struct CellBuilder {
    rowid: u64,
    codes: Vec<u64>,
    payload: Vec<u8>,
}

impl CellBuilder {
    pub fn new(rowid: u64) -> Self {
        Self {
            rowid,
            codes: Vec::new(),
            payload: Vec::new(),
        }
    }

    pub fn raw(mut self, code: u64, bytes: &[u8]) -> Self {
        self.codes.push(code);
        self.payload.extend_from_slice(bytes);
        self
    }

    pub fn null(self) -> Self {
        self.raw(0, &[])
    }

    /// Smallest-width integer encoding.
    pub fn int(self, value: i64) -> Self {
        let (code, width) = match value {
            -0x80..=0x7F => (1, 1),
            -0x8000..=0x7FFF => (2, 2),
            -0x80_0000..=0x7F_FFFF => (3, 3),
            -0x8000_0000..=0x7FFF_FFFF => (4, 4),
            -0x8000_0000_0000..=0x7FFF_FFFF_FFFF => (5, 6),
            _ => (6, 8),
        };
        let bytes = value.to_be_bytes();
        self.raw(code, &bytes[8 - width..])
    }

    pub fn text(self, value: &str) -> Self {
        self.raw(2 * value.len() as u64 + 13, value.as_bytes())
    }

    /// Record header: header length varint followed by the type codes.
    pub fn header(&self) -> Vec<u8> {
        let codes: Vec<u8> = self.codes.iter().flat_map(|c| encode_varint(*c)).collect();
        let mut len = codes.len() as u64 + 1;
        while varint_len(len) as u64 + codes.len() as u64 != len {
            len += 1;
        }
        let mut out = encode_varint(len);
        out.extend(codes);
        out
    }

    /// Complete live cell.
    pub fn build(&self) -> Vec<u8> {
        let header = self.header();
        let mut out = encode_varint((header.len() + self.payload.len()) as u64);
        out.extend(encode_varint(self.rowid));
        out.extend(header);
        out.extend_from_slice(&self.payload);
        out
    }

    /// The cell after deletion: its first 4 bytes replaced by a freeblock
    /// header spanning the whole cell.
    pub fn freed(&self, next: u16) -> Vec<u8> {
        let mut out = self.build();
        let len = out.len() as u16;
        out[..2].copy_from_slice(&next.to_be_bytes());
        out[2..4].copy_from_slice(&len.to_be_bytes());
        out
    }
}

/// `bytes` surrounded by zero padding, returning the buffer and the offset.
pub fn padded(bytes: &[u8], before: usize, after: usize) -> (Vec<u8>, usize) {
    let mut buf = vec![0u8; before];
    buf.extend_from_slice(bytes);
    buf.extend(std::iter::repeat(0u8).take(after));
    (buf, before)
}
