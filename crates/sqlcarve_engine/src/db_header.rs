//! The 100-byte database file header.
//!
//! Only informational: carving never depends on it, since journals, WAL
//! files and damaged images usually have no valid header at offset 0.

use byteorder::{BigEndian, ByteOrder};
use serde::Serialize;
use std::fmt;

/// Magic string at offset 0 of every database file.
pub const MAGIC: &[u8; 16] = b"SQLite format 3\0";

/// Size of the file header.
pub const HEADER_LEN: usize = 100;

/// File format version bytes (offsets 18 and 19).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FormatVersion {
    /// Rollback journal.
    Legacy,
    Wal,
    Unknown(u8),
}

impl From<u8> for FormatVersion {
    fn from(byte: u8) -> Self {
        match byte {
            1 => FormatVersion::Legacy,
            2 => FormatVersion::Wal,
            other => FormatVersion::Unknown(other),
        }
    }
}

impl fmt::Display for FormatVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FormatVersion::Legacy => f.write_str("legacy"),
            FormatVersion::Wal => f.write_str("wal"),
            FormatVersion::Unknown(v) => write!(f, "unknown ({v})"),
        }
    }
}

/// Database text encoding (offset 56).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum TextEncoding {
    #[serde(rename = "UTF-8")]
    Utf8,
    #[serde(rename = "UTF-16le")]
    Utf16Le,
    #[serde(rename = "UTF-16be")]
    Utf16Be,
    #[serde(rename = "unknown")]
    Unknown(u32),
}

impl From<u32> for TextEncoding {
    fn from(value: u32) -> Self {
        match value {
            1 => TextEncoding::Utf8,
            2 => TextEncoding::Utf16Le,
            3 => TextEncoding::Utf16Be,
            other => TextEncoding::Unknown(other),
        }
    }
}

impl fmt::Display for TextEncoding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TextEncoding::Utf8 => f.write_str("UTF-8"),
            TextEncoding::Utf16Le => f.write_str("UTF-16le"),
            TextEncoding::Utf16Be => f.write_str("UTF-16be"),
            TextEncoding::Unknown(v) => write!(f, "unknown ({v})"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DatabaseHeader {
    pub page_size: u32,
    pub write_version: FormatVersion,
    pub read_version: FormatVersion,
    /// Unused bytes at the end of each page.
    pub reserved_bytes: u8,
    pub change_counter: u32,
    /// In-header database size, in pages.
    pub page_count: u32,
    pub schema_cookie: u32,
    /// Non-zero largest root b-tree page means auto/incremental vacuum.
    pub auto_vacuum: bool,
    pub text_encoding: TextEncoding,
    pub sqlite_version: u32,
}

impl DatabaseHeader {
    /// Parse the header at the start of `buf`. Returns `None` without the
    /// magic string.
    pub fn parse(buf: &[u8]) -> Option<DatabaseHeader> {
        let header = buf.get(..HEADER_LEN)?;
        if &header[..16] != MAGIC {
            return None;
        }
        let page_size = match BigEndian::read_u16(&header[16..18]) {
            1 => 65_536,
            n => u32::from(n),
        };
        Some(DatabaseHeader {
            page_size,
            write_version: header[18].into(),
            read_version: header[19].into(),
            reserved_bytes: header[20],
            change_counter: BigEndian::read_u32(&header[24..28]),
            page_count: BigEndian::read_u32(&header[28..32]),
            schema_cookie: BigEndian::read_u32(&header[40..44]),
            auto_vacuum: BigEndian::read_u32(&header[52..56]) != 0,
            text_encoding: BigEndian::read_u32(&header[56..60]).into(),
            sqlite_version: BigEndian::read_u32(&header[96..100]),
        })
    }

    /// Library version that last wrote the file, as `X.Y.Z`.
    pub fn version_string(&self) -> String {
        let v = self.sqlite_version;
        format!("{}.{}.{}", v / 1_000_000, (v / 1000) % 1000, v % 1000)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Vec<u8> {
        let mut h = vec![0u8; HEADER_LEN];
        h[..16].copy_from_slice(MAGIC);
        h[16..18].copy_from_slice(&4096u16.to_be_bytes());
        h[18] = 2;
        h[19] = 2;
        h[24..28].copy_from_slice(&7u32.to_be_bytes());
        h[28..32].copy_from_slice(&12u32.to_be_bytes());
        h[40..44].copy_from_slice(&3u32.to_be_bytes());
        h[56..60].copy_from_slice(&1u32.to_be_bytes());
        h[96..100].copy_from_slice(&3_045_001u32.to_be_bytes());
        h
    }

    #[test]
    fn test_parse() {
        let header = DatabaseHeader::parse(&sample()).unwrap();
        assert_eq!(header.page_size, 4096);
        assert_eq!(header.write_version, FormatVersion::Wal);
        assert_eq!(header.page_count, 12);
        assert_eq!(header.change_counter, 7);
        assert_eq!(header.schema_cookie, 3);
        assert!(!header.auto_vacuum);
        assert_eq!(header.text_encoding, TextEncoding::Utf8);
        assert_eq!(header.version_string(), "3.45.1");
    }

    #[test]
    fn test_page_size_one_means_64k() {
        let mut raw = sample();
        raw[16..18].copy_from_slice(&1u16.to_be_bytes());
        assert_eq!(DatabaseHeader::parse(&raw).unwrap().page_size, 65_536);
    }

    #[test]
    fn test_rejects_non_database() {
        assert!(DatabaseHeader::parse(b"SQLite format 3\0").is_none());
        let mut raw = sample();
        raw[0] = b's';
        assert!(DatabaseHeader::parse(&raw).is_none());
    }
}
