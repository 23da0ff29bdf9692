//! Header decoding for a matched span.
//!
//! The decoder trusts the matcher only for the span length. It re-reads the
//! prefix fields for the scenario and every serial type code in the span, so
//! it can be driven directly from tests or from another matcher.

use crate::error::{CarveError, Inconsistency, Result};
use crate::scenario::Scenario;
use crate::serial_type::resolve;
use crate::varint::{read_varint, MAX_VARINT_LEN};
use byteorder::{BigEndian, ByteOrder};

/// Leading fields that survived for a given scenario.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HeaderPrefix {
    Cell {
        payload_len: u64,
        rowid: u64,
        array_len: u64,
    },
    Freeblock {
        next: u16,
        length: u16,
    },
    FreeblockArrayLen {
        next: u16,
        length: u16,
        array_len: u64,
    },
    FreeblockArrayTail {
        next: u16,
        length: u16,
        tail: u8,
    },
    FreeblockRowidTail {
        next: u16,
        length: u16,
        rowid_tail_len: usize,
        array_len: u64,
    },
}

impl HeaderPrefix {
    /// Freeblock length, for freeblock layouts.
    pub fn freeblock_length(&self) -> Option<u16> {
        match self {
            HeaderPrefix::Cell { .. } => None,
            HeaderPrefix::Freeblock { length, .. }
            | HeaderPrefix::FreeblockArrayLen { length, .. }
            | HeaderPrefix::FreeblockArrayTail { length, .. }
            | HeaderPrefix::FreeblockRowidTail { length, .. } => Some(*length),
        }
    }
}

/// A header read from the buffer, not yet checked for consistency.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodedHeader {
    pub scenario: Scenario,
    pub prefix: HeaderPrefix,
    /// Offset within the span where the record header (its length varint)
    /// begins. For the split layout this is the freeblock's last byte.
    pub header_start: usize,
    /// Serial type codes as found in the span.
    pub raw_codes: Vec<u64>,
    /// Payload length of each code in `raw_codes`.
    pub lengths: Vec<u64>,
    /// Total bytes covered, prefix included.
    pub span: usize,
}

impl DecodedHeader {
    /// Sum of the visible column lengths.
    pub fn content_len(&self) -> u64 {
        self.lengths.iter().fold(0u64, |acc, len| acc.saturating_add(*len))
    }
}

struct Cursor<'a> {
    region: &'a [u8],
    pos: usize,
}

impl<'a> Cursor<'a> {
    fn varint(&mut self) -> Result<u64> {
        let (value, n) = read_varint(&self.region[self.pos..])?;
        self.pos += n;
        Ok(value)
    }

    fn u16(&mut self) -> Result<u16> {
        let bytes = self
            .region
            .get(self.pos..self.pos + 2)
            .ok_or(CarveError::TruncatedInput)?;
        self.pos += 2;
        Ok(BigEndian::read_u16(bytes))
    }

    fn byte(&mut self) -> Result<u8> {
        let byte = *self.region.get(self.pos).ok_or(CarveError::TruncatedInput)?;
        self.pos += 1;
        Ok(byte)
    }

    fn varint_tail(&mut self) -> Result<usize> {
        let start = self.pos;
        loop {
            let byte = self.byte()?;
            if byte & 0x80 == 0 {
                return Ok(self.pos - start);
            }
            if self.pos - start == MAX_VARINT_LEN - 1 {
                return Err(Inconsistency::SpanOverrun.into());
            }
        }
    }
}

/// Decode the header occupying `buf[offset..offset + span]`.
pub fn decode(buf: &[u8], offset: usize, span: usize, scenario: Scenario) -> Result<DecodedHeader> {
    let available = buf.len().saturating_sub(offset);
    if span > available {
        return Err(CarveError::TruncatedHeader {
            offset,
            needed: span,
            available,
        });
    }
    let mut cur = Cursor {
        region: &buf[offset..offset + span],
        pos: 0,
    };

    let (prefix, header_start) = if scenario.is_freeblock() {
        let next = cur.u16()?;
        let length = cur.u16()?;
        match scenario {
            Scenario::FirstTypeOverwritten | Scenario::PrefixOverwritten => {
                (HeaderPrefix::Freeblock { next, length }, cur.pos)
            }
            Scenario::LengthAndRowidOverwritten => {
                let start = cur.pos;
                let array_len = cur.varint()?;
                (HeaderPrefix::FreeblockArrayLen { next, length, array_len }, start)
            }
            Scenario::ArrayLengthSplit => {
                let tail = cur.byte()?;
                (HeaderPrefix::FreeblockArrayTail { next, length, tail }, cur.pos - 2)
            }
            Scenario::RowidSplit => {
                let rowid_tail_len = cur.varint_tail()?;
                let start = cur.pos;
                let array_len = cur.varint()?;
                let prefix = HeaderPrefix::FreeblockRowidTail {
                    next,
                    length,
                    rowid_tail_len,
                    array_len,
                };
                (prefix, start)
            }
            Scenario::Intact => return Err(Inconsistency::WrongPrefix.into()),
        }
    } else {
        let payload_len = cur.varint()?;
        let rowid = cur.varint()?;
        let start = cur.pos;
        let array_len = cur.varint()?;
        (
            HeaderPrefix::Cell {
                payload_len,
                rowid,
                array_len,
            },
            start,
        )
    };

    let mut raw_codes = Vec::new();
    let mut lengths = Vec::new();
    while cur.pos < span {
        let code = cur.varint().map_err(|e| match e {
            CarveError::TruncatedInput => Inconsistency::SpanOverrun.into(),
            other => other,
        })?;
        lengths.push(resolve(code)?.length);
        raw_codes.push(code);
    }

    Ok(DecodedHeader {
        scenario,
        prefix,
        header_start,
        raw_codes,
        lengths,
        span,
    })
}
