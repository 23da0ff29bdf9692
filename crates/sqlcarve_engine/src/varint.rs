//! Record-format variable-length integers.
//!
//! 1-9 bytes, big-endian, 7 value bits per byte with the high bit flagging
//! a continuation. The 9th byte contributes all 8 bits and is never checked
//! for a continuation flag.

use crate::error::{CarveError, Result};

/// Longest possible varint encoding.
pub const MAX_VARINT_LEN: usize = 9;

/// Decode a varint from the start of `buf`, returning `(value, bytes_consumed)`.
pub fn read_varint(buf: &[u8]) -> Result<(u64, usize)> {
    let mut value: u64 = 0;
    for i in 0..MAX_VARINT_LEN - 1 {
        let byte = *buf.get(i).ok_or(CarveError::TruncatedInput)?;
        value = (value << 7) | u64::from(byte & 0x7F);
        if byte & 0x80 == 0 {
            return Ok((value, i + 1));
        }
    }
    let last = *buf
        .get(MAX_VARINT_LEN - 1)
        .ok_or(CarveError::TruncatedInput)?;
    Ok(((value << 8) | u64::from(last), MAX_VARINT_LEN))
}

/// Decode a varint at `offset` within `buf`.
pub fn read_varint_at(buf: &[u8], offset: usize) -> Result<(u64, usize)> {
    read_varint(buf.get(offset..).ok_or(CarveError::TruncatedInput)?)
}

/// Number of bytes needed to encode `value`.
pub const fn varint_len(value: u64) -> usize {
    if value <= 0x7F {
        1
    } else if value <= 0x3FFF {
        2
    } else if value <= 0x001F_FFFF {
        3
    } else if value <= 0x0FFF_FFFF {
        4
    } else if value <= 0x07_FFFF_FFFF {
        5
    } else if value <= 0x03FF_FFFF_FFFF {
        6
    } else if value <= 0x01_FFFF_FFFF_FFFF {
        7
    } else if value <= 0xFF_FFFF_FFFF_FFFF {
        8
    } else {
        9
    }
}

/// Encode `value` as a varint.
pub fn encode_varint(value: u64) -> Vec<u8> {
    let len = varint_len(value);
    let mut out = vec![0u8; len];
    if len == MAX_VARINT_LEN {
        out[8] = value as u8;
        let mut v = value >> 8;
        for i in (0..8).rev() {
            out[i] = (v as u8 & 0x7F) | 0x80;
            v >>= 7;
        }
    } else {
        let mut v = value;
        for i in (0..len).rev() {
            out[i] = v as u8 & 0x7F;
            if i != len - 1 {
                out[i] |= 0x80;
            }
            v >>= 7;
        }
    }
    out
}
