//! Little-endian base-128 integer encoding.
//!
//! Each output byte carries 7 value bits in its low bits. The high bit is set
//! on every byte except the last one. Signed values go through a zigzag
//! mapping first so that small negative deltas stay as short as small
//! positive ones.

use crate::trace::DecodeError;

/// Longest possible encoding of a `u64`.
pub const MAX_LEN_U64: usize = 10;

/// Longest possible encoding of a `u32`.
pub const MAX_LEN_U32: usize = 5;

/// Appends `value` to `out`.
#[inline]
pub fn encode_u64(mut value: u64, out: &mut Vec<u8>) {
    while value >= 0x80 {
        out.push(0x80 | (value & 0x7F) as u8);
        value >>= 7;
    }
    out.push(value as u8);
}

#[inline]
pub fn encode_u32(value: u32, out: &mut Vec<u8>) {
    encode_u64(u64::from(value), out);
}

/// Zigzag-maps `value` and appends it to `out`.
#[inline]
pub fn encode_i64(value: i64, out: &mut Vec<u8>) {
    encode_u64(zigzag(value), out);
}

/// Maps non-negative `v` to `2v` and negative `v` to `2|v| + 1`.
///
/// `i64::MIN` has no image: `2|v|` does not fit 64 bits, so it encodes as
/// `1` and decodes back as `0`. Every other value round-trips.
#[inline]
pub fn zigzag(value: i64) -> u64 {
    if value >= 0 {
        (value as u64) << 1
    } else {
        (value.unsigned_abs() << 1) | 1
    }
}

#[inline]
pub fn unzigzag(value: u64) -> i64 {
    let magnitude = (value >> 1) as i64;
    if value & 1 == 0 { magnitude } else { -magnitude }
}

/// Number of bytes `encode_u64` produces for `value`.
pub fn encoded_len(value: u64) -> usize {
    let bits = 64 - value.leading_zeros() as usize;
    bits.div_ceil(7).max(1)
}

/// Decodes one `u64` from the front of `bytes`.
///
/// Returns the value and the number of bytes consumed.
pub fn decode_u64(bytes: &[u8]) -> Result<(u64, usize), DecodeError> {
    let mut value: u64 = 0;
    for (i, &byte) in bytes.iter().enumerate() {
        if i == MAX_LEN_U64 - 1 && byte > 1 {
            return Err(DecodeError::VarintOverflow);
        }
        value |= u64::from(byte & 0x7F) << (7 * i);
        if byte & 0x80 == 0 {
            return Ok((value, i + 1));
        }
        if i + 1 == MAX_LEN_U64 {
            return Err(DecodeError::VarintOverflow);
        }
    }
    Err(DecodeError::Truncated)
}

pub fn decode_u32(bytes: &[u8]) -> Result<(u32, usize), DecodeError> {
    let (value, len) = decode_u64(bytes)?;
    if len > MAX_LEN_U32 {
        return Err(DecodeError::VarintOverflow);
    }
    let value = u32::try_from(value).map_err(|_| DecodeError::VarintOverflow)?;
    Ok((value, len))
}

pub fn decode_i64(bytes: &[u8]) -> Result<(i64, usize), DecodeError> {
    let (value, len) = decode_u64(bytes)?;
    Ok((unzigzag(value), len))
}
