//! LEB128 encoding of integers.
//!
//! Fixed-width quantities (lengths, type table indices and opcodes) go
//! through the `leb128` crate. The arbitrary-precision `nat` and `int`
//! values are encoded here on top of `num-bigint`, 7 payload bits per byte
//! with the high bit as continuation flag. Signed values use two's
//! complement sign extension: the last byte's bit 6 carries the sign.

use crate::error::{CandidResult, VarintError};
use num_bigint::{BigInt, BigUint};
use num_traits::{One, ToPrimitive, Zero};

/// Encodes `value` as unsigned LEB128.
pub fn encode_unsigned(value: &BigUint) -> Vec<u8> {
    let mut out = Vec::new();
    write_unsigned(&mut out, value);
    out
}

/// Encodes `value` as signed LEB128.
pub fn encode_signed(value: &BigInt) -> Vec<u8> {
    let mut out = Vec::new();
    write_signed(&mut out, value);
    out
}

pub fn write_unsigned(out: &mut Vec<u8>, value: &BigUint) {
    let mut value = value.clone();
    loop {
        let byte = (value.iter_u32_digits().next().unwrap_or(0) & 0x7f) as u8;
        value >>= 7;
        if value.is_zero() {
            out.push(byte);
            return;
        }
        out.push(byte | 0x80);
    }
}

pub fn write_signed(out: &mut Vec<u8>, value: &BigInt) {
    let mask = BigInt::from(0x7f);
    let mut value = value.clone();
    loop {
        let byte = (&value & &mask).to_u8().unwrap_or(0);
        // Arithmetic shift: negative values round towards negative infinity.
        value >>= 7;
        let sign_bit_clear = byte & 0x40 == 0;
        if (value.is_zero() && sign_bit_clear) || (value == -BigInt::one() && !sign_bit_clear) {
            out.push(byte);
            return;
        }
        out.push(byte | 0x80);
    }
}

pub fn write_u64(out: &mut Vec<u8>, value: u64) {
    leb128::write::unsigned(out, value).expect("writing to a Vec never fails");
}

pub fn write_i64(out: &mut Vec<u8>, value: i64) {
    leb128::write::signed(out, value).expect("writing to a Vec never fails");
}

/// Reads an unsigned LEB128 integer of at most `max_bytes` bytes from the
/// front of `input`, advancing it.
pub fn read_unsigned(input: &mut &[u8], max_bytes: usize) -> CandidResult<BigUint> {
    let mut result = BigUint::zero();
    let mut shift = 0usize;
    for consumed in 0.. {
        if consumed >= max_bytes {
            return Err(VarintError::TooLong { max_bytes }.into());
        }
        let byte = read_byte(input)?;
        result |= BigUint::from(byte & 0x7f) << shift;
        shift += 7;
        if byte & 0x80 == 0 {
            break;
        }
    }
    Ok(result)
}

/// Reads a signed LEB128 integer of at most `max_bytes` bytes from the front
/// of `input`, advancing it.
pub fn read_signed(input: &mut &[u8], max_bytes: usize) -> CandidResult<BigInt> {
    let mut magnitude = BigUint::zero();
    let mut shift = 0usize;
    let mut last = 0u8;
    for consumed in 0.. {
        if consumed >= max_bytes {
            return Err(VarintError::TooLong { max_bytes }.into());
        }
        last = read_byte(input)?;
        magnitude |= BigUint::from(last & 0x7f) << shift;
        shift += 7;
        if last & 0x80 == 0 {
            break;
        }
    }
    let value = BigInt::from(magnitude);
    if last & 0x40 != 0 {
        Ok(value - (BigInt::one() << shift))
    } else {
        Ok(value)
    }
}

pub fn read_u64(input: &mut &[u8]) -> CandidResult<u64> {
    leb128::read::unsigned(input).map_err(|err| map_leb128_error(err).into())
}

pub fn read_i64(input: &mut &[u8]) -> CandidResult<i64> {
    leb128::read::signed(input).map_err(|err| map_leb128_error(err).into())
}

/// Reads an unsigned LEB128 length and checks it fits into `usize`.
pub fn read_len(input: &mut &[u8]) -> CandidResult<usize> {
    let len = read_u64(input)?;
    usize::try_from(len).map_err(|_| VarintError::Overflow.into())
}

fn read_byte(input: &mut &[u8]) -> Result<u8, VarintError> {
    match input.split_first() {
        Some((byte, rest)) => {
            *input = rest;
            Ok(*byte)
        }
        None => Err(VarintError::Unterminated),
    }
}

fn map_leb128_error(err: leb128::read::Error) -> VarintError {
    match err {
        leb128::read::Error::Overflow => VarintError::Overflow,
        leb128::read::Error::IoError(_) => VarintError::Unterminated,
    }
}
