//! Bit-field packing over 64-bit words.
//!
//! Fields are described by a `width` (0 to 64 bits) and the index of their
//! least significant bit, `lsb`. The decoder uses these to pull opcode and
//! register fields out of instruction words; the encoder uses them to build
//! words back up.
//!
//! A field that does not fit in its word (`width > 64` or
//! `width + lsb > 64`) is a bug in the caller and panics.

use thiserror::Error;

/// Errors that can occur while packing a field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum BitpackError {
    #[error("value does not fit in {width} bits")]
    Overflow { width: u32 },
}

/// Does `n` fit in `width` unsigned bits?
///
/// A width of 64 always fits. Shifting a `u64` by 64 is not defined, so that
/// case is answered directly.
pub fn fits_u(n: u64, width: u32) -> bool {
    if width >= 64 {
        return true;
    }
    n >> width == 0
}

/// Does `n` fit in `width` two's-complement bits?
pub fn fits_s(n: i64, width: u32) -> bool {
    if width >= 64 {
        return true;
    }
    if width == 0 {
        return false;
    }
    let min = -(1i64 << (width - 1));
    let max = (1i64 << (width - 1)) - 1;
    (min..=max).contains(&n)
}

/// Extract an unsigned field.
#[inline]
pub fn get_u(word: u64, width: u32, lsb: u32) -> u64 {
    check_field(width, lsb);
    if width == 0 {
        return 0;
    }
    (word >> lsb) & mask(width)
}

/// Extract a signed field, sign-extending from its top bit.
pub fn get_s(word: u64, width: u32, lsb: u32) -> i64 {
    check_field(width, lsb);
    if width == 0 {
        return 0;
    }
    let shift = 64 - width;
    ((get_u(word, width, lsb) << shift) as i64) >> shift
}

/// Replace an unsigned field with `value`.
pub fn new_u(word: u64, width: u32, lsb: u32, value: u64) -> Result<u64, BitpackError> {
    check_field(width, lsb);
    if !fits_u(value, width) {
        return Err(BitpackError::Overflow { width });
    }
    if width == 0 {
        return Ok(word);
    }
    let field = mask(width) << lsb;
    Ok((word & !field) | (value << lsb))
}

/// Replace a signed field with `value`, stored in two's complement.
pub fn new_s(word: u64, width: u32, lsb: u32, value: i64) -> Result<u64, BitpackError> {
    check_field(width, lsb);
    if width == 0 {
        return if value == 0 {
            Ok(word)
        } else {
            Err(BitpackError::Overflow { width })
        };
    }
    if !fits_s(value, width) {
        return Err(BitpackError::Overflow { width });
    }
    new_u(word, width, lsb, value as u64 & mask(width))
}

/// All ones in the low `width` bits; `width` is 1 to 64.
#[inline]
fn mask(width: u32) -> u64 {
    u64::MAX >> (64 - width)
}

#[inline]
fn check_field(width: u32, lsb: u32) {
    assert!(width <= 64, "field width {} exceeds 64 bits", width);
    assert!(
        width + lsb <= 64,
        "field of width {} at bit {} runs past bit 63",
        width,
        lsb
    );
}
