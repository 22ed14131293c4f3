//! Frame checksum.
//!
//! A 16-bit accumulator starts at `0xFFFF` and every byte is subtracted from it
//! with wrap-around. This only detects accidental corruption; two compensating
//! errors (for example `+1` on one byte and `-1` on another) go unnoticed.

/// Initial accumulator value.
pub const CHECKSUM_INIT: u16 = 0xFFFF;

/// Compute the checksum of `data`.
pub fn checksum(data: &[u8]) -> u16 {
    checksum_update(CHECKSUM_INIT, data)
}

/// Continue a checksum over more bytes.
pub fn checksum_update(acc: u16, data: &[u8]) -> u16 {
    data.iter()
        .fold(acc, |acc, &b| acc.wrapping_sub(u16::from(b)))
}
