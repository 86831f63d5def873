//! Validate-or-repair checksum primitive shared by every metadata structure.
//!
//! The pool libraries protect each structure with a Fletcher-64 sum over
//! little-endian 32-bit words of the disk image, computed with the 8-byte
//! checksum field read as zero and stored little-endian. Because the sum is
//! defined on the byte image it is the same on every host.
//!
//! [`validate_or_repair`] never mutates its input: it reports whether the
//! stored value is correct and what the correct value is, so the same call
//! serves both "report corruption" and "repair in place" callers. Repairing
//! callers write the value back with [`insert_checksum`].

use crate::OnDisk;
use pmp_types::{ParseError, read_le_u64};
use serde::Serialize;

const CSUM_LEN: usize = 8;

/// Outcome of a checksum comparison.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ChecksumVerdict {
    pub valid: bool,
    /// Value found in the checksum field.
    pub stored: u64,
    /// Correct value for the buffer; equals `stored` when `valid`.
    pub checksum: u64,
}

fn check_geometry(buf: &[u8], csum_offset: usize) -> Result<(), ParseError> {
    if buf.len() % 4 != 0 {
        return Err(ParseError::InvalidField {
            field: "checksum buffer",
            reason: "length is not a multiple of 4",
        });
    }
    if csum_offset % 4 != 0 {
        return Err(ParseError::InvalidField {
            field: "checksum offset",
            reason: "not 4-byte aligned",
        });
    }
    if csum_offset
        .checked_add(CSUM_LEN)
        .is_none_or(|end| end > buf.len())
    {
        return Err(ParseError::InsufficientData {
            needed: CSUM_LEN,
            offset: csum_offset,
            actual: buf.len().saturating_sub(csum_offset),
        });
    }
    Ok(())
}

fn fletcher64(buf: &[u8], csum_offset: usize) -> u64 {
    let skip = csum_offset..csum_offset + CSUM_LEN;
    let mut lo = 0_u32;
    let mut hi = 0_u32;
    for (idx, word) in buf.chunks_exact(4).enumerate() {
        let value = if skip.contains(&(idx * 4)) {
            0
        } else {
            u32::from_le_bytes([word[0], word[1], word[2], word[3]])
        };
        lo = lo.wrapping_add(value);
        hi = hi.wrapping_add(lo);
    }
    (u64::from(hi) << 32) | u64::from(lo)
}

/// Compute the correct checksum of `buf` with the field at `csum_offset`
/// treated as zero.
pub fn compute_checksum(buf: &[u8], csum_offset: usize) -> Result<u64, ParseError> {
    check_geometry(buf, csum_offset)?;
    Ok(fletcher64(buf, csum_offset))
}

/// Compare the stored checksum against the computed one without touching
/// `buf`.
pub fn validate_or_repair(buf: &[u8], csum_offset: usize) -> Result<ChecksumVerdict, ParseError> {
    let checksum = compute_checksum(buf, csum_offset)?;
    let stored = read_le_u64(buf, csum_offset)?;
    Ok(ChecksumVerdict {
        valid: stored == checksum,
        stored,
        checksum,
    })
}

/// Write the correct checksum into `buf` and return it.
pub fn insert_checksum(buf: &mut [u8], csum_offset: usize) -> Result<u64, ParseError> {
    let checksum = compute_checksum(buf, csum_offset)?;
    buf[csum_offset..csum_offset + CSUM_LEN].copy_from_slice(&checksum.to_le_bytes());
    Ok(checksum)
}

/// [`validate_or_repair`] over the first `T::SIZE` bytes of `raw` at the
/// structure's own checksum offset.
pub fn verify<T: OnDisk>(raw: &[u8]) -> Result<ChecksumVerdict, ParseError> {
    let offset = T::CHECKSUM_OFFSET.ok_or(ParseError::InvalidField {
        field: T::NAME,
        reason: "structure has no checksum",
    })?;
    validate_or_repair(crate::ensure_size::<T>(raw)?, offset)
}
