#![forbid(unsafe_code)]
//! Shared vocabulary for pmempool-inspect: on-disk constants, the pool type
//! sum type, the structural `ParseError`, and little-endian byte helpers.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

// ── Pool header ─────────────────────────────────────────────────────────────

/// Size of the common pool header at file offset 0.
pub const POOL_HDR_SIZE: usize = 4096;
/// Length of the signature field at the start of the pool header.
pub const POOL_HDR_SIG_LEN: usize = 8;
/// Length of every UUID field.
pub const POOL_HDR_UUID_LEN: usize = 16;

pub const LOG_HDR_SIG: [u8; POOL_HDR_SIG_LEN] = *b"PMEMLOG\0";
pub const BLK_HDR_SIG: [u8; POOL_HDR_SIG_LEN] = *b"PMEMBLK\0";
pub const OBJ_HDR_SIG: [u8; POOL_HDR_SIG_LEN] = *b"PMEMOBJ\0";

// ── Type-specific descriptors ───────────────────────────────────────────────

/// Alignment of the pmemblk data area (first BTT arena).
pub const BLK_FORMAT_DATA_ALIGN: u64 = 4096;
/// Fixed length of the pmemobj layout name.
pub const PMEMOBJ_MAX_LAYOUT: usize = 1024;

pub const PMEMLOG_MIN_POOL: u64 = 2 * 1024 * 1024;
pub const PMEMBLK_MIN_POOL: u64 = 16 * 1024 * 1024;
pub const PMEMOBJ_MIN_POOL: u64 = 8 * 1024 * 1024;
pub const PMEMBLK_MIN_BLK: u32 = 512;

// ── BTT ─────────────────────────────────────────────────────────────────────

/// Size of one BTT info block (primary or backup).
pub const BTT_INFO_SIZE: usize = 4096;
/// Size of one BTT free-log entry.
pub const BTT_FLOG_SIZE: usize = 16;

pub const BTTINFO_SIG_LEN: usize = 16;
pub const BTTINFO_SIG: [u8; BTTINFO_SIG_LEN] = *b"BTT_ARENA_INFO\0\0";
pub const BTTINFO_UUID_LEN: usize = 16;
/// Arena is in an error state and must not be written.
pub const BTTINFO_FLAG_ERROR: u32 = 0x0000_0001;
pub const BTTINFO_MAJOR_VERSION: u16 = 1;
pub const BTTINFO_MINOR_VERSION: u16 = 1;

// ── Pool type ───────────────────────────────────────────────────────────────

/// Kind of pool a file holds.
///
/// `None` means the file could not be examined at all; `Unknown` means the
/// header was readable but carried no registered signature.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PoolType {
    None,
    Unknown,
    Log,
    #[serde(rename = "blk")]
    Block,
    #[serde(rename = "obj")]
    Object,
}

impl PoolType {
    /// Classify a raw signature field. The whole 8-byte field must match.
    #[must_use]
    pub fn from_signature(signature: &[u8; POOL_HDR_SIG_LEN]) -> Self {
        match *signature {
            LOG_HDR_SIG => Self::Log,
            BLK_HDR_SIG => Self::Block,
            OBJ_HDR_SIG => Self::Object,
            _ => Self::Unknown,
        }
    }

    #[must_use]
    pub const fn signature(self) -> Option<[u8; POOL_HDR_SIG_LEN]> {
        match self {
            Self::Log => Some(LOG_HDR_SIG),
            Self::Block => Some(BLK_HDR_SIG),
            Self::Object => Some(OBJ_HDR_SIG),
            Self::None | Self::Unknown => None,
        }
    }

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::None => "none",
            Self::Unknown => "unknown",
            Self::Log => "log",
            Self::Block => "blk",
            Self::Object => "obj",
        }
    }

    /// Smallest file that can hold a pool of this type (0 when not a pool).
    #[must_use]
    pub const fn min_pool_size(self) -> u64 {
        match self {
            Self::Log => PMEMLOG_MIN_POOL,
            Self::Block => PMEMBLK_MIN_POOL,
            Self::Object => PMEMOBJ_MIN_POOL,
            Self::None | Self::Unknown => 0,
        }
    }

    #[must_use]
    pub const fn is_pool(self) -> bool {
        matches!(self, Self::Log | Self::Block | Self::Object)
    }
}

impl fmt::Display for PoolType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PoolType {
    type Err = ParseError;

    /// Parse a user-supplied type name (`blk`, `log`, `obj`).
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "blk" => Ok(Self::Block),
            "log" => Ok(Self::Log),
            "obj" => Ok(Self::Object),
            _ => Err(ParseError::InvalidText {
                what: "pool type",
                input: s.to_owned(),
            }),
        }
    }
}

// ── Errors ──────────────────────────────────────────────────────────────────

/// Structural failure while decoding bytes or text.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParseError {
    #[error("insufficient data: need {needed} bytes at offset {offset}, have {actual}")]
    InsufficientData {
        needed: usize,
        offset: usize,
        actual: usize,
    },
    #[error("invalid field {field}: {reason}")]
    InvalidField {
        field: &'static str,
        reason: &'static str,
    },
    #[error("invalid {what}: {input:?}")]
    InvalidText { what: &'static str, input: String },
}

// ── Byte helpers ────────────────────────────────────────────────────────────

/// Borrow `len` bytes at `offset`, or report how much was missing.
pub fn ensure_slice(bytes: &[u8], offset: usize, len: usize) -> Result<&[u8], ParseError> {
    let end = offset.checked_add(len).ok_or(ParseError::InvalidField {
        field: "offset",
        reason: "overflow",
    })?;
    bytes.get(offset..end).ok_or(ParseError::InsufficientData {
        needed: len,
        offset,
        actual: bytes.len().saturating_sub(offset),
    })
}

pub fn read_fixed<const N: usize>(bytes: &[u8], offset: usize) -> Result<[u8; N], ParseError> {
    let mut out = [0_u8; N];
    out.copy_from_slice(ensure_slice(bytes, offset, N)?);
    Ok(out)
}

pub fn read_le_u16(bytes: &[u8], offset: usize) -> Result<u16, ParseError> {
    Ok(u16::from_le_bytes(read_fixed::<2>(bytes, offset)?))
}

pub fn read_le_u32(bytes: &[u8], offset: usize) -> Result<u32, ParseError> {
    Ok(u32::from_le_bytes(read_fixed::<4>(bytes, offset)?))
}

pub fn read_le_u64(bytes: &[u8], offset: usize) -> Result<u64, ParseError> {
    Ok(u64::from_le_bytes(read_fixed::<8>(bytes, offset)?))
}

/// Decode a NUL-padded byte field for display, stopping at the first NUL.
#[must_use]
pub fn trim_nul_padded(bytes: &[u8]) -> String {
    let end = bytes.iter().position(|&b| b == 0).unwrap_or(bytes.len());
    String::from_utf8_lossy(&bytes[..end]).into_owned()
}

/// True when every byte of `buf` equals `val` (vacuously true when empty).
#[must_use]
pub fn is_filled_with(buf: &[u8], val: u8) -> bool {
    buf.iter().all(|&b| b == val)
}

/// Round `value` up to a multiple of `align`; `None` on overflow or zero
/// alignment.
#[must_use]
pub const fn checked_round_up(value: u64, align: u64) -> Option<u64> {
    if align == 0 {
        return None;
    }
    match value.checked_add(align - 1) {
        Some(v) => Some(v / align * align),
        None => None,
    }
}

// ── Text parsers ────────────────────────────────────────────────────────────

/// Parse a decimal size with an optional binary unit: `K`, `M`, `G`, `T` or
/// `P`, optionally followed by `B` (`4K`, `2MB`). Overflow is rejected.
pub fn parse_size(input: &str) -> Result<u64, ParseError> {
    let invalid = || ParseError::InvalidText {
        what: "size",
        input: input.to_owned(),
    };

    let digits_end = input
        .find(|c: char| !c.is_ascii_digit())
        .unwrap_or(input.len());
    if digits_end == 0 {
        return Err(invalid());
    }
    let value: u64 = input[..digits_end].parse().map_err(|_| invalid())?;

    let shift = match input[digits_end..].as_bytes() {
        [] => 0,
        [unit] | [unit, b'B'] => match unit {
            b'K' => 10,
            b'M' => 20,
            b'G' => 30,
            b'T' => 40,
            b'P' => 50,
            _ => return Err(invalid()),
        },
        _ => return Err(invalid()),
    };

    value.checked_mul(1_u64 << shift).ok_or_else(invalid)
}

/// Parse a permission mode of at most three octal digits after any leading
/// zeros (`644`, `0755`, `0`).
pub fn parse_mode(input: &str) -> Result<u32, ParseError> {
    let invalid = || ParseError::InvalidText {
        what: "mode",
        input: input.to_owned(),
    };

    let digits = input.trim_start_matches('0');
    if digits.len() > 3 || input.is_empty() {
        return Err(invalid());
    }
    digits.bytes().try_fold(0_u32, |mode, b| match b {
        b'0'..=b'7' => Ok((mode << 3) | u32::from(b - b'0')),
        _ => Err(invalid()),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn signature_classification_requires_full_field() {
        assert_eq!(PoolType::from_signature(b"PMEMBLK\0"), PoolType::Block);
        assert_eq!(PoolType::from_signature(b"PMEMLOG\0"), PoolType::Log);
        assert_eq!(PoolType::from_signature(b"PMEMOBJ\0"), PoolType::Object);
        assert_eq!(PoolType::from_signature(b"PMEMBLKX"), PoolType::Unknown);
        assert_eq!(PoolType::from_signature(&[0; 8]), PoolType::Unknown);
    }

    #[test]
    fn pool_type_strings() {
        assert_eq!("blk".parse::<PoolType>().unwrap(), PoolType::Block);
        assert_eq!("log".parse::<PoolType>().unwrap(), PoolType::Log);
        assert_eq!("obj".parse::<PoolType>().unwrap(), PoolType::Object);
        assert!("btt".parse::<PoolType>().is_err());
        assert_eq!(PoolType::Block.to_string(), "blk");
        assert_eq!(PoolType::Unknown.min_pool_size(), 0);
        assert_eq!(PoolType::Block.min_pool_size(), 16 * 1024 * 1024);
    }

    #[test]
    fn le_reads_are_bounds_checked() {
        let bytes = [0x01, 0x02, 0x03, 0x04, 0x05];
        assert_eq!(read_le_u32(&bytes, 0).unwrap(), 0x0403_0201);
        assert_eq!(read_le_u16(&bytes, 3).unwrap(), 0x0504);
        assert_eq!(
            read_le_u64(&bytes, 0).unwrap_err(),
            ParseError::InsufficientData {
                needed: 8,
                offset: 0,
                actual: 5
            }
        );
    }

    #[test]
    fn round_up_behaviour() {
        assert_eq!(checked_round_up(0, 256), Some(0));
        assert_eq!(checked_round_up(1, 256), Some(256));
        assert_eq!(checked_round_up(512, 256), Some(512));
        assert_eq!(checked_round_up(u64::MAX, 256), None);
        assert_eq!(checked_round_up(5, 0), None);
    }

    #[test]
    fn parse_size_units() {
        assert_eq!(parse_size("0").unwrap(), 0);
        assert_eq!(parse_size("4096").unwrap(), 4096);
        assert_eq!(parse_size("4K").unwrap(), 4096);
        assert_eq!(parse_size("2MB").unwrap(), 2 << 20);
        assert_eq!(parse_size("1G").unwrap(), 1 << 30);
        assert_eq!(parse_size("3P").unwrap(), 3 << 50);
        assert!(parse_size("").is_err());
        assert!(parse_size("K").is_err());
        assert!(parse_size("4k").is_err());
        assert!(parse_size("4KBB").is_err());
        assert!(parse_size("4X").is_err());
        assert!(parse_size("-4").is_err());
        assert!(parse_size("16384P").is_err(), "overflow must be rejected");
    }

    #[test]
    fn parse_mode_octal() {
        assert_eq!(parse_mode("644").unwrap(), 0o644);
        assert_eq!(parse_mode("0755").unwrap(), 0o755);
        assert_eq!(parse_mode("000").unwrap(), 0);
        assert_eq!(parse_mode("7").unwrap(), 0o7);
        assert!(parse_mode("1777").is_err());
        assert!(parse_mode("648").is_err());
        assert!(parse_mode("").is_err());
    }

    #[test]
    fn fill_check_and_nul_trim() {
        assert!(is_filled_with(&[0; 16], 0));
        assert!(!is_filled_with(&[0, 0, 1], 0));
        assert!(is_filled_with(&[], 0xFF));
        assert_eq!(trim_nul_padded(b"layout\0\0junk"), "layout");
        assert_eq!(trim_nul_padded(b"full"), "full");
    }
}
