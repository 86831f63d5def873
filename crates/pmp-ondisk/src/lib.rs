#![forbid(unsafe_code)]
//! Byte-exact codecs for pmem pool metadata.
//!
//! Every structure persisted by the pool libraries is stored little-endian.
//! Each type here implements [`OnDisk`]: `from_disk` turns the disk image
//! into host values and `to_disk` produces the image again, bit for bit.
//! Raw byte fields (signatures, UUIDs, layout names, reserved areas) are
//! carried through untouched so that a decode/encode cycle never loses data.
//!
//! Checksums are validated on the disk image through [`checksum`], never on
//! decoded values.

pub mod btt;
pub mod checksum;
pub mod pool;

pub use btt::{BttFlog, BttInfo};
pub use checksum::{ChecksumVerdict, compute_checksum, insert_checksum, validate_or_repair, verify};
pub use pool::{BlockPoolHeader, LogPoolHeader, ObjectPoolHeader, PoolHeader};

use pmp_types::ParseError;

/// A fixed-size little-endian metadata structure.
pub trait OnDisk: Sized {
    /// Human-readable structure name used in reports and errors.
    const NAME: &'static str;
    /// Size of the disk image in bytes.
    const SIZE: usize;
    /// Offset of the structure's own 8-byte checksum, if it carries one.
    const CHECKSUM_OFFSET: Option<usize> = None;

    /// Decode the first `SIZE` bytes of `raw`. Fails only when `raw` is short.
    fn from_disk(raw: &[u8]) -> Result<Self, ParseError>;

    /// Encode into a `SIZE`-byte little-endian image.
    fn to_disk(&self) -> Vec<u8>;
}

/// Serde adapter for byte arrays longer than serde's built-in array impls.
/// Deserializing input of any other length is an error.
pub(crate) mod fixed_bytes {
    use serde::de::Error;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer, const N: usize>(
        bytes: &[u8; N],
        serializer: S,
    ) -> Result<S::Ok, S::Error> {
        serializer.serialize_bytes(bytes)
    }

    pub fn deserialize<'de, D: Deserializer<'de>, const N: usize>(
        deserializer: D,
    ) -> Result<[u8; N], D::Error> {
        let bytes = Vec::<u8>::deserialize(deserializer)?;
        let len = bytes.len();
        bytes
            .try_into()
            .map_err(|_| D::Error::invalid_length(len, &"a fixed-size byte field"))
    }
}

/// Fail with `InsufficientData` unless `raw` holds at least `T::SIZE` bytes.
pub(crate) fn ensure_size<T: OnDisk>(raw: &[u8]) -> Result<&[u8], ParseError> {
    pmp_types::ensure_slice(raw, 0, T::SIZE)
}
