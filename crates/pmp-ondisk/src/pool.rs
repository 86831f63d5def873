//! Pool headers: the common 4 KiB header and the per-type descriptors that
//! immediately follow it.
//!
//! ```text
//! Offset  Size  Field
//! 0       8     signature ("PMEMLOG\0" | "PMEMBLK\0" | "PMEMOBJ\0")
//! 8       4     major
//! 12      4     compat_features
//! 16      4     incompat_features
//! 20      4     ro_compat_features
//! 24      16    uuid
//! 40      8     crtime
//! 48      4040  unused (zero)
//! 4088    8     checksum (Fletcher-64 of bytes [0..4096], field as zero)
//! ```

use crate::{OnDisk, ensure_size, fixed_bytes};
use pmp_types::{
    POOL_HDR_SIG_LEN, POOL_HDR_SIZE, POOL_HDR_UUID_LEN, PMEMOBJ_MAX_LAYOUT, ParseError, PoolType,
    is_filled_with, read_fixed, read_le_u32, read_le_u64, trim_nul_padded,
};
use serde::{Deserialize, Serialize};

const HDR_UNUSED_OFFSET: usize = 48;
const HDR_UNUSED_LEN: usize = 4040;
const HDR_CHECKSUM_OFFSET: usize = 4088;

// ── PoolHeader ──────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PoolHeader {
    pub signature: [u8; POOL_HDR_SIG_LEN],
    pub major: u32,
    pub compat_features: u32,
    pub incompat_features: u32,
    pub ro_compat_features: u32,
    pub uuid: [u8; POOL_HDR_UUID_LEN],
    /// Creation time, seconds since the epoch.
    pub crtime: u64,
    #[serde(skip, default = "PoolHeader::zeroed_unused")]
    pub unused: [u8; HDR_UNUSED_LEN],
    pub checksum: u64,
}

impl PoolHeader {
    const fn zeroed_unused() -> [u8; HDR_UNUSED_LEN] {
        [0; HDR_UNUSED_LEN]
    }

    /// Classify the pool by its signature.
    #[must_use]
    pub fn pool_type(&self) -> PoolType {
        PoolType::from_signature(&self.signature)
    }

    /// Whether the reserved area is all zero, as the pool libraries require.
    #[must_use]
    pub fn unused_is_zeroed(&self) -> bool {
        is_filled_with(&self.unused, 0)
    }

    #[must_use]
    pub fn has_compat(&self, mask: u32) -> bool {
        (self.compat_features & mask) != 0
    }

    #[must_use]
    pub fn has_incompat(&self, mask: u32) -> bool {
        (self.incompat_features & mask) != 0
    }

    #[must_use]
    pub fn has_ro_compat(&self, mask: u32) -> bool {
        (self.ro_compat_features & mask) != 0
    }
}

impl OnDisk for PoolHeader {
    const NAME: &'static str = "pool header";
    const SIZE: usize = POOL_HDR_SIZE;
    const CHECKSUM_OFFSET: Option<usize> = Some(HDR_CHECKSUM_OFFSET);

    fn from_disk(raw: &[u8]) -> Result<Self, ParseError> {
        let raw = ensure_size::<Self>(raw)?;
        Ok(Self {
            signature: read_fixed::<POOL_HDR_SIG_LEN>(raw, 0)?,
            major: read_le_u32(raw, 8)?,
            compat_features: read_le_u32(raw, 12)?,
            incompat_features: read_le_u32(raw, 16)?,
            ro_compat_features: read_le_u32(raw, 20)?,
            uuid: read_fixed::<POOL_HDR_UUID_LEN>(raw, 24)?,
            crtime: read_le_u64(raw, 40)?,
            unused: read_fixed::<HDR_UNUSED_LEN>(raw, HDR_UNUSED_OFFSET)?,
            checksum: read_le_u64(raw, HDR_CHECKSUM_OFFSET)?,
        })
    }

    fn to_disk(&self) -> Vec<u8> {
        let mut buf = vec![0_u8; Self::SIZE];
        buf[0..8].copy_from_slice(&self.signature);
        buf[8..12].copy_from_slice(&self.major.to_le_bytes());
        buf[12..16].copy_from_slice(&self.compat_features.to_le_bytes());
        buf[16..20].copy_from_slice(&self.incompat_features.to_le_bytes());
        buf[20..24].copy_from_slice(&self.ro_compat_features.to_le_bytes());
        buf[24..40].copy_from_slice(&self.uuid);
        buf[40..48].copy_from_slice(&self.crtime.to_le_bytes());
        buf[HDR_UNUSED_OFFSET..HDR_CHECKSUM_OFFSET].copy_from_slice(&self.unused);
        buf[HDR_CHECKSUM_OFFSET..HDR_CHECKSUM_OFFSET + 8]
            .copy_from_slice(&self.checksum.to_le_bytes());
        buf
    }
}

// ── pmemblk ─────────────────────────────────────────────────────────────────

/// Block pool descriptor: pool header, then `bsize` and `is_zeroed`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockPoolHeader {
    pub hdr: PoolHeader,
    /// External block size in bytes.
    pub bsize: u32,
    pub is_zeroed: u32,
}

impl OnDisk for BlockPoolHeader {
    const NAME: &'static str = "pmemblk descriptor";
    const SIZE: usize = POOL_HDR_SIZE + 8;

    fn from_disk(raw: &[u8]) -> Result<Self, ParseError> {
        let raw = ensure_size::<Self>(raw)?;
        Ok(Self {
            hdr: PoolHeader::from_disk(raw)?,
            bsize: read_le_u32(raw, POOL_HDR_SIZE)?,
            is_zeroed: read_le_u32(raw, POOL_HDR_SIZE + 4)?,
        })
    }

    fn to_disk(&self) -> Vec<u8> {
        let mut buf = self.hdr.to_disk();
        buf.extend_from_slice(&self.bsize.to_le_bytes());
        buf.extend_from_slice(&self.is_zeroed.to_le_bytes());
        buf
    }
}

// ── pmemlog ─────────────────────────────────────────────────────────────────

/// Log pool descriptor: the usable log region and the current write point.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogPoolHeader {
    pub hdr: PoolHeader,
    pub start_offset: u64,
    pub end_offset: u64,
    pub write_offset: u64,
}

impl LogPoolHeader {
    /// Bytes appended so far, `None` when the offsets are inconsistent.
    #[must_use]
    pub fn used_bytes(&self) -> Option<u64> {
        if self.write_offset > self.end_offset {
            return None;
        }
        self.write_offset.checked_sub(self.start_offset)
    }
}

impl OnDisk for LogPoolHeader {
    const NAME: &'static str = "pmemlog descriptor";
    const SIZE: usize = POOL_HDR_SIZE + 24;

    fn from_disk(raw: &[u8]) -> Result<Self, ParseError> {
        let raw = ensure_size::<Self>(raw)?;
        Ok(Self {
            hdr: PoolHeader::from_disk(raw)?,
            start_offset: read_le_u64(raw, POOL_HDR_SIZE)?,
            end_offset: read_le_u64(raw, POOL_HDR_SIZE + 8)?,
            write_offset: read_le_u64(raw, POOL_HDR_SIZE + 16)?,
        })
    }

    fn to_disk(&self) -> Vec<u8> {
        let mut buf = self.hdr.to_disk();
        buf.extend_from_slice(&self.start_offset.to_le_bytes());
        buf.extend_from_slice(&self.end_offset.to_le_bytes());
        buf.extend_from_slice(&self.write_offset.to_le_bytes());
        buf
    }
}

// ── pmemobj ─────────────────────────────────────────────────────────────────

/// Object pool descriptor prefix: the pool header and the layout name.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ObjectPoolHeader {
    pub hdr: PoolHeader,
    /// Raw layout name, not necessarily NUL-terminated.
    #[serde(with = "fixed_bytes")]
    pub layout: [u8; PMEMOBJ_MAX_LAYOUT],
}

impl ObjectPoolHeader {
    /// Layout name up to the first NUL, lossily decoded.
    #[must_use]
    pub fn layout_name(&self) -> String {
        trim_nul_padded(&self.layout)
    }
}

impl OnDisk for ObjectPoolHeader {
    const NAME: &'static str = "pmemobj descriptor";
    const SIZE: usize = POOL_HDR_SIZE + PMEMOBJ_MAX_LAYOUT;

    fn from_disk(raw: &[u8]) -> Result<Self, ParseError> {
        let raw = ensure_size::<Self>(raw)?;
        Ok(Self {
            hdr: PoolHeader::from_disk(raw)?,
            layout: read_fixed::<PMEMOBJ_MAX_LAYOUT>(raw, POOL_HDR_SIZE)?,
        })
    }

    fn to_disk(&self) -> Vec<u8> {
        let mut buf = self.hdr.to_disk();
        buf.extend_from_slice(&self.layout);
        buf
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn sample_header(sig: &[u8; 8]) -> PoolHeader {
        PoolHeader {
            signature: *sig,
            major: 1,
            compat_features: 0x0000_0001,
            incompat_features: 0x0000_0002,
            ro_compat_features: 0x8000_0000,
            uuid: [0x5A; 16],
            crtime: 1_700_000_000,
            unused: [0; HDR_UNUSED_LEN],
            checksum: 0x0123_4567_89AB_CDEF,
        }
    }

    #[test]
    fn pool_header_field_offsets() {
        let bytes = sample_header(b"PMEMBLK\0").to_disk();
        assert_eq!(bytes.len(), 4096);
        assert_eq!(&bytes[0..8], b"PMEMBLK\0");
        assert_eq!(bytes[8..12], 1_u32.to_le_bytes());
        assert_eq!(bytes[20..24], 0x8000_0000_u32.to_le_bytes());
        assert_eq!(bytes[40..48], 1_700_000_000_u64.to_le_bytes());
        assert_eq!(bytes[4088..4096], 0x0123_4567_89AB_CDEF_u64.to_le_bytes());
    }

    #[test]
    fn pool_header_classifies_regardless_of_trailing_payload() {
        let mut bytes = sample_header(b"PMEMBLK\0").to_disk();
        bytes.extend_from_slice(&[0xEE; 64]);
        let hdr = PoolHeader::from_disk(&bytes).expect("parse");
        assert_eq!(hdr.pool_type(), PoolType::Block);
        assert!(hdr.has_compat(1));
        assert!(!hdr.has_incompat(1));
        assert!(hdr.has_ro_compat(0x8000_0000));

        let mut bytes = sample_header(b"NOTAPOOL").to_disk();
        bytes.extend_from_slice(b"PMEMBLK\0");
        let hdr = PoolHeader::from_disk(&bytes).expect("parse");
        assert_eq!(hdr.pool_type(), PoolType::Unknown);
    }

    #[test]
    fn pool_header_rejects_short_buffer() {
        let err = PoolHeader::from_disk(&[0; 100]).unwrap_err();
        assert!(matches!(
            err,
            ParseError::InsufficientData {
                needed: 4096,
                actual: 100,
                ..
            }
        ));
    }

    #[test]
    fn nonzero_unused_area_is_detected() {
        let mut hdr = sample_header(b"PMEMLOG\0");
        assert!(hdr.unused_is_zeroed());
        hdr.unused[17] = 1;
        assert!(!hdr.unused_is_zeroed());
    }

    #[test]
    fn block_descriptor_reads_bsize() {
        let mut bytes = sample_header(b"PMEMBLK\0").to_disk();
        bytes.extend_from_slice(&4096_u32.to_le_bytes());
        bytes.extend_from_slice(&1_u32.to_le_bytes());
        let blk = BlockPoolHeader::from_disk(&bytes).expect("parse");
        assert_eq!(blk.bsize, 4096);
        assert_eq!(blk.is_zeroed, 1);
        assert_eq!(blk.to_disk(), bytes);
    }

    #[test]
    fn log_descriptor_offsets() {
        let log = LogPoolHeader {
            hdr: sample_header(b"PMEMLOG\0"),
            start_offset: 8192,
            end_offset: 2 << 20,
            write_offset: 12288,
        };
        let bytes = log.to_disk();
        assert_eq!(bytes.len(), LogPoolHeader::SIZE);
        assert_eq!(bytes[4096..4104], 8192_u64.to_le_bytes());
        assert_eq!(bytes[4112..4120], 12288_u64.to_le_bytes());
        assert_eq!(log.used_bytes(), Some(4096));

        let broken = LogPoolHeader {
            write_offset: 4096,
            ..log
        };
        assert_eq!(broken.used_bytes(), None);
    }

    #[test]
    fn object_layout_is_copied_verbatim() {
        let mut bytes = sample_header(b"PMEMOBJ\0").to_disk();
        let mut layout = [b'x'; PMEMOBJ_MAX_LAYOUT];
        layout[..6].copy_from_slice(b"mylay\0");
        bytes.extend_from_slice(&layout);
        let obj = ObjectPoolHeader::from_disk(&bytes).expect("parse");
        assert_eq!(obj.layout, layout);
        assert_eq!(obj.layout_name(), "mylay");

        let unterminated = ObjectPoolHeader {
            layout: [b'a'; PMEMOBJ_MAX_LAYOUT],
            ..obj
        };
        assert_eq!(unterminated.layout_name().len(), PMEMOBJ_MAX_LAYOUT);
    }

    #[test]
    fn object_layout_serde_keeps_exact_length() {
        let mut layout = [0_u8; PMEMOBJ_MAX_LAYOUT];
        layout[..4].copy_from_slice(b"tree");
        let obj = ObjectPoolHeader {
            hdr: sample_header(b"PMEMOBJ\0"),
            layout,
        };
        let json = serde_json::to_value(&obj).unwrap();
        assert_eq!(json["layout"].as_array().map(Vec::len), Some(PMEMOBJ_MAX_LAYOUT));
        let back: ObjectPoolHeader = serde_json::from_value(json.clone()).unwrap();
        assert_eq!(back, obj);

        let mut short = json;
        short["layout"] = serde_json::json!([1, 2, 3]);
        let err = serde_json::from_value::<ObjectPoolHeader>(short).unwrap_err();
        assert!(err.to_string().contains("invalid length 3"), "{err}");
    }

    #[test]
    fn all_zero_and_all_ones_images_survive() {
        for fill in [0x00_u8, 0xFF] {
            let image = vec![fill; ObjectPoolHeader::SIZE];
            assert_eq!(PoolHeader::from_disk(&image).unwrap().to_disk(), image[..4096]);
            assert_eq!(
                BlockPoolHeader::from_disk(&image).unwrap().to_disk(),
                image[..BlockPoolHeader::SIZE]
            );
            assert_eq!(
                LogPoolHeader::from_disk(&image).unwrap().to_disk(),
                image[..LogPoolHeader::SIZE]
            );
            assert_eq!(ObjectPoolHeader::from_disk(&image).unwrap().to_disk(), image);
        }
    }

    fn arb_header() -> impl Strategy<Value = PoolHeader> {
        (
            any::<[u8; 8]>(),
            any::<(u32, u32, u32, u32)>(),
            any::<[u8; 16]>(),
            any::<u64>(),
            proptest::collection::vec(any::<u8>(), HDR_UNUSED_LEN)
                .prop_map(|bytes| <[u8; HDR_UNUSED_LEN]>::try_from(bytes).unwrap()),
            any::<u64>(),
        )
            .prop_map(
                |(signature, (major, compat, incompat, ro), uuid, crtime, unused, checksum)| {
                    PoolHeader {
                        signature,
                        major,
                        compat_features: compat,
                        incompat_features: incompat,
                        ro_compat_features: ro,
                        uuid,
                        crtime,
                        unused,
                        checksum,
                    }
                },
            )
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(64))]

        #[test]
        fn pool_header_host_disk_round_trip(hdr in arb_header()) {
            prop_assert_eq!(PoolHeader::from_disk(&hdr.to_disk()).unwrap(), hdr);
        }

        #[test]
        fn block_and_log_round_trip(
            hdr in arb_header(),
            bsize in any::<u32>(),
            zeroed in any::<u32>(),
            offs in any::<(u64, u64, u64)>(),
        ) {
            let blk = BlockPoolHeader { hdr: hdr.clone(), bsize, is_zeroed: zeroed };
            prop_assert_eq!(BlockPoolHeader::from_disk(&blk.to_disk()).unwrap(), blk);

            let log = LogPoolHeader {
                hdr,
                start_offset: offs.0,
                end_offset: offs.1,
                write_offset: offs.2,
            };
            prop_assert_eq!(LogPoolHeader::from_disk(&log.to_disk()).unwrap(), log);
        }

        #[test]
        fn disk_host_disk_round_trip(image in proptest::collection::vec(any::<u8>(), ObjectPoolHeader::SIZE)) {
            let obj = ObjectPoolHeader::from_disk(&image).unwrap();
            prop_assert_eq!(obj.to_disk(), image);
        }
    }
}
