//! BTT arena metadata: the info block and free-log entries.
//!
//! ```text
//! BttInfo (4096 bytes)
//! Offset  Size  Field
//! 0       16    sig ("BTT_ARENA_INFO\0\0")
//! 16      16    uuid
//! 32      16    parent_uuid
//! 48      4     flags
//! 52      2     major
//! 54      2     minor
//! 56      4     external_lbasize
//! 60      4     external_nlba
//! 64      4     internal_lbasize
//! 68      4     internal_nlba
//! 72      4     nfree
//! 76      4     infosize
//! 80      8     nextoff    (offsets relative to the arena start)
//! 88      8     dataoff
//! 96      8     mapoff
//! 104     8     flogoff
//! 112     8     infooff
//! 120     3968  unused (zero)
//! 4088    8     checksum
//! ```

use crate::{OnDisk, ensure_size};
use pmp_types::{
    BTT_FLOG_SIZE, BTT_INFO_SIZE, BTTINFO_FLAG_ERROR, BTTINFO_SIG, BTTINFO_SIG_LEN,
    BTTINFO_UUID_LEN, ParseError, read_fixed, read_le_u16, read_le_u32, read_le_u64,
};
use serde::{Deserialize, Serialize};

const INFO_UNUSED_OFFSET: usize = 120;
const INFO_UNUSED_LEN: usize = 3968;
const INFO_CHECKSUM_OFFSET: usize = 4088;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BttInfo {
    pub sig: [u8; BTTINFO_SIG_LEN],
    pub uuid: [u8; BTTINFO_UUID_LEN],
    pub parent_uuid: [u8; BTTINFO_UUID_LEN],
    pub flags: u32,
    pub major: u16,
    pub minor: u16,
    pub external_lbasize: u32,
    pub external_nlba: u32,
    pub internal_lbasize: u32,
    pub internal_nlba: u32,
    pub nfree: u32,
    pub infosize: u32,
    pub nextoff: u64,
    pub dataoff: u64,
    pub mapoff: u64,
    pub flogoff: u64,
    pub infooff: u64,
    #[serde(skip, default = "BttInfo::zeroed_unused")]
    pub unused: [u8; INFO_UNUSED_LEN],
    pub checksum: u64,
}

impl BttInfo {
    const fn zeroed_unused() -> [u8; INFO_UNUSED_LEN] {
        [0; INFO_UNUSED_LEN]
    }

    /// Whether the block starts with the arena info signature.
    #[must_use]
    pub fn has_valid_signature(&self) -> bool {
        self.sig == BTTINFO_SIG
    }

    #[must_use]
    pub fn is_error(&self) -> bool {
        (self.flags & BTTINFO_FLAG_ERROR) != 0
    }

    /// `nextoff == 0` marks the last arena in the pool.
    #[must_use]
    pub fn is_last_arena(&self) -> bool {
        self.nextoff == 0
    }
}

impl OnDisk for BttInfo {
    const NAME: &'static str = "BTT info";
    const SIZE: usize = BTT_INFO_SIZE;
    const CHECKSUM_OFFSET: Option<usize> = Some(INFO_CHECKSUM_OFFSET);

    fn from_disk(raw: &[u8]) -> Result<Self, ParseError> {
        let raw = ensure_size::<Self>(raw)?;
        Ok(Self {
            sig: read_fixed::<BTTINFO_SIG_LEN>(raw, 0)?,
            uuid: read_fixed::<BTTINFO_UUID_LEN>(raw, 16)?,
            parent_uuid: read_fixed::<BTTINFO_UUID_LEN>(raw, 32)?,
            flags: read_le_u32(raw, 48)?,
            major: read_le_u16(raw, 52)?,
            minor: read_le_u16(raw, 54)?,
            external_lbasize: read_le_u32(raw, 56)?,
            external_nlba: read_le_u32(raw, 60)?,
            internal_lbasize: read_le_u32(raw, 64)?,
            internal_nlba: read_le_u32(raw, 68)?,
            nfree: read_le_u32(raw, 72)?,
            infosize: read_le_u32(raw, 76)?,
            nextoff: read_le_u64(raw, 80)?,
            dataoff: read_le_u64(raw, 88)?,
            mapoff: read_le_u64(raw, 96)?,
            flogoff: read_le_u64(raw, 104)?,
            infooff: read_le_u64(raw, 112)?,
            unused: read_fixed::<INFO_UNUSED_LEN>(raw, INFO_UNUSED_OFFSET)?,
            checksum: read_le_u64(raw, INFO_CHECKSUM_OFFSET)?,
        })
    }

    fn to_disk(&self) -> Vec<u8> {
        let mut buf = vec![0_u8; Self::SIZE];
        buf[0..16].copy_from_slice(&self.sig);
        buf[16..32].copy_from_slice(&self.uuid);
        buf[32..48].copy_from_slice(&self.parent_uuid);
        buf[48..52].copy_from_slice(&self.flags.to_le_bytes());
        buf[52..54].copy_from_slice(&self.major.to_le_bytes());
        buf[54..56].copy_from_slice(&self.minor.to_le_bytes());
        buf[56..60].copy_from_slice(&self.external_lbasize.to_le_bytes());
        buf[60..64].copy_from_slice(&self.external_nlba.to_le_bytes());
        buf[64..68].copy_from_slice(&self.internal_lbasize.to_le_bytes());
        buf[68..72].copy_from_slice(&self.internal_nlba.to_le_bytes());
        buf[72..76].copy_from_slice(&self.nfree.to_le_bytes());
        buf[76..80].copy_from_slice(&self.infosize.to_le_bytes());
        buf[80..88].copy_from_slice(&self.nextoff.to_le_bytes());
        buf[88..96].copy_from_slice(&self.dataoff.to_le_bytes());
        buf[96..104].copy_from_slice(&self.mapoff.to_le_bytes());
        buf[104..112].copy_from_slice(&self.flogoff.to_le_bytes());
        buf[112..120].copy_from_slice(&self.infooff.to_le_bytes());
        buf[INFO_UNUSED_OFFSET..INFO_CHECKSUM_OFFSET].copy_from_slice(&self.unused);
        buf[INFO_CHECKSUM_OFFSET..INFO_CHECKSUM_OFFSET + 8]
            .copy_from_slice(&self.checksum.to_le_bytes());
        buf
    }
}

// ── BttFlog ─────────────────────────────────────────────────────────────────

/// One free-log entry. Entries come in pairs; the one with the higher `seq`
/// (modulo the 2-bit sequence space) is current.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct BttFlog {
    pub lba: u32,
    pub old_map: u32,
    pub new_map: u32,
    pub seq: u32,
}

impl OnDisk for BttFlog {
    const NAME: &'static str = "BTT flog entry";
    const SIZE: usize = BTT_FLOG_SIZE;

    fn from_disk(raw: &[u8]) -> Result<Self, ParseError> {
        let raw = ensure_size::<Self>(raw)?;
        Ok(Self {
            lba: read_le_u32(raw, 0)?,
            old_map: read_le_u32(raw, 4)?,
            new_map: read_le_u32(raw, 8)?,
            seq: read_le_u32(raw, 12)?,
        })
    }

    fn to_disk(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(Self::SIZE);
        buf.extend_from_slice(&self.lba.to_le_bytes());
        buf.extend_from_slice(&self.old_map.to_le_bytes());
        buf.extend_from_slice(&self.new_map.to_le_bytes());
        buf.extend_from_slice(&self.seq.to_le_bytes());
        buf
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn sample_info() -> BttInfo {
        BttInfo {
            sig: BTTINFO_SIG,
            uuid: [1; 16],
            parent_uuid: [2; 16],
            flags: 0,
            major: 1,
            minor: 1,
            external_lbasize: 512,
            external_nlba: 32_000,
            internal_lbasize: 512,
            internal_nlba: 32_256,
            nfree: 256,
            infosize: 4096,
            nextoff: 0,
            dataoff: 4096,
            mapoff: 16_519_168,
            flogoff: 16_650_240,
            infooff: 16_773_120,
            unused: [0; INFO_UNUSED_LEN],
            checksum: 0xFEED_FACE_CAFE_BEEF,
        }
    }

    #[test]
    fn info_field_offsets() {
        let info = sample_info();
        let bytes = info.to_disk();
        assert_eq!(bytes.len(), 4096);
        assert_eq!(&bytes[0..16], b"BTT_ARENA_INFO\0\0");
        assert_eq!(bytes[52..54], 1_u16.to_le_bytes());
        assert_eq!(bytes[72..76], 256_u32.to_le_bytes());
        assert_eq!(bytes[104..112], 16_650_240_u64.to_le_bytes());
        assert_eq!(bytes[4088..4096], 0xFEED_FACE_CAFE_BEEF_u64.to_le_bytes());
        assert_eq!(BttInfo::from_disk(&bytes).unwrap(), info);
    }

    #[test]
    fn info_flags_and_signature() {
        let mut info = sample_info();
        assert!(info.has_valid_signature());
        assert!(!info.is_error());
        assert!(info.is_last_arena());
        info.flags = BTTINFO_FLAG_ERROR;
        info.sig[0] = b'X';
        info.nextoff = 1 << 39;
        assert!(info.is_error());
        assert!(!info.has_valid_signature());
        assert!(!info.is_last_arena());
    }

    #[test]
    fn flog_layout() {
        let flog = BttFlog {
            lba: 7,
            old_map: 0x4000_0001,
            new_map: 3,
            seq: 2,
        };
        let bytes = flog.to_disk();
        assert_eq!(bytes.len(), 16);
        assert_eq!(bytes[4..8], 0x4000_0001_u32.to_le_bytes());
        assert_eq!(BttFlog::from_disk(&bytes).unwrap(), flog);
        assert!(BttFlog::from_disk(&bytes[..15]).is_err());
    }

    #[test]
    fn extreme_bit_patterns_survive() {
        for fill in [0x00_u8, 0xFF] {
            let image = vec![fill; BttInfo::SIZE];
            assert_eq!(BttInfo::from_disk(&image).unwrap().to_disk(), image);
            let image = vec![fill; BttFlog::SIZE];
            assert_eq!(BttFlog::from_disk(&image).unwrap().to_disk(), image);
        }
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(64))]

        #[test]
        fn flog_round_trip(lba in any::<u32>(), old in any::<u32>(), new in any::<u32>(), seq in any::<u32>()) {
            let flog = BttFlog { lba, old_map: old, new_map: new, seq };
            prop_assert_eq!(BttFlog::from_disk(&flog.to_disk()).unwrap(), flog);
        }

        #[test]
        fn info_disk_host_disk(image in proptest::collection::vec(any::<u8>(), BttInfo::SIZE)) {
            let info = BttInfo::from_disk(&image).unwrap();
            prop_assert_eq!(info.to_disk(), image.clone());
            prop_assert_eq!(BttInfo::from_disk(&info.to_disk()).unwrap(), info);
        }
    }
}
