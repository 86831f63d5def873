//! Readers for the first BTT arena of a block pool.
//!
//! ```text
//! arena (starts at BLK_POOL_HDR_SIZE)
//! ├── info            arena + 0
//! ├── data            arena + dataoff
//! ├── map             arena + mapoff
//! ├── flog pairs      arena + flogoff + i * flog_pair_size(), i < nfree
//! └── info backup     arena + infooff
//! ```

use crate::file::PoolFile;
use pmp_btt::{BLK_POOL_HDR_SIZE, flog_pair_size};
use pmp_error::{PmpError, Result};
use pmp_ondisk::{BttFlog, BttInfo, ChecksumVerdict, OnDisk, verify};
use pmp_range::{Range, RangeSet};
use pmp_types::{ParseError, is_filled_with};
use serde::Serialize;
use tracing::debug;

/// Decoded info block with its checksum verdict, location and disk image.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArenaInfo {
    pub offset: u64,
    pub info: BttInfo,
    pub checksum: ChecksumVerdict,
    /// The `BttInfo::SIZE` bytes `info` was decoded from.
    pub image: Vec<u8>,
}

impl ArenaInfo {
    /// Absolute offset of the backup info block.
    #[must_use]
    pub fn backup_offset(&self) -> Option<u64> {
        self.offset.checked_add(self.info.infooff)
    }

    #[must_use]
    pub fn flog_offset(&self) -> Option<u64> {
        self.offset.checked_add(self.info.flogoff)
    }

    /// Every flog pair index of this arena, or `None` when `nfree` is zero.
    #[must_use]
    pub fn flog_universe(&self) -> Option<Range> {
        let last = u64::from(self.info.nfree).checked_sub(1)?;
        Some(Range::new(0, last))
    }
}

/// Read the info block of the first arena.
///
/// Returns `None` when the file ends before the info block or the block is
/// all zero: pmemblk writes the BTT layout lazily on first use.
pub fn read_arena_info(file: &mut PoolFile) -> Result<Option<ArenaInfo>> {
    let offset = BLK_POOL_HDR_SIZE;
    let size = file.size()?;
    if size < offset + BttInfo::SIZE as u64 {
        debug!(target: "pmp::arena", size, "arena_info_beyond_eof");
        return Ok(None);
    }

    let (info, raw) = file.read_struct::<BttInfo>(offset)?;
    if is_filled_with(&raw, 0) {
        debug!(target: "pmp::arena", offset, "arena_layout_absent");
        return Ok(None);
    }
    let checksum = verify::<BttInfo>(&raw)?;
    debug!(
        target: "pmp::arena",
        offset,
        signature_ok = info.has_valid_signature(),
        checksum_ok = checksum.valid,
        nfree = info.nfree,
        "arena_info_read"
    );
    Ok(Some(ArenaInfo {
        offset,
        info,
        checksum,
        image: raw,
    }))
}

/// One flog slot: two entries, one of which is current.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct FlogPair {
    pub index: u64,
    pub offset: u64,
    pub entries: [BttFlog; 2],
    /// Index into `entries` of the entry written last.
    pub current: usize,
}

/// Successor in the 2-bit sequence space `1 -> 2 -> 3 -> 1`; 0 marks an
/// unused entry.
#[must_use]
pub const fn next_seq(seq: u32) -> u32 {
    match seq {
        0 => 0,
        s => s % 3 + 1,
    }
}

/// Which entry of a pair holds the newest state.
#[must_use]
pub const fn current_entry(entries: &[BttFlog; 2]) -> usize {
    if entries[1].seq == 0 || entries[0].seq == next_seq(entries[1].seq) {
        0
    } else {
        1
    }
}

/// Read the flog pairs of `arena` selected by `selection`. Indices at or
/// beyond `nfree` are ignored.
pub fn read_flog(file: &mut PoolFile, arena: &ArenaInfo, selection: &RangeSet) -> Result<Vec<FlogPair>> {
    let Some(universe) = arena.flog_universe() else {
        return Ok(Vec::new());
    };
    let overflow = || {
        PmpError::Format(ParseError::InvalidField {
            field: "flogoff",
            reason: "flog lies beyond the addressable range",
        })
    };
    let flog_offset = arena.flog_offset().ok_or_else(overflow)?;

    let mut pairs = Vec::new();
    let indices = selection
        .iter()
        .filter(|r| r.first() <= universe.last())
        .flat_map(|r| r.first()..=r.last().min(universe.last()));
    for index in indices {
        let offset = index
            .checked_mul(flog_pair_size())
            .and_then(|rel| flog_offset.checked_add(rel))
            .ok_or_else(overflow)?;
        let raw = file.read_exact_at(offset, 2 * BttFlog::SIZE, BttFlog::NAME)?;
        let entries = [
            BttFlog::from_disk(&raw[..BttFlog::SIZE])?,
            BttFlog::from_disk(&raw[BttFlog::SIZE..])?,
        ];
        pairs.push(FlogPair {
            index,
            offset,
            entries,
            current: current_entry(&entries),
        });
    }
    debug!(target: "pmp::arena", pairs = pairs.len(), "flog_read");
    Ok(pairs)
}
