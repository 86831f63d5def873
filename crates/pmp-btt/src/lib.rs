#![forbid(unsafe_code)]
//! BTT arena capacity planning.
//!
//! Given the raw size of a pmemblk file, derive the largest internal sector
//! size a single BTT arena can offer, and check a block size against it.
//!
//! ```text
//! ┌──────────────┬──────────┬──────────────────────────┬──────┬──────┬──────────┐
//! │ pool header  │ BTT info │ data (2 * nfree sectors) │ map  │ flog │ BTT info │
//! │ + descriptor │ primary  │                          │      │      │ backup   │
//! └──────────────┴──────────┴──────────────────────────┴──────┴──────┴──────────┘
//! ```
//!
//! Every subtraction is checked: a file too small to hold the fixed
//! overheads yields [`PmpError::LayoutInfeasible`] instead of wrapping.

use pmp_error::{PmpError, Result};
use pmp_types::{BLK_FORMAT_DATA_ALIGN, BTT_FLOG_SIZE, BTT_INFO_SIZE, POOL_HDR_SIZE, checked_round_up};
use serde::Serialize;

// ── Constants ───────────────────────────────────────────────────────────────

/// Free-list slots per arena.
pub const BTT_DEFAULT_NFREE: u32 = 256;
/// Alignment of each flog pair.
pub const BTT_FLOG_PAIR_ALIGN: u64 = 64;
/// Alignment of every arena region.
pub const BTT_ALIGNMENT: u64 = 4096;
/// Largest arena; bigger files are split into several.
pub const BTT_MAX_ARENA: u64 = 1 << 39;
pub const BTT_MIN_LBA_SIZE: u64 = 512;
pub const BTT_INTERNAL_LBA_ALIGNMENT: u64 = 256;
/// Per-sector map cost charged against the payload size.
pub const BTT_MAP_ENTRY_SIZE: u64 = 4;

/// Bytes in front of the first arena: pool header plus pmemblk descriptor,
/// padded to the data alignment.
pub const BLK_POOL_HDR_SIZE: u64 = 2 * BLK_FORMAT_DATA_ALIGN;

const _: () = assert!(BLK_POOL_HDR_SIZE >= POOL_HDR_SIZE as u64 + 8);

// ── Planning ────────────────────────────────────────────────────────────────

/// Intermediate quantities of a single-arena plan.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ArenaPlan {
    pub file_size: u64,
    pub nfree: u32,
    pub internal_nlba: u64,
    pub flog_size: u64,
    /// Arena bytes left for data and map once header, info blocks and flog
    /// are taken out.
    pub arena_size: u64,
    pub max_internal_lbasize: u64,
}

/// Size of one flog slot: a pair of entries padded to the pair alignment.
#[must_use]
pub const fn flog_pair_size() -> u64 {
    (2 * BTT_FLOG_SIZE as u64).div_ceil(BTT_FLOG_PAIR_ALIGN) * BTT_FLOG_PAIR_ALIGN
}

/// Total flog region for `nfree` slots, aligned to [`BTT_ALIGNMENT`].
#[must_use]
pub fn flog_region_size(nfree: u32) -> Option<u64> {
    let raw = u64::from(nfree).checked_mul(flog_pair_size())?;
    checked_round_up(raw, BTT_ALIGNMENT)
}

/// Plan the first arena of a `file_size`-byte pmemblk file.
pub fn plan_arena(file_size: u64) -> Result<ArenaPlan> {
    let infeasible = || PmpError::LayoutInfeasible { file_size };

    let nfree = BTT_DEFAULT_NFREE;
    // two sectors per free-list slot keep the swap protocol atomic
    let internal_nlba = 2 * u64::from(nfree);
    let flog_size = flog_region_size(nfree).ok_or_else(infeasible)?;

    let arena_size = file_size
        .checked_sub(BLK_POOL_HDR_SIZE)
        .ok_or_else(infeasible)?
        .min(BTT_MAX_ARENA)
        .checked_sub(2 * BTT_INFO_SIZE as u64)
        .and_then(|s| s.checked_sub(flog_size))
        .ok_or_else(infeasible)?;

    let lbasize = arena_size
        .checked_sub(BTT_ALIGNMENT)
        .map(|s| s / internal_nlba)
        .and_then(|s| s.checked_sub(BTT_MAP_ENTRY_SIZE))
        .ok_or_else(infeasible)?
        .max(BTT_MIN_LBA_SIZE);

    // Literal rounding: up to the alignment, then one alignment step back.
    let max_internal_lbasize = checked_round_up(lbasize, BTT_INTERNAL_LBA_ALIGNMENT)
        .and_then(|s| s.checked_sub(BTT_INTERNAL_LBA_ALIGNMENT))
        .ok_or_else(infeasible)?;

    Ok(ArenaPlan {
        file_size,
        nfree,
        internal_nlba,
        flog_size,
        arena_size,
        max_internal_lbasize,
    })
}

/// Largest internal sector size for a file of `file_size` bytes; 0 for an
/// empty file.
pub fn max_internal_sector_size(file_size: u64) -> Result<u64> {
    if file_size == 0 {
        return Ok(0);
    }
    Ok(plan_arena(file_size)?.max_internal_lbasize)
}

/// Whether `candidate` passes the capacity check for `file_size`.
///
/// The check is `candidate >= max_internal_sector_size(file_size)`: the
/// capacity-derived value acts as a floor even though it is computed as a
/// maximum. The direction matches the pool libraries and must not be
/// flipped without changing them too.
pub fn is_sector_size_acceptable(candidate: u64, file_size: u64) -> Result<bool> {
    Ok(candidate >= max_internal_sector_size(file_size)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    const MIN_FEASIBLE: u64 = 38_912;

    #[test]
    fn empty_file_plans_zero() {
        assert_eq!(max_internal_sector_size(0).unwrap(), 0);
        assert!(is_sector_size_acceptable(0, 0).unwrap());
    }

    #[test]
    fn flog_geometry() {
        assert_eq!(flog_pair_size(), 64);
        assert_eq!(flog_region_size(256), Some(16_384));
        assert_eq!(flog_region_size(1), Some(4096));
        assert_eq!(flog_region_size(0), Some(0));
    }

    #[test]
    fn sixteen_mib_pool() {
        let plan = plan_arena(16 << 20).unwrap();
        assert_eq!(plan.internal_nlba, 512);
        assert_eq!(plan.flog_size, 16_384);
        assert_eq!(plan.arena_size, 16_744_448);
        // (16_744_448 - 4096) / 512 - 4 = 32_692 -> 32_768 - 256
        assert_eq!(plan.max_internal_lbasize, 32_512);
    }

    #[test]
    fn one_gib_pool() {
        assert_eq!(max_internal_sector_size(1 << 30).unwrap(), 2_096_896);
    }

    #[test]
    fn arena_is_capped() {
        let capped = max_internal_sector_size(1 << 40).unwrap();
        assert_eq!(capped, 1_073_741_568);
        assert_eq!(max_internal_sector_size(u64::MAX).unwrap(), capped);
        assert_eq!(
            max_internal_sector_size(BTT_MAX_ARENA + BLK_POOL_HDR_SIZE).unwrap(),
            capped
        );
    }

    #[test]
    fn smallest_feasible_file_clamps_to_minimum_then_steps_back() {
        // lbasize computes to 0, clamps to 512, rounds to 512, steps back to 256
        assert_eq!(max_internal_sector_size(MIN_FEASIBLE).unwrap(), 256);
        let err = max_internal_sector_size(MIN_FEASIBLE - 1).unwrap_err();
        assert!(matches!(
            err,
            PmpError::LayoutInfeasible { file_size } if file_size == MIN_FEASIBLE - 1
        ));
    }

    #[test]
    fn tiny_files_are_infeasible_not_wrapped() {
        for size in [1, 4095, BLK_POOL_HDR_SIZE, BLK_POOL_HDR_SIZE + 8192, 36_864] {
            assert!(
                matches!(
                    max_internal_sector_size(size),
                    Err(PmpError::LayoutInfeasible { .. })
                ),
                "size {size} should be infeasible"
            );
            assert!(is_sector_size_acceptable(4096, size).is_err());
        }
    }

    #[test]
    fn aligned_value_steps_back_a_full_alignment() {
        // Choose a size whose raw lbasize lands exactly on a 256 multiple:
        // (arena - 4096) / 512 - 4 = 1024  =>  arena = 4096 + 1028 * 512
        let arena = 4096 + 1028 * 512;
        let file_size = arena + BLK_POOL_HDR_SIZE + 2 * 4096 + 16_384;
        assert_eq!(max_internal_sector_size(file_size).unwrap(), 768);
    }

    #[test]
    fn acceptance_direction_is_literal() {
        let size = 16 << 20;
        assert!(is_sector_size_acceptable(32_512, size).unwrap());
        assert!(is_sector_size_acceptable(1 << 20, size).unwrap());
        assert!(!is_sector_size_acceptable(32_511, size).unwrap());
        assert!(!is_sector_size_acceptable(512, size).unwrap());
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(256))]

        #[test]
        fn non_decreasing_in_file_size(a in MIN_FEASIBLE..(1_u64 << 41), b in MIN_FEASIBLE..(1_u64 << 41)) {
            let (lo, hi) = if a <= b { (a, b) } else { (b, a) };
            prop_assert!(max_internal_sector_size(lo).unwrap() <= max_internal_sector_size(hi).unwrap());
        }

        #[test]
        fn result_is_aligned_and_at_least_256(size in MIN_FEASIBLE..u64::MAX) {
            let m = max_internal_sector_size(size).unwrap();
            prop_assert_eq!(m % BTT_INTERNAL_LBA_ALIGNMENT, 0);
            prop_assert!(m >= BTT_MIN_LBA_SIZE - BTT_INTERNAL_LBA_ALIGNMENT);
        }

        #[test]
        fn acceptance_boundary_is_exact(size in MIN_FEASIBLE..(1_u64 << 41)) {
            let m = max_internal_sector_size(size).unwrap();
            prop_assert!(is_sector_size_acceptable(m, size).unwrap());
            prop_assert!(!is_sector_size_acceptable(m - 1, size).unwrap());
        }
    }
}
