//! Pool integrity check with optional in-place checksum repair.
//!
//! Checked, in order:
//!
//! 1. pool header signature and checksum;
//! 2. the header's reserved area is zero;
//! 3. block pools: the stored block size fits the file capacity;
//! 4. block pools: the first arena's info block and its backup (signature,
//!    error flag, checksum).
//!
//! Only checksums are repaired. Every repair write goes through the
//! [`PersistHooks`] supplied by the caller.

use crate::arena::read_arena_info;
use crate::file::PoolFile;
use crate::instrument::PersistHooks;
use pmp_btt::{is_sector_size_acceptable, max_internal_sector_size};
use pmp_error::{PmpError, Result};
use pmp_ondisk::{BlockPoolHeader, BttInfo, OnDisk, PoolHeader, insert_checksum, validate_or_repair};
use pmp_types::PoolType;
use serde::Serialize;
use std::path::Path;
use tracing::{debug, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct CheckOptions {
    /// Write corrected checksums back to the file.
    pub repair: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Verdict {
    Ok,
    Repaired,
    Failed,
    Skipped,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CheckItem {
    pub structure: &'static str,
    pub offset: u64,
    pub check: &'static str,
    pub verdict: Verdict,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CheckReport {
    pub pool_type: PoolType,
    pub size: u64,
    pub items: Vec<CheckItem>,
}

impl CheckReport {
    /// No item failed. Repaired items count as consistent.
    #[must_use]
    pub fn is_consistent(&self) -> bool {
        self.items.iter().all(|item| item.verdict != Verdict::Failed)
    }

    #[must_use]
    pub fn count(&self, verdict: Verdict) -> usize {
        self.items.iter().filter(|item| item.verdict == verdict).count()
    }

    fn push(&mut self, structure: &'static str, offset: u64, check: &'static str, verdict: Verdict, detail: Option<String>) {
        self.items.push(CheckItem {
            structure,
            offset,
            check,
            verdict,
            detail,
        });
    }
}

struct Checker<'a> {
    file: PoolFile,
    hooks: &'a dyn PersistHooks,
    repair: bool,
    report: CheckReport,
}

impl Checker<'_> {
    /// Verify the checksum of the `T` image `raw` read at `offset`; repair it
    /// on disk when allowed.
    fn checksum<T: OnDisk>(&mut self, structure: &'static str, offset: u64, raw: &mut [u8]) -> Result<()> {
        let Some(csum_offset) = T::CHECKSUM_OFFSET else {
            return Ok(());
        };
        let verdict = validate_or_repair(raw, csum_offset)?;
        if verdict.valid {
            self.report.push(structure, offset, "checksum", Verdict::Ok, None);
            return Ok(());
        }

        let mismatch = PmpError::ChecksumMismatch {
            structure,
            stored: verdict.stored,
            computed: verdict.checksum,
        };
        warn!(
            target: "pmp::check",
            structure,
            offset,
            stored = verdict.stored,
            computed = verdict.checksum,
            repair = self.repair,
            "checksum_mismatch"
        );
        if !self.repair {
            self.report
                .push(structure, offset, "checksum", Verdict::Failed, Some(mismatch.to_string()));
            return Ok(());
        }

        insert_checksum(raw, csum_offset)?;
        let at = offset + csum_offset as u64;
        self.file.write_at(at, &raw[csum_offset..csum_offset + 8])?;
        self.hooks.persist(at, 8);
        info!(target: "pmp::check", structure, offset = at, checksum = verdict.checksum, "checksum_repaired");
        self.report
            .push(structure, offset, "checksum", Verdict::Repaired, Some(mismatch.to_string()));
        Ok(())
    }

    fn block_size(&mut self, size: u64) -> Result<()> {
        let (desc, _) = self.file.read_struct::<BlockPoolHeader>(0)?;
        let bsize = u64::from(desc.bsize);
        let (verdict, detail) = if bsize == 0 {
            (Verdict::Failed, Some("block size is zero".to_owned()))
        } else {
            // A size the predicate accepts is one the pool libraries refuse.
            match is_sector_size_acceptable(bsize, size) {
                Ok(false) => (Verdict::Ok, None),
                Ok(true) => {
                    let limit = max_internal_sector_size(size)?;
                    (
                        Verdict::Failed,
                        Some(format!("block size {bsize} is not below the limit {limit} for {size} bytes")),
                    )
                }
                Err(err @ PmpError::LayoutInfeasible { .. }) => (Verdict::Failed, Some(err.to_string())),
                Err(err) => return Err(err),
            }
        };
        self.report
            .push(BlockPoolHeader::NAME, PoolHeader::SIZE as u64, "block size", verdict, detail);
        Ok(())
    }

    fn arena(&mut self) -> Result<()> {
        let Some(mut arena) = read_arena_info(&mut self.file)? else {
            self.report.push(
                BttInfo::NAME,
                pmp_btt::BLK_POOL_HDR_SIZE,
                "layout",
                Verdict::Skipped,
                Some("no BTT layout written".to_owned()),
            );
            return Ok(());
        };

        if !arena.info.has_valid_signature() {
            self.report
                .push(BttInfo::NAME, arena.offset, "signature", Verdict::Failed, None);
            return Ok(());
        }
        self.report
            .push(BttInfo::NAME, arena.offset, "signature", Verdict::Ok, None);
        if arena.info.is_error() {
            self.report.push(
                BttInfo::NAME,
                arena.offset,
                "error flag",
                Verdict::Failed,
                Some("arena is marked in error state".to_owned()),
            );
        }

        self.checksum::<BttInfo>(BttInfo::NAME, arena.offset, &mut arena.image)?;

        let size = self.file.size()?;
        match arena.backup_offset() {
            Some(backup) if backup.checked_add(BttInfo::SIZE as u64).is_some_and(|end| end <= size) => {
                let (_, mut raw) = self.file.read_struct::<BttInfo>(backup)?;
                self.checksum::<BttInfo>("BTT info backup", backup, &mut raw)?;
            }
            _ => self.report.push(
                "BTT info backup",
                arena.offset,
                "location",
                Verdict::Failed,
                Some(format!("infooff {} points beyond the file", arena.info.infooff)),
            ),
        }
        Ok(())
    }
}

/// Check the pool at `path`. Structural findings land in the report; only
/// I/O failures and an unreadable header are returned as errors.
pub fn check_pool(path: &Path, options: CheckOptions, hooks: &dyn PersistHooks) -> Result<CheckReport> {
    let file = if options.repair {
        PoolFile::open_writable(path)?
    } else {
        PoolFile::open(path)?
    };
    let mut checker = Checker {
        file,
        hooks,
        repair: options.repair,
        report: CheckReport {
            pool_type: PoolType::None,
            size: 0,
            items: Vec::new(),
        },
    };

    let mut raw = checker.file.read_header()?;
    let header = PoolHeader::from_disk(&raw)?;
    let pool_type = header.pool_type();
    let size = checker.file.size()?;
    checker.report.pool_type = pool_type;
    checker.report.size = size;

    if !pool_type.is_pool() {
        checker.report.push(
            PoolHeader::NAME,
            0,
            "signature",
            Verdict::Failed,
            Some("unknown pool signature".to_owned()),
        );
        return Ok(checker.report);
    }
    checker
        .report
        .push(PoolHeader::NAME, 0, "signature", Verdict::Ok, None);

    if options.repair {
        hooks.register_pmem(0, size);
    }
    checker.checksum::<PoolHeader>(PoolHeader::NAME, 0, &mut raw)?;

    let unused = if header.unused_is_zeroed() {
        Verdict::Ok
    } else {
        Verdict::Failed
    };
    checker.report.push(PoolHeader::NAME, 48, "unused area", unused, None);

    if size < pool_type.min_pool_size() {
        checker.report.push(
            PoolHeader::NAME,
            0,
            "pool size",
            Verdict::Failed,
            Some(format!(
                "{size} bytes is below the {} minimum of {}",
                pool_type,
                pool_type.min_pool_size()
            )),
        );
    }

    if pool_type == PoolType::Block {
        checker.block_size(size)?;
        checker.arena()?;
    }

    debug!(
        target: "pmp::check",
        path = %path.display(),
        items = checker.report.items.len(),
        failed = checker.report.count(Verdict::Failed),
        repaired = checker.report.count(Verdict::Repaired),
        "pool_checked"
    );
    Ok(checker.report)
}
