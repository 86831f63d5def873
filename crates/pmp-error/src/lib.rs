#![forbid(unsafe_code)]
//! Error taxonomy shared by every pmempool-inspect crate.

use pmp_types::ParseError;
use std::io;
use std::path::PathBuf;
use thiserror::Error;

pub type Result<T, E = PmpError> = std::result::Result<T, E>;

#[derive(Debug, Error)]
pub enum PmpError {
    #[error("cannot open {}: {source}", .path.display())]
    Open {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("cannot stat {}: {source}", .path.display())]
    Stat {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("truncated pool header: need {needed} bytes, read {actual}")]
    TruncatedHeader { needed: usize, actual: usize },
    #[error("truncated {structure}: need {needed} bytes, read {actual}")]
    TruncatedPayload {
        structure: &'static str,
        needed: usize,
        actual: usize,
    },
    #[error("read of {len} bytes at offset {offset} failed: {source}")]
    Read {
        offset: u64,
        len: usize,
        #[source]
        source: io::Error,
    },
    #[error("write of {len} bytes at offset {offset} failed: {source}")]
    Write {
        offset: u64,
        len: usize,
        #[source]
        source: io::Error,
    },
    #[error("{structure} checksum mismatch: stored {stored:#018x}, computed {computed:#018x}")]
    ChecksumMismatch {
        structure: &'static str,
        stored: u64,
        computed: u64,
    },
    #[error("file of {file_size} bytes is too small for a BTT arena")]
    LayoutInfeasible { file_size: u64 },
    #[error("invalid range {token:?}")]
    RangeParse { token: String },
    #[error("{value} is outside of [{first}, {last}]")]
    OutOfUniverse { value: u64, first: u64, last: u64 },
    #[error(transparent)]
    Format(#[from] ParseError),
}

impl PmpError {
    /// Stable machine-readable name of the failure class.
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::Open { .. } => "open_error",
            Self::Stat { .. } => "stat_error",
            Self::TruncatedHeader { .. } => "truncated_header",
            Self::TruncatedPayload { .. } => "truncated_payload",
            Self::Read { .. } => "read_error",
            Self::Write { .. } => "write_error",
            Self::ChecksumMismatch { .. } => "checksum_mismatch",
            Self::LayoutInfeasible { .. } => "layout_infeasible",
            Self::RangeParse { .. } => "range_parse_error",
            Self::OutOfUniverse { .. } => "out_of_universe",
            Self::Format(_) => "format_error",
        }
    }
}
