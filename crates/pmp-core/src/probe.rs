//! Pool classification and parameter extraction.
//!
//! The probe never verifies checksums; integrity verdicts belong to
//! [`crate::check`].

use crate::file::PoolFile;
use pmp_error::Result;
use pmp_ondisk::{BlockPoolHeader, ObjectPoolHeader, OnDisk, PoolHeader};
use pmp_types::{PMEMOBJ_MAX_LAYOUT, PoolType, trim_nul_padded};
use std::fs::Metadata;
use std::path::Path;
use tracing::debug;

/// Type-specific payload extracted from the descriptor after the header.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PoolPayload {
    None,
    Block {
        bsize: u32,
    },
    /// Raw layout name bytes, not necessarily NUL-terminated.
    Object {
        layout: [u8; PMEMOBJ_MAX_LAYOUT],
    },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PoolParams {
    pub pool_type: PoolType,
    pub size: u64,
    /// Permission bits of the file.
    pub mode: u32,
    pub payload: PoolPayload,
}

impl PoolParams {
    #[must_use]
    pub const fn block_size(&self) -> Option<u32> {
        match self.payload {
            PoolPayload::Block { bsize } => Some(bsize),
            PoolPayload::None | PoolPayload::Object { .. } => None,
        }
    }

    /// Object layout name, cut at the first NUL and bounded by the field.
    #[must_use]
    pub fn layout_name(&self) -> Option<String> {
        match &self.payload {
            PoolPayload::Object { layout } => Some(trim_nul_padded(layout)),
            PoolPayload::None | PoolPayload::Block { .. } => None,
        }
    }
}

#[cfg(unix)]
fn permission_bits(metadata: &Metadata) -> u32 {
    use std::os::unix::fs::PermissionsExt;
    metadata.permissions().mode() & 0o7777
}

#[cfg(not(unix))]
fn permission_bits(metadata: &Metadata) -> u32 {
    if metadata.permissions().readonly() {
        0o444
    } else {
        0o644
    }
}

/// Open `path`, classify the pool and extract its parameters.
///
/// An unregistered signature is reported as [`PoolType::Unknown`], not as an
/// error, so callers still get the file size and mode.
pub fn probe(path: &Path) -> Result<PoolParams> {
    let mut file = PoolFile::open(path)?;
    let raw = file.read_header()?;
    let header = PoolHeader::from_disk(&raw)?;
    let pool_type = header.pool_type();

    let metadata = file.metadata()?;
    let size = metadata.len();
    let mode = permission_bits(&metadata);

    let payload = match pool_type {
        PoolType::Block => {
            let (desc, _) = file.read_struct::<BlockPoolHeader>(0)?;
            PoolPayload::Block { bsize: desc.bsize }
        }
        PoolType::Object => {
            let (desc, _) = file.read_struct::<ObjectPoolHeader>(0)?;
            PoolPayload::Object {
                layout: desc.layout,
            }
        }
        PoolType::Log | PoolType::Unknown | PoolType::None => PoolPayload::None,
    };

    debug!(
        target: "pmp::probe",
        path = %path.display(),
        pool_type = pool_type.as_str(),
        size,
        mode = format_args!("{mode:o}"),
        "pool_probed"
    );

    Ok(PoolParams {
        pool_type,
        size,
        mode,
        payload,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn payload_accessors() {
        let mut layout = [0_u8; PMEMOBJ_MAX_LAYOUT];
        layout[..5].copy_from_slice(b"hello");
        let params = PoolParams {
            pool_type: PoolType::Object,
            size: 8 << 20,
            mode: 0o644,
            payload: PoolPayload::Object { layout },
        };
        assert_eq!(params.layout_name().as_deref(), Some("hello"));
        assert_eq!(params.block_size(), None);

        let params = PoolParams {
            payload: PoolPayload::Block { bsize: 4096 },
            ..params
        };
        assert_eq!(params.block_size(), Some(4096));
        assert_eq!(params.layout_name(), None);
    }

    #[test]
    fn unterminated_layout_is_bounded() {
        let params = PoolParams {
            pool_type: PoolType::Object,
            size: 0,
            mode: 0,
            payload: PoolPayload::Object {
                layout: [b'x'; PMEMOBJ_MAX_LAYOUT],
            },
        };
        assert_eq!(params.layout_name().map(|name| name.len()), Some(1024));
    }
}
