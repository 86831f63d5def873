//! Offset-addressed access to a pool file.
//!
//! The handle is owned by [`PoolFile`] and closed when it drops, so every
//! early return through `?` releases it.

use pmp_error::{PmpError, Result};
use pmp_ondisk::OnDisk;
use pmp_types::POOL_HDR_SIZE;
use std::fs::{File, Metadata, OpenOptions};
use std::io::{self, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

#[derive(Debug)]
pub struct PoolFile {
    file: File,
    path: PathBuf,
}

impl PoolFile {
    /// Open read-only.
    pub fn open(path: &Path) -> Result<Self> {
        let file = File::open(path).map_err(|source| PmpError::Open {
            path: path.to_path_buf(),
            source,
        })?;
        Ok(Self {
            file,
            path: path.to_path_buf(),
        })
    }

    /// Open for reading and in-place repair.
    pub fn open_writable(path: &Path) -> Result<Self> {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .open(path)
            .map_err(|source| PmpError::Open {
                path: path.to_path_buf(),
                source,
            })?;
        Ok(Self {
            file,
            path: path.to_path_buf(),
        })
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn metadata(&self) -> Result<Metadata> {
        self.file.metadata().map_err(|source| PmpError::Stat {
            path: self.path.clone(),
            source,
        })
    }

    pub fn size(&self) -> Result<u64> {
        Ok(self.metadata()?.len())
    }

    /// Fill `buf` from `offset`, stopping early only at end of file.
    /// Returns the number of bytes read.
    pub fn read_at(&mut self, offset: u64, buf: &mut [u8]) -> Result<usize> {
        let len = buf.len();
        let read_error = |source| PmpError::Read {
            offset,
            len,
            source,
        };
        self.file.seek(SeekFrom::Start(offset)).map_err(read_error)?;

        let mut filled = 0;
        while filled < len {
            match self.file.read(&mut buf[filled..]) {
                Ok(0) => break,
                Ok(n) => filled += n,
                Err(err) if err.kind() == io::ErrorKind::Interrupted => {}
                Err(source) => return Err(read_error(source)),
            }
        }
        Ok(filled)
    }

    /// Read the common pool header image; a short file is `TruncatedHeader`.
    pub fn read_header(&mut self) -> Result<Vec<u8>> {
        let mut raw = vec![0_u8; POOL_HDR_SIZE];
        let actual = self.read_at(0, &mut raw)?;
        if actual < POOL_HDR_SIZE {
            return Err(PmpError::TruncatedHeader {
                needed: POOL_HDR_SIZE,
                actual,
            });
        }
        Ok(raw)
    }

    /// Read exactly `len` bytes at `offset`, naming `structure` if the file
    /// ends first.
    pub fn read_exact_at(&mut self, offset: u64, len: usize, structure: &'static str) -> Result<Vec<u8>> {
        let mut raw = vec![0_u8; len];
        let actual = self.read_at(offset, &mut raw)?;
        if actual < len {
            return Err(PmpError::TruncatedPayload {
                structure,
                needed: len,
                actual,
            });
        }
        Ok(raw)
    }

    /// Decode a structure at `offset`, returning it with its disk image.
    pub fn read_struct<T: OnDisk>(&mut self, offset: u64) -> Result<(T, Vec<u8>)> {
        let raw = self.read_exact_at(offset, T::SIZE, T::NAME)?;
        let value = T::from_disk(&raw)?;
        Ok((value, raw))
    }

    pub fn write_at(&mut self, offset: u64, bytes: &[u8]) -> Result<()> {
        let write_error = |source| PmpError::Write {
            offset,
            len: bytes.len(),
            source,
        };
        self.file.seek(SeekFrom::Start(offset)).map_err(write_error)?;
        self.file.write_all(bytes).map_err(write_error)?;
        self.file.sync_data().map_err(write_error)
    }
}
