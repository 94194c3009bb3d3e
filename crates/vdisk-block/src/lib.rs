#![forbid(unsafe_code)]
//! File-backed byte device for VDisk images.
//!
//! Fixed-offset reads and writes with pread/pwrite semantics, bounds-checked
//! against the file length. Each engine operation opens the image, performs
//! its reads and writes, flushes, and drops the handle; no locking is used.

use std::fs::{File, OpenOptions};
use std::io;
use std::os::unix::fs::FileExt;
use std::path::Path;
use tracing::trace;
use vdisk_error::{Result, VdiskError};

/// Chunk size used when zero-filling a byte range.
const ZERO_CHUNK: usize = 64 * 1024;

/// A disk image opened for fixed-offset I/O.
///
/// Uses `std::os::unix::fs::FileExt`, so no shared seek position is
/// involved.
#[derive(Debug)]
pub struct DiskFile {
    file: File,
    len: u64,
    writable: bool,
}

impl DiskFile {
    /// Open an existing image read-write, falling back to read-only.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let (file, writable) = OpenOptions::new()
            .read(true)
            .write(true)
            .open(path)
            .map(|file| (file, true))
            .or_else(|_| {
                OpenOptions::new()
                    .read(true)
                    .open(path)
                    .map(|file| (file, false))
            })
            .map_err(|err| match err.kind() {
                io::ErrorKind::NotFound => {
                    VdiskError::NotFound(format!("disk image {}", path.display()))
                }
                _ => VdiskError::Io(err),
            })?;
        let len = file.metadata()?.len();
        trace!(target: "vdisk::block", event = "open", path = %path.display(), len, writable);
        Ok(Self {
            file,
            len,
            writable,
        })
    }

    /// Create (or truncate) an image of exactly `size` bytes. The tail is
    /// sparse where the filesystem allows it.
    pub fn create(path: impl AsRef<Path>, size: u64) -> Result<Self> {
        let path = path.as_ref();
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(true)
            .open(path)?;
        file.set_len(size)?;
        trace!(target: "vdisk::block", event = "create", path = %path.display(), size);
        Ok(Self {
            file,
            len: size,
            writable: true,
        })
    }

    /// Total image length in bytes.
    #[must_use]
    pub fn len_bytes(&self) -> u64 {
        self.len
    }

    fn check_range(&self, offset: u64, len: usize, op: &'static str) -> Result<()> {
        let len = u64::try_from(len)
            .map_err(|_| VdiskError::Corrupt(format!("{op} length overflows u64")))?;
        let end = offset
            .checked_add(len)
            .ok_or_else(|| VdiskError::Corrupt(format!("{op} range overflows u64")))?;
        if end > self.len {
            return Err(VdiskError::Corrupt(format!(
                "{op} out of bounds: offset={offset} len={len} file_len={}",
                self.len
            )));
        }
        Ok(())
    }

    /// Read exactly `buf.len()` bytes at `offset`.
    pub fn read_exact_at(&self, offset: u64, buf: &mut [u8]) -> Result<()> {
        self.check_range(offset, buf.len(), "read")?;
        self.file.read_exact_at(buf, offset)?;
        Ok(())
    }

    /// Write all bytes in `buf` at `offset`.
    pub fn write_all_at(&self, offset: u64, buf: &[u8]) -> Result<()> {
        if !self.writable {
            return Err(VdiskError::Io(io::Error::from(
                io::ErrorKind::PermissionDenied,
            )));
        }
        self.check_range(offset, buf.len(), "write")?;
        self.file.write_all_at(buf, offset)?;
        Ok(())
    }

    /// Zero-fill `[offset, offset + len)` in bounded chunks.
    pub fn zero_range(&self, offset: u64, len: u64) -> Result<()> {
        self.check_range(
            offset,
            usize::try_from(len).map_err(|_| VdiskError::Corrupt("zero length overflow".into()))?,
            "zero",
        )?;
        let chunk = vec![0_u8; ZERO_CHUNK];
        let mut cursor = offset;
        let mut remaining = len;
        while remaining > 0 {
            let take = remaining.min(ZERO_CHUNK as u64);
            // take <= ZERO_CHUNK
            self.file.write_all_at(&chunk[..take as usize], cursor)?;
            cursor += take;
            remaining -= take;
        }
        Ok(())
    }

    /// Flush pending writes to stable storage.
    pub fn sync(&self) -> Result<()> {
        self.file.sync_all()?;
        Ok(())
    }
}
