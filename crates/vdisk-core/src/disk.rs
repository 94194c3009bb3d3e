#![forbid(unsafe_code)]
//! Record-level access to a disk image: MBR and EBR reads/writes at their
//! absolute offsets, plus name lookup across the whole layout.

use crate::chain::{self, ChainEntry};
use std::path::Path;
use vdisk_block::DiskFile;
use vdisk_error::{Result, VdiskError};
use vdisk_ondisk::{EBR_SIZE, Ebr, MBR_SIZE, Mbr, PartitionSlot};

/// An open disk image with record codec glue on top of the byte device.
#[derive(Debug)]
pub struct DiskImage {
    file: DiskFile,
}

impl DiskImage {
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        Ok(Self {
            file: DiskFile::open(path)?,
        })
    }

    /// Create the backing file of exactly `size` bytes and return the image.
    pub fn create(path: impl AsRef<Path>, size: i64) -> Result<Self> {
        let size = u64::try_from(size)
            .map_err(|_| VdiskError::InvalidArguments("disk size must be positive".to_owned()))?;
        Ok(Self {
            file: DiskFile::create(path, size)?,
        })
    }

    #[must_use]
    pub fn len_bytes(&self) -> u64 {
        self.file.len_bytes()
    }

    pub fn read_mbr(&self) -> Result<Mbr> {
        let mut raw = [0_u8; MBR_SIZE];
        self.file.read_exact_at(0, &mut raw)?;
        Mbr::decode(&raw).map_err(|err| VdiskError::Corrupt(err.to_string()))
    }

    pub fn write_mbr(&self, mbr: &Mbr) -> Result<()> {
        let raw = mbr
            .encode()
            .map_err(|err| VdiskError::Corrupt(err.to_string()))?;
        self.file.write_all_at(0, &raw)
    }

    pub fn read_ebr(&self, pos: i64) -> Result<Ebr> {
        let offset = record_offset(pos)?;
        let mut raw = [0_u8; EBR_SIZE];
        self.file.read_exact_at(offset, &mut raw)?;
        Ebr::decode(&raw, 0).map_err(|err| VdiskError::Corrupt(err.to_string()))
    }

    pub fn write_ebr(&self, pos: i64, ebr: &Ebr) -> Result<()> {
        let offset = record_offset(pos)?;
        let raw = ebr
            .encode()
            .map_err(|err| VdiskError::Corrupt(err.to_string()))?;
        self.file.write_all_at(offset, &raw)
    }

    /// Zero-fill a partition's data byte range.
    pub fn zero_range(&self, start: i64, len: i64) -> Result<()> {
        if len <= 0 {
            return Ok(());
        }
        let start = record_offset(start)?;
        let len =
            u64::try_from(len).map_err(|_| VdiskError::Corrupt("negative zero length".into()))?;
        self.file.zero_range(start, len)
    }

    pub fn sync(&self) -> Result<()> {
        self.file.sync()
    }
}

fn record_offset(pos: i64) -> Result<u64> {
    u64::try_from(pos).map_err(|_| VdiskError::Corrupt(format!("negative record offset {pos}")))
}

/// Where a partition name resolves on a disk.
#[derive(Debug, Clone)]
pub enum Located {
    /// A used MBR slot, primary or extended.
    Slot { index: usize, slot: PartitionSlot },
    /// An active logical partition inside `extended`.
    Logical {
        entry: ChainEntry,
        extended: PartitionSlot,
    },
}

/// Resolve `name` against the MBR slots first, then the EBR chain.
pub fn locate(image: &DiskImage, mbr: &Mbr, name: &str) -> Result<Option<Located>> {
    if let Some(index) = mbr.slot_index_by_name(name) {
        return Ok(Some(Located::Slot {
            index,
            slot: mbr.slots[index],
        }));
    }
    if let Some(ext_index) = mbr.extended_index() {
        let extended = mbr.slots[ext_index];
        let entries = chain::read_chain(image, &extended)?;
        if let Some(entry) = entries.into_iter().find(|entry| entry.ebr.name.matches(name)) {
            return Ok(Some(Located::Logical { entry, extended }));
        }
    }
    Ok(None)
}

/// Whether `name` is taken by any used slot or active logical partition.
pub fn name_in_use(image: &DiskImage, mbr: &Mbr, name: &str) -> Result<bool> {
    Ok(locate(image, mbr, name)?.is_some())
}
