#![forbid(unsafe_code)]
//! Disk and partition operations: the command surface of the layout engine.
//!
//! Each operation opens the image, computes the new layout, writes it back,
//! flushes, and then replays itself against the mirror sibling. Destructive
//! operations are two-phase (`prepare_*` / `commit`); everything else runs
//! to completion synchronously.

use crate::chain;
use crate::disk::{self, DiskImage, Located};
use crate::mirror;
use crate::region::{self, Extent, Hole};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info};
use vdisk_error::{Result, VdiskError};
use vdisk_ondisk::{Ebr, MBR_SIZE, Mbr, PartitionSlot};
use vdisk_types::{FitPolicy, PartName, PartitionKind, SlotStatus};

const MBR_LEN: i64 = MBR_SIZE as i64;

/// What `fdisk` is asked to create.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CreateKind {
    Primary,
    Extended,
    Logical,
}

/// Deletion flavor: `Fast` flips status bits, `Full` also zero-fills the
/// partition data.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeleteMode {
    Fast,
    Full,
}

// ── mkdisk ──────────────────────────────────────────────────────────────────

/// Create the primary image and its mirror sibling, both `size` bytes with
/// a fresh MBR. Parent directories are created as needed.
pub fn create_disk(path: &Path, size: i64, fit: FitPolicy) -> Result<()> {
    mirror::ensure_disk_path(path)?;
    if size < MBR_LEN {
        return Err(VdiskError::InvalidArguments(format!(
            "disk size {size} is smaller than the MBR header ({MBR_LEN} bytes)"
        )));
    }
    if size > i64::from(i32::MAX) {
        return Err(VdiskError::InvalidArguments(format!(
            "disk size {size} exceeds the addressable maximum ({} bytes)",
            i32::MAX
        )));
    }
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)?;
        }
    }

    init_image(path, size, fit)?;
    info!(target: "vdisk::ops", event = "disk_created", path = %path.display(), size, fit = %fit);
    mirror::replay(path, |mirror| init_image(mirror, size, fit))
}

fn init_image(path: &Path, size: i64, fit: FitPolicy) -> Result<()> {
    let image = DiskImage::create(path, size)?;
    image.write_mbr(&Mbr::new(size, fit))?;
    image.sync()
}

// ── rmdisk ──────────────────────────────────────────────────────────────────

/// Pending disk removal, produced by [`prepare_remove_disk`]. Dropping it
/// cancels; `commit` deletes the primary file (the mirror is retained).
#[derive(Debug)]
pub struct PendingRemoveDisk {
    path: PathBuf,
}

impl PendingRemoveDisk {
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn commit(self) -> Result<()> {
        fs::remove_file(&self.path)?;
        info!(target: "vdisk::ops", event = "disk_removed", path = %self.path.display());
        Ok(())
    }
}

/// Validate a disk-removal request without touching the filesystem.
pub fn prepare_remove_disk(path: &Path) -> Result<PendingRemoveDisk> {
    mirror::ensure_disk_path(path)?;
    if !path.is_file() {
        return Err(VdiskError::NotFound(format!(
            "disk image {}",
            path.display()
        )));
    }
    Ok(PendingRemoveDisk {
        path: path.to_path_buf(),
    })
}

// ── fdisk: create ───────────────────────────────────────────────────────────

/// Create a primary, extended, or logical partition.
///
/// For logical partitions the fit argument is ignored: the extended
/// partition's recorded fit governs both hole selection and the new EBR.
pub fn create_partition(
    path: &Path,
    name: &str,
    kind: CreateKind,
    size: i64,
    fit: FitPolicy,
) -> Result<()> {
    mirror::ensure_disk_path(path)?;
    if size <= 0 {
        return Err(VdiskError::InvalidArguments(
            "partition size must be greater than zero".to_owned(),
        ));
    }

    match kind {
        CreateKind::Primary => create_slot_on(path, name, PartitionKind::Primary, size, fit, false),
        CreateKind::Extended => {
            create_slot_on(path, name, PartitionKind::Extended, size, fit, false)
        }
        CreateKind::Logical => create_logical_on(path, name, size, false),
    }?;

    let silent = true;
    mirror::replay(path, |mirror| match kind {
        CreateKind::Primary => {
            create_slot_on(mirror, name, PartitionKind::Primary, size, fit, silent)
        }
        CreateKind::Extended => {
            create_slot_on(mirror, name, PartitionKind::Extended, size, fit, silent)
        }
        CreateKind::Logical => create_logical_on(mirror, name, size, silent),
    })
}

fn top_level_extents(mbr: &Mbr) -> Vec<Extent> {
    mbr.used_slots_sorted()
        .iter()
        .map(|slot| Extent {
            start: slot.start,
            len: slot.size,
        })
        .collect()
}

fn create_slot_on(
    path: &Path,
    name: &str,
    kind: PartitionKind,
    size: i64,
    fit: FitPolicy,
    silent: bool,
) -> Result<()> {
    let image = DiskImage::open(path)?;
    let mut mbr = image.read_mbr()?;

    let Some(slot_index) = mbr.free_slot_index() else {
        return Err(VdiskError::NoFreeSlot);
    };
    if kind == PartitionKind::Extended && mbr.extended_index().is_some() {
        return Err(VdiskError::ExtendedExists);
    }
    if disk::name_in_use(&image, &mbr, name)? {
        return Err(VdiskError::NameInUse(name.to_owned()));
    }

    let holes = region::compute_holes(&top_level_extents(&mbr), MBR_LEN, mbr.size);
    let largest = region::largest_hole(&holes);
    if silent {
        debug!(target: "vdisk::ops", event = "space_check", available = largest, needed = size);
    } else {
        info!(target: "vdisk::ops", event = "space_check", available = largest, needed = size);
    }
    let Some(hole) = region::choose_hole(&holes, size, fit) else {
        return Err(VdiskError::NoFit {
            requested: size,
            largest,
        });
    };

    mbr.slots[slot_index] = PartitionSlot {
        status: SlotStatus::Used,
        kind,
        fit,
        start: hole.start,
        size,
        name: PartName::new(name),
    };
    if kind == PartitionKind::Extended {
        image.write_ebr(hole.start, &Ebr::sentinel(fit, hole.start))?;
    }
    image.write_mbr(&mbr)?;
    image.sync()?;

    if !silent {
        info!(
            target: "vdisk::ops",
            event = "partition_created",
            path = %path.display(),
            name,
            kind = %kind,
            start = hole.start,
            size
        );
    }
    Ok(())
}

fn create_logical_on(path: &Path, name: &str, size: i64, silent: bool) -> Result<()> {
    let image = DiskImage::open(path)?;
    let mbr = image.read_mbr()?;
    let Some(ext_index) = mbr.extended_index() else {
        return Err(VdiskError::NotFound("extended partition".to_owned()));
    };
    let extended = mbr.slots[ext_index];
    if disk::name_in_use(&image, &mbr, name)? {
        return Err(VdiskError::NameInUse(name.to_owned()));
    }

    let entries = chain::read_chain(&image, &extended)?;
    let pos = chain::create_logical(&image, &extended, &entries, name, size)?;
    image.sync()?;

    if !silent {
        info!(
            target: "vdisk::ops",
            event = "partition_created",
            path = %path.display(),
            name,
            kind = "logical",
            pos,
            size
        );
    }
    Ok(())
}

// ── fdisk: add ──────────────────────────────────────────────────────────────

/// Resize the named partition by `delta` bytes (negative shrinks). Returns
/// the new size. Logical names delegate to the EBR chain.
pub fn resize_partition(path: &Path, name: &str, delta: i64) -> Result<i64> {
    mirror::ensure_disk_path(path)?;
    if delta == 0 {
        return Err(VdiskError::InvalidArguments(
            "resize delta must be non-zero".to_owned(),
        ));
    }

    let new_size = resize_on(path, name, delta)?;
    info!(
        target: "vdisk::ops",
        event = "partition_resized",
        path = %path.display(),
        name,
        delta,
        new_size
    );
    mirror::replay(path, |mirror| resize_on(mirror, name, delta).map(|_| ()))?;
    Ok(new_size)
}

fn resize_on(path: &Path, name: &str, delta: i64) -> Result<i64> {
    let image = DiskImage::open(path)?;
    let mut mbr = image.read_mbr()?;

    match disk::locate(&image, &mbr, name)? {
        Some(Located::Slot { index, slot }) => {
            let new_size = slot.size + delta;
            if new_size <= 0 {
                return Err(VdiskError::WouldUnderflow {
                    current: slot.size,
                    delta,
                });
            }
            if delta > 0 {
                let holes = region::compute_holes(&top_level_extents(&mbr), MBR_LEN, mbr.size);
                let available = adjacent_hole(&holes, slot.end()).map_or(0, |hole| hole.len);
                if available < delta {
                    return Err(VdiskError::WouldExpandIntoUsed {
                        available,
                        requested: delta,
                    });
                }
            }
            mbr.slots[index].size = new_size;
            image.write_mbr(&mbr)?;
            image.sync()?;
            Ok(new_size)
        }
        Some(Located::Logical { extended, .. }) => {
            let entries = chain::read_chain(&image, &extended)?;
            let new_size = chain::resize_logical(&image, &extended, &entries, name, delta)?;
            image.sync()?;
            Ok(new_size)
        }
        None => Err(VdiskError::NotFound(format!("partition {name}"))),
    }
}

/// The free hole that begins exactly at `end`, if any.
fn adjacent_hole(holes: &[Hole], end: i64) -> Option<Hole> {
    holes.iter().copied().find(|hole| hole.start == end)
}

// ── fdisk: delete ───────────────────────────────────────────────────────────

/// Pending partition deletion, produced by [`prepare_delete_partition`].
#[derive(Debug)]
pub struct PendingDelete {
    path: PathBuf,
    name: String,
    kind: String,
}

impl PendingDelete {
    /// Human-readable kind of the located target (for the confirmation
    /// prompt).
    #[must_use]
    pub fn kind(&self) -> &str {
        &self.kind
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn commit(self, mode: DeleteMode) -> Result<()> {
        delete_on(&self.path, &self.name, mode)?;
        info!(
            target: "vdisk::ops",
            event = "partition_deleted",
            path = %self.path.display(),
            name = %self.name,
            kind = %self.kind,
            mode = ?mode
        );
        mirror::replay(&self.path, |mirror| delete_on(mirror, &self.name, mode))
    }
}

/// Locate the deletion target without mutating anything. The front-end
/// confirms before calling `commit`.
pub fn prepare_delete_partition(path: &Path, name: &str) -> Result<PendingDelete> {
    mirror::ensure_disk_path(path)?;
    let image = DiskImage::open(path)?;
    let mbr = image.read_mbr()?;
    let kind = match disk::locate(&image, &mbr, name)? {
        Some(Located::Slot { slot, .. }) => slot.kind.to_string(),
        Some(Located::Logical { .. }) => "logical".to_owned(),
        None => return Err(VdiskError::NotFound(format!("partition {name}"))),
    };
    Ok(PendingDelete {
        path: path.to_path_buf(),
        name: name.to_owned(),
        kind,
    })
}

fn delete_on(path: &Path, name: &str, mode: DeleteMode) -> Result<()> {
    let image = DiskImage::open(path)?;
    let mut mbr = image.read_mbr()?;
    let zero_data = mode == DeleteMode::Full;

    match disk::locate(&image, &mbr, name)? {
        Some(Located::Slot { index, slot }) => {
            if slot.kind == PartitionKind::Extended {
                let entries = chain::read_chain(&image, &slot)?;
                chain::free_all_entries(&image, &entries)?;
            }
            mbr.slots[index].status = SlotStatus::Free;
            if zero_data {
                image.zero_range(slot.start, slot.size)?;
            }
            image.write_mbr(&mbr)?;
            image.sync()
        }
        Some(Located::Logical { extended, .. }) => {
            let entries = chain::read_chain(&image, &extended)?;
            chain::delete_logical(&image, &entries, name, zero_data)?;
            image.sync()
        }
        None => Err(VdiskError::NotFound(format!("partition {name}"))),
    }
}
