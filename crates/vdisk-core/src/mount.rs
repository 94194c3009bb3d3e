#![forbid(unsafe_code)]
//! Process-lifetime mount registry.
//!
//! Owned by the front-end (no hidden singleton). Each distinct disk path
//! gets the smallest free letter `a..=z`; each mounted partition gets the
//! smallest free positive index within its disk, composing ids like `vda1`.

use crate::disk::{self, DiskImage};
use crate::mirror;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::info;
use vdisk_error::{Result, VdiskError};

/// One mounted partition: its on-disk name and assigned id.
#[derive(Debug, Clone)]
pub struct MountedPartition {
    pub name: String,
    pub id: String,
    index: u32,
}

/// A disk with at least one mounted partition.
#[derive(Debug, Clone)]
pub struct MountedDisk {
    pub path: PathBuf,
    pub letter: char,
    pub parts: Vec<MountedPartition>,
}

/// Outcome of an unmount, for front-end reporting.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnmountOutcome {
    /// Other partitions remain mounted on the disk.
    DiskRetained,
    /// The disk's table emptied; its letter is reusable.
    DiskReleased,
}

/// In-memory table of mounted partitions.
#[derive(Debug, Default)]
pub struct MountRegistry {
    disks: Vec<MountedDisk>,
}

impl MountRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn disks(&self) -> &[MountedDisk] {
        &self.disks
    }

    /// Mount the named partition of the disk at `path`, returning the
    /// assigned id.
    pub fn mount(&mut self, path: &Path, name: &str) -> Result<String> {
        mirror::ensure_disk_path(path)?;
        let image = DiskImage::open(path)?;
        let mbr = image.read_mbr()?;
        if disk::locate(&image, &mbr, name)?.is_none() {
            return Err(VdiskError::NotFound(format!("partition {name}")));
        }
        let canonical = fs::canonicalize(path)?;

        let letter = match self.disks.iter().position(|disk| disk.path == canonical) {
            Some(at) => self.disks[at].letter,
            None => {
                let letter = self.first_free_letter()?;
                self.disks.push(MountedDisk {
                    path: canonical.clone(),
                    letter,
                    parts: Vec::new(),
                });
                letter
            }
        };

        let disk = self
            .disks
            .iter_mut()
            .find(|disk| disk.path == canonical)
            .ok_or_else(|| VdiskError::NotFound(format!("disk {}", canonical.display())))?;
        if let Some(mounted) = disk.parts.iter().find(|part| part.name == name) {
            return Err(VdiskError::NameInUse(format!(
                "{name} is already mounted as {}",
                mounted.id
            )));
        }

        let index = first_free_index(&disk.parts);
        let id = format!("vd{letter}{index}");
        disk.parts.push(MountedPartition {
            name: name.to_owned(),
            id: id.clone(),
            index,
        });
        info!(target: "vdisk::mount", event = "mounted", id = %id, name, path = %canonical.display());
        Ok(id)
    }

    /// Unmount by id. Releases the disk entry (and its letter) when the
    /// last partition goes away.
    pub fn unmount(&mut self, id: &str) -> Result<UnmountOutcome> {
        let letter = parse_id_letter(id)?;
        let Some(disk_at) = self.disks.iter().position(|disk| disk.letter == letter) else {
            return Err(VdiskError::NotFound(format!("disk letter {letter}")));
        };

        let disk = &mut self.disks[disk_at];
        let Some(part_at) = disk.parts.iter().position(|part| part.id == id) else {
            return Err(VdiskError::NotFound(format!("mounted partition {id}")));
        };
        disk.parts.remove(part_at);
        info!(target: "vdisk::mount", event = "unmounted", id);

        if disk.parts.is_empty() {
            self.disks.remove(disk_at);
            Ok(UnmountOutcome::DiskReleased)
        } else {
            Ok(UnmountOutcome::DiskRetained)
        }
    }

    /// Disk path backing a mounted id (for `rep`).
    pub fn path_for_id(&self, id: &str) -> Result<&Path> {
        let letter = parse_id_letter(id)?;
        let disk = self
            .disks
            .iter()
            .find(|disk| disk.letter == letter)
            .ok_or_else(|| VdiskError::NotFound(format!("disk letter {letter}")))?;
        if disk.parts.iter().any(|part| part.id == id) {
            Ok(&disk.path)
        } else {
            Err(VdiskError::NotFound(format!("mounted partition {id}")))
        }
    }

    fn first_free_letter(&self) -> Result<char> {
        ('a'..='z')
            .find(|candidate| self.disks.iter().all(|disk| disk.letter != *candidate))
            .ok_or_else(|| {
                VdiskError::InvalidArguments("all 26 disk letters are in use".to_owned())
            })
    }
}

fn first_free_index(parts: &[MountedPartition]) -> u32 {
    let mut used: Vec<u32> = parts.iter().map(|part| part.index).collect();
    used.sort_unstable();
    let mut index = 1;
    for taken in used {
        if taken == index {
            index += 1;
        } else if taken > index {
            break;
        }
    }
    index
}

fn parse_id_letter(id: &str) -> Result<char> {
    let bytes = id.as_bytes();
    if !id.starts_with("vd") || bytes.len() < 4 || !bytes[2].is_ascii_lowercase() {
        return Err(VdiskError::InvalidArguments(format!(
            "malformed mount id {id} (expected vd<letter><index>)"
        )));
    }
    Ok(char::from(bytes[2]))
}
