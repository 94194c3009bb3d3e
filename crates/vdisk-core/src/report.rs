#![forbid(unsafe_code)]
//! Layout report: the disk walked into an ordered sequence of typed blocks.
//!
//! Rendering is the front-end's business; this module only produces the
//! block list.

use crate::chain::{self, ChainEntry};
use crate::disk::DiskImage;
use crate::mirror;
use serde::Serialize;
use std::path::Path;
use vdisk_error::Result;
use vdisk_ondisk::{EBR_SIZE, MBR_SIZE};
use vdisk_types::PartitionKind;

/// What a report block describes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum BlockKind {
    Mbr,
    Free,
    Primary,
    Extended,
    Ebr,
    Logical,
}

impl BlockKind {
    #[must_use]
    pub fn label(self) -> &'static str {
        match self {
            Self::Mbr => "MBR",
            Self::Free => "FREE",
            Self::Primary => "PRIMARY",
            Self::Extended => "EXTENDED",
            Self::Ebr => "EBR",
            Self::Logical => "LOGICAL",
        }
    }
}

/// One contiguous byte range of the disk.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LayoutBlock {
    pub name: String,
    pub start: i64,
    pub size: i64,
    pub kind: BlockKind,
}

fn free_block(start: i64, size: i64) -> LayoutBlock {
    LayoutBlock {
        name: String::new(),
        start,
        size,
        kind: BlockKind::Free,
    }
}

/// Walk the image into blocks: the MBR header, used slots with FREE gaps,
/// and the extended partition expanded into its EBR/logical sub-layout.
pub fn build_report(path: &Path) -> Result<Vec<LayoutBlock>> {
    mirror::ensure_disk_path(path)?;
    let image = DiskImage::open(path)?;
    let mbr = image.read_mbr()?;
    let mbr_len = MBR_SIZE as i64;
    let ebr_len = EBR_SIZE as i64;

    let mut blocks = vec![LayoutBlock {
        name: "MBR".to_owned(),
        start: 0,
        size: mbr_len,
        kind: BlockKind::Mbr,
    }];

    let active: Vec<_> = mbr
        .used_slots_sorted()
        .into_iter()
        .filter(|slot| slot.size > 0)
        .collect();

    let mut cursor = mbr_len;
    for slot in &active {
        if slot.start > cursor {
            blocks.push(free_block(cursor, slot.start - cursor));
        }
        let kind = match slot.kind {
            PartitionKind::Primary => BlockKind::Primary,
            PartitionKind::Extended => BlockKind::Extended,
        };
        blocks.push(LayoutBlock {
            name: slot.name.to_string(),
            start: slot.start,
            size: slot.size,
            kind,
        });
        cursor = slot.end();
    }
    if cursor < mbr.size {
        blocks.push(free_block(cursor, mbr.size - cursor));
    }

    // Expand the extended block into its chain sub-layout. An extended
    // partition with no active logicals stays a single EXTENDED block.
    if let Some(ext_index) = mbr.extended_index() {
        let extended = mbr.slots[ext_index];
        let mut entries = chain::read_chain(&image, &extended)?;
        entries.sort_by_key(|entry| entry.pos);
        if !entries.is_empty() {
            blocks = expand_extended(blocks, &entries, ebr_len);
        }
    }

    Ok(blocks)
}

fn expand_extended(blocks: Vec<LayoutBlock>, entries: &[ChainEntry], ebr_len: i64) -> Vec<LayoutBlock> {
    let mut expanded = Vec::with_capacity(blocks.len() + entries.len() * 3);
    for block in blocks {
        if block.kind != BlockKind::Extended {
            expanded.push(block);
            continue;
        }
        let ext_end = block.start + block.size;
        let mut cursor = block.start;
        for entry in entries {
            if entry.pos > cursor {
                expanded.push(free_block(cursor, entry.pos - cursor));
            }
            expanded.push(LayoutBlock {
                name: "EBR".to_owned(),
                start: entry.pos,
                size: ebr_len,
                kind: BlockKind::Ebr,
            });
            expanded.push(LayoutBlock {
                name: entry.ebr.name.to_string(),
                start: entry.ebr.start,
                size: entry.ebr.size,
                kind: BlockKind::Logical,
            });
            cursor = entry.ebr.end();
        }
        if cursor < ext_end {
            expanded.push(free_block(cursor, ext_end - cursor));
        }
    }
    expanded
}
