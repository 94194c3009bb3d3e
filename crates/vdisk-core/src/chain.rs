#![forbid(unsafe_code)]
//! EBR chain operations inside an extended partition.
//!
//! The chain is a singly-linked list of fixed-size headers addressed by
//! absolute byte offsets. `next` fields are untrusted: traversal validates
//! every link against the extended region, falls back to physical advance,
//! and is capped so a corrupt image can never loop.

use crate::disk::DiskImage;
use crate::region::{Hole, choose_hole, largest_hole};
use tracing::debug;
use vdisk_error::{Result, VdiskError};
use vdisk_ondisk::{EBR_SIZE, Ebr, PartitionSlot};
use vdisk_types::{END_OF_CHAIN, PartName, SlotStatus};

const EBR_LEN: i64 = EBR_SIZE as i64;

/// An active EBR together with its absolute byte offset.
#[derive(Debug, Clone, Copy)]
pub struct ChainEntry {
    pub ebr: Ebr,
    pub pos: i64,
}

impl ChainEntry {
    /// Exclusive end of the header-plus-data span this entry occupies.
    #[must_use]
    pub fn span_end(&self) -> i64 {
        self.pos + EBR_LEN + self.ebr.size
    }
}

/// Walk the chain and collect active entries in traversal order.
///
/// A `next` link wins when it strictly advances and the full header fits in
/// the extended region; otherwise the walk advances physically past the
/// current entry's data. Iterations are capped at `E.size / EBR_SIZE + 10`.
pub fn read_chain(image: &DiskImage, extended: &PartitionSlot) -> Result<Vec<ChainEntry>> {
    let ext_start = extended.start;
    let ext_end = extended.end();
    let max_iter = extended.size.max(0) / EBR_LEN + 10;

    let mut entries = Vec::new();
    let mut pos = ext_start;
    let mut iter = 0_i64;
    while pos >= ext_start && pos + EBR_LEN <= ext_end && iter < max_iter {
        let Ok(ebr) = image.read_ebr(pos) else {
            break;
        };
        if ebr.is_used() {
            entries.push(ChainEntry { ebr, pos });
        }

        let candidate = pos + EBR_LEN + ebr.size.max(0);
        let next = ebr.next;
        if next > pos && next >= ext_start && next + EBR_LEN <= ext_end {
            pos = next;
        } else if candidate > pos && candidate + EBR_LEN <= ext_end {
            pos = candidate;
        } else {
            break;
        }
        iter += 1;
    }
    Ok(entries)
}

/// Free holes inside the extended partition, derived from the active
/// entries. Each active entry occupies `[pos, pos + EBR_SIZE + size)`.
#[must_use]
pub fn holes_in_extended(extended: &PartitionSlot, entries: &[ChainEntry]) -> Vec<Hole> {
    let ext_start = extended.start;
    let ext_end = extended.end();
    if entries.is_empty() {
        return vec![Hole {
            start: ext_start,
            len: extended.size,
        }];
    }

    let mut sorted: Vec<ChainEntry> = entries.to_vec();
    sorted.sort_by_key(|entry| entry.pos);

    let mut holes = Vec::new();
    let first = sorted[0].pos;
    if first > ext_start {
        holes.push(Hole {
            start: ext_start,
            len: first - ext_start,
        });
    }
    for pair in sorted.windows(2) {
        let gap_start = pair[0].span_end();
        let gap_end = pair[1].pos;
        if gap_end > gap_start {
            holes.push(Hole {
                start: gap_start,
                len: gap_end - gap_start,
            });
        }
    }
    let tail = sorted[sorted.len() - 1].span_end();
    if tail < ext_end {
        holes.push(Hole {
            start: tail,
            len: ext_end - tail,
        });
    }
    holes
}

/// Find the active entry named `name`.
#[must_use]
pub fn entry_by_name(entries: &[ChainEntry], name: &str) -> Option<ChainEntry> {
    entries
        .iter()
        .copied()
        .find(|entry| entry.ebr.name.matches(name))
}

/// Place a new logical partition of `size` data bytes and repair the chain
/// links around it. Returns the EBR position chosen.
///
/// The hole request is `size + EBR_SIZE`; the fit policy is the extended
/// partition's own, as recorded at creation time.
pub fn create_logical(
    image: &DiskImage,
    extended: &PartitionSlot,
    entries: &[ChainEntry],
    name: &str,
    size: i64,
) -> Result<i64> {
    let holes = holes_in_extended(extended, entries);
    let requested = size + EBR_LEN;
    let Some(hole) = choose_hole(&holes, requested, extended.fit) else {
        return Err(VdiskError::NoFit {
            requested,
            largest: largest_hole(&holes),
        });
    };
    let pos_ebr = hole.start;
    if pos_ebr < extended.start || pos_ebr + requested > extended.end() {
        return Err(VdiskError::Corrupt(format!(
            "chosen hole escapes the extended region: pos={pos_ebr} requested={requested}"
        )));
    }

    let mut sorted: Vec<ChainEntry> = entries.to_vec();
    sorted.sort_by_key(|entry| entry.pos);
    let prev = sorted.iter().rev().find(|entry| entry.pos < pos_ebr);
    let next = sorted.iter().find(|entry| entry.pos > pos_ebr);

    let new = Ebr {
        status: SlotStatus::Used,
        fit: extended.fit,
        start: pos_ebr + EBR_LEN,
        size,
        next: next.map_or(END_OF_CHAIN, |entry| entry.pos),
        name: PartName::new(name),
    };

    if let Some(prev) = prev {
        let mut repaired = prev.ebr;
        repaired.next = pos_ebr;
        image.write_ebr(prev.pos, &repaired)?;
    }
    image.write_ebr(pos_ebr, &new)?;
    debug!(
        target: "vdisk::chain",
        event = "logical_placed",
        name = %new.name,
        pos = pos_ebr,
        start = new.start,
        size
    );
    Ok(pos_ebr)
}

/// Grow or shrink the named logical partition in place. Returns the new
/// data size.
///
/// The expansion bound is the physically next active entry, or the end of
/// the extended region for the last one.
pub fn resize_logical(
    image: &DiskImage,
    extended: &PartitionSlot,
    entries: &[ChainEntry],
    name: &str,
    delta: i64,
) -> Result<i64> {
    let Some(target) = entry_by_name(entries, name) else {
        return Err(VdiskError::NotFound(format!("logical partition {name}")));
    };

    let new_size = target.ebr.size + delta;
    if new_size <= 0 {
        return Err(VdiskError::WouldUnderflow {
            current: target.ebr.size,
            delta,
        });
    }
    if delta > 0 {
        let data_end = target.ebr.end();
        let bound = entries
            .iter()
            .filter(|entry| entry.pos > target.pos)
            .map(|entry| entry.pos)
            .min()
            .unwrap_or_else(|| extended.end());
        let available = bound - data_end;
        if delta > available {
            return Err(VdiskError::WouldExpandIntoUsed {
                available,
                requested: delta,
            });
        }
    }

    let mut updated = target.ebr;
    updated.size = new_size;
    image.write_ebr(target.pos, &updated)?;
    Ok(new_size)
}

/// Flip the named logical partition to free. Links are not rewritten;
/// traversal tolerates freed entries. Zero-fills the data range on `full`.
pub fn delete_logical(
    image: &DiskImage,
    entries: &[ChainEntry],
    name: &str,
    zero_data: bool,
) -> Result<()> {
    let Some(target) = entry_by_name(entries, name) else {
        return Err(VdiskError::NotFound(format!("logical partition {name}")));
    };
    let mut freed = target.ebr;
    freed.status = SlotStatus::Free;
    image.write_ebr(target.pos, &freed)?;
    if zero_data {
        image.zero_range(target.ebr.start, target.ebr.size)?;
    }
    Ok(())
}

/// Mark every active EBR in the chain free (extended-partition deletion).
pub fn free_all_entries(image: &DiskImage, entries: &[ChainEntry]) -> Result<()> {
    for entry in entries {
        let mut freed = entry.ebr;
        freed.status = SlotStatus::Free;
        image.write_ebr(entry.pos, &freed)?;
    }
    Ok(())
}
