#![forbid(unsafe_code)]
//! Free-hole arithmetic and fit-policy selection over a linear byte region.

use vdisk_types::FitPolicy;

/// A maximal contiguous run of unallocated bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Hole {
    pub start: i64,
    pub len: i64,
}

/// An allocated extent, `[start, start + len)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Extent {
    pub start: i64,
    pub len: i64,
}

/// Compute the sorted hole list over `[region_start, region_end)` given the
/// used extents sorted by `start`.
///
/// `region_start` already accounts for any reserved prefix (the MBR header
/// at top level, nothing inside an extended partition).
#[must_use]
pub fn compute_holes(used: &[Extent], region_start: i64, region_end: i64) -> Vec<Hole> {
    let mut holes = Vec::new();
    let mut cursor = region_start;
    for extent in used {
        if cursor < extent.start {
            holes.push(Hole {
                start: cursor,
                len: extent.start - cursor,
            });
        }
        cursor = extent.start + extent.len;
    }
    if cursor < region_end {
        holes.push(Hole {
            start: cursor,
            len: region_end - cursor,
        });
    }
    holes
}

/// Pick a hole for `bytes` under `fit`, or `None` when nothing accommodates
/// the request. Placement always begins at the returned hole's `start`.
///
/// Worst-fit picks the globally largest hole first and only then checks it
/// is big enough; ties break toward the lower address for every policy.
#[must_use]
pub fn choose_hole(holes: &[Hole], bytes: i64, fit: FitPolicy) -> Option<Hole> {
    match fit {
        FitPolicy::First => holes.iter().find(|hole| hole.len >= bytes).copied(),
        FitPolicy::Best => holes
            .iter()
            .filter(|hole| hole.len >= bytes)
            .min_by_key(|hole| hole.len)
            .copied(),
        FitPolicy::Worst => holes
            .iter()
            .fold(None, |best: Option<&Hole>, hole| match best {
                // Only a strictly larger hole replaces the pick, so the
                // first of equal maxima wins.
                Some(current) if hole.len <= current.len => Some(current),
                _ => Some(hole),
            })
            .filter(|hole| hole.len >= bytes)
            .copied(),
    }
}

/// Largest hole length, `0` when there are no holes. Used for diagnostics
/// and `NoFit` reporting.
#[must_use]
pub fn largest_hole(holes: &[Hole]) -> i64 {
    holes.iter().map(|hole| hole.len).max().unwrap_or(0)
}
