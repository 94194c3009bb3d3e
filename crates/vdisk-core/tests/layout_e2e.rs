#![forbid(unsafe_code)]
//! End-to-end layout scenarios over real temp-dir images.

use std::fs;
use std::path::{Path, PathBuf};
use vdisk_core::ops::{
    CreateKind, DeleteMode, create_disk, create_partition, prepare_delete_partition,
    resize_partition,
};
use vdisk_core::{DiskImage, chain, mirror_path};
use vdisk_error::VdiskError;
use vdisk_ondisk::{EBR_SIZE, MBR_SIZE};
use vdisk_types::FitPolicy;

const MIB: i64 = 1024 * 1024;
const KIB: i64 = 1024;
const MBR_LEN: i64 = MBR_SIZE as i64;
const EBR_LEN: i64 = EBR_SIZE as i64;

fn new_disk(dir: &Path, name: &str, size: i64, fit: FitPolicy) -> PathBuf {
    let path = dir.join(name);
    create_disk(&path, size, fit).unwrap();
    path
}

fn delete(path: &Path, name: &str, mode: DeleteMode) {
    prepare_delete_partition(path, name)
        .unwrap()
        .commit(mode)
        .unwrap();
}

fn slot_start(path: &Path, name: &str) -> i64 {
    let image = DiskImage::open(path).unwrap();
    let mbr = image.read_mbr().unwrap();
    let index = mbr.slot_index_by_name(name).unwrap();
    mbr.slots[index].start
}

#[test]
fn sequential_primaries_first_fit() {
    let dir = tempfile::tempdir().unwrap();
    let path = new_disk(dir.path(), "seq.disk", 10 * MIB, FitPolicy::First);

    for name in ["A", "B", "C"] {
        create_partition(&path, name, CreateKind::Primary, 3 * MIB, FitPolicy::First).unwrap();
    }
    assert_eq!(slot_start(&path, "A"), MBR_LEN);
    assert_eq!(slot_start(&path, "B"), MBR_LEN + 3 * MIB);
    assert_eq!(slot_start(&path, "C"), MBR_LEN + 6 * MIB);

    let err =
        create_partition(&path, "D", CreateKind::Primary, 3 * MIB, FitPolicy::First).unwrap_err();
    assert!(matches!(err, VdiskError::NoFit { .. }));
}

#[test]
fn worst_fit_picks_the_largest_hole() {
    let dir = tempfile::tempdir().unwrap();
    let path = new_disk(dir.path(), "wf.disk", 10 * MIB, FitPolicy::First);

    for name in ["A", "B", "C"] {
        create_partition(&path, name, CreateKind::Primary, 3 * MIB, FitPolicy::First).unwrap();
    }
    delete(&path, "B", DeleteMode::Fast);

    // B's 3M hole beats the sub-1M tail hole.
    create_partition(&path, "X", CreateKind::Primary, MIB, FitPolicy::Worst).unwrap();
    assert_eq!(slot_start(&path, "X"), MBR_LEN + 3 * MIB);
}

#[test]
fn extended_with_three_logicals() {
    let dir = tempfile::tempdir().unwrap();
    let path = new_disk(dir.path(), "ext.disk", 5 * MIB, FitPolicy::First);

    create_partition(&path, "E", CreateKind::Extended, 4 * MIB, FitPolicy::First).unwrap();
    assert_eq!(slot_start(&path, "E"), MBR_LEN);

    for name in ["L1", "L2", "L3"] {
        create_partition(&path, name, CreateKind::Logical, MIB, FitPolicy::First).unwrap();
    }

    let image = DiskImage::open(&path).unwrap();
    let mbr = image.read_mbr().unwrap();
    let extended = mbr.slots[mbr.extended_index().unwrap()];
    let entries = chain::read_chain(&image, &extended).unwrap();

    let names: Vec<String> = entries
        .iter()
        .map(|entry| entry.ebr.name.to_string())
        .collect();
    assert_eq!(names, ["L1", "L2", "L3"]);

    let positions: Vec<i64> = entries.iter().map(|entry| entry.pos).collect();
    assert_eq!(
        positions,
        [
            MBR_LEN,
            MBR_LEN + EBR_LEN + MIB,
            MBR_LEN + 2 * (EBR_LEN + MIB),
        ]
    );
    for entry in &entries {
        assert_eq!(entry.ebr.start, entry.pos + EBR_LEN);
    }
}

#[test]
fn logical_hole_reuse_after_delete() {
    let dir = tempfile::tempdir().unwrap();
    let path = new_disk(dir.path(), "reuse.disk", 5 * MIB, FitPolicy::First);

    create_partition(&path, "E", CreateKind::Extended, 4 * MIB, FitPolicy::First).unwrap();
    for name in ["L1", "L2", "L3"] {
        create_partition(&path, name, CreateKind::Logical, MIB, FitPolicy::First).unwrap();
    }
    delete(&path, "L2", DeleteMode::Fast);

    create_partition(&path, "L2b", CreateKind::Logical, 900 * KIB, FitPolicy::First).unwrap();

    let image = DiskImage::open(&path).unwrap();
    let mbr = image.read_mbr().unwrap();
    let extended = mbr.slots[mbr.extended_index().unwrap()];
    let entries = chain::read_chain(&image, &extended).unwrap();
    let l2b = entries
        .iter()
        .find(|entry| entry.ebr.name.matches("L2b"))
        .unwrap();
    assert_eq!(l2b.pos, MBR_LEN + EBR_LEN + MIB);
    assert_eq!(l2b.ebr.size, 900 * KIB);
}

#[test]
fn mirror_parity_after_delete_extended() {
    let dir = tempfile::tempdir().unwrap();
    let path = new_disk(dir.path(), "par.disk", 5 * MIB, FitPolicy::First);
    let raid = mirror_path(&path).unwrap();
    assert!(raid.is_file());

    create_partition(&path, "E", CreateKind::Extended, 4 * MIB, FitPolicy::First).unwrap();
    let mut ebr_positions = Vec::new();
    for name in ["L1", "L2", "L3"] {
        create_partition(&path, name, CreateKind::Logical, MIB, FitPolicy::First).unwrap();
    }
    {
        let image = DiskImage::open(&path).unwrap();
        let mbr = image.read_mbr().unwrap();
        let extended = mbr.slots[mbr.extended_index().unwrap()];
        for entry in chain::read_chain(&image, &extended).unwrap() {
            ebr_positions.push(entry.pos);
        }
    }
    assert_eq!(ebr_positions.len(), 3);

    delete(&path, "E", DeleteMode::Fast);

    let primary = fs::read(&path).unwrap();
    let sibling = fs::read(&raid).unwrap();
    assert_eq!(primary[..MBR_SIZE], sibling[..MBR_SIZE]);
    for pos in ebr_positions {
        let at = usize::try_from(pos).unwrap();
        assert_eq!(primary[at..at + EBR_SIZE], sibling[at..at + EBR_SIZE]);
        // The status byte is cleared, the rest of the record survives.
        assert_eq!(primary[at], 0);
    }

    let image = DiskImage::open(&path).unwrap();
    let mbr = image.read_mbr().unwrap();
    assert_eq!(mbr.extended_index(), None);
    assert!(mbr.slots.iter().all(|slot| !slot.is_used()));
}

#[test]
fn resize_bounds() {
    let dir = tempfile::tempdir().unwrap();
    let path = new_disk(dir.path(), "rs.disk", 5 * MIB, FitPolicy::First);

    create_partition(&path, "A", CreateKind::Primary, MIB, FitPolicy::First).unwrap();
    create_partition(&path, "B", CreateKind::Primary, MIB, FitPolicy::First).unwrap();

    // B sits immediately after A: no room to grow.
    let err = resize_partition(&path, "A", 512 * KIB).unwrap_err();
    assert!(matches!(err, VdiskError::WouldExpandIntoUsed { .. }));

    let err = resize_partition(&path, "A", -2 * MIB).unwrap_err();
    assert!(matches!(err, VdiskError::WouldUnderflow { .. }));

    assert_eq!(resize_partition(&path, "A", -512 * KIB).unwrap(), 512 * KIB);
    let image = DiskImage::open(&path).unwrap();
    let mbr = image.read_mbr().unwrap();
    let index = mbr.slot_index_by_name("A").unwrap();
    assert_eq!(mbr.slots[index].size, 512 * KIB);

    // The shrink opened a hole after A; growth within it now succeeds.
    assert_eq!(resize_partition(&path, "A", 256 * KIB).unwrap(), 768 * KIB);

    // The mirror followed every step.
    let raid = mirror_path(&path).unwrap();
    let primary = fs::read(&path).unwrap();
    let sibling = fs::read(&raid).unwrap();
    assert_eq!(primary[..MBR_SIZE], sibling[..MBR_SIZE]);
}

#[test]
fn exact_fit_boundary() {
    let dir = tempfile::tempdir().unwrap();
    let path = new_disk(dir.path(), "exact.disk", MIB, FitPolicy::First);
    let largest = MIB - MBR_LEN;

    let err = create_partition(
        &path,
        "over",
        CreateKind::Primary,
        largest + 1,
        FitPolicy::First,
    )
    .unwrap_err();
    assert!(matches!(err, VdiskError::NoFit { .. }));

    create_partition(&path, "exact", CreateKind::Primary, largest, FitPolicy::First).unwrap();
    assert_eq!(slot_start(&path, "exact"), MBR_LEN);
}

#[test]
fn logical_fit_accounts_for_the_ebr_header() {
    let dir = tempfile::tempdir().unwrap();
    let size = 64 * KIB;

    // Hole of exactly size + EBR: fits.
    let path = new_disk(dir.path(), "fits.disk", MIB, FitPolicy::First);
    create_partition(&path, "E", CreateKind::Extended, size + EBR_LEN, FitPolicy::First).unwrap();
    create_partition(&path, "L", CreateKind::Logical, size, FitPolicy::First).unwrap();

    // One byte short: the header no longer fits alongside the data.
    let path = new_disk(dir.path(), "short.disk", MIB, FitPolicy::First);
    create_partition(
        &path,
        "E",
        CreateKind::Extended,
        size + EBR_LEN - 1,
        FitPolicy::First,
    )
    .unwrap();
    let err = create_partition(&path, "L", CreateKind::Logical, size, FitPolicy::First).unwrap_err();
    assert!(matches!(err, VdiskError::NoFit { .. }));
}

#[test]
fn delete_then_recreate_same_name() {
    let dir = tempfile::tempdir().unwrap();
    let path = new_disk(dir.path(), "re.disk", MIB, FitPolicy::First);

    create_partition(&path, "data", CreateKind::Primary, 64 * KIB, FitPolicy::First).unwrap();
    let err =
        create_partition(&path, "data", CreateKind::Primary, 64 * KIB, FitPolicy::First).unwrap_err();
    assert!(matches!(err, VdiskError::NameInUse(_)));

    delete(&path, "data", DeleteMode::Fast);
    create_partition(&path, "data", CreateKind::Primary, 64 * KIB, FitPolicy::First).unwrap();
}

#[test]
fn full_delete_zeroes_the_data_range() {
    let dir = tempfile::tempdir().unwrap();
    let path = new_disk(dir.path(), "full.disk", MIB, FitPolicy::First);

    create_partition(&path, "data", CreateKind::Primary, 4 * KIB, FitPolicy::First).unwrap();
    let start = slot_start(&path, "data");

    // Scribble into the partition data.
    {
        use std::io::{Seek, SeekFrom, Write};
        let mut file = fs::OpenOptions::new().write(true).open(&path).unwrap();
        file.seek(SeekFrom::Start(u64::try_from(start).unwrap()))
            .unwrap();
        file.write_all(&vec![0xCD_u8; 4 * KIB as usize]).unwrap();
    }

    delete(&path, "data", DeleteMode::Full);

    let bytes = fs::read(&path).unwrap();
    let at = usize::try_from(start).unwrap();
    assert!(bytes[at..at + 4 * KIB as usize].iter().all(|b| *b == 0));
}

#[test]
fn second_extended_is_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let path = new_disk(dir.path(), "two-ext.disk", MIB, FitPolicy::First);

    create_partition(&path, "E1", CreateKind::Extended, 128 * KIB, FitPolicy::First).unwrap();
    let err =
        create_partition(&path, "E2", CreateKind::Extended, 128 * KIB, FitPolicy::First).unwrap_err();
    assert!(matches!(err, VdiskError::ExtendedExists));
}

#[test]
fn slot_exhaustion() {
    let dir = tempfile::tempdir().unwrap();
    let path = new_disk(dir.path(), "slots.disk", MIB, FitPolicy::First);

    for name in ["p1", "p2", "p3", "p4"] {
        create_partition(&path, name, CreateKind::Primary, 16 * KIB, FitPolicy::First).unwrap();
    }
    let err =
        create_partition(&path, "p5", CreateKind::Primary, 16 * KIB, FitPolicy::First).unwrap_err();
    assert!(matches!(err, VdiskError::NoFreeSlot));
}

#[test]
fn resize_missing_partition_is_not_found() {
    let dir = tempfile::tempdir().unwrap();
    let path = new_disk(dir.path(), "miss.disk", MIB, FitPolicy::First);
    assert!(matches!(
        resize_partition(&path, "ghost", KIB).unwrap_err(),
        VdiskError::NotFound(_)
    ));
    assert!(matches!(
        prepare_delete_partition(&path, "ghost").unwrap_err(),
        VdiskError::NotFound(_)
    ));
}

#[test]
fn logical_resize_respects_neighbors() {
    let dir = tempfile::tempdir().unwrap();
    let path = new_disk(dir.path(), "lrs.disk", 5 * MIB, FitPolicy::First);

    create_partition(&path, "E", CreateKind::Extended, 4 * MIB, FitPolicy::First).unwrap();
    create_partition(&path, "L1", CreateKind::Logical, MIB, FitPolicy::First).unwrap();
    create_partition(&path, "L2", CreateKind::Logical, MIB, FitPolicy::First).unwrap();

    // L2's header sits right after L1's data.
    let err = resize_partition(&path, "L1", KIB).unwrap_err();
    assert!(matches!(err, VdiskError::WouldExpandIntoUsed { .. }));

    // The last logical may grow into the extended tail.
    let grown = resize_partition(&path, "L2", 512 * KIB).unwrap();
    assert_eq!(grown, MIB + 512 * KIB);

    // But not past the end of the extended region.
    let err = resize_partition(&path, "L2", 2 * MIB).unwrap_err();
    assert!(matches!(err, VdiskError::WouldExpandIntoUsed { .. }));

    // Shrinking then regrowing within the freed tail is fine.
    assert_eq!(resize_partition(&path, "L1", -512 * KIB).unwrap(), 512 * KIB);
    assert_eq!(resize_partition(&path, "L1", 256 * KIB).unwrap(), 768 * KIB);
}
