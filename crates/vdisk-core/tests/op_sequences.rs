#![forbid(unsafe_code)]
//! Property test: arbitrary operation sequences preserve the layout
//! invariants and keep the mirror in lockstep.

use proptest::prelude::*;
use std::fs;
use std::path::Path;
use vdisk_core::ops::{
    CreateKind, DeleteMode, create_disk, create_partition, prepare_delete_partition,
    resize_partition,
};
use vdisk_core::{DiskImage, chain, mirror_path};
use vdisk_ondisk::{EBR_SIZE, MBR_SIZE, Mbr};
use vdisk_types::{FitPolicy, PartitionKind};

const DISK_SIZE: i64 = 256 * 1024;
const MBR_LEN: i64 = MBR_SIZE as i64;
const EBR_LEN: i64 = EBR_SIZE as i64;

#[derive(Debug, Clone)]
enum Op {
    Create {
        name: usize,
        kind: CreateKind,
        size: i64,
        fit: FitPolicy,
    },
    Resize {
        name: usize,
        delta: i64,
    },
    Delete {
        name: usize,
        mode: DeleteMode,
    },
}

const NAMES: [&str; 6] = ["p0", "p1", "p2", "ext", "l0", "l1"];

fn arb_fit() -> impl Strategy<Value = FitPolicy> {
    prop_oneof![
        Just(FitPolicy::First),
        Just(FitPolicy::Best),
        Just(FitPolicy::Worst),
    ]
}

fn arb_op() -> impl Strategy<Value = Op> {
    prop_oneof![
        (
            0..NAMES.len(),
            prop_oneof![
                Just(CreateKind::Primary),
                Just(CreateKind::Extended),
                Just(CreateKind::Logical),
            ],
            512_i64..96 * 1024,
            arb_fit(),
        )
            .prop_map(|(name, kind, size, fit)| Op::Create {
                name,
                kind,
                size,
                fit
            }),
        (0..NAMES.len(), -64_i64 * 1024..64 * 1024).prop_map(|(name, delta)| Op::Resize {
            name,
            delta
        }),
        (
            0..NAMES.len(),
            prop_oneof![Just(DeleteMode::Fast), Just(DeleteMode::Full)],
        )
            .prop_map(|(name, mode)| Op::Delete { name, mode }),
    ]
}

fn is_extended(path: &Path, name: &str) -> bool {
    let image = DiskImage::open(path).unwrap();
    let mbr = image.read_mbr().unwrap();
    mbr.slot_index_by_name(name)
        .is_some_and(|index| mbr.slots[index].kind == PartitionKind::Extended)
}

fn apply(path: &Path, op: &Op) {
    // Individual operations may fail (no fit, duplicate name, missing
    // target); the invariants must hold regardless.
    let result = match op {
        Op::Create {
            name,
            kind,
            size,
            fit,
        } => create_partition(path, NAMES[*name], *kind, *size, *fit),
        Op::Resize { name, delta } => {
            // Shrinking an extended partition is allowed to strand its
            // logicals; keep sequences inside the invariant-preserving
            // subset by skipping that case.
            if *delta < 0 && is_extended(path, NAMES[*name]) {
                return;
            }
            resize_partition(path, NAMES[*name], *delta).map(|_| ())
        }
        Op::Delete { name, mode } => {
            prepare_delete_partition(path, NAMES[*name]).and_then(|pending| pending.commit(*mode))
        }
    };
    if let Err(err) = result {
        // A mirror desync would break the parity invariant below.
        assert!(!err.primary_committed(), "unexpected mirror failure: {err}");
    }
}

fn check_invariants(path: &Path) {
    let image = DiskImage::open(path).unwrap();
    let mbr = image.read_mbr().unwrap();

    // Top level: inside bounds, no overlap, at most one extended.
    let used = mbr.used_slots_sorted();
    for slot in &used {
        assert!(slot.start >= MBR_LEN, "slot before MBR end");
        assert!(slot.end() <= mbr.size, "slot past disk end");
    }
    for pair in used.windows(2) {
        assert!(pair[0].end() <= pair[1].start, "overlapping slots");
    }
    let extended_count = used
        .iter()
        .filter(|slot| slot.kind == PartitionKind::Extended)
        .count();
    assert!(extended_count <= 1, "two extended partitions");

    // Extended level: entries ordered, non-overlapping, in bounds.
    let mut names: Vec<String> = used.iter().map(|slot| slot.name.to_string()).collect();
    if let Some(ext_index) = mbr.extended_index() {
        let extended = mbr.slots[ext_index];
        let entries = chain::read_chain(&image, &extended).unwrap();
        for entry in &entries {
            assert!(entry.pos >= extended.start);
            assert!(entry.span_end() <= extended.end(), "logical past extended end");
            assert_eq!(entry.ebr.start, entry.pos + EBR_LEN);
            names.push(entry.ebr.name.to_string());
        }
        for pair in entries.windows(2) {
            assert!(pair[0].pos < pair[1].pos, "chain order broken");
            assert!(pair[0].span_end() <= pair[1].pos, "overlapping logicals");
        }
    }

    // Names unique across the whole disk.
    let total = names.len();
    names.sort();
    names.dedup();
    assert_eq!(names.len(), total, "duplicate partition names");

    // Mirror parity: identical MBR bytes and identical active EBR records
    // at identical positions.
    let raid = mirror_path(path).unwrap();
    let primary_bytes = fs::read(path).unwrap();
    let sibling_bytes = fs::read(&raid).unwrap();
    assert_eq!(primary_bytes[..MBR_SIZE], sibling_bytes[..MBR_SIZE]);

    let sibling_mbr = Mbr::decode(&sibling_bytes).unwrap();
    assert_eq!(sibling_mbr, mbr);
    if let Some(ext_index) = mbr.extended_index() {
        let extended = mbr.slots[ext_index];
        let entries = chain::read_chain(&image, &extended).unwrap();
        for entry in &entries {
            let at = usize::try_from(entry.pos).unwrap();
            assert_eq!(
                primary_bytes[at..at + EBR_SIZE],
                sibling_bytes[at..at + EBR_SIZE],
                "mirror EBR diverged at {at}"
            );
        }
    }
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(32))]

    #[test]
    fn random_op_sequences_preserve_invariants(ops in proptest::collection::vec(arb_op(), 1..14)) {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("prop.disk");
        create_disk(&path, DISK_SIZE, FitPolicy::First).unwrap();

        for op in &ops {
            apply(&path, op);
            check_invariants(&path);
        }
    }
}
