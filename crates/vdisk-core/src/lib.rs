#![forbid(unsafe_code)]
//! Partition layout engine for VDisk images.
//!
//! Places, resizes, and removes primary, extended, and logical partitions
//! inside a fixed-size disk image, maintaining the EBR chain inside the
//! extended partition and mirroring every layout mutation to the RAID-1
//! sibling file. Destructive operations are two-phase: `prepare_*` returns
//! a pending handle, the front-end confirms, `commit` mutates. Dropping the
//! handle cancels.

pub mod chain;
pub mod disk;
pub mod mirror;
pub mod mount;
pub mod ops;
pub mod region;
pub mod report;

pub use chain::ChainEntry;
pub use disk::{DiskImage, Located};
pub use mirror::mirror_path;
pub use mount::{MountRegistry, MountedDisk, MountedPartition, UnmountOutcome};
pub use ops::{
    CreateKind, DeleteMode, PendingDelete, PendingRemoveDisk, create_disk, create_partition,
    prepare_delete_partition, prepare_remove_disk, resize_partition,
};
pub use region::{Hole, choose_hole, compute_holes};
pub use report::{BlockKind, LayoutBlock, build_report};
