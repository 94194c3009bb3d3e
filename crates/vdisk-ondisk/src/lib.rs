#![forbid(unsafe_code)]
//! On-disk record codec for VDisk images.
//!
//! Pure codec crate: no I/O, no side effects. Encodes and decodes the
//! packed MBR, partition slot, and EBR records at their fixed little-endian
//! layout. Offsets are absolute and records carry no alignment padding
//! beyond the three reserved bytes in the MBR header.

pub mod ebr;
pub mod mbr;

pub use ebr::{EBR_SIZE, Ebr};
pub use mbr::{MBR_SIZE, Mbr, PartitionSlot, SLOT_SIZE};
