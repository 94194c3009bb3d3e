#![forbid(unsafe_code)]

use serde::{Deserialize, Serialize};
use vdisk_types::{
    FitPolicy, NAME_LEN, ParseError, PartName, PartitionKind, SLOT_COUNT, SlotStatus, ensure_slice,
    i64_to_disk, read_fixed, read_le_i32, write_le_i32,
};

/// Packed size of one partition slot: status(1) kind(1) fit(1) start(4)
/// size(4) name(16).
pub const SLOT_SIZE: usize = 27;

/// Packed size of the MBR: size(4) fit(1) pad(3) + 4 slots.
pub const MBR_SIZE: usize = 4 + 1 + 3 + SLOT_COUNT * SLOT_SIZE;

const SLOTS_OFFSET: usize = 8;

/// One of the four MBR partition table entries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PartitionSlot {
    pub status: SlotStatus,
    pub kind: PartitionKind,
    pub fit: FitPolicy,
    /// Absolute byte offset of the partition data.
    pub start: i64,
    /// Byte length of the partition data.
    pub size: i64,
    pub name: PartName,
}

impl PartitionSlot {
    pub const FREE: Self = Self {
        status: SlotStatus::Free,
        kind: PartitionKind::Primary,
        fit: FitPolicy::Worst,
        start: 0,
        size: 0,
        name: PartName([0_u8; NAME_LEN]),
    };

    #[must_use]
    pub fn is_used(&self) -> bool {
        self.status.is_used()
    }

    /// Exclusive end offset of the partition data.
    #[must_use]
    pub fn end(&self) -> i64 {
        self.start + self.size
    }

    /// Decode one slot from `data` at `offset`. Tolerant of zeroed free
    /// slots: only `status == 1` marks the entry used.
    pub fn decode(data: &[u8], offset: usize) -> Result<Self, ParseError> {
        let raw = ensure_slice(data, offset, SLOT_SIZE)?;
        Ok(Self {
            status: SlotStatus::from_byte(raw[0]),
            kind: PartitionKind::from_byte(raw[1]),
            fit: FitPolicy::from_byte(raw[2]),
            start: i64::from(read_le_i32(raw, 3)?),
            size: i64::from(read_le_i32(raw, 7)?),
            name: PartName::from_raw(read_fixed::<NAME_LEN>(raw, 11)?),
        })
    }

    /// Encode this slot into `data` at `offset`.
    pub fn encode_into(&self, data: &mut [u8], offset: usize) -> Result<(), ParseError> {
        if offset + SLOT_SIZE > data.len() {
            return Err(ParseError::InsufficientData {
                needed: SLOT_SIZE,
                offset,
                actual: data.len().saturating_sub(offset),
            });
        }
        let raw = &mut data[offset..offset + SLOT_SIZE];
        raw[0] = self.status.to_byte();
        raw[1] = self.kind.to_byte();
        raw[2] = self.fit.to_byte();
        write_le_i32(raw, 3, i64_to_disk(self.start, "slot.start")?);
        write_le_i32(raw, 7, i64_to_disk(self.size, "slot.size")?);
        raw[11..11 + NAME_LEN].copy_from_slice(&self.name.0);
        Ok(())
    }
}

/// Master Boot Record: total disk size, default fit, four slots.
///
/// Lives at byte offset 0 of the image and is never covered by a partition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Mbr {
    /// Total disk size in bytes.
    pub size: i64,
    /// Default fit policy recorded at mkdisk time.
    pub fit: FitPolicy,
    pub slots: [PartitionSlot; SLOT_COUNT],
}

impl Mbr {
    /// Fresh MBR for an empty disk.
    #[must_use]
    pub fn new(size: i64, fit: FitPolicy) -> Self {
        Self {
            size,
            fit,
            slots: [PartitionSlot::FREE; SLOT_COUNT],
        }
    }

    pub fn decode(data: &[u8]) -> Result<Self, ParseError> {
        let raw = ensure_slice(data, 0, MBR_SIZE)?;
        let mut slots = [PartitionSlot::FREE; SLOT_COUNT];
        for (index, slot) in slots.iter_mut().enumerate() {
            *slot = PartitionSlot::decode(raw, SLOTS_OFFSET + index * SLOT_SIZE)?;
        }
        Ok(Self {
            size: i64::from(read_le_i32(raw, 0)?),
            fit: FitPolicy::from_byte(raw[4]),
            slots,
        })
    }

    pub fn encode(&self) -> Result<[u8; MBR_SIZE], ParseError> {
        let mut raw = [0_u8; MBR_SIZE];
        write_le_i32(&mut raw, 0, i64_to_disk(self.size, "mbr.size")?);
        raw[4] = self.fit.to_byte();
        for (index, slot) in self.slots.iter().enumerate() {
            slot.encode_into(&mut raw, SLOTS_OFFSET + index * SLOT_SIZE)?;
        }
        Ok(raw)
    }

    /// Index of the first free slot, if any.
    #[must_use]
    pub fn free_slot_index(&self) -> Option<usize> {
        self.slots.iter().position(|slot| !slot.is_used())
    }

    /// Index of the used extended slot, if present (at most one by
    /// construction).
    #[must_use]
    pub fn extended_index(&self) -> Option<usize> {
        self.slots
            .iter()
            .position(|slot| slot.is_used() && slot.kind == PartitionKind::Extended)
    }

    /// Index of the used slot carrying `name`.
    #[must_use]
    pub fn slot_index_by_name(&self, name: &str) -> Option<usize> {
        self.slots
            .iter()
            .position(|slot| slot.is_used() && slot.name.matches(name))
    }

    /// Used slots sorted by physical start offset.
    #[must_use]
    pub fn used_slots_sorted(&self) -> Vec<PartitionSlot> {
        let mut used: Vec<PartitionSlot> =
            self.slots.iter().copied().filter(PartitionSlot::is_used).collect();
        used.sort_by_key(|slot| slot.start);
        used
    }
}
