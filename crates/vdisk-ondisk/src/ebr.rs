#![forbid(unsafe_code)]

use serde::{Deserialize, Serialize};
use vdisk_types::{
    END_OF_CHAIN, FitPolicy, NAME_LEN, ParseError, PartName, SlotStatus, ensure_slice, i64_to_disk,
    read_fixed, read_le_i32, write_le_i32,
};

/// Packed size of an EBR: status(1) fit(1) start(4) size(4) next(4) name(16).
pub const EBR_SIZE: usize = 30;

/// Extended Boot Record: header preceding each logical partition's data,
/// linked by absolute byte offsets inside the extended partition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Ebr {
    pub status: SlotStatus,
    pub fit: FitPolicy,
    /// Absolute byte offset of the logical data (EBR position + `EBR_SIZE`).
    pub start: i64,
    /// Byte length of the logical data, header not counted.
    pub size: i64,
    /// Absolute offset of the next EBR, or `END_OF_CHAIN`.
    pub next: i64,
    pub name: PartName,
}

impl Ebr {
    /// Inactive sentinel written at the start of a fresh extended partition.
    #[must_use]
    pub fn sentinel(fit: FitPolicy, pos: i64) -> Self {
        Self {
            status: SlotStatus::Free,
            fit,
            start: pos,
            size: 0,
            next: END_OF_CHAIN,
            name: PartName([0_u8; NAME_LEN]),
        }
    }

    #[must_use]
    pub fn is_used(&self) -> bool {
        self.status.is_used()
    }

    /// Exclusive end offset of the logical data.
    #[must_use]
    pub fn end(&self) -> i64 {
        self.start + self.size
    }

    pub fn decode(data: &[u8], offset: usize) -> Result<Self, ParseError> {
        let raw = ensure_slice(data, offset, EBR_SIZE)?;
        Ok(Self {
            status: SlotStatus::from_byte(raw[0]),
            fit: FitPolicy::from_byte(raw[1]),
            start: i64::from(read_le_i32(raw, 2)?),
            size: i64::from(read_le_i32(raw, 6)?),
            next: i64::from(read_le_i32(raw, 10)?),
            name: PartName::from_raw(read_fixed::<NAME_LEN>(raw, 14)?),
        })
    }

    pub fn encode(&self) -> Result<[u8; EBR_SIZE], ParseError> {
        let mut raw = [0_u8; EBR_SIZE];
        raw[0] = self.status.to_byte();
        raw[1] = self.fit.to_byte();
        write_le_i32(&mut raw, 2, i64_to_disk(self.start, "ebr.start")?);
        write_le_i32(&mut raw, 6, i64_to_disk(self.size, "ebr.size")?);
        write_le_i32(&mut raw, 10, i64_to_disk(self.next, "ebr.next")?);
        raw[14..14 + NAME_LEN].copy_from_slice(&self.name.0);
        Ok(raw)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn record_size_is_packed() {
        assert_eq!(EBR_SIZE, 30);
    }

    #[test]
    fn round_trip() {
        let ebr = Ebr {
            status: SlotStatus::Used,
            fit: FitPolicy::First,
            start: 146,
            size: 1 << 20,
            next: END_OF_CHAIN,
            name: PartName::new("swap"),
        };
        let raw = ebr.encode().unwrap();
        assert_eq!(Ebr::decode(&raw, 0).unwrap(), ebr);
    }

    #[test]
    fn end_of_chain_encodes_as_minus_one() {
        let raw = Ebr::sentinel(FitPolicy::Worst, 116).encode().unwrap();
        assert_eq!(&raw[10..14], &[0xFF, 0xFF, 0xFF, 0xFF]);
        let back = Ebr::decode(&raw, 0).unwrap();
        assert_eq!(back.next, END_OF_CHAIN);
        assert!(!back.is_used());
        assert_eq!(back.size, 0);
    }

    #[test]
    fn zeroed_region_decodes_free() {
        let ebr = Ebr::decode(&[0_u8; EBR_SIZE], 0).unwrap();
        assert!(!ebr.is_used());
        assert_eq!(ebr.next, 0);
        assert_eq!(ebr.size, 0);
    }

    #[test]
    fn encode_rejects_wide_next() {
        let mut ebr = Ebr::sentinel(FitPolicy::First, 0);
        ebr.next = i64::from(i32::MAX) + 1;
        assert!(ebr.encode().is_err());
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(32))]

        #[test]
        fn prop_decode_never_panics(
            raw in proptest::collection::vec(any::<u8>(), 0..=EBR_SIZE * 2),
            offset in 0_usize..=EBR_SIZE,
        ) {
            let _ = Ebr::decode(&raw, offset);
        }
    }
}
