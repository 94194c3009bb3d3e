#![forbid(unsafe_code)]
//! Shared value types for the VDisk layout engine.
//!
//! Fit policies, partition kinds, slot status, the 16-byte NUL-padded name
//! contract, and little-endian slice codec helpers used by `vdisk-ondisk`.

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Length of a partition name field on disk, including NUL padding.
pub const NAME_LEN: usize = 16;

/// Number of partition slots in the MBR table.
pub const SLOT_COUNT: usize = 4;

/// Sentinel value for an EBR `next` field with no successor.
pub const END_OF_CHAIN: i64 = -1;

/// Allocation fit policy for placing a partition into a free hole.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FitPolicy {
    Best,
    First,
    Worst,
}

impl FitPolicy {
    /// Canonical on-disk byte (`b'B'`, `b'F'`, `b'W'`).
    #[must_use]
    pub fn to_byte(self) -> u8 {
        match self {
            Self::Best => b'B',
            Self::First => b'F',
            Self::Worst => b'W',
        }
    }

    /// Decode an on-disk byte. Unknown bytes (zeroed free slots) fall back
    /// to worst-fit; used records always carry a canonical byte.
    #[must_use]
    pub fn from_byte(byte: u8) -> Self {
        match byte {
            b'B' | b'b' => Self::Best,
            b'F' | b'f' => Self::First,
            _ => Self::Worst,
        }
    }

    /// Parse a two-letter flag value (`BF`/`FF`/`WF`, case-insensitive).
    pub fn parse_flag(value: &str) -> Result<Self, ParseError> {
        match value.to_ascii_uppercase().as_str() {
            "BF" => Ok(Self::Best),
            "FF" => Ok(Self::First),
            "WF" => Ok(Self::Worst),
            _ => Err(ParseError::InvalidField {
                field: "fit",
                reason: "expected BF, FF or WF",
            }),
        }
    }
}

impl fmt::Display for FitPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::Best => "BF",
            Self::First => "FF",
            Self::Worst => "WF",
        };
        write!(f, "{label}")
    }
}

/// Kind of an MBR slot entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PartitionKind {
    Primary,
    Extended,
}

impl PartitionKind {
    #[must_use]
    pub fn to_byte(self) -> u8 {
        match self {
            Self::Primary => b'P',
            Self::Extended => b'E',
        }
    }

    /// Decode tolerantly: anything that is not `E` is primary.
    #[must_use]
    pub fn from_byte(byte: u8) -> Self {
        match byte {
            b'E' | b'e' => Self::Extended,
            _ => Self::Primary,
        }
    }
}

impl fmt::Display for PartitionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::Primary => "primary",
            Self::Extended => "extended",
        };
        write!(f, "{label}")
    }
}

/// Slot / EBR activity flag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SlotStatus {
    Free,
    Used,
}

impl SlotStatus {
    #[must_use]
    pub fn to_byte(self) -> u8 {
        match self {
            Self::Free => 0,
            Self::Used => 1,
        }
    }

    /// Only the exact byte `1` marks a record as used.
    #[must_use]
    pub fn from_byte(byte: u8) -> Self {
        if byte == 1 { Self::Used } else { Self::Free }
    }

    #[must_use]
    pub fn is_used(self) -> bool {
        matches!(self, Self::Used)
    }
}

/// Fixed 16-byte NUL-padded partition name.
///
/// Equality compares up to the first NUL byte; construction truncates to 15
/// bytes so the padding always contains at least one NUL.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PartName(pub [u8; NAME_LEN]);

impl PartName {
    /// Build from a string, truncating to `NAME_LEN - 1` bytes.
    #[must_use]
    pub fn new(name: &str) -> Self {
        let mut buf = [0_u8; NAME_LEN];
        let bytes = name.as_bytes();
        let len = bytes.len().min(NAME_LEN - 1);
        buf[..len].copy_from_slice(&bytes[..len]);
        Self(buf)
    }

    #[must_use]
    pub fn from_raw(raw: [u8; NAME_LEN]) -> Self {
        Self(raw)
    }

    /// Bytes up to the first NUL.
    #[must_use]
    pub fn as_bytes(&self) -> &[u8] {
        let end = self.0.iter().position(|b| *b == 0).unwrap_or(NAME_LEN);
        &self.0[..end]
    }

    /// Byte-level comparison against a requested name, honoring truncation.
    /// Only bytes up to the first NUL participate, so a record whose
    /// padding carries stray bytes still matches.
    #[must_use]
    pub fn matches(&self, name: &str) -> bool {
        self.as_bytes() == Self::new(name).as_bytes()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0[0] == 0
    }
}

impl fmt::Display for PartName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", String::from_utf8_lossy(self.as_bytes()))
    }
}

/// Decode failure for a packed record.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ParseError {
    #[error("insufficient data: need {needed} bytes at offset {offset}, got {actual}")]
    InsufficientData {
        needed: usize,
        offset: usize,
        actual: usize,
    },
    #[error("invalid field: {field} ({reason})")]
    InvalidField {
        field: &'static str,
        reason: &'static str,
    },
    #[error("integer conversion failed: {field}")]
    IntegerConversion { field: &'static str },
}

#[inline]
pub fn ensure_slice(data: &[u8], offset: usize, len: usize) -> Result<&[u8], ParseError> {
    let Some(end) = offset.checked_add(len) else {
        return Err(ParseError::InvalidField {
            field: "offset",
            reason: "overflow",
        });
    };

    if end > data.len() {
        return Err(ParseError::InsufficientData {
            needed: len,
            offset,
            actual: data.len().saturating_sub(offset),
        });
    }

    Ok(&data[offset..end])
}

#[inline]
pub fn read_le_i32(data: &[u8], offset: usize) -> Result<i32, ParseError> {
    let bytes = ensure_slice(data, offset, 4)?;
    Ok(i32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
}

#[inline]
pub fn read_fixed<const N: usize>(data: &[u8], offset: usize) -> Result<[u8; N], ParseError> {
    let bytes = ensure_slice(data, offset, N)?;
    let mut out = [0_u8; N];
    out.copy_from_slice(bytes);
    Ok(out)
}

#[inline]
pub fn write_le_i32(data: &mut [u8], offset: usize, value: i32) {
    data[offset..offset + 4].copy_from_slice(&value.to_le_bytes());
}

/// Narrow an `i64` byte quantity to the on-disk `i32`, with a labeled error.
pub fn i64_to_disk(value: i64, field: &'static str) -> Result<i32, ParseError> {
    i32::try_from(value).map_err(|_| ParseError::IntegerConversion { field })
}
