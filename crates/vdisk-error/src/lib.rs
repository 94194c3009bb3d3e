#![forbid(unsafe_code)]
//! Error types for VDisk.
//!
//! Defines `VdiskError` and a `Result<T>` alias used throughout the
//! workspace. Engine errors on the primary image abort the operation;
//! `MirrorDesynced` is the one warning-class variant (primary committed,
//! mirror did not follow).

use thiserror::Error;

/// Unified error type for all VDisk operations.
#[derive(Debug, Error)]
pub enum VdiskError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid arguments: {0}")]
    InvalidArguments(String),

    #[error("invalid disk path: {0} (expected a .disk file)")]
    InvalidPath(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("partition name already in use: {0}")]
    NameInUse(String),

    #[error("all four partition slots are in use")]
    NoFreeSlot,

    #[error("an extended partition already exists on this disk")]
    ExtendedExists,

    #[error("no free hole fits the request: requested {requested} bytes, largest hole {largest}")]
    NoFit { requested: i64, largest: i64 },

    #[error("resize would leave a non-positive size: current {current}, delta {delta}")]
    WouldUnderflow { current: i64, delta: i64 },

    #[error("expansion exceeds adjacent free space: {available} bytes available, {requested} requested")]
    WouldExpandIntoUsed { available: i64, requested: i64 },

    #[error("corrupt on-disk record: {0}")]
    Corrupt(String),

    #[error("mirror desynced: {0}")]
    MirrorDesynced(String),

    #[error("operation cancelled")]
    Cancelled,
}

impl VdiskError {
    /// Whether the primary image was left modified despite the error.
    #[must_use]
    pub fn primary_committed(&self) -> bool {
        matches!(self, Self::MirrorDesynced(_))
    }
}

/// Result alias using `VdiskError`.
pub type Result<T> = std::result::Result<T, VdiskError>;
