#![forbid(unsafe_code)]
//! RAID-1 mirror coordination.
//!
//! Every layout-mutating operation runs against the primary image first,
//! flushes, and is then re-executed against the mirror sibling with
//! diagnostics silenced and confirmation skipped. A mirror failure never
//! rolls the primary back; it surfaces as the warning-class
//! `MirrorDesynced` error.

use std::path::{Path, PathBuf};
use tracing::warn;
use vdisk_error::{Result, VdiskError};

const DISK_SUFFIX: &str = ".disk";
const MIRROR_SUFFIX: &str = "_raid.disk";

/// Mirror sibling of a primary path: the last `.disk` occurrence becomes
/// `_raid.disk`. `None` when the path carries no `.disk` at all.
#[must_use]
pub fn mirror_path(path: &Path) -> Option<PathBuf> {
    let text = path.to_string_lossy();
    let at = text.rfind(DISK_SUFFIX)?;
    let mut mirrored = String::with_capacity(text.len() + MIRROR_SUFFIX.len());
    mirrored.push_str(&text[..at]);
    mirrored.push_str(MIRROR_SUFFIX);
    mirrored.push_str(&text[at + DISK_SUFFIX.len()..]);
    Some(PathBuf::from(mirrored))
}

/// Reject paths that do not name a `.disk` image.
pub fn ensure_disk_path(path: &Path) -> Result<()> {
    if path.to_string_lossy().ends_with(DISK_SUFFIX) {
        Ok(())
    } else {
        Err(VdiskError::InvalidPath(path.display().to_string()))
    }
}

/// Re-run `op` against the mirror of `primary`. Call only after the primary
/// mutation has been committed and flushed.
pub(crate) fn replay(primary: &Path, op: impl FnOnce(&Path) -> Result<()>) -> Result<()> {
    let Some(mirror) = mirror_path(primary) else {
        return Err(VdiskError::InvalidPath(primary.display().to_string()));
    };
    match op(&mirror) {
        Ok(()) => Ok(()),
        Err(err) => {
            warn!(
                target: "vdisk::mirror",
                event = "mirror_failed",
                mirror = %mirror.display(),
                error = %err
            );
            Err(VdiskError::MirrorDesynced(format!(
                "{}: {err}",
                mirror.display()
            )))
        }
    }
}
