//! Unpacks the recovered rootfs tarball into a mounted ext2 partition,
//! preserving ownership, permissions, and symlinks (C7).
//!
//! Grounded on `original_source/src/util.py`'s `insertObjectsToImage`/
//! `insertLinksToImage` sequence, which is mirrored here at the filesystem
//! level instead of the catalog level: every file and link enumerated by
//! [`crate::archive_reader`] is recreated under the mount point.

use anyhow::{Context, Result};
use flate2::read::GzDecoder;
use std::fs::File;
use std::path::Path;
use tar::Archive;

/// Unpacks every entry of `tarball` under `mount_point`, preserving Unix
/// ownership, permissions and symlink targets exactly as recorded in the
/// archive.
pub fn materialise(tarball: &Path, mount_point: &Path) -> Result<()> {
    let file = File::open(tarball)
        .with_context(|| format!("opening rootfs tarball {}", tarball.display()))?;
    let mut archive = Archive::new(GzDecoder::new(file));
    archive.set_preserve_permissions(true);
    archive.set_preserve_ownerships(true);
    archive.set_unpack_xattrs(true);
    archive
        .unpack(mount_point)
        .with_context(|| format!("unpacking rootfs into {}", mount_point.display()))?;
    Ok(())
}
